//! In-memory backend that records every call, for tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::backend::{
    Extent, GpuBackend, RenderTarget, TargetId, TextureId, UniformLocation, UniformValue,
};
use crate::error::{RenderError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    SetBlend(bool),
    CreateColorTexture { id: TextureId, size: Extent },
    ResizeColorTexture { id: TextureId, size: Extent },
    CreateAudioTexture { id: TextureId, unit: u32, len: usize },
    WriteAudioTexture { id: TextureId },
    DeleteTextures(Vec<TextureId>),
    CreateTarget(TargetId),
    DeleteTargets(Vec<TargetId>),
    BindTarget(RenderTarget),
    AttachColor { target: TargetId, texture: TextureId },
    BindBufferTexture { unit: u32, texture: TextureId },
    UseProgram(usize),
    Upload { pass: usize, slot: usize, value: UniformValue },
    Viewport(Extent),
    Clear { color: [f32; 4], depth: bool },
    Draw(DrawRecord),
}

/// Snapshot of the state a draw executed with.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DrawRecord {
    pub program: Option<usize>,
    pub target: RenderTarget,
    pub attachment: Option<TextureId>,
    pub units: BTreeMap<u32, TextureId>,
    pub viewport: Extent,
    pub count: u32,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingBackend {
    calls: Vec<Call>,
    next_id: u32,
    textures: HashMap<TextureId, Extent>,
    audio: HashMap<TextureId, Vec<f32>>,
    targets: HashMap<TargetId, Option<TextureId>>,
    bound_target: Option<RenderTarget>,
    units: BTreeMap<u32, TextureId>,
    program: Option<usize>,
    viewport: Extent,
    missing: BTreeSet<(usize, usize)>,
    allocation_budget: Option<usize>,
}

impl RecordingBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Makes `slot` unresolvable in the program of `pass`.
    pub(crate) fn hide_uniform(&mut self, pass: usize, slot: usize) {
        self.missing.insert((pass, slot));
    }

    /// Fails every allocation after the next `count` succeed.
    pub(crate) fn fail_after(&mut self, count: usize) {
        self.allocation_budget = Some(count);
    }

    pub(crate) fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub(crate) fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub(crate) fn draws(&self) -> Vec<&DrawRecord> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Draw(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Uploads issued while `pass` was the active program, in order.
    pub(crate) fn uploads_for(&self, pass: usize) -> Vec<(usize, UniformValue)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Upload {
                    pass: p,
                    slot,
                    value,
                } if *p == pass => Some((*slot, *value)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn live_textures(&self) -> usize {
        self.textures.len() + self.audio.len()
    }

    pub(crate) fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub(crate) fn texture_size(&self, id: TextureId) -> Option<Extent> {
        self.textures.get(&id).copied()
    }

    pub(crate) fn audio_data(&self, id: TextureId) -> Option<&[f32]> {
        self.audio.get(&id).map(Vec::as_slice)
    }

    pub(crate) fn bound_target(&self) -> Option<RenderTarget> {
        self.bound_target
    }

    pub(crate) fn unit(&self, unit: u32) -> Option<TextureId> {
        self.units.get(&unit).copied()
    }

    fn allocate(&mut self, what: &'static str) -> Result<u32> {
        if let Some(budget) = self.allocation_budget.as_mut() {
            if *budget == 0 {
                return Err(RenderError::allocation(what, "recording budget exhausted"));
            }
            *budget -= 1;
        }
        self.next_id += 1;
        Ok(self.next_id)
    }
}

impl GpuBackend for RecordingBackend {
    fn set_blend(&mut self, enabled: bool) {
        self.calls.push(Call::SetBlend(enabled));
    }

    fn create_color_texture(&mut self, size: Extent) -> Result<TextureId> {
        let id = TextureId::from_raw(self.allocate("color texture")?);
        self.textures.insert(id, size);
        self.calls.push(Call::CreateColorTexture { id, size });
        Ok(id)
    }

    fn resize_color_texture(&mut self, texture: TextureId, size: Extent) -> Result<()> {
        let slot = self
            .textures
            .get_mut(&texture)
            .ok_or(RenderError::UnknownTexture(texture.raw()))?;
        *slot = size;
        self.calls.push(Call::ResizeColorTexture { id: texture, size });
        Ok(())
    }

    fn create_audio_texture(&mut self, unit: u32, len: usize) -> Result<TextureId> {
        let id = TextureId::from_raw(self.allocate("audio texture")?);
        self.audio.insert(id, vec![0.0; len]);
        self.calls.push(Call::CreateAudioTexture { id, unit, len });
        Ok(id)
    }

    fn write_audio_texture(&mut self, texture: TextureId, samples: &[f32]) {
        if let Some(data) = self.audio.get_mut(&texture) {
            data.clear();
            data.extend_from_slice(samples);
        }
        self.calls.push(Call::WriteAudioTexture { id: texture });
    }

    fn delete_textures(&mut self, textures: &[TextureId]) {
        for texture in textures {
            self.textures.remove(texture);
            self.audio.remove(texture);
            self.units.retain(|_, bound| *bound != *texture);
        }
        self.calls.push(Call::DeleteTextures(textures.to_vec()));
    }

    fn create_target(&mut self) -> Result<TargetId> {
        let id = TargetId::from_raw(self.allocate("render target")?);
        self.targets.insert(id, None);
        self.calls.push(Call::CreateTarget(id));
        Ok(id)
    }

    fn delete_targets(&mut self, targets: &[TargetId]) {
        for target in targets {
            self.targets.remove(target);
            if self.bound_target == Some(RenderTarget::Offscreen(*target)) {
                self.bound_target = Some(RenderTarget::Surface);
            }
        }
        self.calls.push(Call::DeleteTargets(targets.to_vec()));
    }

    fn bind_target(&mut self, target: RenderTarget) {
        self.bound_target = Some(target);
        self.calls.push(Call::BindTarget(target));
    }

    fn attach_color(&mut self, target: TargetId, texture: TextureId) {
        if let Some(slot) = self.targets.get_mut(&target) {
            *slot = Some(texture);
        }
        self.calls.push(Call::AttachColor { target, texture });
    }

    fn bind_buffer_texture(&mut self, unit: u32, texture: TextureId) {
        self.units.insert(unit, texture);
        self.calls.push(Call::BindBufferTexture { unit, texture });
    }

    fn use_program(&mut self, pass: usize) {
        self.program = Some(pass);
        self.calls.push(Call::UseProgram(pass));
    }

    fn uniform_location(&self, pass: usize, slot: usize) -> Option<UniformLocation> {
        if self.missing.contains(&(pass, slot)) {
            None
        } else {
            Some(UniformLocation::from_raw(slot as u32))
        }
    }

    fn upload_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let pass = self.program.unwrap_or(usize::MAX);
        self.calls.push(Call::Upload {
            pass,
            slot: location.raw() as usize,
            value,
        });
    }

    fn set_viewport(&mut self, size: Extent) {
        self.viewport = size;
        self.calls.push(Call::Viewport(size));
    }

    fn clear(&mut self, color: [f32; 4], depth: bool) {
        self.calls.push(Call::Clear { color, depth });
    }

    fn draw_points(&mut self, count: u32) -> Result<()> {
        let target = self.bound_target.unwrap_or(RenderTarget::Surface);
        let attachment = match target {
            RenderTarget::Surface => None,
            RenderTarget::Offscreen(id) => *self
                .targets
                .get(&id)
                .ok_or(RenderError::UnknownTarget(id.raw()))?,
        };
        let record = DrawRecord {
            program: self.program,
            target,
            attachment,
            units: self.units.clone(),
            viewport: self.viewport,
            count,
        };
        self.calls.push(Call::Draw(record));
        Ok(())
    }
}
