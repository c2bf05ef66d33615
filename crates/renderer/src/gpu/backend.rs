use std::collections::HashMap;

use passconfig::ShaderConfig;
use wgpu::naga::ShaderStage;
use wgpu::util::DeviceExt;

use crate::audio::AudioChannel;
use crate::backend::{
    Extent, GpuBackend, RenderTarget, TargetId, TextureId, UniformLocation, UniformValue,
};
use crate::error::{RenderError, Result};
use crate::uniforms::UniformTable;

use super::bindings;
use super::context::GpuContext;
use super::pipeline::{self, AUDIO_FORMAT, BUFFER_FORMAT, SAMPLER_BINDING, UNIFORM_BINDING};
use super::prelude::{self, ProgramSource};
use super::uniforms::{UniformBlock, UniformLayout};

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: Extent,
}

struct Program {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    block: UniformBlock,
    uniform_buffer: wgpu::Buffer,
    /// Sampler unit uploaded to each sampler slot, indexed by slot.
    sampler_units: Vec<Option<u32>>,
    pipeline: Option<(wgpu::TextureFormat, wgpu::RenderPipeline)>,
}

/// [`GpuBackend`] on top of `wgpu`.
///
/// Render targets are bookkeeping only: a target remembers its attached
/// texture and each draw opens a render pass on that texture's view. Clears
/// are folded into the next pass as its load operation. Pass `N` (the image
/// pass) draws into the view given to [`set_surface_view`](Self::set_surface_view).
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    float32_blendable: bool,
    table: UniformTable,
    layout: UniformLayout,
    prelude: String,
    pipeline_layout: wgpu::PipelineLayout,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    next_id: u32,
    textures: HashMap<TextureId, GpuTexture>,
    audio_units: [Option<TextureId>; 4],
    targets: HashMap<TargetId, Option<TextureId>>,
    bound: RenderTarget,
    units: Vec<Option<TextureId>>,
    programs: Vec<Option<Program>>,
    active: usize,
    blend: bool,
    blend_warned: bool,
    viewport: Extent,
    pending_clear: Option<wgpu::Color>,
    surface_view: Option<wgpu::TextureView>,
}

impl WgpuBackend {
    pub fn new(context: &GpuContext, table: UniformTable) -> Self {
        let device = context.device.clone();
        let num_buffers = table.num_buffers();
        let layout = UniformLayout::new(&table);
        let prelude = prelude::prelude(&table, &layout);
        let bind_group_layout = pipeline::bind_group_layout(&device, num_buffers);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pass pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let sampler = pipeline::linear_sampler(&device);

        Self {
            queue: context.queue.clone(),
            surface_format: context.surface_format,
            float32_blendable: context.float32_blendable,
            layout,
            prelude,
            pipeline_layout,
            bind_group_layout,
            sampler,
            next_id: 0,
            textures: HashMap::new(),
            audio_units: [None; 4],
            targets: HashMap::new(),
            bound: RenderTarget::Surface,
            units: vec![None; num_buffers],
            programs: (0..=num_buffers).map(|_| None).collect(),
            active: 0,
            blend: false,
            blend_warned: false,
            viewport: Extent::default(),
            pending_clear: None,
            surface_view: None,
            table,
            device,
        }
    }

    /// Validates `config` first: its names end up in the shared prelude.
    pub fn for_config(context: &GpuContext, config: &ShaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(context, UniformTable::new(config)))
    }

    /// Declarations prepended to every program, for callers that want to
    /// inspect what their shaders can use.
    pub fn prelude(&self) -> &str {
        &self.prelude
    }

    /// Compiles the program of `pass`; pass `N` is the image pass.
    pub fn register_program(&mut self, pass: usize, source: &ProgramSource) -> Result<()> {
        if pass >= self.programs.len() {
            return Err(RenderError::UnknownProgram(pass));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex = prelude::compile_stage(
            &self.device,
            &self.prelude,
            &source.vertex,
            ShaderStage::Vertex,
            &format!("pass {pass} vertex"),
        );
        let fragment = prelude::compile_stage(
            &self.device,
            &self.prelude,
            &source.fragment,
            ShaderStage::Fragment,
            &format!("pass {pass} fragment"),
        );
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::Pipeline {
                pass,
                detail: err.to_string(),
            });
        }

        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pass uniforms"),
            size: u64::from(self.layout.size()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.programs[pass] = Some(Program {
            vertex,
            fragment,
            block: UniformBlock::new(&self.layout),
            uniform_buffer,
            sampler_units: vec![None; self.table.len()],
            pipeline: None,
        });
        tracing::debug!(pass, "registered pass program");
        Ok(())
    }

    /// View the image pass renders into; usually the current surface texture.
    pub fn set_surface_view(&mut self, view: wgpu::TextureView) {
        self.surface_view = Some(view);
    }

    pub fn take_surface_view(&mut self) -> Option<wgpu::TextureView> {
        self.surface_view.take()
    }

    fn next_raw_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Runs `create` inside out-of-memory and validation error scopes.
    fn allocate<T>(
        &self,
        what: &'static str,
        create: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match out_of_memory.or(validation) {
            Some(err) => Err(RenderError::allocation(what, err.to_string())),
            None => Ok(value),
        }
    }

    fn create_texture_2d(&self, size: Extent) -> Result<GpuTexture> {
        let texture = self.allocate("color texture", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("pass buffer"),
                size: wgpu::Extent3d {
                    width: size.width.max(1),
                    height: size.height.max(1),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: BUFFER_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuTexture {
            texture,
            view,
            size,
        })
    }

    fn view_of(&self, texture: TextureId) -> Result<&GpuTexture> {
        self.textures
            .get(&texture)
            .ok_or(RenderError::UnknownTexture(texture.raw()))
    }

    /// Color attachment of the bound target: view, format and size.
    fn attachment(&self) -> Result<(wgpu::TextureView, wgpu::TextureFormat, Option<Extent>)> {
        match self.bound {
            RenderTarget::Surface => {
                let view = self.surface_view.clone().ok_or(RenderError::MissingSurface)?;
                Ok((view, self.surface_format, None))
            }
            RenderTarget::Offscreen(target) => {
                let texture = self
                    .targets
                    .get(&target)
                    .copied()
                    .flatten()
                    .ok_or(RenderError::UnknownTarget(target.raw()))?;
                let gpu = self.view_of(texture)?;
                Ok((gpu.view.clone(), BUFFER_FORMAT, Some(gpu.size)))
            }
        }
    }

    fn bind_group(&self, program: &Program) -> Result<wgpu::BindGroup> {
        let samplers = bindings::resolve_sampler_bindings(
            &self.table,
            &program.sampler_units,
            &self.audio_units,
            &self.units,
        )?;
        let mut views = Vec::with_capacity(samplers.len());
        for sampler in &samplers {
            views.push((sampler.binding, self.view_of(sampler.texture)?.view.clone()));
        }

        let mut entries = Vec::with_capacity(views.len() + 2);
        entries.push(wgpu::BindGroupEntry {
            binding: UNIFORM_BINDING,
            resource: program.uniform_buffer.as_entire_binding(),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: SAMPLER_BINDING,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });
        for (binding, view) in &views {
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pass bind group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        }))
    }

    fn blend_for(&mut self, format: wgpu::TextureFormat) -> bool {
        let enabled = pipeline::blend_enabled(self.blend, format, self.float32_blendable);
        if self.blend && !enabled && !self.blend_warned {
            tracing::warn!(
                "adapter cannot blend 32-bit float targets; buffer passes draw unblended"
            );
            self.blend_warned = true;
        }
        enabled
    }

    fn ensure_pipeline(&mut self, pass: usize, format: wgpu::TextureFormat) -> Result<()> {
        let cached = self
            .programs
            .get(pass)
            .and_then(Option::as_ref)
            .ok_or(RenderError::UnknownProgram(pass))?
            .pipeline
            .as_ref()
            .is_some_and(|(cached, _)| *cached == format);
        if cached {
            return Ok(());
        }

        let blend = self.blend_for(format);
        let label = format!("pass {pass} pipeline");
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let built = {
            let program = self.programs[pass]
                .as_ref()
                .ok_or(RenderError::UnknownProgram(pass))?;
            pipeline::build_pipeline(
                &self.device,
                &self.pipeline_layout,
                &program.vertex,
                &program.fragment,
                format,
                blend,
                &label,
            )
        };
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::Pipeline {
                pass,
                detail: err.to_string(),
            });
        }
        if let Some(program) = self.programs[pass].as_mut() {
            program.pipeline = Some((format, built));
        }
        tracing::debug!(pass, ?format, blend, "built pass pipeline");
        Ok(())
    }

    /// Submits a pass that only clears, for a clear no draw consumed.
    fn flush_clear(&mut self) {
        let Some(color) = self.pending_clear.take() else {
            return;
        };
        let Ok((view, _, _)) = self.attachment() else {
            return;
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("clear encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl GpuBackend for WgpuBackend {
    fn set_blend(&mut self, enabled: bool) {
        if self.blend == enabled {
            return;
        }
        self.blend = enabled;
        for program in self.programs.iter_mut().flatten() {
            program.pipeline = None;
        }
    }

    fn create_color_texture(&mut self, size: Extent) -> Result<TextureId> {
        let texture = self.create_texture_2d(size)?;
        let id = TextureId::from_raw(self.next_raw_id());
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn resize_color_texture(&mut self, texture: TextureId, size: Extent) -> Result<()> {
        if !self.textures.contains_key(&texture) {
            return Err(RenderError::UnknownTexture(texture.raw()));
        }
        let replacement = self.create_texture_2d(size)?;
        if let Some(old) = self.textures.insert(texture, replacement) {
            old.texture.destroy();
        }
        Ok(())
    }

    fn create_audio_texture(&mut self, unit: u32, len: usize) -> Result<TextureId> {
        if unit as usize >= self.audio_units.len() {
            return Err(RenderError::UnboundUnit { unit });
        }
        let width = len.max(1) as u32;
        let texture = self.allocate("audio texture", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(AudioChannel::ALL[unit as usize].uniform_name()),
                size: wgpu::Extent3d {
                    width,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D1,
                format: AUDIO_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId::from_raw(self.next_raw_id());
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                size: Extent::new(width, 1),
            },
        );
        self.audio_units[unit as usize] = Some(id);
        Ok(id)
    }

    fn write_audio_texture(&mut self, texture: TextureId, samples: &[f32]) {
        let Some(gpu) = self.textures.get(&texture) else {
            tracing::warn!(%texture, "audio upload to unknown texture ignored");
            return;
        };
        let width = samples.len().min(gpu.size.width as usize);
        if width == 0 {
            return;
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&samples[..width]),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width as u32 * 4),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: width as u32,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
    }

    fn delete_textures(&mut self, textures: &[TextureId]) {
        for texture in textures {
            if let Some(gpu) = self.textures.remove(texture) {
                gpu.texture.destroy();
            }
            for bound in self.units.iter_mut().chain(self.audio_units.iter_mut()) {
                if *bound == Some(*texture) {
                    *bound = None;
                }
            }
            for attached in self.targets.values_mut() {
                if *attached == Some(*texture) {
                    *attached = None;
                }
            }
        }
    }

    fn create_target(&mut self) -> Result<TargetId> {
        let id = TargetId::from_raw(self.next_raw_id());
        self.targets.insert(id, None);
        Ok(id)
    }

    fn delete_targets(&mut self, targets: &[TargetId]) {
        for target in targets {
            self.targets.remove(target);
            if self.bound == RenderTarget::Offscreen(*target) {
                self.pending_clear = None;
                self.bound = RenderTarget::Surface;
            }
        }
    }

    fn bind_target(&mut self, target: RenderTarget) {
        if self.bound != target {
            self.flush_clear();
        }
        self.bound = target;
    }

    fn attach_color(&mut self, target: TargetId, texture: TextureId) {
        if self.bound == RenderTarget::Offscreen(target) {
            self.flush_clear();
        }
        if let Some(attached) = self.targets.get_mut(&target) {
            *attached = Some(texture);
        }
    }

    fn bind_buffer_texture(&mut self, unit: u32, texture: TextureId) {
        match self.units.get_mut(unit as usize) {
            Some(bound) => *bound = Some(texture),
            None => tracing::warn!(unit, %texture, "no buffer sampler unit with this index"),
        }
    }

    fn use_program(&mut self, pass: usize) {
        self.active = pass;
    }

    fn uniform_location(&self, pass: usize, slot: usize) -> Option<UniformLocation> {
        self.programs.get(pass)?.as_ref()?;
        bindings::slot_location(&self.table, &self.layout, slot)
    }

    fn upload_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let slot = location.raw() as usize;
        let Some(entry) = self.table.slots().get(slot) else {
            return;
        };
        let is_sampler = entry.kind.is_sampler();
        let member = self.layout.member(slot);
        let Some(program) = self.programs.get_mut(self.active).and_then(Option::as_mut) else {
            return;
        };
        match (is_sampler, member) {
            (true, _) => {
                if let Some(stored) = program.sampler_units.get_mut(slot) {
                    *stored = bindings::sampler_unit(value);
                }
            }
            (false, Some(member)) => {
                if !program.block.write(member, value) {
                    tracing::trace!(slot, ?value, "uniform value does not match its declaration");
                }
            }
            (false, None) => {}
        }
    }

    fn set_viewport(&mut self, size: Extent) {
        self.viewport = size;
    }

    fn clear(&mut self, color: [f32; 4], _depth: bool) {
        // No target carries a depth attachment, so only the color clear applies.
        let [r, g, b, a] = color.map(f64::from);
        self.pending_clear = Some(wgpu::Color { r, g, b, a });
    }

    fn draw_points(&mut self, count: u32) -> Result<()> {
        let pass = self.active;
        let (view, format, attachment_size) = self.attachment()?;
        self.ensure_pipeline(pass, format)?;

        let program = self
            .programs
            .get(pass)
            .and_then(Option::as_ref)
            .ok_or(RenderError::UnknownProgram(pass))?;
        let bind_group = self.bind_group(program)?;
        let pipeline = match program.pipeline.as_ref() {
            Some((_, pipeline)) => pipeline,
            None => return Err(RenderError::UnknownProgram(pass)),
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pass encoder"),
            });
        let staging = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("uniform staging"),
                contents: program.block.as_bytes(),
                usage: wgpu::BufferUsages::COPY_SRC,
            });
        encoder.copy_buffer_to_buffer(
            &staging,
            0,
            &program.uniform_buffer,
            0,
            u64::from(self.layout.size()),
        );

        let load = match self.pending_clear.take() {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };
        let viewport = match attachment_size {
            Some(size) => Extent::new(
                self.viewport.width.min(size.width),
                self.viewport.height.min(size.height),
            ),
            None => self.viewport,
        };
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_viewport(
                0.0,
                0.0,
                viewport.width.max(1) as f32,
                viewport.height.max(1) as f32,
                0.0,
                1.0,
            );
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..count, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        tracing::trace!(pass, count, target = ?self.bound, "submitted pass");
        Ok(())
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        for (_, gpu) in self.textures.drain() {
            gpu.texture.destroy();
        }
    }
}
