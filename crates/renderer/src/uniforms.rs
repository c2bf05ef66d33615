//! Uniform slot table and the per-pass upload protocol.
//!
//! Every program sees the same slot numbering:
//!
//! ```text
//!   0..6                 builtins (mouse, mouse down, resolution, time, frame, geom iters)
//!   6..10                audio samplers (units 0..4)
//!   10..10+N             one sampler per user buffer (unit = buffer index)
//!   10+N..10+N+U         user uniforms, in configuration order
//! ```
//!
//! The table is built once from the configuration; uploads walk it in order.

use passconfig::ShaderConfig;
use tracing::{trace, warn};

use crate::audio::AudioChannel;
use crate::backend::{GpuBackend, UniformValue};

/// Slots occupied by builtins and audio samplers; user buffer samplers
/// start here.
pub const NUM_BUILTIN_UNIFORMS: usize = 10;

const AUDIO_SAMPLER_OFFSET: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Mouse,
    MouseDown,
    Resolution,
    Time,
    Frame,
    GeomIters,
}

impl Builtin {
    pub const ALL: [Builtin; 6] = [
        Builtin::Mouse,
        Builtin::MouseDown,
        Builtin::Resolution,
        Builtin::Time,
        Builtin::Frame,
        Builtin::GeomIters,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Mouse => "iMouse",
            Builtin::MouseDown => "iMouseDown",
            Builtin::Resolution => "iResolution",
            Builtin::Time => "iTime",
            Builtin::Frame => "iFrame",
            Builtin::GeomIters => "iNumGeomIters",
        }
    }
}

/// What a slot carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Builtin(Builtin),
    AudioSampler(AudioChannel),
    BufferSampler(usize),
    /// The `index`-th user uniform with `components` values. Only one to
    /// four components are ever uploaded.
    User { index: usize, components: usize },
}

/// Scalar shape of a value slot as laid out in a uniform block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueShape {
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl SlotKind {
    /// Shape of the value stored in this slot; `None` for samplers and for
    /// user uniforms whose arity has no shape.
    pub fn value_shape(&self) -> Option<ValueShape> {
        match self {
            SlotKind::Builtin(Builtin::Mouse | Builtin::Resolution) => Some(ValueShape::Vec2),
            SlotKind::Builtin(Builtin::MouseDown | Builtin::Frame) => Some(ValueShape::Int),
            SlotKind::Builtin(Builtin::Time | Builtin::GeomIters) => Some(ValueShape::Float),
            SlotKind::AudioSampler(_) | SlotKind::BufferSampler(_) => None,
            SlotKind::User { components, .. } => match components {
                1 => Some(ValueShape::Float),
                2 => Some(ValueShape::Vec2),
                3 => Some(ValueShape::Vec3),
                4 => Some(ValueShape::Vec4),
                _ => None,
            },
        }
    }

    pub fn is_sampler(&self) -> bool {
        matches!(self, SlotKind::AudioSampler(_) | SlotKind::BufferSampler(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UniformSlot {
    pub name: String,
    pub kind: SlotKind,
}

/// Per-frame values shared by every pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameInputs {
    pub mouse: [f32; 2],
    pub mouse_down: bool,
    pub resolution: [f32; 2],
    pub time: f32,
    pub frame: i32,
}

#[derive(Clone, Debug)]
pub struct UniformTable {
    slots: Vec<UniformSlot>,
    user_values: Vec<Option<UniformValue>>,
    num_buffers: usize,
}

impl UniformTable {
    pub fn new(config: &ShaderConfig) -> Self {
        let num_buffers = config.buffers.len();
        let mut slots =
            Vec::with_capacity(NUM_BUILTIN_UNIFORMS + num_buffers + config.uniforms.len());

        for builtin in Builtin::ALL {
            slots.push(UniformSlot {
                name: builtin.name().to_string(),
                kind: SlotKind::Builtin(builtin),
            });
        }
        debug_assert_eq!(slots.len(), AUDIO_SAMPLER_OFFSET);
        for channel in AudioChannel::ALL {
            slots.push(UniformSlot {
                name: channel.uniform_name().to_string(),
                kind: SlotKind::AudioSampler(channel),
            });
        }
        debug_assert_eq!(slots.len(), NUM_BUILTIN_UNIFORMS);

        for (index, buffer) in config.buffers.iter().enumerate() {
            slots.push(UniformSlot {
                name: buffer.name.clone(),
                kind: SlotKind::BufferSampler(index),
            });
        }

        let mut user_values = Vec::with_capacity(config.uniforms.len());
        for (index, uniform) in config.uniforms.iter().enumerate() {
            let value = UniformValue::from_components(&uniform.values);
            if value.is_none() {
                warn!(
                    uniform = %uniform.name,
                    components = uniform.values.len(),
                    "uniform needs one to four values; it will not be uploaded"
                );
            }
            user_values.push(value);
            slots.push(UniformSlot {
                name: uniform.name.clone(),
                kind: SlotKind::User {
                    index,
                    components: uniform.values.len(),
                },
            });
        }

        Self {
            slots,
            user_values,
            num_buffers,
        }
    }

    pub fn slots(&self) -> &[UniformSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn num_buffers(&self) -> usize {
        self.num_buffers
    }

    /// First slot of the user uniform block.
    pub fn user_offset(&self) -> usize {
        NUM_BUILTIN_UNIFORMS + self.num_buffers
    }

    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name == name)
    }

    /// Value uploaded to `slot` for a pass drawing `geom_iters` points, or
    /// `None` when the slot carries nothing uploadable.
    pub fn value(
        &self,
        slot: &UniformSlot,
        inputs: &FrameInputs,
        geom_iters: u32,
    ) -> Option<UniformValue> {
        match slot.kind {
            SlotKind::Builtin(Builtin::Mouse) => Some(UniformValue::Vec2(inputs.mouse)),
            SlotKind::Builtin(Builtin::MouseDown) => {
                Some(UniformValue::Int(inputs.mouse_down as i32))
            }
            SlotKind::Builtin(Builtin::Resolution) => Some(UniformValue::Vec2(inputs.resolution)),
            SlotKind::Builtin(Builtin::Time) => Some(UniformValue::Float(inputs.time)),
            SlotKind::Builtin(Builtin::Frame) => Some(UniformValue::Int(inputs.frame)),
            SlotKind::Builtin(Builtin::GeomIters) => {
                Some(UniformValue::Float(geom_iters as f32))
            }
            SlotKind::AudioSampler(channel) => Some(UniformValue::Int(channel.unit() as i32)),
            SlotKind::BufferSampler(index) => Some(UniformValue::Int(index as i32)),
            SlotKind::User { index, .. } => self.user_values.get(index).copied().flatten(),
        }
    }

    /// Uploads every slot to the active program of `pass`, in slot order.
    /// Slots the program does not expose are skipped. Returns the number of
    /// uploads issued.
    pub fn upload<B: GpuBackend>(
        &self,
        backend: &mut B,
        pass: usize,
        inputs: &FrameInputs,
        geom_iters: u32,
    ) -> usize {
        let mut uploaded = 0;
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(value) = self.value(slot, inputs, geom_iters) else {
                continue;
            };
            match backend.uniform_location(pass, index) {
                Some(location) => {
                    backend.upload_uniform(location, value);
                    uploaded += 1;
                }
                None => trace!(
                    pass,
                    slot = index,
                    name = %slot.name,
                    "uniform not present in program"
                ),
            }
        }
        uploaded
    }
}
