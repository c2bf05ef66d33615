//! The seam between the pass pipeline and a graphics API.
//!
//! [`GpuBackend`] lists exactly the operations the pipeline issues: allocate
//! and repoint textures and render targets, bind sampler units, resolve and
//! upload uniforms, and draw points. The pipeline owns resource identity
//! (which handle plays which role); the backend owns the actual GPU objects.

use std::fmt;

use crate::error::Result;

/// Opaque handle to a texture owned by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(u32);

impl TextureId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

/// Opaque handle to an off-screen render target (a framebuffer object).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetId(u32);

impl TargetId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Where the next draw lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderTarget {
    /// The visible surface (the default framebuffer).
    Surface,
    Offscreen(TargetId),
}

/// Pixel dimensions of a texture or viewport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for Extent {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Backend-specific location of a uniform inside one program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation(u32);

impl UniformLocation {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// A value written to a single uniform location.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl UniformValue {
    /// Picks the upload shape from the number of components. Anything outside
    /// one to four components has no shape and yields `None`.
    pub fn from_components(values: &[f32]) -> Option<Self> {
        match *values {
            [x] => Some(Self::Float(x)),
            [x, y] => Some(Self::Vec2([x, y])),
            [x, y, z] => Some(Self::Vec3([x, y, z])),
            [x, y, z, w] => Some(Self::Vec4([x, y, z, w])),
            _ => None,
        }
    }

    pub fn components(&self) -> usize {
        match self {
            Self::Int(_) | Self::Float(_) => 1,
            Self::Vec2(_) => 2,
            Self::Vec3(_) => 3,
            Self::Vec4(_) => 4,
        }
    }
}

/// Graphics operations required by the pass pipeline.
///
/// Program selection and uniform lookup live here too: with most APIs the
/// currently selected program is device state, and the location of a uniform
/// is only meaningful relative to it.
pub trait GpuBackend {
    /// Enables `src_alpha, one_minus_src_alpha` blending for every pass.
    fn set_blend(&mut self, enabled: bool);

    /// Allocates an RGBA32F 2D texture with linear filtering.
    fn create_color_texture(&mut self, size: Extent) -> Result<TextureId>;

    /// Reallocates storage for `texture` at `size`. Contents are undefined
    /// afterwards; the handle stays the same.
    fn resize_color_texture(&mut self, texture: TextureId, size: Extent) -> Result<()>;

    /// Allocates a single-channel float 1D texture of `len` texels and binds
    /// it to the 1D target of sampler unit `unit`.
    fn create_audio_texture(&mut self, unit: u32, len: usize) -> Result<TextureId>;

    /// Overwrites the full contents of a 1D audio texture.
    fn write_audio_texture(&mut self, texture: TextureId, samples: &[f32]);

    fn delete_textures(&mut self, textures: &[TextureId]);

    fn create_target(&mut self) -> Result<TargetId>;

    fn delete_targets(&mut self, targets: &[TargetId]);

    fn bind_target(&mut self, target: RenderTarget);

    /// Points the color attachment of `target` at `texture`.
    fn attach_color(&mut self, target: TargetId, texture: TextureId);

    /// Binds a 2D buffer texture to sampler unit `unit`.
    fn bind_buffer_texture(&mut self, unit: u32, texture: TextureId);

    /// Activates the program of pass `pass`; pass `N` (the number of user
    /// buffers) is the final image pass.
    fn use_program(&mut self, pass: usize);

    /// Location of uniform slot `slot` in the program of pass `pass`, or
    /// `None` when the program does not use it.
    fn uniform_location(&self, pass: usize, slot: usize) -> Option<UniformLocation>;

    /// Writes to the currently active program.
    fn upload_uniform(&mut self, location: UniformLocation, value: UniformValue);

    fn set_viewport(&mut self, size: Extent);

    /// Clears the bound target. `depth` requests a depth clear as well; it is
    /// harmless when the target has no depth attachment.
    fn clear(&mut self, color: [f32; 4], depth: bool);

    /// Draws `count` point primitives with the active program into the bound
    /// target.
    fn draw_points(&mut self, count: u32) -> Result<()>;
}
