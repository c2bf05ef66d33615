//! `wgpu` implementation of the backend seam.
//!
//! - `context` owns the instance, surface, device and queue of a window.
//! - `uniforms` packs the uniform table into a std140 block.
//! - `prelude` generates the GLSL declarations every program is compiled with.
//! - `bindings` resolves sampler slots and uploaded units to bind-group entries.
//! - `pipeline` holds the bind-group layout and point-list pipeline builders.
//! - `backend` implements [`GpuBackend`](crate::GpuBackend) on top of them.

mod backend;
mod bindings;
mod context;
mod pipeline;
mod prelude;
mod uniforms;

use anyhow::{Context as AnyhowContext, Result};

use crate::audio::AudioFrame;
use crate::input::WindowState;
use crate::renderer::Renderer;

pub use backend::WgpuBackend;
pub use context::GpuContext;
pub use pipeline::{AUDIO_BINDING_BASE, BUFFER_BINDING_BASE, SAMPLER_BINDING, UNIFORM_BINDING};
pub use prelude::{prelude, ProgramSource};
pub use uniforms::{Member, UniformBlock, UniformLayout};

/// Renders and presents one frame into the context's surface, reconfiguring
/// the surface first when the window was resized.
pub fn present_frame(
    context: &mut GpuContext,
    renderer: &mut Renderer<WgpuBackend>,
    window: &mut WindowState,
    audio: Option<&AudioFrame>,
) -> Result<()> {
    if window.size_changed() {
        context.resize(window.size());
    }
    let frame = context.acquire()?;
    let view = frame
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());
    renderer.backend_mut().set_surface_view(view);
    let result = renderer.frame(window, audio);
    renderer.backend_mut().take_surface_view();
    result.context("failed to render frame")?;
    frame.present();
    Ok(())
}
