//! Multi-pass feedback renderer for audio-reactive visuals.
//!
//! A frame runs every configured buffer pass in render order and then one
//! image pass onto the window surface:
//!
//! ```text
//!   AudioPublisher ──▶ AudioFeed ──▶ audio textures (units 0..4)
//!                                          │
//!   WindowState ──▶ Renderer::frame ──▶ resize check ──▶ clock tick
//!                                          │
//!                                          ▼
//!        for r in render_order:  read pair[r].readable ─▶ draw ─▶ pair[r].writable, flip
//!                                          │
//!                                          ▼
//!                              image pass ──▶ surface
//! ```
//!
//! Each buffer owns a ping-pong texture pair, so a pass can sample its own
//! previous output while writing the next one. Every pass sees the same
//! uniform layout (see [`UniformTable`]).
//!
//! The pipeline talks to the GPU through [`GpuBackend`]; [`gpu::WgpuBackend`]
//! is the `wgpu` implementation and [`input::WindowState`] adapts `winit`
//! window events.

mod audio;
mod backend;
mod clock;
mod error;
pub mod gpu;
pub mod input;
#[cfg(test)]
mod recording;
mod renderer;
mod resources;
mod scheduler;
mod uniforms;

pub use audio::{
    audio_channel, AudioChannel, AudioFeed, AudioFrame, AudioPublisher, AUDIO_BUFFER_SIZE,
};
pub use backend::{
    Extent, GpuBackend, RenderTarget, TargetId, TextureId, UniformLocation, UniformValue,
};
pub use clock::FrameClock;
pub use error::{RenderError, Result};
pub use input::{MouseState, WindowState};
pub use passconfig::{
    BufferDescriptor, ConfigError, ShaderConfig, UniformDefinition, RESERVED_NAMES,
};
pub use renderer::Renderer;
pub use resources::{BufferResources, Half, PingPong};
pub use scheduler::PassScheduler;
pub use uniforms::{
    Builtin, FrameInputs, SlotKind, UniformSlot, UniformTable, ValueShape, NUM_BUILTIN_UNIFORMS,
};
