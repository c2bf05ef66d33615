use std::time::Instant;

use passconfig::ShaderConfig;
use tracing::{debug, info};

use crate::audio::{AudioFeed, AudioFrame, AudioTextures};
use crate::backend::{Extent, GpuBackend};
use crate::clock::FrameClock;
use crate::error::Result;
use crate::input::WindowState;
use crate::resources::BufferResources;
use crate::scheduler::PassScheduler;
use crate::uniforms::{FrameInputs, UniformTable};

/// Drives the multi-pass pipeline for one window.
///
/// A frame is: pick up audio, handle a pending resize, tick the clock, run
/// every user pass in render order, composite to the surface, advance the
/// frame counter. [`Renderer::frame`] does all of it; the individual steps
/// are public for callers with their own loop.
pub struct Renderer<B: GpuBackend> {
    backend: B,
    config: ShaderConfig,
    table: UniformTable,
    scheduler: PassScheduler,
    resources: BufferResources,
    audio: AudioTextures,
    clock: FrameClock,
    size: Extent,
}

impl<B: GpuBackend> Renderer<B> {
    pub fn new(mut backend: B, config: ShaderConfig, window: &WindowState) -> Result<Self> {
        config.validate()?;
        backend.set_blend(config.blend);

        let table = UniformTable::new(&config);
        let scheduler = PassScheduler::new(&config);
        let size = window.extent();

        let mut audio = AudioTextures::create(&mut backend)?;
        let resources = match BufferResources::create(&mut backend, &config.buffers, size) {
            Ok(resources) => resources,
            Err(err) => {
                audio.destroy(&mut backend);
                return Err(err);
            }
        };

        info!(
            buffers = config.num_buffers(),
            passes = scheduler.order().len(),
            uniforms = table.len(),
            width = size.width,
            height = size.height,
            blend = config.blend,
            "renderer ready"
        );

        Ok(Self {
            backend,
            config,
            table,
            scheduler,
            resources,
            audio,
            clock: FrameClock::new(),
            size,
        })
    }

    /// Copies all four channels of `frame` into the audio textures.
    pub fn update_audio(&mut self, frame: &AudioFrame) {
        self.audio.upload(&mut self.backend, frame);
    }

    /// Uploads the newest frame published on `feed`, if any. The textures keep
    /// their previous contents otherwise.
    pub fn poll_audio(&mut self, feed: &AudioFeed) -> bool {
        match feed.latest() {
            Some(frame) => {
                self.update_audio(&frame);
                true
            }
            None => false,
        }
    }

    /// Rebuilds window-sized buffers and restarts the clock when the window
    /// reports a size change. The flag is cleared.
    pub fn handle_window(&mut self, window: &mut WindowState) -> Result<bool> {
        if !window.take_size_changed() {
            return Ok(false);
        }
        let size = window.extent();
        let rebuilt = self
            .resources
            .resize(&mut self.backend, &self.config.buffers, size)?;
        self.size = size;
        self.clock.reset();
        info!(
            width = size.width,
            height = size.height,
            rebuilt,
            "window resized; clock reset"
        );
        Ok(true)
    }

    pub fn render(&mut self, window: &WindowState) -> Result<()> {
        self.render_at(window, Instant::now())
    }

    /// Renders one frame with the clock sampled at `now`.
    pub fn render_at(&mut self, window: &WindowState, now: Instant) -> Result<()> {
        let time = self.clock.tick_at(now);
        let size = window.extent();
        let inputs = FrameInputs {
            mouse: window.mouse_position(),
            mouse_down: window.mouse_down(),
            resolution: [size.width as f32, size.height as f32],
            time,
            frame: self.clock.frame_uniform(),
        };

        self.scheduler.run(
            &mut self.backend,
            &mut self.resources,
            &self.table,
            &self.config,
            &inputs,
            size,
        )?;
        self.clock.advance_at(now);
        Ok(())
    }

    /// One complete frame: audio, resize check, passes, composite.
    pub fn frame(&mut self, window: &mut WindowState, audio: Option<&AudioFrame>) -> Result<()> {
        if let Some(frame) = audio {
            self.update_audio(frame);
        }
        self.handle_window(window)?;
        self.render(window)
    }

    /// Releases every GPU resource the renderer created. Safe to call more
    /// than once.
    pub fn destroy(&mut self) {
        self.resources.destroy(&mut self.backend);
        self.audio.destroy(&mut self.backend);
        debug!("renderer destroyed");
    }

    pub fn frame_counter(&self) -> u32 {
        self.clock.frame()
    }

    pub fn elapsed(&self) -> f32 {
        self.clock.elapsed()
    }

    pub fn frames_per_second(&self) -> f32 {
        self.clock.frames_per_second()
    }

    pub fn last_drawn(&self, buffer: usize) -> Option<usize> {
        self.resources.last_drawn(buffer)
    }

    pub fn resources(&self) -> &BufferResources {
        &self.resources
    }

    pub fn uniforms(&self) -> &UniformTable {
        &self.table
    }

    pub fn config(&self) -> &ShaderConfig {
        &self.config
    }

    /// Last size the buffers were built for.
    pub fn size(&self) -> Extent {
        self.size
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: GpuBackend> Drop for Renderer<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
