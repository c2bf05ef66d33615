//! Executes the user passes in render order, then the final image pass.

use passconfig::{BufferDescriptor, ShaderConfig};
use tracing::{trace, warn};

use crate::backend::{Extent, GpuBackend, RenderTarget};
use crate::error::{RenderError, Result};
use crate::resources::BufferResources;
use crate::uniforms::{FrameInputs, UniformTable};

/// Runs one frame's worth of passes.
///
/// Each user pass samples the readable half of its own buffer and writes the
/// other half; afterwards the halves swap and the finished texture is
/// rebound, so later passes in the same frame read the new result.
#[derive(Debug, Clone)]
pub struct PassScheduler {
    order: Vec<usize>,
}

impl PassScheduler {
    /// Takes the render order as configured. Repeated entries render a buffer
    /// more than once per frame; buffers left out keep their last contents.
    pub fn new(config: &ShaderConfig) -> Self {
        for (buffer, count) in config.repeated_buffers() {
            warn!(buffer, count, "buffer is rendered more than once per frame");
        }
        for buffer in config.unused_buffers() {
            warn!(buffer, "buffer is not part of the render order");
        }
        Self {
            order: config.render_order.clone(),
        }
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Runs every user pass followed by the composite pass. Returns the number
    /// of passes drawn.
    pub fn run<B: GpuBackend>(
        &self,
        backend: &mut B,
        resources: &mut BufferResources,
        table: &UniformTable,
        config: &ShaderConfig,
        inputs: &FrameInputs,
        window: Extent,
    ) -> Result<usize> {
        for &index in &self.order {
            let descriptor = config
                .buffer(index)
                .ok_or(RenderError::UnknownBuffer(index))?;
            run_buffer_pass(backend, resources, table, descriptor, index, inputs)?;
        }
        run_composite(backend, table, &config.image, config.num_buffers(), inputs, window)?;
        Ok(self.order.len() + 1)
    }
}

fn run_buffer_pass<B: GpuBackend>(
    backend: &mut B,
    resources: &mut BufferResources,
    table: &UniformTable,
    descriptor: &BufferDescriptor,
    index: usize,
    inputs: &FrameInputs,
) -> Result<()> {
    let unit = index as u32;
    let (target, pair) = resources
        .slot_mut(index)
        .ok_or(RenderError::UnknownBuffer(index))?;

    backend.use_program(index);
    table.upload(backend, index, inputs, descriptor.geom_iters);
    backend.bind_buffer_texture(unit, pair.readable());

    backend.bind_target(RenderTarget::Offscreen(target));
    backend.attach_color(target, pair.writable());
    debug_assert_ne!(pair.readable(), pair.writable());

    backend.set_viewport(pair.size());
    backend.clear(opaque(descriptor.clear_color), true);
    backend.draw_points(descriptor.geom_iters)?;

    pair.flip();
    backend.bind_buffer_texture(unit, pair.readable());
    trace!(buffer = index, readable = ?pair.readable_half(), "buffer pass done");
    Ok(())
}

fn run_composite<B: GpuBackend>(
    backend: &mut B,
    table: &UniformTable,
    image: &BufferDescriptor,
    pass: usize,
    inputs: &FrameInputs,
    window: Extent,
) -> Result<()> {
    backend.use_program(pass);
    table.upload(backend, pass, inputs, image.geom_iters);
    backend.bind_target(RenderTarget::Surface);
    backend.set_viewport(window);
    backend.clear(opaque(image.clear_color), true);
    backend.draw_points(image.geom_iters)
}

fn opaque([r, g, b]: [f32; 3]) -> [f32; 4] {
    [r, g, b, 1.0]
}

#[cfg(test)]
mod tests {
    use passconfig::BufferDescriptor;

    use super::*;
    use crate::recording::{Call, RecordingBackend};

    const WINDOW: Extent = Extent::new(640, 480);

    fn config(order: Vec<usize>) -> ShaderConfig {
        ShaderConfig {
            buffers: vec![
                BufferDescriptor::window_sized("a")
                    .with_geom_iters(10)
                    .with_clear_color([0.25, 0.5, 0.75]),
                BufferDescriptor::fixed("b", 32, 16).with_geom_iters(20),
            ],
            render_order: order,
            image: BufferDescriptor::window_sized("image").with_geom_iters(3),
            ..Default::default()
        }
    }

    fn run_frame(order: Vec<usize>) -> (RecordingBackend, BufferResources, usize) {
        let config = config(order);
        let mut backend = RecordingBackend::new();
        let mut resources =
            BufferResources::create(&mut backend, &config.buffers, WINDOW).expect("resources");
        let table = UniformTable::new(&config);
        let scheduler = PassScheduler::new(&config);
        backend.clear_calls();
        let passes = scheduler
            .run(
                &mut backend,
                &mut resources,
                &table,
                &config,
                &FrameInputs::default(),
                WINDOW,
            )
            .expect("frame");
        (backend, resources, passes)
    }

    #[test]
    fn user_passes_follow_render_order_then_composite() {
        let (mut backend, mut resources, passes) = run_frame(vec![1, 0]);

        assert_eq!(passes, 3);
        let draws = backend.draws();
        let programs: Vec<Option<usize>> = draws.iter().map(|d| d.program).collect();
        assert_eq!(programs, vec![Some(1), Some(0), Some(2)]);
        assert_eq!(draws[0].count, 20);
        assert_eq!(draws[0].viewport, Extent::new(32, 16));
        assert_eq!(draws[1].count, 10);
        assert_eq!(draws[1].viewport, WINDOW);
        assert_eq!(draws[2].target, RenderTarget::Surface);
        assert_eq!(draws[2].viewport, WINDOW);
        assert_eq!(draws[2].count, 3);
        resources.destroy(&mut backend);
    }

    #[test]
    fn no_pass_samples_the_texture_it_writes() {
        let (mut backend, mut resources, _) = run_frame(vec![0, 1, 0, 0]);

        for draw in backend.draws() {
            let Some(attachment) = draw.attachment else {
                continue;
            };
            assert!(
                !draw.units.values().any(|bound| *bound == attachment),
                "pass {:?} samples its own attachment",
                draw.program
            );
        }
        resources.destroy(&mut backend);
    }

    #[test]
    fn later_passes_read_the_finished_half() {
        let (mut backend, mut resources, _) = run_frame(vec![0, 1]);

        let first = resources.pair(0).expect("pair");
        let draws = backend.draws();
        // Pass 0 wrote what is now readable; pass 1 must have seen it on unit 0.
        assert_eq!(draws[0].attachment, Some(first.readable()));
        assert_eq!(draws[1].units.get(&0), Some(&first.readable()));
        resources.destroy(&mut backend);
    }

    #[test]
    fn repeated_buffer_flips_once_per_pass() {
        for repeats in 1..=5usize {
            let (mut backend, mut resources, _) = run_frame(vec![0; repeats]);
            assert_eq!(resources.last_drawn(0), Some(repeats % 2));
            assert_eq!(resources.last_drawn(1), Some(0));
            resources.destroy(&mut backend);
        }
    }

    #[test]
    fn clears_with_opaque_descriptor_color_and_depth() {
        let (mut backend, mut resources, _) = run_frame(vec![0]);

        let clears: Vec<&Call> = backend
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::Clear { .. }))
            .collect();
        assert_eq!(
            clears[0],
            &Call::Clear {
                color: [0.25, 0.5, 0.75, 1.0],
                depth: true
            }
        );
        assert_eq!(clears.len(), 2);
        resources.destroy(&mut backend);
    }

    #[test]
    fn missing_buffers_are_reported_by_index() {
        let config = config(vec![0, 5]);
        let mut backend = RecordingBackend::new();
        let mut resources =
            BufferResources::create(&mut backend, &config.buffers, WINDOW).expect("resources");
        let table = UniformTable::new(&config);
        let inputs = FrameInputs::default();

        let err = PassScheduler::new(&config)
            .run(&mut backend, &mut resources, &table, &config, &inputs, WINDOW)
            .unwrap_err();
        assert!(matches!(err, RenderError::UnknownBuffer(5)));

        resources.destroy(&mut backend);
        let err = PassScheduler::new(&config)
            .run(&mut backend, &mut resources, &table, &config, &inputs, WINDOW)
            .unwrap_err();
        assert!(matches!(err, RenderError::UnknownBuffer(0)));
    }
}
