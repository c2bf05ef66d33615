//! GPU resources owned by the user buffers: one render target and one
//! ping-pong texture pair per buffer.

use std::fmt;

use passconfig::BufferDescriptor;
use tracing::{debug, warn};

use crate::backend::{Extent, GpuBackend, RenderTarget, TargetId, TextureId};
use crate::error::Result;

/// Names one half of a [`PingPong`] pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Half {
    #[default]
    First,
    Second,
}

impl Half {
    pub fn other(self) -> Half {
        match self {
            Half::First => Half::Second,
            Half::Second => Half::First,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Half::First => 0,
            Half::Second => 1,
        }
    }
}

/// Two equally sized textures that alternate between being sampled and being
/// rendered into. The writable half is always the one that is not readable.
#[derive(Debug, PartialEq, Eq)]
pub struct PingPong {
    textures: [TextureId; 2],
    readable: Half,
    size: Extent,
}

impl PingPong {
    fn new(textures: [TextureId; 2], size: Extent) -> Self {
        Self {
            textures,
            readable: Half::First,
            size,
        }
    }

    pub fn readable(&self) -> TextureId {
        self.textures[self.readable.index()]
    }

    pub fn writable(&self) -> TextureId {
        self.textures[self.readable.other().index()]
    }

    pub fn readable_half(&self) -> Half {
        self.readable
    }

    pub fn textures(&self) -> [TextureId; 2] {
        self.textures
    }

    pub fn size(&self) -> Extent {
        self.size
    }

    /// Makes the freshly written half readable.
    pub fn flip(&mut self) {
        self.readable = self.readable.other();
    }
}

#[derive(Debug)]
struct BufferSlot {
    target: TargetId,
    pair: PingPong,
    tracks_window: bool,
}

/// Render targets and textures of every user buffer.
///
/// The set is move-only: [`take`](Self::take) hands the resources to a new
/// owner and leaves an empty donor behind, and destroying an empty set does
/// nothing. Resources must be released with [`destroy`](Self::destroy); the
/// backend is needed for that, so dropping a non-empty set only logs.
#[derive(Default)]
pub struct BufferResources {
    slots: Vec<BufferSlot>,
}

impl BufferResources {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Allocates two textures and one render target per descriptor, attaches
    /// the first texture to the target and binds it to sampler unit `i`.
    /// Anything allocated before a failure is released again.
    pub fn create<B: GpuBackend>(
        backend: &mut B,
        descriptors: &[BufferDescriptor],
        window: Extent,
    ) -> Result<Self> {
        let mut resources = Self::empty();
        resources.slots.reserve(descriptors.len());
        for (index, descriptor) in descriptors.iter().enumerate() {
            match create_slot(backend, index, descriptor, window) {
                Ok(slot) => resources.slots.push(slot),
                Err(err) => {
                    resources.destroy(backend);
                    return Err(err);
                }
            }
        }
        Ok(resources)
    }

    /// Reallocates both textures of every window-tracking buffer at the new
    /// window size. Contents are not preserved; handles are. Returns how many
    /// buffers were rebuilt.
    pub fn resize<B: GpuBackend>(
        &mut self,
        backend: &mut B,
        descriptors: &[BufferDescriptor],
        window: Extent,
    ) -> Result<usize> {
        let mut rebuilt = 0;
        for (index, (slot, descriptor)) in self.slots.iter_mut().zip(descriptors).enumerate() {
            if !slot.tracks_window {
                continue;
            }
            let size = Extent::from(descriptor.effective_size(window.width, window.height));
            for texture in slot.pair.textures() {
                backend.resize_color_texture(texture, size)?;
            }
            slot.pair.size = size;
            rebuilt += 1;
            debug!(
                buffer = index,
                width = size.width,
                height = size.height,
                "resized buffer textures"
            );
        }
        Ok(rebuilt)
    }

    /// Releases every render target, then every texture, and makes the
    /// surface the active target again. Does nothing when empty.
    pub fn destroy<B: GpuBackend>(&mut self, backend: &mut B) {
        if self.slots.is_empty() {
            return;
        }
        let targets: Vec<TargetId> = self.slots.iter().map(|slot| slot.target).collect();
        let textures: Vec<TextureId> = self
            .slots
            .iter()
            .flat_map(|slot| slot.pair.textures())
            .collect();
        backend.delete_targets(&targets);
        backend.delete_textures(&textures);
        backend.bind_target(RenderTarget::Surface);
        debug!(buffers = self.slots.len(), "destroyed buffer resources");
        self.slots.clear();
    }

    /// Moves the resources out, leaving `self` empty.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Destroys the current resources and adopts those of `donor`, which is
    /// left empty.
    pub fn replace<B: GpuBackend>(&mut self, backend: &mut B, donor: &mut Self) {
        self.destroy(backend);
        self.slots = std::mem::take(&mut donor.slots);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn texture_count(&self) -> usize {
        self.slots.len() * 2
    }

    pub fn target_count(&self) -> usize {
        self.slots.len()
    }

    pub fn pair(&self, index: usize) -> Option<&PingPong> {
        self.slots.get(index).map(|slot| &slot.pair)
    }

    pub fn target(&self, index: usize) -> Option<TargetId> {
        self.slots.get(index).map(|slot| slot.target)
    }

    /// Index (0 or 1) of the half that buffer `index` last finished drawing
    /// into, which is also its readable half.
    pub fn last_drawn(&self, index: usize) -> Option<usize> {
        self.pair(index).map(|pair| pair.readable_half().index())
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> Option<(TargetId, &mut PingPong)> {
        self.slots
            .get_mut(index)
            .map(|slot| (slot.target, &mut slot.pair))
    }
}

fn create_slot<B: GpuBackend>(
    backend: &mut B,
    index: usize,
    descriptor: &BufferDescriptor,
    window: Extent,
) -> Result<BufferSlot> {
    let size = Extent::from(descriptor.effective_size(window.width, window.height));

    let first = backend.create_color_texture(size)?;
    let second = match backend.create_color_texture(size) {
        Ok(texture) => texture,
        Err(err) => {
            backend.delete_textures(&[first]);
            return Err(err);
        }
    };
    let target = match backend.create_target() {
        Ok(target) => target,
        Err(err) => {
            backend.delete_textures(&[first, second]);
            return Err(err);
        }
    };

    let pair = PingPong::new([first, second], size);
    backend.attach_color(target, pair.readable());
    backend.bind_buffer_texture(index as u32, pair.readable());
    debug!(
        buffer = index,
        name = %descriptor.name,
        width = size.width,
        height = size.height,
        window_sized = descriptor.is_window_size,
        "created buffer resources"
    );

    Ok(BufferSlot {
        target,
        pair,
        tracks_window: descriptor.is_window_size,
    })
}

impl fmt::Debug for BufferResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferResources")
            .field("buffers", &self.slots.len())
            .field("slots", &self.slots)
            .finish()
    }
}

impl Drop for BufferResources {
    fn drop(&mut self) {
        if !self.slots.is_empty() {
            warn!(
                buffers = self.slots.len(),
                "buffer resources dropped without destroy; GPU objects live until the backend is dropped"
            );
        }
    }
}
