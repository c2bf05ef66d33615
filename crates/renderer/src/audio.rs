//! Audio samples handed from the analysis thread to the render thread.
//!
//! The producer publishes whole [`AudioFrame`]s through a single-slot channel
//! where the newest frame replaces one the renderer has not picked up yet.
//! The render thread never touches a producer-owned lock: it takes the frame
//! out of the slot and copies it into four persistent 1D textures.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use tracing::debug;

use crate::backend::{GpuBackend, TextureId};
use crate::error::Result;

/// Samples per channel. Every frame and every audio texture has this length.
pub const AUDIO_BUFFER_SIZE: usize = 2048;

type Samples = Box<[f32; AUDIO_BUFFER_SIZE]>;

/// The four audio channels, in sampler-unit order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AudioChannel {
    TimeRight,
    TimeLeft,
    FreqRight,
    FreqLeft,
}

impl AudioChannel {
    pub const ALL: [AudioChannel; 4] = [
        AudioChannel::TimeRight,
        AudioChannel::TimeLeft,
        AudioChannel::FreqRight,
        AudioChannel::FreqLeft,
    ];

    /// Sampler unit the channel's 1D texture is bound to.
    pub fn unit(self) -> u32 {
        match self {
            AudioChannel::TimeRight => 0,
            AudioChannel::TimeLeft => 1,
            AudioChannel::FreqRight => 2,
            AudioChannel::FreqLeft => 3,
        }
    }

    pub fn uniform_name(self) -> &'static str {
        match self {
            AudioChannel::TimeRight => "iSoundR",
            AudioChannel::TimeLeft => "iSoundL",
            AudioChannel::FreqRight => "iFreqR",
            AudioChannel::FreqLeft => "iFreqL",
        }
    }
}

/// One snapshot of the analyser output: time-domain samples and frequency
/// magnitudes for both stereo channels.
#[derive(Clone, PartialEq)]
pub struct AudioFrame {
    pub time_left: Samples,
    pub time_right: Samples,
    pub freq_left: Samples,
    pub freq_right: Samples,
}

impl AudioFrame {
    pub fn silent() -> Self {
        Self {
            time_left: Box::new([0.0; AUDIO_BUFFER_SIZE]),
            time_right: Box::new([0.0; AUDIO_BUFFER_SIZE]),
            freq_left: Box::new([0.0; AUDIO_BUFFER_SIZE]),
            freq_right: Box::new([0.0; AUDIO_BUFFER_SIZE]),
        }
    }

    pub fn channel(&self, channel: AudioChannel) -> &[f32; AUDIO_BUFFER_SIZE] {
        match channel {
            AudioChannel::TimeRight => &self.time_right,
            AudioChannel::TimeLeft => &self.time_left,
            AudioChannel::FreqRight => &self.freq_right,
            AudioChannel::FreqLeft => &self.freq_left,
        }
    }

    pub fn channel_mut(&mut self, channel: AudioChannel) -> &mut [f32; AUDIO_BUFFER_SIZE] {
        match channel {
            AudioChannel::TimeRight => &mut self.time_right,
            AudioChannel::TimeLeft => &mut self.time_left,
            AudioChannel::FreqRight => &mut self.freq_right,
            AudioChannel::FreqLeft => &mut self.freq_left,
        }
    }
}

impl Default for AudioFrame {
    fn default() -> Self {
        Self::silent()
    }
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("len", &AUDIO_BUFFER_SIZE)
            .finish()
    }
}

/// Creates the producer and consumer ends of the audio hand-off.
pub fn audio_channel() -> (AudioPublisher, AudioFeed) {
    let (sender, receiver) = bounded(1);
    let publisher = AudioPublisher {
        sender,
        stale: receiver.clone(),
    };
    (publisher, AudioFeed { receiver })
}

/// Producer end, owned by the analysis thread.
pub struct AudioPublisher {
    sender: Sender<AudioFrame>,
    stale: Receiver<AudioFrame>,
}

impl AudioPublisher {
    /// Publishes `frame`, replacing a frame the renderer has not consumed.
    /// The replaced frame is returned so its storage can be reused.
    pub fn publish(&self, frame: AudioFrame) -> Option<AudioFrame> {
        let mut frame = frame;
        let mut displaced = None;
        loop {
            match self.sender.try_send(frame) {
                Ok(()) => return displaced,
                Err(TrySendError::Full(returned)) => {
                    frame = returned;
                    if let Ok(old) = self.stale.try_recv() {
                        displaced = Some(old);
                    }
                }
                // `stale` keeps a receiver alive for as long as the publisher exists.
                Err(TrySendError::Disconnected(_)) => return displaced,
            }
        }
    }
}

impl std::fmt::Debug for AudioPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPublisher").finish()
    }
}

/// Consumer end, polled by the render thread once per tick.
#[derive(Clone)]
pub struct AudioFeed {
    receiver: Receiver<AudioFrame>,
}

impl AudioFeed {
    /// Takes the pending frame, if the producer published one since the last
    /// call.
    pub fn latest(&self) -> Option<AudioFrame> {
        match self.receiver.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl std::fmt::Debug for AudioFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFeed")
            .field("pending", &!self.receiver.is_empty())
            .finish()
    }
}

/// The four persistent 1D textures, one per [`AudioChannel`].
#[derive(Debug)]
pub(crate) struct AudioTextures {
    textures: Vec<TextureId>,
}

impl AudioTextures {
    pub(crate) fn create<B: GpuBackend>(backend: &mut B) -> Result<Self> {
        let mut textures = Vec::with_capacity(AudioChannel::ALL.len());
        for channel in AudioChannel::ALL {
            match backend.create_audio_texture(channel.unit(), AUDIO_BUFFER_SIZE) {
                Ok(texture) => textures.push(texture),
                Err(err) => {
                    backend.delete_textures(&textures);
                    return Err(err);
                }
            }
        }
        debug!(len = AUDIO_BUFFER_SIZE, "created audio textures");
        Ok(Self { textures })
    }

    /// Copies every channel of `frame` into its texture. Sizes always match:
    /// the frame's arrays and the textures share [`AUDIO_BUFFER_SIZE`].
    pub(crate) fn upload<B: GpuBackend>(&self, backend: &mut B, frame: &AudioFrame) {
        for (channel, texture) in AudioChannel::ALL.iter().zip(&self.textures) {
            backend.write_audio_texture(*texture, frame.channel(*channel));
        }
    }

    pub(crate) fn destroy<B: GpuBackend>(&mut self, backend: &mut B) {
        if self.textures.is_empty() {
            return;
        }
        backend.delete_textures(&self.textures);
        self.textures.clear();
    }

    #[cfg(test)]
    pub(crate) fn ids(&self) -> &[TextureId] {
        &self.textures
    }
}
