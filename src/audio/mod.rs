pub mod backend;
pub mod capture;
pub mod chunk;
pub mod convert;
pub mod file;
pub mod playback;

#[cfg(feature = "device")]
pub mod device;

pub use backend::{
    AudioBackendFactory, AudioBuffer, AudioDeviceFactory, AudioSink, AudioSource, CaptureBackend,
    CaptureConfig, CaptureFrame, PlaybackOutput, PlaybackSink, VoiceId,
};
pub use capture::{CapturePipeline, CaptureStats, OutboundQueue};
pub use chunk::FrameChunker;
pub use file::{WavCaptureBackend, WavPlaybackSink};
pub use playback::{PlaybackScheduler, ScheduledChunk};
