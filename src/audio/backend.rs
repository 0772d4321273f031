use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::mpsc;

/// Block of mono samples delivered by a capture backend
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    /// Mono float samples in `[-1.0, 1.0)`
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Rate the backend must deliver (resampling if the device differs)
    pub sample_rate: u32,
    /// Samples per outbound frame
    pub frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // Live API input rate
            frame_size: 4096,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - `device`: default microphone via cpal (feature `device`)
/// - `file`: WAV file replayed as microphone input
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive mono blocks at the
    /// configured rate. The channel closes when capture ends.
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>>;

    /// Stop capturing audio. Stopping a stopped backend is a no-op.
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Handle for one buffer scheduled on a playback sink
pub type VoiceId = u64;

/// Planar float audio ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

/// Output device with a clock and time-stamped buffer playback
///
/// Completion of each played buffer is reported through the
/// `finished` receiver of the [`PlaybackOutput`] that created the sink.
pub trait PlaybackSink: Send + Sync {
    /// Rate buffers are decoded at
    fn sample_rate(&self) -> u32;

    /// Current time of the output clock in seconds
    fn current_time(&self) -> f64;

    /// Play `buffer` starting at `start_at` (output clock seconds).
    /// Start times in the past play immediately.
    fn play(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<VoiceId>;

    /// Stop a voice. Unknown or finished voices are ignored.
    fn stop(&mut self, id: VoiceId);

    /// Release the device. Idempotent.
    fn close(&mut self);
}

/// An opened playback sink plus its completion notifications
pub struct PlaybackOutput {
    pub sink: Box<dyn PlaybackSink>,
    pub finished: mpsc::UnboundedReceiver<VoiceId>,
}

/// Opens the capture and playback sides of a live session
pub trait AudioDeviceFactory: Send + Sync {
    fn open_capture(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureBackend>>;

    fn open_playback(&self, sample_rate: u32) -> Result<PlaybackOutput>;
}

/// Where live session input comes from
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Default microphone (feature `device`)
    Microphone,
    /// WAV file replayed in real time
    File(PathBuf),
}

/// Where synthesized speech goes
#[derive(Debug, Clone)]
pub enum AudioSink {
    /// Default output device (feature `device`)
    Speaker,
    /// WAV file recording of everything scheduled
    File(PathBuf),
}

/// Audio backend factory
pub struct AudioBackendFactory {
    source: AudioSource,
    sink: AudioSink,
}

impl AudioBackendFactory {
    pub fn new(source: AudioSource, sink: AudioSink) -> Self {
        Self { source, sink }
    }
}

impl AudioDeviceFactory for AudioBackendFactory {
    fn open_capture(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureBackend>> {
        match &self.source {
            AudioSource::Microphone => {
                #[cfg(feature = "device")]
                {
                    let backend = super::device::MicrophoneBackend::new(config.clone())?;
                    Ok(Box::new(backend))
                }

                #[cfg(not(feature = "device"))]
                {
                    let _ = config;
                    anyhow::bail!("Microphone capture requires the `device` feature")
                }
            }

            AudioSource::File(path) => {
                let backend = super::file::WavCaptureBackend::open(path, config.clone())?;
                Ok(Box::new(backend))
            }
        }
    }

    fn open_playback(&self, sample_rate: u32) -> Result<PlaybackOutput> {
        match &self.sink {
            AudioSink::Speaker => {
                #[cfg(feature = "device")]
                {
                    super::device::SpeakerSink::open(sample_rate)
                }

                #[cfg(not(feature = "device"))]
                {
                    let _ = sample_rate;
                    anyhow::bail!("Speaker playback requires the `device` feature")
                }
            }

            AudioSink::File(path) => super::file::WavPlaybackSink::create(path, sample_rate),
        }
    }
}
