// cpal microphone and speaker backends
//
// cpal streams are not `Send` on every platform, so each stream lives on
// its own thread and is dropped when that thread is told to stop. Device
// callbacks only talk to the rest of the crate through channels and a
// try-locked mixer; they never block.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::backend::{
    AudioBuffer, CaptureBackend, CaptureConfig, CaptureFrame, PlaybackOutput, PlaybackSink,
    VoiceId,
};
use super::convert::{downmix_to_mono, resample, StreamResampler};

/// Run a stream built by `build` on a dedicated thread.
///
/// Returns once the stream is playing (or failed to start). Sending on,
/// or dropping, the returned sender stops and drops the stream.
fn spawn_stream_thread<F>(name: &str, build: F) -> Result<std_mpsc::Sender<()>>
where
    F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
{
    let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let stream = match build().and_then(|stream| {
                stream.play().context("Failed to start audio stream")?;
                Ok(stream)
            }) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            let _ = stop_rx.recv();
            drop(stream);
        })
        .context("Failed to spawn audio thread")?;

    ready_rx
        .recv()
        .map_err(|_| anyhow!("Audio thread exited before the stream started"))??;

    Ok(stop_tx)
}

/// Default microphone capture
pub struct MicrophoneBackend {
    config: CaptureConfig,
    stop_tx: Option<std_mpsc::Sender<()>>,
    overflowed: Arc<AtomicBool>,
}

impl MicrophoneBackend {
    pub fn new(config: CaptureConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device found"))?;

        info!(
            "Microphone backend initialized: {} -> {}Hz mono",
            device.name().unwrap_or_default(),
            config.sample_rate
        );

        Ok(Self {
            config,
            stop_tx: None,
            overflowed: Arc::new(AtomicBool::new(false)),
        })
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: mpsc::Sender<CaptureFrame>,
    target_rate: u32,
    overflowed: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let mut resampler = StreamResampler::new(config.sample_rate.0, target_rate)?;
    let started = Instant::now();

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let floats: Vec<f32> = data.iter().map(|s| s.to_sample::<f32>()).collect();
            let mono = downmix_to_mono(&floats, channels);
            let samples = match resampler.process(&mono) {
                Ok(samples) => samples,
                Err(e) => {
                    error!("Dropping microphone block: {:#}", e);
                    return;
                }
            };
            if samples.is_empty() {
                return;
            }
            let frame = CaptureFrame {
                samples,
                sample_rate: target_rate,
                timestamp_ms: started.elapsed().as_millis() as u64,
            };
            if tx.try_send(frame).is_err() {
                overflowed.store(true, Ordering::Relaxed);
            }
        },
        |err| error!("Input stream error: {}", err),
        None,
    )?;

    Ok(stream)
}

#[async_trait::async_trait]
impl CaptureBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>> {
        if self.stop_tx.is_some() {
            bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(64);
        let target_rate = self.config.sample_rate;
        let overflowed = Arc::clone(&self.overflowed);

        let stop_tx = spawn_stream_thread("nayla-mic", move || {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| anyhow!("No input device found"))?;
            let supported = device
                .default_input_config()
                .context("Failed to get input config")?;
            let config = supported.config();

            info!(
                "Microphone stream: {}Hz, {} channels, {:?}",
                config.sample_rate.0,
                config.channels,
                supported.sample_format()
            );

            match supported.sample_format() {
                SampleFormat::F32 => build_input::<f32>(&device, &config, tx, target_rate, overflowed),
                SampleFormat::I16 => build_input::<i16>(&device, &config, tx, target_rate, overflowed),
                SampleFormat::U16 => build_input::<u16>(&device, &config, tx, target_rate, overflowed),
                other => bail!("Unsupported input sample format: {:?}", other),
            }
        })?;

        self.stop_tx = Some(stop_tx);
        info!("Microphone capture started");

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
            if self.overflowed.swap(false, Ordering::Relaxed) {
                debug!("Microphone blocks were dropped while the pipeline was busy");
            }
            info!("Microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.stop_tx.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

struct Voice {
    id: VoiceId,
    start_frame: u64,
    samples: Vec<f32>,
    pos: usize,
}

/// State shared with the output callback
struct Mixer {
    /// Frames rendered since the stream started
    clock: u64,
    voices: Vec<Voice>,
    finished_tx: mpsc::UnboundedSender<VoiceId>,
}

impl Mixer {
    fn next_sample(&mut self) -> f32 {
        let now = self.clock;
        let mut out = 0.0;
        let finished_tx = &self.finished_tx;

        self.voices.retain_mut(|voice| {
            if voice.start_frame > now {
                return true;
            }
            if let Some(sample) = voice.samples.get(voice.pos) {
                out += sample;
                voice.pos += 1;
            }
            if voice.pos >= voice.samples.len() {
                let _ = finished_tx.send(voice.id);
                return false;
            }
            true
        });

        self.clock += 1;
        out.clamp(-1.0, 1.0)
    }
}

/// Default output device with sample-accurate scheduling
pub struct SpeakerSink {
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
    device_rate: u32,
    resampler: StreamResampler,
    next_id: VoiceId,
    stop_tx: Option<std_mpsc::Sender<()>>,
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let Ok(mut mixer) = mixer.try_lock() else {
                data.fill(T::EQUILIBRIUM);
                return;
            };
            for frame in data.chunks_mut(channels) {
                let value = T::from_sample(mixer.next_sample());
                frame.fill(value);
            }
        },
        |err| error!("Output stream error: {}", err),
        None,
    )?;

    Ok(stream)
}

impl SpeakerSink {
    /// Open the default output device. `sample_rate` is the rate inbound
    /// buffers are decoded at; the device runs at that rate when it can.
    pub fn open(sample_rate: u32) -> Result<PlaybackOutput> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device found"))?;

        let supported = device
            .supported_output_configs()
            .context("Failed to query output configs")?
            .find(|c| {
                c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate().0 <= sample_rate
                    && c.max_sample_rate().0 >= sample_rate
            })
            .map(|c| c.with_sample_rate(cpal::SampleRate(sample_rate)));
        let supported = match supported {
            Some(config) => config,
            None => device
                .default_output_config()
                .context("Failed to get output config")?,
        };

        let sample_format = supported.sample_format();
        let config = supported.config();
        let device_rate = config.sample_rate.0;

        let (finished_tx, finished) = mpsc::unbounded_channel();
        let mixer = Arc::new(Mutex::new(Mixer {
            clock: 0,
            voices: Vec::new(),
            finished_tx,
        }));

        let stream_mixer = Arc::clone(&mixer);
        let stop_tx = spawn_stream_thread("nayla-speaker", move || {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| anyhow!("No output device found"))?;

            match sample_format {
                SampleFormat::F32 => build_output::<f32>(&device, &config, stream_mixer),
                SampleFormat::I16 => build_output::<i16>(&device, &config, stream_mixer),
                SampleFormat::U16 => build_output::<u16>(&device, &config, stream_mixer),
                other => bail!("Unsupported output sample format: {:?}", other),
            }
        })?;

        let resampler = StreamResampler::new(sample_rate, device_rate)?;

        info!("Speaker output opened: {}Hz device, {}Hz decode", device_rate, sample_rate);

        Ok(PlaybackOutput {
            sink: Box::new(Self {
                mixer,
                sample_rate,
                device_rate,
                resampler,
                next_id: 0,
                stop_tx: Some(stop_tx),
            }),
            finished,
        })
    }

    fn lock_mixer(&self) -> std::sync::MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PlaybackSink for SpeakerSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.lock_mixer().clock as f64 / self.device_rate as f64
    }

    fn play(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<VoiceId> {
        if self.stop_tx.is_none() {
            bail!("Speaker output is closed");
        }

        let mono = match buffer.channels.len() {
            0 => Vec::new(),
            _ => buffer.channels[0].clone(),
        };
        // Voices are placed by start frame, so per-buffer rounding never accumulates
        let samples = if buffer.sample_rate == self.sample_rate {
            self.resampler.resample_block(&mono)?
        } else {
            resample(&mono, buffer.sample_rate, self.device_rate)?
        };

        let id = self.next_id;
        self.next_id += 1;

        let start_frame = (start_at.max(0.0) * self.device_rate as f64).round() as u64;
        self.lock_mixer().voices.push(Voice {
            id,
            start_frame,
            samples,
            pos: 0,
        });

        Ok(id)
    }

    fn stop(&mut self, id: VoiceId) {
        self.lock_mixer().voices.retain(|voice| voice.id != id);
    }

    fn close(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
            self.lock_mixer().voices.clear();
            info!("Speaker output closed");
        }
    }
}

impl Drop for SpeakerSink {
    fn drop(&mut self) {
        self.close();
    }
}
