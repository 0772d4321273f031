// WAV-file audio backends
//
// `WavCaptureBackend` replays a recording as if it were the microphone,
// `WavPlaybackSink` records scheduled speech to disk on a wall clock.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{
    AudioBuffer, CaptureBackend, CaptureConfig, CaptureFrame, PlaybackOutput, PlaybackSink,
    VoiceId,
};
use super::convert::{downmix_to_mono, resample};
use crate::codec::float_to_pcm16;

/// Device block length used when replaying a file
const BLOCK_MS: u64 = 100;

/// Read a WAV file as mono floats at its native rate
pub fn read_wav_mono(path: impl AsRef<Path>) -> Result<(Vec<f32>, u32)> {
    let path = path.as_ref();
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?
        }
    };

    Ok((
        downmix_to_mono(&interleaved, spec.channels as usize),
        spec.sample_rate,
    ))
}

/// Capture backend that replays a WAV file
pub struct WavCaptureBackend {
    path: PathBuf,
    config: CaptureConfig,
    samples: Vec<f32>,
    realtime: bool,
    task: Option<JoinHandle<()>>,
}

impl WavCaptureBackend {
    /// Load `path`, converting to mono at the configured capture rate
    pub fn open(path: impl AsRef<Path>, config: CaptureConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (mono, native_rate) = read_wav_mono(&path)?;
        let samples = resample(&mono, native_rate, config.sample_rate)?;

        info!(
            "WAV capture loaded: {} ({}Hz -> {}Hz, {:.1}s)",
            path.display(),
            native_rate,
            config.sample_rate,
            samples.len() as f64 / config.sample_rate.max(1) as f64
        );

        Ok(Self {
            path,
            config,
            samples,
            realtime: true,
            task: None,
        })
    }

    /// Emit blocks as fast as the receiver accepts them instead of pacing
    /// them at the capture rate
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

#[async_trait::async_trait]
impl CaptureBackend for WavCaptureBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureFrame>> {
        if self.task.is_some() {
            bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(64);
        let samples = self.samples.clone();
        let sample_rate = self.config.sample_rate;
        let realtime = self.realtime;
        let block = ((sample_rate as u64 * BLOCK_MS) / 1000).max(1) as usize;

        info!("Starting WAV capture from {}", self.path.display());

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(BLOCK_MS));

            for (i, chunk) in samples.chunks(block).enumerate() {
                if realtime {
                    ticker.tick().await;
                }
                let frame = CaptureFrame {
                    samples: chunk.to_vec(),
                    sample_rate,
                    timestamp_ms: i as u64 * BLOCK_MS,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("WAV capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}

/// Playback sink that records what would have been heard to a WAV file
///
/// Scheduled buffers are held until the wall clock reaches them and only
/// the part that played before a `stop` is written, so after a barge-in the
/// file still mirrors the audible schedule. Gaps become silence.
pub struct WavPlaybackSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    sample_rate: u32,
    origin: Instant,
    /// Samples written so far
    written: u64,
    /// Scheduled voices not yet fully written, in start order
    queued: Vec<QueuedVoice>,
    next_id: VoiceId,
    timers: HashMap<VoiceId, JoinHandle<()>>,
    finished_tx: mpsc::UnboundedSender<VoiceId>,
}

struct QueuedVoice {
    id: VoiceId,
    start: u64,
    samples: Vec<f32>,
    pos: usize,
}

impl WavPlaybackSink {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<PlaybackOutput> {
        let path = path.as_ref();
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let writer = WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

        info!("Recording playback to {} ({}Hz)", path.display(), sample_rate);

        let (finished_tx, finished) = mpsc::unbounded_channel();
        let sink = Self {
            writer: Some(writer),
            sample_rate,
            origin: Instant::now(),
            written: 0,
            queued: Vec::new(),
            next_id: 0,
            timers: HashMap::new(),
            finished_tx,
        };

        Ok(PlaybackOutput {
            sink: Box::new(sink),
            finished,
        })
    }

    fn frame_at(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    fn write_samples(&mut self, samples: &[f32]) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            bail!("Playback sink is closed");
        };
        for pair in float_to_pcm16(samples).chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .context("Failed to write sample to WAV")?;
        }
        self.written += samples.len() as u64;
        Ok(())
    }

    /// Write everything audible before `until` (a frame index)
    fn render_until(&mut self, until: u64) -> Result<()> {
        while let Some(voice) = self.queued.first_mut() {
            if voice.start >= until {
                break;
            }

            let gap = voice.start.saturating_sub(self.written);
            let room = until.saturating_sub(self.written.max(voice.start));
            let end = voice.samples.len().min(voice.pos.saturating_add(room as usize));
            let chunk = voice.samples[voice.pos..end].to_vec();
            voice.pos = end;
            let done = end >= voice.samples.len();

            if done {
                self.queued.remove(0);
            }
            if gap > 0 {
                self.write_samples(&vec![0.0; gap as usize])?;
            }
            self.write_samples(&chunk)?;
            if !done {
                break;
            }
        }
        Ok(())
    }
}

impl PlaybackSink for WavPlaybackSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn play(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<VoiceId> {
        if self.writer.is_none() {
            bail!("Playback sink is closed");
        }

        let mono = downmix_planar(&buffer);
        let samples = resample(&mono, buffer.sample_rate, self.sample_rate)?;

        let id = self.next_id;
        self.next_id += 1;

        let start = self.frame_at(start_at).max(self.written);
        let at = self.queued.partition_point(|v| v.start <= start);
        self.queued.insert(
            at,
            QueuedVoice {
                id,
                start,
                samples,
                pos: 0,
            },
        );

        let end = start_at.max(self.current_time()) + buffer.duration();
        let wait = Duration::from_secs_f64((end - self.current_time()).max(0.0));
        let finished_tx = self.finished_tx.clone();

        self.timers.retain(|_, timer| !timer.is_finished());
        self.timers.insert(
            id,
            tokio::spawn(async move {
                tokio::time::sleep(wait).await;
                let _ = finished_tx.send(id);
            }),
        );

        Ok(id)
    }

    fn stop(&mut self, id: VoiceId) {
        if let Some(timer) = self.timers.remove(&id) {
            timer.abort();
        }
        if self.queued.iter().any(|v| v.id == id) {
            let now = self.frame_at(self.current_time());
            if let Err(e) = self.render_until(now) {
                warn!("Failed to write playback audio: {}", e);
            }
            self.queued.retain(|v| v.id != id);
        }
    }

    fn close(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        if self.writer.is_some() {
            if let Err(e) = self.render_until(u64::MAX) {
                warn!("Failed to write playback audio: {}", e);
            }
            self.queued.clear();
        }
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize playback WAV: {}", e);
            }
        }
    }
}

impl Drop for WavPlaybackSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn downmix_planar(buffer: &AudioBuffer) -> Vec<f32> {
    match buffer.channels.len() {
        0 => Vec::new(),
        1 => buffer.channels[0].clone(),
        n => (0..buffer.frame_count())
            .map(|i| buffer.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
            .collect(),
    }
}
