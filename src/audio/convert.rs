//! Sample shaping between device formats and the live API formats

use anyhow::{Context, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Input frames handed to the resampler per call
const RESAMPLE_CHUNK: usize = 1024;

/// Average interleaved channels down to mono
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Mono resampler that keeps its filter state between blocks
///
/// Blocks of any length can be pushed; input is consumed in fixed chunks
/// and the remainder carried into the next call, so output length tracks
/// `input * to / from` over the whole stream and block edges are
/// continuous. The resampler's startup delay is trimmed from the output.
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    ratio: f64,
    pending: Vec<f32>,
    delay: usize,
    skip: usize,
    consumed: u64,
    produced: u64,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let ratio = to_rate as f64 / from_rate.max(1) as f64;
        let inner = if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
            None
        } else {
            Some(
                FastFixedIn::<f32>::new(ratio, 2.0, PolynomialDegree::Septic, RESAMPLE_CHUNK, 1)
                    .with_context(|| {
                        format!("Failed to create resampler {}Hz -> {}Hz", from_rate, to_rate)
                    })?,
            )
        };
        let delay = inner.as_ref().map_or(0, |r| r.output_delay());

        Ok(Self {
            inner,
            ratio,
            pending: Vec::with_capacity(RESAMPLE_CHUNK * 2),
            delay,
            skip: delay,
            consumed: 0,
            produced: 0,
        })
    }

    /// Resample the next block of the stream
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.consumed += samples.len() as u64;
        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let frames = resampler
                .process(&[&self.pending[..needed]][..], None)
                .context("Resampling failed")?;
            self.pending.drain(..needed);
            emit(&frames[0], &mut self.skip, &mut self.produced, &mut out);
        }

        Ok(out)
    }

    /// Drain the carried input and end the stream
    ///
    /// Afterwards the total output is exactly `round(input * to / from)`
    /// samples and the resampler is ready for a new stream.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };

        let target = (self.consumed as f64 * self.ratio).round() as u64;
        let mut out = Vec::new();

        if !self.pending.is_empty() {
            let frames = resampler
                .process_partial(Some(&[self.pending.as_slice()][..]), None)
                .context("Resampling failed")?;
            self.pending.clear();
            emit(&frames[0], &mut self.skip, &mut self.produced, &mut out);
        }
        while self.produced < target {
            let frames = resampler
                .process_partial::<&[f32]>(None, None)
                .context("Resampling failed")?;
            if frames[0].is_empty() {
                break;
            }
            emit(&frames[0], &mut self.skip, &mut self.produced, &mut out);
        }

        let excess = self.produced.saturating_sub(target) as usize;
        out.truncate(out.len().saturating_sub(excess));

        resampler.reset();
        self.skip = self.delay;
        self.consumed = 0;
        self.produced = 0;

        Ok(out)
    }

    /// Resample a self-contained buffer
    pub fn resample_block(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let mut out = self.process(samples)?;
        out.extend(self.flush()?);
        Ok(out)
    }
}

fn emit(frames: &[f32], skip: &mut usize, produced: &mut u64, out: &mut Vec<f32>) {
    let skipped = (*skip).min(frames.len());
    *skip -= skipped;
    out.extend_from_slice(&frames[skipped..]);
    *produced += (frames.len() - skipped) as u64;
}

/// One-shot resample of a whole mono buffer
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    StreamResampler::new(from_rate, to_rate)?.resample_block(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, freq: f32, rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 * freq * std::f32::consts::TAU / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn stereo_downmix_averages() {
        assert_eq!(downmix_to_mono(&[0.5, -0.5, 1.0, 0.0], 2), vec![0.0, 0.5]);
        assert_eq!(downmix_to_mono(&[0.25, 0.75], 1), vec![0.25, 0.75]);
    }

    #[test]
    fn resample_changes_length_by_ratio() {
        let input = vec![0.0; 48000];
        assert_eq!(resample(&input, 48000, 16000).unwrap().len(), 16000);
        assert_eq!(resample(&input[..16000], 16000, 24000).unwrap().len(), 24000);
        assert_eq!(resample(&input[..100], 44100, 16000).unwrap().len(), 36);
    }

    #[test]
    fn same_rate_is_identity() {
        assert_eq!(resample(&[0.1, 0.2], 16000, 16000).unwrap(), vec![0.1, 0.2]);
    }

    #[test]
    fn odd_device_blocks_do_not_drift() {
        // 512-sample callback blocks at 44.1kHz do not divide evenly into 16kHz
        let input = sine(512 * 1000, 440.0, 44100);
        let mut resampler = StreamResampler::new(44100, 16000).unwrap();

        let mut streamed = Vec::new();
        for block in input.chunks(512) {
            streamed.extend(resampler.process(block).unwrap());
        }
        streamed.extend(resampler.flush().unwrap());

        assert_eq!(streamed.len(), 185759);
        assert_eq!(streamed, resample(&input, 44100, 16000).unwrap());
    }

    #[test]
    fn block_edges_are_continuous() {
        let input = sine(44100, 440.0, 44100);
        let mut resampler = StreamResampler::new(44100, 16000).unwrap();

        let mut out = Vec::new();
        for block in input.chunks(333) {
            out.extend(resampler.process(block).unwrap());
        }

        // A 440Hz sine at amplitude 0.5 moves at most ~0.087 per 16kHz sample
        let max_step = out
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f32, f32::max);
        assert!(max_step < 0.1, "discontinuity of {}", max_step);
    }

    #[test]
    fn flush_readies_a_new_stream() {
        let mut resampler = StreamResampler::new(24000, 48000).unwrap();
        assert_eq!(resampler.resample_block(&[0.25; 2400]).unwrap().len(), 4800);
        assert_eq!(resampler.resample_block(&[0.25; 1200]).unwrap().len(), 2400);
    }
}
