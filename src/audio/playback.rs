// Gapless playback of inbound speech chunks
//
// Chunks are laid end to end on the sink's clock: each one starts at
// max(cursor, now) and pushes the cursor forward by its own duration.
// An interruption stops everything in flight and rewinds the cursor so
// the next chunk plays immediately.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use super::backend::{AudioBuffer, PlaybackSink, VoiceId};
use crate::codec::{sample_rate_from_mime, MediaBlob};

/// Placement of one scheduled chunk on the output clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: VoiceId,
    /// Start time in output clock seconds
    pub start: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl ScheduledChunk {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

pub struct PlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    /// Next start time; non-decreasing between interrupts
    cursor: f64,
    active: HashSet<VoiceId>,
    closed: bool,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        Self {
            sink,
            cursor: 0.0,
            active: HashSet::new(),
            closed: false,
        }
    }

    /// Decode a mono PCM16 chunk and schedule it after everything queued
    pub fn schedule_chunk(&mut self, chunk: &MediaBlob) -> Result<ScheduledChunk> {
        let rate = self.sink.sample_rate();
        if let Some(tagged) = sample_rate_from_mime(&chunk.mime_type) {
            if tagged != rate {
                warn!(
                    "Inbound audio tagged {}Hz, playback runs at {}Hz",
                    tagged, rate
                );
            }
        }

        let channels = chunk
            .decode_pcm16(1)
            .context("Failed to decode inbound audio chunk")?;
        let buffer = AudioBuffer {
            channels,
            sample_rate: rate,
        };

        self.schedule_buffer(buffer)
    }

    /// Schedule an already decoded buffer
    pub fn schedule_buffer(&mut self, buffer: AudioBuffer) -> Result<ScheduledChunk> {
        if self.closed {
            bail!("Playback sink is closed");
        }

        let now = self.sink.current_time();
        let start = self.cursor.max(now);
        let duration = buffer.duration();

        let id = self.sink.play(buffer, start)?;
        self.cursor = start + duration;
        self.active.insert(id);

        debug!(
            "Scheduled voice {} at {:.3}s for {:.3}s ({} active)",
            id,
            start,
            duration,
            self.active.len()
        );

        Ok(ScheduledChunk {
            id,
            start,
            duration,
        })
    }

    /// Record natural completion of a voice.
    ///
    /// Returns true when this completion drained the active set.
    pub fn on_finished(&mut self, id: VoiceId) -> bool {
        if !self.active.remove(&id) {
            return false;
        }
        let idle = self.active.is_empty();
        if idle {
            debug!("Playback idle");
        }
        idle
    }

    /// Stop all active voices and rewind the cursor
    pub fn interrupt(&mut self) {
        if !self.active.is_empty() {
            info!("Interrupting playback ({} active voices)", self.active.len());
        }
        for id in self.active.drain() {
            self.sink.stop(id);
        }
        self.cursor = 0.0;
    }

    /// Interrupt and release the sink. Idempotent.
    pub fn close(&mut self) {
        self.interrupt();
        if !self.closed {
            self.sink.close();
            self.closed = true;
        }
    }

    /// True exactly while at least one voice is active
    pub fn is_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
