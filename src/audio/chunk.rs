/// Re-blocks capture output into fixed-size frames
///
/// Capture devices hand over whatever block size they like; the live API
/// expects one fixed window per send. Leftover samples carry over to the
/// next push.
#[derive(Debug)]
pub struct FrameChunker {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples waiting for a full frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Add samples and return every frame completed by them, in order
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() {
            let needed = self.frame_size - self.pending.len();
            let take = needed.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.frame_size {
                let frame = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
                frames.push(frame);
            }
        }

        frames
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_frames_pass_through() {
        let mut chunker = FrameChunker::new(4);
        let frames = chunker.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(frames, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);
        assert_eq!(chunker.pending_len(), 0);
    }

    #[test]
    fn partial_blocks_accumulate_across_pushes() {
        let mut chunker = FrameChunker::new(4);
        assert!(chunker.push(&[1.0, 2.0, 3.0]).is_empty());
        assert_eq!(chunker.pending_len(), 3);

        let frames = chunker.push(&[4.0, 5.0]);
        assert_eq!(frames, vec![vec![1.0, 2.0, 3.0, 4.0]]);
        assert_eq!(chunker.pending_len(), 1);

        chunker.reset();
        assert_eq!(chunker.pending_len(), 0);
    }

    #[test]
    fn live_frame_size_from_device_blocks() {
        // 480-sample device blocks (30ms at 16kHz)
        let mut chunker = FrameChunker::new(4096);
        let total: usize = (0..20).map(|_| chunker.push(&[0.1; 480]).len()).sum();

        assert_eq!(total, 9600 / 4096);
        assert_eq!(chunker.pending_len(), 9600 % 4096);
    }
}
