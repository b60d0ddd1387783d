/// Samples a consumer callback waits for before it starts reading.
pub const AUDIO_BUFFER: usize = 1024;

/// Default ring capacity. Must be a power of two so masking replaces
/// modulo on the cursors.
pub const SAMPLE_COUNT: usize = 1024 * 16;

/// Fixed-capacity circular buffer for the raw-sample audio path.
///
/// The producer (the emulation core) never blocks: `push` writes at the
/// write cursor unconditionally, overwriting old samples on wraparound.
/// The consumer only emits output once a full callback's worth of unread
/// samples has accumulated, and emits silence otherwise. The tradeoff
/// deliberately favors the producer, which must never stall.
pub struct SampleRing {
    samples: Box<[f32]>,
    mask: usize,
    read: usize,
    write: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "ring capacity must be a power of two"
        );
        SampleRing {
            samples: vec![0.0; capacity].into_boxed_slice(),
            mask: capacity - 1,
            read: 0,
            write: 0,
        }
    }

    #[inline(always)]
    pub fn push(&mut self, sample: f32) {
        self.samples[self.write] = sample;
        self.write = (self.write + 1) & self.mask;
    }

    /// Unread sample count, wraparound-tolerant.
    #[inline(always)]
    pub fn unread(&self) -> usize {
        self.write.wrapping_sub(self.read) & self.mask
    }

    /// Fill one callback's worth of output. Returns `true` when real
    /// samples were emitted; below the watermark, or when fewer unread
    /// samples exist than `out` wants, the output is all zeros and the
    /// read cursor does not move.
    pub fn fill(&mut self, out: &mut [f32]) -> bool {
        let unread = self.unread();
        if unread < AUDIO_BUFFER || unread < out.len() {
            out.fill(0.0);
            return false;
        }
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.samples[(self.read + i) & self.mask];
        }
        self.read = (self.read + out.len()) & self.mask;
        true
    }
}

impl Default for SampleRing {
    fn default() -> Self {
        Self::new(SAMPLE_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_until_watermark_reached() {
        let mut ring = SampleRing::default();
        for i in 0..AUDIO_BUFFER - 1 {
            ring.push(i as f32);
        }
        let mut out = [1.0f32; 256];
        assert!(!ring.fill(&mut out));
        assert!(out.iter().all(|&s| s == 0.0));
        // cursor untouched, so the pushed samples are still pending
        assert_eq!(ring.unread(), AUDIO_BUFFER - 1);
    }

    #[test]
    fn exactly_one_callback_of_samples_comes_back_in_order() {
        let mut ring = SampleRing::default();
        for i in 0..AUDIO_BUFFER {
            ring.push(i as f32);
        }
        let mut out = vec![0.0f32; AUDIO_BUFFER];
        assert!(ring.fill(&mut out));
        for (i, &s) in out.iter().enumerate() {
            assert_eq!(s, i as f32);
        }
        assert_eq!(ring.unread(), 0);
    }

    #[test]
    fn fill_never_reads_past_the_write_cursor() {
        let mut ring = SampleRing::default();
        for i in 0..AUDIO_BUFFER {
            ring.push(i as f32);
        }
        // asking for more than is unread yields silence, not stale data
        let mut out = vec![1.0f32; AUDIO_BUFFER * 2];
        assert!(!ring.fill(&mut out));
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(ring.unread(), AUDIO_BUFFER);

        // the pending samples still come back intact afterwards
        let mut out = vec![0.0f32; AUDIO_BUFFER];
        assert!(ring.fill(&mut out));
        assert_eq!(out[0], 0.0);
        assert_eq!(out[AUDIO_BUFFER - 1], (AUDIO_BUFFER - 1) as f32);
    }

    #[test]
    fn producer_overwrites_on_wraparound() {
        let mut ring = SampleRing::new(8);
        // deliberately push past capacity; push must not block or panic
        for i in 0..20 {
            ring.push(i as f32);
        }
        assert_eq!(ring.unread(), 20 & 7);
    }

    #[test]
    fn cursors_mask_instead_of_modulo() {
        let mut ring = SampleRing::default();
        // run the cursors around the ring a few times
        for lap in 0..3 {
            for i in 0..AUDIO_BUFFER {
                ring.push((lap * AUDIO_BUFFER + i) as f32);
            }
            let mut out = vec![0.0f32; AUDIO_BUFFER];
            assert!(ring.fill(&mut out));
            assert_eq!(out[0], (lap * AUDIO_BUFFER) as f32);
            assert_eq!(out[AUDIO_BUFFER - 1], (lap * AUDIO_BUFFER + AUDIO_BUFFER - 1) as f32);
        }
    }
}
