//! Job progress with per-kind phase offsets.

/// Progress band `[start, end]` assigned to one phase of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    pub start: u8,
    pub end: u8,
}

impl Phase {
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// `start + floor(done / total * (end - start))`, clamped to the band.
    pub fn at(&self, done: u64, total: u64) -> u8 {
        if total == 0 {
            return self.end;
        }
        let span = u64::from(self.end.saturating_sub(self.start));
        let done = done.min(total);
        self.start + (done * span / total) as u8
    }
}

/// Phase layout of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseLayout {
    pub extraction: Phase,
    pub swap: Phase,
    pub variants: Phase,
}

impl PhaseLayout {
    /// Plain transform and caption jobs spend the whole range in the loop.
    pub const SINGLE_LOOP: PhaseLayout = PhaseLayout {
        extraction: Phase::new(0, 0),
        swap: Phase::new(0, 0),
        variants: Phase::new(0, 100),
    };

    /// Face-swap: 0-10 extraction, 10-75 swap and reassembly, 75-100 outputs.
    pub const FACESWAP: PhaseLayout = PhaseLayout {
        extraction: Phase::new(0, 10),
        swap: Phase::new(10, 75),
        variants: Phase::new(75, 100),
    };
}

/// Monotonic progress value for one job run.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    current: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    /// Move to `value` if it is ahead. Returns the new value when it changed.
    pub fn advance(&mut self, value: u8) -> Option<u8> {
        let value = value.min(100);
        if value > self.current {
            self.current = value;
            Some(value)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_loop_progress_is_floored_percentage() {
        let phase = PhaseLayout::SINGLE_LOOP.variants;
        assert_eq!(phase.at(0, 3), 0);
        assert_eq!(phase.at(1, 3), 33);
        assert_eq!(phase.at(2, 3), 66);
        assert_eq!(phase.at(3, 3), 100);
    }

    #[test]
    fn faceswap_bands_are_offset() {
        let layout = PhaseLayout::FACESWAP;
        assert_eq!(layout.extraction.at(1, 1), 10);
        assert_eq!(layout.swap.at(0, 200), 10);
        assert_eq!(layout.swap.at(100, 200), 42);
        assert_eq!(layout.swap.at(200, 200), 75);
        assert_eq!(layout.variants.at(1, 2), 87);
        assert_eq!(layout.variants.at(2, 2), 100);
    }

    #[test]
    fn empty_phase_reports_its_end() {
        assert_eq!(Phase::new(75, 100).at(0, 0), 100);
    }

    #[test]
    fn tracker_never_moves_backwards() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.advance(40), Some(40));
        assert_eq!(tracker.advance(30), None);
        assert_eq!(tracker.advance(40), None);
        assert_eq!(tracker.current(), 40);
        assert_eq!(tracker.advance(250), Some(100));
    }
}
