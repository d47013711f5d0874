//! Loss accounting from per-sender sequence numbers.

/// Distances at or beyond this are treated as late or duplicated packets.
const REORDER_WINDOW: u32 = 1 << 31;

/// Follows the sequence numbers of a single sender and counts the gaps.
///
/// Sequence numbers wrap around, so "ahead" is measured modulo 2^32.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTracker {
    expected: Option<u32>,
}

impl SequenceTracker {
    #[inline(always)]
    pub const fn new() -> Self {
        Self { expected: None }
    }

    /// Forgets the sender's position, the next observed number is taken as-is.
    #[inline(always)]
    pub fn reset(&mut self) {
        self.expected = None;
    }

    /// Records `seq_num` and returns how many numbers were skipped since the last
    /// one observed.
    ///
    /// Late or duplicated packets count as zero and leave the position unchanged.
    pub fn observe(&mut self, seq_num: u32) -> u32 {
        let Some(expected) = self.expected else {
            self.expected = Some(seq_num.wrapping_add(1));
            return 0;
        };

        let gap = seq_num.wrapping_sub(expected);

        if gap >= REORDER_WINDOW {
            return 0;
        }

        self.expected = Some(seq_num.wrapping_add(1));
        gap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_numbers_lose_nothing() {
        let mut tracker = SequenceTracker::new();
        assert_eq!((10..20).map(|s| tracker.observe(s)).sum::<u32>(), 0);
    }

    #[test]
    fn gaps_are_counted() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(5);
        assert_eq!(tracker.observe(6), 0);
        assert_eq!(tracker.observe(9), 2);
        assert_eq!(tracker.observe(10), 0);
    }

    #[test]
    fn wraps_around() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(u32::MAX - 1);
        assert_eq!(tracker.observe(u32::MAX), 0);
        assert_eq!(tracker.observe(1), 1);
    }

    #[test]
    fn late_packets_are_ignored() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(100);
        assert_eq!(tracker.observe(98), 0);
        assert_eq!(tracker.observe(100), 0);
        assert_eq!(tracker.observe(101), 0);
    }

    #[test]
    fn reset_forgets_position() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(100);
        tracker.reset();
        assert_eq!(tracker.observe(3), 0);
        assert_eq!(tracker.observe(4), 0);
    }
}
