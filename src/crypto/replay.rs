//! Anti-replay sliding window.
//!
//! One window per peer. A sequence is rejected when it was already seen or
//! when it is so far below the highest accepted sequence that it fell out of
//! the window. Callers check with [`ReplayWindow::is_replay`] BEFORE opening
//! the packet and call [`ReplayWindow::check_and_update`] only after the
//! packet authenticated, so forged packets cannot advance the window.

use crate::core::DEFAULT_REPLAY_WINDOW_SIZE;

/// Sliding bitmap over the most recent `size` sequence numbers.
///
/// Bit `i` of the bitmap represents sequence `highest - i`.
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    /// Bitmap for tracking seen sequences.
    bitmap: Vec<u64>,
    /// Window size in bits (multiple of 64).
    size: u64,
    /// Highest sequence seen so far.
    highest: u64,
    /// Whether we've seen any packets yet.
    initialized: bool,
}

impl ReplayWindow {
    /// Create a window covering at least `size` sequences.
    ///
    /// The size is rounded up to a multiple of 64 (minimum 64).
    pub fn new(size: usize) -> Self {
        let words = size.div_ceil(64).max(1);
        Self {
            bitmap: vec![0; words],
            size: (words * 64) as u64,
            highest: 0,
            initialized: false,
        }
    }

    /// Window size in sequences.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Highest sequence accepted so far, if any.
    pub fn highest(&self) -> Option<u64> {
        self.initialized.then_some(self.highest)
    }

    /// Check if a sequence is a replay (without updating).
    pub fn is_replay(&self, sequence: u64) -> bool {
        if !self.initialized || sequence > self.highest {
            return false;
        }

        let diff = self.highest - sequence;
        if diff >= self.size {
            return true; // Below window
        }
        self.bit(diff)
    }

    /// Check a sequence and mark it as seen.
    ///
    /// Returns `true` if the sequence is fresh and was recorded, `false` if
    /// it is a replay or below the window.
    pub fn check_and_update(&mut self, sequence: u64) -> bool {
        if !self.initialized {
            self.initialized = true;
            self.highest = sequence;
            self.set_bit(0);
            return true;
        }

        if sequence > self.highest {
            self.shift_window(sequence - self.highest);
            self.highest = sequence;
            self.set_bit(0);
            return true;
        }

        if self.is_replay(sequence) {
            return false;
        }
        self.set_bit(self.highest - sequence);
        true
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.bitmap.iter_mut().for_each(|word| *word = 0);
        self.highest = 0;
        self.initialized = false;
    }

    fn bit(&self, offset: u64) -> bool {
        let word = (offset / 64) as usize;
        let bit = offset % 64;
        self.bitmap[word] & (1 << bit) != 0
    }

    fn set_bit(&mut self, offset: u64) {
        let word = (offset / 64) as usize;
        let bit = offset % 64;
        self.bitmap[word] |= 1 << bit;
    }

    /// Move every recorded bit `shift` positions towards older sequences.
    fn shift_window(&mut self, shift: u64) {
        if shift >= self.size {
            self.bitmap.iter_mut().for_each(|word| *word = 0);
            return;
        }

        let shift_words = (shift / 64) as usize;
        let shift_bits = (shift % 64) as u32;
        let len = self.bitmap.len();

        if shift_words > 0 {
            for i in (shift_words..len).rev() {
                self.bitmap[i] = self.bitmap[i - shift_words];
            }
            for word in self.bitmap.iter_mut().take(shift_words) {
                *word = 0;
            }
        }

        if shift_bits > 0 {
            // Bits leaving the top of word i-1 enter the bottom of word i.
            for i in (1..len).rev() {
                self.bitmap[i] =
                    (self.bitmap[i] << shift_bits) | (self.bitmap[i - 1] >> (64 - shift_bits));
            }
            self.bitmap[0] <<= shift_bits;
        }
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_WINDOW_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_replay_window_basic() {
        let mut window = ReplayWindow::new(256);

        assert!(window.check_and_update(0));
        assert!(!window.check_and_update(0));
        assert!(window.check_and_update(1));

        // Out of order but in window
        assert!(window.check_and_update(5));
        assert!(window.check_and_update(3));
        assert!(window.check_and_update(4));
        assert!(window.check_and_update(2));

        assert!(!window.check_and_update(0));
        assert!(!window.check_and_update(3));
        assert!(!window.check_and_update(5));
        assert_eq!(window.highest(), Some(5));
    }

    #[test]
    fn test_replay_window_large_gap() {
        let mut window = ReplayWindow::new(256);

        assert!(window.check_and_update(0));
        assert!(window.check_and_update(1));
        assert!(window.check_and_update(1000));

        // Old packets now below window
        assert!(window.is_replay(0));
        assert!(!window.check_and_update(1));

        // Recent packets in window still accepted once
        assert!(window.check_and_update(999));
        assert!(window.check_and_update(998));
        assert!(!window.check_and_update(999));
    }

    #[test]
    fn test_replay_window_bits_cross_words() {
        let mut window = ReplayWindow::new(256);

        assert!(window.check_and_update(10));
        // Shift by 70: sequence 10 moves from bit 0 to bit 70 (second word).
        assert!(window.check_and_update(80));
        assert!(window.is_replay(10));
        assert!(!window.is_replay(11));
        assert!(window.check_and_update(11));
    }

    #[test]
    fn test_replay_window_size_rounding() {
        assert_eq!(ReplayWindow::new(1).size(), 64);
        assert_eq!(ReplayWindow::new(65).size(), 128);
        assert_eq!(ReplayWindow::new(0).size(), 64);
    }

    #[test]
    fn test_replay_window_reset() {
        let mut window = ReplayWindow::new(64);
        assert!(window.check_and_update(7));
        window.reset();
        assert_eq!(window.highest(), None);
        assert!(window.check_and_update(7));
    }

    proptest! {
        #[test]
        fn prop_window_matches_reference_model(
            sequences in proptest::collection::vec(0u64..600, 1..300),
        ) {
            let mut window = ReplayWindow::new(128);
            let mut seen = HashSet::new();
            let mut highest: Option<u64> = None;

            for sequence in sequences {
                let expected = match highest {
                    None => true,
                    Some(h) if sequence > h => true,
                    Some(h) => h - sequence < 128 && !seen.contains(&sequence),
                };

                prop_assert_eq!(window.check_and_update(sequence), expected);
                if expected {
                    seen.insert(sequence);
                    highest = Some(highest.map_or(sequence, |h| h.max(sequence)));
                }
            }
        }
    }
}
