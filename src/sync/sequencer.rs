//! Wrapping 16-bit sequence numbers.

/// Hands out `u16` sequence numbers, wrapping from 65535 to 0.
///
/// A fresh sequencer yields 1 first. The last value can be taken back with
/// [`Sequencer::rollback`] when nothing was sent under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sequencer {
    current: u16,
}

impl Sequencer {
    /// Sequencer whose next value is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequencer whose next value follows `current`.
    pub fn starting_at(current: u16) -> Self {
        Self { current }
    }

    /// Advance and return the new value.
    pub fn next(&mut self) -> u16 {
        self.current = self.current.wrapping_add(1);
        self.current
    }

    /// The most recently issued value.
    pub fn current(&self) -> u16 {
        self.current
    }

    /// Take back the most recently issued value.
    pub fn rollback(&mut self) {
        self.current = self.current.wrapping_sub(1);
    }

    /// Take back `seq` only if it is still the most recent value.
    pub fn rollback_if_current(&mut self, seq: u16) -> bool {
        if self.current == seq {
            self.rollback();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_value_is_one() {
        let mut seq = Sequencer::new();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.current(), 2);
    }

    #[test]
    fn test_wraps_to_zero() {
        let mut seq = Sequencer::starting_at(u16::MAX);
        assert_eq!(seq.next(), 0);
        assert_eq!(seq.next(), 1);
    }

    #[test]
    fn test_rollback() {
        let mut seq = Sequencer::new();
        let first = seq.next();
        seq.rollback();
        assert_eq!(seq.next(), first);

        let mut seq = Sequencer::starting_at(0);
        seq.rollback();
        assert_eq!(seq.current(), u16::MAX);
    }

    #[test]
    fn test_rollback_only_if_current() {
        let mut seq = Sequencer::new();
        let a = seq.next();
        let b = seq.next();
        assert!(!seq.rollback_if_current(a));
        assert_eq!(seq.current(), b);
        assert!(seq.rollback_if_current(b));
        assert_eq!(seq.current(), a);
    }
}
