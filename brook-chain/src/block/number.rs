use std::fmt;

/// A block number in the stream.
///
/// Producers assign block numbers in strictly ascending order with no gaps;
/// the acknowledgment pipeline relies on that to release acknowledgments in
/// sequence.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Number(pub u64);

impl Number {
    /// The lowest possible block number.
    pub const MIN: Number = Number(0);

    /// The number of the block following this one.
    pub fn next(self) -> Number {
        Number(self.0 + 1)
    }
}

impl From<u64> for Number {
    fn from(number: u64) -> Self {
        Number(number)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}
