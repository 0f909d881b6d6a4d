use std::borrow::Cow;
use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use num::{PrimInt, Unsigned};
use thiserror::Error;
use crate::area::CellLoc;

/// Error taxonomy for the whole engine. `EmptyCell` and `Violation` are
/// puzzle-logic contradictions: speculative callers (try_apply, exclusion
/// chains, the guesser) recover from them by discarding the branch, and they
/// only surface to the caller when they happen on the live board.
/// `InvalidAssignment` and `ValueOutOfRange` are caller mistakes, not
/// contradictions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    #[error("cell {0} has no remaining candidates")]
    EmptyCell(CellLoc),
    #[error("cell {0} cannot take value {1}")]
    InvalidAssignment(CellLoc, u8),
    #[error("value {0} is outside the digit alphabet")]
    ValueOutOfRange(u8),
    #[error("set elimination emptied a cell")]
    InvalidSets,
    #[error("restriction violated: {0}")]
    Violation(Cow<'static, str>),
    #[error("solve cancelled")]
    Cancelled,
    #[error("propagation hook recursion exceeded its bound")]
    PropagationDepth,
}

impl SolveError {
    pub fn violation(reason: impl Into<Cow<'static, str>>) -> Self {
        SolveError::Violation(reason.into())
    }

    /// Contradictions are recoverable by discarding the speculative branch
    /// that produced them; everything else must propagate.
    pub fn is_contradiction(&self) -> bool {
        matches!(
            self,
            SolveError::EmptyCell(_) | SolveError::Violation(_) | SolveError::InvalidSets
        )
    }
}

/// Machine word backing a digit bitmask. Alphabets are at most 16 digits, so
/// `u16` is the word used throughout; the algorithms only ever go through
/// this trait.
pub trait DigitWord: PrimInt + Unsigned + Debug {
    const BITS: u32;
}

impl DigitWord for u16 {
    const BITS: u32 = 16;
}

impl DigitWord for u32 {
    const BITS: u32 = 32;
}

/// Set of candidate digits for one cell: bit i set ⇔ digit i+1 is still
/// allowed. An empty set is an illegal board state (a contradiction) and a
/// set with exactly one bit is a solved cell. All operations are pure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DigitSet<W: DigitWord = u16> {
    bits: W,
}

impl<W: DigitWord> DigitSet<W> {
    fn bit(v: u8) -> W {
        debug_assert!(v >= 1 && (v as u32) <= W::BITS, "digit out of word range");
        W::one() << (v as usize - 1)
    }

    pub fn empty() -> Self {
        DigitSet { bits: W::zero() }
    }

    /// The full set for an alphabet of `n` digits (1..=n).
    pub fn all(n: u8) -> Self {
        debug_assert!(n >= 1 && (n as u32) <= W::BITS);
        if n as u32 == W::BITS {
            DigitSet { bits: !W::zero() }
        } else {
            DigitSet { bits: (W::one() << n as usize) - W::one() }
        }
    }

    pub fn just(v: u8) -> Self {
        DigitSet { bits: Self::bit(v) }
    }

    pub fn of(vals: &[u8]) -> Self {
        let mut s = Self::empty();
        for &v in vals {
            s = s.with(v);
        }
        s
    }

    pub fn can_contain(self, v: u8) -> bool {
        self.bits & Self::bit(v) != W::zero()
    }

    pub fn with(self, v: u8) -> Self {
        DigitSet { bits: self.bits | Self::bit(v) }
    }

    pub fn without(self, v: u8) -> Self {
        DigitSet { bits: self.bits & !Self::bit(v) }
    }

    pub fn and(self, other: Self) -> Self {
        DigitSet { bits: self.bits & other.bits }
    }

    pub fn or(self, other: Self) -> Self {
        DigitSet { bits: self.bits | other.bits }
    }

    pub fn minus(self, other: Self) -> Self {
        DigitSet { bits: self.bits & !other.bits }
    }

    /// Complement within an alphabet of `n` digits.
    pub fn complement(self, n: u8) -> Self {
        Self::all(n).minus(self)
    }

    pub fn is_empty(self) -> bool {
        self.bits == W::zero()
    }

    pub fn count(self) -> u32 {
        self.bits.count_ones()
    }

    /// The forced digit, if exactly one candidate remains.
    pub fn single(self) -> Option<u8> {
        if self.count() == 1 {
            Some(self.bits.trailing_zeros() as u8 + 1)
        } else {
            None
        }
    }

    pub fn min(self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some(self.bits.trailing_zeros() as u8 + 1)
        }
    }

    pub fn max(self) -> Option<u8> {
        if self.is_empty() {
            None
        } else {
            Some((W::BITS - self.bits.leading_zeros()) as u8)
        }
    }

    /// Set members in ascending order. The iterator is a value copy, so it
    /// can be restarted by calling `values` again.
    pub fn values(self) -> DigitValues<W> {
        DigitValues { bits: self.bits }
    }
}

impl<W: DigitWord> Default for DigitSet<W> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<W: DigitWord> Display for DigitSet<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, v) in self.values().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DigitValues<W: DigitWord> {
    bits: W,
}

impl<W: DigitWord> Iterator for DigitValues<W> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.bits == W::zero() {
            return None;
        }
        let tz = self.bits.trailing_zeros();
        self.bits = self.bits & !(W::one() << tz as usize);
        Some(tz as u8 + 1)
    }
}

/// Cooperative cancellation: a shared flag plus an optional deadline. The
/// engine checks it once per scheduler round and at each chain/guess
/// recursion entry; it is never preemptive mid-strategy.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_deadline(timeout: Duration) -> Self {
        Cancellation {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::Relaxed) {
            return true;
        }
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn check(&self) -> Result<(), SolveError> {
        if self.is_cancelled() {
            Err(SolveError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Counters exposed by the board for instrumentation and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub cell_updates: usize,
    pub strategy_runs: usize,
    pub strategy_hits: usize,
    pub chain_runs: usize,
    pub guesser_runs: usize,
    pub guess_misses: usize,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_digit_set_min() {
        let mut d: DigitSet = DigitSet::empty();
        for v in 1..=9 {
            d = d.with(v);
            assert_eq!(d.min(), Some(1));
        }
        let mut d: DigitSet = DigitSet::empty();
        for v in (1..=9).rev() {
            d = d.with(v);
            assert_eq!(d.min(), Some(v));
        }
    }

    #[test]
    fn test_digit_set_max() {
        let mut d: DigitSet = DigitSet::empty();
        for v in 1..=9 {
            d = d.with(v);
            assert_eq!(d.max(), Some(v));
        }
        let mut d: DigitSet = DigitSet::empty();
        for v in (1..=9).rev() {
            d = d.with(v);
            assert_eq!(d.max(), Some(9));
        }
    }

    #[test]
    fn test_digit_set_algebra() {
        let a: DigitSet = DigitSet::of(&[1, 2, 3]);
        let b: DigitSet = DigitSet::of(&[2, 3, 4]);
        assert_eq!(a.and(b), DigitSet::of(&[2, 3]));
        assert_eq!(a.or(b), DigitSet::of(&[1, 2, 3, 4]));
        assert_eq!(a.minus(b), DigitSet::just(1));
        assert_eq!(a.complement(4), DigitSet::just(4));
        assert_eq!(DigitSet::<u16>::all(9).count(), 9);
        assert!(DigitSet::<u16>::empty().is_empty());
    }

    #[test]
    fn test_digit_set_single_and_values() {
        let d: DigitSet = DigitSet::of(&[5, 2, 9]);
        assert_eq!(d.single(), None);
        assert_eq!(d.values().collect::<Vec<_>>(), vec![2, 5, 9]);
        assert_eq!(DigitSet::<u16>::just(7).single(), Some(7));
        assert_eq!(DigitSet::<u16>::empty().single(), None);
        // Restartable: a second call starts over.
        assert_eq!(d.values().next(), Some(2));
        assert_eq!(d.values().next(), Some(2));
    }

    #[test]
    fn test_digit_set_display() {
        let d: DigitSet = DigitSet::of(&[1, 4, 9]);
        assert_eq!(format!("{}", d), "{1 4 9}");
    }

    #[test]
    fn test_cancellation_flag() {
        let c = Cancellation::none();
        assert!(c.check().is_ok());
        let c2 = c.clone();
        c2.cancel();
        assert_eq!(c.check(), Err(SolveError::Cancelled));
    }

    #[test]
    fn test_cancellation_deadline() {
        let c = Cancellation::with_deadline(Duration::ZERO);
        assert!(c.is_cancelled());
        let c = Cancellation::with_deadline(Duration::from_secs(3600));
        assert!(!c.is_cancelled());
    }

    #[test]
    fn test_error_classification() {
        assert!(SolveError::EmptyCell(CellLoc::new(0, 0)).is_contradiction());
        assert!(SolveError::violation("nope").is_contradiction());
        assert!(!SolveError::ValueOutOfRange(17).is_contradiction());
        assert!(!SolveError::Cancelled.is_contradiction());
    }
}
