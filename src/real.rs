//! Arithmetic abstraction over the numeric representations used for state metrics
//!
//! The forward/backward recursions multiply long chains of probabilities, so the
//! decoders are generic over the representation used for their internal metrics:
//! plain [`f64`] when the block is short enough for row-maximum normalisation to
//! hold the dynamic range, or [`LogReal`](crate::LogReal) when it is not.
//! Posterior tables handed back to callers are always plain `f64`.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign};

/// Arithmetic required of a state-metric representation
///
/// Implementations must behave like non-negative reals under `+`, `*` and `/`;
/// comparison via [`PartialOrd`] is used for row-maximum normalisation and for
/// hard decisions.
pub trait Real:
    Copy
    + Clone
    + Debug
    + PartialOrd
    + Add<Output = Self>
    + AddAssign
    + Mul<Output = Self>
    + MulAssign
    + Div<Output = Self>
{
    /// Returns the additive identity.
    fn zero() -> Self;

    /// Returns the multiplicative identity.
    fn one() -> Self;

    /// Converts from a plain double.
    fn from_f64(x: f64) -> Self;

    /// Converts to a plain double.
    fn to_f64(self) -> f64;

    /// Returns the reciprocal.
    fn recip(self) -> Self;

    /// Returns `true` iff the value is zero.
    fn is_zero(self) -> bool;
}

impl Real for f64 {
    fn zero() -> Self {
        0.0
    }

    fn one() -> Self {
        1.0
    }

    fn from_f64(x: f64) -> Self {
        x
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn recip(self) -> Self {
        1.0 / self
    }

    fn is_zero(self) -> bool {
        self == 0.0
    }
}
