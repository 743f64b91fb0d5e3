//! Log-domain numeric backend for long trellises
//!
//! Stores a sign and the natural log of the magnitude, so products of
//! thousands of probabilities neither underflow nor overflow. Multiplication
//! and division are addition and subtraction of logs; addition uses
//! `max + ln(1 + e^-d)` with the correction term read from a precomputed
//! table.

use std::cmp::Ordering;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign};
use std::sync::OnceLock;

use crate::real::Real;

/// Number of entries in the log-sum-exp correction table
const TABLE_SIZE: usize = 1 << 16;
/// Correction term is below 1e-14 for differences beyond this point
const TABLE_RANGE: f64 = 32.0;

fn correction_table() -> &'static [f64; TABLE_SIZE] {
    static TABLE: OnceLock<Box<[f64; TABLE_SIZE]>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = Box::new([0.0; TABLE_SIZE]);
        #[allow(clippy::cast_precision_loss)]
        for (idx, entry) in table.iter_mut().enumerate() {
            let diff = idx as f64 * TABLE_RANGE / TABLE_SIZE as f64;
            *entry = (-diff).exp().ln_1p();
        }
        table
    })
}

/// Returns `ln(1 + e^-diff)` for `diff >= 0`, by linear interpolation into
/// the precomputed table.
fn log_sum_exp_correction(diff: f64) -> f64 {
    debug_assert!(diff >= 0.0);
    #[allow(clippy::cast_precision_loss)]
    let pos = diff * (TABLE_SIZE as f64 / TABLE_RANGE);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let idx = pos as usize;
    if idx + 1 >= TABLE_SIZE {
        return 0.0;
    }
    let table = correction_table();
    #[allow(clippy::cast_precision_loss)]
    let frac = pos - idx as f64;
    table[idx] * (1.0 - frac) + table[idx + 1] * frac
}

/// Signed real number held as sign and log-magnitude
///
/// Zero is represented by a log-magnitude of `-inf`. The decoders only ever
/// hold non-negative values, but the sign is carried so that the type is a
/// faithful field for callers that difference probabilities.
#[derive(Clone, Debug, Copy)]
pub struct LogReal {
    /// `true` for negative values
    negative: bool,
    /// Natural log of the magnitude (`-inf` encodes zero)
    logmag: f64,
}

impl LogReal {
    /// Returns the log-magnitude (`-inf` for zero).
    #[must_use]
    pub fn ln(self) -> f64 {
        self.logmag
    }

    /// Returns the sum of two magnitudes in log domain.
    fn add_magnitudes(a: f64, b: f64) -> f64 {
        if a == f64::NEG_INFINITY {
            return b;
        }
        if b == f64::NEG_INFINITY {
            return a;
        }
        let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
        hi + log_sum_exp_correction(hi - lo)
    }

    /// Returns the difference of two magnitudes in log domain (`a >= b`).
    fn sub_magnitudes(a: f64, b: f64) -> f64 {
        if b == f64::NEG_INFINITY {
            return a;
        }
        debug_assert!(a >= b);
        let diff = a - b;
        if diff == 0.0 {
            return f64::NEG_INFINITY;
        }
        a + (-(-diff).exp()).ln_1p()
    }
}

impl Real for LogReal {
    fn zero() -> Self {
        Self {
            negative: false,
            logmag: f64::NEG_INFINITY,
        }
    }

    fn one() -> Self {
        Self {
            negative: false,
            logmag: 0.0,
        }
    }

    fn from_f64(x: f64) -> Self {
        Self {
            negative: x < 0.0,
            logmag: x.abs().ln(),
        }
    }

    fn to_f64(self) -> f64 {
        let mag = self.logmag.exp();
        if self.negative {
            -mag
        } else {
            mag
        }
    }

    fn recip(self) -> Self {
        Self {
            negative: self.negative,
            logmag: -self.logmag,
        }
    }

    fn is_zero(self) -> bool {
        self.logmag == f64::NEG_INFINITY
    }
}

impl Add for LogReal {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        if self.negative == rhs.negative {
            return Self {
                negative: self.negative,
                logmag: Self::add_magnitudes(self.logmag, rhs.logmag),
            };
        }
        // opposite signs: subtract the smaller magnitude from the larger
        let (big, small) = if self.logmag >= rhs.logmag {
            (self, rhs)
        } else {
            (rhs, self)
        };
        let logmag = Self::sub_magnitudes(big.logmag, small.logmag);
        Self {
            negative: big.negative && logmag != f64::NEG_INFINITY,
            logmag,
        }
    }
}

impl AddAssign for LogReal {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Mul for LogReal {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            negative: self.negative != rhs.negative,
            logmag: self.logmag + rhs.logmag,
        }
    }
}

impl MulAssign for LogReal {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl Div for LogReal {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        Self {
            negative: self.negative != rhs.negative,
            logmag: self.logmag - rhs.logmag,
        }
    }
}

impl PartialEq for LogReal {
    fn eq(&self, other: &Self) -> bool {
        if self.is_zero() && other.is_zero() {
            return true;
        }
        self.negative == other.negative && self.logmag == other.logmag
    }
}

impl PartialOrd for LogReal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.negative, other.negative) {
            (false, true) => Some(Ordering::Greater),
            (true, false) => Some(Ordering::Less),
            (false, false) => self.logmag.partial_cmp(&other.logmag),
            (true, true) => other.logmag.partial_cmp(&self.logmag),
        }
    }
}
