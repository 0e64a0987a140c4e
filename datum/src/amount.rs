//! Exact decimal amounts.
//!
//! Amounts are kept as an integer mantissa and a decimal scale so the text
//! that gets encrypted is exactly the text that comes back (`42.50` stays
//! `42.50`). Binary floating point is never involved.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Largest number of fractional digits accepted.
pub const MAX_SCALE: u32 = 18;

/// Exclusive upper bound on the absolute mantissa (`10^20`).
const MANTISSA_LIMIT: i128 = 100_000_000_000_000_000_000;

/// An exact decimal number: `mantissa * 10^-scale`.
///
/// Equality is structural, so `42.5` and `42.50` are different values with
/// different canonical text. Use [`Amount::cmp_value`] to compare numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount {
    mantissa: i128,
    scale: u32,
}

impl Amount {
    /// Creates an amount from a mantissa and scale.
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` if the scale exceeds [`MAX_SCALE`] or the
    /// mantissa has more than 20 digits.
    pub fn new(mantissa: i128, scale: u32) -> Result<Self, Error> {
        if scale > MAX_SCALE {
            return Err(Error::Parse(format!("scale {scale} exceeds maximum of {MAX_SCALE}")));
        }
        if mantissa.unsigned_abs() >= MANTISSA_LIMIT.unsigned_abs() {
            return Err(Error::Parse("amount has too many digits".to_string()));
        }
        Ok(Self { mantissa, scale })
    }

    /// Creates an amount from minor units with two decimal places (cents).
    ///
    /// # Errors
    ///
    /// Same as [`Amount::new`].
    pub fn from_cents(cents: i64) -> Result<Self, Error> {
        Self::new(i128::from(cents), 2)
    }

    /// Returns the integer mantissa.
    #[must_use]
    pub const fn mantissa(&self) -> i128 {
        self.mantissa
    }

    /// Returns the number of fractional digits.
    #[must_use]
    pub const fn scale(&self) -> u32 {
        self.scale
    }

    /// Returns `true` if the amount is greater than zero.
    #[must_use]
    pub const fn is_positive(&self) -> bool {
        self.mantissa > 0
    }

    /// Returns the same value with trailing fractional zeros removed.
    #[must_use]
    pub const fn normalized(&self) -> Self {
        let mut mantissa = self.mantissa;
        let mut scale = self.scale;
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        Self { mantissa, scale }
    }

    /// Compares two amounts by numeric value, ignoring scale.
    #[must_use]
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        let scale = self.scale.max(other.scale);
        self.rescaled(scale).cmp(&other.rescaled(scale))
    }

    // Bounded mantissa (< 10^20) times at most 10^18 always fits in i128.
    fn rescaled(&self, scale: u32) -> i128 {
        self.mantissa * 10_i128.pow(scale - self.scale)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let digits = self.mantissa.unsigned_abs();
        if self.scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let divisor = 10_u128.pow(self.scale);
        let width = self.scale as usize;
        write!(f, "{sign}{}.{:0width$}", digits / divisor, digits % divisor)
    }
}

impl FromStr for Amount {
    type Err = Error;

    /// Parses the canonical grammar `-?[0-9]+(\.[0-9]+)?`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Parse(format!("not a decimal amount: {s:?}"));

        let (negative, unsigned) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (integer, fraction) = match unsigned.split_once('.') {
            Some((integer, fraction)) => (integer, fraction),
            None => (unsigned, ""),
        };
        if integer.is_empty()
            || (unsigned.contains('.') && fraction.is_empty())
            || !integer.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let scale = u32::try_from(fraction.len()).map_err(|_| invalid())?;
        let mut mantissa: i128 = 0;
        for digit in integer.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit - b'0')))
                .filter(|m| *m < MANTISSA_LIMIT)
                .ok_or_else(|| Error::Parse("amount has too many digits".to_string()))?;
        }

        Self::new(if negative { -mantissa } else { mantissa }, scale)
    }
}

impl TryFrom<String> for Amount {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}
