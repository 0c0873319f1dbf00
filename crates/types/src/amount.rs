//! Fixed-point asset amounts.
//!
//! An [`Amount`] is an unsigned 256-bit integer scaled by `10^precision`.
//! Balances never go negative; arithmetic that would underflow or overflow
//! returns `None` and the caller maps that to a typed command error.
//!
//! The canonical string form is a plain decimal with exactly `precision`
//! fractional digits (`"10.50"` at precision 2, `"7"` at precision 0). This
//! is the representation stored in the world state, so it must be stable.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum supported precision (fractional digits).
pub const MAX_PRECISION: u8 = 38;

/// A non-negative fixed-point amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    /// Value scaled by `10^precision`.
    value: U256,
    /// Number of fractional digits.
    precision: u8,
}

impl Amount {
    /// Zero at the given precision.
    pub fn zero(precision: u8) -> Self {
        Self {
            value: U256::zero(),
            precision,
        }
    }

    /// Construct from a raw scaled value.
    pub fn from_raw(value: U256, precision: u8) -> Self {
        Self { value, precision }
    }

    /// Parse a decimal string such as `"10.50"` or `"3"`.
    ///
    /// The precision of the result equals the number of fractional digits in
    /// the input.
    pub fn parse(s: &str) -> Option<Self> {
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if frac_part.len() > MAX_PRECISION as usize {
            return None;
        }
        let digits: String = [int_part, frac_part].concat();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value = U256::from_dec_str(&digits).ok()?;
        Some(Self {
            value,
            precision: frac_part.len() as u8,
        })
    }

    /// Number of fractional digits.
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Raw scaled value.
    pub fn raw(&self) -> U256 {
        self.value
    }

    /// Rescale to a higher precision. Returns `None` if `target` is lower
    /// than the current precision or the scaled value overflows.
    pub fn with_precision(&self, target: u8) -> Option<Self> {
        if target < self.precision {
            return None;
        }
        let mut value = self.value;
        for _ in self.precision..target {
            value = value.checked_mul(U256::from(10u8))?;
        }
        Some(Self {
            value,
            precision: target,
        })
    }

    /// Checked addition. Operands align to the larger precision; overflow of
    /// the 256-bit value yields `None`.
    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        let precision = self.precision.max(other.precision);
        let lhs = self.with_precision(precision)?;
        let rhs = other.with_precision(precision)?;
        Some(Amount {
            value: lhs.value.checked_add(rhs.value)?,
            precision,
        })
    }

    /// Checked subtraction. Underflow (negative result) yields `None`.
    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        let precision = self.precision.max(other.precision);
        let lhs = self.with_precision(precision)?;
        let rhs = other.with_precision(precision)?;
        Some(Amount {
            value: lhs.value.checked_sub(rhs.value)?,
            precision,
        })
    }

    /// Canonical decimal representation with exactly `precision` fractional
    /// digits.
    pub fn to_canonical_string(&self) -> String {
        let digits = self.value.to_string();
        let precision = self.precision as usize;
        if precision == 0 {
            return digits;
        }
        if digits.len() <= precision {
            let mut out = String::from("0.");
            out.extend(std::iter::repeat('0').take(precision - digits.len()));
            out.push_str(&digits);
            out
        } else {
            let split = digits.len() - precision;
            format!("{}.{}", &digits[..split], &digits[split..])
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render() {
        let a = Amount::parse("10.50").unwrap();
        assert_eq!(a.precision(), 2);
        assert_eq!(a.to_canonical_string(), "10.50");

        let b = Amount::parse("3").unwrap();
        assert_eq!(b.precision(), 0);
        assert_eq!(b.to_canonical_string(), "3");

        let c = Amount::parse("0.05").unwrap();
        assert_eq!(c.to_canonical_string(), "0.05");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Amount::parse("").is_none());
        assert!(Amount::parse(".").is_none());
        assert!(Amount::parse("1.2.3").is_none());
        assert!(Amount::parse("-1").is_none());
        assert!(Amount::parse("1e5").is_none());
    }

    #[test]
    fn addition_aligns_precision() {
        let a = Amount::parse("10.50").unwrap();
        let b = Amount::parse("3.2").unwrap();
        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum.to_canonical_string(), "13.70");
    }

    #[test]
    fn subtraction_underflow_is_none() {
        let a = Amount::parse("1.00").unwrap();
        let b = Amount::parse("2.00").unwrap();
        assert!(a.checked_sub(&b).is_none());
        assert_eq!(
            b.checked_sub(&a).unwrap().to_canonical_string(),
            "1.00"
        );
    }

    #[test]
    fn transfer_conservation() {
        let total = Amount::parse("10.50").unwrap();
        let moved = Amount::parse("3.25").unwrap();

        let src = total.checked_sub(&moved).unwrap();
        let dst = Amount::zero(2).checked_add(&moved).unwrap();

        assert_eq!(src.to_canonical_string(), "7.25");
        assert_eq!(dst.to_canonical_string(), "3.25");
        assert_eq!(src.checked_add(&dst).unwrap(), total);
    }

    #[test]
    fn fractional_leading_zeroes() {
        let a = Amount::parse("0.001").unwrap();
        assert_eq!(a.to_canonical_string(), "0.001");
    }
}
