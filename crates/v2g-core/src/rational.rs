//! Exact decimal-scaled quantities (`mantissa × 10^exponent`).
//!
//! Physical values travel over the wire as an int16 mantissa plus a
//! decimal exponent. This module converts between those and `f64`,
//! picking the exponent that keeps the most significant digits under a
//! caller-supplied magnitude limit.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const INT_16_MIN: i32 = i16::MIN as i32;
pub const INT_16_MAX: i32 = i16::MAX as i32;

/// Smallest exponent `encode` will choose.
pub const MIN_EXPONENT: i8 = -3;
/// Largest exponent `encode` will choose.
pub const MAX_EXPONENT: i8 = 3;

/// Scaled values closer than this to an integer are snapped to it before
/// truncation, so `2.34 × 10^2` yields 234 and not 233.
const SNAP_EPSILON: f64 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RangeError {
    #[error("value {value} is not a finite number")]
    NotFinite { value: f64 },
    #[error("negative value {value} not allowed for a range starting at 0")]
    Negative { value: f64 },
    #[error("value {value} exceeds limit {limit} even with exponent {max_exponent}")]
    Overflow {
        value: f64,
        limit: f64,
        max_exponent: i8,
    },
}

/// A physical value as `mantissa × 10^exponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RationalQuantity {
    mantissa: i16,
    exponent: i8,
}

impl RationalQuantity {
    pub const ZERO: Self = Self::new(0, 0);

    pub const fn new(mantissa: i16, exponent: i8) -> Self {
        Self { mantissa, exponent }
    }

    pub fn mantissa(&self) -> i16 {
        self.mantissa
    }

    pub fn exponent(&self) -> i8 {
        self.exponent
    }

    /// Decoded physical value.
    pub fn decode(&self) -> f64 {
        let m = self.mantissa as f64;
        if self.exponent >= 0 {
            m * 10f64.powi(self.exponent as i32)
        } else {
            // Dividing by an exact power of ten avoids the representation
            // error of 10^-n.
            m / 10f64.powi(-(self.exponent as i32))
        }
    }

    /// Encode with the full int16 range as limit and negatives allowed.
    pub fn from_f64(value: f64) -> Result<Self, RangeError> {
        let limit = if value < 0.0 { -(INT_16_MIN as f64) } else { INT_16_MAX as f64 };
        Self::encode(value, limit, true)
    }

    /// Find the best-fit exponent in `[-3, 3]` for `value` under `magnitude_limit`.
    pub fn encode(
        value: f64,
        magnitude_limit: f64,
        allow_negative: bool,
    ) -> Result<Self, RangeError> {
        if !value.is_finite() {
            return Err(RangeError::NotFinite { value });
        }
        if value == 0.0 {
            return Ok(Self::ZERO);
        }
        if value < 0.0 && !allow_negative {
            return Err(RangeError::Negative { value });
        }

        let limit = if value < 0.0 {
            magnitude_limit.abs().min(-(INT_16_MIN as f64))
        } else {
            magnitude_limit.abs().min(INT_16_MAX as f64)
        };

        let magnitude = value.abs();
        let ratio = magnitude / limit;
        if ratio > 0.1 && ratio <= 1.0 {
            return Ok(Self::new(scale(value, 0), 0));
        }

        let mut exponent: i8 = 0;
        let mut scaled = magnitude;

        if magnitude < limit {
            while scaled < limit && exponent > MIN_EXPONENT {
                exponent -= 1;
                scaled *= 10.0;
            }
            if snap(scaled) > limit {
                exponent += 1;
            } else if snap(scaled).trunc() == 0.0 {
                // Too small for the smallest exponent.
                return Ok(Self::ZERO);
            }
        } else {
            while scaled > limit && exponent < MAX_EXPONENT {
                exponent += 1;
                scaled /= 10.0;
            }
            if snap(scaled) > limit {
                return Err(RangeError::Overflow {
                    value,
                    limit,
                    max_exponent: MAX_EXPONENT,
                });
            }
        }

        Ok(Self::new(scale(value, exponent), exponent))
    }
}

impl fmt::Display for RationalQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}e{}", self.mantissa, self.exponent)
    }
}

fn snap(v: f64) -> f64 {
    let rounded = v.round();
    if (v - rounded).abs() < SNAP_EPSILON {
        rounded
    } else {
        v
    }
}

/// `value × 10^-exponent` truncated toward zero. Callers guarantee the
/// result fits in an i16.
fn scale(value: f64, exponent: i8) -> i16 {
    let scaled = if exponent >= 0 {
        value / 10f64.powi(exponent as i32)
    } else {
        value * 10f64.powi(-(exponent as i32))
    };
    let truncated = snap(scaled).trunc();
    truncated.clamp(INT_16_MIN as f64, INT_16_MAX as f64) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc400(v: f64) -> (i8, i16) {
        let q = RationalQuantity::encode(v, 400.0, false).unwrap();
        (q.exponent(), q.mantissa())
    }

    #[test]
    fn test_decode() {
        assert_eq!(RationalQuantity::new(300, 2).decode(), 30000.0);
        assert_eq!(RationalQuantity::new(100, 0).decode(), 100.0);
        assert_eq!(RationalQuantity::new(10000, -2).decode(), 100.0);
        assert_eq!(RationalQuantity::new(-10, 3).decode(), -10000.0);
    }

    #[test]
    fn test_encode_reference_table_limit_400() {
        assert_eq!(enc400(0.0000234), (0, 0));
        assert_eq!(enc400(0.0234), (-3, 23));
        assert_eq!(enc400(0.234), (-3, 234));
        assert_eq!(enc400(2.34), (-2, 234));
        assert_eq!(enc400(23.4), (-1, 234));
        assert_eq!(enc400(234.0), (0, 234));
        assert_eq!(enc400(2340.0), (1, 234));
        assert_eq!(enc400(23400.0), (2, 234));
        assert_eq!(enc400(234000.0), (3, 234));
        assert_eq!(enc400(0.4), (-3, 400));
        assert_eq!(enc400(0.356), (-3, 356));
        assert_eq!(enc400(0.00356), (-3, 3));
        assert_eq!(enc400(0.634), (-2, 63));
    }

    #[test]
    fn test_encode_int16_limit() {
        let q = RationalQuantity::from_f64(100.0).unwrap();
        assert_eq!((q.mantissa(), q.exponent()), (10000, -2));
        let q = RationalQuantity::from_f64(10.0).unwrap();
        assert_eq!((q.mantissa(), q.exponent()), (10000, -3));
        let q = RationalQuantity::from_f64(30000.0).unwrap();
        assert_eq!((q.mantissa(), q.exponent()), (30000, 0));
        let q = RationalQuantity::from_f64(200000.0).unwrap();
        assert_eq!((q.mantissa(), q.exponent()), (20000, 1));
    }

    #[test]
    fn test_encode_zero() {
        assert_eq!(
            RationalQuantity::encode(0.0, 1.0, false).unwrap(),
            RationalQuantity::ZERO
        );
    }

    #[test]
    fn test_encode_overflow_is_error() {
        let err = RationalQuantity::encode(4_000_000.0, 400.0, false).unwrap_err();
        assert!(matches!(err, RangeError::Overflow { .. }));
        assert!(RationalQuantity::from_f64(1.0e9).is_err());
    }

    #[test]
    fn test_encode_negative() {
        assert!(matches!(
            RationalQuantity::encode(-5.0, 400.0, false),
            Err(RangeError::Negative { .. })
        ));
        let q = RationalQuantity::from_f64(-10000.0).unwrap();
        assert_eq!(q.decode(), -10000.0);
        let q = RationalQuantity::from_f64(-32768.0).unwrap();
        assert_eq!((q.mantissa(), q.exponent()), (-32768, 0));
    }

    #[test]
    fn test_encode_not_finite() {
        assert!(RationalQuantity::from_f64(f64::NAN).is_err());
        assert!(RationalQuantity::from_f64(f64::INFINITY).is_err());
    }

    #[test]
    fn test_encode_within_one_unit_of_chosen_exponent() {
        let limits = [400.0, 1000.0, 32767.0];
        let values = [
            0.5, 1.25, 3.3, 17.0, 99.9, 123.456, 999.0, 4567.8, 22000.0, 31999.0, 250_000.0,
        ];
        for &limit in &limits {
            for &v in &values {
                let Ok(q) = RationalQuantity::encode(v, limit, true) else {
                    continue;
                };
                let unit = 10f64.powi(q.exponent() as i32);
                assert!(
                    (q.decode() - v).abs() <= unit,
                    "v={v} limit={limit} got {q}"
                );
                assert!((q.mantissa() as f64).abs() <= limit.min(32767.0));
            }
        }
    }
}
