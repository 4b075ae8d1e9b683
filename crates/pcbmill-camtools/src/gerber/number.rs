//! Coordinate number format
//!
//! Coordinates without a decimal point are digit strings whose meaning is
//! fixed by the `%FS` statement: integer and fraction digit counts plus the
//! zero-suppression mode.

use serde::{Deserialize, Serialize};

/// Which zeros a producer omits from coordinate digit strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroSuppression {
    /// Leading zeros omitted (`L`)
    #[default]
    Leading,
    /// Trailing zeros omitted (`T`)
    Trailing,
    /// Nothing omitted (`D`)
    None,
}

impl ZeroSuppression {
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "L" => Some(Self::Leading),
            "T" => Some(Self::Trailing),
            "D" => Some(Self::None),
            _ => None,
        }
    }
}

/// Digit layout of coordinate values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateFormat {
    pub integer: u32,
    pub fraction: u32,
    pub zeros: ZeroSuppression,
}

impl Default for CoordinateFormat {
    fn default() -> Self {
        Self {
            integer: 3,
            fraction: 4,
            zeros: ZeroSuppression::Leading,
        }
    }
}

impl CoordinateFormat {
    pub fn new(integer: u32, fraction: u32, zeros: ZeroSuppression) -> Self {
        Self {
            integer,
            fraction,
            zeros,
        }
    }

    /// Decode a coordinate string.
    ///
    /// Strings with a decimal point are read as plain numbers. Otherwise
    /// `L` and `D` give `int * 10^-F`, and `T` pads the digits (sign not
    /// counted) to `I + F` before scaling.
    pub fn decode(&self, text: &str) -> Option<f64> {
        let text = text.trim();
        if text.contains('.') {
            return text.parse().ok();
        }
        let (negative, digits) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let int: f64 = digits.parse().ok()?;

        let exponent = match self.zeros {
            ZeroSuppression::Leading | ZeroSuppression::None => -(self.fraction as i32),
            ZeroSuppression::Trailing => {
                (self.integer + self.fraction) as i32 - digits.len() as i32
                    - self.fraction as i32
            }
        };
        let value = if exponent >= 0 {
            int * 10f64.powi(exponent)
        } else {
            int / 10f64.powi(-exponent)
        };
        Some(if negative { -value } else { value })
    }

    /// Encode a value the way a producer using this format would write it
    pub fn encode(&self, value: f64) -> String {
        let scaled = (value.abs() * 10f64.powi(self.fraction as i32)).round() as u64;
        let width = (self.integer + self.fraction) as usize;
        let padded = format!("{:0width$}", scaled, width = width);
        let digits = match self.zeros {
            ZeroSuppression::Leading => scaled.to_string(),
            ZeroSuppression::None => padded,
            ZeroSuppression::Trailing => {
                let trimmed = padded.trim_end_matches('0');
                if trimmed.is_empty() {
                    "0".to_string()
                } else {
                    trimmed.to_string()
                }
            }
        };
        if value < 0.0 && scaled != 0 {
            format!("-{}", digits)
        } else {
            digits
        }
    }
}
