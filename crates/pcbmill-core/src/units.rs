//! Unit conversion utilities
//!
//! Gerber and Excellon sources declare their linear unit (`%MOIN*%`,
//! `%MOMM*%`, `G70`/`G71`, `INCH`/`METRIC`). Geometry is kept in the
//! source unit and converted on demand.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Millimeters per inch
pub const MM_PER_INCH: f64 = 25.4;

/// Linear unit of a source file or of generated G-code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Inches
    Inch,
    /// Millimeters
    #[default]
    Mm,
}

impl Units {
    /// Factor that converts a length in `self` into a length in `target`
    pub fn factor_to(self, target: Units) -> f64 {
        match (self, target) {
            (Units::Inch, Units::Mm) => MM_PER_INCH,
            (Units::Mm, Units::Inch) => 1.0 / MM_PER_INCH,
            _ => 1.0,
        }
    }

    /// Convert a value expressed in millimeters into this unit
    pub fn from_mm(self, value_mm: f64) -> f64 {
        value_mm * Units::Mm.factor_to(self)
    }

    /// The G-code word selecting this unit
    pub fn gcode_word(self) -> &'static str {
        match self {
            Units::Inch => "G20",
            Units::Mm => "G21",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inch => write!(f, "IN"),
            Self::Mm => write!(f, "MM"),
        }
    }
}

impl FromStr for Units {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "in" | "inch" | "inches" | "imperial" => Ok(Self::Inch),
            "mm" | "metric" | "millimeters" => Ok(Self::Mm),
            other => Err(crate::Error::UnknownUnit(other.to_string())),
        }
    }
}
