//! Gerber parser state
//!
//! Everything that a statement can read or change, grouped in one record.
//! The geometry buffers live in the parser, not here.

use super::arc::ArcDirection;
use super::number::CoordinateFormat;
use crate::geometry::Coord;
use pcbmill_core::Units;

/// Interpolation mode selected by `G01`/`G02`/`G03`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Linear,
    Clockwise,
    CounterClockwise,
}

impl Interpolation {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Linear),
            2 => Some(Self::Clockwise),
            3 => Some(Self::CounterClockwise),
            _ => None,
        }
    }

    pub fn arc_direction(self) -> Option<ArcDirection> {
        match self {
            Self::Linear => None,
            Self::Clockwise => Some(ArcDirection::Clockwise),
            Self::CounterClockwise => Some(ArcDirection::CounterClockwise),
        }
    }
}

/// Operation code `D01`/`D02`/`D03`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    /// Pen down: interpolate
    Interpolate,
    /// Pen up: move
    #[default]
    Move,
    Flash,
}

impl Operation {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Interpolate),
            2 => Some(Self::Move),
            3 => Some(Self::Flash),
            _ => None,
        }
    }
}

/// Arc center convention (`G74` single, `G75` multi)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadrantMode {
    Single,
    Multi,
}

/// Level polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    Dark,
    Clear,
}

/// The aperture draws currently go to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurrentAperture {
    /// Nothing selected yet
    #[default]
    None,
    Defined(u32),
    /// An undefined id was selected; geometry is suppressed
    Failure(u32),
}

/// Mutable parser state
#[derive(Debug, Clone, PartialEq)]
pub struct ParserState {
    pub format: CoordinateFormat,
    pub units: Units,
    pub aperture: CurrentAperture,
    pub interpolation: Interpolation,
    pub operation: Operation,
    pub quadrant: Option<QuadrantMode>,
    pub polarity: Polarity,
    pub making_region: bool,
    /// Points accumulated since the last pen-up
    pub path: Vec<Coord<f64>>,
    pub current: Coord<f64>,
    /// Simplification tolerance in file units
    pub tolerance: Option<f64>,
}

impl Default for ParserState {
    fn default() -> Self {
        Self {
            format: CoordinateFormat::default(),
            units: Units::Inch,
            aperture: CurrentAperture::None,
            interpolation: Interpolation::Linear,
            operation: Operation::Move,
            quadrant: None,
            polarity: Polarity::Dark,
            making_region: false,
            path: Vec::new(),
            current: Coord { x: 0.0, y: 0.0 },
            tolerance: None,
        }
    }
}

impl ParserState {
    /// Switch units and rescale a millimeter simplification tolerance
    pub fn set_units(&mut self, units: Units, tolerance_mm: Option<f64>) {
        self.units = units;
        self.tolerance = tolerance_mm.map(|t| units.from_mm(t));
    }
}
