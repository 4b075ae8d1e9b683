//! Gerber RS-274X import
//!
//! Converts Gerber artwork into a [`GeometryObject`]: one tool table entry
//! per aperture with the fragments drawn by it, the merged solid geometry
//! and the follow (centerline) geometry.
//!
//! Parsing has three outcomes. `Ok` with [`ParseStatus::Success`],
//! `Ok` with [`ParseStatus::Defective`] when geometry was produced despite
//! structural problems, and `Err` when nothing usable came out or the
//! parse was cancelled.

pub mod arc;
pub mod number;
pub mod parser;
pub mod source;
pub mod state;
pub mod statement;

pub use arc::{arc_points, interpolate, ArcDirection};
pub use number::{CoordinateFormat, ZeroSuppression};
pub use parser::GerberParser;
pub use source::{detect, SourceKind, SourceLine};
pub use state::{CurrentAperture, Interpolation, Operation, ParserState, Polarity, QuadrantMode};
pub use statement::{classify, Draw, Statement};

use crate::error::{CamToolResult, GerberError, GerberResult};
use crate::geometry::MergeStrategy;
use crate::model::GeometryObject;
use pcbmill_core::CancellationToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Gerber import options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GerberOptions {
    /// Segments used to approximate a full circle
    pub steps_per_circle: u32,
    /// Decimal places for aperture sizing; zero-size apertures become
    /// `10^-decimals`
    pub decimals: u32,
    pub merge: MergeStrategy,
    /// Simplification tolerance in millimeters
    pub simplification: Option<f64>,
}

impl Default for GerberOptions {
    fn default() -> Self {
        Self {
            steps_per_circle: 64,
            decimals: 4,
            merge: MergeStrategy::BufferUnion,
            simplification: None,
        }
    }
}

impl GerberOptions {
    /// Size given to apertures declared with zero size
    pub fn epsilon(&self) -> f64 {
        10f64.powi(-(self.decimals as i32))
    }
}

/// A structural problem that did not stop the parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Defect {
    /// `Dnn` selected before `%ADDnn...%`
    UndefinedAperture { id: u32, line: usize },
    /// A region contour intersected itself and was repaired
    RepairedRegion { line: usize },
    /// A macro aperture could not be expanded and was left undefined
    InvalidMacro {
        id: u32,
        name: String,
        line: usize,
        reason: String,
    },
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Defect::UndefinedAperture { id, line } => {
                write!(f, "line {}: aperture D{} is not defined", line, id)
            }
            Defect::RepairedRegion { line } => {
                write!(f, "line {}: invalid region polygon repaired", line)
            }
            Defect::InvalidMacro {
                id,
                name,
                line,
                reason,
            } => write!(
                f,
                "line {}: aperture D{} skipped, macro {} is invalid: {}",
                line, id, name, reason
            ),
        }
    }
}

/// Quality of a successful parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ParseStatus {
    Success,
    Defective(Vec<Defect>),
}

impl ParseStatus {
    pub fn is_defective(&self) -> bool {
        matches!(self, ParseStatus::Defective(_))
    }
}

/// Parse result
#[derive(Debug, Clone)]
pub struct ParsedGerber {
    pub geometry: GeometryObject,
    pub status: ParseStatus,
    pub kind: SourceKind,
}

/// Parse Gerber text.
///
/// Multi-line `%AM` blocks are collected until a statement ends with `%`
/// and handed to the parser whole.
pub fn parse(
    text: &str,
    options: &GerberOptions,
    cancel: &CancellationToken,
) -> GerberResult<ParsedGerber> {
    let kind = detect(text);
    match kind {
        SourceKind::Excellon => warn!("input looks like an Excellon drill file"),
        SourceKind::GerberX2 => debug!("Gerber X2 attributes present, ignoring them"),
        SourceKind::Rs274x => {}
    }

    let mut parser = GerberParser::new(options.clone(), cancel.clone());
    let mut pending_macro: Option<SourceLine> = None;

    for line in source::statements(text) {
        if cancel.is_cancelled() {
            return Err(GerberError::Cancelled);
        }
        if let Some(mut block) = pending_macro.take() {
            block.text.push_str(&line.text);
            if block.text.ends_with('%') {
                parser.feed(&block)?;
            } else {
                pending_macro = Some(block);
            }
            continue;
        }
        if line.text.starts_with("%AM") && !line.text.ends_with('%') {
            pending_macro = Some(line);
            continue;
        }
        parser.feed(&line)?;
    }
    if let Some(block) = pending_macro {
        warn!("line {}: unterminated aperture macro", block.number);
    }

    let (geometry, status) = parser.finish()?;
    info!(
        "parsed Gerber: {} apertures, {} polygons, {:?}",
        geometry.tools.len(),
        geometry.solid_geometry.0.len(),
        status
    );
    Ok(ParsedGerber {
        geometry,
        status,
        kind,
    })
}

/// Read and parse a Gerber file
pub fn parse_file(
    path: impl AsRef<Path>,
    options: &GerberOptions,
    cancel: &CancellationToken,
) -> CamToolResult<ParsedGerber> {
    let text = std::fs::read_to_string(path.as_ref())?;
    Ok(parse(&text, options, cancel)?)
}
