//! Excellon drill file import
//!
//! Reads the header tool table, unit and zero-suppression declarations and
//! the drill hits and `G85` slots of the body. The result uses the same
//! geometry object model as Gerber import: one tool table entry per drill
//! with a point fragment per hit and a line fragment per slot.
//!
//! In Excellon `LZ` means leading zeros are *kept*, so the trailing ones
//! are the omitted ones (and `TZ` the other way round).

use crate::aperture::Aperture;
use crate::error::{CamToolResult, ExcellonError, ExcellonResult};
use crate::geometry::{self, Coord, LineString, MergeStrategy, Point, Shape};
use crate::gerber::{CoordinateFormat, ZeroSuppression};
use crate::model::{Fragment, GeometryObject, ToolEntry};
use geo::Area;
use pcbmill_core::{CancellationToken, Units};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static UNITS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(INCH|METRIC)(?:,(LZ|TZ))?(?:,(0*)\.(0*))?").expect("valid regex")
});
static FILE_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"FILE_FORMAT=(\d+):(\d+)").expect("valid regex"));
static TOOL_DEFINITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^T(\d+)(?:[FSBHZ][\d.+-]*)*C([\d.]+)").expect("valid regex"));
static TOOL_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^T(\d+)$").expect("valid regex"));
static HIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:G0?[05])?(?:X([+-]?[\d.]+))?(?:Y([+-]?[\d.]+))?$").expect("valid regex")
});
static SLOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:X([+-]?[\d.]+))?(?:Y([+-]?[\d.]+))?G85(?:X([+-]?[\d.]+))?(?:Y([+-]?[\d.]+))?$",
    )
    .expect("valid regex")
});

/// Defaults used until the file header overrides them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcellonOptions {
    pub format: CoordinateFormat,
    pub units: Units,
    pub steps_per_circle: u32,
    pub merge: MergeStrategy,
}

impl Default for ExcellonOptions {
    fn default() -> Self {
        Self {
            format: CoordinateFormat::new(2, 4, ZeroSuppression::Leading),
            units: Units::Inch,
            steps_per_circle: 64,
            merge: MergeStrategy::BufferUnion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Header,
    Body,
}

struct ExcellonReader {
    steps: u32,
    format: CoordinateFormat,
    /// Set once the header gave explicit digit counts
    explicit_digits: bool,
    section: Section,
    object: GeometryObject,
    current_tool: Option<u32>,
    current: Coord<f64>,
    hits: usize,
    line_number: usize,
    content: String,
}

impl ExcellonReader {
    fn fail(&self, reason: impl Into<String>) -> ExcellonError {
        ExcellonError::Line {
            line_number: self.line_number,
            content: self.content.clone(),
            reason: reason.into(),
        }
    }

    fn set_units(&mut self, units: Units) {
        if !self.explicit_digits {
            self.format.integer = match units {
                Units::Inch => 2,
                Units::Mm => 3,
            };
            self.format.fraction = match units {
                Units::Inch => 4,
                Units::Mm => 3,
            };
        }
        self.object.units = units;
    }

    fn value(&self, text: Option<&str>, fallback: f64) -> ExcellonResult<f64> {
        match text {
            None => Ok(fallback),
            Some(t) => self
                .format
                .decode(t)
                .ok_or_else(|| self.fail(format!("malformed coordinate '{}'", t))),
        }
    }

    fn line(&mut self, text: &str) -> ExcellonResult<()> {
        if let Some(comment) = text.strip_prefix(';') {
            if let Some(caps) = FILE_FORMAT.captures(comment) {
                self.format.integer = caps[1].parse().unwrap_or(self.format.integer);
                self.format.fraction = caps[2].parse().unwrap_or(self.format.fraction);
                self.explicit_digits = true;
                debug!("file format {}:{}", self.format.integer, self.format.fraction);
            }
            return Ok(());
        }
        match text {
            "M48" => {
                self.section = Section::Header;
                return Ok(());
            }
            "%" | "M95" if self.section == Section::Header => {
                self.section = Section::Body;
                return Ok(());
            }
            "M71" => {
                self.set_units(Units::Mm);
                return Ok(());
            }
            "M72" => {
                self.set_units(Units::Inch);
                return Ok(());
            }
            "M30" | "M00" => {
                debug!("line {}: end of program", self.line_number);
                return Ok(());
            }
            _ => {}
        }

        if let Some(caps) = UNITS.captures(text) {
            self.set_units(if &caps[1] == "INCH" {
                Units::Inch
            } else {
                Units::Mm
            });
            match caps.get(2).map(|m| m.as_str()) {
                Some("LZ") => self.format.zeros = ZeroSuppression::Trailing,
                Some("TZ") => self.format.zeros = ZeroSuppression::Leading,
                _ => {}
            }
            if let (Some(int), Some(frac)) = (caps.get(3), caps.get(4)) {
                self.format.integer = int.as_str().len() as u32;
                self.format.fraction = frac.as_str().len() as u32;
                self.explicit_digits = true;
            }
            return Ok(());
        }

        if let Some(caps) = TOOL_DEFINITION.captures(text) {
            let id: u32 = caps[1].parse().map_err(|_| self.fail("bad tool number"))?;
            let diameter: f64 = caps[2].parse().map_err(|_| self.fail("bad tool diameter"))?;
            debug!("tool T{} diameter {}", id, diameter);
            self.object
                .tools
                .insert(id, ToolEntry::new(Aperture::circle(diameter)));
            if self.section == Section::Body {
                self.current_tool = Some(id);
            }
            return Ok(());
        }

        if self.section == Section::Header {
            debug!("line {}: header statement '{}' ignored", self.line_number, text);
            return Ok(());
        }

        if let Some(caps) = TOOL_SELECT.captures(text) {
            let id: u32 = caps[1].parse().map_err(|_| self.fail("bad tool number"))?;
            self.current_tool = (id != 0).then_some(id);
            if id != 0 && !self.object.tools.contains_key(&id) {
                warn!(
                    "line {}: tool T{} has no diameter, its hits are dropped",
                    self.line_number, id
                );
            }
            return Ok(());
        }

        if let Some(caps) = SLOT.captures(text) {
            let start = Coord {
                x: self.value(caps.get(1).map(|m| m.as_str()), self.current.x)?,
                y: self.value(caps.get(2).map(|m| m.as_str()), self.current.y)?,
            };
            let end = Coord {
                x: self.value(caps.get(3).map(|m| m.as_str()), start.x)?,
                y: self.value(caps.get(4).map(|m| m.as_str()), start.y)?,
            };
            self.current = end;
            self.slot(start, end);
            return Ok(());
        }

        if let Some(caps) = HIT.captures(text) {
            if caps.get(1).is_none() && caps.get(2).is_none() {
                debug!("line {}: '{}' ignored", self.line_number, text);
                return Ok(());
            }
            let at = Coord {
                x: self.value(caps.get(1).map(|m| m.as_str()), self.current.x)?,
                y: self.value(caps.get(2).map(|m| m.as_str()), self.current.y)?,
            };
            self.current = at;
            self.hit(at);
            return Ok(());
        }

        debug!("line {}: '{}' ignored", self.line_number, text);
        Ok(())
    }

    fn hit(&mut self, at: Coord<f64>) {
        let steps = self.steps;
        let Some(entry) = self.current_tool.and_then(|id| self.object.tools.get_mut(&id)) else {
            warn!("line {}: drill hit without a tool", self.line_number);
            return;
        };
        let disc = geometry::circle(at, entry.aperture.size / 2.0, steps);
        entry.fragments.push(Fragment {
            solid: Some(Shape::from(disc)),
            follow: Some(Shape::Point(Point(at))),
            clear: None,
        });
        self.object.follow_geometry.push(Shape::Point(Point(at)));
        self.hits += 1;
    }

    fn slot(&mut self, start: Coord<f64>, end: Coord<f64>) {
        let steps = self.steps;
        let Some(entry) = self.current_tool.and_then(|id| self.object.tools.get_mut(&id)) else {
            warn!("line {}: slot without a tool", self.line_number);
            return;
        };
        let path = LineString::new(vec![start, end]);
        let swath = geometry::stroke(&path, entry.aperture.size, steps);
        entry.fragments.push(Fragment {
            solid: Some(Shape::Area(swath)),
            follow: Some(Shape::Line(path.clone())),
            clear: None,
        });
        self.object.follow_geometry.push(Shape::Line(path));
        self.hits += 1;
    }
}

/// Parse Excellon text into a geometry object
pub fn parse(
    text: &str,
    options: &ExcellonOptions,
    cancel: &CancellationToken,
) -> ExcellonResult<GeometryObject> {
    let mut reader = ExcellonReader {
        steps: options.steps_per_circle,
        format: options.format,
        explicit_digits: false,
        section: Section::Preamble,
        object: GeometryObject::new(options.units, options.steps_per_circle),
        current_tool: None,
        current: Coord { x: 0.0, y: 0.0 },
        hits: 0,
        line_number: 0,
        content: String::new(),
    };

    for (index, raw) in text.lines().enumerate() {
        if cancel.is_cancelled() {
            return Err(ExcellonError::Cancelled);
        }
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        reader.line_number = index + 1;
        reader.content = line.to_string();
        reader.line(line)?;
    }

    if reader.hits == 0 {
        return Err(ExcellonError::Empty);
    }

    let solids: Vec<_> = reader
        .object
        .fragment_shapes()
        .filter_map(|shape| match shape {
            Shape::Area(mp) => Some(mp.0.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    reader.object.solid_geometry = geometry::merge(solids, options.merge);
    reader.object.tools.retain(|_, entry| !entry.fragments.is_empty());

    info!(
        "parsed Excellon: {} tools, {} hits",
        reader.object.tools.len(),
        reader.hits
    );
    Ok(reader.object)
}

/// Read and parse an Excellon file
pub fn parse_file(
    path: impl AsRef<Path>,
    options: &ExcellonOptions,
    cancel: &CancellationToken,
) -> CamToolResult<GeometryObject> {
    let text = std::fs::read_to_string(path.as_ref())?;
    Ok(parse(&text, options, cancel)?)
}

/// Total drilled area, handy for sanity checks
pub fn drilled_area(object: &GeometryObject) -> f64 {
    object.solid_geometry.unsigned_area()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KICAD: &str = "M48
; DRILL file {KiCad 7.0.0} date 2024-01-01
; FORMAT={-:-/ absolute / metric / decimal}
; #@! TF.FileFunction,Plated,1,2,PTH
FMAT,2
METRIC
T1C0.800
T2C1.000
%
G90
G05
T1
X10.0Y20.0
X15.0Y20.0
T2
X30.0Y5.0
T0
M30
";

    fn parse_text(text: &str) -> ExcellonResult<GeometryObject> {
        parse(text, &ExcellonOptions::default(), &CancellationToken::new())
    }

    #[test]
    fn test_kicad_decimal_file() {
        let object = parse_text(KICAD).unwrap();
        assert_eq!(object.units, Units::Mm);
        assert_eq!(object.tools.len(), 2);
        assert_eq!(
            object.drill_locations(1),
            vec![Coord { x: 10.0, y: 20.0 }, Coord { x: 15.0, y: 20.0 }]
        );
        assert_eq!(object.drill_locations(2), vec![Coord { x: 30.0, y: 5.0 }]);
        assert!((object.tools[&2].aperture.size - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inch_leading_zeros_kept() {
        let text = "M48\nINCH,LZ\nT01C0.0350\n%\nT01\nX012500Y005000\nY010000\nM30\n";
        let object = parse_text(text).unwrap();
        assert_eq!(object.units, Units::Inch);
        assert_eq!(
            object.drill_locations(1),
            vec![Coord { x: 1.25, y: 0.5 }, Coord { x: 1.25, y: 1.0 }]
        );
    }

    #[test]
    fn test_trailing_zeros_kept() {
        let text = "M48\nINCH,TZ\nT1C0.04\n%\nT1\nX12500Y5000\nM30\n";
        let object = parse_text(text).unwrap();
        assert_eq!(object.drill_locations(1), vec![Coord { x: 1.25, y: 0.5 }]);
    }

    #[test]
    fn test_explicit_format() {
        let text = "M48\nMETRIC,TZ,000.000\nT3C0.6\n%\nT3\nX1500Y-2500\nM30\n";
        let object = parse_text(text).unwrap();
        assert_eq!(object.drill_locations(3), vec![Coord { x: 1.5, y: -2.5 }]);
    }

    #[test]
    fn test_slot() {
        let text = "M48\nMETRIC\nT1C1.0\n%\nT1\nX1.0Y1.0G85X5.0Y1.0\nM30\n";
        let object = parse_text(text).unwrap();
        let paths = object.tool_paths(1);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].0, vec![Coord { x: 1.0, y: 1.0 }, Coord { x: 5.0, y: 1.0 }]);
        assert!(drilled_area(&object) > 4.0);
    }

    #[test]
    fn test_m71_switches_units() {
        let text = "M48\nM71\nT1C0.5\n%\nT1\nX1.0Y1.0\nM30\n";
        assert_eq!(parse_text(text).unwrap().units, Units::Mm);
    }

    #[test]
    fn test_empty_file() {
        assert!(matches!(
            parse_text("M48\nMETRIC\n%\nM30\n"),
            Err(ExcellonError::Empty)
        ));
    }

    #[test]
    fn test_malformed_coordinate() {
        let text = "M48\nMETRIC\nT1C0.5\n%\nT1\nX1.0.0Y1\n";
        match parse_text(text) {
            Err(ExcellonError::Line { line_number, .. }) => assert_eq!(line_number, 6),
            other => panic!("unexpected {:?}", other.map(|o| o.tools.len())),
        }
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            parse(KICAD, &ExcellonOptions::default(), &cancel),
            Err(ExcellonError::Cancelled)
        ));
    }
}
