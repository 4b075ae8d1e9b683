//! Statement classification
//!
//! Each `*`-terminated statement is matched against an ordered list of
//! classifiers; the first match wins. Coordinates stay as digit strings
//! until the parser decodes them with the current format.

use super::number::{CoordinateFormat, ZeroSuppression};
use super::state::{Interpolation, Operation, Polarity, QuadrantMode};
use pcbmill_core::Units;
use regex::Regex;
use std::sync::LazyLock;

static FORMAT_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^%FS([LTD])?([AI])(?:N\d+)?(?:G\d+)?X(\d)(\d)Y(\d)(\d)(?:Z\d+)?\*(?:MO(IN|MM)\*)?%$",
    )
    .expect("valid regex")
});
static UNITS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:%MO(IN|MM)\*%|G7([01])\*)$").expect("valid regex")
});
static APERTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^%ADD(\d{2,})([A-Za-z_$.][A-Za-z0-9_$.\-]*)(?:,([^*]*))?\*%$")
        .expect("valid regex")
});
static POLARITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^%LP([DC])\*%$").expect("valid regex"));
static STEP_REPEAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^%SR(?:X(\d+)Y(\d+)I([+-]?[\d.]+)J([+-]?[\d.]+))?\*%$").expect("valid regex")
});
static AUXILIARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^%(IP|LN|IN|OF|SF|MI|AS|IR)([^%]*)%$").expect("valid regex")
});
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^G0?4(?:[^0-9].*)?$").expect("valid regex"));
static REGION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^G3([67])\*$").expect("valid regex"));
static QUADRANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^G7([45])\*$").expect("valid regex"));
static NOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^G9([01])\*$").expect("valid regex"));
static STOP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^M(0?[012]|30)\*$").expect("valid regex"));
static SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:G5[45])?D0*(\d+)\*$").expect("valid regex"));
static BARE_INTERPOLATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^G0?([123])\*$").expect("valid regex"));

/// Coordinate data of a draw statement, still undecoded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draw {
    pub interpolation: Option<Interpolation>,
    pub x: Option<String>,
    pub y: Option<String>,
    pub i: Option<String>,
    pub j: Option<String>,
    pub operation: Option<Operation>,
}

/// A classified Gerber statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Comment,
    FormatSpec {
        format: CoordinateFormat,
        incremental: bool,
        units: Option<Units>,
    },
    Units(Units),
    /// A complete `%AM...%` block
    MacroDefinition(String),
    ApertureDefinition {
        id: u32,
        template: String,
        params: Option<Vec<f64>>,
    },
    Polarity(Polarity),
    StepRepeat {
        x: u32,
        y: u32,
        i: f64,
        j: f64,
    },
    StepRepeatEnd,
    SelectAperture(u32),
    Operation(Operation),
    Interpolation(Interpolation),
    Quadrant(QuadrantMode),
    RegionStart,
    RegionEnd,
    Draw(Draw),
    Absolute,
    Incremental,
    /// Obsolete parameter statement or program stop, logged only
    Auxiliary(String),
    EndOfFile,
    Unknown,
}

/// Classify one statement
pub fn classify(text: &str) -> Statement {
    let text = text.trim();

    if COMMENT.is_match(text) {
        return Statement::Comment;
    }
    if let Some(caps) = FORMAT_SPEC.captures(text) {
        let zeros = caps
            .get(1)
            .and_then(|m| ZeroSuppression::from_letter(m.as_str()))
            .unwrap_or_default();
        let digit = |n: usize| {
            caps.get(n)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0)
        };
        return Statement::FormatSpec {
            // X and Y share a format in practice; X wins
            format: CoordinateFormat::new(digit(3), digit(4), zeros),
            incremental: &caps[2] == "I",
            units: caps.get(7).map(|m| units_from(m.as_str())),
        };
    }
    if let Some(caps) = UNITS.captures(text) {
        return match (caps.get(1), caps.get(2)) {
            (Some(m), _) => Statement::Units(units_from(m.as_str())),
            (None, Some(m)) if m.as_str() == "0" => Statement::Units(Units::Inch),
            _ => Statement::Units(Units::Mm),
        };
    }
    if text.starts_with("%AM") {
        return Statement::MacroDefinition(text.to_string());
    }
    if let Some(caps) = APERTURE.captures(text) {
        let id = caps[1].parse().unwrap_or(0);
        let params = match caps.get(3) {
            None => Some(Vec::new()),
            Some(m) => m
                .as_str()
                .split(['X', 'x'])
                .map(|p| p.trim().parse::<f64>().ok())
                .collect(),
        };
        return Statement::ApertureDefinition {
            id,
            template: caps[2].to_string(),
            params,
        };
    }
    if let Some(caps) = POLARITY.captures(text) {
        return Statement::Polarity(if &caps[1] == "C" {
            Polarity::Clear
        } else {
            Polarity::Dark
        });
    }
    if let Some(caps) = STEP_REPEAT.captures(text) {
        let Some(x) = caps.get(1) else {
            return Statement::StepRepeatEnd;
        };
        let number = |n: usize| caps.get(n).and_then(|m| m.as_str().parse::<f64>().ok());
        return Statement::StepRepeat {
            x: x.as_str().parse().unwrap_or(1),
            y: caps[2].parse().unwrap_or(1),
            i: number(3).unwrap_or(0.0),
            j: number(4).unwrap_or(0.0),
        };
    }
    if AUXILIARY.is_match(text) {
        return Statement::Auxiliary(text.to_string());
    }
    if let Some(caps) = REGION.captures(text) {
        return if &caps[1] == "6" {
            Statement::RegionStart
        } else {
            Statement::RegionEnd
        };
    }
    if let Some(caps) = QUADRANT.captures(text) {
        return Statement::Quadrant(if &caps[1] == "4" {
            QuadrantMode::Single
        } else {
            QuadrantMode::Multi
        });
    }
    if let Some(caps) = NOTATION.captures(text) {
        return if &caps[1] == "0" {
            Statement::Absolute
        } else {
            Statement::Incremental
        };
    }
    if let Some(caps) = STOP.captures(text) {
        return match caps[1].trim_start_matches('0') {
            "2" | "30" => Statement::EndOfFile,
            _ => Statement::Auxiliary(text.to_string()),
        };
    }
    if let Some(caps) = SELECT.captures(text) {
        let code: u32 = caps[1].parse().unwrap_or(0);
        if code >= 10 {
            return Statement::SelectAperture(code);
        }
        if let Some(op) = Operation::from_code(code) {
            return Statement::Operation(op);
        }
    }
    if let Some(caps) = BARE_INTERPOLATION.captures(text) {
        if let Some(mode) = caps[1].parse().ok().and_then(Interpolation::from_code) {
            return Statement::Interpolation(mode);
        }
    }
    draw(text).map_or(Statement::Unknown, Statement::Draw)
}

fn units_from(code: &str) -> Units {
    if code == "IN" {
        Units::Inch
    } else {
        Units::Mm
    }
}

/// Split `G01X100Y-200D01*` into letter/number words
fn words(text: &str) -> Option<Vec<(char, &str)>> {
    let body = text.strip_suffix('*').unwrap_or(text);
    let bytes = body.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let letter = bytes[pos] as char;
        if !letter.is_ascii_uppercase() {
            return None;
        }
        let start = pos + 1;
        let mut end = start;
        while end < bytes.len() && matches!(bytes[end], b'0'..=b'9' | b'+' | b'-' | b'.') {
            end += 1;
        }
        if end == start {
            return None;
        }
        out.push((letter, &body[start..end]));
        pos = end;
    }
    Some(out)
}

fn draw(text: &str) -> Option<Draw> {
    let words = words(text)?;
    if words.is_empty() {
        return None;
    }
    let mut draw = Draw::default();
    for (letter, value) in words {
        match letter {
            'G' => match value.parse::<u32>().ok()? {
                54 | 55 => {}
                code => draw.interpolation = Some(Interpolation::from_code(code)?),
            },
            'D' => draw.operation = Some(Operation::from_code(value.parse().ok()?)?),
            'X' => draw.x = Some(value.to_string()),
            'Y' => draw.y = Some(value.to_string()),
            'I' => draw.i = Some(value.to_string()),
            'J' => draw.j = Some(value.to_string()),
            _ => return None,
        }
    }
    Some(draw)
}
