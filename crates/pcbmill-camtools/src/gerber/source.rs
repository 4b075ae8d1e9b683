//! Source detection and statement splitting

use serde::Serialize;

/// What kind of file a text looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    /// Plain RS-274X Gerber
    Rs274x,
    /// Gerber with X2 attributes (`%TF.` header)
    GerberX2,
    /// Excellon drill file
    Excellon,
}

/// A statement and the physical line it came from (1-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub number: usize,
    pub text: String,
}

/// Classify a text by its header markers
pub fn detect(text: &str) -> SourceKind {
    let mut x2 = false;
    for line in text.lines().map(str::trim) {
        if line == "M48"
            || line.starts_with(";FILE_FORMAT")
            || line.starts_with("; #@! TF.")
            || line.starts_with(";#@! TF.")
        {
            return SourceKind::Excellon;
        }
        if line.starts_with("%TF.") {
            x2 = true;
        }
    }
    if x2 {
        SourceKind::GerberX2
    } else {
        SourceKind::Rs274x
    }
}

/// X2 attribute statements carry no geometry
pub fn is_attribute(line: &str) -> bool {
    ["%TF.", "%TO.", "%TD", "%TA"]
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

/// Split text into statements.
///
/// Attribute lines are dropped. A line ending in `%` is kept whole; any
/// other line is split after every `*`.
pub fn statements(text: &str) -> Vec<SourceLine> {
    let mut out = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || is_attribute(line) {
            continue;
        }
        let number = index + 1;
        if line.ends_with('%') {
            out.push(SourceLine {
                number,
                text: line.to_string(),
            });
            continue;
        }
        let mut rest = line;
        while let Some(pos) = rest.find('*') {
            let (statement, tail) = rest.split_at(pos + 1);
            if statement != "*" {
                out.push(SourceLine {
                    number,
                    text: statement.trim().to_string(),
                });
            }
            rest = tail.trim_start();
        }
        if !rest.is_empty() {
            out.push(SourceLine {
                number,
                text: rest.to_string(),
            });
        }
    }
    out
}
