//! Error types for the CAM tools crate.
//!
//! This module provides structured error types for Gerber and Excellon
//! parsing, aperture macro evaluation and toolpath generation.
//!
//! A Gerber file that parses with recoverable defects is not an error: it
//! is reported through [`crate::gerber::ParseStatus::Defective`].

use std::io;
use thiserror::Error;

/// Errors that can occur during CAM tool operations.
#[derive(Error, Debug)]
pub enum CamToolError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// A Gerber file could not be parsed.
    #[error("Gerber error: {0}")]
    Gerber(#[from] GerberError),

    /// An Excellon file could not be parsed.
    #[error("Excellon error: {0}")]
    Excellon(#[from] ExcellonError),

    /// Toolpath generation failed.
    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

/// Errors that make a Gerber parse fail outright.
#[derive(Error, Debug)]
pub enum GerberError {
    /// Parsing finished without producing any geometry.
    #[error("No geometry found")]
    Empty,

    /// An unrecoverable problem on a specific line.
    #[error("Line {line_number} ('{content}'): {reason}")]
    Line {
        line_number: usize,
        content: String,
        reason: String,
    },

    /// Parsing was cancelled.
    #[error("Parsing cancelled")]
    Cancelled,
}

/// Errors that make an Excellon parse fail outright.
#[derive(Error, Debug)]
pub enum ExcellonError {
    /// No drill hits or slots were found.
    #[error("No drill hits found")]
    Empty,

    /// An unrecoverable problem on a specific line.
    #[error("Line {line_number} ('{content}'): {reason}")]
    Line {
        line_number: usize,
        content: String,
        reason: String,
    },

    /// Parsing was cancelled.
    #[error("Parsing cancelled")]
    Cancelled,
}

/// Errors raised while expanding an aperture macro.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MacroError {
    /// The primitive code is not one of 1, 2, 4, 5, 6, 7, 20, 21, 22.
    #[error("Unknown macro primitive code: {0}")]
    UnknownPrimitive(String),

    /// An arithmetic expression could not be evaluated.
    #[error("Invalid expression '{expr}': {reason}")]
    Expression { expr: String, reason: String },

    /// A primitive has fewer modifiers than it needs.
    #[error("Primitive {code} needs {expected} modifiers, found {found}")]
    MissingModifiers {
        code: u32,
        expected: usize,
        found: usize,
    },

    /// The aperture references a macro that was never defined.
    #[error("Undefined aperture macro: {0}")]
    Undefined(String),
}

/// Per-tool toolpath generation failure.
///
/// `Skipped` is scoped to one tool; the caller decides whether to keep
/// generating the remaining tools.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    /// This tool could not be generated.
    #[error("Tool T{tool} skipped: {reason}")]
    Skipped { tool: u32, reason: String },

    /// Generation was cancelled.
    #[error("Toolpath generation cancelled")]
    Cancelled,
}

impl JobError {
    /// Shorthand for [`JobError::Skipped`]
    pub fn skipped(tool: u32, reason: impl Into<String>) -> Self {
        JobError::Skipped {
            tool,
            reason: reason.into(),
        }
    }
}

impl From<pcbmill_core::Error> for JobError {
    fn from(err: pcbmill_core::Error) -> Self {
        match err {
            pcbmill_core::Error::Cancelled => JobError::Cancelled,
            other => JobError::Skipped {
                tool: 0,
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias for CAM tool operations.
pub type CamToolResult<T> = Result<T, CamToolError>;

/// Result type alias for Gerber parsing.
pub type GerberResult<T> = Result<T, GerberError>;

/// Result type alias for Excellon parsing.
pub type ExcellonResult<T> = Result<T, ExcellonError>;

/// Result type alias for macro evaluation.
pub type MacroResult<T> = Result<T, MacroError>;

/// Result type alias for toolpath generation.
pub type JobResult<T> = Result<T, JobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cam_tool_error_wraps_sources() {
        let err = CamToolError::from(io::Error::new(io::ErrorKind::NotFound, "board.gbr"));
        assert_eq!(err.to_string(), "I/O error: board.gbr");

        let err = CamToolError::from(GerberError::Empty);
        assert_eq!(err.to_string(), "Gerber error: No geometry found");

        let err = CamToolError::from(JobError::skipped(3, "no geometry"));
        assert_eq!(err.to_string(), "Job error: Tool T3 skipped: no geometry");
    }

    #[test]
    fn test_gerber_error_display() {
        let err = GerberError::Line {
            line_number: 12,
            content: "%AMBAD*9,1*%".to_string(),
            reason: "Unknown macro primitive code: 9".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Line 12 ('%AMBAD*9,1*%'): Unknown macro primitive code: 9"
        );
        assert_eq!(GerberError::Empty.to_string(), "No geometry found");
    }

    #[test]
    fn test_macro_error_display() {
        let err = MacroError::MissingModifiers {
            code: 21,
            expected: 6,
            found: 3,
        };
        assert_eq!(err.to_string(), "Primitive 21 needs 6 modifiers, found 3");
    }

    #[test]
    fn test_job_error_display() {
        let err = JobError::skipped(3, "no locations");
        assert_eq!(err.to_string(), "Tool T3 skipped: no locations");
        assert_eq!(
            JobError::Cancelled.to_string(),
            "Toolpath generation cancelled"
        );
    }

    #[test]
    fn test_error_conversion() {
        let err: JobError = pcbmill_core::Error::Cancelled.into();
        assert_eq!(err, JobError::Cancelled);

        let err: CamToolError = GerberError::Cancelled.into();
        assert!(matches!(err, CamToolError::Gerber(GerberError::Cancelled)));

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: CamToolError = io_err.into();
        assert!(matches!(err, CamToolError::IoError(_)));
    }
}
