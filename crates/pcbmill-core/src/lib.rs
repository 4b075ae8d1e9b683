//! # PcbMill Core
//!
//! Core types shared by every PcbMill crate:
//! the workspace-wide error type, the linear unit system used by
//! Gerber/Excellon sources and G-code output, and the cooperative
//! cancellation token checked by long-running parses and job generation.

pub mod cancel;
pub mod error;
pub mod units;

pub use cancel::CancellationToken;
pub use error::{Error, Result};
pub use units::{Units, MM_PER_INCH};
