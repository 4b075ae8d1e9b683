//! # PcbMill
//!
//! PCB fabrication CAM for small CNC mills:
//! - Gerber RS-274X (and X2) copper layers to isolation toolpaths
//! - Excellon drill files to drilling and slot programs
//! - G-code output through pluggable preprocessors (GRBL milling, GRBL laser)
//!
//! ## Architecture
//!
//! PcbMill is organized as a workspace with multiple crates:
//!
//! 1. **pcbmill-core** - Error type, units, cancellation
//! 2. **pcbmill-settings** - CAM configuration and persistence
//! 3. **pcbmill-camtools** - Importers, geometry, optimizer, CNC job
//! 4. **pcbmill** - Command line binary that integrates all crates

pub use pcbmill_camtools::{
    cncjob, excellon, geometry, gerber, optimizer, CamToolError, CncJob, Defect, ExcellonOptions,
    GeometryObject, GerberOptions, JobError, JobStats, ParseStatus, ToolParams,
};
pub use pcbmill_core::{CancellationToken, Error, Result, Units};
pub use pcbmill_settings::{CamConfig, SettingsError};

use pcbmill_camtools::geometry::MergeStrategy;
use pcbmill_camtools::gerber::{CoordinateFormat, ZeroSuppression};
use pcbmill_camtools::optimizer::OrderingStrategy;
use pcbmill_settings::{DrillOrdering, DrillSettings, MillSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Logs go to stderr so that G-code written to stdout stays clean.
/// `RUST_LOG` overrides the INFO default.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Gerber parser options from the configuration
pub fn gerber_options(config: &CamConfig) -> GerberOptions {
    GerberOptions {
        steps_per_circle: config.gerber.steps_per_circle,
        decimals: config.gerber.decimals,
        merge: if config.gerber.buffer_union {
            MergeStrategy::BufferUnion
        } else {
            MergeStrategy::UnaryUnion
        },
        simplification: config.gerber.simplification,
    }
}

/// Excellon defaults from the configuration
pub fn excellon_options(config: &CamConfig) -> ExcellonOptions {
    let zeros = match config.excellon.zeros {
        pcbmill_settings::ZeroSuppression::Leading => ZeroSuppression::Leading,
        pcbmill_settings::ZeroSuppression::Trailing => ZeroSuppression::Trailing,
    };
    ExcellonOptions {
        format: CoordinateFormat::new(
            config.excellon.integer_digits,
            config.excellon.fraction_digits,
            zeros,
        ),
        units: config.excellon.units,
        steps_per_circle: config.gerber.steps_per_circle,
        ..ExcellonOptions::default()
    }
}

/// Isolation milling parameters, in millimeters
pub fn mill_params(config: &CamConfig) -> ToolParams {
    let mill: &MillSettings = &config.mill;
    ToolParams {
        tool_diameter: mill.tool_diameter,
        z_cut: Some(mill.z_cut),
        z_move: mill.z_move,
        depth_per_cut: mill.depth_per_cut,
        multidepth: mill.multidepth,
        extracut: mill.extracut,
        extracut_length: mill.extracut_length,
        feedrate: mill.feedrate,
        feedrate_z: mill.feedrate_z,
        feedrate_rapid: mill.feedrate_rapid,
        spindle_speed: mill.spindle_speed,
        dwell: mill.dwell,
        toolchange: mill.toolchange,
        z_toolchange: mill.z_toolchange,
        toolchange_xy: mill.toolchange_xy,
        z_end: mill.z_end,
        end_xy: mill.end_xy,
        decimals: config.gerber.decimals as usize,
        ..ToolParams::default()
    }
}

/// Drilling parameters for a tool of the given diameter, in millimeters
pub fn drill_params(config: &CamConfig, tool_diameter: f64) -> ToolParams {
    let drill: &DrillSettings = &config.drill;
    ToolParams {
        tool_diameter,
        z_cut: Some(drill.z_cut),
        z_move: drill.z_move,
        depth_per_cut: drill.depth_per_cut,
        multidepth: drill.multidepth,
        feedrate: drill.feedrate_z,
        feedrate_z: drill.feedrate_z,
        feedrate_rapid: drill.feedrate_rapid,
        spindle_speed: drill.spindle_speed,
        dwell: drill.dwell,
        toolchange: drill.toolchange,
        z_toolchange: drill.z_toolchange,
        toolchange_xy: drill.toolchange_xy,
        z_end: drill.z_end,
        end_xy: drill.end_xy,
        ordering: match drill.ordering {
            DrillOrdering::Greedy => OrderingStrategy::Greedy,
            DrillOrdering::Solver => OrderingStrategy::Solver,
            DrillOrdering::Metaheuristic => OrderingStrategy::Metaheuristic,
            DrillOrdering::Rtree => OrderingStrategy::Rtree,
        },
        solver_budget_ms: drill.solver_time_budget_ms,
        decimals: config.gerber.decimals as usize,
        ..ToolParams::default()
    }
}
