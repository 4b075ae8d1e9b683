//! Configuration and settings management for PcbMill
//!
//! Provides configuration file handling and validation for the CAM
//! pipeline. Supports JSON and TOML file formats stored in a
//! platform-specific directory.
//!
//! Configuration is organized into logical sections:
//! - Gerber parsing (arc resolution, precision, merge strategy)
//! - Excellon defaults for headerless drill files
//! - Milling parameters (isolation and cutout jobs)
//! - Drilling parameters (depths, feeds, hole ordering)

use crate::error::{SettingsError, SettingsResult};
use pcbmill_core::Units;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Gerber parser settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GerberSettings {
    /// Segments used to approximate a full circle
    pub steps_per_circle: u32,
    /// Decimal places used for aperture sizing
    pub decimals: u32,
    /// Merge with the fast dilate/erode strategy instead of an exact union
    pub buffer_union: bool,
    /// Simplification tolerance in millimeters (disabled when absent)
    pub simplification: Option<f64>,
}

impl Default for GerberSettings {
    fn default() -> Self {
        Self {
            steps_per_circle: 64,
            decimals: 4,
            buffer_union: true,
            simplification: None,
        }
    }
}

/// Zero suppression used by headerless Excellon files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ZeroSuppression {
    /// Leading zeros omitted
    #[default]
    Leading,
    /// Trailing zeros omitted
    Trailing,
}

/// Excellon defaults applied until the file header says otherwise
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcellonSettings {
    /// Integer digits of a coordinate without decimal point
    pub integer_digits: u32,
    /// Fraction digits of a coordinate without decimal point
    pub fraction_digits: u32,
    /// Zero suppression mode
    pub zeros: ZeroSuppression,
    /// Linear unit
    pub units: Units,
}

impl Default for ExcellonSettings {
    fn default() -> Self {
        Self {
            integer_digits: 2,
            fraction_digits: 4,
            zeros: ZeroSuppression::Leading,
            units: Units::Inch,
        }
    }
}

/// Milling (isolation routing) parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MillSettings {
    /// Cutter diameter in mm
    pub tool_diameter: f64,
    /// Final cut depth (negative, mm)
    pub z_cut: f64,
    /// Travel height (mm)
    pub z_move: f64,
    /// Maximum depth per pass (mm)
    pub depth_per_cut: f64,
    /// Cut in several passes
    pub multidepth: bool,
    /// Re-cut the seam of closed paths
    pub extracut: bool,
    /// Seam overlap length (mm, 0 = re-cut first segment)
    pub extracut_length: f64,
    /// XY feed rate (mm/min)
    pub feedrate: f64,
    /// Plunge feed rate (mm/min)
    pub feedrate_z: f64,
    /// Rapid feed rate (mm/min), used for time estimates
    pub feedrate_rapid: f64,
    /// Spindle speed (RPM)
    pub spindle_speed: Option<f64>,
    /// Dwell after spindle start (seconds)
    pub dwell: Option<f64>,
    /// Emit a tool change
    pub toolchange: bool,
    /// Tool change height (mm)
    pub z_toolchange: f64,
    /// Tool change position
    pub toolchange_xy: Option<[f64; 2]>,
    /// Height at end of job (mm)
    pub z_end: f64,
    /// Position at end of job
    pub end_xy: Option<[f64; 2]>,
    /// Number of isolation passes
    pub isolation_passes: u32,
    /// Overlap between isolation passes (0.0 - 1.0)
    pub overlap: f64,
    /// Preprocessor name
    pub preprocessor: String,
}

impl Default for MillSettings {
    fn default() -> Self {
        Self {
            tool_diameter: 0.2,
            z_cut: -0.1,
            z_move: 2.0,
            depth_per_cut: 0.1,
            multidepth: false,
            extracut: false,
            extracut_length: 0.0,
            feedrate: 120.0,
            feedrate_z: 60.0,
            feedrate_rapid: 1500.0,
            spindle_speed: Some(10000.0),
            dwell: None,
            toolchange: false,
            z_toolchange: 15.0,
            toolchange_xy: None,
            z_end: 2.0,
            end_xy: None,
            isolation_passes: 1,
            overlap: 0.1,
            preprocessor: "default".to_string(),
        }
    }
}

/// Hole ordering strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DrillOrdering {
    /// Greedy nearest neighbour
    Greedy,
    /// Time-bounded solver
    Solver,
    /// Solver with random restarts until the budget expires
    Metaheuristic,
    /// Sequential R-tree nearest extraction
    #[default]
    Rtree,
}

/// Drilling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrillSettings {
    /// Final drill depth (negative, mm)
    pub z_cut: f64,
    /// Travel height (mm)
    pub z_move: f64,
    /// Peck depth (mm)
    pub depth_per_cut: f64,
    /// Peck drilling
    pub multidepth: bool,
    /// Plunge feed rate (mm/min)
    pub feedrate_z: f64,
    /// Rapid feed rate (mm/min), used for time estimates
    pub feedrate_rapid: f64,
    /// Spindle speed (RPM)
    pub spindle_speed: Option<f64>,
    /// Dwell after spindle start (seconds)
    pub dwell: Option<f64>,
    /// Emit a tool change between drill sizes
    pub toolchange: bool,
    /// Tool change height (mm)
    pub z_toolchange: f64,
    /// Tool change position
    pub toolchange_xy: Option<[f64; 2]>,
    /// Height at end of job (mm)
    pub z_end: f64,
    /// Position at end of job
    pub end_xy: Option<[f64; 2]>,
    /// Hole ordering strategy
    pub ordering: DrillOrdering,
    /// Budget for solver-based ordering (milliseconds)
    pub solver_time_budget_ms: u64,
    /// Preprocessor name
    pub preprocessor: String,
}

impl Default for DrillSettings {
    fn default() -> Self {
        Self {
            z_cut: -1.7,
            z_move: 2.0,
            depth_per_cut: 0.6,
            multidepth: false,
            feedrate_z: 60.0,
            feedrate_rapid: 1500.0,
            spindle_speed: Some(10000.0),
            dwell: None,
            toolchange: true,
            z_toolchange: 15.0,
            toolchange_xy: None,
            z_end: 2.0,
            end_xy: None,
            ordering: DrillOrdering::Rtree,
            solver_time_budget_ms: 2000,
            preprocessor: "default".to_string(),
        }
    }
}

/// Complete CAM configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CamConfig {
    /// Gerber parser settings
    pub gerber: GerberSettings,
    /// Excellon defaults
    pub excellon: ExcellonSettings,
    /// Milling parameters
    pub mill: MillSettings,
    /// Drilling parameters
    pub drill: DrillSettings,
}

/// Platform default location of the configuration file
pub fn default_config_path() -> SettingsResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("pcbmill").join("config.toml"))
        .ok_or(SettingsError::NoConfigDirectory)
}

impl CamConfig {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)?
        } else {
            return Err(SettingsError::UnsupportedFormat(path.to_path_buf()));
        };

        config.validate()?;
        tracing::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the config at the default path, or defaults when it does not exist
    pub fn load_or_default() -> SettingsResult<Self> {
        let path = default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::to_string_pretty(self)?
        } else {
            return Err(SettingsError::UnsupportedFormat(path.to_path_buf()));
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        std::fs::write(path, content).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.gerber.steps_per_circle < 4 {
            return Err(SettingsError::invalid(
                "gerber.steps_per_circle",
                "must be at least 4",
            ));
        }
        if self.gerber.simplification.is_some_and(|t| t <= 0.0) {
            return Err(SettingsError::invalid(
                "gerber.simplification",
                "must be > 0",
            ));
        }

        if self.excellon.integer_digits + self.excellon.fraction_digits == 0 {
            return Err(SettingsError::invalid(
                "excellon.fraction_digits",
                "coordinate format has no digits",
            ));
        }

        if self.mill.tool_diameter <= 0.0 {
            return Err(SettingsError::invalid("mill.tool_diameter", "must be > 0"));
        }
        if self.mill.z_move <= 0.0 {
            return Err(SettingsError::invalid("mill.z_move", "must be > 0"));
        }
        if self.mill.multidepth && self.mill.depth_per_cut <= 0.0 {
            return Err(SettingsError::invalid("mill.depth_per_cut", "must be > 0"));
        }
        if self.mill.feedrate <= 0.0 || self.mill.feedrate_z <= 0.0 {
            return Err(SettingsError::invalid("mill.feedrate", "must be > 0"));
        }
        if !(0.0..1.0).contains(&self.mill.overlap) {
            return Err(SettingsError::invalid(
                "mill.overlap",
                "must be in [0, 1)",
            ));
        }

        if self.drill.z_move <= 0.0 {
            return Err(SettingsError::invalid("drill.z_move", "must be > 0"));
        }
        if self.drill.multidepth && self.drill.depth_per_cut <= 0.0 {
            return Err(SettingsError::invalid("drill.depth_per_cut", "must be > 0"));
        }
        if self.drill.feedrate_z <= 0.0 {
            return Err(SettingsError::invalid("drill.feedrate_z", "must be > 0"));
        }

        Ok(())
    }
}
