//! PcbMill Settings Crate
//!
//! Handles CAM configuration: parser options, milling and drilling
//! parameters, and their persistence as TOML or JSON.

pub mod config;
pub mod error;

pub use config::{
    default_config_path, CamConfig, DrillOrdering, DrillSettings, ExcellonSettings,
    GerberSettings, MillSettings, ZeroSuppression,
};
pub use error::{SettingsError, SettingsResult};
