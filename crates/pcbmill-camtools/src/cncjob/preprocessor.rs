//! Machine code formatting
//!
//! The job decides which motion primitive comes next and fills in a
//! [`MotionState`]; a [`Preprocessor`] turns that state into text. An empty
//! string means the primitive has no meaning for the target machine and is
//! left out of the program.

use pcbmill_core::Units;

/// Everything a formatter may need for one primitive
#[derive(Debug, Clone, PartialEq)]
pub struct MotionState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// XY cutting feed
    pub feedrate: f64,
    /// Plunge feed
    pub feedrate_z: f64,
    pub feedrate_rapid: f64,
    pub spindle_speed: Option<f64>,
    /// Seconds to wait after starting the spindle
    pub dwell: Option<f64>,
    pub tool: u32,
    pub tool_diameter: f64,
    pub units: Units,
    pub z_move: f64,
    pub z_toolchange: f64,
    pub toolchange_xy: Option<[f64; 2]>,
    pub z_end: f64,
    pub end_xy: Option<[f64; 2]>,
    /// Decimal places for coordinates
    pub decimals: usize,
    /// Decimal places for feed rates
    pub feed_decimals: usize,
}

impl Default for MotionState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            feedrate: 120.0,
            feedrate_z: 60.0,
            feedrate_rapid: 1500.0,
            spindle_speed: None,
            dwell: None,
            tool: 1,
            tool_diameter: 0.1,
            units: Units::Mm,
            z_move: 2.0,
            z_toolchange: 15.0,
            toolchange_xy: None,
            z_end: 15.0,
            end_xy: None,
            decimals: 4,
            feed_decimals: 1,
        }
    }
}

impl MotionState {
    /// Coordinate formatted with the configured precision
    pub fn coord(&self, value: f64) -> String {
        fixed(value, self.decimals)
    }

    /// Feed rate formatted with the configured precision
    pub fn feed(&self, value: f64) -> String {
        fixed(value, self.feed_decimals)
    }
}

/// `value` rounded to `decimals` places, never printed as `-0`
pub fn fixed(value: f64, decimals: usize) -> String {
    let text = format!("{value:.decimals$}");
    if text.starts_with('-') && text[1..].chars().all(|c| c == '0' || c == '.') {
        text[1..].to_string()
    } else {
        text
    }
}

/// Formats motion primitives for one machine dialect
pub trait Preprocessor: Send + Sync {
    /// Name used to select this preprocessor
    fn name(&self) -> &str;

    /// Human readable description
    fn description(&self) -> &str;

    /// Laser machines have no Z axis; depth checks do not apply
    fn is_laser(&self) -> bool {
        false
    }

    fn start(&self, state: &MotionState) -> String;
    fn end(&self, state: &MotionState) -> String;
    fn rapid(&self, state: &MotionState) -> String;
    fn linear(&self, state: &MotionState) -> String;
    fn plunge(&self, state: &MotionState) -> String;
    fn lift(&self, state: &MotionState) -> String;
    fn spindle_on(&self, state: &MotionState) -> String;
    fn spindle_off(&self, state: &MotionState) -> String;
    fn dwell(&self, state: &MotionState) -> String;
    fn toolchange(&self, state: &MotionState) -> String;

    /// A comment line
    fn comment(&self, text: &str) -> String {
        format!("; {text}")
    }
}

/// GRBL style milling and drilling
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPreprocessor;

impl Preprocessor for DefaultPreprocessor {
    fn name(&self) -> &str {
        "default"
    }

    fn description(&self) -> &str {
        "GRBL compatible milling"
    }

    fn start(&self, state: &MotionState) -> String {
        let unit_comment = match state.units {
            Units::Mm => "Set units to millimeters",
            Units::Inch => "Set units to inches",
        };
        format!(
            "{} ; {}\nG90 ; Absolute positioning\nG17 ; XY plane\nG94 ; Feed per minute",
            state.units.gcode_word(),
            unit_comment
        )
    }

    fn end(&self, _state: &MotionState) -> String {
        "M30 ; End program".to_string()
    }

    fn rapid(&self, state: &MotionState) -> String {
        format!("G0 X{} Y{}", state.coord(state.x), state.coord(state.y))
    }

    fn linear(&self, state: &MotionState) -> String {
        format!(
            "G1 X{} Y{} F{}",
            state.coord(state.x),
            state.coord(state.y),
            state.feed(state.feedrate)
        )
    }

    fn plunge(&self, state: &MotionState) -> String {
        format!(
            "G1 Z{} F{}",
            state.coord(state.z),
            state.feed(state.feedrate_z)
        )
    }

    fn lift(&self, state: &MotionState) -> String {
        format!("G0 Z{}", state.coord(state.z))
    }

    fn spindle_on(&self, state: &MotionState) -> String {
        match state.spindle_speed {
            Some(speed) => format!("M3 S{speed:.0} ; Start spindle"),
            None => "M3 ; Start spindle".to_string(),
        }
    }

    fn spindle_off(&self, _state: &MotionState) -> String {
        "M5 ; Stop spindle".to_string()
    }

    fn dwell(&self, state: &MotionState) -> String {
        match state.dwell {
            Some(seconds) if seconds > 0.0 => format!("G4 P{seconds:.2}"),
            _ => String::new(),
        }
    }

    fn toolchange(&self, state: &MotionState) -> String {
        format!(
            "T{} M6 ; Tool diameter {}\nM0 ; Change tool and resume",
            state.tool,
            state.coord(state.tool_diameter)
        )
    }
}

/// GRBL in laser mode (`$32=1`): the beam switches on instead of plunging
#[derive(Debug, Default, Clone, Copy)]
pub struct GrblLaser;

impl Preprocessor for GrblLaser {
    fn name(&self) -> &str {
        "grbl_laser"
    }

    fn description(&self) -> &str {
        "GRBL laser mode, no Z axis"
    }

    fn is_laser(&self) -> bool {
        true
    }

    fn start(&self, state: &MotionState) -> String {
        format!(
            "{}\nG90 ; Absolute positioning\nG94 ; Feed per minute\nM5 ; Laser off",
            state.units.gcode_word()
        )
    }

    fn end(&self, _state: &MotionState) -> String {
        "M5 ; Laser off\nM2 ; End program".to_string()
    }

    fn rapid(&self, state: &MotionState) -> String {
        format!("G0 X{} Y{}", state.coord(state.x), state.coord(state.y))
    }

    fn linear(&self, state: &MotionState) -> String {
        format!(
            "G1 X{} Y{} F{}",
            state.coord(state.x),
            state.coord(state.y),
            state.feed(state.feedrate)
        )
    }

    fn plunge(&self, state: &MotionState) -> String {
        match state.spindle_speed {
            Some(power) => format!("M3 S{power:.0} ; Laser on"),
            None => "M3 ; Laser on".to_string(),
        }
    }

    fn lift(&self, _state: &MotionState) -> String {
        "M5 ; Laser off".to_string()
    }

    fn spindle_on(&self, _state: &MotionState) -> String {
        String::new()
    }

    fn spindle_off(&self, _state: &MotionState) -> String {
        String::new()
    }

    fn dwell(&self, _state: &MotionState) -> String {
        String::new()
    }

    fn toolchange(&self, _state: &MotionState) -> String {
        String::new()
    }
}

/// Names accepted by [`preprocessor_by_name`]
pub const PREPROCESSORS: &[&str] = &["default", "grbl_laser"];

/// Look up a preprocessor by name
pub fn preprocessor_by_name(name: &str) -> Option<Box<dyn Preprocessor>> {
    match name {
        "default" | "grbl" => Some(Box::new(DefaultPreprocessor)),
        "grbl_laser" | "laser" => Some(Box::new(GrblLaser)),
        _ => None,
    }
}
