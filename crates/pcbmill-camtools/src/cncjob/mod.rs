//! CNC job generation
//!
//! A [`CncJob`] turns milling paths and drill locations into a machine
//! program, one tool at a time. Every tool follows the same sequence:
//! the program start (once), an optional tool change, then for each
//! location a rapid traverse, a plunge, the cutting moves and a lift.
//! [`CncJob::finish`] appends the program end.
//!
//! The job only decides which primitive comes next and with which
//! numbers; the text comes from a [`Preprocessor`]. Rapid traverses are
//! routed through a [`TravelPlanner`] so that they can climb over
//! exclusion areas.
//!
//! A tool that cannot be generated returns [`JobError::Skipped`] before
//! anything is emitted, leaving the job usable for the remaining tools.

pub mod passes;
pub mod preprocessor;
pub mod travel;

pub use passes::{depth_passes, extracut_path};
pub use preprocessor::{
    fixed, preprocessor_by_name, DefaultPreprocessor, GrblLaser, MotionState, Preprocessor,
    PREPROCESSORS,
};
pub use travel::{DirectTravel, ExclusionArea, ExclusionAreas, TravelMove, TravelPlanner};

use crate::error::{JobError, JobResult};
use crate::geometry::{distance, Coord, LineString};
use crate::optimizer::{OrderingStrategy, PointOrderer, RTreeStorage, SpatialIndex};
use pcbmill_core::{CancellationToken, Units};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cutting parameters for one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolParams {
    pub tool_diameter: f64,
    /// Final cut depth, below the surface. Required unless the machine is a laser.
    pub z_cut: Option<f64>,
    /// Travel height between locations
    pub z_move: f64,
    pub depth_per_cut: f64,
    /// Reach `z_cut` in several passes of at most `depth_per_cut`
    pub multidepth: bool,
    /// Overlap the seam of closed paths
    pub extracut: bool,
    pub extracut_length: f64,
    pub feedrate: f64,
    pub feedrate_z: f64,
    pub feedrate_rapid: f64,
    pub spindle_speed: Option<f64>,
    pub dwell: Option<f64>,
    pub toolchange: bool,
    pub z_toolchange: f64,
    pub toolchange_xy: Option<[f64; 2]>,
    pub z_end: f64,
    pub end_xy: Option<[f64; 2]>,
    /// Visiting order for drill locations
    pub ordering: OrderingStrategy,
    pub solver_budget_ms: u64,
    pub decimals: usize,
    pub feed_decimals: usize,
}

impl Default for ToolParams {
    fn default() -> Self {
        Self {
            tool_diameter: 0.2,
            z_cut: Some(-0.1),
            z_move: 2.0,
            depth_per_cut: 0.1,
            multidepth: false,
            extracut: false,
            extracut_length: 0.2,
            feedrate: 120.0,
            feedrate_z: 60.0,
            feedrate_rapid: 1500.0,
            spindle_speed: Some(10000.0),
            dwell: None,
            toolchange: false,
            z_toolchange: 15.0,
            toolchange_xy: None,
            z_end: 15.0,
            end_xy: None,
            ordering: OrderingStrategy::Rtree,
            solver_budget_ms: 1000,
            decimals: 4,
            feed_decimals: 1,
        }
    }
}

/// What one tool contributed to the program
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobStats {
    pub tool: u32,
    /// Paths milled or holes drilled
    pub locations: usize,
    /// Depth passes per location
    pub passes: usize,
    /// Distance moved while cutting in XY
    pub cut_distance: f64,
    /// Distance moved by rapids, XY and Z
    pub travel_distance: f64,
    /// Distance moved by plunges
    pub plunge_distance: f64,
    /// Estimated machine time in minutes
    pub routing_time: f64,
}

impl JobStats {
    fn estimate_time(&mut self, params: &ToolParams) {
        let leg = |distance: f64, feed: f64| if feed > 0.0 { distance / feed } else { 0.0 };
        self.routing_time = leg(self.cut_distance, params.feedrate)
            + leg(self.plunge_distance, params.feedrate_z)
            + leg(self.travel_distance, params.feedrate_rapid);
    }
}

fn same_height(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9
}

/// A machine program under construction
pub struct CncJob {
    units: Units,
    preprocessor: Box<dyn Preprocessor>,
    planner: Box<dyn TravelPlanner>,
    cancel: CancellationToken,
    state: MotionState,
    body: Vec<String>,
    stats: Vec<JobStats>,
    started: bool,
    loaded_tool: Option<u32>,
}

impl CncJob {
    pub fn new(
        units: Units,
        preprocessor: Box<dyn Preprocessor>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            units,
            preprocessor,
            planner: Box::new(DirectTravel),
            cancel,
            state: MotionState {
                units,
                // Unknown until the first lift
                z: f64::NAN,
                ..Default::default()
            },
            body: Vec::new(),
            stats: Vec::new(),
            started: false,
            loaded_tool: None,
        }
    }

    /// Route rapids through `planner` instead of straight lines
    pub fn with_planner(mut self, planner: Box<dyn TravelPlanner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn units(&self) -> Units {
        self.units
    }

    pub fn preprocessor_name(&self) -> &str {
        self.preprocessor.name()
    }

    /// Statistics of every tool generated so far
    pub fn stats(&self) -> &[JobStats] {
        &self.stats
    }

    /// Mill `paths` with `tool`.
    ///
    /// Paths are visited nearest first and entered from their closest
    /// end. With `multidepth` each path is cut at every depth without
    /// lifting; open paths reverse direction between passes.
    pub fn mill_paths(
        &mut self,
        tool: u32,
        paths: &[LineString<f64>],
        params: &ToolParams,
    ) -> JobResult<JobStats> {
        let usable: Vec<LineString<f64>> =
            paths.iter().filter(|p| p.0.len() >= 2).cloned().collect();
        let depths = self.depths(tool, usable.len(), params)?;
        let mut stats = JobStats {
            tool,
            passes: depths.len(),
            ..Default::default()
        };

        self.load_params(tool, params);
        self.load_tool(tool, params, &mut stats);

        let mut storage = RTreeStorage::from_items(usable);
        loop {
            self.cancel.check()?;
            let cursor = self.position();
            let Ok((endpoint, path)) = storage.pop_nearest(cursor) else {
                break;
            };
            let mut coords = path.0;
            if coords.first() != Some(&endpoint) {
                coords.reverse();
            }
            let closed = coords.first() == coords.last();

            self.travel(coords[0], params.tool_diameter, &mut stats);
            for (pass, &depth) in depths.iter().enumerate() {
                self.plunge_to(depth, &mut stats);
                if closed || pass % 2 == 0 {
                    for &c in &coords[1..] {
                        self.cut_to(c, &mut stats);
                    }
                } else {
                    for &c in coords.iter().rev().skip(1) {
                        self.cut_to(c, &mut stats);
                    }
                }
            }
            if params.extracut && closed {
                for c in extracut_path(&coords, params.extracut_length) {
                    self.cut_to(c, &mut stats);
                }
            }
            self.lift_to(params.z_move, &mut stats);
            stats.locations += 1;
        }

        self.record(stats, params)
    }

    /// Drill `points` with `tool`, visiting them in the order chosen by
    /// `params.ordering`. With `multidepth` every hole is pecked, lifting
    /// to the travel height between pecks.
    pub fn drill_points(
        &mut self,
        tool: u32,
        points: &[Coord<f64>],
        params: &ToolParams,
    ) -> JobResult<JobStats> {
        let depths = self.depths(tool, points.len(), params)?;
        let mut stats = JobStats {
            tool,
            passes: depths.len(),
            ..Default::default()
        };

        self.load_params(tool, params);
        self.load_tool(tool, params, &mut stats);

        let orderer = PointOrderer::new(
            params.ordering,
            Duration::from_millis(params.solver_budget_ms),
        );
        let order = orderer.order(points, Some(self.position()));
        for index in order {
            self.cancel.check()?;
            self.travel(points[index], params.tool_diameter, &mut stats);
            for &depth in &depths {
                self.plunge_to(depth, &mut stats);
                self.lift_to(params.z_move, &mut stats);
            }
            stats.locations += 1;
        }

        self.record(stats, params)
    }

    /// Complete the program with its header and end sequence
    pub fn finish(mut self) -> String {
        if !self.started {
            self.emit_start();
        }
        let mut end_stats = JobStats::default();
        let z_end = self.state.z_end;
        self.lift_to(z_end, &mut end_stats);
        if let Some([x, y]) = self.state.end_xy {
            self.state.x = x;
            self.state.y = y;
            let line = self.preprocessor.rapid(&self.state);
            self.emit(line);
        }
        let line = self.preprocessor.spindle_off(&self.state);
        self.emit(line);
        let line = self.preprocessor.end(&self.state);
        self.emit(line);

        let mut header = vec![
            self.preprocessor.comment("PcbMill toolpath"),
            self.preprocessor.comment(&format!(
                "Generated: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            )),
            self.preprocessor.comment(&format!("Units: {}", self.units)),
            self.preprocessor
                .comment(&format!("Preprocessor: {}", self.preprocessor.name())),
        ];
        for s in &self.stats {
            header.push(self.preprocessor.comment(&format!(
                "T{}: {} locations, cut {:.2}, travel {:.2}, est. {:.1} min",
                s.tool, s.locations, s.cut_distance, s.travel_distance, s.routing_time
            )));
        }

        let mut program = header.join("\n");
        program.push('\n');
        for line in &self.body {
            program.push_str(line);
            program.push('\n');
        }
        program
    }

    /// Validate the parameters for one tool and compute its depth passes
    fn depths(&self, tool: u32, locations: usize, params: &ToolParams) -> JobResult<Vec<f64>> {
        if self.preprocessor.is_laser() {
            if locations == 0 {
                return Err(JobError::skipped(tool, "no locations"));
            }
            return Ok(vec![0.0]);
        }
        let Some(z_cut) = params.z_cut else {
            return Err(JobError::skipped(tool, "cut depth is missing"));
        };
        if z_cut == 0.0 {
            return Err(JobError::skipped(tool, "cut depth is zero"));
        }
        if params.z_move <= 0.0 {
            return Err(JobError::skipped(tool, "travel height must be positive"));
        }
        if locations == 0 {
            return Err(JobError::skipped(tool, "no locations"));
        }
        let z_cut = if z_cut > 0.0 {
            warn!("T{}: positive cut depth {}, cutting at {}", tool, z_cut, -z_cut);
            -z_cut
        } else {
            z_cut
        };
        Ok(if params.multidepth {
            depth_passes(z_cut, params.depth_per_cut)
        } else {
            vec![z_cut]
        })
    }

    fn load_params(&mut self, tool: u32, params: &ToolParams) {
        let state = &mut self.state;
        state.tool = tool;
        state.tool_diameter = params.tool_diameter;
        state.feedrate = params.feedrate;
        state.feedrate_z = params.feedrate_z;
        state.feedrate_rapid = params.feedrate_rapid;
        state.spindle_speed = params.spindle_speed;
        state.dwell = params.dwell;
        state.z_move = params.z_move;
        state.z_toolchange = params.z_toolchange;
        state.toolchange_xy = params.toolchange_xy;
        state.z_end = params.z_end;
        state.end_xy = params.end_xy;
        state.decimals = params.decimals;
        state.feed_decimals = params.feed_decimals;
    }

    fn emit(&mut self, line: String) {
        if !line.is_empty() {
            self.body.push(line);
        }
    }

    fn emit_start(&mut self) {
        let line = self.preprocessor.start(&self.state);
        self.emit(line);
        self.started = true;
    }

    /// Program start and tool change, then spin up at travel height
    fn load_tool(&mut self, tool: u32, params: &ToolParams, stats: &mut JobStats) {
        if !self.started {
            self.emit_start();
        }
        let change = params.toolchange && self.loaded_tool != Some(tool);
        if change {
            if self.loaded_tool.is_some() {
                let line = self.preprocessor.spindle_off(&self.state);
                self.emit(line);
            }
            self.lift_to(params.z_toolchange, stats);
            if let Some([x, y]) = params.toolchange_xy {
                stats.travel_distance += distance(self.position(), Coord { x, y });
                self.state.x = x;
                self.state.y = y;
                let line = self.preprocessor.rapid(&self.state);
                self.emit(line);
            }
            let line = self.preprocessor.toolchange(&self.state);
            self.emit(line);
            debug!("tool change to T{}", tool);
        }
        self.lift_to(params.z_move, stats);
        if change || self.loaded_tool.is_none() {
            let line = self.preprocessor.spindle_on(&self.state);
            self.emit(line);
            let line = self.preprocessor.dwell(&self.state);
            self.emit(line);
        }
        self.loaded_tool = Some(tool);
    }

    fn position(&self) -> Coord<f64> {
        Coord {
            x: self.state.x,
            y: self.state.y,
        }
    }

    fn lift_to(&mut self, z: f64, stats: &mut JobStats) {
        if same_height(self.state.z, z) {
            return;
        }
        if self.state.z.is_finite() {
            stats.travel_distance += (z - self.state.z).abs();
        }
        self.state.z = z;
        let line = self.preprocessor.lift(&self.state);
        self.emit(line);
    }

    fn plunge_to(&mut self, z: f64, stats: &mut JobStats) {
        stats.plunge_distance += (self.state.z - z).abs();
        self.state.z = z;
        let line = self.preprocessor.plunge(&self.state);
        self.emit(line);
    }

    fn cut_to(&mut self, to: Coord<f64>, stats: &mut JobStats) {
        stats.cut_distance += distance(self.position(), to);
        self.state.x = to.x;
        self.state.y = to.y;
        let line = self.preprocessor.linear(&self.state);
        self.emit(line);
    }

    /// Rapid to `to` at travel height, climbing over exclusion areas
    fn travel(&mut self, to: Coord<f64>, tool_diameter: f64, stats: &mut JobStats) {
        let from = self.position();
        if from == to {
            return;
        }
        for leg in self.planner.plan(from, to, tool_diameter) {
            let z = leg.safe_z.unwrap_or(self.state.z_move);
            self.lift_to(z, stats);
            stats.travel_distance += distance(self.position(), leg.to);
            self.state.x = leg.to.x;
            self.state.y = leg.to.y;
            let line = self.preprocessor.rapid(&self.state);
            self.emit(line);
        }
        self.lift_to(self.state.z_move, stats);
    }

    fn record(&mut self, mut stats: JobStats, params: &ToolParams) -> JobResult<JobStats> {
        stats.estimate_time(params);
        info!(
            "T{}: {} locations, cut {:.2}, travel {:.2}, est. {:.1} min",
            stats.tool,
            stats.locations,
            stats.cut_distance,
            stats.travel_distance,
            stats.routing_time
        );
        self.stats.push(stats.clone());
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn job() -> CncJob {
        CncJob::new(
            Units::Mm,
            Box::new(DefaultPreprocessor),
            CancellationToken::new(),
        )
    }

    fn square() -> LineString<f64> {
        LineString::new(vec![
            c(0.0, 0.0),
            c(10.0, 0.0),
            c(10.0, 10.0),
            c(0.0, 10.0),
            c(0.0, 0.0),
        ])
    }

    #[test]
    fn test_mill_square() {
        let mut job = job();
        let stats = job.mill_paths(1, &[square()], &ToolParams::default()).unwrap();
        assert_eq!(stats.locations, 1);
        assert!((stats.cut_distance - 40.0).abs() < 1e-9);

        let gcode = job.finish();
        assert!(gcode.contains("G21 ; Set units to millimeters"));
        assert!(gcode.contains("G90 ; Absolute positioning"));
        assert!(gcode.contains("M3 S10000"));
        assert!(gcode.contains("G1 Z-0.1000 F60.0"));
        assert!(gcode.contains("G1 X10.0000 Y0.0000 F120.0"));
        assert!(gcode.contains("G0 Z15.0000"));
        assert!(gcode.contains("M5 ; Stop spindle"));
        assert!(gcode.trim_end().ends_with("M30 ; End program"));
    }

    #[test]
    fn test_program_order() {
        let mut job = job();
        job.mill_paths(1, &[square()], &ToolParams::default()).unwrap();
        let gcode = job.finish();
        let at = |needle: &str| gcode.find(needle).unwrap();
        assert!(at("G21") < at("M3"));
        assert!(at("M3") < at("G1 Z"));
        assert!(at("G1 Z") < at("G1 X"));
        assert!(at("G1 X") < at("M5"));
        assert!(at("M5") < at("M30"));
    }

    #[test]
    fn test_multidepth_open_path_reverses() {
        let params = ToolParams {
            z_cut: Some(-0.25),
            depth_per_cut: 0.1,
            multidepth: true,
            ..Default::default()
        };
        let path = LineString::new(vec![c(0.0, 0.0), c(5.0, 0.0)]);
        let mut job = job();
        let stats = job.mill_paths(1, &[path], &params).unwrap();
        assert_eq!(stats.passes, 3);
        assert!((stats.cut_distance - 15.0).abs() < 1e-9);

        let gcode = job.finish();
        let plunges: Vec<&str> = gcode.lines().filter(|l| l.starts_with("G1 Z")).collect();
        assert_eq!(plunges.len(), 3);
        assert!(plunges[2].starts_with("G1 Z-0.2500"));
        // No rapid between passes of the same path
        let cuts: Vec<&str> = gcode
            .lines()
            .skip_while(|l| !l.starts_with("G1 Z"))
            .take_while(|l| !l.starts_with("G0"))
            .collect();
        assert_eq!(cuts.len(), 6);
        assert!(cuts[3].starts_with("G1 X0.0000"));
    }

    #[test]
    fn test_extracut() {
        let params = ToolParams {
            extracut: true,
            extracut_length: 2.0,
            ..Default::default()
        };
        let mut job = job();
        let stats = job.mill_paths(1, &[square()], &params).unwrap();
        assert!((stats.cut_distance - 43.0).abs() < 1e-9);
        let gcode = job.finish();
        assert!(gcode.contains("G1 X0.0000 Y1.0000"));
        assert!(gcode.contains("G1 X1.0000 Y0.0000"));
    }

    #[test]
    fn test_drill_points() {
        let points = vec![c(10.0, 0.0), c(1.0, 0.0), c(5.0, 0.0)];
        let params = ToolParams {
            z_cut: Some(-1.7),
            ..Default::default()
        };
        let mut job = job();
        let stats = job.drill_points(2, &points, &params).unwrap();
        assert_eq!(stats.locations, 3);

        let gcode = job.finish();
        let rapids: Vec<&str> = gcode.lines().filter(|l| l.starts_with("G0 X")).collect();
        assert_eq!(
            rapids,
            vec![
                "G0 X1.0000 Y0.0000",
                "G0 X5.0000 Y0.0000",
                "G0 X10.0000 Y0.0000"
            ]
        );
        assert_eq!(gcode.matches("G1 Z-1.7000").count(), 3);
    }

    #[test]
    fn test_peck_drilling() {
        let params = ToolParams {
            z_cut: Some(-1.5),
            depth_per_cut: 0.5,
            multidepth: true,
            ..Default::default()
        };
        let mut job = job();
        job.drill_points(1, &[c(3.0, 3.0)], &params).unwrap();
        let gcode = job.finish();
        assert!(gcode.contains("G1 Z-0.5000"));
        assert!(gcode.contains("G1 Z-1.0000"));
        assert!(gcode.contains("G1 Z-1.5000"));
    }

    #[test]
    fn test_toolchange_between_tools() {
        let params = ToolParams {
            toolchange: true,
            toolchange_xy: Some([0.0, 0.0]),
            ..Default::default()
        };
        let mut job = job();
        job.drill_points(1, &[c(1.0, 1.0)], &params).unwrap();
        job.drill_points(2, &[c(2.0, 2.0)], &params).unwrap();
        assert_eq!(job.stats().len(), 2);
        let gcode = job.finish();
        assert!(gcode.contains("T1 M6"));
        assert!(gcode.contains("T2 M6"));
        assert_eq!(gcode.matches("M3 S10000").count(), 2);
    }

    #[test]
    fn test_skip_conditions() {
        let mut job = job();
        let zero = ToolParams {
            z_cut: Some(0.0),
            ..Default::default()
        };
        assert_eq!(
            job.drill_points(1, &[c(0.0, 0.0)], &zero),
            Err(JobError::skipped(1, "cut depth is zero"))
        );
        let missing = ToolParams {
            z_cut: None,
            ..Default::default()
        };
        assert!(matches!(
            job.drill_points(1, &[c(0.0, 0.0)], &missing),
            Err(JobError::Skipped { .. })
        ));
        let low = ToolParams {
            z_move: 0.0,
            ..Default::default()
        };
        assert!(job.drill_points(1, &[c(0.0, 0.0)], &low).is_err());
        assert_eq!(
            job.mill_paths(4, &[], &ToolParams::default()),
            Err(JobError::skipped(4, "no locations"))
        );
        assert!(job.stats().is_empty());
        // Skipped tools leave no tool change and no cutting move behind
        let gcode = job.finish();
        assert!(gcode.lines().any(|l| l.starts_with("G17")));
        assert!(!gcode.lines().any(|l| l.starts_with("G1 ")));
        assert!(!gcode.lines().any(|l| l.starts_with('T')));
        assert!(!gcode.lines().any(|l| l.starts_with("M3")));
    }

    #[test]
    fn test_positive_depth_is_negated() {
        let params = ToolParams {
            z_cut: Some(0.2),
            ..Default::default()
        };
        let mut job = job();
        job.drill_points(1, &[c(1.0, 1.0)], &params).unwrap();
        assert!(job.finish().contains("G1 Z-0.2000"));
    }

    #[test]
    fn test_laser_without_depth() {
        let mut job = CncJob::new(Units::Mm, Box::new(GrblLaser), CancellationToken::new());
        let params = ToolParams {
            z_cut: None,
            ..Default::default()
        };
        job.mill_paths(1, &[square()], &params).unwrap();
        let gcode = job.finish();
        assert!(!gcode.contains(" Z"));
        assert!(gcode.contains("M3 S10000 ; Laser on"));
        assert!(gcode.contains("M5 ; Laser off"));
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut job = CncJob::new(Units::Mm, Box::new(DefaultPreprocessor), cancel);
        assert_eq!(
            job.drill_points(1, &[c(1.0, 1.0)], &ToolParams::default()),
            Err(JobError::Cancelled)
        );
    }

    #[test]
    fn test_travel_over_exclusion_area() {
        let mut areas = ExclusionAreas::default();
        areas.push(
            crate::geometry::rectangle(c(4.0, -1.0), c(6.0, 1.0)),
            8.0,
        );
        let mut job = job().with_planner(Box::new(areas));
        job.drill_points(1, &[c(10.0, 0.0)], &ToolParams::default())
            .unwrap();
        let gcode = job.finish();
        assert!(gcode.contains("G0 Z8.0000"));
    }

    #[test]
    fn test_header_stats() {
        let mut job = job();
        job.drill_points(3, &[c(1.0, 1.0)], &ToolParams::default())
            .unwrap();
        let gcode = job.finish();
        assert!(gcode.starts_with("; PcbMill toolpath"));
        assert!(gcode.contains("; Units: MM"));
        assert!(gcode.contains("; T3: 1 locations"));
    }
}
