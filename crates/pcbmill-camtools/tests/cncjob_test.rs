use pcbmill_camtools::cncjob::{
    preprocessor_by_name, CncJob, DefaultPreprocessor, ExclusionAreas, ToolParams,
};
use pcbmill_camtools::excellon::{self, ExcellonOptions};
use pcbmill_camtools::geometry::{self, Coord};
use pcbmill_camtools::gerber::{self, GerberOptions};
use pcbmill_camtools::optimizer::OrderingStrategy;
use pcbmill_camtools::JobError;
use pcbmill_core::{CancellationToken, Units};

const COPPER: &str = "%FSLAX24Y24*%
%MOMM*%
%ADD10C,1.6*%
%ADD11C,0.4*%
D10*
X0Y0D03*
X100000Y0D03*
D11*
X0Y0D02*
X100000Y0D01*
M02*
";

const DRILL: &str = "M48
METRIC,TZ,000.000
T1C0.800
T2C1.000
%
T1
X000000Y000000
X010000Y000000
T2
X005000Y005000
M30
";

fn c(x: f64, y: f64) -> Coord<f64> {
    Coord { x, y }
}

#[test]
fn test_isolation_milling() {
    let copper = gerber::parse(COPPER, &GerberOptions::default(), &CancellationToken::new())
        .unwrap()
        .geometry;
    let paths = copper.isolation_paths(0.2, 2, 0.1);
    assert_eq!(paths.len(), 2);

    let params = ToolParams {
        tool_diameter: 0.2,
        z_cut: Some(-0.05),
        extracut: true,
        ..Default::default()
    };
    let mut job = CncJob::new(
        Units::Mm,
        Box::new(DefaultPreprocessor),
        CancellationToken::new(),
    );
    let stats = job.mill_paths(1, &paths, &params).unwrap();
    assert_eq!(stats.locations, 2);
    assert!(stats.cut_distance > 20.0);
    assert!(stats.routing_time > 0.0);

    let gcode = job.finish();
    assert!(gcode.contains("G1 Z-0.0500 F60.0"));
    assert_eq!(gcode.matches("G1 Z-0.0500").count(), 2);
    assert!(gcode.contains("M30"));
}

#[test]
fn test_drill_job_with_toolchange() {
    let drills =
        excellon::parse(DRILL, &ExcellonOptions::default(), &CancellationToken::new()).unwrap();
    let params = ToolParams {
        z_cut: Some(-1.7),
        toolchange: true,
        ordering: OrderingStrategy::Greedy,
        end_xy: Some([0.0, 0.0]),
        ..Default::default()
    };
    let mut job = CncJob::new(
        Units::Mm,
        preprocessor_by_name("default").unwrap(),
        CancellationToken::new(),
    );
    for (&tool, entry) in &drills.tools {
        let tool_params = ToolParams {
            tool_diameter: entry.aperture.size,
            ..params.clone()
        };
        job.drill_points(tool, &drills.drill_locations(tool), &tool_params)
            .unwrap();
    }
    let stats = job.stats().to_vec();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].locations, 2);
    assert_eq!(stats[1].locations, 1);

    let gcode = job.finish();
    let t1 = gcode.find("T1 M6").unwrap();
    let t2 = gcode.find("T2 M6").unwrap();
    assert!(t1 < t2);
    assert!(gcode[t2..].contains("G0 X5.0000 Y5.0000"));
    assert_eq!(gcode.matches("G1 Z-1.7000").count(), 3);
    assert!(gcode.contains("; Tool diameter 0.8000"));
}

#[test]
fn test_skipped_tool_does_not_stop_job() {
    let mut job = CncJob::new(
        Units::Mm,
        Box::new(DefaultPreprocessor),
        CancellationToken::new(),
    );
    let bad = ToolParams {
        z_cut: Some(0.0),
        ..Default::default()
    };
    let err = job.drill_points(1, &[c(1.0, 1.0)], &bad).unwrap_err();
    assert!(matches!(err, JobError::Skipped { tool: 1, .. }));

    job.drill_points(2, &[c(1.0, 1.0)], &ToolParams::default())
        .unwrap();
    assert_eq!(job.stats().len(), 1);
    assert!(job.finish().contains("G1 Z-0.1000"));
}

#[test]
fn test_inch_program() {
    let mut job = CncJob::new(
        Units::Inch,
        Box::new(DefaultPreprocessor),
        CancellationToken::new(),
    );
    let params = ToolParams {
        z_cut: Some(-0.004),
        z_move: 0.1,
        ..Default::default()
    };
    job.drill_points(1, &[c(0.5, 0.5)], &params).unwrap();
    let gcode = job.finish();
    assert!(gcode.contains("G20 ; Set units to inches"));
    assert!(gcode.contains("G1 Z-0.0040"));
}

#[test]
fn test_exclusion_area_lifts_rapids() {
    let mut areas = ExclusionAreas::default();
    areas.push(geometry::rectangle(c(4.0, -2.0), c(6.0, 2.0)), 20.0);
    let mut job = CncJob::new(
        Units::Mm,
        Box::new(DefaultPreprocessor),
        CancellationToken::new(),
    )
    .with_planner(Box::new(areas));
    job.drill_points(
        1,
        &[c(1.0, 0.0), c(9.0, 0.0)],
        &ToolParams {
            ordering: OrderingStrategy::Greedy,
            ..Default::default()
        },
    )
    .unwrap();
    let gcode = job.finish();
    let lifted = gcode.find("G0 Z20.0000").unwrap();
    let second = gcode.find("G0 X9.0000 Y0.0000").unwrap();
    assert!(lifted < second);
}
