use geo::{Area, BoundingRect};
use pcbmill_camtools::geometry::{self, Coord, MergeStrategy};
use pcbmill_camtools::gerber::{self, Defect, GerberOptions, ParseStatus, SourceKind};
use pcbmill_camtools::GerberError;
use pcbmill_core::{CancellationToken, Units};
use proptest::prelude::*;
use std::f64::consts::PI;

const BOARD: &str = "G04 Two traces and a pad*
%FSLAX24Y24*%
%MOMM*%
%ADD10C,0.5*%
%ADD11R,2.0X1.0*%
G01*
D10*
X0Y0D02*
X100000Y0D01*
X100000Y50000D01*
D11*
X0Y50000D03*
M02*
";

fn options() -> GerberOptions {
    GerberOptions {
        merge: MergeStrategy::UnaryUnion,
        ..GerberOptions::default()
    }
}

fn parse(text: &str) -> gerber::ParsedGerber {
    gerber::parse(text, &options(), &CancellationToken::new()).unwrap()
}

fn disc_area(radius: f64) -> f64 {
    geometry::circle(Coord { x: 0.0, y: 0.0 }, radius, 64).unsigned_area()
}

#[test]
fn test_simple_board() {
    let parsed = parse(BOARD);
    assert_eq!(parsed.status, ParseStatus::Success);
    assert_eq!(parsed.kind, SourceKind::Rs274x);

    let object = &parsed.geometry;
    assert_eq!(object.units, Units::Mm);
    assert_eq!(object.tools[&10].fragments.len(), 1);
    assert_eq!(object.tools[&11].fragments.len(), 1);
    assert_eq!(object.drill_locations(11), vec![Coord { x: 0.0, y: 5.0 }]);

    let bounds = object.solid_geometry.bounding_rect().unwrap();
    assert!((bounds.min().x + 1.0).abs() < 1e-6);
    assert!((bounds.max().x - 10.25).abs() < 1e-2);
    assert!((bounds.max().y - 5.5).abs() < 1e-6);
}

#[test]
fn test_trace_follow_geometry() {
    let parsed = parse(BOARD);
    let paths = parsed.geometry.tool_paths(10);
    assert_eq!(paths.len(), 1);
    assert_eq!(
        paths[0].0,
        vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 10.0, y: 5.0 }
        ]
    );
}

#[test]
fn test_kicad_attributes_are_ignored() {
    let text = "%TF.GenerationSoftware,KiCad,Pcbnew,7.0*%
%TF.FileFunction,Copper,L1,Top*%
%FSLAX46Y46*%
%MOMM*%
%TA.AperFunction,ComponentPad*%
%ADD10C,1.000000*%
%TD*%
D10*
%TO.C,R1*%
X1000000Y1000000D03*
%TD*%
M02*
";
    let parsed = parse(text);
    assert_eq!(parsed.kind, SourceKind::GerberX2);
    assert_eq!(parsed.status, ParseStatus::Success);
    assert!((parsed.geometry.solid_geometry.unsigned_area() - disc_area(0.5)).abs() < 1e-6);
}

#[test]
fn test_full_circle_arc() {
    let text = "%FSLAX24Y24*%
%MOMM*%
%ADD10C,0.1*%
G75*
D10*
X10000Y0D02*
G03X10000Y0I-10000J0D01*
M02*
";
    let parsed = parse(text);
    let bounds = parsed.geometry.solid_geometry.bounding_rect().unwrap();
    assert!((bounds.min().x + 1.05).abs() < 1e-2);
    assert!((bounds.max().y - 1.05).abs() < 1e-2);
    let ring = 2.0 * PI * 0.1;
    assert!((parsed.geometry.solid_geometry.unsigned_area() - ring).abs() < 0.01);
}

#[test]
fn test_macro_exposure_composition() {
    let text = "%FSLAX24Y24*%
%MOMM*%
%AMDONUT*
1,1,10,0,0*
1,0,4,0,0*%
%ADD20DONUT*%
D20*
X0Y0D03*
M02*
";
    let parsed = parse(text);
    let expected = disc_area(5.0) - disc_area(2.0);
    let area = parsed.geometry.solid_geometry.unsigned_area();
    assert!((area - expected).abs() < 1e-3, "area {area}, expected {expected}");
    let interiors: usize = parsed
        .geometry
        .solid_geometry
        .iter()
        .map(|p| p.interiors().len())
        .sum();
    assert_eq!(interiors, 1);
}

#[test]
fn test_region_fill() {
    let text = "%FSLAX24Y24*%
%MOMM*%
G36*
X0Y0D02*
G01X100000Y0D01*
X100000Y100000D01*
X0Y100000D01*
X0Y0D01*
G37*
M02*
";
    let parsed = parse(text);
    assert_eq!(parsed.status, ParseStatus::Success);
    assert!((parsed.geometry.solid_geometry.unsigned_area() - 100.0).abs() < 1e-6);
}

#[test]
fn test_undefined_aperture_recovery() {
    let text = "%FSLAX24Y24*%
%MOMM*%
%ADD10C,1.0*%
D99*
X0Y0D03*
D10*
X50000Y0D03*
M02*
";
    let parsed = parse(text);
    match &parsed.status {
        ParseStatus::Defective(defects) => {
            assert!(matches!(
                defects[0],
                Defect::UndefinedAperture { id: 99, .. }
            ));
        }
        other => panic!("expected a defective parse, got {other:?}"),
    }
    assert!((parsed.geometry.solid_geometry.unsigned_area() - disc_area(0.5)).abs() < 1e-6);
}

#[test]
fn test_step_and_repeat() {
    let text = "%FSLAX24Y24*%
%MOMM*%
%ADD10C,1.0*%
%SRX3Y2I5.0J5.0*%
D10*
X0Y0D03*
%SR*%
M02*
";
    let parsed = parse(text);
    assert_eq!(parsed.geometry.drill_locations(10).len(), 6);
    let area = parsed.geometry.solid_geometry.unsigned_area();
    assert!((area - 6.0 * disc_area(0.5)).abs() < 1e-5);
}

#[test]
fn test_obsolete_statements() {
    let text = "G04 Legacy file*
%FSLAX24Y24*%
%MOIN*%
%IPPOS*%
%LNCOPPER*%
G70*
G90*
%ADD10C,0.010*%
G54D10*
X10000Y10000D03*
M00*
M02*
";
    let parsed = parse(text);
    assert_eq!(parsed.status, ParseStatus::Success);
    assert_eq!(parsed.geometry.units, Units::Inch);
    assert_eq!(
        parsed.geometry.drill_locations(10),
        vec![Coord { x: 1.0, y: 1.0 }]
    );
}

#[test]
fn test_empty_file_fails() {
    let result = gerber::parse("G04 nothing*\nM02*\n", &options(), &CancellationToken::new());
    assert!(matches!(result, Err(GerberError::Empty)));
}

#[test]
fn test_cancelled_parse() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = gerber::parse(BOARD, &options(), &cancel);
    assert!(matches!(result, Err(GerberError::Cancelled)));
}

#[test]
fn test_buffer_union_strategy_matches_exact_union() {
    let exact = parse(BOARD).geometry.solid_geometry.unsigned_area();
    let approx = gerber::parse(BOARD, &GerberOptions::default(), &CancellationToken::new())
        .unwrap()
        .geometry
        .solid_geometry
        .unsigned_area();
    assert!((exact - approx).abs() < 1e-4);
}

#[test]
fn test_parse_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.gtl");
    std::fs::write(&path, BOARD).unwrap();
    let parsed = gerber::parse_file(&path, &options(), &CancellationToken::new()).unwrap();
    assert_eq!(parsed.geometry.tools.len(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_polarity_batching(dark in 1usize..6) {
        let mut text = String::from("%FSLAX24Y24*%\n%MOMM*%\n%ADD10C,2.0*%\n%ADD11C,1.0*%\nD10*\n");
        for i in 0..dark {
            text.push_str(&format!("X{}Y0D03*\n", i * 50000));
        }
        text.push_str("%LPC*%\nD11*\nX0Y0D03*\nM02*\n");

        let parsed = parse(&text);
        let expected = dark as f64 * disc_area(1.0) - disc_area(0.5);
        prop_assert!((parsed.geometry.solid_geometry.unsigned_area() - expected).abs() < 1e-4);
    }
}
