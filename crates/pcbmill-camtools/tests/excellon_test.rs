use pcbmill_camtools::excellon::{self, ExcellonOptions};
use pcbmill_camtools::geometry::Coord;
use pcbmill_camtools::{CamToolError, ExcellonError};
use pcbmill_core::{CancellationToken, Units};
use std::f64::consts::PI;

const LEGACY: &str = "M48
INCH,TZ
T01C0.0350
T02C0.0400
%
T01
X15000Y20000
X25000
T02
X30000Y5000G85X40000Y5000
M30
";

fn c(x: f64, y: f64) -> Coord<f64> {
    Coord { x, y }
}

#[test]
fn test_legacy_inch_file() {
    let object = excellon::parse(LEGACY, &ExcellonOptions::default(), &CancellationToken::new())
        .unwrap();
    assert_eq!(object.units, Units::Inch);
    assert_eq!(object.tools.len(), 2);
    // Coordinates are modal: the second hit keeps Y
    assert_eq!(object.drill_locations(1), vec![c(1.5, 2.0), c(2.5, 2.0)]);

    let slots = object.tool_paths(2);
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].0, vec![c(3.0, 0.5), c(4.0, 0.5)]);
    assert!(object.drill_locations(2).is_empty());
}

#[test]
fn test_drilled_area() {
    let text = "M48
METRIC,TZ,000.000
T1C1.000
%
T1
X010000Y010000
X020000Y010000
M30
";
    let object =
        excellon::parse(text, &ExcellonOptions::default(), &CancellationToken::new()).unwrap();
    assert_eq!(object.units, Units::Mm);
    assert_eq!(object.drill_locations(1), vec![c(10.0, 10.0), c(20.0, 10.0)]);
    let area = excellon::drilled_area(&object);
    assert!((area - 2.0 * PI * 0.25).abs() < 0.01);
}

#[test]
fn test_headerless_file_uses_defaults() {
    let options = ExcellonOptions {
        units: Units::Mm,
        ..ExcellonOptions::default()
    };
    let object = excellon::parse(
        "T1C0.8\nT1\nX1.5Y2.5\nM30\n",
        &options,
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(object.units, Units::Mm);
    assert_eq!(object.drill_locations(1), vec![c(1.5, 2.5)]);
}

#[test]
fn test_no_hits_is_empty() {
    let result = excellon::parse(
        "M48\nMETRIC\nT1C1.0\n%\nM30\n",
        &ExcellonOptions::default(),
        &CancellationToken::new(),
    );
    assert!(matches!(result, Err(ExcellonError::Empty)));
}

#[test]
fn test_cancelled() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = excellon::parse(LEGACY, &ExcellonOptions::default(), &cancel);
    assert!(matches!(result, Err(ExcellonError::Cancelled)));
}

#[test]
fn test_parse_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.drl");
    std::fs::write(&path, LEGACY).unwrap();
    let object =
        excellon::parse_file(&path, &ExcellonOptions::default(), &CancellationToken::new())
            .unwrap();
    assert_eq!(object.drill_locations(1).len(), 2);

    let missing = excellon::parse_file(
        dir.path().join("missing.drl"),
        &ExcellonOptions::default(),
        &CancellationToken::new(),
    );
    assert!(matches!(missing, Err(CamToolError::IoError(_))));
}
