//! Rapid travel planning around exclusion areas

use crate::geometry::{self, Coord, JoinStyle, LineString, MultiPolygon, Polygon};
use geo::{BooleanOps, MultiLineString};
use tracing::debug;

/// One leg of a rapid traversal.
///
/// The tool rises (or drops) to `safe_z` before moving to `to`; `None`
/// means the job's standard travel height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelMove {
    pub to: Coord<f64>,
    pub safe_z: Option<f64>,
}

impl TravelMove {
    pub fn standard(to: Coord<f64>) -> Self {
        Self { to, safe_z: None }
    }
}

/// Splits a rapid traversal into legs with their own travel heights
pub trait TravelPlanner: Send + Sync {
    fn plan(&self, from: Coord<f64>, to: Coord<f64>, tool_diameter: f64) -> Vec<TravelMove>;
}

/// Straight rapids at the standard travel height
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectTravel;

impl TravelPlanner for DirectTravel {
    fn plan(&self, _from: Coord<f64>, to: Coord<f64>, _tool_diameter: f64) -> Vec<TravelMove> {
        vec![TravelMove::standard(to)]
    }
}

/// A region the tool must clear at a given height
#[derive(Debug, Clone, PartialEq)]
pub struct ExclusionArea {
    pub polygon: Polygon<f64>,
    pub safe_z: f64,
}

/// Lifts to each crossed area's height while traversing it.
///
/// Installed with `CncJob::with_planner` when clamps or fixtures stand
/// above the board; jobs use [`DirectTravel`] otherwise.
#[derive(Debug, Default, Clone)]
pub struct ExclusionAreas {
    areas: Vec<ExclusionArea>,
}

impl ExclusionAreas {
    pub fn new(areas: Vec<ExclusionArea>) -> Self {
        Self { areas }
    }

    pub fn push(&mut self, polygon: Polygon<f64>, safe_z: f64) {
        self.areas.push(ExclusionArea { polygon, safe_z });
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Parameter intervals along `from -> to` that fall inside each area
    fn crossings(
        &self,
        from: Coord<f64>,
        to: Coord<f64>,
        tool_diameter: f64,
    ) -> Vec<(f64, f64, f64)> {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let len2 = dx * dx + dy * dy;
        if len2 == 0.0 {
            return Vec::new();
        }
        let project =
            |c: &Coord<f64>| (((c.x - from.x) * dx + (c.y - from.y) * dy) / len2).clamp(0.0, 1.0);
        let travel = MultiLineString::new(vec![LineString::new(vec![from, to])]);

        let mut spans = Vec::new();
        for area in &self.areas {
            let grown: MultiPolygon<f64> = if tool_diameter > 0.0 {
                geometry::offset(&area.polygon, tool_diameter / 2.0, JoinStyle::Round)
            } else {
                MultiPolygon::new(vec![area.polygon.clone()])
            };
            for piece in grown.clip(&travel, false) {
                let ts: Vec<f64> = piece.0.iter().map(project).collect();
                let lo = ts.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = ts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if lo < hi {
                    spans.push((lo, hi, area.safe_z));
                }
            }
        }
        spans.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut merged: Vec<(f64, f64, f64)> = Vec::new();
        for (lo, hi, z) in spans {
            match merged.last_mut() {
                Some(last) if lo <= last.1 => {
                    last.1 = last.1.max(hi);
                    last.2 = last.2.max(z);
                }
                _ => merged.push((lo, hi, z)),
            }
        }
        merged
    }
}

impl TravelPlanner for ExclusionAreas {
    fn plan(&self, from: Coord<f64>, to: Coord<f64>, tool_diameter: f64) -> Vec<TravelMove> {
        let at = |t: f64| Coord {
            x: from.x + (to.x - from.x) * t,
            y: from.y + (to.y - from.y) * t,
        };
        let mut moves = Vec::new();
        let mut reached = 0.0;
        for (lo, hi, z) in self.crossings(from, to, tool_diameter) {
            if lo > reached {
                moves.push(TravelMove::standard(at(lo)));
            }
            let to = if hi >= 1.0 { to } else { at(hi) };
            moves.push(TravelMove {
                to,
                safe_z: Some(z),
            });
            reached = hi;
        }
        if reached < 1.0 {
            moves.push(TravelMove::standard(to));
        }
        debug!("travel planned in {} legs", moves.len());
        moves
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn close(a: Coord<f64>, b: Coord<f64>) -> bool {
        geometry::distance(a, b) < 1e-6
    }

    #[test]
    fn test_direct_travel() {
        let moves = DirectTravel.plan(c(0.0, 0.0), c(5.0, 5.0), 1.0);
        assert_eq!(moves, vec![TravelMove::standard(c(5.0, 5.0))]);
    }

    #[test]
    fn test_crossing_lifts() {
        let areas = ExclusionAreas::new(vec![ExclusionArea {
            polygon: geometry::rectangle(c(4.0, -1.0), c(6.0, 1.0)),
            safe_z: 10.0,
        }]);
        let moves = areas.plan(c(0.0, 0.0), c(10.0, 0.0), 0.0);
        assert_eq!(moves.len(), 3);
        assert!(close(moves[0].to, c(4.0, 0.0)));
        assert_eq!(moves[0].safe_z, None);
        assert!(close(moves[1].to, c(6.0, 0.0)));
        assert_eq!(moves[1].safe_z, Some(10.0));
        assert_eq!(moves[2], TravelMove::standard(c(10.0, 0.0)));
    }

    #[test]
    fn test_tool_diameter_grows_area() {
        let areas = ExclusionAreas::new(vec![ExclusionArea {
            polygon: geometry::rectangle(c(4.0, -1.0), c(6.0, 1.0)),
            safe_z: 10.0,
        }]);
        let moves = areas.plan(c(0.0, 0.0), c(10.0, 0.0), 2.0);
        assert!((moves[0].to.x - 3.0).abs() < 1e-6);
        assert!((moves[1].to.x - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_overlapping_areas_use_highest() {
        let mut areas = ExclusionAreas::default();
        areas.push(geometry::rectangle(c(2.0, -1.0), c(5.0, 1.0)), 5.0);
        areas.push(geometry::rectangle(c(4.0, -1.0), c(8.0, 1.0)), 12.0);
        let moves = areas.plan(c(0.0, 0.0), c(10.0, 0.0), 0.0);
        assert_eq!(moves.len(), 3);
        assert!(close(moves[1].to, c(8.0, 0.0)));
        assert_eq!(moves[1].safe_z, Some(12.0));
    }

    #[test]
    fn test_miss_is_direct() {
        let mut areas = ExclusionAreas::default();
        areas.push(geometry::rectangle(c(4.0, 3.0), c(6.0, 5.0)), 5.0);
        let moves = areas.plan(c(0.0, 0.0), c(10.0, 0.0), 0.5);
        assert_eq!(moves, vec![TravelMove::standard(c(10.0, 0.0))]);
    }

    #[test]
    fn test_ends_inside_area() {
        let mut areas = ExclusionAreas::default();
        areas.push(geometry::rectangle(c(4.0, -1.0), c(12.0, 1.0)), 7.0);
        let moves = areas.plan(c(0.0, 0.0), c(10.0, 0.0), 0.0);
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[1].to, c(10.0, 0.0));
        assert_eq!(moves[1].safe_z, Some(7.0));
    }
}
