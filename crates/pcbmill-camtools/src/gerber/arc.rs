//! Circular interpolation

use super::state::QuadrantMode;
use crate::geometry::{distance, Coord};
use std::f64::consts::{PI, TAU};

/// Direction of travel along an arc
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcDirection {
    Clockwise,
    CounterClockwise,
}

/// Signed angular span from `start` to `stop` for the given direction.
///
/// A counter-clockwise arc whose stop does not exceed its start gains a
/// full turn, and a clockwise one loses one, so equal angles mean a full
/// circle.
fn span(start: f64, stop: f64, direction: ArcDirection) -> f64 {
    match direction {
        ArcDirection::CounterClockwise if stop <= start => stop + TAU - start,
        ArcDirection::Clockwise if stop >= start => stop - TAU - start,
        _ => stop - start,
    }
}

/// Points along an arc, both ends included.
///
/// Uses `max(2, ceil(|span| / 2π * steps_per_circle))` steps.
pub fn arc_points(
    center: Coord<f64>,
    radius: f64,
    start: f64,
    stop: f64,
    direction: ArcDirection,
    steps_per_circle: u32,
) -> Vec<Coord<f64>> {
    let da = span(start, stop, direction);
    let steps = ((da.abs() / TAU * steps_per_circle as f64).ceil() as usize).max(2);
    (0..=steps)
        .map(|k| {
            let angle = start + da * k as f64 / steps as f64;
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect()
}

/// Points of a `G02`/`G03` move from `current` to `target` with center
/// offsets `i`, `j`.
///
/// In multi-quadrant mode the center is `current + (i, j)` and a move to
/// the current point is a full circle. In single-quadrant mode the offsets
/// are unsigned; the first of `(i,j)`, `(-i,j)`, `(i,-j)`, `(-i,-j)` whose
/// end radius is within 5% of the start radius and whose span is at most
/// a quarter turn wins. `None` when no candidate fits.
///
/// The last point is replaced by `target` exactly.
pub fn interpolate(
    current: Coord<f64>,
    target: Coord<f64>,
    i: f64,
    j: f64,
    direction: ArcDirection,
    quadrant: QuadrantMode,
    steps_per_circle: u32,
) -> Option<Vec<Coord<f64>>> {
    let (center, start, stop) = match quadrant {
        QuadrantMode::Multi => {
            let center = Coord {
                x: current.x + i,
                y: current.y + j,
            };
            let start = (-j).atan2(-i);
            let stop = if current == target {
                start
            } else {
                (target.y - center.y).atan2(target.x - center.x)
            };
            (center, start, stop)
        }
        QuadrantMode::Single => {
            [(i, j), (-i, j), (i, -j), (-i, -j)]
                .into_iter()
                .find_map(|(ci, cj)| {
                    let center = Coord {
                        x: current.x + ci,
                        y: current.y + cj,
                    };
                    let radius = ci.hypot(cj);
                    let radius2 = distance(center, target);
                    if radius2 < 0.95 * radius || radius2 > 1.05 * radius {
                        return None;
                    }
                    let start = (-cj).atan2(-ci);
                    let stop = (target.y - center.y).atan2(target.x - center.x);
                    if span(start, stop, direction).abs() <= (PI + 1e-6) / 2.0 {
                        Some((center, start, stop))
                    } else {
                        None
                    }
                })?
        }
    };

    let radius = i.hypot(j);
    let mut points = arc_points(center, radius, start, stop, direction, steps_per_circle);
    if let Some(last) = points.last_mut() {
        *last = target;
    }
    Some(points)
}
