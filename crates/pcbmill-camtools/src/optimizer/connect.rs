//! Joining path fragments into continuous cuts

use super::{Depleted, RTreeStorage, SpatialIndex};
use crate::geometry::{self, distance, Coord, Line, LineString, MultiPolygon};
use geo::Relate;
use pcbmill_core::CancellationToken;
use tracing::debug;

/// Longest linking move, in tool diameters
pub const MAX_WALK_FACTOR: f64 = 10.0;

/// Circle resolution of the swath used for the containment test
const SWATH_STEPS: u32 = 32;

/// Output of [`paint_connect`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Connected {
    pub paths: Vec<LineString<f64>>,
    /// Non-zero linking moves cut without lifting the tool
    pub links: Vec<Line<f64>>,
}

/// Whether the tool can move from `a` to `b` without leaving `boundary`
pub fn safe_link(
    a: Coord<f64>,
    b: Coord<f64>,
    boundary: &MultiPolygon<f64>,
    tool_diameter: f64,
) -> bool {
    if distance(a, b) >= MAX_WALK_FACTOR * tool_diameter {
        return false;
    }
    let swath = geometry::stroke(&LineString::new(vec![a, b]), tool_diameter, SWATH_STEPS);
    !swath.0.is_empty() && boundary.relate(&swath).is_contains()
}

/// Orient `path` so it starts at `endpoint`
fn starting_at(path: LineString<f64>, endpoint: Coord<f64>) -> Vec<Coord<f64>> {
    let mut coords = path.0;
    if coords.first() != Some(&endpoint) {
        coords.reverse();
    }
    coords
}

/// Chain fragments nearest-first, cutting straight across to the next one
/// whenever that move stays inside `boundary`.
///
/// Drains `storage`. The last running path is always sealed.
pub fn paint_connect<S>(
    storage: &mut S,
    boundary: &MultiPolygon<f64>,
    tool_diameter: f64,
    start: Coord<f64>,
    cancel: &CancellationToken,
) -> pcbmill_core::Result<Connected>
where
    S: SpatialIndex<LineString<f64>> + ?Sized,
{
    let mut out = Connected::default();
    let mut running: Option<Vec<Coord<f64>>> = None;
    let mut cursor = start;

    loop {
        cancel.check()?;
        let (endpoint, fragment) = match storage.pop_nearest(cursor) {
            Ok(hit) => hit,
            Err(Depleted) => break,
        };
        let coords = starting_at(fragment, endpoint);
        let (Some(&head), Some(&tail)) = (coords.first(), coords.last()) else {
            continue;
        };

        match running.as_mut() {
            Some(path) if head == cursor => path.extend(coords.into_iter().skip(1)),
            Some(path) if safe_link(cursor, head, boundary, tool_diameter) => {
                out.links.push(Line::new(cursor, head));
                path.extend(coords);
            }
            _ => {
                if let Some(done) = running.replace(coords) {
                    out.paths.push(LineString::new(done));
                }
            }
        }
        cursor = tail;
    }
    if let Some(done) = running {
        out.paths.push(LineString::new(done));
    }
    debug!(
        "paint_connect: {} paths, {} links",
        out.paths.len(),
        out.links.len()
    );
    Ok(out)
}

/// Join fragments whose endpoints coincide exactly.
///
/// Paths come out in nearest-neighbor order; a path that closes on itself
/// is not extended further.
pub fn path_connect(paths: Vec<LineString<f64>>) -> Vec<LineString<f64>> {
    let mut storage = RTreeStorage::from_items(paths.into_iter().filter(|p| !p.0.is_empty()));
    let mut out = Vec::new();
    let Some(seed) = storage.first().and_then(|id| storage.remove(id)) else {
        return out;
    };
    let mut running = seed.0;

    while let Some(&end) = running.last() {
        let Ok((endpoint, id)) = storage.nearest(end) else {
            break;
        };
        let closed = running.len() > 2 && running.first() == running.last();
        let Some(next) = storage.remove(id) else {
            break;
        };
        let coords = starting_at(next, endpoint);
        if endpoint == end && !closed {
            running.extend(coords.into_iter().skip(1));
        } else {
            out.push(LineString::new(std::mem::replace(&mut running, coords)));
        }
    }
    out.push(LineString::new(running));
    out
}
