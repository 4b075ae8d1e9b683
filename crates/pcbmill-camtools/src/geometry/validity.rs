//! Ring validity checks and repair

use super::{difference, union_all, MultiPolygon, Polygon, MERGE_EPSILON};
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::orient::{Direction, Orient};
use geo::{Area, Buffer, Coord, Line, LineString};

/// Whether every ring of the polygon is closed, finite and simple
pub fn is_valid_polygon(poly: &Polygon<f64>) -> bool {
    if poly.exterior().0.is_empty() {
        return poly.interiors().is_empty();
    }
    std::iter::once(poly.exterior())
        .chain(poly.interiors())
        .all(ring_is_simple)
}

pub fn is_valid(mp: &MultiPolygon<f64>) -> bool {
    mp.iter().all(is_valid_polygon)
}

/// Fix a self-intersecting polygon.
///
/// Every ring is split at its crossings into simple loops. The loops of
/// the exterior are unioned and the loops of the holes subtracted. When
/// that leaves no area a tiny dilation is tried, and when that collapses
/// as well the input is returned unchanged.
pub fn repair(poly: &Polygon<f64>) -> MultiPolygon<f64> {
    let shells = union_all(&simple_loops(poly.exterior()));
    let holes: Vec<Polygon<f64>> = poly
        .interiors()
        .iter()
        .flat_map(simple_loops)
        .collect();
    let repaired = difference(&shells, &union_all(&holes));
    if repaired.unsigned_area() > 0.0 {
        return repaired;
    }

    let dilated = MultiPolygon::new(vec![poly.clone()]).buffer(MERGE_EPSILON);
    if dilated.unsigned_area() > 0.0 {
        dilated
    } else {
        MultiPolygon::new(vec![poly.clone()])
    }
}

/// Split a ring into simple counter-clockwise loops at every point where
/// it crosses or touches itself
fn simple_loops(ring: &LineString<f64>) -> Vec<Polygon<f64>> {
    let noded = node_ring(ring);
    let mut loops = Vec::new();
    let mut path: Vec<Coord<f64>> = Vec::with_capacity(noded.len());
    for point in noded {
        match path.iter().position(|c| *c == point) {
            Some(k) => {
                let mut closed = path.split_off(k + 1);
                closed.insert(0, path[k]);
                closed.push(point);
                if closed.len() >= 4 {
                    loops.push(Polygon::new(LineString::new(closed), vec![]));
                }
            }
            None => path.push(point),
        }
    }
    loops
        .into_iter()
        .map(|poly| poly.orient(Direction::Default))
        .filter(|poly| poly.unsigned_area() > 0.0)
        .collect()
}

/// Closed ring with every crossing between non-adjacent segments inserted
/// as a vertex on both segments
fn node_ring(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut coords: Vec<Coord<f64>> = ring
        .0
        .iter()
        .copied()
        .filter(|c| c.x.is_finite() && c.y.is_finite())
        .collect();
    coords.dedup();
    if coords.len() > 1 && coords.first() != coords.last() {
        coords.push(coords[0]);
    }
    if coords.len() < 4 {
        return coords;
    }

    let segments: Vec<Line<f64>> = coords.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    let n = segments.len();
    let mut splits: Vec<Vec<(f64, Coord<f64>)>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            if let Some(LineIntersection::SinglePoint { intersection, .. }) =
                line_intersection(segments[i], segments[j])
            {
                splits[i].push((parameter(&segments[i], intersection), intersection));
                splits[j].push((parameter(&segments[j], intersection), intersection));
            }
        }
    }

    let mut noded = Vec::with_capacity(coords.len() + splits.iter().map(Vec::len).sum::<usize>());
    for (segment, mut cuts) in segments.iter().zip(splits) {
        cuts.sort_by(|a, b| a.0.total_cmp(&b.0));
        noded.push(segment.start);
        noded.extend(cuts.into_iter().map(|(_, c)| c));
    }
    noded.push(coords[n]);
    noded.dedup();
    noded
}

/// Position of `c` along the segment, 0 at the start and 1 at the end
fn parameter(segment: &Line<f64>, c: Coord<f64>) -> f64 {
    let d = segment.delta();
    let len2 = d.x * d.x + d.y * d.y;
    if len2 == 0.0 {
        return 0.0;
    }
    ((c.x - segment.start.x) * d.x + (c.y - segment.start.y) * d.y) / len2
}

fn ring_is_simple(ring: &LineString<f64>) -> bool {
    if !ring.is_closed() {
        return false;
    }
    let mut coords: Vec<Coord<f64>> = ring.0.clone();
    if coords.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return false;
    }
    coords.dedup();
    if coords.len() < 4 {
        return false;
    }

    let segments: Vec<Line<f64>> = coords.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    let n = segments.len();

    // Sweep along x so only segments with overlapping extents are compared.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| min_x(&segments[a]).total_cmp(&min_x(&segments[b])));

    let mut active: Vec<usize> = Vec::new();
    for &i in &order {
        let start = min_x(&segments[i]);
        active.retain(|&j| max_x(&segments[j]) >= start);
        for &j in &active {
            if y_overlap(&segments[i], &segments[j]) && conflicts(i, j, n, &segments) {
                return false;
            }
        }
        active.push(i);
    }
    true
}

fn conflicts(i: usize, j: usize, n: usize, segments: &[Line<f64>]) -> bool {
    let adjacent = i.abs_diff(j) == 1 || i.abs_diff(j) == n - 1;
    match line_intersection(segments[i], segments[j]) {
        None => false,
        Some(LineIntersection::Collinear { .. }) => true,
        Some(LineIntersection::SinglePoint { .. }) => !adjacent,
    }
}

fn min_x(l: &Line<f64>) -> f64 {
    l.start.x.min(l.end.x)
}

fn max_x(l: &Line<f64>) -> f64 {
    l.start.x.max(l.end.x)
}

fn y_overlap(a: &Line<f64>, b: &Line<f64>) -> bool {
    a.start.y.min(a.end.y) <= b.start.y.max(b.end.y)
        && b.start.y.min(b.end.y) <= a.start.y.max(a.end.y)
}
