//! Planar geometry kernel
//!
//! Wraps the `geo` crate with the operations the importers and the
//! toolpath generator need: shape builders with an explicit circle
//! resolution, boolean composition, offsetting with a join style, the two
//! batch-merge strategies, affine transforms and ring validity checks.

mod transform;
mod validity;

pub use transform::{mirroring, rotation, scaling, skewing, translation, MirrorAxis};
pub use validity::{is_valid, is_valid_polygon, repair};

pub use geo::{AffineTransform, Coord, Line, LineString, MultiPolygon, Point, Polygon, Rect};

use geo::algorithm::buffer::{BufferStyle, LineCap, LineJoin};
use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, BoundingRect, Buffer, MultiLineString, Simplify};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Dilate/erode distance used to merge touching polygons
pub const MERGE_EPSILON: f64 = 1e-8;

/// Longest mitre of [`JoinStyle::Mitre`], as a multiple of the offset distance
const MITRE_LIMIT: f64 = 5.0;

/// Vertex and sliver tolerance used by [`clean`]
pub const CLEAN_TOLERANCE: f64 = 1e-6;

/// Corner treatment when offsetting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinStyle {
    /// Rounded corners
    #[default]
    Round,
    /// Sharp corners, clipped at a miter limit
    Mitre,
    /// Chamfered corners
    Bevel,
}

/// How a batch of polygons is merged into one area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Collect into a multipolygon, dilate and erode by [`MERGE_EPSILON`]
    #[default]
    BufferUnion,
    /// Exact boolean union
    UnaryUnion,
}

/// One geometry entry: a point, an open or closed path, or an area
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point(Point<f64>),
    Line(LineString<f64>),
    Area(MultiPolygon<f64>),
}

impl Shape {
    /// Enclosed area (zero for points and lines)
    pub fn area(&self) -> f64 {
        match self {
            Shape::Area(mp) => mp.unsigned_area(),
            _ => 0.0,
        }
    }

    /// Whether the shape carries no coordinates
    pub fn is_empty(&self) -> bool {
        match self {
            Shape::Point(_) => false,
            Shape::Line(ls) => ls.0.is_empty(),
            Shape::Area(mp) => mp.0.is_empty(),
        }
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            Shape::Point(p) => Some(p.bounding_rect()),
            Shape::Line(ls) => ls.bounding_rect(),
            Shape::Area(mp) => mp.bounding_rect(),
        }
    }

    /// The polygons of an area shape, empty for points and lines
    pub fn polygons(&self) -> &[Polygon<f64>] {
        match self {
            Shape::Area(mp) => &mp.0,
            _ => &[],
        }
    }

    /// Offset by `distance`.
    ///
    /// Points grow into discs. Open lines grow into strokes; a negative
    /// distance first closes the line into a ring and erodes the enclosed
    /// area.
    pub fn buffered(&self, distance: f64, join: JoinStyle, steps: u32) -> Shape {
        if distance == 0.0 {
            return self.clone();
        }
        match self {
            Shape::Point(p) => {
                if distance > 0.0 {
                    Shape::Area(MultiPolygon::new(vec![circle(p.0, distance, steps)]))
                } else {
                    Shape::Area(empty())
                }
            }
            Shape::Line(ls) => {
                if distance > 0.0 {
                    Shape::Area(offset(ls, distance, join))
                } else {
                    let ring = Polygon::new(ls.clone(), vec![]);
                    Shape::Area(offset(&ring, distance, join))
                }
            }
            Shape::Area(mp) => Shape::Area(offset(mp, distance, join)),
        }
    }
}

impl From<Polygon<f64>> for Shape {
    fn from(poly: Polygon<f64>) -> Self {
        Shape::Area(MultiPolygon::new(vec![poly]))
    }
}

impl From<MultiPolygon<f64>> for Shape {
    fn from(mp: MultiPolygon<f64>) -> Self {
        Shape::Area(mp)
    }
}

impl From<LineString<f64>> for Shape {
    fn from(ls: LineString<f64>) -> Self {
        Shape::Line(ls)
    }
}

impl From<Coord<f64>> for Shape {
    fn from(c: Coord<f64>) -> Self {
        Shape::Point(Point(c))
    }
}

/// An empty multipolygon
pub fn empty() -> MultiPolygon<f64> {
    MultiPolygon::new(vec![])
}

/// Circle approximated by `steps` vertices
pub fn circle(center: Coord<f64>, radius: f64, steps: u32) -> Polygon<f64> {
    let steps = steps.max(4);
    let coords = (0..steps)
        .map(|i| {
            let angle = TAU * i as f64 / steps as f64;
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect::<Vec<_>>();
    Polygon::new(LineString::new(coords), vec![])
}

/// Axis-aligned rectangle between two corners
pub fn rectangle(min: Coord<f64>, max: Coord<f64>) -> Polygon<f64> {
    Rect::new(min, max).to_polygon()
}

/// Regular polygon with `vertices` corners on a circle of `radius`, the
/// first corner at `rotation` degrees
pub fn regular_polygon(
    center: Coord<f64>,
    radius: f64,
    vertices: u32,
    rotation: f64,
) -> Polygon<f64> {
    let n = vertices.max(3);
    let coords = (0..n)
        .map(|i| {
            let angle = rotation.to_radians() + TAU * i as f64 / n as f64;
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect::<Vec<_>>();
    Polygon::new(LineString::new(coords), vec![])
}

/// Rectangle of `width` centered on segment `a`-`b`, with flat ends at the
/// segment endpoints. `None` for a zero-length segment.
pub fn flat_segment(a: Coord<f64>, b: Coord<f64>, width: f64) -> Option<Polygon<f64>> {
    let len = distance(a, b);
    if len == 0.0 || width <= 0.0 {
        return None;
    }
    let nx = -(b.y - a.y) / len * width / 2.0;
    let ny = (b.x - a.x) / len * width / 2.0;
    let ring = vec![
        Coord { x: a.x + nx, y: a.y + ny },
        Coord { x: b.x + nx, y: b.y + ny },
        Coord { x: b.x - nx, y: b.y - ny },
        Coord { x: a.x - nx, y: a.y - ny },
    ];
    Some(Polygon::new(LineString::new(ring), vec![]))
}

/// Axis-aligned box covering segment `a`-`b` grown by half extents
pub fn segment_box(a: Coord<f64>, b: Coord<f64>, half_w: f64, half_h: f64) -> Polygon<f64> {
    rectangle(
        Coord {
            x: a.x.min(b.x) - half_w,
            y: a.y.min(b.y) - half_h,
        },
        Coord {
            x: a.x.max(b.x) + half_w,
            y: a.y.max(b.y) + half_h,
        },
    )
}

/// Round caps and joins with arcs split like a circle of `steps` vertices
fn round_style(distance: f64, steps: u32) -> BufferStyle<f64> {
    let angle = TAU / steps.max(4) as f64;
    BufferStyle::new(distance)
        .line_cap(LineCap::Round(angle))
        .line_join(LineJoin::Round(angle))
}

/// Mitre join whose limit is expressed as the sharpest corner angle that
/// still gets a full mitre
fn mitre_join() -> LineJoin<f64> {
    LineJoin::Miter(2.0 * (1.0 / MITRE_LIMIT).asin())
}

/// Round-capped, round-joined stroke of `path` with the given width
pub fn stroke(path: &LineString<f64>, width: f64, steps: u32) -> MultiPolygon<f64> {
    let radius = width / 2.0;
    if radius <= 0.0 || path.0.is_empty() {
        return empty();
    }
    let mut coords = path.0.clone();
    coords.dedup();
    if coords.len() == 1 {
        return MultiPolygon::new(vec![circle(coords[0], radius, steps)]);
    }
    LineString::new(coords).buffer_with_style(round_style(radius, steps))
}

/// Offset any bufferable geometry with the given corner style
pub fn offset<G>(geometry: &G, distance: f64, join: JoinStyle) -> MultiPolygon<f64>
where
    G: Buffer<Scalar = f64>,
{
    match join {
        JoinStyle::Round => geometry.buffer(distance),
        JoinStyle::Mitre => {
            geometry.buffer_with_style(BufferStyle::new(distance).line_join(mitre_join()))
        }
        JoinStyle::Bevel => {
            geometry.buffer_with_style(BufferStyle::new(distance).line_join(LineJoin::Bevel))
        }
    }
}

/// Round offset of an area: its union with the boundary swept by a disc
/// of radius `distance`, or its difference with that band when shrinking.
///
/// Unlike [`offset`] this never traces the outline itself, so outlines with
/// many near-coincident vertices still give one ring per boundary.
pub fn round_offset(mp: &MultiPolygon<f64>, distance: f64, steps: u32) -> MultiPolygon<f64> {
    if distance == 0.0 || mp.0.is_empty() {
        return mp.clone();
    }
    let band =
        MultiLineString::new(rings(mp)).buffer_with_style(round_style(distance.abs(), steps));
    if distance > 0.0 {
        union(mp, &band)
    } else {
        difference(mp, &band)
    }
}

/// Drop vertices within `tolerance` of the line through their neighbours,
/// and rings enclosing less than `tolerance` square units. Exteriors come
/// out counter-clockwise and holes clockwise.
pub fn clean(mp: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    let keep = |ring: &LineString<f64>| {
        ring.0.len() >= 4 && Polygon::new(ring.clone(), vec![]).unsigned_area() >= tolerance
    };
    let polygons = mp
        .iter()
        .map(|poly| poly.simplify(tolerance))
        .filter(|poly| keep(poly.exterior()))
        .map(|poly| {
            let (exterior, interiors) = poly.into_inner();
            Polygon::new(exterior, interiors.into_iter().filter(|r| keep(r)).collect())
        })
        .collect();
    MultiPolygon::new(polygons).orient(Direction::Default)
}

/// Exact union of many polygons
pub fn union_all(polygons: &[Polygon<f64>]) -> MultiPolygon<f64> {
    geo::unary_union(polygons)
}

/// Merge polygons by dilating and eroding their collection by [`MERGE_EPSILON`]
pub fn buffer_union(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    MultiPolygon::new(polygons)
        .buffer(MERGE_EPSILON)
        .buffer(-MERGE_EPSILON)
}

/// Merge a batch with the selected strategy
pub fn merge(polygons: Vec<Polygon<f64>>, strategy: MergeStrategy) -> MultiPolygon<f64> {
    match strategy {
        MergeStrategy::BufferUnion => buffer_union(polygons),
        MergeStrategy::UnaryUnion => union_all(&polygons),
    }
}

pub fn union(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if a.0.is_empty() {
        return b.clone();
    }
    if b.0.is_empty() {
        return a.clone();
    }
    a.union(b)
}

pub fn difference(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if a.0.is_empty() || b.0.is_empty() {
        return a.clone();
    }
    a.difference(b)
}

/// Douglas-Peucker simplification of every ring
pub fn simplify(mp: &MultiPolygon<f64>, tolerance: f64) -> MultiPolygon<f64> {
    mp.simplify(tolerance)
}

/// Exterior and interior rings of every polygon as closed paths
pub fn rings(mp: &MultiPolygon<f64>) -> Vec<LineString<f64>> {
    mp.iter()
        .flat_map(|poly| std::iter::once(poly.exterior()).chain(poly.interiors()))
        .filter(|ring| ring.0.len() > 1)
        .cloned()
        .collect()
}

pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Euclidean length of a path
pub fn length(path: &LineString<f64>) -> f64 {
    path.0.windows(2).map(|w| distance(w[0], w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn test_circle_area() {
        let poly = circle(c(0.0, 0.0), 1.0, 256);
        assert!((poly.unsigned_area() - std::f64::consts::PI).abs() < 0.01);
        assert!(poly.exterior().is_closed());
    }

    #[test]
    fn test_regular_polygon_first_vertex() {
        let poly = regular_polygon(c(1.0, 1.0), 2.0, 4, 0.0);
        let first = poly.exterior().0[0];
        assert!((first.x - 3.0).abs() < 1e-12);
        assert!((first.y - 1.0).abs() < 1e-12);
        assert!((poly.unsigned_area() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_segment() {
        let poly = flat_segment(c(0.0, 0.0), c(10.0, 0.0), 2.0).unwrap();
        assert!((poly.unsigned_area() - 20.0).abs() < 1e-9);
        assert!(flat_segment(c(1.0, 1.0), c(1.0, 1.0), 2.0).is_none());
    }

    #[test]
    fn test_segment_box() {
        let poly = segment_box(c(0.0, 0.0), c(10.0, 0.0), 1.0, 0.5);
        assert!((poly.unsigned_area() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_stroke_degenerate_path_is_disc() {
        let path = LineString::new(vec![c(2.0, 2.0), c(2.0, 2.0)]);
        let mp = stroke(&path, 2.0, 64);
        assert_eq!(mp.0.len(), 1);
        assert!((mp.unsigned_area() - std::f64::consts::PI).abs() < 0.01);
    }

    #[test]
    fn test_stroke_width() {
        let path = LineString::new(vec![c(0.0, 0.0), c(10.0, 0.0)]);
        let area = stroke(&path, 1.0, 64).unsigned_area();
        let expected = 10.0 + std::f64::consts::PI * 0.25;
        assert!((area - expected).abs() < 0.01);
    }

    #[test]
    fn test_merge_strategies_agree_on_overlap() {
        let polys = vec![
            rectangle(c(0.0, 0.0), c(2.0, 2.0)),
            rectangle(c(1.0, 0.0), c(3.0, 2.0)),
        ];
        let exact = merge(polys.clone(), MergeStrategy::UnaryUnion);
        let fast = merge(polys, MergeStrategy::BufferUnion);
        assert!((exact.unsigned_area() - 6.0).abs() < 1e-6);
        assert!((fast.unsigned_area() - 6.0).abs() < 1e-6);
        assert_eq!(exact.0.len(), 1);
    }

    #[test]
    fn test_union_and_difference_with_empty() {
        let square = MultiPolygon::new(vec![rectangle(c(0.0, 0.0), c(1.0, 1.0))]);
        assert_eq!(union(&empty(), &square), square);
        assert_eq!(difference(&square, &empty()), square);
        assert!(difference(&empty(), &square).0.is_empty());
    }

    #[test]
    fn test_buffer_shapes() {
        let point = Shape::from(c(0.0, 0.0)).buffered(1.0, JoinStyle::Round, 64);
        assert!(point.area() > 3.0);

        let square = Shape::from(rectangle(c(0.0, 0.0), c(4.0, 4.0)));
        let grown = square.buffered(1.0, JoinStyle::Mitre, 64);
        assert!((grown.area() - 36.0).abs() < 1e-6);
        let shrunk = square.buffered(-1.0, JoinStyle::Round, 64);
        assert!((shrunk.area() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_mitre_keeps_right_angles_and_clips_spikes() {
        let square = MultiPolygon::new(vec![rectangle(c(0.0, 0.0), c(2.0, 2.0))]);
        let grown = offset(&square, 0.5, JoinStyle::Mitre);
        let rect = grown.bounding_rect().unwrap();
        assert!((rect.min().x + 0.5).abs() < 1e-6 && (rect.min().y + 0.5).abs() < 1e-6);
        assert!((rect.max().x - 2.5).abs() < 1e-6 && (rect.max().y - 2.5).abs() < 1e-6);
        assert!((grown.unsigned_area() - 9.0).abs() < 1e-6);

        // a 5.7 degree tip would reach x = 30 unclipped
        let sliver = MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (0.0, 1.0)]),
            vec![],
        )]);
        let tip = offset(&sliver, 1.0, JoinStyle::Mitre).bounding_rect().unwrap();
        assert!(tip.max().x > 11.0);
        assert!(tip.max().x < 10.0 + MITRE_LIMIT + 2.0);
    }

    #[test]
    fn test_round_offset_of_merged_pads_is_one_ring() {
        let pads = vec![
            circle(c(0.0, 0.0), 0.75, 64),
            circle(c(10.0, 0.0), 0.75, 64),
            flat_segment(c(0.0, 0.0), c(10.0, 0.0), 0.25).unwrap(),
        ];
        let solid = clean(&buffer_union(pads), CLEAN_TOLERANCE);
        assert_eq!(solid.0.len(), 1);

        let grown = round_offset(&solid, 0.1, 64);
        assert_eq!(rings(&grown).len(), 1);
        assert!(grown.unsigned_area() > solid.unsigned_area());

        let square = MultiPolygon::new(vec![rectangle(c(0.0, 0.0), c(4.0, 4.0))]);
        let shrunk = round_offset(&square, -1.0, 64);
        assert!((shrunk.unsigned_area() - 4.0).abs() < 1e-4);
        let grown = round_offset(&square, 1.0, 64);
        assert!((grown.unsigned_area() - (32.0 + std::f64::consts::PI)).abs() < 0.02);
    }

    #[test]
    fn test_clean_drops_slivers_and_repeated_vertices() {
        let ring = LineString::from(vec![
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 0.0),
            (2.0, 0.0),
            (2.0, 2.0),
            (0.0, 2.0),
        ]);
        let speck = LineString::from(vec![(1.0, 1.0), (1.0, 1.0 + 1e-9), (1.0 + 1e-9, 1.0)]);
        let cleaned = clean(
            &MultiPolygon::new(vec![Polygon::new(ring, vec![speck])]),
            CLEAN_TOLERANCE,
        );
        assert_eq!(cleaned.0[0].exterior().0.len(), 5);
        assert!(cleaned.0[0].interiors().is_empty());
    }

    #[test]
    fn test_negative_buffer_closes_open_line() {
        let open = Shape::Line(LineString::new(vec![
            c(0.0, 0.0),
            c(4.0, 0.0),
            c(4.0, 4.0),
            c(0.0, 4.0),
        ]));
        let eroded = open.buffered(-1.0, JoinStyle::Round, 64);
        assert!((eroded.area() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_rings_and_length() {
        let square = MultiPolygon::new(vec![rectangle(c(0.0, 0.0), c(2.0, 2.0))]);
        let rings = rings(&square);
        assert_eq!(rings.len(), 1);
        assert!((length(&rings[0]) - 8.0).abs() < 1e-12);
    }
}
