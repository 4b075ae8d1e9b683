//! Geometry object model
//!
//! The representation shared by the Gerber and Excellon importers: a tool
//! table mapping aperture/tool ids to their geometry fragments, plus the
//! merged solid geometry and the follow (centerline) geometry.
//!
//! Every transform applies uniformly to the solid aggregate, the follow
//! aggregate and the `solid`, `follow` and `clear` entry of every fragment.
//! Fragments are replaced, never edited in place.

use crate::aperture::Aperture;
use crate::aperture_macro::ApertureMacro;
use crate::geometry::{
    self, mirroring, rotation, scaling, skewing, translation, Coord, JoinStyle, LineString,
    MirrorAxis, MultiPolygon, Rect, Shape,
};
use geo::{AffineOps, AffineTransform, BoundingRect};
use pcbmill_core::Units;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// One draw event's geometry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    /// Filled shape under dark polarity
    pub solid: Option<Shape>,
    /// Centerline or flash point
    pub follow: Option<Shape>,
    /// Filled shape under clear polarity
    pub clear: Option<Shape>,
}

impl Fragment {
    fn map(&self, f: &impl Fn(&Shape) -> Shape) -> Fragment {
        Fragment {
            solid: self.solid.as_ref().map(f),
            follow: self.follow.as_ref().map(f),
            clear: self.clear.as_ref().map(f),
        }
    }

    /// Copy of this fragment with every entry transformed
    pub fn transformed(&self, transform: &AffineTransform<f64>) -> Fragment {
        self.map(&|shape: &Shape| shape.transformed(transform))
    }

    fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.solid
            .iter()
            .chain(self.follow.iter())
            .chain(self.clear.iter())
    }
}

/// Tool table entry: the aperture and everything drawn with it
#[derive(Debug, Clone, PartialEq)]
pub struct ToolEntry {
    pub aperture: Aperture,
    pub fragments: Vec<Fragment>,
}

impl ToolEntry {
    pub fn new(aperture: Aperture) -> Self {
        Self {
            aperture,
            fragments: Vec::new(),
        }
    }
}

/// Listing row for a tool table entry
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub id: u32,
    pub kind: String,
    pub size: f64,
    pub fragments: usize,
}

/// Imported geometry with its tool table
#[derive(Debug, Clone)]
pub struct GeometryObject {
    pub units: Units,
    pub tools: BTreeMap<u32, ToolEntry>,
    pub macros: BTreeMap<String, ApertureMacro>,
    pub solid_geometry: MultiPolygon<f64>,
    pub follow_geometry: Vec<Shape>,
    /// Circle resolution used when buffering
    pub steps_per_circle: u32,
}

impl GeometryObject {
    pub fn new(units: Units, steps_per_circle: u32) -> Self {
        Self {
            units,
            tools: BTreeMap::new(),
            macros: BTreeMap::new(),
            solid_geometry: geometry::empty(),
            follow_geometry: Vec::new(),
            steps_per_circle,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.solid_geometry.0.is_empty() && self.follow_geometry.is_empty()
    }

    /// Bounding box of solid and follow geometry
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.solid_geometry
            .bounding_rect()
            .into_iter()
            .chain(self.follow_geometry.iter().filter_map(Shape::bounding_rect))
            .reduce(|a, b| {
                Rect::new(
                    Coord {
                        x: a.min().x.min(b.min().x),
                        y: a.min().y.min(b.min().y),
                    },
                    Coord {
                        x: a.max().x.max(b.max().x),
                        y: a.max().y.max(b.max().y),
                    },
                )
            })
    }

    pub fn fragment_count(&self) -> usize {
        self.tools.values().map(|t| t.fragments.len()).sum()
    }

    pub fn tool_summary(&self) -> Vec<ToolSummary> {
        self.tools
            .iter()
            .map(|(id, entry)| ToolSummary {
                id: *id,
                kind: entry.aperture.kind().to_string(),
                size: entry.aperture.size,
                fragments: entry.fragments.len(),
            })
            .collect()
    }

    /// Flash and drill locations drawn with `tool`
    pub fn drill_locations(&self, tool: u32) -> Vec<Coord<f64>> {
        self.follow_shapes(tool)
            .filter_map(|shape| match shape {
                Shape::Point(p) => Some(p.0),
                _ => None,
            })
            .collect()
    }

    /// Open paths (traces, routed slots) drawn with `tool`
    pub fn tool_paths(&self, tool: u32) -> Vec<LineString<f64>> {
        self.follow_shapes(tool)
            .filter_map(|shape| match shape {
                Shape::Line(ls) => Some(ls.clone()),
                _ => None,
            })
            .collect()
    }

    fn follow_shapes(&self, tool: u32) -> impl Iterator<Item = &Shape> {
        self.tools
            .get(&tool)
            .into_iter()
            .flat_map(|entry| entry.fragments.iter())
            .filter_map(|fragment| fragment.follow.as_ref())
    }

    fn apply_affine(&mut self, transform: &AffineTransform<f64>) {
        self.solid_geometry = self.solid_geometry.affine_transform(transform);
        self.apply_shapes(&|shape: &Shape| shape.transformed(transform));
    }

    fn apply_shapes(&mut self, f: &impl Fn(&Shape) -> Shape) {
        self.follow_geometry = self.follow_geometry.iter().map(f).collect();
        for entry in self.tools.values_mut() {
            entry.fragments = entry.fragments.iter().map(|fr| fr.map(f)).collect();
        }
    }

    /// Scale by `fx`, `fy` about `origin`; aperture scalars follow
    pub fn scale(&mut self, fx: f64, fy: f64, origin: Coord<f64>) {
        debug!("scale by ({}, {}) about ({}, {})", fx, fy, origin.x, origin.y);
        self.apply_affine(&scaling(fx, fy, origin));
        for entry in self.tools.values_mut() {
            entry.aperture.scale_scalars(fx, fy);
        }
    }

    pub fn offset(&mut self, dx: f64, dy: f64) {
        self.apply_affine(&translation(dx, dy));
    }

    pub fn mirror(&mut self, axis: MirrorAxis, point: Coord<f64>) {
        self.apply_affine(&mirroring(axis, point));
    }

    /// Rotate counter-clockwise by `angle` degrees about `origin`
    pub fn rotate(&mut self, angle: f64, origin: Coord<f64>) {
        self.apply_affine(&rotation(angle, origin));
    }

    /// Shear by `ax`, `ay` degrees about `origin`
    pub fn skew(&mut self, ax: f64, ay: f64, origin: Coord<f64>) {
        self.apply_affine(&skewing(ax, ay, origin));
    }

    /// Offset all geometry by `distance`. Aperture scalars grow by twice
    /// the distance.
    pub fn buffer(&mut self, distance: f64, join: JoinStyle) {
        let steps = self.steps_per_circle;
        self.solid_geometry = geometry::offset(&self.solid_geometry, distance, join);
        self.apply_shapes(&|shape: &Shape| shape.buffered(distance, join, steps));
        for entry in self.tools.values_mut() {
            entry.aperture.grow_scalars(2.0 * distance);
        }
    }

    /// Scale every piece about its own center by `factor`, growing or
    /// shrinking pads in place; aperture scalars follow
    pub fn buffer_by_factor(&mut self, factor: f64) {
        let about_self = |shape: &Shape| match shape.bounding_rect() {
            Some(rect) => shape.transformed(&scaling(factor, factor, rect.center())),
            None => shape.clone(),
        };
        let pieces: Vec<_> = self
            .solid_geometry
            .iter()
            .cloned()
            .map(|poly| about_self(&Shape::from(poly)))
            .flat_map(|shape| shape.polygons().to_vec())
            .collect();
        self.solid_geometry = geometry::union_all(&pieces);
        self.apply_shapes(&about_self);
        for entry in self.tools.values_mut() {
            entry.aperture.scale_scalars(factor, factor);
        }
    }

    /// Convert all geometry and aperture scalars to `target` units
    pub fn convert_units(&mut self, target: Units) {
        if target == self.units {
            return;
        }
        let factor = self.units.factor_to(target);
        self.scale(factor, factor, Coord { x: 0.0, y: 0.0 });
        self.units = target;
    }

    /// Closed isolation toolpaths around the solid geometry.
    ///
    /// Pass `i` follows the outline offset by `d/2 + i*d*(1-overlap)`.
    pub fn isolation_paths(
        &self,
        tool_diameter: f64,
        passes: u32,
        overlap: f64,
    ) -> Vec<LineString<f64>> {
        let step = tool_diameter * (1.0 - overlap);
        let solid = geometry::clean(&self.solid_geometry, geometry::CLEAN_TOLERANCE);
        (0..passes.max(1))
            .flat_map(|i| {
                let distance = tool_diameter / 2.0 + i as f64 * step;
                let outline = geometry::round_offset(&solid, distance, self.steps_per_circle);
                geometry::rings(&geometry::clean(&outline, geometry::CLEAN_TOLERANCE))
            })
            .collect()
    }

    /// Every fragment shape of every tool
    pub fn fragment_shapes(&self) -> impl Iterator<Item = &Shape> {
        self.tools
            .values()
            .flat_map(|entry| entry.fragments.iter())
            .flat_map(Fragment::shapes)
    }
}
