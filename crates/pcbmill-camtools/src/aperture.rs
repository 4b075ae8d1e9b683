//! Aperture definitions
//!
//! The aperture type is resolved once, when `%ADD...%` is read, into an
//! [`ApertureShape`]; flashing is a single match over it.

use crate::aperture_macro::ApertureMacro;
use crate::error::{MacroError, MacroResult};
use crate::geometry::{self, Coord, MultiPolygon};
use geo::{AffineOps, BoundingRect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Aperture id reserved for region fills
pub const REGION_APERTURE: u32 = 0;

/// Geometric definition of an aperture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ApertureShape {
    Circle {
        diameter: f64,
    },
    Rectangle {
        width: f64,
        height: f64,
    },
    Obround {
        width: f64,
        height: f64,
    },
    Polygon {
        diameter: f64,
        vertices: u32,
        rotation: f64,
    },
    Macro {
        name: String,
        modifiers: Vec<f64>,
    },
    /// Synthetic aperture collecting `G36`/`G37` regions
    Region,
}

/// An aperture with its derived stroke width
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aperture {
    pub shape: ApertureShape,
    /// Stroke width proxy
    pub size: f64,
}

impl Aperture {
    pub fn circle(diameter: f64) -> Self {
        Self {
            shape: ApertureShape::Circle { diameter },
            size: diameter,
        }
    }

    pub fn rectangle(width: f64, height: f64) -> Self {
        Self {
            shape: ApertureShape::Rectangle { width, height },
            size: width.hypot(height),
        }
    }

    pub fn obround(width: f64, height: f64) -> Self {
        Self {
            shape: ApertureShape::Obround { width, height },
            size: width.hypot(height),
        }
    }

    pub fn polygon(diameter: f64, vertices: u32, rotation: f64) -> Self {
        Self {
            shape: ApertureShape::Polygon {
                diameter,
                vertices,
                rotation,
            },
            size: diameter,
        }
    }

    /// Macro instance; its size is set from the expanded geometry
    pub fn macro_instance(name: impl Into<String>, modifiers: Vec<f64>) -> Self {
        Self {
            shape: ApertureShape::Macro {
                name: name.into(),
                modifiers,
            },
            size: 0.0,
        }
    }

    pub fn region() -> Self {
        Self {
            shape: ApertureShape::Region,
            size: 0.0,
        }
    }

    /// Resolve an `%ADD` template and its `X`-separated parameters.
    ///
    /// Returns `None` for a standard template with missing parameters.
    /// Any name that is not `C`, `R`, `O` or `P` is treated as a macro
    /// reference.
    pub fn from_template(template: &str, params: &[f64]) -> Option<Self> {
        let p = |i: usize| params.get(i).copied();
        match template {
            "C" => Some(Self::circle(p(0)?)),
            "R" => Some(Self::rectangle(p(0)?, p(1)?)),
            "O" => Some(Self::obround(p(0)?, p(1)?)),
            "P" => Some(Self::polygon(
                p(0)?,
                p(1)? as u32,
                p(2).unwrap_or(0.0),
            )),
            name => Some(Self::macro_instance(name, params.to_vec())),
        }
    }

    /// Whether this is one of the standard C, R, O, P templates
    pub fn is_standard(&self) -> bool {
        !matches!(
            self.shape,
            ApertureShape::Macro { .. } | ApertureShape::Region
        )
    }

    /// Replace a zero size (and the dimension it derives from) by `epsilon`
    pub fn coerce_zero_size(&mut self, epsilon: f64) {
        if self.size != 0.0 || !self.is_standard() {
            return;
        }
        match &mut self.shape {
            ApertureShape::Circle { diameter } | ApertureShape::Polygon { diameter, .. } => {
                *diameter = epsilon
            }
            ApertureShape::Rectangle { width, height }
            | ApertureShape::Obround { width, height } => {
                *width = width.max(epsilon);
                *height = height.max(epsilon);
            }
            _ => {}
        }
        self.size = epsilon;
    }

    /// Scale linear scalars: widths by `fx`, heights by `fy`, diameters
    /// and the size by `fx`
    pub fn scale_scalars(&mut self, fx: f64, fy: f64) {
        self.size *= fx;
        match &mut self.shape {
            ApertureShape::Circle { diameter } | ApertureShape::Polygon { diameter, .. } => {
                *diameter *= fx
            }
            ApertureShape::Rectangle { width, height }
            | ApertureShape::Obround { width, height } => {
                *width *= fx;
                *height *= fy;
            }
            _ => {}
        }
    }

    /// Add `delta` to every linear scalar, clamping at zero
    pub fn grow_scalars(&mut self, delta: f64) {
        self.size = (self.size + delta).max(0.0);
        match &mut self.shape {
            ApertureShape::Circle { diameter } | ApertureShape::Polygon { diameter, .. } => {
                *diameter = (*diameter + delta).max(0.0)
            }
            ApertureShape::Rectangle { width, height }
            | ApertureShape::Obround { width, height } => {
                *width = (*width + delta).max(0.0);
                *height = (*height + delta).max(0.0);
            }
            _ => {}
        }
    }

    /// Geometry of one flash centered at `at`.
    ///
    /// Macro apertures are expanded against `macros`; regions flash nothing.
    pub fn flash(
        &self,
        at: Coord<f64>,
        macros: &BTreeMap<String, ApertureMacro>,
        steps: u32,
    ) -> MacroResult<MultiPolygon<f64>> {
        let mp = match &self.shape {
            ApertureShape::Circle { diameter } => {
                MultiPolygon::new(vec![geometry::circle(at, diameter / 2.0, steps)])
            }
            ApertureShape::Rectangle { width, height } => {
                MultiPolygon::new(vec![geometry::rectangle(
                    Coord {
                        x: at.x - width / 2.0,
                        y: at.y - height / 2.0,
                    },
                    Coord {
                        x: at.x + width / 2.0,
                        y: at.y + height / 2.0,
                    },
                )])
            }
            ApertureShape::Obround { width, height } => {
                // stadium: the two end discs joined by a rectangle
                let radius = width.min(*height) / 2.0;
                let (dx, dy) = if width > height {
                    (width / 2.0 - radius, 0.0)
                } else {
                    (0.0, height / 2.0 - radius)
                };
                let a = Coord {
                    x: at.x - dx,
                    y: at.y - dy,
                };
                let b = Coord {
                    x: at.x + dx,
                    y: at.y + dy,
                };
                let mut parts = vec![
                    geometry::circle(a, radius, steps),
                    geometry::circle(b, radius, steps),
                ];
                parts.extend(geometry::flat_segment(a, b, 2.0 * radius));
                geometry::union_all(&parts)
            }
            ApertureShape::Polygon {
                diameter,
                vertices,
                rotation,
            } => MultiPolygon::new(vec![geometry::regular_polygon(
                at,
                diameter / 2.0,
                *vertices,
                *rotation,
            )]),
            ApertureShape::Macro { name, modifiers } => {
                let template = macros
                    .get(name)
                    .ok_or_else(|| MacroError::Undefined(name.clone()))?;
                template
                    .evaluate(modifiers, steps)?
                    .affine_transform(&geometry::translation(at.x, at.y))
            }
            ApertureShape::Region => geometry::empty(),
        };
        Ok(mp)
    }

    /// Largest extent of an expanded macro, used as its stroke width
    pub fn macro_size(expanded: &MultiPolygon<f64>) -> f64 {
        expanded
            .bounding_rect()
            .map(|r| r.width().max(r.height()))
            .unwrap_or(0.0)
    }

    /// Short template letter for listings
    pub fn kind(&self) -> &str {
        match &self.shape {
            ApertureShape::Circle { .. } => "C",
            ApertureShape::Rectangle { .. } => "R",
            ApertureShape::Obround { .. } => "O",
            ApertureShape::Polygon { .. } => "P",
            ApertureShape::Macro { name, .. } => name,
            ApertureShape::Region => "REG",
        }
    }
}

impl fmt::Display for Aperture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            ApertureShape::Circle { diameter } => write!(f, "C {:.4}", diameter),
            ApertureShape::Rectangle { width, height } => {
                write!(f, "R {:.4}x{:.4}", width, height)
            }
            ApertureShape::Obround { width, height } => {
                write!(f, "O {:.4}x{:.4}", width, height)
            }
            ApertureShape::Polygon {
                diameter, vertices, ..
            } => write!(f, "P {:.4} ({} vertices)", diameter, vertices),
            ApertureShape::Macro { name, modifiers } => {
                write!(f, "AM {} {:?}", name, modifiers)
            }
            ApertureShape::Region => write!(f, "region"),
        }
    }
}
