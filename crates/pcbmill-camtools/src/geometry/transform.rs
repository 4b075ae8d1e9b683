//! Affine transforms for [`Shape`]

use super::Shape;
use geo::{AffineOps, AffineTransform, Coord};
use serde::{Deserialize, Serialize};

/// Mirror axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirrorAxis {
    /// Flip across the horizontal line through the mirror point
    X,
    /// Flip across the vertical line through the mirror point
    Y,
}

pub fn scaling(fx: f64, fy: f64, origin: Coord<f64>) -> AffineTransform<f64> {
    AffineTransform::scale(fx, fy, origin)
}

pub fn translation(dx: f64, dy: f64) -> AffineTransform<f64> {
    AffineTransform::translate(dx, dy)
}

/// Counter-clockwise rotation in degrees
pub fn rotation(angle: f64, origin: Coord<f64>) -> AffineTransform<f64> {
    AffineTransform::rotate(angle, origin)
}

/// Shear by `ax` degrees along X and `ay` degrees along Y
pub fn skewing(ax: f64, ay: f64, origin: Coord<f64>) -> AffineTransform<f64> {
    AffineTransform::skew(ax, ay, origin)
}

pub fn mirroring(axis: MirrorAxis, point: Coord<f64>) -> AffineTransform<f64> {
    match axis {
        MirrorAxis::X => AffineTransform::scale(1.0, -1.0, point),
        MirrorAxis::Y => AffineTransform::scale(-1.0, 1.0, point),
    }
}

impl Shape {
    /// A copy of this shape with `transform` applied
    pub fn transformed(&self, transform: &AffineTransform<f64>) -> Shape {
        match self {
            Shape::Point(p) => Shape::Point(p.affine_transform(transform)),
            Shape::Line(ls) => Shape::Line(ls.affine_transform(transform)),
            Shape::Area(mp) => Shape::Area(mp.affine_transform(transform)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    fn at(shape: &Shape) -> (f64, f64) {
        match shape {
            Shape::Point(p) => (p.x(), p.y()),
            _ => panic!("not a point"),
        }
    }

    #[test]
    fn test_rotation_is_counter_clockwise() {
        let p = Shape::Point(Point::new(1.0, 0.0));
        let (x, y) = at(&p.transformed(&rotation(90.0, Coord { x: 0.0, y: 0.0 })));
        assert!(x.abs() < 1e-12);
        assert!((y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mirror() {
        let p = Shape::Point(Point::new(3.0, 2.0));
        let origin = Coord { x: 1.0, y: 1.0 };
        assert_eq!(at(&p.transformed(&mirroring(MirrorAxis::X, origin))), (3.0, 0.0));
        assert_eq!(at(&p.transformed(&mirroring(MirrorAxis::Y, origin))), (-1.0, 2.0));
    }

    #[test]
    fn test_scale_about_origin() {
        let p = Shape::Point(Point::new(2.0, 2.0));
        let (x, y) = at(&p.transformed(&scaling(2.0, 3.0, Coord { x: 1.0, y: 1.0 })));
        assert!((x - 3.0).abs() < 1e-12);
        assert!((y - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_skew_shifts_x_by_y() {
        let p = Shape::Point(Point::new(0.0, 1.0));
        let (x, y) = at(&p.transformed(&skewing(45.0, 0.0, Coord { x: 0.0, y: 0.0 })));
        assert!((x - 1.0).abs() < 1e-9);
        assert!((y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_translation() {
        let p = Shape::Point(Point::new(0.5, 0.5));
        assert_eq!(at(&p.transformed(&translation(1.0, -1.0))), (1.5, -0.5));
    }
}
