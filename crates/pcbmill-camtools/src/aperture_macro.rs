//! Aperture macro evaluation
//!
//! A macro is captured from `%AM...%` as raw text and only expanded when an
//! aperture instantiates it with concrete modifiers. Expansion binds the
//! modifiers to `$1..$n`, runs the `$name=expr` assignments in order, and
//! composes the primitives into one area in declaration order: exposure 1
//! adds, exposure 0 removes.

use crate::error::{MacroError, MacroResult};
use crate::geometry::{self, rotation, Coord, LineString, MultiPolygon, Polygon};
use geo::AffineOps;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A named, immutable macro template
#[derive(Debug, Clone, PartialEq)]
pub struct ApertureMacro {
    name: String,
    body: String,
}

impl ApertureMacro {
    /// Create a macro from its name and the text following `%AM<name>*`
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }

    /// Build from a captured `%AM...%` block (possibly spanning lines)
    pub fn from_definition(text: &str) -> Option<Self> {
        let text = text.trim().trim_start_matches('%');
        let rest = text.strip_prefix("AM")?;
        let (name, body) = rest.split_once('*')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self::new(name, body.trim_end().trim_end_matches('%')))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw, unevaluated template text
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Expand the macro with the given modifiers.
    ///
    /// Primitive geometry is produced in macro coordinates (relative to the
    /// flash point). An empty result is logged, not treated as an error.
    pub fn evaluate(&self, modifiers: &[f64], steps: u32) -> MacroResult<MultiPolygon<f64>> {
        let mut vars: HashMap<String, f64> = modifiers
            .iter()
            .enumerate()
            .map(|(i, v)| ((i + 1).to_string(), *v))
            .collect();

        let mut acc = geometry::empty();
        for statement in self.statements() {
            if statement.starts_with('0') {
                continue;
            }

            if let Some(assignment) = statement.strip_prefix('$') {
                if let Some((name, expr)) = assignment.split_once('=') {
                    let value = eval_expr(expr, &vars)?;
                    vars.insert(name.to_string(), value);
                    continue;
                }
            }

            let mut fields = statement.split(',');
            let code = fields.next().unwrap_or_default().to_string();
            let mods = fields
                .map(|f| eval_expr(f, &vars))
                .collect::<MacroResult<Vec<f64>>>()?;

            let (exposure, shape) = primitive(&code, &mods, steps)?;
            if exposure {
                acc = geometry::union(&acc, &shape);
            } else {
                acc = geometry::difference(&acc, &shape);
            }
        }

        if acc.0.is_empty() {
            warn!("aperture macro {} evaluated to empty geometry", self.name);
        }
        Ok(acc)
    }

    /// Statements of the body: split on `*`, whitespace removed
    fn statements(&self) -> Vec<String> {
        self.body
            .split('*')
            .map(|s| s.chars().filter(|c| !c.is_whitespace()).collect::<String>())
            .map(|s| s.trim_matches('%').to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Evaluate one primitive into (exposure, geometry).
fn primitive(code: &str, m: &[f64], steps: u32) -> MacroResult<(bool, MultiPolygon<f64>)> {
    let origin = Coord { x: 0.0, y: 0.0 };
    let code_num: u32 = code
        .parse()
        .map_err(|_| MacroError::UnknownPrimitive(code.to_string()))?;

    let require = |n: usize| {
        if m.len() < n {
            Err(MacroError::MissingModifiers {
                code: code_num,
                expected: n,
                found: m.len(),
            })
        } else {
            Ok(())
        }
    };
    let rotated = |poly: Polygon<f64>, angle: f64| -> MultiPolygon<f64> {
        let mp = MultiPolygon::new(vec![poly]);
        if angle == 0.0 {
            mp
        } else {
            mp.affine_transform(&rotation(angle, origin))
        }
    };
    let exposure = |v: f64| v >= 0.5;

    match code_num {
        // Circle: exposure, diameter, x, y[, rotation]
        1 => {
            require(4)?;
            let poly = geometry::circle(Coord { x: m[2], y: m[3] }, m[1] / 2.0, steps);
            Ok((exposure(m[0]), rotated(poly, m.get(4).copied().unwrap_or(0.0))))
        }
        // Vector line: exposure, width, xs, ys, xe, ye, rotation
        2 | 20 => {
            require(7)?;
            let shape = geometry::flat_segment(
                Coord { x: m[2], y: m[3] },
                Coord { x: m[4], y: m[5] },
                m[1],
            )
            .map(|p| rotated(p, m[6]))
            .unwrap_or_else(geometry::empty);
            Ok((exposure(m[0]), shape))
        }
        // Center line: exposure, width, height, xc, yc, rotation
        21 => {
            require(6)?;
            let (w, h) = (m[1] / 2.0, m[2] / 2.0);
            let poly = geometry::rectangle(
                Coord { x: m[3] - w, y: m[4] - h },
                Coord { x: m[3] + w, y: m[4] + h },
            );
            Ok((exposure(m[0]), rotated(poly, m[5])))
        }
        // Lower-left line: exposure, width, height, xll, yll, rotation
        22 => {
            require(6)?;
            let poly = geometry::rectangle(
                Coord { x: m[3], y: m[4] },
                Coord {
                    x: m[3] + m[1],
                    y: m[4] + m[2],
                },
            );
            Ok((exposure(m[0]), rotated(poly, m[5])))
        }
        // Outline: exposure, n, x0, y0, ..., xn, yn, rotation
        4 => {
            require(2)?;
            let declared = m[1].max(0.0) as usize;
            let coords = &m[2..];
            let full = 2 * (declared + 1);
            let (pairs, angle) = if coords.len() > full {
                (&coords[..full], coords[full])
            } else {
                debug!(
                    "outline primitive declares {} points but has {} values",
                    declared + 1,
                    coords.len()
                );
                (&coords[..coords.len() - coords.len() % 2], 0.0)
            };
            let mut points: Vec<Coord<f64>> = pairs
                .chunks_exact(2)
                .map(|p| Coord { x: p[0], y: p[1] })
                .collect();
            if points.len() < 3 {
                return Ok((exposure(m[0]), geometry::empty()));
            }
            if points.first() != points.last() {
                points.push(points[0]);
            }
            let poly = Polygon::new(LineString::new(points), vec![]);
            Ok((exposure(m[0]), rotated(poly, angle)))
        }
        // Polygon: exposure, vertices, x, y, diameter, rotation
        5 => {
            require(6)?;
            let poly = geometry::regular_polygon(
                Coord { x: m[2], y: m[3] },
                m[4] / 2.0,
                m[1].max(3.0) as u32,
                0.0,
            );
            Ok((exposure(m[0]), rotated(poly, m[5])))
        }
        // Moire: x, y, outer dia, ring thickness, gap, max rings,
        // cross thickness, cross length, rotation
        6 => {
            require(9)?;
            let center = Coord { x: m[0], y: m[1] };
            let (thickness, gap) = (m[3], m[4]);
            let mut acc = geometry::empty();
            let mut r = m[2] / 2.0;
            for _ in 0..(m[5].max(0.0) as usize) {
                if r <= 0.0 {
                    break;
                }
                let inner = r - thickness;
                let outer = MultiPolygon::new(vec![geometry::circle(center, r, steps)]);
                let ring = if inner > 0.0 {
                    geometry::difference(
                        &outer,
                        &MultiPolygon::new(vec![geometry::circle(center, inner, steps)]),
                    )
                } else {
                    outer
                };
                acc = geometry::union(&acc, &ring);
                r -= thickness + gap;
            }
            let (half_t, half_l) = (m[6] / 2.0, m[7] / 2.0);
            if half_t > 0.0 && half_l > 0.0 {
                let cross = MultiPolygon::new(vec![
                    geometry::rectangle(
                        Coord { x: center.x - half_l, y: center.y - half_t },
                        Coord { x: center.x + half_l, y: center.y + half_t },
                    ),
                    geometry::rectangle(
                        Coord { x: center.x - half_t, y: center.y - half_l },
                        Coord { x: center.x + half_t, y: center.y + half_l },
                    ),
                ]);
                acc = geometry::union(&acc, &geometry::union_all(&cross.0));
            }
            Ok((true, acc.affine_transform(&rotation(m[8], origin))))
        }
        // Thermal: x, y, outer dia, inner dia, gap, rotation
        7 => {
            require(6)?;
            let center = Coord { x: m[0], y: m[1] };
            let (outer, inner, gap) = (m[2] / 2.0, m[3] / 2.0, m[4] / 2.0);
            let ring = geometry::difference(
                &MultiPolygon::new(vec![geometry::circle(center, outer, steps)]),
                &MultiPolygon::new(vec![geometry::circle(center, inner, steps)]),
            );
            let reach = outer + gap;
            let cross = geometry::union_all(&[
                geometry::rectangle(
                    Coord { x: center.x - reach, y: center.y - gap },
                    Coord { x: center.x + reach, y: center.y + gap },
                ),
                geometry::rectangle(
                    Coord { x: center.x - gap, y: center.y - reach },
                    Coord { x: center.x + gap, y: center.y + reach },
                ),
            ]);
            let thermal = geometry::difference(&ring, &cross);
            Ok((true, thermal.affine_transform(&rotation(m[5], origin))))
        }
        _ => Err(MacroError::UnknownPrimitive(code.to_string())),
    }
}

/// Evaluate an arithmetic modifier expression.
///
/// Supports `+ - x X / ( )`, unary signs and `$n` references; references to
/// unbound variables evaluate to zero.
pub fn eval_expr(expr: &str, vars: &HashMap<String, f64>) -> MacroResult<f64> {
    let mut parser = ExprParser {
        src: expr.as_bytes(),
        pos: 0,
        vars,
        text: expr,
    };
    if expr.trim().is_empty() {
        return Ok(0.0);
    }
    let value = parser.sum()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

struct ExprParser<'a> {
    src: &'a [u8],
    pos: usize,
    vars: &'a HashMap<String, f64>,
    text: &'a str,
}

impl ExprParser<'_> {
    fn error(&self, reason: &str) -> MacroError {
        MacroError::Expression {
            expr: self.text.to_string(),
            reason: format!("{} at offset {}", reason, self.pos),
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn sum(&mut self) -> MacroResult<f64> {
        let mut value = self.product()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.product()?;
            if op == b'+' {
                value += rhs;
            } else {
                value -= rhs;
            }
        }
        Ok(value)
    }

    fn product(&mut self) -> MacroResult<f64> {
        let mut value = self.unary()?;
        while let Some(op @ (b'x' | b'X' | b'*' | b'/')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            if op == b'/' {
                value = if rhs == 0.0 { 0.0 } else { value / rhs };
            } else {
                value *= rhs;
            }
        }
        Ok(value)
    }

    fn unary(&mut self) -> MacroResult<f64> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(b'+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> MacroResult<f64> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.sum()?;
                if self.peek() != Some(b')') {
                    return Err(self.error("missing ')'"));
                }
                self.pos += 1;
                Ok(value)
            }
            Some(b'$') => {
                self.pos += 1;
                let start = self.pos;
                while self.pos < self.src.len() && self.src[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
                let name = &self.text[start..self.pos];
                if name.is_empty() {
                    return Err(self.error("empty variable name"));
                }
                Ok(self.vars.get(name).copied().unwrap_or(0.0))
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => {
                let start = self.pos;
                while self.pos < self.src.len()
                    && (self.src[self.pos].is_ascii_digit() || self.src[self.pos] == b'.')
                {
                    self.pos += 1;
                }
                self.text[start..self.pos]
                    .parse::<f64>()
                    .map_err(|_| self.error("bad number"))
            }
            _ => Err(self.error("expected a value")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, BoundingRect};
    use std::f64::consts::PI;

    fn vars(values: &[(&str, f64)]) -> HashMap<String, f64> {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_expr_precedence_and_multiply() {
        let v = vars(&[("1", 2.0), ("2", 3.0)]);
        assert_eq!(eval_expr("$1x$2+1", &v).unwrap(), 7.0);
        assert_eq!(eval_expr("$1X($2+1)", &v).unwrap(), 8.0);
        assert_eq!(eval_expr("-$1/4", &v).unwrap(), -0.5);
        assert_eq!(eval_expr("1-2-3", &v).unwrap(), -4.0);
    }

    #[test]
    fn test_expr_unbound_is_zero() {
        let v = vars(&[("1", 2.0)]);
        assert_eq!(eval_expr("$9+$1", &v).unwrap(), 2.0);
    }

    #[test]
    fn test_expr_multi_digit_variable() {
        let v = vars(&[("1", 1.0), ("10", 5.0)]);
        assert_eq!(eval_expr("$10", &v).unwrap(), 5.0);
    }

    #[test]
    fn test_expr_error() {
        let v = vars(&[]);
        assert!(eval_expr("1+", &v).is_err());
        assert!(eval_expr("(1", &v).is_err());
    }

    #[test]
    fn test_from_definition() {
        let m = ApertureMacro::from_definition("%AMDONUT*\n1,1,$1,0,0*\n1,0,$2,0,0*%").unwrap();
        assert_eq!(m.name(), "DONUT");
        assert!(m.body().contains("1,0,$2,0,0"));
    }

    #[test]
    fn test_exposure_composition_makes_annulus() {
        let m = ApertureMacro::new("RING", "1,1,10,0,0*1,0,4,0,0*");
        let mp = m.evaluate(&[], 256).unwrap();
        let expected = PI * (25.0 - 4.0);
        assert!((mp.unsigned_area() - expected).abs() < 0.2);
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.0[0].interiors().len(), 1);
    }

    #[test]
    fn test_assignment_and_modifiers() {
        let m = ApertureMacro::new("RECT", "$3=$1x2*21,1,$3,$2,0,0,0*");
        let mp = m.evaluate(&[1.0, 0.5], 64).unwrap();
        let rect = mp.bounding_rect().unwrap();
        assert!((rect.width() - 2.0).abs() < 1e-9);
        assert!((rect.height() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_comment_is_ignored() {
        let m = ApertureMacro::new("C", "0 a comment*1,1,2,0,0*");
        let mp = m.evaluate(&[], 64).unwrap();
        assert!(mp.unsigned_area() > 3.0);
    }

    #[test]
    fn test_short_outline_is_closed() {
        // Declares 4 points but only lists three vertices.
        let m = ApertureMacro::new("TRI", "4,1,4,0,0,1,0,0,1*");
        let mp = m.evaluate(&[], 64).unwrap();
        assert!((mp.unsigned_area() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_outline_rotation() {
        let m = ApertureMacro::new("SQ", "4,1,4,0,0,2,0,2,1,0,1,0,0,90*");
        let rect = m.evaluate(&[], 64).unwrap().bounding_rect().unwrap();
        assert!((rect.width() - 1.0).abs() < 1e-9);
        assert!((rect.height() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_vector_line_has_flat_caps() {
        let m = ApertureMacro::new("L", "20,1,0.5,0,0,4,0,0*");
        let mp = m.evaluate(&[], 64).unwrap();
        assert!((mp.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_lower_left_line() {
        let m = ApertureMacro::new("LL", "22,1,2,1,1,1,0*");
        let rect = m.evaluate(&[], 64).unwrap().bounding_rect().unwrap();
        assert_eq!(rect.min(), Coord { x: 1.0, y: 1.0 });
        assert_eq!(rect.max(), Coord { x: 3.0, y: 2.0 });
    }

    #[test]
    fn test_regular_polygon_primitive() {
        let m = ApertureMacro::new("HEX", "5,1,6,0,0,2,0*");
        let mp = m.evaluate(&[], 64).unwrap();
        let expected = 3.0 * 3f64.sqrt() / 2.0;
        assert!((mp.unsigned_area() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_thermal_has_gaps() {
        let m = ApertureMacro::new("TH", "7,0,0,2,1,0.2,0*");
        let mp = m.evaluate(&[], 256).unwrap();
        let ring = PI * (1.0 - 0.25);
        assert_eq!(mp.0.len(), 4);
        assert!(mp.unsigned_area() < ring);
    }

    #[test]
    fn test_moire_rings_and_cross() {
        let m = ApertureMacro::new("MO", "6,0,0,4,0.2,0.3,3,0.1,5,0*");
        let mp = m.evaluate(&[], 128).unwrap();
        let rect = mp.bounding_rect().unwrap();
        assert!((rect.width() - 5.0).abs() < 1e-9);
        assert!(mp.unsigned_area() > 0.0);
    }

    #[test]
    fn test_unknown_primitive_is_error() {
        let m = ApertureMacro::new("BAD", "9,1,2,3*");
        assert_eq!(
            m.evaluate(&[], 64).unwrap_err(),
            MacroError::UnknownPrimitive("9".to_string())
        );
    }

    #[test]
    fn test_missing_modifiers_is_error() {
        let m = ApertureMacro::new("BAD", "21,1,2*");
        assert!(matches!(
            m.evaluate(&[], 64),
            Err(MacroError::MissingModifiers { code: 21, .. })
        ));
    }

    #[test]
    fn test_cancelling_macro_is_empty() {
        let m = ApertureMacro::new("NONE", "1,1,2,0,0*1,0,4,0,0*");
        assert!(m.evaluate(&[], 64).unwrap().0.is_empty());
    }
}
