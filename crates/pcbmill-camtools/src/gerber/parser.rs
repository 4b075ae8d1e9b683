//! Gerber parser state machine
//!
//! [`GerberParser`] consumes classified statements one at a time. Drawn
//! polygons collect in a buffer that is merged into the solid geometry
//! only when the polarity changes, a step-and-repeat block closes or the
//! input ends.

use super::arc;
use super::state::{CurrentAperture, Operation, ParserState, Polarity};
use super::statement::{classify, Draw, Statement};
use super::{Defect, GerberOptions, ParseStatus, SourceLine};
use crate::aperture::{Aperture, ApertureShape, REGION_APERTURE};
use crate::aperture_macro::ApertureMacro;
use crate::error::{GerberError, GerberResult};
use crate::geometry::{self, translation, Coord, LineString, MultiPolygon, Point, Polygon, Shape};
use crate::model::{Fragment, GeometryObject, ToolEntry};
use geo::AffineOps;
use pcbmill_core::{CancellationToken, Units};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace, warn};

/// An open `%SR` block
#[derive(Debug, Clone)]
struct StepRepeat {
    x: u32,
    y: u32,
    i: f64,
    j: f64,
    follow_mark: usize,
    fragment_marks: BTreeMap<u32, usize>,
}

impl StepRepeat {
    /// Offsets of every copy except the original
    fn offsets(&self) -> Vec<(f64, f64)> {
        (0..self.x)
            .flat_map(|ix| (0..self.y).map(move |iy| (ix, iy)))
            .filter(|&cell| cell != (0, 0))
            .map(|(ix, iy)| (ix as f64 * self.i, iy as f64 * self.j))
            .collect()
    }
}

/// Streaming Gerber parser
pub struct GerberParser {
    options: GerberOptions,
    cancel: CancellationToken,
    /// Modal state, public so transitions can be inspected
    pub state: ParserState,
    object: GeometryObject,
    poly_buffer: Vec<Polygon<f64>>,
    region_contours: Vec<Vec<Coord<f64>>>,
    /// Expanded macro geometry per aperture id, centered on the origin
    macro_cache: HashMap<u32, MultiPolygon<f64>>,
    step_repeat: Option<StepRepeat>,
    defects: Vec<Defect>,
    line: SourceLine,
}

impl GerberParser {
    pub fn new(options: GerberOptions, cancel: CancellationToken) -> Self {
        let mut state = ParserState::default();
        state.set_units(state.units, options.simplification);
        let object = GeometryObject::new(state.units, options.steps_per_circle);
        Self {
            options,
            cancel,
            state,
            object,
            poly_buffer: Vec::new(),
            region_contours: Vec::new(),
            macro_cache: HashMap::new(),
            step_repeat: None,
            defects: Vec::new(),
            line: SourceLine {
                number: 0,
                text: String::new(),
            },
        }
    }

    /// Geometry produced so far; solid geometry lags until the next flush
    pub fn geometry(&self) -> &GeometryObject {
        &self.object
    }

    pub fn defects(&self) -> &[Defect] {
        &self.defects
    }

    /// Number of polygons waiting for the next merge
    pub fn pending(&self) -> usize {
        self.poly_buffer.len()
    }

    /// Classify and apply one statement
    pub fn feed(&mut self, line: &SourceLine) -> GerberResult<()> {
        self.line = line.clone();
        let statement = classify(&line.text);
        trace!("line {}: {:?}", line.number, statement);
        self.apply(statement)
    }

    /// Apply one classified statement
    pub fn apply(&mut self, statement: Statement) -> GerberResult<()> {
        match statement {
            Statement::Comment | Statement::Absolute => {}
            Statement::FormatSpec {
                format,
                incremental,
                units,
            } => {
                if incremental {
                    warn!(
                        "line {}: incremental coordinates are not supported",
                        self.line.number
                    );
                }
                debug!("coordinate format {:?}", format);
                self.state.format = format;
                if let Some(units) = units {
                    self.set_units(units);
                }
            }
            Statement::Units(units) => self.set_units(units),
            Statement::MacroDefinition(text) => match ApertureMacro::from_definition(&text) {
                Some(definition) => {
                    debug!("aperture macro {}", definition.name());
                    self.object
                        .macros
                        .insert(definition.name().to_string(), definition);
                }
                None => warn!("line {}: malformed aperture macro", self.line.number),
            },
            Statement::ApertureDefinition {
                id,
                template,
                params,
            } => self.define_aperture(id, &template, params)?,
            Statement::Polarity(polarity) => {
                self.flush_path();
                self.flush_buffer()?;
                self.state.polarity = polarity;
            }
            Statement::StepRepeat { x, y, i, j } => {
                self.flush_path();
                self.close_step_repeat()?;
                self.flush_buffer()?;
                self.step_repeat = Some(StepRepeat {
                    x: x.max(1),
                    y: y.max(1),
                    i,
                    j,
                    follow_mark: self.object.follow_geometry.len(),
                    fragment_marks: self
                        .object
                        .tools
                        .iter()
                        .map(|(id, entry)| (*id, entry.fragments.len()))
                        .collect(),
                });
            }
            Statement::StepRepeatEnd => {
                self.flush_path();
                self.close_step_repeat()?;
            }
            Statement::SelectAperture(id) => self.select(id),
            Statement::Operation(op) => {
                self.state.operation = op;
                if op == Operation::Flash {
                    if self.state.making_region {
                        warn!("line {}: flash inside a region ignored", self.line.number);
                        self.state.operation = Operation::Move;
                    } else {
                        self.flush_path();
                        self.flash(self.state.current)?;
                    }
                }
            }
            Statement::Interpolation(mode) => self.state.interpolation = mode,
            Statement::Quadrant(mode) => self.state.quadrant = Some(mode),
            Statement::RegionStart => {
                self.flush_path();
                self.state.making_region = true;
                self.state.path.clear();
                self.region_contours.clear();
            }
            Statement::RegionEnd => {
                if self.state.making_region {
                    self.close_region();
                } else {
                    warn!("line {}: G37 without G36", self.line.number);
                }
            }
            Statement::Draw(draw) => self.draw(draw)?,
            Statement::Incremental => warn!(
                "line {}: incremental notation is not supported",
                self.line.number
            ),
            Statement::Auxiliary(text) => debug!("line {}: ignoring {}", self.line.number, text),
            Statement::EndOfFile => debug!("line {}: end of file", self.line.number),
            Statement::Unknown => warn!(
                "line {}: unrecognized statement '{}'",
                self.line.number, self.line.text
            ),
        }
        Ok(())
    }

    /// Flush everything and return the geometry with its status
    pub fn finish(mut self) -> GerberResult<(GeometryObject, ParseStatus)> {
        if self.state.making_region {
            warn!("region left open at end of file");
            self.close_region();
        }
        self.flush_path();
        self.close_step_repeat()?;
        self.flush_buffer()?;

        if self.object.solid_geometry.0.is_empty() && self.object.follow_geometry.is_empty() {
            return Err(GerberError::Empty);
        }
        if let Some(tolerance) = self.state.tolerance {
            self.object.solid_geometry = geometry::simplify(&self.object.solid_geometry, tolerance);
        }
        let status = if self.defects.is_empty() {
            ParseStatus::Success
        } else {
            ParseStatus::Defective(self.defects)
        };
        Ok((self.object, status))
    }

    fn fail(&self, reason: impl Into<String>) -> GerberError {
        GerberError::Line {
            line_number: self.line.number,
            content: self.line.text.clone(),
            reason: reason.into(),
        }
    }

    fn set_units(&mut self, units: Units) {
        self.state.set_units(units, self.options.simplification);
        self.object.units = units;
    }

    fn define_aperture(
        &mut self,
        id: u32,
        template: &str,
        params: Option<Vec<f64>>,
    ) -> GerberResult<()> {
        let Some(params) = params else {
            warn!(
                "line {}: aperture D{} has malformed parameters, not implemented",
                self.line.number, id
            );
            return Ok(());
        };
        let Some(mut aperture) = Aperture::from_template(template, &params) else {
            warn!(
                "line {}: aperture D{} type {} not implemented",
                self.line.number, id, template
            );
            return Ok(());
        };

        if let ApertureShape::Macro { name, modifiers } = &aperture.shape {
            let Some(definition) = self.object.macros.get(name) else {
                warn!(
                    "line {}: aperture D{} uses undefined macro {}, not implemented",
                    self.line.number, id, name
                );
                return Ok(());
            };
            let expanded = match definition.evaluate(modifiers, self.options.steps_per_circle) {
                Ok(expanded) => expanded,
                Err(err) => {
                    warn!(
                        "line {}: aperture D{} skipped, macro {}: {}",
                        self.line.number, id, name, err
                    );
                    self.defects.push(Defect::InvalidMacro {
                        id,
                        name: name.clone(),
                        line: self.line.number,
                        reason: err.to_string(),
                    });
                    return Ok(());
                }
            };
            aperture.size = Aperture::macro_size(&expanded);
            self.macro_cache.insert(id, expanded);
        }

        debug!("aperture D{} = {}", id, aperture);
        if self
            .object
            .tools
            .insert(id, ToolEntry::new(aperture))
            .is_some()
        {
            warn!("line {}: aperture D{} redefined", self.line.number, id);
        }
        Ok(())
    }

    fn select(&mut self, id: u32) {
        self.flush_path();
        let epsilon = self.options.epsilon();
        match self.object.tools.get_mut(&id) {
            Some(entry) => {
                entry.aperture.coerce_zero_size(epsilon);
                self.state.aperture = CurrentAperture::Defined(id);
            }
            None => {
                warn!(
                    "line {}: aperture D{} is not defined, its geometry is dropped",
                    self.line.number, id
                );
                self.defects.push(Defect::UndefinedAperture {
                    id,
                    line: self.line.number,
                });
                self.state.aperture = CurrentAperture::Failure(id);
            }
        }
    }

    fn coordinate(&self, value: &Option<String>, fallback: f64) -> GerberResult<f64> {
        match value {
            None => Ok(fallback),
            Some(text) => self
                .state
                .format
                .decode(text)
                .ok_or_else(|| self.fail(format!("malformed coordinate '{}'", text))),
        }
    }

    fn draw(&mut self, draw: Draw) -> GerberResult<()> {
        if let Some(mode) = draw.interpolation {
            self.state.interpolation = mode;
        }
        if let Some(op) = draw.operation {
            self.state.operation = op;
        }
        let target = Coord {
            x: self.coordinate(&draw.x, self.state.current.x)?,
            y: self.coordinate(&draw.y, self.state.current.y)?,
        };
        let i = self.coordinate(&draw.i, 0.0)?;
        let j = self.coordinate(&draw.j, 0.0)?;

        match self.state.operation {
            Operation::Interpolate => self.interpolate_to(target, i, j),
            Operation::Move => self.move_to(target),
            Operation::Flash if self.state.making_region => {
                warn!(
                    "line {}: flash inside a region treated as a move",
                    self.line.number
                );
                self.state.operation = Operation::Move;
                self.move_to(target);
            }
            Operation::Flash => {
                self.flush_path();
                self.state.current = target;
                self.state.path = vec![target];
                self.flash(target)?;
            }
        }
        Ok(())
    }

    fn interpolate_to(&mut self, target: Coord<f64>, i: f64, j: f64) {
        let current = self.state.current;
        match self.state.interpolation.arc_direction() {
            None => {
                if self.state.path.is_empty() {
                    self.state.path.push(current);
                }
                self.state.path.push(target);
            }
            Some(direction) => {
                let Some(quadrant) = self.state.quadrant else {
                    warn!(
                        "line {}: arc before G74/G75, skipped",
                        self.line.number
                    );
                    return;
                };
                let Some(points) = arc::interpolate(
                    current,
                    target,
                    i,
                    j,
                    direction,
                    quadrant,
                    self.options.steps_per_circle,
                ) else {
                    warn!(
                        "line {}: no arc center matches both endpoints, skipped",
                        self.line.number
                    );
                    return;
                };
                if self.state.path.is_empty() {
                    self.state.path.push(current);
                }
                self.state.path.extend(points.into_iter().skip(1));
            }
        }
        self.state.current = target;
    }

    fn move_to(&mut self, target: Coord<f64>) {
        if self.state.making_region {
            self.close_contour();
        } else {
            self.flush_path();
        }
        self.state.current = target;
        self.state.path = vec![target];
    }

    /// Stroke the open path with the current aperture
    fn flush_path(&mut self) {
        if self.state.making_region {
            return;
        }
        let path = std::mem::replace(&mut self.state.path, vec![self.state.current]);
        if path.len() < 2 {
            return;
        }
        let id = match self.state.aperture {
            CurrentAperture::Defined(id) => id,
            CurrentAperture::Failure(_) => return,
            CurrentAperture::None => {
                warn!(
                    "line {}: path drawn before any aperture was selected",
                    self.line.number
                );
                return;
            }
        };
        let Some(entry) = self.object.tools.get(&id) else {
            return;
        };

        let line = LineString::new(path);
        let solid = match entry.aperture.shape {
            // Rectangle strokes sweep a box, not a rounded pen
            ApertureShape::Rectangle { width, height } => MultiPolygon::new(
                line.0
                    .windows(2)
                    .map(|w| geometry::segment_box(w[0], w[1], width / 2.0, height / 2.0))
                    .collect(),
            ),
            _ => geometry::stroke(&line, entry.aperture.size, self.options.steps_per_circle),
        };
        self.emit(id, solid, Shape::Line(line));
    }

    fn flash(&mut self, at: Coord<f64>) -> GerberResult<()> {
        let id = match self.state.aperture {
            CurrentAperture::Defined(id) => id,
            CurrentAperture::Failure(_) => return Ok(()),
            CurrentAperture::None => {
                warn!(
                    "line {}: flash before any aperture was selected",
                    self.line.number
                );
                return Ok(());
            }
        };
        let Some(entry) = self.object.tools.get(&id) else {
            return Ok(());
        };
        let solid = match self.macro_cache.get(&id) {
            Some(expanded) => expanded.affine_transform(&translation(at.x, at.y)),
            None => entry
                .aperture
                .flash(at, &self.object.macros, self.options.steps_per_circle)
                .map_err(|e| self.fail(e.to_string()))?,
        };
        self.emit(id, solid, Shape::Point(Point(at)));
        Ok(())
    }

    /// Record drawn geometry under the current polarity
    fn emit(&mut self, id: u32, solid: MultiPolygon<f64>, follow: Shape) {
        let area = Shape::Area(solid.clone());
        let fragment = match self.state.polarity {
            Polarity::Dark => Fragment {
                solid: Some(area),
                follow: Some(follow.clone()),
                clear: None,
            },
            Polarity::Clear => Fragment {
                solid: None,
                follow: Some(follow.clone()),
                clear: Some(area),
            },
        };
        self.object.follow_geometry.push(follow);
        self.poly_buffer.extend(solid.0);
        if let Some(entry) = self.object.tools.get_mut(&id) {
            entry.fragments.push(fragment);
        }
    }

    fn close_contour(&mut self) {
        let contour = std::mem::take(&mut self.state.path);
        if contour.len() > 1 {
            self.region_contours.push(contour);
        }
    }

    fn close_region(&mut self) {
        self.close_contour();
        self.state.making_region = false;
        self.state.path = vec![self.state.current];

        let mut polygons = Vec::new();
        for mut points in std::mem::take(&mut self.region_contours) {
            points.dedup();
            if points.len() > 1 && points.first() == points.last() {
                points.pop();
            }
            if points.len() < 3 {
                debug!(
                    "line {}: region contour with {} points dropped",
                    self.line.number,
                    points.len()
                );
                continue;
            }
            let polygon = Polygon::new(LineString::new(points), vec![]);
            if geometry::is_valid_polygon(&polygon) {
                polygons.push(polygon);
            } else {
                warn!(
                    "line {}: self-intersecting region repaired",
                    self.line.number
                );
                self.defects.push(Defect::RepairedRegion {
                    line: self.line.number,
                });
                polygons.extend(geometry::repair(&polygon).0);
            }
        }
        if polygons.is_empty() {
            return;
        }

        self.object
            .tools
            .entry(REGION_APERTURE)
            .or_insert_with(|| ToolEntry::new(Aperture::region()));
        for polygon in polygons {
            let outline = Shape::Line(polygon.exterior().clone());
            self.emit(REGION_APERTURE, MultiPolygon::new(vec![polygon]), outline);
        }
    }

    fn close_step_repeat(&mut self) -> GerberResult<()> {
        self.flush_buffer()?;
        let Some(block) = self.step_repeat.take() else {
            return Ok(());
        };
        let offsets = block.offsets();
        debug!("step and repeat: {} copies", offsets.len());
        if offsets.is_empty() {
            return Ok(());
        }
        let transforms: Vec<_> = offsets
            .iter()
            .map(|&(dx, dy)| translation(dx, dy))
            .collect();

        let copies: Vec<Shape> = self
            .object
            .follow_geometry
            .get(block.follow_mark..)
            .unwrap_or(&[])
            .iter()
            .flat_map(|shape| transforms.iter().map(move |t| shape.transformed(t)))
            .collect();
        self.object.follow_geometry.extend(copies);

        for (id, entry) in self.object.tools.iter_mut() {
            let mark = block.fragment_marks.get(id).copied().unwrap_or(0);
            let copies: Vec<Fragment> = entry
                .fragments
                .get(mark..)
                .unwrap_or(&[])
                .iter()
                .flat_map(|fragment| transforms.iter().map(move |t| fragment.transformed(t)))
                .collect();
            entry.fragments.extend(copies);
        }
        Ok(())
    }

    /// Merge the polygon buffer into the solid geometry per polarity
    fn flush_buffer(&mut self) -> GerberResult<()> {
        if self.poly_buffer.is_empty() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(GerberError::Cancelled);
        }
        let mut batch = std::mem::take(&mut self.poly_buffer);
        if let Some(block) = &self.step_repeat {
            let copies: Vec<Polygon<f64>> = block
                .offsets()
                .into_iter()
                .flat_map(|(dx, dy)| {
                    let t = translation(dx, dy);
                    batch
                        .iter()
                        .map(move |p| p.affine_transform(&t))
                        .collect::<Vec<_>>()
                })
                .collect();
            batch.extend(copies);
        }
        debug!(
            "merging {} polygons ({:?})",
            batch.len(),
            self.state.polarity
        );
        let merged = geometry::merge(batch, self.options.merge);
        let solid = &self.object.solid_geometry;
        let next = match self.state.polarity {
            Polarity::Dark => {
                let combined = geometry::union(solid, &merged);
                if geometry::is_valid(&combined) {
                    combined
                } else {
                    warn!("merged geometry is invalid, keeping the pieces unmerged");
                    let mut pieces = solid.0.clone();
                    pieces.extend(merged.0);
                    MultiPolygon::new(pieces)
                }
            }
            Polarity::Clear => geometry::difference(solid, &merged),
        };
        self.object.solid_geometry = next;
        Ok(())
    }
}
