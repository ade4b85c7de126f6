//! Rect extraction: flatten the element tree into an ordered list of painted
//! rectangles in cell units.
//!
//! Extraction runs in three steps so the tree walker and the streaming reader
//! share every decision:
//!
//! 1. [`Flattener`] sees elements in document order (enter/leave) and turns
//!    each painting element into a [`UserPaint`] in user units, with groups,
//!    inheritance and transforms already resolved.
//! 2. [`CellSizer`] observes every paint to derive the pixel size and the
//!    [`CellFrame`] origin.
//! 3. [`CellMapper`] converts paints into [`SourceRect`]s on the cell grid.

use std::collections::BTreeSet;

use log::{debug, trace};

use crate::ClipRect;
use crate::ast::{Document, Element};
use crate::error::{CrispyError, Locator};
use crate::geometry::{CellFrame, Rgba, SourceRect};
use crate::path::{PathError, fill_polygons, parse_path, subpaths};
use crate::style::{DEFAULTS, FillRule, Paint, PaintContext, StyleError, parse_length};
use crate::transform::TransformError;

/// Containers whose children are never rendered directly.
const NON_RENDERED: &[&str] = &[
    "defs",
    "clipPath",
    "mask",
    "pattern",
    "symbol",
    "marker",
    "metadata",
    "title",
    "desc",
    "linearGradient",
    "radialGradient",
    "filter",
    "style",
    "script",
];

/// Elements that paint but can't be expressed as pixel rects.
const NON_RECT_SHAPES: &[&str] = &[
    "circle",
    "ellipse",
    "line",
    "polyline",
    "polygon",
    "text",
    "image",
    "use",
    "foreignObject",
];

/// Geometry of one painting element after transforms, in user units.
#[derive(Debug, Clone, PartialEq)]
pub enum UserShape {
    Rect { x: f64, y: f64, width: f64, height: f64 },
    Polygons { rings: Vec<Vec<(f64, f64)>>, rule: FillRule },
}

/// One painting element, flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct UserPaint {
    /// Document-order index of the element.
    pub order: u64,
    pub name: &'static str,
    pub shape: UserShape,
    pub color: Rgba,
    pub opacity: f64,
}

impl UserPaint {
    fn locator(&self) -> Locator {
        Locator::Element {
            index: self.order as usize,
            name: self.name.to_string(),
        }
    }
}

struct Frame {
    ctx: PaintContext,
    /// Inside something that never renders.
    inert: bool,
}

/// Walks elements in document order, resolving inherited paint state.
///
/// Call [`Flattener::enter`] for every start tag (and empty tag) and
/// [`Flattener::leave`] for every end tag (and right after an empty tag).
pub struct Flattener {
    stack: Vec<Frame>,
    strict: bool,
    skipped: usize,
}

impl Flattener {
    pub fn new(strict: bool) -> Self {
        Self {
            stack: Vec::new(),
            strict,
            skipped: 0,
        }
    }

    /// Number of non-representable elements skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn enter(&mut self, elem: &Element) -> Result<Option<UserPaint>, CrispyError> {
        let parent_inert = self.stack.last().is_some_and(|f| f.inert);
        if parent_inert || NON_RENDERED.contains(&elem.name.local.as_str()) {
            self.push_inert();
            return Ok(None);
        }

        let parent = self
            .stack
            .last()
            .map(|f| f.ctx.clone())
            .unwrap_or_default();

        let ctx = match parent.child(elem) {
            Ok(ctx) => ctx,
            Err(StyleError::Transform(TransformError::NotAxisAligned(what))) => {
                self.push_inert();
                self.non_representable(elem, &format!("non axis-aligned transform {}", what))?;
                return Ok(None);
            }
            Err(StyleError::Transform(TransformError::Malformed(msg))) => {
                return Err(CrispyError::parse(elem.locator(), msg));
            }
            Err(StyleError::Invalid { attr, value }) => {
                return Err(CrispyError::parse(
                    elem.locator(),
                    format!("invalid value {:?} for {}", value, attr),
                ));
            }
        };

        if ctx.display_none || ctx.transform.is_degenerate() {
            self.push_inert();
            return Ok(None);
        }

        let paint = match elem.name.local.as_str() {
            "rect" => self.rect(elem, &ctx)?,
            "path" => self.path(elem, &ctx)?,
            name if NON_RECT_SHAPES.contains(&name) => {
                if ctx.visible {
                    self.non_representable(elem, &format!("<{}> is not a pixel rect", name))?;
                }
                None
            }
            _ => None,
        };

        self.stack.push(Frame { ctx, inert: false });
        Ok(paint)
    }

    pub fn leave(&mut self) {
        self.stack.pop();
    }

    fn push_inert(&mut self) {
        self.stack.push(Frame {
            ctx: PaintContext::default(),
            inert: true,
        });
    }

    fn non_representable(&mut self, elem: &Element, message: &str) -> Result<(), CrispyError> {
        if self.strict {
            return Err(CrispyError::unsupported(elem.locator(), message));
        }
        debug!("skipping {}: {}", elem.locator(), message);
        self.skipped += 1;
        Ok(())
    }

    /// The fill color and opacity for a shape, or `None` if it paints nothing.
    fn fill(&mut self, elem: &Element, ctx: &PaintContext) -> Result<Option<(Rgba, f64)>, CrispyError> {
        if !ctx.visible {
            return Ok(None);
        }
        let color = match ctx.fill {
            Paint::None => return Ok(None),
            Paint::Color(c) => c,
            Paint::CurrentColor => ctx.color,
            Paint::Server => {
                self.non_representable(elem, "paint server fill")?;
                return Ok(None);
            }
        };
        let opacity = ctx.fill_alpha_factor();
        if !color.with_opacity(opacity).is_painted() {
            trace!("{} paints nothing", elem.locator());
            return Ok(None);
        }
        Ok(Some((color, opacity)))
    }

    /// `false` (after reporting it) if the shape draws an outline.
    fn unstroked(&mut self, elem: &Element, ctx: &PaintContext) -> Result<bool, CrispyError> {
        if ctx.visible && ctx.paints_stroke() {
            let message = format!("stroked <{}> is not a pixel rect", elem.name.local);
            self.non_representable(elem, &message)?;
            return Ok(false);
        }
        Ok(true)
    }

    fn rect(&mut self, elem: &Element, ctx: &PaintContext) -> Result<Option<UserPaint>, CrispyError> {
        let x = length_attr(elem, "x", DEFAULTS.x)?;
        let y = length_attr(elem, "y", DEFAULTS.y)?;
        let width = length_attr(elem, "width", DEFAULTS.width)?;
        let height = length_attr(elem, "height", DEFAULTS.height)?;

        if width <= 0.0 || height <= 0.0 {
            trace!("{} has no area", elem.locator());
            return Ok(None);
        }

        if ctx.visible && is_rounded(elem)? {
            self.non_representable(elem, "<rect> with rounded corners is not a pixel rect")?;
            return Ok(None);
        }
        if !self.unstroked(elem, ctx)? {
            return Ok(None);
        }

        let Some((color, opacity)) = self.fill(elem, ctx)? else {
            return Ok(None);
        };

        let (x, y, width, height) = ctx.transform.apply_rect(x, y, width, height);
        Ok(Some(UserPaint {
            order: elem.index as u64,
            name: "rect",
            shape: UserShape::Rect {
                x,
                y,
                width,
                height,
            },
            color,
            opacity,
        }))
    }

    fn path(&mut self, elem: &Element, ctx: &PaintContext) -> Result<Option<UserPaint>, CrispyError> {
        let Some(d) = elem.get_attr("d").filter(|d| !d.trim().is_empty()) else {
            return Ok(None);
        };

        let commands = match parse_path(d) {
            Ok(commands) => commands,
            Err(PathError::Malformed(msg)) => {
                return Err(CrispyError::parse(elem.locator(), msg));
            }
            Err(PathError::Unsupported(msg)) => {
                self.non_representable(elem, &msg)?;
                return Ok(None);
            }
        };

        let rings: Vec<Vec<(f64, f64)>> = subpaths(&commands)
            .into_iter()
            .map(|ring| {
                ring.into_iter()
                    .map(|(x, y)| ctx.transform.apply(x, y))
                    .collect()
            })
            .collect();

        if let Some(msg) = first_diagonal(&rings) {
            self.non_representable(elem, &msg)?;
            return Ok(None);
        }
        if !self.unstroked(elem, ctx)? {
            return Ok(None);
        }

        let Some((color, opacity)) = self.fill(elem, ctx)? else {
            return Ok(None);
        };

        Ok(Some(UserPaint {
            order: elem.index as u64,
            name: "path",
            shape: UserShape::Polygons {
                rings,
                rule: ctx.fill_rule,
            },
            color,
            opacity,
        }))
    }
}

fn length_attr(elem: &Element, name: &str, default: f64) -> Result<f64, CrispyError> {
    match elem.get_attr(name) {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Ok(default),
        Some(v) => parse_length(v).ok_or_else(|| {
            CrispyError::parse(elem.locator(), format!("invalid number {:?} in {}", v, name))
        }),
    }
}

/// Whether a rect's `rx`/`ry` round its corners. A missing or `auto` radius
/// takes the other one's value.
fn is_rounded(elem: &Element) -> Result<bool, CrispyError> {
    let radius = |name: &str| -> Result<Option<f64>, CrispyError> {
        match elem.get_attr(name).map(str::trim) {
            None | Some("") | Some("auto") => Ok(None),
            Some(_) => length_attr(elem, name, 0.0).map(Some),
        }
    };
    let (rx, ry) = (radius("rx")?, radius("ry")?);
    let rx_eff = rx.or(ry).unwrap_or(0.0);
    let ry_eff = ry.or(rx).unwrap_or(0.0);
    Ok(rx_eff > 0.0 && ry_eff > 0.0)
}

fn first_diagonal(rings: &[Vec<(f64, f64)>]) -> Option<String> {
    for ring in rings {
        let n = ring.len();
        for i in 0..n {
            let (ax, ay) = ring[i];
            let (bx, by) = ring[(i + 1) % n];
            if ax != bx && ay != by {
                return Some(format!("diagonal segment ({}, {}) -> ({}, {})", ax, ay, bx, by));
            }
        }
    }
    None
}

/// Quantum for pixel-size derivation, in user units.
const SIZE_QUANTUM: f64 = 1000.0;

/// A derived cell smaller than the smallest extent over this is noise, not
/// a finer pixel grid.
const MAX_CELLS_PER_EXTENT: u64 = 16;

/// Derives the pixel size and where the content starts.
///
/// The pixel size is the largest unit that evenly divides every coordinate
/// and dimension seen, after snapping each value to the largest power of ten
/// at most 1% of the smallest extent. Snapping absorbs editor noise such as
/// `width="10.002"`. When even the snapped values share no sensible divisor,
/// the smallest extent is the pixel size.
///
/// For per-pixel input this is the smallest rect dimension. For input that was
/// already merged it still lands on the original pixel size, because merged
/// rects start and end on pixel boundaries.
#[derive(Debug, Default, Clone)]
pub struct CellSizer {
    /// Distinct absolute values seen, in quanta.
    values: BTreeSet<u64>,
    /// Smallest positive width, height or edge length, in quanta.
    smallest: Option<u64>,
    /// Top-left of everything seen, in user units.
    min_corner: Option<(f64, f64)>,
}

impl CellSizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, paint: &UserPaint) {
        match &paint.shape {
            UserShape::Rect {
                x,
                y,
                width,
                height,
            } => {
                self.corner(*x, *y);
                for v in [*x, *y, *width, *height] {
                    self.push(v);
                }
                self.extent(*width);
                self.extent(*height);
            }
            UserShape::Polygons { rings, .. } => {
                for ring in rings {
                    for (i, &(x, y)) in ring.iter().enumerate() {
                        self.corner(x, y);
                        self.push(x);
                        self.push(y);
                        let (nx, ny) = ring[(i + 1) % ring.len()];
                        self.extent(nx - x);
                        self.extent(ny - y);
                    }
                }
            }
        }
    }

    fn push(&mut self, v: f64) {
        self.values.insert(quantize(v));
    }

    fn extent(&mut self, v: f64) {
        let q = quantize(v);
        if q > 0 {
            self.smallest = Some(self.smallest.map_or(q, |s| s.min(q)));
        }
    }

    fn corner(&mut self, x: f64, y: f64) {
        self.min_corner = Some(match self.min_corner {
            Some((mx, my)) => (mx.min(x), my.min(y)),
            None => (x, y),
        });
    }

    pub fn cell_size(&self) -> f64 {
        let Some(smallest) = self.smallest else {
            return 1.0;
        };

        let mut step = 1u64;
        while step * 10 <= smallest / 100 {
            step *= 10;
        }
        let g = self
            .values
            .iter()
            .fold(0, |g, &v| gcd(g, v.saturating_add(step / 2) / step));

        let cell = g.saturating_mul(step);
        if cell == 0 || cell.saturating_mul(MAX_CELLS_PER_EXTENT) < smallest {
            debug!(
                "no common pixel size within {} units; using the smallest extent",
                step as f64 / SIZE_QUANTUM
            );
            return smallest as f64 / SIZE_QUANTUM;
        }
        cell as f64 / SIZE_QUANTUM
    }

    /// The cell frame for `size`: content at negative coordinates moves the
    /// origin so it still lands on the grid. A clip bounds how far it moves.
    pub fn frame(&self, size: f64, clip: Option<&ClipRect>) -> CellFrame {
        let (min_x, min_y) = self.min_corner.unwrap_or((0.0, 0.0));
        let (mut ox, mut oy) = (snap(min_x / size), snap(min_y / size));
        if let Some(c) = clip {
            ox = ox.max(snap(c.x / size));
            oy = oy.max(snap(c.y / size));
        }
        CellFrame {
            size,
            origin_x: ox.min(0),
            origin_y: oy.min(0),
        }
    }
}

fn quantize(v: f64) -> u64 {
    (v.abs() * SIZE_QUANTUM).round() as u64
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Converts user-unit paints into cell rects.
#[derive(Debug, Clone)]
pub struct CellMapper {
    frame: CellFrame,
    /// Clip in frame cells: `[x0, x1) x [y0, y1)`.
    clip: (i64, i64, i64, i64),
}

impl CellMapper {
    pub fn new(frame: CellFrame, clip: Option<&ClipRect>) -> Self {
        let limit = u32::MAX as i64;
        let clip = match clip {
            Some(c) => (
                snap(c.x / frame.size) - frame.origin_x,
                snap(c.y / frame.size) - frame.origin_y,
                snap((c.x + c.width) / frame.size) - frame.origin_x,
                snap((c.y + c.height) / frame.size) - frame.origin_y,
            ),
            None => (0, 0, limit, limit),
        };
        let clip = (clip.0.max(0), clip.1.max(0), clip.2.min(limit), clip.3.min(limit));
        Self { frame, clip }
    }

    pub fn frame(&self) -> CellFrame {
        self.frame
    }

    fn cell_x(&self, x: f64) -> i64 {
        snap(x / self.frame.size) - self.frame.origin_x
    }

    fn cell_y(&self, y: f64) -> i64 {
        snap(y / self.frame.size) - self.frame.origin_y
    }

    /// Append the cell rects covered by `paint` to `out`.
    pub fn map(&self, paint: &UserPaint, out: &mut Vec<SourceRect>) -> Result<(), CrispyError> {
        match &paint.shape {
            UserShape::Rect {
                x,
                y,
                width,
                height,
            } => {
                let x0 = self.cell_x(*x);
                let y0 = self.cell_y(*y);
                let x1 = self.cell_x(x + width).max(x0 + 1);
                let y1 = self.cell_y(y + height).max(y0 + 1);
                self.push_clipped(paint, x0, y0, x1, y1, out);
            }
            UserShape::Polygons { rings, rule } => {
                let rings: Vec<Vec<(i64, i64)>> = rings
                    .iter()
                    .map(|ring| ring.iter().map(|&(x, y)| (self.cell_x(x), self.cell_y(y))).collect())
                    .collect();
                let spans = fill_polygons(&rings, *rule).map_err(|e| match e {
                    PathError::Malformed(msg) | PathError::Unsupported(msg) => {
                        CrispyError::unsupported(paint.locator(), msg)
                    }
                })?;
                for span in spans {
                    self.push_clipped(paint, span.x0, span.y, span.x1, span.y + 1, out);
                }
            }
        }
        Ok(())
    }

    fn push_clipped(
        &self,
        paint: &UserPaint,
        x0: i64,
        y0: i64,
        x1: i64,
        y1: i64,
        out: &mut Vec<SourceRect>,
    ) {
        let (cx0, cy0, cx1, cy1) = self.clip;
        let (x0, y0) = (x0.max(cx0), y0.max(cy0));
        let (x1, y1) = (x1.min(cx1), y1.min(cy1));
        if x1 <= x0 || y1 <= y0 {
            trace!("element #{} lies outside the canvas", paint.order);
            return;
        }
        out.push(SourceRect {
            order: paint.order,
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
            color: paint.color,
            opacity: paint.opacity,
        });
    }
}

/// Nearest cell boundary.
fn snap(v: f64) -> i64 {
    v.round() as i64
}

/// Everything the optimizer needs from a parsed document.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Cell rects in document order (not expanded to unit cells).
    pub rects: Vec<SourceRect>,
    /// Number of painting elements, before any expansion.
    pub source_count: usize,
    pub frame: CellFrame,
    pub skipped: usize,
}

/// Flatten a parsed document into cell rects.
pub fn extract(
    doc: &Document,
    strict: bool,
    pixel_size: Option<f64>,
    clip: Option<&ClipRect>,
) -> Result<Extraction, CrispyError> {
    let mut flattener = Flattener::new(strict);
    let mut paints = Vec::new();
    walk(&doc.root, &mut flattener, &mut paints)?;

    let mut sizer = CellSizer::new();
    for paint in &paints {
        sizer.observe(paint);
    }
    let frame = sizer.frame(pixel_size.unwrap_or_else(|| sizer.cell_size()), clip);
    debug!("cell frame {:?} over {} painting elements", frame, paints.len());

    let mapper = CellMapper::new(frame, clip);
    let mut rects = Vec::with_capacity(paints.len());
    for paint in &paints {
        mapper.map(paint, &mut rects)?;
    }

    Ok(Extraction {
        rects,
        source_count: paints.len(),
        frame,
        skipped: flattener.skipped(),
    })
}

fn walk(elem: &Element, flattener: &mut Flattener, out: &mut Vec<UserPaint>) -> Result<(), CrispyError> {
    if let Some(paint) = flattener.enter(elem)? {
        out.push(paint);
    }
    for child in &elem.children {
        walk(child, flattener, out)?;
    }
    flattener.leave();
    Ok(())
}

/// Split rects into 1x1 cells, keeping each one's document order.
///
/// Compositing a rect and compositing its unit cells give the same grid; this
/// is the expanded view of the same paint list.
pub fn expand_to_unit_rects(rects: &[SourceRect]) -> Vec<SourceRect> {
    rects.iter().flat_map(|r| r.unit_rects()).collect()
}
