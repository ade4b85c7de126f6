//! Pixel-space data model.
//!
//! Everything here is measured in cells: one cell is one logical pixel of the
//! source artwork, regardless of how many user units it spans in the SVG.

use std::fmt;

/// One grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
}

impl Pixel {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Straight (non-premultiplied) 8-bit RGBA.
///
/// Equality is exact on all four channels. An alpha of zero means "no paint".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub fn is_painted(&self) -> bool {
        self.a != 0
    }

    pub fn is_opaque(&self) -> bool {
        self.a == 255
    }

    /// The same color with its alpha scaled by `opacity` (0..=1).
    ///
    /// Rounds half to even on the 0–255 scale so results are reproducible.
    pub fn with_opacity(self, opacity: f64) -> Self {
        let a = (self.a as f64 * opacity.clamp(0.0, 1.0)).round_ties_even();
        Self { a: a as u8, ..self }
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

/// Where the cell grid sits in user space.
///
/// Cell `(0, 0)` starts at `(origin_x * size, origin_y * size)`. The origin is
/// never positive, so art that starts at or right of zero keeps its cell
/// numbers and art at negative coordinates still lands on `u32` cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellFrame {
    pub size: f64,
    pub origin_x: i64,
    pub origin_y: i64,
}

impl CellFrame {
    pub fn new(size: f64) -> Self {
        Self {
            size,
            origin_x: 0,
            origin_y: 0,
        }
    }

    /// User-space x of a cell column's left edge.
    pub fn user_x(&self, x: u32) -> f64 {
        (x as i64 + self.origin_x) as f64 * self.size
    }

    /// User-space y of a cell row's top edge.
    pub fn user_y(&self, y: u32) -> f64 {
        (y as i64 + self.origin_y) as f64 * self.size
    }
}

/// A painted rectangle extracted from the input, in cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRect {
    /// Document order of the element this rect came from. Every rect expanded
    /// or rasterized from the same element shares it.
    pub order: u64,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub color: Rgba,
    /// Product of every opacity that applies to the element, in 0..=1.
    pub opacity: f64,
}

impl SourceRect {
    /// The color actually laid down by this rect once opacity is applied.
    pub fn paint(&self) -> Rgba {
        if self.opacity >= 1.0 {
            self.color
        } else {
            self.color.with_opacity(self.opacity)
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Split into 1x1 rects in row-major order, keeping the document order.
    pub fn unit_rects(&self) -> impl Iterator<Item = SourceRect> + '_ {
        (self.y..self.bottom()).flat_map(move |y| {
            (self.x..self.right()).map(move |x| SourceRect {
                x,
                y,
                width: 1,
                height: 1,
                ..*self
            })
        })
    }
}

/// Inclusive cell bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Bounds {
    pub fn of_rect(rect: &SourceRect) -> Self {
        Self {
            min_x: rect.x,
            min_y: rect.y,
            max_x: rect.right() - 1,
            max_y: rect.bottom() - 1,
        }
    }

    pub fn include(&mut self, other: &Bounds) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }
}

/// The composited picture: one color per painted cell.
///
/// Cells that were never painted hold [`Rgba::TRANSPARENT`]; compositing
/// never produces a zero alpha for a painted cell, so the two can't collide.
#[derive(Debug, Clone)]
pub struct PixelGrid {
    bounds: Option<Bounds>,
    cells: Vec<Rgba>,
}

impl PixelGrid {
    pub fn empty() -> Self {
        Self {
            bounds: None,
            cells: Vec::new(),
        }
    }

    pub(crate) fn with_bounds(bounds: Bounds) -> Self {
        Self {
            bounds: Some(bounds),
            cells: vec![Rgba::TRANSPARENT; bounds.area() as usize],
        }
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    /// The composited color at a cell, or `None` if nothing painted it.
    pub fn get(&self, x: u32, y: u32) -> Option<Rgba> {
        let idx = self.index(x, y)?;
        let c = self.cells[idx];
        c.is_painted().then_some(c)
    }

    pub(crate) fn cell_mut(&mut self, x: u32, y: u32) -> Option<&mut Rgba> {
        let idx = self.index(x, y)?;
        self.cells.get_mut(idx)
    }

    /// A full row of the bounding box, starting at `bounds.min_x`.
    pub fn row(&self, y: u32) -> &[Rgba] {
        match self.bounds {
            Some(b) if y >= b.min_y && y <= b.max_y => {
                let w = b.width() as usize;
                let start = (y - b.min_y) as usize * w;
                &self.cells[start..start + w]
            }
            _ => &[],
        }
    }

    /// Number of painted cells.
    pub fn painted_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_painted()).count()
    }

    /// Iterate painted cells in raster order.
    pub fn painted(&self) -> impl Iterator<Item = (Pixel, Rgba)> + '_ {
        let (min_x, min_y, w) = match self.bounds {
            Some(b) => (b.min_x, b.min_y, b.width()),
            None => (0, 0, 1),
        };
        self.cells.iter().enumerate().filter_map(move |(i, c)| {
            c.is_painted().then(|| {
                let i = i as u32;
                (Pixel::new(min_x + i % w, min_y + i / w), *c)
            })
        })
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        let b = self.bounds?;
        if x < b.min_x || x > b.max_x || y < b.min_y || y > b.max_y {
            return None;
        }
        Some((y - b.min_y) as usize * b.width() as usize + (x - b.min_x) as usize)
    }
}

/// A monochrome output rectangle, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub color: Rgba,
}

impl MergedRect {
    /// Output order: ascending y, then x.
    pub fn origin_key(&self) -> (u32, u32) {
        (self.y, self.x)
    }

    pub fn contains(&self, p: Pixel) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// A cell-corner coordinate on the grid lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vertex {
    pub x: u32,
    pub y: u32,
}

/// One traced same-color region.
///
/// The first loop is the outer boundary; any further loops are holes. Loops
/// are closed implicitly (the last vertex connects back to the first) and only
/// ever change one coordinate between consecutive vertices. Outer loops run
/// clockwise on screen and holes counter-clockwise, so the nonzero rule fills
/// exactly the region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlinePath {
    pub color: Rgba,
    pub bounds: Bounds,
    pub loops: Vec<Vec<Vertex>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_opacity_rounds_half_to_even() {
        // 255 * 0.5 = 127.5 -> 128 (even)
        assert_eq!(Rgba::opaque(1, 2, 3).with_opacity(0.5).a, 128);
        // 5 * 0.5 = 2.5 -> 2 (even)
        assert_eq!(Rgba::new(1, 2, 3, 5).with_opacity(0.5).a, 2);
    }

    #[test]
    fn test_unit_rects_keep_order() {
        let rect = SourceRect {
            order: 7,
            x: 2,
            y: 3,
            width: 2,
            height: 2,
            color: Rgba::BLACK,
            opacity: 1.0,
        };
        let units: Vec<_> = rect.unit_rects().collect();
        assert_eq!(units.len(), 4);
        assert!(units.iter().all(|r| r.order == 7 && r.width == 1 && r.height == 1));
        assert_eq!((units[1].x, units[1].y), (3, 3));
        assert_eq!((units[2].x, units[2].y), (2, 4));
    }

    #[test]
    fn test_cell_frame_maps_back_to_user_space() {
        let frame = CellFrame {
            size: 10.0,
            origin_x: -2,
            origin_y: 0,
        };
        assert_eq!(frame.user_x(0), -20.0);
        assert_eq!(frame.user_x(3), 10.0);
        assert_eq!(frame.user_y(1), 10.0);
        assert_eq!(CellFrame::new(0.5).user_x(4), 2.0);
    }

    #[test]
    fn test_grid_row_and_get() {
        let mut grid = PixelGrid::with_bounds(Bounds {
            min_x: 1,
            min_y: 1,
            max_x: 3,
            max_y: 2,
        });
        *grid.cell_mut(2, 2).unwrap() = Rgba::opaque(255, 0, 0);
        assert_eq!(grid.get(2, 2), Some(Rgba::opaque(255, 0, 0)));
        assert_eq!(grid.get(1, 1), None);
        assert_eq!(grid.get(0, 0), None);
        assert_eq!(grid.row(2).len(), 3);
        assert_eq!(grid.row(2)[1], Rgba::opaque(255, 0, 0));
        assert!(grid.row(5).is_empty());
        assert_eq!(
            grid.painted().collect::<Vec<_>>(),
            vec![(Pixel::new(2, 2), Rgba::opaque(255, 0, 0))]
        );
    }
}
