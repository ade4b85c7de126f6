//! Ordered source-over compositing onto the pixel grid.

use log::debug;

use crate::error::{CrispyError, Locator};
use crate::geometry::{Bounds, PixelGrid, Rgba, SourceRect};

/// Largest grid the full driver will allocate, in cells.
pub const MAX_GRID_CELLS: u64 = 1 << 28;

/// Paint `src` over `dst` with straight-alpha source-over.
///
/// Every channel is rounded half to even on the 0–255 scale, so the result
/// depends only on the two inputs.
pub fn source_over(src: Rgba, dst: Rgba) -> Rgba {
    if !dst.is_painted() || src.is_opaque() {
        return src;
    }
    if !src.is_painted() {
        return dst;
    }

    let sa = src.a as f64 / 255.0;
    let da = dst.a as f64 / 255.0;
    let oa = sa + da * (1.0 - sa);

    let channel = |s: u8, d: u8| -> u8 {
        let c = (s as f64 * sa + d as f64 * da * (1.0 - sa)) / oa;
        c.round_ties_even().clamp(0.0, 255.0) as u8
    };

    Rgba {
        r: channel(src.r, dst.r),
        g: channel(src.g, dst.g),
        b: channel(src.b, dst.b),
        a: (oa * 255.0).round_ties_even().clamp(1.0, 255.0) as u8,
    }
}

/// The bounding box of all rects, if any.
pub fn bounds_of(rects: &[SourceRect]) -> Option<Bounds> {
    let mut iter = rects.iter();
    let mut bounds = Bounds::of_rect(iter.next()?);
    for rect in iter {
        bounds.include(&Bounds::of_rect(rect));
    }
    Some(bounds)
}

/// Build the pixel grid from rects, painting in ascending document order.
///
/// A rect covering several cells composites exactly like the same number of
/// unit rects sharing its order, so rects are never expanded here.
pub fn composite(rects: &[SourceRect]) -> Result<PixelGrid, CrispyError> {
    let Some(bounds) = bounds_of(rects) else {
        return Ok(PixelGrid::empty());
    };
    if bounds.area() > MAX_GRID_CELLS {
        return Err(CrispyError::unsupported(
            Locator::Document,
            format!(
                "pixel grid of {}x{} cells is too large to hold in memory; use rect mode or a canvas clip",
                bounds.width(),
                bounds.height()
            ),
        ));
    }
    debug!(
        "compositing {} rects onto a {}x{} grid",
        rects.len(),
        bounds.width(),
        bounds.height()
    );

    let mut ordered: Vec<&SourceRect> = rects.iter().collect();
    ordered.sort_by_key(|r| r.order);

    let mut grid = PixelGrid::with_bounds(bounds);
    for rect in ordered {
        paint_rect(&mut grid, rect);
    }
    Ok(grid)
}

fn paint_rect(grid: &mut PixelGrid, rect: &SourceRect) {
    let paint = rect.paint();
    if !paint.is_painted() {
        return;
    }
    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            if let Some(cell) = grid.cell_mut(x, y) {
                *cell = source_over(paint, *cell);
            }
        }
    }
}
