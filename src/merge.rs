//! Rectangle merging: horizontal runs stacked vertically.
//!
//! [`RowMerger`] is the kernel. It sees one row at a time, so the full-grid
//! merge and the streaming driver produce the same rects from the same rows.

use std::collections::HashMap;

use crate::geometry::{MergedRect, PixelGrid, Rgba};

/// Turns rows of cells into merged rects, top to bottom.
///
/// A run extends the open rect directly above it only when that rect has the
/// same x-span and color and ended on the previous row. Anything left open
/// without a matching run below is closed.
#[derive(Debug)]
pub struct RowMerger {
    vertical: bool,
    /// Rects still growing downward, ordered by x.
    open: Vec<MergedRect>,
}

impl RowMerger {
    pub fn new(vertical: bool) -> Self {
        Self {
            vertical,
            open: Vec::new(),
        }
    }

    /// Feed row `y`. `row[i]` is the cell at `x0 + i`; transparent cells are
    /// unpainted. Rows must arrive in ascending `y`, and may be skipped.
    pub fn push_row(&mut self, y: u32, x0: u32, row: &[Rgba], mut emit: impl FnMut(MergedRect)) {
        let mut previous = std::mem::take(&mut self.open).into_iter().peekable();
        let mut next_open = Vec::new();

        for (x, width, color) in runs(x0, row) {
            // Rects that end before this run can't continue.
            while let Some(above) = previous.next_if(|r| r.x < x) {
                emit(above);
            }
            let extends = self.vertical
                && previous.peek().is_some_and(|above| {
                    above.x == x
                        && above.width == width
                        && above.color == color
                        && above.y + above.height == y
                });
            if extends {
                if let Some(mut above) = previous.next() {
                    above.height += 1;
                    next_open.push(above);
                }
                continue;
            }

            let rect = MergedRect {
                x,
                y,
                width,
                height: 1,
                color,
            };
            if self.vertical {
                next_open.push(rect);
            } else {
                emit(rect);
            }
        }

        for above in previous {
            emit(above);
        }
        self.open = next_open;
    }

    /// The smallest `(y, x)` origin among rects still open.
    pub fn min_open_origin(&self) -> Option<(u32, u32)> {
        self.open.iter().map(MergedRect::origin_key).min()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Close every open rect.
    pub fn finish(&mut self, mut emit: impl FnMut(MergedRect)) {
        for rect in self.open.drain(..) {
            emit(rect);
        }
    }
}

/// Maximal same-color runs in a row, as `(x, width, color)`.
fn runs(x0: u32, row: &[Rgba]) -> impl Iterator<Item = (u32, u32, Rgba)> + '_ {
    let mut i = 0;
    std::iter::from_fn(move || {
        while i < row.len() && !row[i].is_painted() {
            i += 1;
        }
        if i >= row.len() {
            return None;
        }
        let start = i;
        let color = row[i];
        while i < row.len() && row[i] == color {
            i += 1;
        }
        Some((x0 + start as u32, (i - start) as u32, color))
    })
}

/// Merge a full grid into rects, sorted by `(y, x)`.
pub fn merge_grid(grid: &PixelGrid, vertical: bool) -> Vec<MergedRect> {
    let Some(bounds) = grid.bounds() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut merger = RowMerger::new(vertical);
    for y in bounds.min_y..=bounds.max_y {
        merger.push_row(y, bounds.min_x, grid.row(y), |r| out.push(r));
    }
    merger.finish(|r| out.push(r));
    out.sort_by_key(MergedRect::origin_key);
    out
}

/// Merge rects that share a full edge and a color, until nothing changes.
///
/// Input rects must not overlap. On output of [`merge_grid`] with vertical
/// merging this changes nothing; it exists for rect lists from elsewhere,
/// such as horizontal-only merges.
pub fn merge_adjacent(mut rects: Vec<MergedRect>) -> Vec<MergedRect> {
    loop {
        let before = rects.len();
        rects = merge_pass(rects, Axis::Horizontal);
        rects = merge_pass(rects, Axis::Vertical);
        if rects.len() == before {
            break;
        }
    }
    rects.sort_by_key(MergedRect::origin_key);
    rects
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

fn merge_pass(mut rects: Vec<MergedRect>, axis: Axis) -> Vec<MergedRect> {
    match axis {
        Axis::Horizontal => rects.sort_by_key(|r| (r.y, r.x)),
        Axis::Vertical => rects.sort_by_key(|r| (r.x, r.y)),
    }

    // (fixed position, fixed extent, trailing edge, color) -> index in `out`
    let key = |r: &MergedRect, edge: u32| match axis {
        Axis::Horizontal => (r.y, r.height, edge, r.color),
        Axis::Vertical => (r.x, r.width, edge, r.color),
    };

    let mut out: Vec<MergedRect> = Vec::with_capacity(rects.len());
    let mut trailing: HashMap<(u32, u32, u32, Rgba), usize> = HashMap::new();

    for rect in rects {
        let leading = match axis {
            Axis::Horizontal => rect.x,
            Axis::Vertical => rect.y,
        };
        if let Some(idx) = trailing.remove(&key(&rect, leading)) {
            let target = &mut out[idx];
            match axis {
                Axis::Horizontal => target.width += rect.width,
                Axis::Vertical => target.height += rect.height,
            }
            let edge = match axis {
                Axis::Horizontal => target.x + target.width,
                Axis::Vertical => target.y + target.height,
            };
            trailing.insert(key(target, edge), idx);
        } else {
            let edge = match axis {
                Axis::Horizontal => rect.x + rect.width,
                Axis::Vertical => rect.y + rect.height,
            };
            trailing.insert(key(&rect, edge), out.len());
            out.push(rect);
        }
    }
    out
}
