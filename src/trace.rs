//! Path mode: trace every 4-connected same-color region into an outline.

use std::collections::{BTreeMap, VecDeque};

use log::debug;

use crate::geometry::{Bounds, OutlinePath, PixelGrid, Rgba, Vertex};

const NO_COMPONENT: u32 = u32::MAX;

struct Component {
    color: Rgba,
    bounds: Bounds,
    /// First cell reached in raster order.
    seed: (u32, u32),
}

/// Trace the grid into one outline per connected region, ordered by the top
/// left corner of each region's bounding box.
pub fn trace(grid: &PixelGrid) -> Vec<OutlinePath> {
    let Some(bounds) = grid.bounds() else {
        return Vec::new();
    };
    let width = bounds.width() as usize;
    let height = bounds.height() as usize;

    let (labels, components) = label_components(grid, &bounds, width, height);
    debug!("traced {} regions", components.len());

    let mut order: Vec<usize> = (0..components.len()).collect();
    order.sort_by_key(|&i| {
        let c = &components[i];
        (c.bounds.min_y, c.bounds.min_x, c.seed.1, c.seed.0)
    });

    order
        .into_iter()
        .map(|id| {
            let c = &components[id];
            OutlinePath {
                color: c.color,
                bounds: c.bounds,
                loops: component_loops(&labels, &bounds, width, id as u32, c),
            }
        })
        .collect()
}

fn label_components(
    grid: &PixelGrid,
    bounds: &Bounds,
    width: usize,
    height: usize,
) -> (Vec<u32>, Vec<Component>) {
    let mut labels = vec![NO_COMPONENT; width * height];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..labels.len() {
        if labels[start] != NO_COMPONENT {
            continue;
        }
        let sx = bounds.min_x + (start % width) as u32;
        let sy = bounds.min_y + (start / width) as u32;
        let Some(color) = grid.get(sx, sy) else {
            continue;
        };

        let id = components.len() as u32;
        let mut region = Bounds {
            min_x: sx,
            min_y: sy,
            max_x: sx,
            max_y: sy,
        };
        labels[start] = id;
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            let x = idx % width;
            let y = idx / width;
            let cell = Bounds {
                min_x: bounds.min_x + x as u32,
                min_y: bounds.min_y + y as u32,
                max_x: bounds.min_x + x as u32,
                max_y: bounds.min_y + y as u32,
            };
            region.include(&cell);

            let mut visit = |n: usize| {
                if labels[n] == NO_COMPONENT {
                    let nx = bounds.min_x + (n % width) as u32;
                    let ny = bounds.min_y + (n / width) as u32;
                    if grid.get(nx, ny) == Some(color) {
                        labels[n] = id;
                        queue.push_back(n);
                    }
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < width {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - width);
            }
            if y + 1 < height {
                visit(idx + width);
            }
        }

        components.push(Component {
            color,
            bounds: region,
            seed: (sx, sy),
        });
    }

    (labels, components)
}

/// Boundary loops of one component.
///
/// Every cell side facing outside the component becomes a directed edge with
/// the component on its right, so outer boundaries come out clockwise on screen
/// and holes counter-clockwise.
fn component_loops(
    labels: &[u32],
    grid_bounds: &Bounds,
    width: usize,
    id: u32,
    component: &Component,
) -> Vec<Vec<Vertex>> {
    let inside = |x: i64, y: i64| -> bool {
        if x < grid_bounds.min_x as i64
            || y < grid_bounds.min_y as i64
            || x > grid_bounds.max_x as i64
            || y > grid_bounds.max_y as i64
        {
            return false;
        }
        let idx = (y as u32 - grid_bounds.min_y) as usize * width + (x as u32 - grid_bounds.min_x) as usize;
        labels[idx] == id
    };

    let mut edges: BTreeMap<Vertex, Vec<Vertex>> = BTreeMap::new();
    let mut add = |from: (u32, u32), to: (u32, u32)| {
        edges
            .entry(Vertex { x: from.0, y: from.1 })
            .or_default()
            .push(Vertex { x: to.0, y: to.1 });
    };

    let b = &component.bounds;
    for y in b.min_y..=b.max_y {
        for x in b.min_x..=b.max_x {
            let (xi, yi) = (x as i64, y as i64);
            if !inside(xi, yi) {
                continue;
            }
            if !inside(xi, yi - 1) {
                add((x, y), (x + 1, y));
            }
            if !inside(xi + 1, yi) {
                add((x + 1, y), (x + 1, y + 1));
            }
            if !inside(xi, yi + 1) {
                add((x + 1, y + 1), (x, y + 1));
            }
            if !inside(xi - 1, yi) {
                add((x, y + 1), (x, y));
            }
        }
    }

    let mut loops = Vec::new();
    while let Some(start) = edges.keys().next().copied() {
        let mut points = vec![start];
        let mut prev = start;
        let mut current = take_edge(&mut edges, start, None);
        while let Some(v) = current {
            if v == start {
                break;
            }
            points.push(v);
            current = take_edge(&mut edges, v, Some(prev));
            prev = v;
        }
        loops.push(simplify(points));
    }
    loops
}

/// Remove and return an outgoing edge of `at`, preferring a right turn.
///
/// Two outgoing edges only meet where regions touch at a corner; turning right
/// there keeps each loop on its own side of the touch point.
fn take_edge(edges: &mut BTreeMap<Vertex, Vec<Vertex>>, at: Vertex, came_from: Option<Vertex>) -> Option<Vertex> {
    let outgoing = edges.get_mut(&at)?;
    let pick = match came_from {
        Some(from) if outgoing.len() > 1 => {
            let heading = direction(from, at);
            outgoing
                .iter()
                .enumerate()
                .min_by_key(|(_, to)| turn_rank(heading, direction(at, **to)))
                .map(|(i, _)| i)
                .unwrap_or(0)
        }
        _ => 0,
    };
    let next = outgoing.swap_remove(pick);
    if outgoing.is_empty() {
        edges.remove(&at);
    }
    Some(next)
}

fn direction(from: Vertex, to: Vertex) -> (i64, i64) {
    (
        (to.x as i64 - from.x as i64).signum(),
        (to.y as i64 - from.y as i64).signum(),
    )
}

/// 0 for a right turn (on screen, y down), 1 straight, 2 left, 3 reverse.
fn turn_rank(heading: (i64, i64), next: (i64, i64)) -> u8 {
    let right = (-heading.1, heading.0);
    if next == right {
        0
    } else if next == heading {
        1
    } else if next == (heading.1, -heading.0) {
        2
    } else {
        3
    }
}

/// Drop vertices that sit in the middle of a straight run.
fn simplify(points: Vec<Vertex>) -> Vec<Vertex> {
    let n = points.len();
    if n < 4 {
        return points;
    }
    (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let here = points[i];
            let next = points[(i + 1) % n];
            let straight = (prev.x == here.x && here.x == next.x) || (prev.y == here.y && here.y == next.y);
            !straight
        })
        .map(|i| points[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::composite;
    use crate::geometry::SourceRect;

    const R: Rgba = Rgba::opaque(255, 0, 0);
    const B: Rgba = Rgba::opaque(0, 0, 255);
    const T: Rgba = Rgba::TRANSPARENT;

    fn grid(rows: &[&[Rgba]]) -> PixelGrid {
        let mut rects = Vec::new();
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.iter().enumerate() {
                if c.is_painted() {
                    rects.push(SourceRect {
                        order: rects.len() as u64,
                        x: x as u32,
                        y: y as u32,
                        width: 1,
                        height: 1,
                        color: *c,
                        opacity: 1.0,
                    });
                }
            }
        }
        composite(&rects).unwrap()
    }

    fn v(x: u32, y: u32) -> Vertex {
        Vertex { x, y }
    }

    #[test]
    fn test_single_block_is_one_clockwise_loop() {
        let paths = trace(&grid(&[&[R, R], &[R, R]]));
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].loops, vec![vec![v(0, 0), v(2, 0), v(2, 2), v(0, 2)]]);
    }

    #[test]
    fn test_checkerboard_diagonals_stay_separate() {
        let paths = trace(&grid(&[&[R, B], &[B, R]]));
        assert_eq!(paths.len(), 4);
        let reds: Vec<_> = paths.iter().filter(|p| p.color == R).collect();
        assert_eq!(reds.len(), 2);
        assert!(reds.iter().all(|p| p.bounds.width() == 1 && p.bounds.height() == 1));
    }

    #[test]
    fn test_ring_has_a_counter_clockwise_hole() {
        let paths = trace(&grid(&[&[R, R, R], &[R, T, R], &[R, R, R]]));
        assert_eq!(paths.len(), 1);
        let loops = &paths[0].loops;
        assert_eq!(loops.len(), 2);
        assert_eq!(loops[0], vec![v(0, 0), v(3, 0), v(3, 3), v(0, 3)]);
        assert_eq!(loops[1], vec![v(1, 1), v(1, 2), v(2, 2), v(2, 1)]);
    }

    #[test]
    fn test_components_sorted_by_bounding_box() {
        let paths = trace(&grid(&[&[T, B], &[R, B]]));
        assert_eq!(paths[0].color, B);
        assert_eq!(paths[1].color, R);
    }

    #[test]
    fn test_corner_touching_hole_is_fill_correct() {
        // The hole touches the outer edge only at a corner.
        let g = grid(&[&[R, R, R], &[R, T, R], &[R, R, T]]);
        let paths = trace(&g);
        assert_eq!(paths.len(), 1);
        let total: usize = paths[0].loops.iter().map(|l| l.len()).sum();
        assert!(total >= 4);
        for lp in &paths[0].loops {
            for w in lp.windows(2) {
                assert!(w[0].x == w[1].x || w[0].y == w[1].y);
            }
        }
    }
}
