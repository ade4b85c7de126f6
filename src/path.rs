//! Rectilinear SVG path data: parsing, scanline fill and serialization.
//!
//! SVG path syntax: https://www.w3.org/TR/SVG/paths.html
//!
//! Only the straight-line subset (`M L H V Z`) can describe pixel cells, so
//! curves and arcs are reported as unsupported rather than parsed.

use std::collections::BTreeMap;

use crate::geometry::{CellFrame, Vertex};
use crate::style::FillRule;

/// A parsed path command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// M/m - Move to
    MoveTo { rel: bool, x: f64, y: f64 },
    /// L/l - Line to
    LineTo { rel: bool, x: f64, y: f64 },
    /// H/h - Horizontal line to
    HorizontalTo { rel: bool, x: f64 },
    /// V/v - Vertical line to
    VerticalTo { rel: bool, y: f64 },
    /// Z/z - Close path
    ClosePath,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathError {
    /// Not valid path syntax.
    Malformed(String),
    /// Valid syntax that can't be expressed as cells (curves, arcs, diagonals).
    Unsupported(String),
}

/// Parse path data.
pub fn parse_path(d: &str) -> Result<Vec<Command>, PathError> {
    PathParser::new(d).parse()
}

/// Resolve commands into closed subpaths of absolute points.
///
/// Every subpath is implicitly closed for filling, whether or not it ends in Z.
pub fn subpaths(commands: &[Command]) -> Vec<Vec<(f64, f64)>> {
    let mut out: Vec<Vec<(f64, f64)>> = Vec::new();
    let mut current: Vec<(f64, f64)> = Vec::new();
    let mut pos = (0.0, 0.0);
    let mut start = (0.0, 0.0);

    for cmd in commands {
        match *cmd {
            Command::MoveTo { rel, x, y } => {
                if current.len() > 1 {
                    out.push(std::mem::take(&mut current));
                }
                current.clear();
                pos = if rel { (pos.0 + x, pos.1 + y) } else { (x, y) };
                start = pos;
                current.push(pos);
                continue;
            }
            Command::LineTo { rel, x, y } => {
                pos = if rel { (pos.0 + x, pos.1 + y) } else { (x, y) };
            }
            Command::HorizontalTo { rel, x } => {
                pos.0 = if rel { pos.0 + x } else { x };
            }
            Command::VerticalTo { rel, y } => {
                pos.1 = if rel { pos.1 + y } else { y };
            }
            Command::ClosePath => {
                if current.len() > 1 {
                    out.push(std::mem::take(&mut current));
                }
                current.clear();
                pos = start;
                current.push(pos);
                continue;
            }
        }
        if current.is_empty() {
            current.push(start);
        }
        current.push(pos);
    }

    if current.len() > 1 {
        out.push(current);
    }
    out
}

/// One painted horizontal span `[x0, x1)` on row `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub y: i64,
    pub x0: i64,
    pub x1: i64,
}

/// Fill closed rectilinear polygons on the integer lattice. Fails if any edge
/// (including the implicit closing edge) is diagonal.
pub fn fill_polygons(polygons: &[Vec<(i64, i64)>], rule: FillRule) -> Result<Vec<Span>, PathError> {
    // Row -> crossings of vertical edges as (x, winding delta).
    let mut rows: BTreeMap<i64, Vec<(i64, i32)>> = BTreeMap::new();

    for poly in polygons {
        let n = poly.len();
        for i in 0..n {
            let (ax, ay) = poly[i];
            let (bx, by) = poly[(i + 1) % n];
            if ax == bx {
                if ay == by {
                    continue;
                }
                let (lo, hi, dir) = if by > ay { (ay, by, 1) } else { (by, ay, -1) };
                for y in lo..hi {
                    rows.entry(y).or_default().push((ax, dir));
                }
            } else if ay != by {
                return Err(PathError::Unsupported(format!(
                    "diagonal segment ({}, {}) -> ({}, {})",
                    ax, ay, bx, by
                )));
            }
        }
    }

    let mut spans = Vec::new();
    for (y, mut crossings) in rows {
        crossings.sort_unstable();
        let mut winding = 0i32;
        let mut open_at = 0i64;
        let mut i = 0;
        while i < crossings.len() {
            let x = crossings[i].0;
            let before = winding;
            while i < crossings.len() && crossings[i].0 == x {
                winding += crossings[i].1;
                i += 1;
            }
            let (was_in, is_in) = match rule {
                FillRule::NonZero => (before != 0, winding != 0),
                FillRule::EvenOdd => (before % 2 != 0, winding % 2 != 0),
            };
            if !was_in && is_in {
                open_at = x;
            } else if was_in && !is_in && x > open_at {
                spans.push(Span { y, x0: open_at, x1: x });
            }
        }
    }
    Ok(spans)
}

/// Serialize traced loops as compact path data: an absolute move per loop,
/// then relative `h`/`v` steps, then `z`.
pub fn serialize_loops(loops: &[Vec<Vertex>], frame: &CellFrame, precision: u8) -> String {
    let scale = frame.size;
    let mut out = String::new();
    for lp in loops {
        let Some(first) = lp.first() else {
            continue;
        };
        out.push('M');
        out.push_str(&format_number(frame.user_x(first.x), precision));
        out.push(' ');
        out.push_str(&format_number(frame.user_y(first.y), precision));

        let mut prev = *first;
        for v in &lp[1..] {
            if v.y == prev.y {
                out.push('h');
                out.push_str(&format_number(
                    (v.x as f64 - prev.x as f64) * scale,
                    precision,
                ));
            } else {
                out.push('v');
                out.push_str(&format_number(
                    (v.y as f64 - prev.y as f64) * scale,
                    precision,
                ));
            }
            prev = *v;
        }
        out.push('z');
    }
    out
}

/// Format a number with the given precision, removing unnecessary zeros.
pub fn format_number(n: f64, precision: u8) -> String {
    if n == 0.0 {
        return "0".into();
    }

    // Round to precision
    let factor = 10f64.powi(precision as i32);
    let rounded = (n * factor).round() / factor;

    // Check if it's an integer
    if rounded.fract() == 0.0 {
        return format!("{}", rounded as i64);
    }

    let mut buf = ryu::Buffer::new();
    let s = buf.format_finite(rounded);

    // Remove leading zero before decimal: 0.5 -> .5
    if let Some(rest) = s.strip_prefix("0.") {
        format!(".{}", rest)
    } else if let Some(rest) = s.strip_prefix("-0.") {
        format!("-.{}", rest)
    } else {
        s.to_string()
    }
}

struct PathParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> PathParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(&mut self) -> Result<Vec<Command>, PathError> {
        let mut commands = Vec::new();
        let mut last_cmd: Option<char> = None;

        self.skip_whitespace();

        while !self.is_eof() {
            let cmd = if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                let c = self.next().unwrap_or_default();
                last_cmd = Some(c);
                c
            } else {
                // Implicit command - repeat last command
                // After M, implicit command is L; after m, it's l
                match last_cmd {
                    Some('M') => 'L',
                    Some('m') => 'l',
                    Some('Z' | 'z') | None => {
                        return Err(PathError::Malformed("expected command letter".into()));
                    }
                    Some(c) => c,
                }
            };

            commands.push(self.parse_command(cmd)?);
            self.skip_whitespace_and_comma();
        }

        Ok(commands)
    }

    fn parse_command(&mut self, cmd: char) -> Result<Command, PathError> {
        let rel = cmd.is_ascii_lowercase();

        match cmd.to_ascii_lowercase() {
            'm' => {
                let x = self.parse_number()?;
                let y = self.parse_number()?;
                Ok(Command::MoveTo { rel, x, y })
            }
            'l' => {
                let x = self.parse_number()?;
                let y = self.parse_number()?;
                Ok(Command::LineTo { rel, x, y })
            }
            'h' => {
                let x = self.parse_number()?;
                Ok(Command::HorizontalTo { rel, x })
            }
            'v' => {
                let y = self.parse_number()?;
                Ok(Command::VerticalTo { rel, y })
            }
            'z' => Ok(Command::ClosePath),
            'c' | 's' | 'q' | 't' | 'a' => Err(PathError::Unsupported(format!(
                "curve command '{}'",
                cmd
            ))),
            _ => Err(PathError::Malformed(format!("unknown command: {}", cmd))),
        }
    }

    fn parse_number(&mut self) -> Result<f64, PathError> {
        self.skip_whitespace_and_comma();

        let start = self.pos;

        // Optional sign
        if matches!(self.peek(), Some('-' | '+')) {
            self.next();
        }

        // Integer part
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.next();
        }

        // Decimal part
        if self.peek() == Some('.') {
            self.next();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.next();
            }
        }

        // Exponent
        if matches!(self.peek(), Some('e' | 'E')) {
            self.next();
            if matches!(self.peek(), Some('-' | '+')) {
                self.next();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.next();
            }
        }

        let s = &self.input[start..self.pos];
        if s.is_empty() {
            return Err(PathError::Malformed("expected number".into()));
        }

        s.parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
            .ok_or_else(|| PathError::Malformed(format!("invalid number: {}", s)))
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.next();
        }
    }

    fn skip_whitespace_and_comma(&mut self) {
        self.skip_whitespace();
        if self.peek() == Some(',') {
            self.next();
        }
        self.skip_whitespace();
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_path() {
        let path = parse_path("M10 20 L30 20 V40 H10 Z").unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(path[4], Command::ClosePath);
    }

    #[test]
    fn test_parse_implicit_lineto() {
        let path = parse_path("m10,20 30 0").unwrap();
        assert_eq!(path.len(), 2);
        assert!(matches!(path[1], Command::LineTo { rel: true, .. }));
    }

    #[test]
    fn test_curves_are_unsupported() {
        assert!(matches!(
            parse_path("M0 0 C1 1 2 2 3 3"),
            Err(PathError::Unsupported(_))
        ));
        assert!(matches!(parse_path("M0 0 X1"), Err(PathError::Malformed(_))));
        assert!(matches!(parse_path("M0"), Err(PathError::Malformed(_))));
    }

    #[test]
    fn test_subpaths_resolve_relative_moves() {
        let cmds = parse_path("M0 0h2v1h-2zm0 2h1v1h-1z").unwrap();
        let subs = subpaths(&cmds);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0], vec![(0.0, 0.0), (2.0, 0.0), (2.0, 1.0), (0.0, 1.0)]);
        assert_eq!(subs[1][0], (0.0, 2.0));
    }

    #[test]
    fn test_fill_square_with_hole() {
        // 3x3 clockwise outer, 1x1 counter-clockwise hole in the middle.
        let outer = vec![(0, 0), (3, 0), (3, 3), (0, 3)];
        let hole = vec![(1, 1), (1, 2), (2, 2), (2, 1)];
        let spans = fill_polygons(&[outer, hole], FillRule::NonZero).unwrap();
        assert_eq!(
            spans,
            vec![
                Span { y: 0, x0: 0, x1: 3 },
                Span { y: 1, x0: 0, x1: 1 },
                Span { y: 1, x0: 2, x1: 3 },
                Span { y: 2, x0: 0, x1: 3 },
            ]
        );
    }

    #[test]
    fn test_fill_same_winding_overlap_stays_filled() {
        let a = vec![(0, 0), (2, 0), (2, 1), (0, 1)];
        let b = vec![(1, 0), (3, 0), (3, 1), (1, 1)];
        let spans = fill_polygons(&[a, b], FillRule::NonZero).unwrap();
        assert_eq!(spans, vec![Span { y: 0, x0: 0, x1: 3 }]);
    }

    #[test]
    fn test_fill_even_odd_overlap_is_empty() {
        let a = vec![(0, 0), (2, 0), (2, 1), (0, 1)];
        let b = vec![(1, 0), (3, 0), (3, 1), (1, 1)];
        let spans = fill_polygons(&[a, b], FillRule::EvenOdd).unwrap();
        assert_eq!(
            spans,
            vec![Span { y: 0, x0: 0, x1: 1 }, Span { y: 0, x0: 2, x1: 3 }]
        );
    }

    #[test]
    fn test_fill_rejects_diagonal() {
        let tri = vec![(0, 0), (2, 0), (0, 2)];
        assert!(matches!(fill_polygons(&[tri], FillRule::NonZero), Err(PathError::Unsupported(_))));
    }

    #[test]
    fn test_serialize_loops() {
        let square = vec![
            Vertex { x: 1, y: 0 },
            Vertex { x: 3, y: 0 },
            Vertex { x: 3, y: 1 },
            Vertex { x: 1, y: 1 },
        ];
        assert_eq!(serialize_loops(&[square.clone()], &CellFrame::new(1.0), 3), "M1 0h2v1h-2z");
        assert_eq!(serialize_loops(&[square.clone()], &CellFrame::new(0.5), 3), "M.5 0h1v.5h-1z");

        let shifted = CellFrame {
            size: 1.0,
            origin_x: -4,
            origin_y: -1,
        };
        assert_eq!(serialize_loops(&[square], &shifted, 3), "M-3 -1h2v1h-2z");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0.0, 2), "0");
        assert_eq!(format_number(1.0, 2), "1");
        assert_eq!(format_number(1.5, 2), "1.5");
        assert_eq!(format_number(0.5, 2), ".5");
        assert_eq!(format_number(-0.5, 2), "-.5");
        assert_eq!(format_number(1.234, 2), "1.23");
        assert_eq!(format_number(0.50196, 4), ".502");
    }
}
