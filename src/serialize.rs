//! SVG output: one root, one crisp-edges group, minimal shapes.
//!
//! [`SvgWriter`] writes incrementally so the streaming driver can flush rects
//! as they close. Both drivers go through it, which keeps their bytes identical.

use std::io::{self, Write};

use crate::ast::Element;
use crate::geometry::{CellFrame, MergedRect, OutlinePath, Rgba};
use crate::path::{format_number, serialize_loops};

const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// Root attributes copied from the input.
const CARRIED_ROOT_ATTRS: &[&str] = &["width", "height", "viewBox", "preserveAspectRatio"];

/// Digits after the point for coordinates.
const COORD_PRECISION: u8 = 3;
/// Digits after the point for opacity; enough to recover the 8-bit alpha.
const OPACITY_PRECISION: u8 = 4;

/// Formatting switches.
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub minify: bool,
    pub sort_attrs: bool,
}

/// The attributes of the output `<svg>` element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputHeader {
    attrs: Vec<(String, String)>,
}

impl OutputHeader {
    /// Carry the sizing attributes of the input root over.
    pub fn from_root(root: &Element) -> Self {
        let attrs = root
            .attributes
            .iter()
            .filter(|a| a.name.prefix.is_none() && CARRIED_ROOT_ATTRS.contains(&a.name.local.as_str()))
            .map(|a| (a.name.local.clone(), a.value.clone()))
            .collect();
        Self { attrs }
    }
}

/// Writes the output document shape by shape.
pub struct SvgWriter<W: Write> {
    out: W,
    frame: CellFrame,
    options: WriterOptions,
    shapes: usize,
}

impl<W: Write> SvgWriter<W> {
    /// Write the prologue and open the group.
    pub fn new(mut out: W, header: &OutputHeader, frame: CellFrame, options: WriterOptions) -> io::Result<Self> {
        if !options.minify {
            out.write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n")?;
        }

        let mut attrs: Vec<(&str, String)> = vec![("xmlns", SVG_NS.to_string())];
        let mut carried: Vec<(&str, String)> = header
            .attrs
            .iter()
            .map(|(k, v)| (k.as_str(), escape_attr(v)))
            .collect();
        if options.sort_attrs {
            carried.sort_by(|a, b| a.0.cmp(b.0));
        }
        attrs.extend(carried);

        let mut svg = String::from("<svg");
        push_attrs(&mut svg, &attrs);
        svg.push('>');
        out.write_all(svg.as_bytes())?;

        let group = if options.minify {
            "<g shape-rendering=\"crispEdges\">"
        } else {
            "\n  <g shape-rendering=\"crispEdges\">"
        };
        out.write_all(group.as_bytes())?;

        Ok(Self {
            out,
            frame,
            options,
            shapes: 0,
        })
    }

    pub fn write_rect(&mut self, rect: &MergedRect) -> io::Result<()> {
        let mut attrs: Vec<(&str, String)> = Vec::with_capacity(6);
        let x = format_number(self.frame.user_x(rect.x), COORD_PRECISION);
        if x != "0" {
            attrs.push(("x", x));
        }
        let y = format_number(self.frame.user_y(rect.y), COORD_PRECISION);
        if y != "0" {
            attrs.push(("y", y));
        }
        attrs.push(("width", self.length(rect.width)));
        attrs.push(("height", self.length(rect.height)));
        push_paint(&mut attrs, rect.color);
        self.write_shape("rect", attrs)
    }

    pub fn write_path(&mut self, path: &OutlinePath) -> io::Result<()> {
        let mut attrs: Vec<(&str, String)> = Vec::with_capacity(3);
        attrs.push(("d", serialize_loops(&path.loops, &self.frame, COORD_PRECISION)));
        push_paint(&mut attrs, path.color);
        self.write_shape("path", attrs)
    }

    /// Shapes written so far.
    pub fn shape_count(&self) -> usize {
        self.shapes
    }

    /// Close the document and hand back the sink.
    pub fn finish(mut self) -> io::Result<W> {
        if self.options.minify {
            self.out.write_all(b"</g></svg>")?;
        } else {
            self.out.write_all(b"\n  </g>\n</svg>\n")?;
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_shape(&mut self, name: &str, mut attrs: Vec<(&str, String)>) -> io::Result<()> {
        if self.options.sort_attrs {
            attrs.sort_by(|a, b| a.0.cmp(b.0));
        }
        let mut s = String::with_capacity(64);
        if !self.options.minify {
            s.push_str("\n    ");
        }
        s.push('<');
        s.push_str(name);
        push_attrs(&mut s, &attrs);
        s.push_str("/>");
        self.out.write_all(s.as_bytes())?;
        self.shapes += 1;
        Ok(())
    }

    fn length(&self, cells: u32) -> String {
        format_number(cells as f64 * self.frame.size, COORD_PRECISION)
    }
}

fn push_paint(attrs: &mut Vec<(&str, String)>, color: Rgba) {
    if (color.r, color.g, color.b) != (0, 0, 0) {
        attrs.push(("fill", hex_color(color)));
    }
    if !color.is_opaque() {
        attrs.push(("opacity", opacity(color.a)));
    }
}

fn push_attrs(out: &mut String, attrs: &[(&str, String)]) {
    for (name, value) in attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(value);
        out.push('"');
    }
}

/// Shortest hex form of the RGB channels: `#rgb` when every channel repeats
/// its nibble, `#rrggbb` otherwise.
pub fn hex_color(c: Rgba) -> String {
    let short = |v: u8| v >> 4 == v & 0xf;
    if short(c.r) && short(c.g) && short(c.b) {
        format!("#{:x}{:x}{:x}", c.r & 0xf, c.g & 0xf, c.b & 0xf)
    } else {
        format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b)
    }
}

/// An 8-bit alpha as an opacity value.
pub fn opacity(alpha: u8) -> String {
    format_number(alpha as f64 / 255.0, OPACITY_PRECISION)
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("&quot;"),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
