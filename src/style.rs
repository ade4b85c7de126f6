//! Paint resolution: presentation attributes, `style=""`, inheritance and the
//! default table.
//!
//! Every attribute the extractor reads is resolved here, and every missing
//! value comes from [`Defaults`]; nothing else in the crate invents defaults.

use csscolorparser::Color;

use crate::ast::Element;
use crate::geometry::Rgba;
use crate::transform::{Transform, TransformError, parse_transform};

/// The documented fallbacks for attributes a rect leaves out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Defaults {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub fill: Rgba,
    pub fill_opacity: f64,
    pub opacity: f64,
    pub color: Rgba,
    pub stroke_width: f64,
    pub stroke_opacity: f64,
}

pub const DEFAULTS: Defaults = Defaults {
    x: 0.0,
    y: 0.0,
    width: 1.0,
    height: 1.0,
    fill: Rgba::BLACK,
    fill_opacity: 1.0,
    opacity: 1.0,
    color: Rgba::BLACK,
    stroke_width: 1.0,
    stroke_opacity: 1.0,
};

/// What a `fill` resolves to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Paint {
    None,
    Color(Rgba),
    CurrentColor,
    /// `url(#...)` and friends: gradients and patterns.
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    NonZero,
    EvenOdd,
}

/// Inherited paint state at some point in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintContext {
    pub fill: Paint,
    pub fill_opacity: f64,
    pub color: Rgba,
    /// Product of `opacity` on every ancestor.
    pub group_opacity: f64,
    pub fill_rule: FillRule,
    pub stroke: Paint,
    pub stroke_width: f64,
    pub stroke_opacity: f64,
    pub transform: Transform,
    /// `display: none` here or on an ancestor; nothing below paints.
    pub display_none: bool,
    pub visible: bool,
}

impl Default for PaintContext {
    fn default() -> Self {
        Self {
            fill: Paint::Color(DEFAULTS.fill),
            fill_opacity: DEFAULTS.fill_opacity,
            color: DEFAULTS.color,
            group_opacity: DEFAULTS.opacity,
            fill_rule: FillRule::NonZero,
            stroke: Paint::None,
            stroke_width: DEFAULTS.stroke_width,
            stroke_opacity: DEFAULTS.stroke_opacity,
            transform: Transform::IDENTITY,
            display_none: false,
            visible: true,
        }
    }
}

/// A value that couldn't be understood, and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleError {
    Invalid { attr: String, value: String },
    Transform(TransformError),
}

impl PaintContext {
    /// The context seen by `elem`'s own paint and its children.
    pub fn child(&self, elem: &Element) -> Result<PaintContext, StyleError> {
        let props = Properties::of(elem);
        let mut ctx = self.clone();

        if let Some(v) = props.get("color")
            && !is_inherit(v)
        {
            match parse_paint(v) {
                Some(Paint::Color(c)) => ctx.color = c,
                Some(_) => {}
                None => return Err(invalid("color", v)),
            }
        }

        if let Some(v) = props.get("fill")
            && !is_inherit(v)
        {
            ctx.fill = parse_paint(v).ok_or_else(|| invalid("fill", v))?;
            // currentColor binds to the color in effect where it is declared.
            if ctx.fill == Paint::CurrentColor {
                ctx.fill = Paint::Color(ctx.color);
            }
        }

        if let Some(v) = props.get("fill-opacity")
            && !is_inherit(v)
        {
            ctx.fill_opacity = parse_opacity(v).ok_or_else(|| invalid("fill-opacity", v))?;
        }

        match props.get("fill-rule") {
            Some("evenodd") => ctx.fill_rule = FillRule::EvenOdd,
            Some("nonzero") => ctx.fill_rule = FillRule::NonZero,
            _ => {}
        }

        if let Some(v) = props.get("stroke")
            && !is_inherit(v)
        {
            ctx.stroke = parse_paint(v).ok_or_else(|| invalid("stroke", v))?;
            if ctx.stroke == Paint::CurrentColor {
                ctx.stroke = Paint::Color(ctx.color);
            }
        }

        if let Some(v) = props.get("stroke-width")
            && !is_inherit(v)
        {
            ctx.stroke_width = parse_stroke_width(v).ok_or_else(|| invalid("stroke-width", v))?;
        }

        if let Some(v) = props.get("stroke-opacity")
            && !is_inherit(v)
        {
            ctx.stroke_opacity = parse_opacity(v).ok_or_else(|| invalid("stroke-opacity", v))?;
        }

        if let Some(v) = props.get("opacity") {
            ctx.group_opacity *= parse_opacity(v).ok_or_else(|| invalid("opacity", v))?;
        }

        if let Some(v) = elem.get_attr("transform") {
            let t = parse_transform(v).map_err(StyleError::Transform)?;
            ctx.transform = ctx.transform.then(&t);
        }

        if matches!(props.get("display"), Some("none")) {
            ctx.display_none = true;
        }
        match props.get("visibility") {
            Some("hidden" | "collapse") => ctx.visible = false,
            // Unlike display, a descendant can turn visibility back on.
            Some("visible") => ctx.visible = true,
            _ => {}
        }

        Ok(ctx)
    }

    /// The total opacity applied to this element's fill.
    pub fn fill_alpha_factor(&self) -> f64 {
        self.fill_opacity * self.group_opacity
    }

    /// Whether a shape here would draw a visible outline.
    pub fn paints_stroke(&self) -> bool {
        let painted = match self.stroke {
            Paint::None => false,
            Paint::Color(c) => c.is_painted(),
            Paint::CurrentColor | Paint::Server => true,
        };
        painted && self.stroke_width > 0.0 && self.stroke_opacity * self.group_opacity > 0.0
    }
}

fn invalid(attr: &str, value: &str) -> StyleError {
    StyleError::Invalid {
        attr: attr.to_string(),
        value: value.to_string(),
    }
}

fn is_inherit(v: &str) -> bool {
    v.trim() == "inherit"
}

/// Presentation attributes overlaid with `style` declarations.
struct Properties<'a> {
    elem: &'a Element,
    style: Vec<(&'a str, &'a str)>,
}

impl<'a> Properties<'a> {
    fn of(elem: &'a Element) -> Self {
        let style = elem.get_attr("style").map(parse_style).unwrap_or_default();
        Self { elem, style }
    }

    fn get(&self, name: &str) -> Option<&'a str> {
        // Later declarations win inside a style attribute.
        self.style
            .iter()
            .rev()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
            .or_else(|| self.elem.get_attr(name))
            .map(str::trim)
    }
}

/// Split a `style` attribute into `(property, value)` pairs.
pub fn parse_style(style: &str) -> Vec<(&str, &str)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let value = value.trim().trim_end_matches("!important").trim();
            Some((prop.trim(), value))
        })
        .filter(|(prop, _)| !prop.is_empty())
        .collect()
}

/// Parse a paint value.
pub fn parse_paint(value: &str) -> Option<Paint> {
    let value = value.trim();
    match value.to_ascii_lowercase().as_str() {
        "none" => return Some(Paint::None),
        "currentcolor" => return Some(Paint::CurrentColor),
        "transparent" => return Some(Paint::Color(Rgba::TRANSPARENT)),
        _ => {}
    }

    if value.starts_with("url(") {
        return Some(Paint::Server);
    }

    let parsed: Color = value.parse().ok()?;
    let [r, g, b, a] = parsed.to_rgba8();
    Some(Paint::Color(Rgba::new(r, g, b, a)))
}

/// Parse an opacity value into 0..=1.
///
/// Numbers above 1 are treated as a 0–255 scale, which some exporters emit.
pub fn parse_opacity(value: &str) -> Option<f64> {
    let value = value.trim();
    let op = if let Some(pct) = value.strip_suffix('%') {
        pct.trim().parse::<f64>().ok()? / 100.0
    } else {
        let op = value.parse::<f64>().ok()?;
        if op > 1.0 { op / 255.0 } else { op }
    };
    if !op.is_finite() {
        return None;
    }
    Some(op.clamp(0.0, 1.0))
}

/// Parse a geometric length in user units; only unitless and `px` values map
/// onto the pixel grid.
pub fn parse_length(value: &str) -> Option<f64> {
    let value = value.trim();
    let number = value.strip_suffix("px").unwrap_or(value).trim_end();
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a `stroke-width`. Any unit is accepted: only whether the width is
/// zero matters.
fn parse_stroke_width(value: &str) -> Option<f64> {
    let number = value.trim().trim_end_matches(|c: char| c.is_ascii_alphabetic() || c == '%');
    number.trim_end().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Attribute;

    fn elem(attrs: &[(&str, &str)]) -> Element {
        let mut e = Element::new("rect", 1);
        for (k, v) in attrs {
            e.attributes.push(Attribute::new(*k, *v));
        }
        e
    }

    #[test]
    fn test_defaults_apply() {
        let ctx = PaintContext::default().child(&elem(&[])).unwrap();
        assert_eq!(ctx.fill, Paint::Color(Rgba::BLACK));
        assert_eq!(ctx.fill_alpha_factor(), 1.0);
    }

    #[test]
    fn test_style_overrides_attribute() {
        let ctx = PaintContext::default()
            .child(&elem(&[("fill", "#00ff00"), ("style", "fill: #ff0000; opacity: .5")]))
            .unwrap();
        assert_eq!(ctx.fill, Paint::Color(Rgba::opaque(255, 0, 0)));
        assert_eq!(ctx.group_opacity, 0.5);
    }

    #[test]
    fn test_fill_inherits_and_opacity_multiplies() {
        let group = PaintContext::default()
            .child(&elem(&[("fill", "blue"), ("opacity", "0.5")]))
            .unwrap();
        let rect = group.child(&elem(&[("opacity", "0.5")])).unwrap();
        assert_eq!(rect.fill, Paint::Color(Rgba::opaque(0, 0, 255)));
        assert_eq!(rect.group_opacity, 0.25);
    }

    #[test]
    fn test_current_color() {
        let group = PaintContext::default()
            .child(&elem(&[("color", "#123456")]))
            .unwrap();
        let rect = group.child(&elem(&[("fill", "currentColor")])).unwrap();
        assert_eq!(rect.fill, Paint::Color(Rgba::opaque(0x12, 0x34, 0x56)));
    }

    #[test]
    fn test_parse_paint_forms() {
        assert_eq!(parse_paint("#f00"), Some(Paint::Color(Rgba::opaque(255, 0, 0))));
        assert_eq!(parse_paint("red"), Some(Paint::Color(Rgba::opaque(255, 0, 0))));
        assert_eq!(
            parse_paint("#ff000080"),
            Some(Paint::Color(Rgba::new(255, 0, 0, 128)))
        );
        assert_eq!(parse_paint("none"), Some(Paint::None));
        assert_eq!(parse_paint("url(#grad)"), Some(Paint::Server));
        assert_eq!(parse_paint("not-a-color"), None);
    }

    #[test]
    fn test_parse_opacity_scales() {
        assert_eq!(parse_opacity("0.25"), Some(0.25));
        assert_eq!(parse_opacity("50%"), Some(0.5));
        assert_eq!(parse_opacity("255"), Some(1.0));
        assert_eq!(parse_opacity("-1"), Some(0.0));
        assert_eq!(parse_opacity("abc"), None);
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length("10"), Some(10.0));
        assert_eq!(parse_length("10px"), Some(10.0));
        assert_eq!(parse_length("10%"), None);
        assert_eq!(parse_length("ten"), None);
    }

    #[test]
    fn test_display_and_visibility() {
        let ctx = PaintContext::default()
            .child(&elem(&[("style", "display:none")]))
            .unwrap();
        assert!(ctx.display_none);

        let hidden = PaintContext::default()
            .child(&elem(&[("visibility", "hidden")]))
            .unwrap();
        assert!(!hidden.visible);
        let shown = hidden.child(&elem(&[("visibility", "visible")])).unwrap();
        assert!(shown.visible);
    }

    #[test]
    fn test_stroke_inherits_and_resolves() {
        let plain = PaintContext::default().child(&elem(&[])).unwrap();
        assert!(!plain.paints_stroke());

        let group = PaintContext::default()
            .child(&elem(&[("stroke", "#00f")]))
            .unwrap();
        let rect = group.child(&elem(&[])).unwrap();
        assert_eq!(rect.stroke, Paint::Color(Rgba::opaque(0, 0, 255)));
        assert!(rect.paints_stroke());

        for off in [
            ("stroke-width", "0"),
            ("stroke-opacity", "0"),
            ("stroke", "none"),
            ("stroke", "transparent"),
        ] {
            assert!(!group.child(&elem(&[off])).unwrap().paints_stroke(), "{:?}", off);
        }
        assert!(group.child(&elem(&[("style", "stroke-width: 2em")])).unwrap().paints_stroke());
        assert!(group.child(&elem(&[("stroke-width", "wide")])).is_err());
    }
}
