//! Axis-aligned `transform` attribute support.
//!
//! Pixel art only survives transforms that map axis-aligned rectangles onto
//! axis-aligned rectangles, so this is `x' = sx*x + tx`, `y' = sy*y + ty`.

/// An axis-aligned affine transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub sx: f64,
    pub sy: f64,
    pub tx: f64,
    pub ty: f64,
}

/// Why a transform list could not be used.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Not valid transform syntax.
    Malformed(String),
    /// Valid, but it rotates or skews.
    NotAxisAligned(String),
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        sx: 1.0,
        sy: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            sx,
            sy,
            ..Self::IDENTITY
        }
    }

    /// `self` applied after `inner`: `self(inner(p))`.
    pub fn then(&self, inner: &Transform) -> Transform {
        Transform {
            sx: self.sx * inner.sx,
            sy: self.sy * inner.sy,
            tx: self.sx * inner.tx + self.tx,
            ty: self.sy * inner.ty + self.ty,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (self.sx * x + self.tx, self.sy * y + self.ty)
    }

    /// Map a rectangle, normalizing so width and height stay positive.
    pub fn apply_rect(&self, x: f64, y: f64, w: f64, h: f64) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.apply(x, y);
        let (x1, y1) = self.apply(x + w, y + h);
        (x0.min(x1), y0.min(y1), (x1 - x0).abs(), (y1 - y0).abs())
    }

    /// Collapses to a point or line, so nothing under it can paint.
    pub fn is_degenerate(&self) -> bool {
        self.sx == 0.0 || self.sy == 0.0
    }
}

/// Parse an SVG transform list such as `translate(10 5) scale(2)`.
pub fn parse_transform(s: &str) -> Result<Transform, TransformError> {
    let mut result = Transform::IDENTITY;
    let mut rest = s.trim();

    while !rest.is_empty() {
        let open = rest
            .find('(')
            .ok_or_else(|| TransformError::Malformed(format!("expected '(' in {:?}", s)))?;
        let close = rest[open..]
            .find(')')
            .map(|i| i + open)
            .ok_or_else(|| TransformError::Malformed(format!("expected ')' in {:?}", s)))?;

        let name = rest[..open].trim();
        let args = parse_args(&rest[open + 1..close])
            .ok_or_else(|| TransformError::Malformed(format!("bad arguments in {:?}", s)))?;

        let step = transform_function(name, &args)?;
        // Later functions in the list apply first.
        result = result.then(&step);

        rest = rest[close + 1..].trim_start_matches(|c: char| c.is_ascii_whitespace() || c == ',');
    }

    Ok(result)
}

fn transform_function(name: &str, args: &[f64]) -> Result<Transform, TransformError> {
    let bad_arity = || TransformError::Malformed(format!("wrong argument count for {}()", name));

    match (name, args) {
        ("translate", [tx]) => Ok(Transform::translate(*tx, 0.0)),
        ("translate", [tx, ty]) => Ok(Transform::translate(*tx, *ty)),
        ("scale", [s]) => Ok(Transform::scale(*s, *s)),
        ("scale", [sx, sy]) => Ok(Transform::scale(*sx, *sy)),
        ("matrix", [a, b, c, d, e, f]) => {
            if *b != 0.0 || *c != 0.0 {
                return Err(TransformError::NotAxisAligned(format!(
                    "matrix({} {} {} {} {} {})",
                    a, b, c, d, e, f
                )));
            }
            Ok(Transform {
                sx: *a,
                sy: *d,
                tx: *e,
                ty: *f,
            })
        }
        ("rotate", [angle, ..]) if args.len() == 1 || args.len() == 3 => {
            if angle.rem_euclid(360.0) == 0.0 {
                Ok(Transform::IDENTITY)
            } else {
                Err(TransformError::NotAxisAligned(format!("rotate({})", angle)))
            }
        }
        ("skewX" | "skewY", [angle]) => {
            if angle.rem_euclid(180.0) == 0.0 {
                Ok(Transform::IDENTITY)
            } else {
                Err(TransformError::NotAxisAligned(format!("{}({})", name, angle)))
            }
        }
        ("translate" | "scale" | "matrix" | "rotate" | "skewX" | "skewY", _) => Err(bad_arity()),
        _ => Err(TransformError::Malformed(format!(
            "unknown transform function {:?}",
            name
        ))),
    }
}

fn parse_args(s: &str) -> Option<Vec<f64>> {
    s.split(|c: char| c.is_ascii_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect()
}
