//! Minimal SVG element tree.
//!
//! Only elements and their attributes are kept; text, comments and
//! processing instructions never paint pixels.

use crate::error::Locator;

/// A parsed SVG document.
#[derive(Debug, Clone)]
pub struct Document {
    /// The root `<svg>` element
    pub root: Element,
}

/// An SVG/XML element.
#[derive(Debug, Clone)]
pub struct Element {
    /// Element name with optional prefix (e.g., "svg", "svg:rect")
    pub name: QName,
    /// Position of this element in document order, counting from the root
    pub index: usize,
    /// Attributes on this element
    pub attributes: Vec<Attribute>,
    /// Child elements
    pub children: Vec<Element>,
}

/// A qualified name (possibly with namespace prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    /// Namespace prefix (e.g., "svg", "xlink")
    pub prefix: Option<String>,
    /// Local name (e.g., "rect", "href")
    pub local: String,
}

impl QName {
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local: local.into(),
        }
    }

    /// Parse a qualified name from a string like "prefix:local" or just "local".
    pub fn parse(s: &str) -> Self {
        if let Some((prefix, local)) = s.split_once(':') {
            Self {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
            }
        } else {
            Self::new(s)
        }
    }

    /// Get the full name as a string.
    pub fn full_name(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }
}

/// An attribute on an element.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: QName::new(name),
            value: value.into(),
        }
    }
}

impl Element {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: QName::new(name),
            index,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Get an unprefixed attribute value by local name.
    ///
    /// Prefixed attributes (`inkscape:label`, `xlink:href`) are never
    /// presentation attributes, so they are not matched.
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.prefix.is_none() && a.name.local == name)
            .map(|a| a.value.as_str())
    }

    /// Check if this element has a specific local name.
    pub fn is(&self, name: &str) -> bool {
        self.name.local == name
    }

    /// Where this element sits in the input, for error messages.
    pub fn locator(&self) -> Locator {
        Locator::Element {
            index: self.index,
            name: self.name.full_name(),
        }
    }
}

impl Document {
    /// Recursively visit all elements in document order.
    pub fn for_each_element(&self, mut f: impl FnMut(&Element)) {
        fn visit(elem: &Element, f: &mut impl FnMut(&Element)) {
            f(elem);
            for child in &elem.children {
                visit(child, f);
            }
        }
        visit(&self.root, &mut f);
    }
}
