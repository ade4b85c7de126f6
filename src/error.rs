use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrispyError {
    #[error("parse error at {at}: {message}")]
    Parse { at: Locator, message: String },

    #[error("unsupported content at {at}: {message}")]
    UnsupportedContent { at: Locator, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where in the input a problem was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// The document as a whole (malformed XML, missing root, ...).
    Document,
    /// The `index`-th element in document order (0 is the root).
    Element { index: usize, name: String },
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Document => f.write_str("document"),
            Locator::Element { index, name } => write!(f, "element #{} <{}>", index, name),
        }
    }
}

impl CrispyError {
    pub(crate) fn parse(at: Locator, message: impl Into<String>) -> Self {
        CrispyError::Parse {
            at,
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(at: Locator, message: impl Into<String>) -> Self {
        CrispyError::UnsupportedContent {
            at,
            message: message.into(),
        }
    }
}

impl From<quick_xml::Error> for CrispyError {
    fn from(e: quick_xml::Error) -> Self {
        match e {
            // Read failures from the underlying source are not parse errors.
            quick_xml::Error::Io(io) => {
                CrispyError::Io(std::io::Error::new(io.kind(), io.to_string()))
            }
            other => CrispyError::parse(Locator::Document, other.to_string()),
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for CrispyError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        CrispyError::parse(Locator::Document, format!("invalid attribute: {}", e))
    }
}

impl From<std::str::Utf8Error> for CrispyError {
    fn from(e: std::str::Utf8Error) -> Self {
        CrispyError::parse(Locator::Document, format!("invalid UTF-8: {}", e))
    }
}
