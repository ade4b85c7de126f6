//! SVG parsing from XML.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::ast::*;
use crate::error::{CrispyError, Locator};

/// Parse an SVG string into a Document.
pub fn parse_svg(svg: &str) -> Result<Document, CrispyError> {
    let mut reader = Reader::from_str(svg);
    let mut next_index = 0usize;

    let root = loop {
        match reader.read_event()? {
            Event::Start(start) => {
                break parse_element(&mut reader, &start, &mut next_index)?;
            }
            Event::Empty(start) => {
                break element_from_start(&start, take_index(&mut next_index))?;
            }
            Event::Eof => {
                return Err(CrispyError::parse(
                    Locator::Document,
                    "no root element found",
                ));
            }
            // Declarations, DOCTYPE, comments and whitespace before the root
            _ => {}
        }
    };

    check_root(&root)?;
    Ok(Document { root })
}

/// The root must be an `<svg>` element.
pub(crate) fn check_root(root: &Element) -> Result<(), CrispyError> {
    if root.is("svg") {
        Ok(())
    } else {
        Err(CrispyError::parse(
            root.locator(),
            "root element is not <svg>",
        ))
    }
}

fn take_index(next_index: &mut usize) -> usize {
    let index = *next_index;
    *next_index += 1;
    index
}

fn parse_element(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart,
    next_index: &mut usize,
) -> Result<Element, CrispyError> {
    let mut element = element_from_start(start, take_index(next_index))?;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                element
                    .children
                    .push(parse_element(reader, &start, next_index)?);
            }
            Event::Empty(start) => {
                element
                    .children
                    .push(element_from_start(&start, take_index(next_index))?);
            }
            Event::End(_) => break,
            Event::Eof => {
                return Err(CrispyError::parse(
                    element.locator(),
                    "unexpected end of file",
                ));
            }
            _ => {}
        }
    }

    Ok(element)
}

/// Build a childless element from a start tag.
///
/// Shared with the streaming reader, which never builds a tree.
pub(crate) fn element_from_start(start: &BytesStart, index: usize) -> Result<Element, CrispyError> {
    let name_bytes = start.name();
    let name = std::str::from_utf8(name_bytes.as_ref())?;

    let mut element = Element {
        name: QName::parse(name),
        index,
        attributes: Vec::new(),
        children: Vec::new(),
    };

    for attr in start.attributes() {
        let attr = attr.map_err(|e| {
            CrispyError::parse(element.locator(), format!("invalid attribute: {}", e))
        })?;
        let key = std::str::from_utf8(attr.key.as_ref())?;
        let value = attr.unescape_value()?;
        element.attributes.push(Attribute {
            name: QName::parse(key),
            value: value.into_owned(),
        });
    }

    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_svg() {
        let svg = r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
    <rect x="10" y="10" width="80" height="80" fill="red"/>
</svg>"#;

        let doc = parse_svg(svg).unwrap();
        assert!(doc.root.is("svg"));
        assert_eq!(doc.root.get_attr("width"), Some("100"));
        assert_eq!(doc.root.children.len(), 1);
        assert_eq!(doc.root.children[0].index, 1);
    }

    #[test]
    fn test_element_indices_follow_document_order() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
    <!-- comment -->
    <g><rect/><rect/></g>
    <rect/>
</svg>"#;

        let doc = parse_svg(svg).unwrap();
        let mut seen = Vec::new();
        doc.for_each_element(|e| seen.push((e.index, e.name.local.clone())));
        assert_eq!(
            seen,
            vec![
                (0, "svg".to_string()),
                (1, "g".to_string()),
                (2, "rect".to_string()),
                (3, "rect".to_string()),
                (4, "rect".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_prefixed_elements() {
        let svg = r#"<svg:svg xmlns:svg="http://www.w3.org/2000/svg"><svg:rect width="2"/></svg:svg>"#;
        let doc = parse_svg(svg).unwrap();
        assert!(doc.root.children[0].is("rect"));
        assert_eq!(doc.root.children[0].get_attr("width"), Some("2"));
    }

    #[test]
    fn test_rejects_non_svg_root() {
        let err = parse_svg("<html/>").unwrap_err();
        assert!(matches!(err, CrispyError::Parse { .. }));
    }

    #[test]
    fn test_rejects_truncated_document() {
        assert!(parse_svg(r#"<svg xmlns="http://www.w3.org/2000/svg"><g>"#).is_err());
    }
}
