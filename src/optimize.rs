//! The full-grid driver: parse, extract, composite, then merge or trace.

use std::io;

use log::debug;

use crate::composite::{MAX_GRID_CELLS, bounds_of, composite};
use crate::error::CrispyError;
use crate::extract::extract;
use crate::merge::{merge_adjacent, merge_grid};
use crate::parse::parse_svg;
use crate::serialize::{OutputHeader, SvgWriter};
use crate::trace::trace;
use crate::{Mode, Notice, Optimized, Options, optimize_streamed};

/// Optimize a whole document in memory.
///
/// In rect mode, a document whose pixel grid is too large to allocate goes
/// through the streaming driver instead, which only holds a window of rows.
pub fn optimize_document(svg: &str, options: &Options) -> Result<Optimized, CrispyError> {
    let doc = parse_svg(svg)?;
    let extraction = extract(
        &doc,
        options.strict,
        options.pixel_size,
        options.canvas_clip.as_ref(),
    )?;

    if options.mode == Mode::Rects
        && let Some(bounds) = bounds_of(&extraction.rects)
        && bounds.area() > MAX_GRID_CELLS
    {
        debug!(
            "{}x{} grid is too large to hold, streaming instead",
            bounds.width(),
            bounds.height()
        );
        return optimize_streamed(svg, options);
    }

    let grid = composite(&extraction.rects)?;
    debug!(
        "{} painting elements -> {} painted cells",
        extraction.source_count,
        grid.painted_count()
    );

    let header = OutputHeader::from_root(&doc.root);
    let mut writer = SvgWriter::new(
        Vec::new(),
        &header,
        extraction.frame,
        options.writer_options(),
    )?;

    match options.mode {
        Mode::Rects => {
            let mut rects = merge_grid(&grid, options.merge_vertical);
            if options.merge_shapes {
                rects = merge_adjacent(rects);
            }
            for rect in &rects {
                writer.write_rect(rect)?;
            }
        }
        Mode::Paths => {
            for path in trace(&grid) {
                writer.write_path(&path)?;
            }
        }
    }

    let shape_count = writer.shape_count();
    let bytes = writer.finish()?;
    let svg = String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let mut notices = Vec::new();
    if extraction.skipped > 0 {
        notices.push(Notice::SkippedElements {
            count: extraction.skipped,
        });
    }

    Ok(Optimized {
        svg,
        shape_count,
        notices,
        streamed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(svg: &str, options: &Options) -> Optimized {
        optimize_document(svg, options).unwrap()
    }

    #[test]
    fn test_two_by_one_block() {
        let out = run(
            r##"<svg xmlns="http://www.w3.org/2000/svg"><rect width="2" height="1" fill="#ff0000"/></svg>"##,
            &Options::default(),
        );
        assert_eq!(out.shape_count, 1);
        assert_eq!(
            out.svg,
            r##"<svg xmlns="http://www.w3.org/2000/svg"><g shape-rendering="crispEdges"><rect fill="#f00" height="1" width="2"/></g></svg>"##
        );
    }

    #[test]
    fn test_paths_mode_outputs_paths() {
        let out = run(
            r##"<svg xmlns="http://www.w3.org/2000/svg"><rect width="2" height="2" fill="#00f"/></svg>"##,
            &Options {
                mode: Mode::Paths,
                ..Options::default()
            },
        );
        assert!(out.svg.contains(r##"<path d="M0 0h2v2h-2z" fill="#00f"/>"##));
    }

    #[test]
    fn test_merge_shapes_joins_horizontal_only_rows() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="2" height="2"/></svg>"#;
        let split = run(
            svg,
            &Options {
                merge_vertical: false,
                pixel_size: Some(1.0),
                ..Options::default()
            },
        );
        assert_eq!(split.shape_count, 2);
        let joined = run(
            svg,
            &Options {
                merge_vertical: false,
                merge_shapes: true,
                pixel_size: Some(1.0),
                ..Options::default()
            },
        );
        assert_eq!(joined.shape_count, 1);
    }

    #[test]
    fn test_skipped_content_is_reported() {
        let out = run(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><circle r="1"/><ellipse/><rect/></svg>"#,
            &Options::default(),
        );
        assert_eq!(out.notices, vec![Notice::SkippedElements { count: 2 }]);
    }

    #[test]
    fn test_sparse_grid_too_large_to_hold_is_streamed() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><rect/><rect x="20000" y="20000"/></svg>"#;
        let out = run(svg, &Options::default());
        assert!(out.streamed);
        assert_eq!(
            out.svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg"><g shape-rendering="crispEdges"><rect height="1" width="1"/><rect height="1" width="1" x="20000" y="20000"/></g></svg>"#
        );

        let paths = optimize_document(
            svg,
            &Options {
                mode: Mode::Paths,
                ..Options::default()
            },
        );
        assert!(matches!(paths, Err(CrispyError::UnsupportedContent { .. })));
    }
}
