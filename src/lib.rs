//! crispy - A pixel-art SVG optimizer
//!
//! crispy rebuilds the pixel grid a rect-based SVG actually paints, then
//! re-encodes it with as few shapes as it can: merged rectangles, or one
//! outline path per same-color region. Running it on its own output gives the
//! same output back.

mod ast;
mod compress;
mod composite;
mod error;
mod extract;
mod geometry;
mod merge;
mod optimize;
mod parse;
mod path;
mod serialize;
mod stream;
mod style;
mod trace;
mod transform;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

pub use ast::*;
pub use compress::compress;
pub use composite::{composite, source_over};
pub use error::*;
pub use extract::{Extraction, expand_to_unit_rects, extract};
pub use geometry::*;
pub use merge::{RowMerger, merge_adjacent, merge_grid};
pub use parse::parse_svg;
pub use stream::{Streamed, SvgSource, optimize_source};
pub use trace::trace;

use serialize::WriterOptions;

/// Optimize an SVG string with default settings.
pub fn optimize(svg: &str) -> Result<String, CrispyError> {
    Ok(optimize_with_options(svg, &Options::default())?.svg)
}

/// Optimize an SVG string with custom options.
///
/// Inputs longer than `streaming_threshold` bytes go through the streaming
/// driver. The output is never compressed; see [`optimize_file`] or
/// [`compress`] for svgz.
pub fn optimize_with_options(svg: &str, options: &Options) -> Result<Optimized, CrispyError> {
    options.validate()?;
    if options.should_stream(svg.len() as u64) {
        debug!("{} bytes: using the streaming driver", svg.len());
        return optimize_streamed(svg, options);
    }
    optimize::optimize_document(svg, options)
}

pub(crate) fn optimize_streamed(svg: &str, options: &Options) -> Result<Optimized, CrispyError> {
    let streamed = optimize_source(&svg.as_bytes(), options, Vec::new())?;
    let svg = String::from_utf8(streamed.out)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(Optimized {
        svg,
        shape_count: streamed.shape_count,
        notices: streamed.notices,
        streamed: true,
    })
}

/// Optimize `input` into `output`, compressing as configured.
///
/// The output file only appears once the whole run has succeeded; on error
/// nothing is written and the report carries the error.
pub fn optimize_file(input: &Path, output: &Path, options: &Options) -> RunReport {
    let mut report = RunReport {
        input_path: input.to_path_buf(),
        output_path: output.to_path_buf(),
        shape_count: 0,
        byte_size: 0,
        notices: Vec::new(),
        error: None,
    };
    if let Err(e) = run_file(input, output, options, &mut report) {
        report.error = Some(e);
    }
    report
}

fn run_file(input: &Path, output: &Path, options: &Options, report: &mut RunReport) -> Result<(), CrispyError> {
    options.validate()?;

    let size = fs::metadata(input)?.len();
    let (svg, shape_count, notices) = if options.should_stream(size) {
        debug!("{}: {} bytes, streaming", input.display(), size);
        let streamed = optimize_source(input, options, Vec::new())?;
        (streamed.out, streamed.shape_count, streamed.notices)
    } else {
        let text = fs::read_to_string(input)?;
        let optimized = optimize::optimize_document(&text, options)?;
        (optimized.svg.into_bytes(), optimized.shape_count, optimized.notices)
    };

    let bytes = compress(svg, options.compress, options.gzip_level)?;

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(output).map_err(|e| e.error)?;

    report.shape_count = shape_count;
    report.byte_size = bytes.len() as u64;
    report.notices = notices;
    Ok(())
}

/// What the optimizer produced for one input.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimized {
    pub svg: String,
    /// Number of `<rect>` or `<path>` elements emitted.
    pub shape_count: usize,
    pub notices: Vec<Notice>,
    /// Whether the streaming driver handled the input.
    pub streamed: bool,
}

/// Something the caller should know about a run that still succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Path mode was requested on a streamed input; rects were produced.
    StreamingRectFallback { reason: String },
    /// Non-representable elements were left out.
    SkippedElements { count: usize },
}

/// Per-file record for the caller to log.
#[derive(Debug)]
pub struct RunReport {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub shape_count: usize,
    /// Size of the written output, after compression.
    pub byte_size: u64,
    pub notices: Vec<Notice>,
    pub error: Option<CrispyError>,
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Output shape kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Merged rectangles
    #[default]
    Rects,
    /// One outline path per 4-connected same-color region
    Paths,
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    /// gzip via deflate (svgz)
    Gzip,
    /// gzip via zopfli: slower, smaller
    Zopfli,
}

/// A clip rectangle in user units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Optimization options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Rects or outline paths (default: rects)
    pub mode: Mode,
    /// Stack identical runs into taller rects
    pub merge_vertical: bool,
    /// Merge emitted rects that share a full edge and color
    pub merge_shapes: bool,
    /// Single-line output without XML declaration
    pub minify: bool,
    /// Sort attributes for better gzip
    pub sort_attrs: bool,
    /// Output container, used by [`optimize_file`]
    pub compress: Compression,
    /// gzip level, 1 to 9
    pub gzip_level: u32,
    /// Inputs larger than this many bytes are streamed; `None` never streams
    pub streaming_threshold: Option<u64>,
    /// Drop paint outside this rectangle
    pub canvas_clip: Option<ClipRect>,
    /// Size of one pixel in user units (default: derived from the input)
    pub pixel_size: Option<f64>,
    /// Fail on content that isn't pixel rects instead of skipping it
    pub strict: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mode: Mode::Rects,
            merge_vertical: true,
            merge_shapes: false,
            minify: true,
            sort_attrs: true,
            compress: Compression::None,
            gzip_level: 9,
            streaming_threshold: Some(32 * 1024 * 1024),
            canvas_clip: None,
            pixel_size: None,
            strict: false,
        }
    }
}

impl Options {
    /// Reject option values that can't work together.
    pub fn validate(&self) -> Result<(), CrispyError> {
        if let Some(size) = self.pixel_size
            && !(size.is_finite() && size > 0.0)
        {
            return Err(CrispyError::Configuration(format!(
                "pixel size must be a positive number, got {}",
                size
            )));
        }
        if let Some(clip) = &self.canvas_clip {
            let finite = [clip.x, clip.y, clip.width, clip.height]
                .iter()
                .all(|v| v.is_finite());
            if !finite || clip.width <= 0.0 || clip.height <= 0.0 {
                return Err(CrispyError::Configuration(format!(
                    "canvas clip must have a positive size, got {:?}",
                    clip
                )));
            }
        }
        if !(1..=9).contains(&self.gzip_level) {
            return Err(CrispyError::Configuration(format!(
                "gzip level must be between 1 and 9, got {}",
                self.gzip_level
            )));
        }
        Ok(())
    }

    /// [`Options::validate`], plus what the streaming driver can't do.
    pub fn validate_streaming(&self) -> Result<(), CrispyError> {
        self.validate()?;
        if self.mode == Mode::Paths {
            return Err(CrispyError::Configuration(
                "path mode needs the whole grid and can't be streamed".into(),
            ));
        }
        Ok(())
    }

    fn should_stream(&self, input_len: u64) -> bool {
        self.streaming_threshold.is_some_and(|t| input_len > t)
    }

    fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            minify: self.minify,
            sort_attrs: self.sort_attrs,
        }
    }
}
