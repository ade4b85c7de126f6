//! Bounded-memory driver for very large inputs.
//!
//! The source is read three times and never turned into a tree:
//!
//! 1. derive the cell frame: pixel size (unless one is given) and origin,
//! 2. map every paint to cells and record, per row, the last paint that
//!    touches it,
//! 3. paint again into a window of rows. A row leaves the window as soon as
//!    its last paint has been applied and every row above it has left; it then
//!    goes through the same [`RowMerger`] the full driver uses.
//!
//! Closed rects are written in `(y, x)` order as soon as no open or future
//! rect can sort before them, so the output matches the full driver byte for
//! byte.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use log::debug;
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::ast::Element;
use crate::composite::source_over;
use crate::error::{CrispyError, Locator};
use crate::extract::{CellMapper, CellSizer, Flattener};
use crate::geometry::{Bounds, CellFrame, MergedRect, Rgba, SourceRect};
use crate::merge::{RowMerger, merge_adjacent};
use crate::parse::{check_root, element_from_start};
use crate::serialize::{OutputHeader, SvgWriter};
use crate::{Notice, Options};

/// Widest row the window will allocate, in cells.
const MAX_ROW_CELLS: u32 = 1 << 28;

/// Input that can be read from the start more than once.
pub trait SvgSource {
    type Reader: BufRead;

    fn open(&self) -> io::Result<Self::Reader>;
}

impl<'a> SvgSource for &'a [u8] {
    type Reader = &'a [u8];

    fn open(&self) -> io::Result<Self::Reader> {
        Ok(*self)
    }
}

impl SvgSource for Path {
    type Reader = BufReader<File>;

    fn open(&self) -> io::Result<Self::Reader> {
        Ok(BufReader::new(File::open(self)?))
    }
}

/// Result of a streaming run.
#[derive(Debug)]
pub struct Streamed<W> {
    pub out: W,
    pub shape_count: usize,
    pub notices: Vec<Notice>,
}

enum Visit<'a> {
    Enter(&'a Element),
    Leave,
}

enum Step {
    Open(Element, bool),
    Close,
    Eof,
    Skip,
}

/// Read elements in document order without building a tree.
fn walk<R: BufRead>(
    source: R,
    mut visit: impl FnMut(Visit<'_>) -> Result<(), CrispyError>,
) -> Result<(), CrispyError> {
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut next_index = 0usize;
    let mut depth = 0usize;
    let mut last: Option<Locator> = None;

    loop {
        let step = match reader.read_event_into(&mut buf)? {
            Event::Start(start) => Step::Open(element_from_start(&start, next_index)?, false),
            Event::Empty(start) => Step::Open(element_from_start(&start, next_index)?, true),
            Event::End(_) => Step::Close,
            Event::Eof => Step::Eof,
            _ => Step::Skip,
        };
        buf.clear();

        match step {
            Step::Open(elem, empty) => {
                next_index += 1;
                if next_index == 1 {
                    check_root(&elem)?;
                }
                last = Some(elem.locator());
                visit(Visit::Enter(&elem))?;
                if empty {
                    visit(Visit::Leave)?;
                } else {
                    depth += 1;
                }
            }
            Step::Close => {
                depth = depth.saturating_sub(1);
                visit(Visit::Leave)?;
            }
            Step::Eof => {
                return match (depth, last) {
                    (0, Some(_)) => Ok(()),
                    (0, None) => Err(CrispyError::parse(Locator::Document, "no root element found")),
                    (_, Some(at)) => Err(CrispyError::parse(at, "unexpected end of file")),
                    (_, None) => Err(CrispyError::parse(Locator::Document, "unexpected end of file")),
                };
            }
            Step::Skip => {}
        }
    }
}

/// Pass 1: the cell frame.
fn scan_frame<S: SvgSource + ?Sized>(source: &S, options: &Options) -> Result<CellFrame, CrispyError> {
    let mut flattener = Flattener::new(options.strict);
    let mut sizer = CellSizer::new();
    walk(source.open()?, |visit| {
        match visit {
            Visit::Enter(elem) => {
                if let Some(paint) = flattener.enter(elem)? {
                    sizer.observe(&paint);
                }
            }
            Visit::Leave => flattener.leave(),
        }
        Ok(())
    })?;
    let size = options.pixel_size.unwrap_or_else(|| sizer.cell_size());
    Ok(sizer.frame(size, options.canvas_clip.as_ref()))
}

struct Layout {
    header: OutputHeader,
    bounds: Option<Bounds>,
    /// Row -> order of the last paint touching it.
    last_touch: BTreeMap<u32, u64>,
    skipped: usize,
}

/// Pass 2: where paint lands, and when each row is final.
fn scan_layout<S: SvgSource + ?Sized>(source: &S, strict: bool, mapper: &CellMapper) -> Result<Layout, CrispyError> {
    let mut flattener = Flattener::new(strict);
    let mut header = None;
    let mut bounds: Option<Bounds> = None;
    let mut last_touch = BTreeMap::new();
    let mut scratch = Vec::new();

    walk(source.open()?, |visit| {
        match visit {
            Visit::Enter(elem) => {
                if header.is_none() {
                    header = Some(OutputHeader::from_root(elem));
                }
                if let Some(paint) = flattener.enter(elem)? {
                    scratch.clear();
                    mapper.map(&paint, &mut scratch)?;
                    for rect in &scratch {
                        let b = Bounds::of_rect(rect);
                        match bounds.as_mut() {
                            Some(bounds) => bounds.include(&b),
                            None => bounds = Some(b),
                        }
                        for y in rect.y..rect.bottom() {
                            last_touch.insert(y, paint.order);
                        }
                    }
                }
            }
            Visit::Leave => flattener.leave(),
        }
        Ok(())
    })?;

    Ok(Layout {
        header: header.unwrap_or_default(),
        bounds,
        last_touch,
        skipped: flattener.skipped(),
    })
}

/// Writes closed rects in `(y, x)` order.
struct RectSink<W: Write> {
    writer: SvgWriter<W>,
    pending: BTreeMap<(u32, u32), MergedRect>,
    /// Hold everything until the end, for the adjacent-shape pass.
    hold_all: bool,
}

impl<W: Write> RectSink<W> {
    fn push(&mut self, rect: MergedRect) {
        self.pending.insert(rect.origin_key(), rect);
    }

    /// Write every pending rect whose origin sorts before `limit`.
    fn release_before(&mut self, limit: (u32, u32)) -> io::Result<()> {
        if self.hold_all {
            return Ok(());
        }
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() >= limit {
                break;
            }
            let rect = entry.remove();
            self.writer.write_rect(&rect)?;
        }
        Ok(())
    }

    fn finish(mut self) -> io::Result<(W, usize)> {
        let pending = std::mem::take(&mut self.pending);
        let rects: Vec<MergedRect> = pending.into_values().collect();
        let rects = if self.hold_all { merge_adjacent(rects) } else { rects };
        for rect in &rects {
            self.writer.write_rect(rect)?;
        }
        let count = self.writer.shape_count();
        Ok((self.writer.finish()?, count))
    }
}

/// Pass 3 state: the row window and the merger behind it.
struct Painter<W: Write> {
    min_x: u32,
    width: usize,
    window: BTreeMap<u32, Vec<Rgba>>,
    last_touch: BTreeMap<u32, u64>,
    merger: RowMerger,
    sink: RectSink<W>,
    peak_rows: usize,
}

impl<W: Write> Painter<W> {
    /// Composite one rect into the window.
    ///
    /// Every cell must lie inside what pass 2 measured; anything else means the
    /// source changed between reads.
    fn paint(&mut self, rect: &SourceRect) -> io::Result<()> {
        let span = rect
            .x
            .checked_sub(self.min_x)
            .map(|start| start as usize..start as usize + rect.width as usize)
            .filter(|span| span.end <= self.width);
        let rows_open = (rect.y..rect.bottom()).all(|y| self.last_touch.contains_key(&y));
        let Some(span) = span.filter(|_| rows_open) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "element #{} paints outside the layout of an earlier read; the input changed",
                    rect.order
                ),
            ));
        };

        let paint = rect.paint();
        let width = self.width;
        for y in rect.y..rect.bottom() {
            let row = self
                .window
                .entry(y)
                .or_insert_with(|| vec![Rgba::TRANSPARENT; width]);
            for cell in &mut row[span.clone()] {
                *cell = source_over(paint, *cell);
            }
        }
        self.peak_rows = self.peak_rows.max(self.window.len());
        Ok(())
    }

    /// Flush leading rows whose last paint has order `<= done`.
    fn flush_through(&mut self, done: u64) -> io::Result<()> {
        while let Some(entry) = self.last_touch.first_entry() {
            if *entry.get() > done {
                break;
            }
            let y = *entry.key();
            entry.remove();
            self.flush_row(y)?;
        }
        Ok(())
    }

    fn flush_row(&mut self, y: u32) -> io::Result<()> {
        let row = self.window.remove(&y).unwrap_or_default();
        let sink = &mut self.sink;
        self.merger.push_row(y, self.min_x, &row, |rect| sink.push(rect));

        let next_row = (y + 1, 0);
        let limit = match self.merger.min_open_origin() {
            Some(open) => open.min(next_row),
            None => next_row,
        };
        self.sink.release_before(limit)
    }

    fn finish(mut self) -> io::Result<(W, usize)> {
        self.flush_through(u64::MAX)?;
        let sink = &mut self.sink;
        self.merger.finish(|rect| sink.push(rect));
        debug!("streaming window peaked at {} rows", self.peak_rows);
        self.sink.finish()
    }
}

/// Optimize a re-openable source with bounded memory, writing to `out`.
///
/// Only rect output is possible here. A request for path mode is answered in
/// rect mode with a [`Notice::StreamingRectFallback`] carrying the reason.
pub fn optimize_source<S, W>(source: &S, options: &Options, out: W) -> Result<Streamed<W>, CrispyError>
where
    S: SvgSource + ?Sized,
    W: Write,
{
    options.validate()?;
    let mut notices = Vec::new();
    if let Err(CrispyError::Configuration(reason)) = options.validate_streaming() {
        debug!("falling back to rect mode: {}", reason);
        notices.push(Notice::StreamingRectFallback { reason });
    }

    let frame = scan_frame(source, options)?;
    let mapper = CellMapper::new(frame, options.canvas_clip.as_ref());
    let layout = scan_layout(source, options.strict, &mapper)?;
    debug!(
        "streaming: cell frame {:?}, {} painted rows",
        frame,
        layout.last_touch.len()
    );

    if let Some(b) = layout.bounds
        && b.width() > MAX_ROW_CELLS
    {
        return Err(CrispyError::unsupported(
            Locator::Document,
            format!("rows of {} cells are too wide to stream", b.width()),
        ));
    }

    let writer = SvgWriter::new(out, &layout.header, frame, options.writer_options())?;
    let sink = RectSink {
        writer,
        pending: BTreeMap::new(),
        hold_all: options.merge_shapes,
    };
    let (min_x, width) = match layout.bounds {
        Some(b) => (b.min_x, b.width() as usize),
        None => (0, 0),
    };
    let mut painter = Painter {
        min_x,
        width,
        window: BTreeMap::new(),
        last_touch: layout.last_touch,
        merger: RowMerger::new(options.merge_vertical),
        sink,
        peak_rows: 0,
    };

    let mut flattener = Flattener::new(options.strict);
    let mut scratch = Vec::new();
    walk(source.open()?, |visit| {
        match visit {
            Visit::Enter(elem) => {
                if let Some(paint) = flattener.enter(elem)? {
                    scratch.clear();
                    mapper.map(&paint, &mut scratch)?;
                    for rect in &scratch {
                        painter.paint(rect)?;
                    }
                    if !scratch.is_empty() {
                        painter.flush_through(paint.order)?;
                    }
                }
            }
            Visit::Leave => flattener.leave(),
        }
        Ok(())
    })?;

    let (out, shape_count) = painter.finish()?;
    if layout.skipped > 0 {
        notices.push(Notice::SkippedElements {
            count: layout.skipped,
        });
    }

    Ok(Streamed {
        out,
        shape_count,
        notices,
    })
}
