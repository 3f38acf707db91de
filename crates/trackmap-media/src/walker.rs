//! Self-resynchronizing container walker.
//!
//! Container formats built from nested `(id, size, payload)` elements share
//! one walking algorithm. An [`ElementFormat`] decodes element headers; a
//! [`Visitor`] decides, per element, whether to descend, consume the payload
//! or skip it. After every element the walker moves the cursor to the
//! element's declared end, clamped to the end of its parent, so a child that
//! overruns its parent or a visitor that reads too much or too little never
//! desynchronizes the walk.
//!
//! Nesting is tracked with an explicit frame stack; hostile nesting depth
//! costs heap, not call stack.

use crate::bitstream::BitstreamReader;
use crate::trace::{ElementRecord, TraceSink};
use crate::{Error, Result};
use std::borrow::Cow;
use std::io::{Read, Seek};
use tracing::{debug, trace, warn};

/// Default maximum nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// A decoded element header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    /// Element identifier (EBML id, or FourCC packed big-endian).
    pub id: u32,
    /// Absolute offset of the first header byte.
    pub start: u64,
    /// Header length in bytes.
    pub header_len: u32,
    /// Declared payload size in bytes.
    pub size: u64,
    /// Absolute offset one past the element.
    pub end: u64,
    /// The size field did not carry a size; the element extends to its parent's end.
    pub unknown_size: bool,
    /// List type of RIFF `RIFF`/`LIST` chunks.
    pub list_type: Option<[u8; 4]>,
}

impl Element {
    /// Create an element ending at `start + header_len + size`.
    pub fn new(id: u32, start: u64, header_len: u32, size: u64) -> Self {
        Self {
            id,
            start,
            header_len,
            size,
            end: start
                .saturating_add(header_len as u64)
                .saturating_add(size),
            unknown_size: false,
            list_type: None,
        }
    }

    /// Absolute offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        self.start + self.header_len as u64
    }

    /// The id as four bytes, for FourCC-based formats.
    pub fn fourcc(&self) -> [u8; 4] {
        self.id.to_be_bytes()
    }
}

/// Element header codec of a container format.
pub trait ElementFormat {
    /// Decode the element header at the cursor, leaving the cursor on the payload.
    fn read_header<R: Read + Seek>(&self, reader: &mut BitstreamReader<'_, R>)
        -> Result<Element>;

    /// Printable form of an id the visitor has no name for.
    fn label(&self, id: u32) -> String {
        format!("0x{:X}", id)
    }
}

/// What the walker does with an element after [`Visitor::enter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Walk the payload as child elements.
    Descend,
    /// Unknown or unwanted element, skip its payload.
    Skip,
    /// The visitor handled the payload.
    Done,
    /// Stop walking; pending frames still get [`Visitor::leave`].
    Stop,
}

/// Tag dispatch for one container format.
pub trait Visitor<R: Read + Seek> {
    /// Called with the cursor on the element payload.
    fn enter(
        &mut self,
        reader: &mut BitstreamReader<'_, R>,
        element: &Element,
        depth: usize,
    ) -> Result<Visit>;

    /// Called once all children of a descended element are walked.
    fn leave(&mut self, _element: &Element, _depth: usize) -> Result<()> {
        Ok(())
    }

    /// Dictionary name of an element id.
    fn element_name(&self, _id: u32) -> Option<&'static str> {
        None
    }
}

/// Counters collected during a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct WalkStats {
    /// Element headers decoded.
    pub elements: usize,
    /// Elements skipped as unknown.
    pub skipped: usize,
    /// Element ends clamped to their parent's end.
    pub clamped: usize,
    /// Elements or subtrees abandoned after an error.
    pub failures: usize,
    /// Deepest nesting level entered.
    pub max_depth: usize,
    /// The walk reached the end of the source.
    pub exhausted: bool,
    /// A visitor asked to stop.
    pub stopped: bool,
    /// A corrupt top-level header ended the walk early.
    pub truncated: bool,
}

struct Frame {
    element: Element,
    /// Element end clamped to the parent end.
    end: u64,
}

enum Position {
    Ready,
    Exhausted,
}

/// Iterative element walker.
pub struct Walker<'s, F> {
    format: F,
    sink: &'s mut dyn TraceSink,
    max_depth: usize,
}

impl<'s, F: ElementFormat> Walker<'s, F> {
    /// Create a walker reporting to `sink`.
    pub fn new(format: F, sink: &'s mut dyn TraceSink) -> Self {
        Self {
            format,
            sink,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit nesting; deeper containers are skipped.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Walk from the cursor to the end of the source.
    pub fn walk<R, V>(
        &mut self,
        reader: &mut BitstreamReader<'_, R>,
        visitor: &mut V,
    ) -> Result<WalkStats>
    where
        R: Read + Seek,
        V: Visitor<R>,
    {
        let size = reader.size();
        let mut stack: Vec<Frame> = Vec::new();
        let mut stats = WalkStats::default();

        loop {
            let parent_end = stack.last().map_or(size, |f| f.end);
            let depth = stack.len();

            if reader.absolute_byte_offset() >= parent_end {
                let Some(frame) = stack.pop() else { break };
                leave::<R, V>(visitor, &frame.element, depth - 1, &mut stats);
                let outer_end = stack.last().map_or(size, |f| f.end);
                if let Position::Exhausted =
                    self.resync(reader, frame.element.end, outer_end, &mut stats)?
                {
                    break;
                }
                continue;
            }

            let mut element = match self.format.read_header(reader) {
                Ok(element) => element,
                Err(err) => {
                    let Some(frame) = stack.pop() else {
                        if err.is_end_of_stream() {
                            debug!(error = %err, "walk ended on a truncated element");
                            stats.exhausted = true;
                            break;
                        }
                        if let Error::Io(_) = err {
                            return Err(err);
                        }
                        // No parent end to resync to; keep what was parsed so far.
                        warn!(
                            error = %err,
                            offset = reader.absolute_byte_offset(),
                            "corrupt top-level element, ending walk"
                        );
                        stats.failures += 1;
                        stats.truncated = true;
                        break;
                    };
                    warn!(
                        error = %err,
                        parent = format_args!("0x{:X}", frame.element.id),
                        offset = frame.element.start,
                        "abandoning element subtree"
                    );
                    stats.failures += 1;
                    leave::<R, V>(visitor, &frame.element, depth - 1, &mut stats);
                    let outer_end = stack.last().map_or(size, |f| f.end);
                    if let Position::Exhausted =
                        self.resync(reader, frame.element.end, outer_end, &mut stats)?
                    {
                        break;
                    }
                    continue;
                }
            };

            if element.unknown_size {
                element.end = parent_end;
            }
            stats.elements += 1;

            if self.sink.enabled() {
                let name = visitor
                    .element_name(element.id)
                    .map(Cow::Borrowed)
                    .unwrap_or_else(|| Cow::Owned(self.format.label(element.id)));
                self.sink.record(&ElementRecord {
                    id: element.id,
                    name,
                    offset: element.start,
                    header_len: element.header_len,
                    size: element.size,
                    depth,
                });
            }

            let visit = match visitor.enter(reader, &element, depth) {
                Ok(visit) => visit,
                Err(err) => {
                    warn!(
                        error = %err,
                        id = format_args!("0x{:X}", element.id),
                        offset = element.start,
                        "element parsing failed"
                    );
                    stats.failures += 1;
                    Visit::Done
                }
            };

            let visit = if visit == Visit::Descend && depth >= self.max_depth {
                debug!(
                    id = format_args!("0x{:X}", element.id),
                    depth, "maximum depth reached, skipping"
                );
                Visit::Skip
            } else {
                visit
            };

            match visit {
                Visit::Descend => {
                    let end = element.end.min(parent_end);
                    if let Position::Exhausted =
                        self.move_to(reader, element.payload_offset(), &mut stats)?
                    {
                        stack.push(Frame { element, end });
                        break;
                    }
                    stack.push(Frame { element, end });
                    stats.max_depth = stats.max_depth.max(stack.len());
                }
                Visit::Skip | Visit::Done => {
                    if visit == Visit::Skip {
                        stats.skipped += 1;
                        trace!(
                            id = format_args!("0x{:X}", element.id),
                            offset = element.start,
                            "unknown element skipped"
                        );
                    }
                    if let Position::Exhausted =
                        self.resync(reader, element.end, parent_end, &mut stats)?
                    {
                        break;
                    }
                }
                Visit::Stop => {
                    debug!(offset = element.start, "walk stopped by visitor");
                    stats.stopped = true;
                    break;
                }
            }
        }

        while let Some(frame) = stack.pop() {
            leave::<R, V>(visitor, &frame.element, stack.len(), &mut stats);
        }

        debug!(
            elements = stats.elements,
            skipped = stats.skipped,
            clamped = stats.clamped,
            failures = stats.failures,
            "walk complete"
        );
        Ok(stats)
    }

    /// Move to an element's end, clamped to the parent end or the source size.
    fn resync<R: Read + Seek>(
        &self,
        reader: &mut BitstreamReader<'_, R>,
        element_end: u64,
        parent_end: u64,
        stats: &mut WalkStats,
    ) -> Result<Position> {
        let size = reader.size();
        let bound = if parent_end < size { parent_end } else { size };
        let target = if element_end > bound {
            if bound == parent_end {
                debug!(element_end, parent_end, "element overruns its parent, clamping");
                stats.clamped += 1;
            }
            bound
        } else {
            element_end
        };
        self.move_to(reader, target, stats)
    }

    fn move_to<R: Read + Seek>(
        &self,
        reader: &mut BitstreamReader<'_, R>,
        target: u64,
        stats: &mut WalkStats,
    ) -> Result<Position> {
        if target >= reader.size() {
            stats.exhausted = true;
            return Ok(Position::Exhausted);
        }

        let current = reader.absolute_bit_offset();
        let target_bits = target * 8;
        if current < target_bits {
            reader.skip_bits(target_bits - current)?;
        } else if current > target_bits {
            reader.rewind_bits(current - target_bits)?;
        }
        Ok(Position::Ready)
    }
}

fn leave<R, V>(visitor: &mut V, element: &Element, depth: usize, stats: &mut WalkStats)
where
    R: Read + Seek,
    V: Visitor<R>,
{
    if let Err(err) = visitor.leave(element, depth) {
        warn!(
            error = %err,
            id = format_args!("0x{:X}", element.id),
            offset = element.start,
            "closing element failed"
        );
        stats.failures += 1;
    }
}
