//! Trackmap-Media: bit-level reading, container walking and sample tables
//!
//! This crate holds the container-agnostic core of trackmap. Format
//! front-ends (in `trackmap-probe`) plug a header codec and a tag visitor
//! into the walker and fill the track model defined here.
//!
//! # Modules
//!
//! - `bitstream` - Buffered bit reader with continuous and sample-indexed feeds
//! - `ebml` - EBML variable-length ids/sizes and typed payload readers
//! - `walker` - Iterative, self-resynchronizing element walker
//! - `trace` - Element trace sinks injected into the walker
//! - `track` - Samples, sample tables, tracks and the media file
//! - `codec` - Codec identities and FourCC/TwoCC/Matroska lookup tables
//! - `metrics` - Derived frame counts, durations, bitrates and aspect ratios
//!
//! # Pipeline
//!
//! 1. A [`BitstreamReader`] wraps the byte source
//! 2. A [`Walker`] decodes element headers and dispatches them to a visitor
//! 3. The visitor opens [`Track`]s and pushes one [`Sample`] per demuxed unit
//! 4. [`metrics::compute_metrics`] fills in the derived fields

pub mod bitstream;
pub mod codec;
pub mod ebml;
pub mod error;
pub mod metrics;
pub mod trace;
pub mod track;
pub mod walker;

pub use bitstream::BitstreamReader;
pub use codec::{Codec, CodecLookup, CodecTag};
pub use error::{Error, Result};
pub use metrics::{compute_metrics, BitrateReference, MetricsOptions};
pub use trace::{ElementRecord, NullSink, RecordingSink, TraceSink, TracingSink};
pub use track::{
    BitrateMode, Container, MediaFile, Sample, SampleTable, SampleType, StreamKind, Track,
};
pub use walker::{Element, ElementFormat, Visit, Visitor, WalkStats, Walker};
