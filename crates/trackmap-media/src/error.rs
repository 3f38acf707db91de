//! Error types for trackmap-media.

use std::io;
use thiserror::Error;

/// Result type for trackmap-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for trackmap-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The continuous feed ran past the end of the byte source.
    #[error("Premature end of stream at byte offset {offset}")]
    PrematureEnd { offset: u64 },

    /// The sample-indexed feed has no samples left to load.
    #[error("Sample map exhausted after {index} samples")]
    SamplesExhausted { index: usize },

    /// A sample in the map has a zero offset or a zero size.
    #[error("Corrupted sample map: sample #{index} at offset {offset} with size {size}")]
    CorruptSample { index: usize, offset: u64, size: u32 },

    /// Bit count outside the range supported by the read call.
    #[error("Invalid bit count {n}, expected 1..={max}")]
    InvalidBitCount { n: u32, max: u32 },

    /// Byte-aligned read requested on an unaligned cursor.
    #[error("Unaligned byte read at bit offset {bit_offset}")]
    Unaligned { bit_offset: u64 },

    /// Seek target outside the byte source.
    #[error("Seek to byte offset {offset} outside of source (size {size})")]
    SeekOutOfBounds { offset: u64, size: u64 },

    /// Malformed variable-length field.
    #[error("Invalid variable-length field at byte offset {offset}: {leading_zeros} leading zero bits")]
    InvalidVint { offset: u64, leading_zeros: u32 },

    /// Malformed element header or payload.
    #[error("Invalid element at byte offset {offset}: {reason}")]
    InvalidElement { offset: u64, reason: String },

    /// A sample table was filled past the capacity it was opened with.
    #[error("Sample table full: capacity {capacity}")]
    SampleTableFull { capacity: usize },

    /// A track set was filled past its configured capacity.
    #[error("Too many {kind} tracks: maximum {max}")]
    TooManyTracks { kind: &'static str, max: usize },

    /// Unsupported feature or operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Create an invalid element error.
    pub fn invalid_element(offset: u64, reason: impl Into<String>) -> Self {
        Self::InvalidElement {
            offset,
            reason: reason.into(),
        }
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Whether this error means the input ran out rather than being malformed.
    pub fn is_end_of_stream(&self) -> bool {
        match self {
            Self::PrematureEnd { .. } | Self::SamplesExhausted { .. } => true,
            Self::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}
