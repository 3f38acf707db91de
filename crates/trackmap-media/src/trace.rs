//! Element trace sinks.
//!
//! The walker reports every element header it decodes to a [`TraceSink`].
//! Sinks are write-only: nothing they do feeds back into parsing.

use std::borrow::Cow;

/// One decoded element header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ElementRecord {
    /// Element identifier (EBML id or packed FourCC).
    pub id: u32,
    /// Dictionary name, or a printable form of the id.
    pub name: Cow<'static, str>,
    /// Absolute offset of the element header.
    pub offset: u64,
    pub header_len: u32,
    /// Declared payload size.
    pub size: u64,
    /// Nesting depth, 0 for top-level elements.
    pub depth: usize,
}

/// Receiver of element records.
pub trait TraceSink {
    /// Record one element.
    fn record(&mut self, record: &ElementRecord);

    /// Whether records are wanted at all; lets the walker skip building them.
    fn enabled(&self) -> bool {
        true
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn record(&mut self, _record: &ElementRecord) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// Forwards records to `tracing` at TRACE level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn record(&mut self, record: &ElementRecord) {
        tracing::trace!(
            id = format_args!("0x{:X}", record.id),
            name = %record.name,
            offset = record.offset,
            size = record.size,
            depth = record.depth,
            "element"
        );
    }

    fn enabled(&self) -> bool {
        tracing::enabled!(tracing::Level::TRACE)
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub records: Vec<ElementRecord>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the recorded elements, in walk order.
    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_ref()).collect()
    }
}

impl TraceSink for RecordingSink {
    fn record(&mut self, record: &ElementRecord) {
        self.records.push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &'static str) -> ElementRecord {
        ElementRecord {
            id: 0xEC,
            name: Cow::Borrowed(name),
            offset: 0,
            header_len: 2,
            size: 0,
            depth: 0,
        }
    }

    #[test]
    fn test_recording_sink() {
        let mut sink = RecordingSink::new();
        sink.record(&record("Void"));
        sink.record(&record("CRC-32"));
        assert_eq!(sink.names(), vec!["Void", "CRC-32"]);
        assert!(sink.enabled());
    }

    #[test]
    fn test_null_sink_disabled() {
        let mut sink = NullSink;
        assert!(!sink.enabled());
        sink.record(&record("Void"));
    }
}
