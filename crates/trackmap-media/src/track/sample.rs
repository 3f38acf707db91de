//! Sample entries and the per-track sample table.
//!
//! A sample is one demuxed unit (a frame, a block, a PCM frame) addressed by
//! its byte range in the source file. Timestamps are in microseconds.

use crate::{Error, Result};

/// What a sample carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum SampleType {
    Audio,
    Video,
    /// Video key-frame (IDR, sync sample).
    VideoKeyframe,
    Text,
    /// Raw payload with no codec framing (e.g. a whole WAVE data chunk).
    Raw,
    #[default]
    Other,
}

impl SampleType {
    /// Whether the sample can be decoded on its own.
    pub fn is_keyframe(&self) -> bool {
        matches!(self, Self::VideoKeyframe)
    }
}

/// A single demuxed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// File offset where sample data starts.
    pub offset: u64,
    /// Sample size in bytes.
    pub size: u32,
    /// Presentation timestamp in microseconds.
    pub pts: i64,
    /// Decode timestamp in microseconds.
    pub dts: i64,
    /// Sample classification.
    pub kind: SampleType,
}

impl Sample {
    /// Create a sample with zeroed timestamps.
    pub fn new(offset: u64, size: u32, kind: SampleType) -> Self {
        Self {
            offset,
            size,
            pts: 0,
            dts: 0,
            kind,
        }
    }

    /// Set both timestamps.
    pub fn with_timestamps(mut self, pts: i64, dts: i64) -> Self {
        self.pts = pts;
        self.dts = dts;
        self
    }

    /// First byte past the sample, saturating at `u64::MAX`.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size as u64)
    }
}

/// Sample table sized once when the track is opened.
///
/// Pushing past the opening capacity is an error rather than a reallocation,
/// so a corrupt count in a container header cannot make the table grow
/// without bound.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SampleTable {
    capacity: usize,
    samples: Vec<Sample>,
}

impl SampleTable {
    /// Create an empty table able to hold exactly `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Create an empty table accepting at most `capacity` samples, allocating
    /// as samples arrive. For containers that do not declare a sample count.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity,
            samples: Vec::new(),
        }
    }

    /// Build a table from already collected samples; capacity equals the count.
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self {
            capacity: samples.len(),
            samples,
        }
    }

    /// Append a sample in decode order.
    pub fn push(&mut self, sample: Sample) -> Result<()> {
        if self.samples.len() >= self.capacity {
            return Err(Error::SampleTableFull {
                capacity: self.capacity,
            });
        }
        self.samples.push(sample);
        Ok(())
    }

    /// Number of samples stored.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the table holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Capacity the table was opened with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sample slots currently allocated.
    pub fn allocated(&self) -> usize {
        self.samples.capacity()
    }

    /// Most recently pushed sample.
    pub fn last_mut(&mut self) -> Option<&mut Sample> {
        self.samples.last_mut()
    }

    /// Get sample by index.
    pub fn get(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    /// Iterate over all samples.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Samples as a slice, suitable for a sample-indexed bitstream reader.
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// Mutable access for post-processing passes.
    pub fn as_mut_slice(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    /// Sum of all sample sizes.
    pub fn total_bytes(&self) -> u64 {
        self.samples.iter().map(|s| s.size as u64).sum()
    }

    /// Number of key-frame samples.
    pub fn keyframe_count(&self) -> usize {
        self.samples.iter().filter(|s| s.kind.is_keyframe()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_respects_capacity() {
        let mut table = SampleTable::with_capacity(2);
        table.push(Sample::new(100, 10, SampleType::Audio)).unwrap();
        table.push(Sample::new(110, 10, SampleType::Audio)).unwrap();

        let err = table.push(Sample::new(120, 10, SampleType::Audio)).unwrap_err();
        assert!(matches!(err, Error::SampleTableFull { capacity: 2 }));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_bounded_table_grows_to_its_cap() {
        let mut table = SampleTable::bounded(3);
        assert_eq!(table.allocated(), 0);
        for i in 0..3 {
            table.push(Sample::new(100 + i * 10, 10, SampleType::Video)).unwrap();
        }
        assert!(matches!(
            table.push(Sample::new(130, 10, SampleType::Video)),
            Err(Error::SampleTableFull { capacity: 3 })
        ));
        assert_eq!(table.len(), 3);
        assert_eq!(table.last_mut().map(|s| s.offset), Some(120));
    }

    #[test]
    fn test_overflowing_end_saturates() {
        let sample = Sample::new(u64::MAX - 4, 16, SampleType::Raw);
        assert_eq!(sample.end(), u64::MAX);
    }

    #[test]
    fn test_totals() {
        let table = SampleTable::from_samples(vec![
            Sample::new(0, 100, SampleType::VideoKeyframe),
            Sample::new(100, 40, SampleType::Video),
            Sample::new(140, 60, SampleType::Video),
        ]);
        assert_eq!(table.total_bytes(), 200);
        assert_eq!(table.keyframe_count(), 1);
        assert_eq!(table.capacity(), 3);
        assert_eq!(table.get(2).map(Sample::end), Some(200));
    }
}
