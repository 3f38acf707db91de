//! MP4 sample table resolution.
//!
//! Sample tables describe how samples (frames) are organized in the file:
//! - stts: sample durations (decoding time)
//! - stss: sync sample table (keyframes)
//! - stsc: sample-to-chunk mapping
//! - stsz: sample sizes
//! - stco/co64: chunk offsets
//! - ctts: composition time offsets (for B-frames)

use std::collections::HashSet;

/// A resolved sample, timestamps in media timescale units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    /// File offset where sample data starts.
    pub offset: u64,
    /// Sample size in bytes.
    pub size: u32,
    /// Decode timestamp.
    pub dts: u64,
    /// Composition time offset (for PTS calculation).
    pub cts_offset: i32,
    /// Whether this sample is a sync sample.
    pub is_keyframe: bool,
}

impl SampleEntry {
    /// Presentation timestamp, clamped at zero.
    pub fn pts(&self) -> u64 {
        (self.dts as i64 + self.cts_offset as i64).max(0) as u64
    }
}

/// Collects the stbl child boxes of one track.
#[derive(Debug, Clone, Default)]
pub struct SampleTableBuilder {
    /// (count, delta)
    stts_entries: Vec<(u32, u32)>,
    /// 1-based sample numbers; empty means every sample is a sync sample.
    sync_samples: Vec<u32>,
    /// (first_chunk, samples_per_chunk, sample_description_index)
    stsc_entries: Vec<(u32, u32, u32)>,
    uniform_size: u32,
    declared_count: u32,
    sample_sizes: Vec<u32>,
    chunk_offsets: Vec<u64>,
    /// (count, offset)
    ctts_entries: Vec<(u32, i32)>,
}

impl SampleTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stts(&mut self, entries: Vec<(u32, u32)>) {
        self.stts_entries = entries;
    }

    pub fn set_sync_samples(&mut self, samples: Vec<u32>) {
        self.sync_samples = samples;
    }

    pub fn set_stsc(&mut self, entries: Vec<(u32, u32, u32)>) {
        self.stsc_entries = entries;
    }

    /// Set stsz data; `sizes` is empty when `uniform_size` is non-zero.
    pub fn set_stsz(&mut self, uniform_size: u32, declared_count: u32, sizes: Vec<u32>) {
        self.uniform_size = uniform_size;
        self.declared_count = declared_count;
        self.sample_sizes = sizes;
    }

    /// Set chunk offsets (from stco or co64).
    pub fn set_chunk_offsets(&mut self, offsets: Vec<u64>) {
        self.chunk_offsets = offsets;
    }

    pub fn set_ctts(&mut self, entries: Vec<(u32, i32)>) {
        self.ctts_entries = entries;
    }

    /// Number of samples the tables describe.
    pub fn sample_count(&self) -> usize {
        if self.uniform_size > 0 {
            self.declared_count as usize
        } else {
            self.sample_sizes.len()
        }
    }

    fn size_of(&self, index: usize) -> u32 {
        if self.uniform_size > 0 {
            self.uniform_size
        } else {
            self.sample_sizes.get(index).copied().unwrap_or(0)
        }
    }

    /// Resolve at most `limit` samples in decode order.
    ///
    /// Resolution stops at the first sample whose byte range overflows or
    /// ends past `source_size`.
    pub fn build(&self, limit: usize, source_size: u64) -> Vec<SampleEntry> {
        let count = self.sample_count().min(limit);
        if count == 0 {
            return Vec::new();
        }

        let offsets = self.resolve_offsets(count);
        let dts = self.resolve_timestamps(count);
        let cts = self.resolve_cts_offsets(count);
        let sync: HashSet<u32> = self.sync_samples.iter().copied().collect();

        let mut entries = Vec::with_capacity(count);
        for (i, offset) in offsets.into_iter().enumerate() {
            let size = self.size_of(i);
            let end = offset.and_then(|o| o.checked_add(size as u64));
            let Some(offset) = offset.filter(|_| end.is_some_and(|e| e <= source_size)) else {
                break;
            };
            entries.push(SampleEntry {
                offset,
                size,
                dts: dts[i],
                cts_offset: cts[i],
                is_keyframe: sync.is_empty() || sync.contains(&(i as u32 + 1)),
            });
        }
        entries
    }

    /// Chunk index (0-based) of every sample.
    fn resolve_sample_chunks(&self, count: usize) -> Vec<usize> {
        let mut result = Vec::with_capacity(count);
        let num_chunks = self.chunk_offsets.len() as u32;

        for (i, &(first_chunk, samples_per_chunk, _)) in self.stsc_entries.iter().enumerate() {
            let next_first = self
                .stsc_entries
                .get(i + 1)
                .map_or(num_chunks + 1, |next| next.0);

            for chunk in first_chunk.max(1)..next_first.min(num_chunks + 1) {
                for _ in 0..samples_per_chunk {
                    if result.len() >= count {
                        return result;
                    }
                    result.push(chunk as usize - 1);
                }
            }
        }

        let last = result.last().copied().unwrap_or(0);
        result.resize(count, last);
        result
    }

    /// Absolute offset of every sample, `None` once a chunk run overflows.
    fn resolve_offsets(&self, count: usize) -> Vec<Option<u64>> {
        let chunks = self.resolve_sample_chunks(count);
        let mut within_chunk = vec![0u64; self.chunk_offsets.len()];

        chunks
            .iter()
            .enumerate()
            .map(|(i, &chunk)| {
                let base = self.chunk_offsets.get(chunk).copied().unwrap_or(0);
                let Some(running) = within_chunk.get_mut(chunk) else {
                    return Some(base);
                };
                let offset = base.checked_add(*running)?;
                *running = running.saturating_add(self.size_of(i) as u64);
                Some(offset)
            })
            .collect()
    }

    fn resolve_timestamps(&self, count: usize) -> Vec<u64> {
        let mut dts = Vec::with_capacity(count);
        let mut current = 0u64;
        let mut last_delta = 1u32;

        'entries: for &(n, delta) in &self.stts_entries {
            last_delta = delta;
            for _ in 0..n {
                if dts.len() >= count {
                    break 'entries;
                }
                dts.push(current);
                current += delta as u64;
            }
        }

        while dts.len() < count {
            dts.push(current);
            current += last_delta as u64;
        }
        dts
    }

    fn resolve_cts_offsets(&self, count: usize) -> Vec<i32> {
        let mut offsets: Vec<i32> = self
            .ctts_entries
            .iter()
            .flat_map(|&(n, offset)| std::iter::repeat(offset).take(n as usize))
            .take(count)
            .collect();
        offsets.resize(count, 0);
        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_entry_pts() {
        let sample = SampleEntry {
            offset: 100,
            size: 1000,
            dts: 1000,
            cts_offset: 500,
            is_keyframe: true,
        };
        assert_eq!(sample.pts(), 1500);

        let negative = SampleEntry {
            dts: 100,
            cts_offset: -200,
            ..sample
        };
        assert_eq!(negative.pts(), 0);
    }

    #[test]
    fn test_single_chunk() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![(3, 1000)]);
        builder.set_sync_samples(vec![1]);
        builder.set_stsc(vec![(1, 3, 1)]);
        builder.set_stsz(0, 3, vec![100, 200, 150]);
        builder.set_chunk_offsets(vec![1000]);

        let samples = builder.build(usize::MAX, u64::MAX);
        assert_eq!(samples.len(), 3);
        assert_eq!(
            samples.iter().map(|s| s.offset).collect::<Vec<_>>(),
            vec![1000, 1100, 1300]
        );
        assert_eq!(
            samples.iter().map(|s| s.dts).collect::<Vec<_>>(),
            vec![0, 1000, 2000]
        );
        assert!(samples[0].is_keyframe);
        assert!(!samples[1].is_keyframe);
    }

    #[test]
    fn test_chunk_runs_and_uniform_size() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![(5, 512)]);
        // Chunks 1-2 hold 2 samples each, chunk 3 holds 1
        builder.set_stsc(vec![(1, 2, 1), (3, 1, 1)]);
        builder.set_stsz(64, 5, vec![]);
        builder.set_chunk_offsets(vec![100, 500, 900]);
        builder.set_ctts(vec![(1, 1024), (4, 0)]);

        let samples = builder.build(usize::MAX, u64::MAX);
        assert_eq!(
            samples.iter().map(|s| s.offset).collect::<Vec<_>>(),
            vec![100, 164, 500, 564, 900]
        );
        assert!(samples.iter().all(|s| s.size == 64 && s.is_keyframe));
        assert_eq!(samples[0].pts(), 1024);
        assert_eq!(samples[4].dts, 2048);
    }

    #[test]
    fn test_limit_and_short_tables() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![(1, 10)]);
        builder.set_stsc(vec![(1, 8, 1)]);
        builder.set_stsz(0, 4, vec![1, 2, 3, 4]);
        builder.set_chunk_offsets(vec![40]);

        let samples = builder.build(3, u64::MAX);
        assert_eq!(samples.len(), 3);
        // stts runs out after one sample; the last delta repeats
        assert_eq!(samples[2].dts, 20);
        assert_eq!(samples[2].offset, 43);
    }

    #[test]
    fn test_overflowing_chunk_offset_stops_resolution() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![(2, 10)]);
        builder.set_stsc(vec![(1, 2, 1)]);
        builder.set_stsz(16, 2, vec![]);
        builder.set_chunk_offsets(vec![u64::MAX - 4]);

        assert!(builder.build(10, u64::MAX).is_empty());
    }

    #[test]
    fn test_samples_past_source_end_are_dropped() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![(3, 10)]);
        builder.set_stsc(vec![(1, 3, 1)]);
        builder.set_stsz(0, 3, vec![100, 100, 100]);
        builder.set_chunk_offsets(vec![1000]);

        let samples = builder.build(10, 1250);
        assert_eq!(
            samples.iter().map(|s| s.offset).collect::<Vec<_>>(),
            vec![1000, 1100]
        );
    }
}
