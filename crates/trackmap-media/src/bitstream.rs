//! Buffered bit reader over a seekable byte source.
//!
//! The reader keeps a window of the source in memory and a bit-granular
//! cursor into it. Two feed strategies refill the window:
//!
//! - **continuous**: a fixed-size window slides forward over the source and
//!   shrinks near its end;
//! - **sample-indexed**: every refill drops the window and loads exactly the
//!   byte range of the next [`Sample`] of a sample table.
//!
//! Values are read MSB first. The absolute position of the cursor is always
//! `window_offset + cursor / 8` bytes into the source.

use crate::track::Sample;
use crate::{Error, Result};
use std::io::{Read, Seek, SeekFrom};
use tracing::trace;

/// Default continuous-mode window size (1 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Smallest accepted window; a 64-bit read at any alignment touches 9 bytes.
pub const MIN_BUFFER_SIZE: usize = 16;

enum Feed<'a> {
    Continuous { window: usize },
    SampleIndexed { samples: &'a [Sample], index: usize },
}

/// Bit-level reader with on-demand refill.
pub struct BitstreamReader<'a, R> {
    source: R,
    /// Total size of the source in bytes.
    size: u64,
    /// Valid bytes of the current window.
    buffer: Vec<u8>,
    /// Bit cursor into `buffer`.
    cursor: u64,
    /// Source offset of `buffer[0]`.
    window_offset: u64,
    feed: Feed<'a>,
}

impl<R: Read + Seek> BitstreamReader<'static, R> {
    /// Create a continuous-mode reader with the default window size.
    pub fn new(source: R) -> Result<Self> {
        Self::with_buffer_size(source, DEFAULT_BUFFER_SIZE)
    }

    /// Create a continuous-mode reader positioned at byte 0.
    pub fn with_buffer_size(mut source: R, buffer_size: usize) -> Result<Self> {
        let size = source.seek(SeekFrom::End(0))?;
        let mut reader = Self {
            source,
            size,
            buffer: Vec::new(),
            cursor: 0,
            window_offset: 0,
            feed: Feed::Continuous {
                window: buffer_size.max(MIN_BUFFER_SIZE),
            },
        };
        reader.fill_window(0)?;
        Ok(reader)
    }
}

impl<'a, R: Read + Seek> BitstreamReader<'a, R> {
    /// Create a sample-indexed reader positioned at the start of the first sample.
    pub fn with_samples(mut source: R, samples: &'a [Sample]) -> Result<Self> {
        let size = source.seek(SeekFrom::End(0))?;
        let mut reader = Self {
            source,
            size,
            buffer: Vec::new(),
            cursor: 0,
            window_offset: 0,
            feed: Feed::SampleIndexed { samples, index: 0 },
        };
        reader.next_sample()?;
        Ok(reader)
    }

    /// Total size of the byte source.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the reader feeds from a sample table.
    pub fn is_sample_indexed(&self) -> bool {
        matches!(self.feed, Feed::SampleIndexed { .. })
    }

    /// Index of the next sample a refill would load, if sample-indexed.
    pub fn sample_index(&self) -> Option<usize> {
        match self.feed {
            Feed::SampleIndexed { index, .. } => Some(index),
            Feed::Continuous { .. } => None,
        }
    }

    /// Absolute position of the cursor in bits.
    pub fn absolute_bit_offset(&self) -> u64 {
        self.window_offset * 8 + self.cursor
    }

    /// Absolute position of the cursor in bytes (rounded down).
    pub fn absolute_byte_offset(&self) -> u64 {
        self.window_offset + self.cursor / 8
    }

    /// Bits left in the current window before a refill is needed.
    pub fn remaining_bits_in_buffer(&self) -> u64 {
        self.window_bits() - self.cursor
    }

    /// Give the byte source back.
    pub fn into_inner(self) -> R {
        self.source
    }

    // ------------------------------------------------------------------
    // Bit reads
    // ------------------------------------------------------------------

    /// Read one bit.
    pub fn read_bit(&mut self) -> Result<u32> {
        let bit = self.peek_bit()?;
        self.cursor += 1;
        Ok(bit)
    }

    /// Read one bit without moving the cursor.
    pub fn peek_bit(&mut self) -> Result<u32> {
        self.ensure_bits(1)?;
        let byte = self.buffer[(self.cursor / 8) as usize];
        Ok(((byte >> (7 - self.cursor % 8)) & 1) as u32)
    }

    /// Read `n` bits (1..=32).
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        check_bit_count(n, 32)?;
        if n == 1 {
            return self.read_bit();
        }
        self.ensure_bits(n)?;
        let value = self.extract(n);
        self.cursor += n as u64;
        Ok(value as u32)
    }

    /// Read `n` bits (1..=32) without moving the cursor.
    pub fn peek_bits(&mut self, n: u32) -> Result<u32> {
        check_bit_count(n, 32)?;
        if n == 1 {
            return self.peek_bit();
        }
        self.ensure_bits(n)?;
        Ok(self.extract(n) as u32)
    }

    /// Read `n` bits (1..=64).
    pub fn read_bits_64(&mut self, n: u32) -> Result<u64> {
        check_bit_count(n, 64)?;
        if n == 1 {
            return self.read_bit().map(u64::from);
        }
        self.ensure_bits(n)?;
        let value = self.extract(n);
        self.cursor += n as u64;
        Ok(value)
    }

    /// Read `n` bits (1..=64) without moving the cursor.
    pub fn peek_bits_64(&mut self, n: u32) -> Result<u64> {
        check_bit_count(n, 64)?;
        if n == 1 {
            return self.peek_bit().map(u64::from);
        }
        self.ensure_bits(n)?;
        Ok(self.extract(n))
    }

    // ------------------------------------------------------------------
    // Byte reads
    // ------------------------------------------------------------------

    /// Read one byte; the cursor must be byte-aligned.
    pub fn read_aligned_byte(&mut self) -> Result<u8> {
        let byte = self.peek_aligned_byte()?;
        self.cursor += 8;
        Ok(byte)
    }

    /// Read one byte without moving the cursor; the cursor must be byte-aligned.
    pub fn peek_aligned_byte(&mut self) -> Result<u8> {
        self.check_aligned()?;
        self.ensure_bits(8)?;
        Ok(self.buffer[(self.cursor / 8) as usize])
    }

    /// Read `len` bytes; the cursor must be byte-aligned.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.check_aligned()?;
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            self.ensure_bits(8)?;
            let start = (self.cursor / 8) as usize;
            let take = (len - out.len()).min(self.buffer.len() - start);
            out.extend_from_slice(&self.buffer[start..start + take]);
            self.cursor += take as u64 * 8;
        }
        Ok(out)
    }

    /// Read a fixed number of bytes; the cursor must be byte-aligned.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        for byte in out.iter_mut() {
            *byte = self.read_aligned_byte()?;
        }
        Ok(out)
    }

    /// Read a little-endian u16.
    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian u32.
    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a four-character code.
    pub fn read_fourcc(&mut self) -> Result<[u8; 4]> {
        self.read_array()
    }

    // ------------------------------------------------------------------
    // Cursor movement
    // ------------------------------------------------------------------

    /// Move the cursor forward by `n` bits.
    pub fn skip_bits(&mut self, n: u64) -> Result<()> {
        if self.cursor + n <= self.window_bits() {
            self.cursor += n;
            return Ok(());
        }
        let target = self.absolute_bit_offset() + n;
        self.seek_to_bit(target)
    }

    /// Move the cursor back by `n` bits.
    pub fn rewind_bits(&mut self, n: u64) -> Result<()> {
        if n <= self.cursor {
            self.cursor -= n;
            return Ok(());
        }
        let current = self.absolute_bit_offset();
        if n > current {
            return Err(Error::unsupported(format!(
                "rewind of {} bits from bit offset {}",
                n, current
            )));
        }
        self.seek_to_bit(current - n)
    }

    /// Reload the window at byte offset `offset` of the source.
    ///
    /// Only available in continuous mode.
    pub fn seek_to_byte_offset(&mut self, offset: u64) -> Result<()> {
        if !matches!(self.feed, Feed::Continuous { .. }) {
            return Err(Error::unsupported("seek on a sample-indexed reader"));
        }
        if offset >= self.size {
            return Err(Error::SeekOutOfBounds {
                offset,
                size: self.size,
            });
        }
        self.fill_window(offset)
    }

    /// Load the next sample of the sample table into the window.
    ///
    /// The previous window, including unread bits, is dropped.
    pub fn next_sample(&mut self) -> Result<()> {
        let (samples, index) = match self.feed {
            Feed::SampleIndexed { samples, index } => (samples, index),
            Feed::Continuous { .. } => {
                return Err(Error::unsupported("sample feed on a continuous reader"))
            }
        };

        let sample = samples
            .get(index)
            .ok_or(Error::SamplesExhausted { index })?;
        if sample.offset == 0 || sample.size == 0 || sample.end() > self.size {
            return Err(Error::CorruptSample {
                index,
                offset: sample.offset,
                size: sample.size,
            });
        }

        self.load(sample.offset, sample.size as usize)?;
        self.feed = Feed::SampleIndexed {
            samples,
            index: index + 1,
        };
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn window_bits(&self) -> u64 {
        self.buffer.len() as u64 * 8
    }

    fn check_aligned(&self) -> Result<()> {
        if self.cursor % 8 != 0 {
            return Err(Error::Unaligned {
                bit_offset: self.absolute_bit_offset(),
            });
        }
        Ok(())
    }

    /// Make sure `n` bits are available at the cursor, refilling if needed.
    fn ensure_bits(&mut self, n: u32) -> Result<()> {
        if self.cursor + n as u64 <= self.window_bits() {
            return Ok(());
        }

        match self.feed {
            Feed::Continuous { .. } => {
                let consumed = self.cursor / 8;
                let residual = self.cursor % 8;
                self.fill_window(self.window_offset + consumed)?;
                self.cursor = residual;
            }
            Feed::SampleIndexed { .. } => self.next_sample()?,
        }

        if self.cursor + n as u64 > self.window_bits() {
            return Err(Error::PrematureEnd {
                offset: self.window_offset + self.buffer.len() as u64,
            });
        }
        Ok(())
    }

    /// Continuous-mode refill: load a window starting at `offset`.
    fn fill_window(&mut self, offset: u64) -> Result<()> {
        let window = match self.feed {
            Feed::Continuous { window } => window,
            Feed::SampleIndexed { .. } => return Err(Error::unsupported("window refill")),
        };
        if offset >= self.size {
            return Err(Error::PrematureEnd { offset });
        }
        let len = (self.size - offset).min(window as u64) as usize;
        self.load(offset, len)
    }

    fn load(&mut self, offset: u64, len: usize) -> Result<()> {
        self.source.seek(SeekFrom::Start(offset))?;
        self.buffer.resize(len, 0);
        self.source.read_exact(&mut self.buffer)?;
        self.window_offset = offset;
        self.cursor = 0;
        trace!(offset, len, "bitstream window loaded");
        Ok(())
    }

    fn seek_to_bit(&mut self, bit: u64) -> Result<()> {
        self.seek_to_byte_offset(bit / 8)?;
        self.cursor = bit % 8;
        Ok(())
    }

    /// Value of the `n` bits at the cursor; `ensure_bits(n)` must have passed.
    fn extract(&self, n: u32) -> u64 {
        let start = (self.cursor / 8) as usize;
        let padding = (self.cursor % 8) as u32;
        let touched = (n + padding).div_ceil(8) as usize;

        let mut acc: u128 = 0;
        for &byte in &self.buffer[start..start + touched] {
            acc = (acc << 8) | byte as u128;
        }
        acc >>= touched as u32 * 8 - n - padding;
        (acc & ((1u128 << n) - 1)) as u64
    }
}

fn check_bit_count(n: u32, max: u32) -> Result<()> {
    if n == 0 || n > max {
        return Err(Error::InvalidBitCount { n, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::SampleType;
    use std::io::Cursor;

    fn reader(data: &[u8]) -> BitstreamReader<'static, Cursor<Vec<u8>>> {
        BitstreamReader::new(Cursor::new(data.to_vec())).unwrap()
    }

    #[test]
    fn test_read_bits_msb_first() {
        let mut r = reader(&[0b1011_0010, 0xFF, 0x00]);
        assert_eq!(r.read_bit().unwrap(), 1);
        assert_eq!(r.read_bits(3).unwrap(), 0b011);
        assert_eq!(r.read_bits(8).unwrap(), 0b0010_1111);
        assert_eq!(r.absolute_bit_offset(), 12);
        assert_eq!(r.absolute_byte_offset(), 1);
    }

    #[test]
    fn test_peek_does_not_advance() {
        let mut r = reader(&[0xA5, 0x5A]);
        assert_eq!(r.peek_bits(4).unwrap(), 0xA);
        assert_eq!(r.peek_bits_64(16).unwrap(), 0xA55A);
        assert_eq!(r.peek_aligned_byte().unwrap(), 0xA5);
        assert_eq!(r.absolute_bit_offset(), 0);
        assert_eq!(r.read_bits(16).unwrap(), 0xA55A);
    }

    #[test]
    fn test_invalid_bit_counts() {
        let mut r = reader(&[0; 16]);
        assert!(matches!(
            r.read_bits(0),
            Err(Error::InvalidBitCount { n: 0, max: 32 })
        ));
        assert!(matches!(
            r.read_bits(33),
            Err(Error::InvalidBitCount { n: 33, max: 32 })
        ));
        assert!(matches!(
            r.read_bits_64(65),
            Err(Error::InvalidBitCount { n: 65, max: 64 })
        ));
    }

    #[test]
    fn test_aligned_byte_requires_alignment() {
        let mut r = reader(&[0x12, 0x34]);
        assert_eq!(r.read_aligned_byte().unwrap(), 0x12);
        r.skip_bits(1).unwrap();
        assert!(matches!(
            r.read_aligned_byte(),
            Err(Error::Unaligned { bit_offset: 9 })
        ));
    }

    #[test]
    fn test_little_endian_helpers() {
        let mut r = reader(b"RIFF\x10\x00\x00\x00\x02\x00rest");
        assert_eq!(&r.read_fourcc().unwrap(), b"RIFF");
        assert_eq!(r.read_u32_le().unwrap(), 16);
        assert_eq!(r.read_u16_le().unwrap(), 2);
        assert_eq!(r.read_bytes(4).unwrap(), b"rest");
    }

    #[test]
    fn test_window_slides_across_refills() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut r = BitstreamReader::with_buffer_size(Cursor::new(data.clone()), 16).unwrap();

        // Reads straddle the 16-byte window boundaries.
        r.skip_bits(4).unwrap();
        for i in 0..99usize {
            let expected = ((data[i] as u32 & 0x0F) << 4) | (data[i + 1] as u32 >> 4);
            assert_eq!(r.read_bits(8).unwrap(), expected, "byte {}", i);
        }
        assert_eq!(r.absolute_bit_offset(), 4 + 99 * 8);
    }

    #[test]
    fn test_read_bytes_spanning_windows() {
        let data: Vec<u8> = (0..64u8).collect();
        let mut r = BitstreamReader::with_buffer_size(Cursor::new(data.clone()), 16).unwrap();
        r.skip_bits(8 * 5).unwrap();
        assert_eq!(r.read_bytes(40).unwrap(), &data[5..45]);
        assert_eq!(r.absolute_byte_offset(), 45);
    }

    #[test]
    fn test_premature_end_is_an_error() {
        let mut r = reader(&[0xFF, 0xEE]);
        r.read_bits(12).unwrap();
        assert!(matches!(r.read_bits(8), Err(Error::PrematureEnd { .. })));
        // The cursor did not move, remaining bits are still readable.
        assert_eq!(r.read_bits(4).unwrap(), 0xE);
        let err = r.read_bit().unwrap_err();
        assert!(err.is_end_of_stream());
    }

    #[test]
    fn test_empty_source() {
        let err = BitstreamReader::new(Cursor::new(Vec::new())).err().unwrap();
        assert!(matches!(err, Error::PrematureEnd { offset: 0 }));
    }

    #[test]
    fn test_seek_bounds() {
        let mut r = reader(&[1, 2, 3, 4]);
        r.seek_to_byte_offset(3).unwrap();
        assert_eq!(r.read_aligned_byte().unwrap(), 4);
        assert!(matches!(
            r.seek_to_byte_offset(4),
            Err(Error::SeekOutOfBounds { offset: 4, size: 4 })
        ));
        r.seek_to_byte_offset(0).unwrap();
        assert_eq!(r.read_aligned_byte().unwrap(), 1);
    }

    #[test]
    fn test_rewind_before_start_fails() {
        let mut r = reader(&[0; 4]);
        r.skip_bits(3).unwrap();
        assert!(r.rewind_bits(4).is_err());
        r.rewind_bits(3).unwrap();
        assert_eq!(r.absolute_bit_offset(), 0);
    }

    fn samples() -> Vec<Sample> {
        vec![
            Sample::new(2, 2, SampleType::Raw),
            Sample::new(6, 3, SampleType::Raw),
        ]
    }

    #[test]
    fn test_sample_indexed_feed() {
        let data = vec![0, 0, 0xAA, 0xBB, 0, 0, 0x11, 0x22, 0x33, 0];
        let map = samples();
        let mut r = BitstreamReader::with_samples(Cursor::new(data), &map).unwrap();

        assert!(r.is_sample_indexed());
        assert_eq!(r.sample_index(), Some(1));
        assert_eq!(r.absolute_byte_offset(), 2);
        assert_eq!(r.read_bits(16).unwrap(), 0xAABB);

        // The next read loads the second sample.
        assert_eq!(r.read_bits(8).unwrap(), 0x11);
        assert_eq!(r.absolute_byte_offset(), 7);
        assert_eq!(r.sample_index(), Some(2));
        assert_eq!(r.read_bits(16).unwrap(), 0x2233);

        assert!(matches!(
            r.read_bit(),
            Err(Error::SamplesExhausted { index: 2 })
        ));
    }

    #[test]
    fn test_sample_refill_drops_unread_bits() {
        let data = vec![0, 0, 0xAA, 0xBB, 0, 0, 0x11, 0x22, 0x33, 0];
        let map = samples();
        let mut r = BitstreamReader::with_samples(Cursor::new(data), &map).unwrap();

        r.read_bits(12).unwrap();
        // Only 4 bits left in sample 0; an 8-bit read starts on sample 1.
        assert_eq!(r.read_bits(8).unwrap(), 0x11);
    }

    #[test]
    fn test_corrupt_sample_map() {
        let data = vec![0u8; 32];
        let map = vec![Sample::new(0, 4, SampleType::Raw)];
        assert!(matches!(
            BitstreamReader::with_samples(Cursor::new(data.clone()), &map),
            Err(Error::CorruptSample { index: 0, .. })
        ));

        let map = vec![Sample::new(4, 0, SampleType::Raw)];
        assert!(matches!(
            BitstreamReader::with_samples(Cursor::new(data.clone()), &map),
            Err(Error::CorruptSample { index: 0, .. })
        ));

        let map = vec![Sample::new(30, 8, SampleType::Raw)];
        assert!(matches!(
            BitstreamReader::with_samples(Cursor::new(data.clone()), &map),
            Err(Error::CorruptSample { index: 0, .. })
        ));

        let map = vec![Sample::new(u64::MAX - 4, 16, SampleType::Raw)];
        assert!(matches!(
            BitstreamReader::with_samples(Cursor::new(data), &map),
            Err(Error::CorruptSample { index: 0, .. })
        ));
    }

    #[test]
    fn test_seek_refused_in_sample_mode() {
        let data = vec![0, 0, 0xAA, 0xBB, 0, 0, 0x11, 0x22, 0x33, 0];
        let map = samples();
        let mut r = BitstreamReader::with_samples(Cursor::new(data), &map).unwrap();
        assert!(matches!(
            r.seek_to_byte_offset(6),
            Err(Error::Unsupported(_))
        ));
    }
}
