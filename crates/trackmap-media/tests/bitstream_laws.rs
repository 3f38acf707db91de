//! Bit-level reader laws checked against vectors written with bitstream-io.

use bitstream_io::{BigEndian, BitWrite, BitWriter};
use std::io::Cursor;
use trackmap_media::BitstreamReader;

const PATTERN: u64 = 0xA5C3_5A3C_F00F_1E2D;
const PREFIX_LEN: usize = 13;

fn mask(n: u32) -> u64 {
    if n == 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// `PREFIX_LEN` filler bytes, then `align` bits, then `value` on `n` bits.
fn vector(align: u32, n: u32, value: u64) -> Vec<u8> {
    let mut writer = BitWriter::endian(Vec::new(), BigEndian);
    if align > 0 {
        writer.write(align, 0b0101_0101u64 & mask(align)).unwrap();
    }
    writer.write(n, value).unwrap();
    writer.write(16, 0xFFFFu64).unwrap();
    writer.byte_align().unwrap();

    let mut data = vec![0x55u8; PREFIX_LEN];
    data.extend(writer.into_writer());
    data
}

fn small_window(data: Vec<u8>) -> BitstreamReader<'static, Cursor<Vec<u8>>> {
    BitstreamReader::with_buffer_size(Cursor::new(data), 16).unwrap()
}

#[test]
fn test_round_trip_every_width_and_alignment() {
    for align in 0..8u32 {
        for n in 1..=64u32 {
            let value = PATTERN.rotate_left(n + align) & mask(n);
            let mut reader = small_window(vector(align, n, value));
            reader.skip_bits(PREFIX_LEN as u64 * 8 + align as u64).unwrap();

            if n <= 32 {
                assert_eq!(
                    reader.peek_bits(n).unwrap() as u64,
                    value,
                    "peek_bits n={} align={}",
                    n,
                    align
                );
            }
            assert_eq!(
                reader.peek_bits_64(n).unwrap(),
                value,
                "peek_bits_64 n={} align={}",
                n,
                align
            );
            assert_eq!(
                reader.read_bits_64(n).unwrap(),
                value,
                "read_bits_64 n={} align={}",
                n,
                align
            );
            assert_eq!(
                reader.absolute_bit_offset(),
                PREFIX_LEN as u64 * 8 + (align + n) as u64
            );
            assert_eq!(reader.read_bits(16).unwrap(), 0xFFFF);
        }
    }
}

#[test]
fn test_single_bits_match_multi_bit_read() {
    for align in 0..8u32 {
        for n in 1..=32u32 {
            let value = PATTERN.rotate_right(n) & mask(n);
            let data = vector(align, n, value);
            let start = PREFIX_LEN as u64 * 8 + align as u64;

            let mut bitwise = small_window(data.clone());
            bitwise.skip_bits(start).unwrap();
            let mut acc = 0u32;
            for _ in 0..n {
                acc = (acc << 1) | bitwise.read_bit().unwrap();
            }

            let mut whole = small_window(data);
            whole.skip_bits(start).unwrap();
            let read = whole.read_bits(n).unwrap();

            assert_eq!(acc, read, "n={} align={}", n, align);
            assert_eq!(acc as u64, value);
            assert_eq!(bitwise.absolute_bit_offset(), whole.absolute_bit_offset());
        }
    }
}

#[test]
fn test_skip_then_rewind_restores_position() {
    let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let skips = [1u64, 5, 8, 64, 127, 128, 129, 300, 1000, 8 * 1024, 20_000];

    for start in [0u64, 3, 77, 1024] {
        for &n in &skips {
            let mut reader = small_window(data.clone());
            reader.skip_bits(start).unwrap();
            let before = reader.absolute_bit_offset();

            reader.skip_bits(n).unwrap();
            assert_eq!(reader.absolute_bit_offset(), before + n);
            reader.rewind_bits(n).unwrap();
            assert_eq!(reader.absolute_bit_offset(), before, "start={} n={}", start, n);

            // Content at the restored position matches the source.
            let byte = (before / 8) as usize;
            let expected = ((data[byte] as u32) << 8 | data[byte + 1] as u32) >> (8 - before % 8);
            assert_eq!(reader.peek_bits(8).unwrap(), expected & 0xFF);
        }
    }
}

#[test]
fn test_large_window_behaves_like_small_window() {
    let data: Vec<u8> = (0..200u32).map(|i| (i * 37 % 251) as u8).collect();
    let mut small = small_window(data.clone());
    let mut large = BitstreamReader::new(Cursor::new(data)).unwrap();

    for width in [3u32, 17, 32, 1, 9, 64, 12, 25, 7, 60, 31, 5, 2, 48, 11] {
        assert_eq!(small.read_bits_64(width).unwrap(), large.read_bits_64(width).unwrap());
        assert_eq!(small.absolute_bit_offset(), large.absolute_bit_offset());
    }
}
