//! EBML variable-length fields and typed payload readers.
//!
//! An EBML variable-length integer starts with `k` zero bits and a marker
//! bit, followed by `(k + 1) * 7` payload bits. Element ids keep the marker
//! in their value (`0x1A45DFA3`), sizes do not (`0x82` is 2).

use crate::bitstream::BitstreamReader;
use crate::walker::{Element, ElementFormat};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::io::{Read, Seek};

/// Leading zeros allowed in an element id (4-byte ids).
pub const MAX_ID_LEADING_ZEROS: u32 = 3;

/// Leading zeros allowed in a size field (8-byte sizes).
pub const MAX_SIZE_LEADING_ZEROS: u32 = 7;

/// Largest binary payload read into memory (16 MB).
pub const MAX_BINARY_SIZE: u64 = 16 * 1024 * 1024;

/// Seconds between the Unix epoch and the EBML date epoch (2001-01-01).
const EBML_EPOCH_OFFSET_SECS: i64 = 978_307_200;

/// A decoded variable-length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vint {
    pub value: u64,
    /// Encoded length in bytes.
    pub len: u32,
    /// All payload bits set: the size is unknown.
    pub unknown: bool,
}

/// Read an element id; the value keeps its length marker.
pub fn read_vint_id<R: Read + Seek>(reader: &mut BitstreamReader<'_, R>) -> Result<Vint> {
    let (payload, bits, zeros) = read_vint(reader, MAX_ID_LEADING_ZEROS)?;
    Ok(Vint {
        value: payload + (1u64 << bits),
        len: (bits + zeros + 1) / 8,
        unknown: false,
    })
}

/// Read an element size.
pub fn read_vint_size<R: Read + Seek>(reader: &mut BitstreamReader<'_, R>) -> Result<Vint> {
    let (payload, bits, zeros) = read_vint(reader, MAX_SIZE_LEADING_ZEROS)?;
    Ok(Vint {
        value: payload,
        len: (bits + zeros + 1) / 8,
        unknown: payload == (1u64 << bits) - 1,
    })
}

/// Returns (payload, payload bit count, leading zero count).
fn read_vint<R: Read + Seek>(
    reader: &mut BitstreamReader<'_, R>,
    max_zeros: u32,
) -> Result<(u64, u32, u32)> {
    let offset = reader.absolute_byte_offset();
    let mut zeros = 0;
    while reader.read_bit()? == 0 {
        zeros += 1;
        if zeros > max_zeros {
            return Err(Error::InvalidVint {
                offset,
                leading_zeros: zeros,
            });
        }
    }
    let bits = (zeros + 1) * 7;
    let payload = reader.read_bits_64(bits)?;
    Ok((payload, bits, zeros))
}

/// Read an unsigned integer payload of `size` bytes.
pub fn read_uint<R: Read + Seek>(reader: &mut BitstreamReader<'_, R>, size: u64) -> Result<u64> {
    match size {
        0 => Ok(0),
        1..=8 => reader.read_bits_64(size as u32 * 8),
        _ => Err(Error::invalid_element(
            reader.absolute_byte_offset(),
            format!("unsigned integer of {} bytes", size),
        )),
    }
}

/// Read a signed (two's complement) integer payload of `size` bytes.
pub fn read_int<R: Read + Seek>(reader: &mut BitstreamReader<'_, R>, size: u64) -> Result<i64> {
    match size {
        0 => Ok(0),
        1..=8 => {
            let bits = size as u32 * 8;
            let raw = reader.read_bits_64(bits)?;
            let shift = 64 - bits;
            Ok(((raw << shift) as i64) >> shift)
        }
        _ => Err(Error::invalid_element(
            reader.absolute_byte_offset(),
            format!("signed integer of {} bytes", size),
        )),
    }
}

/// Read an IEEE float payload of 0, 4 or 8 bytes.
pub fn read_float<R: Read + Seek>(reader: &mut BitstreamReader<'_, R>, size: u64) -> Result<f64> {
    match size {
        0 => Ok(0.0),
        4 => Ok(f32::from_bits(reader.read_bits(32)?) as f64),
        8 => Ok(f64::from_bits(reader.read_bits_64(64)?)),
        _ => Err(Error::invalid_element(
            reader.absolute_byte_offset(),
            format!("float of {} bytes", size),
        )),
    }
}

/// Read a binary payload.
pub fn read_binary<R: Read + Seek>(
    reader: &mut BitstreamReader<'_, R>,
    size: u64,
) -> Result<Vec<u8>> {
    if size > MAX_BINARY_SIZE {
        return Err(Error::invalid_element(
            reader.absolute_byte_offset(),
            format!("binary payload of {} bytes exceeds {}", size, MAX_BINARY_SIZE),
        ));
    }
    reader.read_bytes(size as usize)
}

/// Read a string payload, dropping trailing NUL padding.
pub fn read_string<R: Read + Seek>(
    reader: &mut BitstreamReader<'_, R>,
    size: u64,
) -> Result<String> {
    let bytes = read_binary(reader, size)?;
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

/// Read a date payload (nanoseconds since 2001-01-01T00:00:00 UTC).
pub fn read_date<R: Read + Seek>(
    reader: &mut BitstreamReader<'_, R>,
    size: u64,
) -> Result<DateTime<Utc>> {
    let offset = reader.absolute_byte_offset();
    let ns = read_int(reader, size)?;
    let secs = EBML_EPOCH_OFFSET_SECS + ns.div_euclid(1_000_000_000);
    let nanos = ns.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| Error::invalid_element(offset, "date out of range"))
}

/// EBML element header codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ebml;

impl ElementFormat for Ebml {
    fn read_header<R: Read + Seek>(
        &self,
        reader: &mut BitstreamReader<'_, R>,
    ) -> Result<Element> {
        let start = reader.absolute_byte_offset();
        let id = read_vint_id(reader)?;
        let size = read_vint_size(reader)?;

        let mut element = Element::new(id.value as u32, start, id.len + size.len, size.value);
        element.unknown_size = size.unknown;
        Ok(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(data: &[u8]) -> BitstreamReader<'static, Cursor<Vec<u8>>> {
        BitstreamReader::new(Cursor::new(data.to_vec())).unwrap()
    }

    #[test]
    fn test_size_one_byte() {
        let mut r = reader(&[0x82, 0x00]);
        let size = read_vint_size(&mut r).unwrap();
        assert_eq!(size.value, 2);
        assert_eq!(size.len, 1);
        assert!(!size.unknown);
    }

    #[test]
    fn test_id_two_bytes() {
        let mut r = reader(&[0x40, 0x02, 0x00]);
        let id = read_vint_id(&mut r).unwrap();
        assert_eq!(id.value, 0x4002);
        assert_eq!(id.len, 2);
        assert_eq!(r.absolute_byte_offset(), 2);
    }

    #[test]
    fn test_id_four_bytes() {
        let mut r = reader(&[0x1A, 0x45, 0xDF, 0xA3, 0x00]);
        let id = read_vint_id(&mut r).unwrap();
        assert_eq!(id.value, 0x1A45DFA3);
        assert_eq!(id.len, 4);
    }

    #[test]
    fn test_size_eight_bytes() {
        let mut r = reader(&[0x01, 0, 0, 0, 0, 0, 0x01, 0x00, 0xFF]);
        let size = read_vint_size(&mut r).unwrap();
        assert_eq!(size.value, 256);
        assert_eq!(size.len, 8);
    }

    #[test]
    fn test_unknown_size() {
        let mut r = reader(&[0xFF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(read_vint_size(&mut r).unwrap().unknown);
        assert!(read_vint_size(&mut r).unwrap().unknown);
    }

    #[test]
    fn test_too_many_leading_zeros() {
        let mut r = reader(&[0x08, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert!(matches!(
            read_vint_id(&mut r),
            Err(Error::InvalidVint {
                offset: 0,
                leading_zeros: 4
            })
        ));

        let mut r = reader(&[0x00, 0x80, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            read_vint_size(&mut r),
            Err(Error::InvalidVint { .. })
        ));
    }

    #[test]
    fn test_typed_payloads() {
        let mut data = vec![0x01, 0x00]; // uint 256
        data.extend_from_slice(&[0xFF, 0xFE]); // int -2
        data.extend_from_slice(&1.5f32.to_bits().to_be_bytes());
        data.extend_from_slice(&(-0.25f64).to_bits().to_be_bytes());
        data.extend_from_slice(b"eng\0\0");
        data.push(0);

        let mut r = reader(&data);
        assert_eq!(read_uint(&mut r, 2).unwrap(), 256);
        assert_eq!(read_int(&mut r, 2).unwrap(), -2);
        assert_eq!(read_float(&mut r, 4).unwrap(), 1.5);
        assert_eq!(read_float(&mut r, 8).unwrap(), -0.25);
        assert_eq!(read_string(&mut r, 5).unwrap(), "eng");
        assert_eq!(read_uint(&mut r, 0).unwrap(), 0);
        assert!(read_float(&mut r, 3).is_err());
    }

    #[test]
    fn test_date() {
        // One day after the EBML epoch.
        let ns: i64 = 86_400 * 1_000_000_000;
        let mut r = reader(&ns.to_be_bytes());
        let date = read_date(&mut r, 8).unwrap();
        assert_eq!(date.to_rfc3339(), "2001-01-02T00:00:00+00:00");
    }

    #[test]
    fn test_header() {
        // Segment id, 1-byte size 0x85 (5), then payload.
        let mut r = reader(&[0x18, 0x53, 0x80, 0x67, 0x85, 1, 2, 3, 4, 5]);
        let element = Ebml.read_header(&mut r).unwrap();
        assert_eq!(element.id, 0x18538067);
        assert_eq!(element.header_len, 5);
        assert_eq!(element.size, 5);
        assert_eq!(element.end, 10);
        assert_eq!(element.payload_offset(), 5);
        assert!(!element.unknown_size);
    }
}
