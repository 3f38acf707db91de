//! MP4/MOV (ISO base media) container parsing
//!
//! Boxes are a big-endian 32-bit size and a FourCC. A size of 1 means a
//! 64-bit size follows the type, a size of 0 means the box runs to the end
//! of its parent. Leaf boxes are read whole and decoded from memory; the
//! `stbl` children of each track feed a [`SampleTableBuilder`] that is
//! resolved into samples once the walk is over.

pub mod atoms;
pub mod sample_table;

pub use atoms::{AtomType, HandlerType, TrackInfo};
pub use sample_table::{SampleEntry, SampleTableBuilder};

use std::io::{Read, Seek};

use chrono::DateTime;
use tracing::{debug, warn};
use trackmap_media::{
    BitstreamReader, CodecTag, Element, ElementFormat, Error, MediaFile, Result, Sample,
    SampleType, StreamKind, TraceSink, Track, Visit, Visitor, WalkStats, Walker,
};

use super::CancelFlag;
use crate::ProbeOptions;

/// Maximum leaf box payload read into memory (64 MB).
const MAX_ATOM_DATA_SIZE: u64 = 64 * 1024 * 1024;

/// Seconds between 1904-01-01 (QuickTime epoch) and the Unix epoch.
const QUICKTIME_EPOCH_OFFSET_SECS: i64 = 2_082_844_800;

/// ISO BMFF box header codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoBox;

impl ElementFormat for IsoBox {
    fn read_header<R: Read + Seek>(&self, reader: &mut BitstreamReader<'_, R>) -> Result<Element> {
        let start = reader.absolute_byte_offset();
        let size = reader.read_bits(32)? as u64;
        let kind = reader.read_fourcc()?;
        let id = u32::from_be_bytes(kind);

        let (header_len, total) = match size {
            0 => {
                let mut element = Element::new(id, start, 8, 0);
                element.unknown_size = true;
                return Ok(element);
            }
            1 => (16, reader.read_bits_64(64)?),
            n => (8, n),
        };

        if total < header_len as u64 {
            return Err(Error::invalid_element(
                start,
                format!("box '{}' declares {} bytes", AtomType(kind), total),
            ));
        }
        Ok(Element::new(id, start, header_len, total - header_len as u64))
    }

    fn label(&self, id: u32) -> String {
        AtomType::from_id(id).to_string()
    }
}

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn be_u64(data: &[u8], at: usize) -> Option<u64> {
    let hi = be_u32(data, at)? as u64;
    let lo = be_u32(data, at + 4)? as u64;
    Some(hi << 32 | lo)
}

/// Entries of a full-box table: count at offset 4, entries from offset 8.
///
/// The count is bounded by the payload length, so a corrupt count cannot
/// drive a huge allocation.
fn table<T>(data: &[u8], stride: usize, entry: impl Fn(&[u8]) -> T) -> Vec<T> {
    let declared = be_u32(data, 4).unwrap_or(0) as usize;
    let available = data.len().saturating_sub(8) / stride;
    data.get(8..)
        .unwrap_or_default()
        .chunks_exact(stride)
        .take(declared.min(available))
        .map(entry)
        .collect()
}

fn parse_mvhd(data: &[u8]) -> Option<(u32, u64, u64)> {
    match *data.first()? {
        0 => Some((
            be_u32(data, 12)?,
            be_u32(data, 16)? as u64,
            be_u32(data, 4)? as u64,
        )),
        _ => Some((be_u32(data, 20)?, be_u64(data, 24)?, be_u64(data, 4)?)),
    }
}

fn parse_tkhd(data: &[u8], track: &mut TrackInfo) {
    let (id_at, size_at) = match data.first() {
        Some(0) => (12, 76),
        Some(_) => (20, 84),
        None => return,
    };
    if let Some(id) = be_u32(data, id_at) {
        track.track_id = id;
    }
    // 16.16 fixed point
    if let (Some(w), Some(h)) = (be_u32(data, size_at), be_u32(data, size_at + 4)) {
        track.width = Some(w >> 16);
        track.height = Some(h >> 16);
    }
}

fn parse_mdhd(data: &[u8], track: &mut TrackInfo) {
    let parsed = match data.first() {
        Some(0) => be_u32(data, 12)
            .zip(be_u32(data, 16).map(u64::from))
            .zip(be_u16(data, 20)),
        Some(_) => be_u32(data, 20).zip(be_u64(data, 24)).zip(be_u16(data, 32)),
        None => None,
    };
    if let Some(((timescale, duration), language)) = parsed {
        track.timescale = timescale;
        track.duration = duration;
        track.language = atoms::unpack_language(language);
    }
}

fn parse_stsd(data: &[u8], track: &mut TrackInfo) {
    // Full box header (8), then the first sample entry: size (4), format (4)
    let Some(format) = data.get(12..16) else {
        return;
    };
    track.codec = Some([format[0], format[1], format[2], format[3]]);

    match track.handler_type {
        HandlerType::Audio => {
            // AudioSampleEntry: channelCount at 32, sampleSize at 34, 16.16 rate at 40
            track.channels = be_u16(data, 32);
            track.bits_per_sample = be_u16(data, 34);
            track.sample_rate = be_u32(data, 40).map(|r| r >> 16);
        }
        HandlerType::Video => {
            if let (Some(w), Some(h)) = (be_u16(data, 40), be_u16(data, 42)) {
                track.width = Some(w as u32);
                track.height = Some(h as u32);
            }
        }
        _ => {}
    }
}

fn parse_stbl_child(atom: AtomType, data: &[u8], builder: &mut SampleTableBuilder) {
    match atom {
        AtomType::STTS => builder.set_stts(table(data, 8, |e| {
            (be_u32(e, 0).unwrap_or(0), be_u32(e, 4).unwrap_or(0))
        })),
        AtomType::STSS => builder.set_sync_samples(table(data, 4, |e| be_u32(e, 0).unwrap_or(0))),
        AtomType::STSC => builder.set_stsc(table(data, 12, |e| {
            (
                be_u32(e, 0).unwrap_or(0),
                be_u32(e, 4).unwrap_or(0),
                be_u32(e, 8).unwrap_or(0),
            )
        })),
        AtomType::STSZ => {
            let uniform = be_u32(data, 4).unwrap_or(0);
            let declared = be_u32(data, 8).unwrap_or(0);
            let sizes = if uniform == 0 {
                data.get(12..)
                    .unwrap_or_default()
                    .chunks_exact(4)
                    .take(declared as usize)
                    .map(|e| u32::from_be_bytes([e[0], e[1], e[2], e[3]]))
                    .collect()
            } else {
                Vec::new()
            };
            builder.set_stsz(uniform, declared, sizes);
        }
        AtomType::STCO => builder.set_chunk_offsets(table(data, 4, |e| {
            be_u32(e, 0).unwrap_or(0) as u64
        })),
        AtomType::CO64 => builder.set_chunk_offsets(table(data, 8, |e| be_u64(e, 0).unwrap_or(0))),
        // Version 0 offsets are unsigned; both versions share the bit layout
        AtomType::CTTS => builder.set_ctts(table(data, 8, |e| {
            (be_u32(e, 0).unwrap_or(0), be_u32(e, 4).unwrap_or(0) as i32)
        })),
        _ => {}
    }
}

/// QuickTime user-data string: length (2), language (2), text.
fn parse_udta_string(data: &[u8]) -> Option<String> {
    let len = be_u16(data, 0)? as usize;
    let text = data.get(4..4 + len)?;
    Some(String::from_utf8_lossy(text).into_owned())
}

struct Mp4Visitor<'m> {
    media: &'m mut MediaFile,
    cancel: CancelFlag,
    max_samples: usize,
    source_size: u64,
    movie_timescale: u32,
    movie_duration: u64,
    current: Option<TrackInfo>,
    tracks: Vec<TrackInfo>,
}

impl Mp4Visitor<'_> {
    fn payload<R: Read + Seek>(
        reader: &mut BitstreamReader<'_, R>,
        element: &Element,
    ) -> Result<Vec<u8>> {
        let size = element.end.min(reader.size()).saturating_sub(element.payload_offset());
        if size > MAX_ATOM_DATA_SIZE {
            return Err(Error::invalid_element(
                element.start,
                format!(
                    "box '{}' data size {} exceeds maximum {}",
                    AtomType::from_id(element.id),
                    size,
                    MAX_ATOM_DATA_SIZE
                ),
            ));
        }
        reader.read_bytes(size as usize)
    }

    fn finish(self) {
        if self.movie_timescale > 0 {
            self.media.duration_ms =
                self.movie_duration as f64 * 1000.0 / self.movie_timescale as f64;
        }

        for info in self.tracks {
            let track_id = info.track_id;
            let track = track_from_info(info, self.max_samples, self.source_size);
            if let Err(err) = self.media.add_track(track) {
                warn!(error = %err, track = track_id, "track dropped");
            }
        }
    }
}

fn track_from_info(info: TrackInfo, max_samples: usize, source_size: u64) -> Track {
    let kind = info.handler_type.stream_kind();
    let entries = info.samples.build(max_samples, source_size);
    if entries.len() < info.samples.sample_count() {
        warn!(
            track = info.track_id,
            declared = info.samples.sample_count(),
            kept = entries.len(),
            "sample table truncated"
        );
    }

    let mut track = Track::new(info.track_id, kind, entries.len());
    for entry in &entries {
        let sample_type = match kind {
            StreamKind::Video if entry.is_keyframe => SampleType::VideoKeyframe,
            StreamKind::Video => SampleType::Video,
            StreamKind::Audio => SampleType::Audio,
            StreamKind::Subtitle => SampleType::Text,
            StreamKind::Other => SampleType::Other,
        };
        let sample = Sample::new(entry.offset, entry.size, sample_type)
            .with_timestamps(info.to_micros(entry.pts()), info.to_micros(entry.dts));
        if let Err(err) = track.samples.push(sample) {
            warn!(error = %err, track = info.track_id, "sample dropped");
            break;
        }
    }

    track.codec_tag = info.codec.map(CodecTag::FourCc);
    track.language = info.language.clone();
    track.duration_ms = info.duration_ms();

    match kind {
        StreamKind::Video => {
            track.video.width = info.width.unwrap_or(0);
            track.video.height = info.height.unwrap_or(0);
            if track.duration_ms > 0.0 && !track.samples.is_empty() {
                track.video.frame_rate = track.samples.len() as f64 * 1000.0 / track.duration_ms;
            }
        }
        StreamKind::Audio => {
            track.audio.sampling_rate = info.sample_rate.unwrap_or(0);
            track.audio.channel_count = info.channels.unwrap_or(0);
            track.audio.bits_per_sample = info.bits_per_sample.unwrap_or(0);
        }
        _ => {}
    }

    track
}

impl<R: Read + Seek> Visitor<R> for Mp4Visitor<'_> {
    fn enter(
        &mut self,
        reader: &mut BitstreamReader<'_, R>,
        element: &Element,
        depth: usize,
    ) -> Result<Visit> {
        if depth == 0 && self.cancel.is_set() {
            return Ok(Visit::Stop);
        }

        let atom = AtomType::from_id(element.id);
        if atom.is_container() {
            if atom == AtomType::TRAK {
                self.current = Some(TrackInfo::new());
            }
            return Ok(Visit::Descend);
        }

        match atom {
            AtomType::FTYP => {
                let brand = reader.read_fourcc()?;
                debug!(brand = %AtomType(brand), "file type");
            }
            AtomType::MVHD => {
                let data = Self::payload(reader, element)?;
                if let Some((timescale, duration, created)) = parse_mvhd(&data) {
                    self.movie_timescale = timescale;
                    self.movie_duration = duration;
                    if created > 0 {
                        self.media.creation_date =
                            DateTime::from_timestamp(created as i64 - QUICKTIME_EPOCH_OFFSET_SECS, 0);
                    }
                }
            }
            AtomType::NAME | AtomType::TOOL => {
                let data = Self::payload(reader, element)?;
                let value = parse_udta_string(&data);
                if atom == AtomType::NAME {
                    self.media.title = value;
                } else {
                    self.media.creation_app = value;
                }
            }
            AtomType::TKHD
            | AtomType::MDHD
            | AtomType::HDLR
            | AtomType::STSD
            | AtomType::STTS
            | AtomType::STSS
            | AtomType::STSC
            | AtomType::STSZ
            | AtomType::STCO
            | AtomType::CO64
            | AtomType::CTTS => {
                if self.current.is_none() {
                    return Ok(Visit::Skip);
                }
                let data = Self::payload(reader, element)?;
                let Some(track) = self.current.as_mut() else {
                    return Ok(Visit::Skip);
                };
                match atom {
                    AtomType::TKHD => parse_tkhd(&data, track),
                    AtomType::MDHD => parse_mdhd(&data, track),
                    AtomType::HDLR => {
                        if let Some(handler) = data.get(8..12) {
                            track.handler_type = HandlerType::from_bytes([
                                handler[0], handler[1], handler[2], handler[3],
                            ]);
                        }
                    }
                    AtomType::STSD => parse_stsd(&data, track),
                    _ => parse_stbl_child(atom, &data, &mut track.samples),
                }
            }
            _ => return Ok(Visit::Skip),
        }
        Ok(Visit::Done)
    }

    fn leave(&mut self, element: &Element, _depth: usize) -> Result<()> {
        if AtomType::from_id(element.id) == AtomType::TRAK {
            if let Some(track) = self.current.take() {
                debug!(
                    track = track.track_id,
                    handler = ?track.handler_type,
                    samples = track.samples.sample_count(),
                    "track parsed"
                );
                self.tracks.push(track);
            }
        }
        Ok(())
    }

    fn element_name(&self, id: u32) -> Option<&'static str> {
        AtomType::from_id(id).name()
    }
}

/// Walk an MP4 file and add its tracks to `media`.
pub fn demux<R: Read + Seek>(
    reader: &mut BitstreamReader<'_, R>,
    media: &mut MediaFile,
    options: &ProbeOptions,
    sink: &mut dyn TraceSink,
) -> Result<WalkStats> {
    let mut visitor = Mp4Visitor {
        media,
        cancel: CancelFlag::new(options.cancel.clone()),
        max_samples: options.max_samples,
        source_size: reader.size(),
        movie_timescale: 0,
        movie_duration: 0,
        current: None,
        tracks: Vec::new(),
    };
    let stats = Walker::new(IsoBox, sink)
        .with_max_depth(options.max_depth)
        .walk(reader, &mut visitor)?;
    visitor.finish();
    Ok(stats)
}
