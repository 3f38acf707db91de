//! RIFF WAVE container parsing
//!
//! RIFF chunks are a little-endian FourCC and a 32-bit size, padded to an
//! even length. `RIFF` and `LIST` chunks carry a list type and nest further
//! chunks. Linear PCM payloads are split into one sample per PCM frame; any
//! other payload is a single raw sample covering the `data` chunk.

use std::io::{Read, Seek};

use tracing::{debug, warn};
use trackmap_media::{
    BitrateMode, BitstreamReader, CodecTag, Element, ElementFormat, Error, MediaFile, Result,
    Sample, SampleTable, SampleType, StreamKind, TraceSink, Track, Visit, Visitor, WalkStats,
    Walker,
};

use super::CancelFlag;
use crate::ProbeOptions;

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// RIFF chunk header codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Riff;

impl ElementFormat for Riff {
    fn read_header<R: Read + Seek>(&self, reader: &mut BitstreamReader<'_, R>) -> Result<Element> {
        let start = reader.absolute_byte_offset();
        let id = reader.read_fourcc()?;
        let size = reader.read_u32_le()? as u64;

        let mut element = if &id == b"RIFF" || &id == b"LIST" {
            let list_type = reader.read_fourcc()?;
            let mut element = Element::new(u32::from_be_bytes(id), start, 12, size.saturating_sub(4));
            element.list_type = Some(list_type);
            element
        } else {
            Element::new(u32::from_be_bytes(id), start, 8, size)
        };

        if size % 2 == 1 {
            element.end = element.end.saturating_add(1);
        }
        Ok(element)
    }

    fn label(&self, id: u32) -> String {
        fourcc_label(id)
    }
}

fn fourcc_label(id: u32) -> String {
    String::from_utf8_lossy(&id.to_be_bytes()).into_owned()
}

/// Contents of the `fmt ` chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaveFormat {
    /// Format tag; for WAVE_FORMAT_EXTENSIBLE, the sub-format's tag.
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WaveFormat {
    fn is_linear_pcm(&self) -> bool {
        matches!(self.format_tag, WAVE_FORMAT_PCM | WAVE_FORMAT_IEEE_FLOAT)
    }

    /// Bytes of one PCM frame (all channels).
    fn frame_size(&self) -> u32 {
        let computed = self.channels as u32 * (self.bits_per_sample as u32).div_ceil(8);
        if computed > 0 {
            computed
        } else {
            self.block_align as u32
        }
    }
}

fn read_format<R: Read + Seek>(
    reader: &mut BitstreamReader<'_, R>,
    element: &Element,
) -> Result<WaveFormat> {
    if element.size < 16 {
        return Err(Error::invalid_element(
            element.start,
            format!("fmt chunk of {} bytes", element.size),
        ));
    }

    let mut format = WaveFormat {
        format_tag: reader.read_u16_le()?,
        channels: reader.read_u16_le()?,
        sample_rate: reader.read_u32_le()?,
        avg_bytes_per_sec: reader.read_u32_le()?,
        block_align: reader.read_u16_le()?,
        bits_per_sample: reader.read_u16_le()?,
    };

    if format.format_tag == WAVE_FORMAT_EXTENSIBLE && element.size >= 40 {
        let extension_size = reader.read_u16_le()?;
        if extension_size >= 22 {
            let _valid_bits = reader.read_u16_le()?;
            let _channel_mask = reader.read_u32_le()?;
            // The sub-format GUID starts with the effective format tag
            format.format_tag = reader.read_u16_le()?;
        }
    }
    Ok(format)
}

fn read_info_string<R: Read + Seek>(
    reader: &mut BitstreamReader<'_, R>,
    element: &Element,
) -> Result<String> {
    let bytes = reader.read_bytes(element.size.min(u16::MAX as u64) as usize)?;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..end]).trim().to_string())
}

struct WaveVisitor<'m> {
    media: &'m mut MediaFile,
    cancel: CancelFlag,
    format: Option<WaveFormat>,
    fact_samples: Option<u32>,
    data: Option<(u64, u64)>,
}

impl<R: Read + Seek> Visitor<R> for WaveVisitor<'_> {
    fn enter(
        &mut self,
        reader: &mut BitstreamReader<'_, R>,
        element: &Element,
        depth: usize,
    ) -> Result<Visit> {
        if self.cancel.is_set() {
            return Ok(Visit::Stop);
        }

        let visit = match (&element.fourcc(), element.list_type.as_ref()) {
            (b"RIFF", Some(b"WAVE")) if depth == 0 => Visit::Descend,
            (b"RIFF", other) => {
                warn!(
                    offset = element.start,
                    list_type = ?other.map(|t| String::from_utf8_lossy(t).into_owned()),
                    "RIFF chunk is not WAVE, skipping"
                );
                Visit::Skip
            }
            (b"LIST", Some(b"INFO")) => Visit::Descend,
            (b"fmt ", _) => {
                let format = read_format(reader, element)?;
                debug!(?format, "WAVE format");
                self.format = Some(format);
                Visit::Done
            }
            (b"fact", _) if element.size >= 4 => {
                self.fact_samples = Some(reader.read_u32_le()?);
                Visit::Done
            }
            (b"data", _) => {
                let available = reader.size().saturating_sub(element.payload_offset());
                self.data = Some((element.payload_offset(), element.size.min(available)));
                Visit::Done
            }
            (b"ISFT", _) => {
                self.media.creation_app = Some(read_info_string(reader, element)?);
                Visit::Done
            }
            (b"INAM", _) => {
                self.media.title = Some(read_info_string(reader, element)?);
                Visit::Done
            }
            _ => Visit::Skip,
        };
        Ok(visit)
    }

    fn element_name(&self, id: u32) -> Option<&'static str> {
        match &id.to_be_bytes() {
            b"RIFF" => Some("RIFF"),
            b"LIST" => Some("LIST"),
            b"fmt " => Some("Format"),
            b"fact" => Some("Fact"),
            b"data" => Some("Data"),
            b"ISFT" => Some("Software"),
            b"INAM" => Some("Name"),
            _ => None,
        }
    }
}

impl WaveVisitor<'_> {
    fn finish(self, max_samples: usize) -> Result<()> {
        let Some(format) = self.format else {
            warn!("WAVE file without a fmt chunk");
            return Ok(());
        };

        let mut track = Track::new(1, StreamKind::Audio, 0);
        track.codec_tag = Some(CodecTag::TwoCc(format.format_tag));
        track.audio.sampling_rate = format.sample_rate;
        track.audio.channel_count = format.channels;
        track.audio.bits_per_sample = format.bits_per_sample;

        if let Some((offset, size)) = self.data {
            if format.is_linear_pcm() && format.sample_rate > 0 && format.frame_size() > 0 {
                pcm_samples(&mut track, &format, offset, size, max_samples)?;
            } else {
                raw_sample(&mut track, &format, self.fact_samples, offset, size)?;
            }
        }

        self.media.add_track(track)
    }
}

fn pcm_samples(
    track: &mut Track,
    format: &WaveFormat,
    data_offset: u64,
    data_size: u64,
    max_samples: usize,
) -> Result<()> {
    let frame_size = format.frame_size();
    let count = data_size / frame_size as u64;
    let rate = format.sample_rate as i64;

    track.samples = SampleTable::with_capacity(count.min(max_samples as u64) as usize);
    for i in 0..count {
        let ts = i as i64 * 1_000_000 / rate;
        let sample = Sample::new(data_offset + i * frame_size as u64, frame_size, SampleType::Audio)
            .with_timestamps(ts, ts);
        if let Err(err) = track.samples.push(sample) {
            warn!(error = %err, frames = count, "PCM sample table truncated");
            break;
        }
    }

    track.sample_alignment = true;
    track.intra_only = true;
    track.stream_size = count * frame_size as u64;
    track.duration_ms = count as f64 * 1000.0 / format.sample_rate as f64;
    track.bitrate =
        format.sample_rate as u64 * format.bits_per_sample as u64 * format.channels as u64;
    track.bitrate_mode = BitrateMode::Cbr;
    Ok(())
}

fn raw_sample(
    track: &mut Track,
    format: &WaveFormat,
    fact_samples: Option<u32>,
    data_offset: u64,
    data_size: u64,
) -> Result<()> {
    if data_size == 0 {
        return Ok(());
    }
    let size = u32::try_from(data_size).map_err(|_| {
        Error::invalid_element(data_offset, format!("data chunk of {} bytes", data_size))
    })?;

    track.samples = SampleTable::with_capacity(1);
    track.samples.push(Sample::new(data_offset, size, SampleType::Raw))?;
    track.sample_alignment = false;
    track.frame_count = 1;

    match fact_samples {
        Some(frames) if format.sample_rate > 0 => {
            track.duration_ms = frames as f64 * 1000.0 / format.sample_rate as f64;
        }
        _ if format.avg_bytes_per_sec > 0 => {
            track.duration_ms = data_size as f64 * 1000.0 / format.avg_bytes_per_sec as f64;
        }
        _ => {}
    }
    if format.avg_bytes_per_sec > 0 {
        track.bitrate = format.avg_bytes_per_sec as u64 * 8;
    }
    Ok(())
}

/// Walk a WAVE file and add its audio track to `media`.
pub fn demux<R: Read + Seek>(
    reader: &mut BitstreamReader<'_, R>,
    media: &mut MediaFile,
    options: &ProbeOptions,
    sink: &mut dyn TraceSink,
) -> Result<WalkStats> {
    let mut visitor = WaveVisitor {
        media,
        cancel: CancelFlag::new(options.cancel.clone()),
        format: None,
        fact_samples: None,
        data: None,
    };

    let stats = Walker::new(Riff, sink)
        .with_max_depth(options.max_depth)
        .walk(reader, &mut visitor)?;
    visitor.finish(options.max_samples)?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use trackmap_media::{Container, RecordingSink};

    fn chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn list(id: &[u8; 4], list_type: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
        let mut payload = list_type.to_vec();
        for child in children {
            payload.extend_from_slice(child);
        }
        chunk(id, &payload)
    }

    fn fmt_payload(tag: u16, channels: u16, rate: u32, bits: u16) -> Vec<u8> {
        let block_align = channels * bits / 8;
        let mut p = Vec::new();
        p.extend_from_slice(&tag.to_le_bytes());
        p.extend_from_slice(&channels.to_le_bytes());
        p.extend_from_slice(&rate.to_le_bytes());
        p.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
        p.extend_from_slice(&block_align.to_le_bytes());
        p.extend_from_slice(&bits.to_le_bytes());
        p
    }

    fn demux_bytes(data: Vec<u8>) -> (MediaFile, WalkStats, RecordingSink) {
        let mut reader = BitstreamReader::new(Cursor::new(data)).unwrap();
        let mut media = MediaFile::new(Container::Wave, reader.size(), 4);
        let mut sink = RecordingSink::new();
        let stats = demux(&mut reader, &mut media, &ProbeOptions::default(), &mut sink).unwrap();
        (media, stats, sink)
    }

    #[test]
    fn test_riff_header_padding() {
        let data = [chunk(b"odd ", &[1, 2, 3]), chunk(b"next", &[])].concat();
        let mut reader = BitstreamReader::new(Cursor::new(data)).unwrap();
        let element = Riff.read_header(&mut reader).unwrap();
        assert_eq!(element.fourcc(), *b"odd ");
        assert_eq!(element.size, 3);
        assert_eq!(element.header_len, 8);
        assert_eq!(element.end, 12);
    }

    #[test]
    fn test_riff_list_header() {
        let data = list(b"LIST", b"INFO", &[]);
        let mut reader = BitstreamReader::new(Cursor::new(data)).unwrap();
        let element = Riff.read_header(&mut reader).unwrap();
        assert_eq!(element.header_len, 12);
        assert_eq!(element.size, 0);
        assert_eq!(element.list_type, Some(*b"INFO"));
        assert_eq!(Riff.label(element.id), "LIST");
    }

    #[test]
    fn test_extensible_pcm_and_info() {
        let mut fmt = fmt_payload(WAVE_FORMAT_EXTENSIBLE, 1, 48_000, 24);
        fmt.extend_from_slice(&22u16.to_le_bytes());
        fmt.extend_from_slice(&24u16.to_le_bytes());
        fmt.extend_from_slice(&4u32.to_le_bytes());
        fmt.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
        fmt.extend_from_slice(&[0u8; 14]);

        let data = list(
            b"RIFF",
            b"WAVE",
            &[
                chunk(b"fmt ", &fmt),
                list(b"LIST", b"INFO", &[chunk(b"ISFT", b"Lavf60.3.100\0")]),
                chunk(b"data", &[0u8; 30]),
            ],
        );
        let (media, _, sink) = demux_bytes(data);

        assert_eq!(media.creation_app.as_deref(), Some("Lavf60.3.100"));
        let track = media.audio.get(0).unwrap();
        assert_eq!(track.codec_tag, Some(CodecTag::TwoCc(WAVE_FORMAT_PCM)));
        assert_eq!(track.samples.len(), 10);
        assert_eq!(track.samples.get(1).unwrap().size, 3);
        assert!(sink.names().contains(&"Software"));
    }

    #[test]
    fn test_compressed_payload_is_one_raw_sample() {
        let data = list(
            b"RIFF",
            b"WAVE",
            &[
                chunk(b"fmt ", &fmt_payload(0x0055, 2, 44_100, 0)),
                chunk(b"fact", &88_200u32.to_le_bytes()),
                chunk(b"data", &[0u8; 417]),
            ],
        );
        let (media, _, _) = demux_bytes(data);
        let track = media.audio.get(0).unwrap();

        assert_eq!(track.samples.len(), 1);
        let sample = track.samples.get(0).unwrap();
        assert_eq!(sample.kind, SampleType::Raw);
        assert_eq!(sample.size, 417);
        assert!(!track.sample_alignment);
        assert_eq!(track.duration_ms, 2000.0);
    }

    #[test]
    fn test_pcm_table_capped() {
        let data = list(
            b"RIFF",
            b"WAVE",
            &[
                chunk(b"fmt ", &fmt_payload(WAVE_FORMAT_PCM, 1, 8000, 8)),
                chunk(b"data", &[0x80u8; 64]),
            ],
        );
        let mut reader = BitstreamReader::new(Cursor::new(data)).unwrap();
        let mut media = MediaFile::new(Container::Wave, reader.size(), 4);
        let options = ProbeOptions {
            max_samples: 16,
            ..Default::default()
        };
        demux(&mut reader, &mut media, &options, &mut RecordingSink::new()).unwrap();

        let track = media.audio.get(0).unwrap();
        assert_eq!(track.samples.len(), 16);
        assert_eq!(track.stream_size, 64);
        assert_eq!(track.duration_ms, 8.0);
    }

    #[test]
    fn test_missing_fmt_yields_no_track() {
        let data = list(b"RIFF", b"WAVE", &[chunk(b"data", &[0u8; 8])]);
        let (media, stats, _) = demux_bytes(data);
        assert_eq!(media.track_count(), 0);
        assert!(stats.exhausted);
    }
}
