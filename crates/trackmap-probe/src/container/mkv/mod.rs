//! Matroska (MKV/WebM) container parsing
//!
//! The EBML tree is walked once, front to back. Track entries are collected
//! as they appear; blocks found in clusters are attributed to their track by
//! track number and become samples with microsecond timestamps
//! (`(cluster timecode + block timecode) * TimecodeScale / 1000`).

pub mod elements;

use std::io::{Read, Seek};

use tracing::{debug, trace, warn};
use trackmap_media::ebml::{
    read_date, read_float, read_string, read_uint, read_vint_size, Ebml,
};
use trackmap_media::track::Ratio;
use trackmap_media::{
    BitstreamReader, CodecTag, Element, Error, MediaFile, Result, Sample, SampleTable,
    SampleType, StreamKind, TraceSink, Track, Visit, Visitor, WalkStats, Walker,
};

use self::elements::*;
use super::CancelFlag;
use crate::ProbeOptions;

/// Default TimecodeScale: one millisecond in nanoseconds.
const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// A TrackEntry as declared, plus the samples of its blocks.
#[derive(Debug, Default)]
struct TrackEntry {
    number: u64,
    uid: u64,
    track_type: u64,
    codec_id: Option<String>,
    name: Option<String>,
    language: Option<String>,
    default_duration_ns: u64,
    pixel_width: u64,
    pixel_height: u64,
    display_width: u64,
    display_height: u64,
    sampling_frequency: f64,
    channels: u64,
    bit_depth: u64,
    samples: SampleTable,
    truncated: bool,
}

impl TrackEntry {
    fn kind(&self) -> StreamKind {
        match self.track_type {
            TRACK_TYPE_VIDEO => StreamKind::Video,
            TRACK_TYPE_AUDIO => StreamKind::Audio,
            TRACK_TYPE_SUBTITLE => StreamKind::Subtitle,
            _ => StreamKind::Other,
        }
    }

    fn sample_type(&self, keyframe: bool) -> SampleType {
        match self.kind() {
            StreamKind::Video if keyframe => SampleType::VideoKeyframe,
            StreamKind::Video => SampleType::Video,
            StreamKind::Audio => SampleType::Audio,
            StreamKind::Subtitle => SampleType::Text,
            StreamKind::Other => SampleType::Other,
        }
    }

    fn into_track(self) -> Track {
        let kind = self.kind();
        let mut track = Track::new(self.number as u32, kind, 0);
        track.samples = self.samples;
        track.codec_tag = self.codec_id.map(CodecTag::Matroska);
        track.title = self.name;
        track.language = self.language;

        if self.default_duration_ns > 0 {
            track.frame_duration_ms = self.default_duration_ns as f64 / 1_000_000.0;
        }

        match kind {
            StreamKind::Video => {
                track.video.width = self.pixel_width as u32;
                track.video.height = self.pixel_height as u32;
                if self.display_width > 0 && self.display_height > 0 {
                    track.video.display_aspect = Some(Ratio::new(
                        self.display_width as u32,
                        self.display_height as u32,
                    ));
                }
                if self.default_duration_ns > 0 {
                    track.video.frame_rate = 1_000_000_000.0 / self.default_duration_ns as f64;
                }
            }
            StreamKind::Audio => {
                track.audio.sampling_rate = self.sampling_frequency.round() as u32;
                // Channels defaults to 1 when absent
                track.audio.channel_count = self.channels.max(1) as u16;
                track.audio.bits_per_sample = self.bit_depth as u16;
            }
            _ => {}
        }
        track
    }
}

struct MkvVisitor<'m> {
    media: &'m mut MediaFile,
    cancel: CancelFlag,
    max_samples: usize,
    timecode_scale: u64,
    /// Segment duration in TimecodeScale units.
    duration: Option<f64>,
    muxing_app: Option<String>,
    entries: Vec<TrackEntry>,
    in_entry: bool,
    cluster_timecode: u64,
    /// Entry that received the last Block of the current BlockGroup.
    group_entry: Option<usize>,
    orphan_blocks: usize,
}

impl<'m> MkvVisitor<'m> {
    fn new(media: &'m mut MediaFile, options: &ProbeOptions) -> Self {
        Self {
            media,
            cancel: CancelFlag::new(options.cancel.clone()),
            max_samples: options.max_samples,
            timecode_scale: DEFAULT_TIMECODE_SCALE,
            duration: None,
            muxing_app: None,
            entries: Vec::new(),
            in_entry: false,
            cluster_timecode: 0,
            group_entry: None,
            orphan_blocks: 0,
        }
    }

    fn entry(&mut self) -> Option<&mut TrackEntry> {
        if self.in_entry {
            self.entries.last_mut()
        } else {
            None
        }
    }

    /// Parse a SimpleBlock or Block header and record its frame data as a sample.
    fn block<R: Read + Seek>(
        &mut self,
        reader: &mut BitstreamReader<'_, R>,
        element: &Element,
        simple: bool,
    ) -> Result<Visit> {
        let number = read_vint_size(reader)?.value;
        let relative = reader.read_bits(16)? as u16 as i16;
        let flags = reader.read_aligned_byte()?;

        let offset = reader.absolute_byte_offset();
        let end = element.end.min(reader.size());
        if offset >= end {
            return Err(Error::invalid_element(
                element.start,
                format!("block of {} bytes has no frame data", element.size),
            ));
        }
        let size = u32::try_from(end - offset).map_err(|_| {
            Error::invalid_element(element.start, format!("block of {} bytes", element.size))
        })?;

        let Some(index) = self.entries.iter().position(|e| e.number == number) else {
            self.orphan_blocks += 1;
            trace!(track = number, offset = element.start, "block for undeclared track");
            return Ok(Visit::Done);
        };

        let timecode = self.cluster_timecode as i64 + relative as i64;
        let pts = timecode.saturating_mul(self.timecode_scale as i64) / 1000;
        // Block keyframes are decided by the BlockGroup's ReferenceBlock
        let keyframe = !simple || flags & 0x80 != 0;

        let entry = &mut self.entries[index];
        let kind = entry.sample_type(keyframe);
        if let Err(err) = entry
            .samples
            .push(Sample::new(offset, size, kind).with_timestamps(pts, pts))
        {
            if !entry.truncated {
                warn!(error = %err, track = number, "sample list truncated");
                entry.truncated = true;
            }
            return Ok(Visit::Done);
        }

        if !simple {
            self.group_entry = Some(index);
        }
        Ok(Visit::Done)
    }

    fn finish(self) {
        if let Some(duration) = self.duration {
            self.media.duration_ms = duration * self.timecode_scale as f64 / 1_000_000.0;
        }
        if self.media.creation_app.is_none() {
            self.media.creation_app = self.muxing_app;
        }
        if self.orphan_blocks > 0 {
            debug!(blocks = self.orphan_blocks, "blocks without a track entry");
        }

        for entry in self.entries {
            let number = entry.number;
            if let Err(err) = self.media.add_track(entry.into_track()) {
                warn!(error = %err, track = number, "track dropped");
            }
        }
    }
}

impl<R: Read + Seek> Visitor<R> for MkvVisitor<'_> {
    fn enter(
        &mut self,
        reader: &mut BitstreamReader<'_, R>,
        element: &Element,
        depth: usize,
    ) -> Result<Visit> {
        if depth <= 1 && self.cancel.is_set() {
            return Ok(Visit::Stop);
        }

        let size = element.size;
        match element.id {
            EBML | SEGMENT | INFO | TRACKS | CLUSTER => return Ok(Visit::Descend),
            DOC_TYPE => {
                let doc_type = read_string(reader, size)?;
                if doc_type != "matroska" && doc_type != "webm" {
                    warn!(doc_type = %doc_type, "unexpected EBML document type");
                }
            }
            TRACK_ENTRY => {
                self.entries.push(TrackEntry {
                    samples: SampleTable::bounded(self.max_samples),
                    ..Default::default()
                });
                self.in_entry = true;
                return Ok(Visit::Descend);
            }
            VIDEO | AUDIO if self.in_entry => return Ok(Visit::Descend),
            BLOCK_GROUP => {
                self.group_entry = None;
                return Ok(Visit::Descend);
            }

            TIMECODE_SCALE => match read_uint(reader, size)? {
                0 => warn!("zero TimecodeScale ignored"),
                scale => self.timecode_scale = scale,
            },
            DURATION => self.duration = Some(read_float(reader, size)?),
            DATE_UTC => self.media.creation_date = Some(read_date(reader, size)?),
            TITLE => self.media.title = Some(read_string(reader, size)?),
            MUXING_APP => self.muxing_app = Some(read_string(reader, size)?),
            WRITING_APP => self.media.creation_app = Some(read_string(reader, size)?),

            TRACK_NUMBER | TRACK_UID | TRACK_TYPE | DEFAULT_DURATION | PIXEL_WIDTH
            | PIXEL_HEIGHT | DISPLAY_WIDTH | DISPLAY_HEIGHT | CHANNELS | BIT_DEPTH => {
                let value = read_uint(reader, size)?;
                let id = element.id;
                let Some(entry) = self.entry() else {
                    return Ok(Visit::Done);
                };
                match id {
                    TRACK_NUMBER => entry.number = value,
                    TRACK_UID => entry.uid = value,
                    TRACK_TYPE => entry.track_type = value,
                    DEFAULT_DURATION => entry.default_duration_ns = value,
                    PIXEL_WIDTH => entry.pixel_width = value,
                    PIXEL_HEIGHT => entry.pixel_height = value,
                    DISPLAY_WIDTH => entry.display_width = value,
                    DISPLAY_HEIGHT => entry.display_height = value,
                    CHANNELS => entry.channels = value,
                    _ => entry.bit_depth = value,
                }
            }
            SAMPLING_FREQUENCY => {
                let value = read_float(reader, size)?;
                if let Some(entry) = self.entry() {
                    entry.sampling_frequency = value;
                }
            }
            NAME | LANGUAGE | CODEC_ID => {
                let value = read_string(reader, size)?;
                let id = element.id;
                if let Some(entry) = self.entry() {
                    match id {
                        NAME => entry.name = Some(value),
                        LANGUAGE => entry.language = Some(value),
                        _ => entry.codec_id = Some(value),
                    }
                }
            }

            TIMECODE => self.cluster_timecode = read_uint(reader, size)?,
            SIMPLE_BLOCK => return self.block(reader, element, true),
            BLOCK => return self.block(reader, element, false),
            REFERENCE_BLOCK => {
                if let Some(index) = self.group_entry {
                    if let Some(sample) = self.entries[index].samples.last_mut() {
                        if sample.kind == SampleType::VideoKeyframe {
                            sample.kind = SampleType::Video;
                        }
                    }
                }
            }

            _ => return Ok(Visit::Skip),
        }
        Ok(Visit::Done)
    }

    fn leave(&mut self, element: &Element, _depth: usize) -> Result<()> {
        if element.id == TRACK_ENTRY {
            self.in_entry = false;
            if let Some(entry) = self.entries.last() {
                debug!(
                    track = entry.number,
                    uid = entry.uid,
                    kind = %entry.kind(),
                    codec = entry.codec_id.as_deref().unwrap_or("?"),
                    "track entry"
                );
            }
        }
        Ok(())
    }

    fn element_name(&self, id: u32) -> Option<&'static str> {
        element_name(id)
    }
}

/// Walk a Matroska file and add its tracks to `media`.
pub fn demux<R: Read + Seek>(
    reader: &mut BitstreamReader<'_, R>,
    media: &mut MediaFile,
    options: &ProbeOptions,
    sink: &mut dyn TraceSink,
) -> Result<WalkStats> {
    let mut visitor = MkvVisitor::new(media, options);
    let stats = Walker::new(Ebml, sink)
        .with_max_depth(options.max_depth)
        .walk(reader, &mut visitor)?;
    visitor.finish();
    Ok(stats)
}
