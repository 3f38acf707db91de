//! Container-agnostic track model.
//!
//! Format walkers create a [`Track`] per elementary stream, fill its
//! [`SampleTable`] in decode order, and hand it to a [`MediaFile`]. Derived
//! fields (frame counts, bitrate, aspect ratios) stay at their zero/unknown
//! defaults until [`crate::metrics`] runs.

mod media;
mod sample;

pub use media::{Container, MediaFile, TrackSet};
pub use sample::{Sample, SampleTable, SampleType};

use crate::codec::{Codec, CodecTag};
use std::fmt;

/// Elementary stream kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

impl StreamKind {
    /// Lowercase name used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constant or variable bitrate classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum BitrateMode {
    #[default]
    Unknown,
    Cbr,
    Vbr,
}

/// Aspect ratio as declared by the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Ratio {
    pub h: u32,
    pub v: u32,
}

impl Ratio {
    pub fn new(h: u32, v: u32) -> Self {
        Self { h, v }
    }

    /// Ratio as a float, `None` when either side is zero.
    pub fn value(&self) -> Option<f64> {
        if self.h == 0 || self.v == 0 {
            None
        } else {
            Some(self.h as f64 / self.v as f64)
        }
    }
}

/// Video stream parameters declared by the container.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VideoParams {
    /// Coded width in pixels.
    pub width: u32,
    /// Coded height in pixels.
    pub height: u32,
    /// Frames per second, 0.0 when unknown.
    pub frame_rate: f64,
    /// Pixel aspect ratio.
    pub pixel_aspect: Option<Ratio>,
    /// Video (storage) aspect ratio.
    pub video_aspect: Option<Ratio>,
    /// Display aspect ratio.
    pub display_aspect: Option<Ratio>,
}

/// Audio stream parameters declared by the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AudioParams {
    /// Sampling rate in Hz.
    pub sampling_rate: u32,
    pub channel_count: u16,
    pub bits_per_sample: u16,
}

/// Aspect ratios computed by the metrics pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AspectRatios {
    pub pixel: f64,
    pub video: f64,
    pub display: f64,
}

/// One elementary stream and its sample table.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Track {
    /// Track identifier as found in the container.
    pub id: u32,
    pub kind: StreamKind,
    pub codec: Codec,
    /// Codec identifier as found in the container.
    pub codec_tag: Option<CodecTag>,
    pub title: Option<String>,
    pub language: Option<String>,
    pub encoder: Option<String>,

    /// Samples in decode order.
    pub samples: SampleTable,
    /// Every sample holds exactly one frame.
    pub sample_alignment: bool,
    /// Every frame is a key-frame.
    pub intra_only: bool,

    pub video: VideoParams,
    pub audio: AudioParams,

    // Derived by the metrics pass.
    pub frame_count: u64,
    pub keyframe_count: u64,
    /// Duration of one frame in milliseconds.
    pub frame_duration_ms: f64,
    /// Stream size in bytes.
    pub stream_size: u64,
    pub duration_ms: f64,
    /// Bits per second.
    pub bitrate: u64,
    pub bitrate_mode: BitrateMode,
    pub aspect: AspectRatios,
}

impl Track {
    /// Open a track able to hold `sample_capacity` samples.
    pub fn new(id: u32, kind: StreamKind, sample_capacity: usize) -> Self {
        Self {
            id,
            kind,
            codec: Codec::Unknown,
            codec_tag: None,
            title: None,
            language: None,
            encoder: None,
            samples: SampleTable::with_capacity(sample_capacity),
            sample_alignment: true,
            intra_only: false,
            video: VideoParams::default(),
            audio: AudioParams::default(),
            frame_count: 0,
            keyframe_count: 0,
            frame_duration_ms: 0.0,
            stream_size: 0,
            duration_ms: 0.0,
            bitrate: 0,
            bitrate_mode: BitrateMode::Unknown,
            aspect: AspectRatios::default(),
        }
    }

    /// Number of samples in the table.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Bytes owned by the track's strings.
    pub(crate) fn string_bytes(&self) -> usize {
        [&self.title, &self.language, &self.encoder]
            .iter()
            .map(|s| s.as_ref().map_or(0, String::len))
            .sum::<usize>()
            + match &self.codec_tag {
                Some(CodecTag::Matroska(id)) => id.len(),
                _ => 0,
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_value() {
        assert_eq!(Ratio::new(16, 9).value(), Some(16.0 / 9.0));
        assert_eq!(Ratio::new(0, 9).value(), None);
        assert_eq!(Ratio::new(4, 0).value(), None);
    }

    #[test]
    fn test_new_track_defaults() {
        let track = Track::new(3, StreamKind::Audio, 16);
        assert_eq!(track.id, 3);
        assert_eq!(track.codec, Codec::Unknown);
        assert_eq!(track.samples.capacity(), 16);
        assert_eq!(track.bitrate_mode, BitrateMode::Unknown);
        assert!(track.sample_alignment);
    }

    #[test]
    fn test_string_bytes() {
        let mut track = Track::new(1, StreamKind::Video, 0);
        track.title = Some("Main".to_string());
        track.language = Some("eng".to_string());
        track.codec_tag = Some(CodecTag::Matroska("V_VP9".to_string()));
        assert_eq!(track.string_bytes(), 4 + 3 + 5);
    }
}
