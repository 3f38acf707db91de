//! Media file and per-kind track sets.

use super::{StreamKind, Track};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;

/// Container format of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Container {
    /// Matroska (.mkv, .mka, .webm)
    Matroska,
    /// ISO base media (.mp4, .m4a, .mov)
    Mp4,
    /// RIFF WAVE (.wav)
    Wave,
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Container::Matroska => write!(f, "Matroska"),
            Container::Mp4 => write!(f, "MP4"),
            Container::Wave => write!(f, "WAVE"),
        }
    }
}

/// Tracks of one kind, bounded by a configured maximum.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackSet {
    kind: StreamKind,
    max: usize,
    tracks: Vec<Track>,
}

impl TrackSet {
    /// Create an empty set accepting at most `max` tracks.
    pub fn new(kind: StreamKind, max: usize) -> Self {
        Self {
            kind,
            max,
            tracks: Vec::new(),
        }
    }

    /// Add a track, failing once the set is full.
    pub fn push(&mut self, track: Track) -> Result<()> {
        if self.tracks.len() >= self.max {
            return Err(Error::TooManyTracks {
                kind: self.kind.as_str(),
                max: self.max,
            });
        }
        self.tracks.push(track);
        Ok(())
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Track> {
        self.tracks.iter_mut()
    }
}

impl<'a> IntoIterator for &'a TrackSet {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}

/// A demuxed media file: container metadata plus its tracks.
///
/// The file owns every track and every sample table; dropping it releases
/// them all.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct MediaFile {
    pub container: Container,
    /// Path of the probed file, when it came from disk.
    pub file_path: Option<String>,
    /// File size in bytes.
    pub file_size: u64,
    /// Muxing or writing application.
    pub creation_app: Option<String>,
    pub title: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    /// Overall duration in milliseconds.
    pub duration_ms: f64,

    pub video: TrackSet,
    pub audio: TrackSet,
    pub subtitles: TrackSet,
    pub other: TrackSet,

    /// Estimated bytes held by the parsed structures.
    pub parsing_memory: u64,
}

impl MediaFile {
    /// Create an empty media file; each track kind accepts at most `max_tracks`.
    pub fn new(container: Container, file_size: u64, max_tracks: usize) -> Self {
        Self {
            container,
            file_path: None,
            file_size,
            creation_app: None,
            title: None,
            creation_date: None,
            duration_ms: 0.0,
            video: TrackSet::new(StreamKind::Video, max_tracks),
            audio: TrackSet::new(StreamKind::Audio, max_tracks),
            subtitles: TrackSet::new(StreamKind::Subtitle, max_tracks),
            other: TrackSet::new(StreamKind::Other, max_tracks),
            parsing_memory: 0,
        }
    }

    /// Route a track to the set matching its kind.
    pub fn add_track(&mut self, track: Track) -> Result<()> {
        match track.kind {
            StreamKind::Video => self.video.push(track),
            StreamKind::Audio => self.audio.push(track),
            StreamKind::Subtitle => self.subtitles.push(track),
            StreamKind::Other => self.other.push(track),
        }
    }

    /// All tracks, video first.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.video
            .iter()
            .chain(self.audio.iter())
            .chain(self.subtitles.iter())
            .chain(self.other.iter())
    }

    /// All tracks, mutably.
    pub fn tracks_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.video
            .iter_mut()
            .chain(self.audio.iter_mut())
            .chain(self.subtitles.iter_mut())
            .chain(self.other.iter_mut())
    }

    /// Total number of tracks.
    pub fn track_count(&self) -> usize {
        self.video.len() + self.audio.len() + self.subtitles.len() + self.other.len()
    }
}
