//! # trackmap-probe
//!
//! Container front-ends and probe entry points for trackmap.
//!
//! Each supported container is a header codec plus a visitor over the
//! generic walker of `trackmap-media`; probing detects the container, walks
//! it into a [`MediaFile`] and runs the metrics pass.
//!
//! ## Features
//!
//! - Matroska/WebM: EBML tree, track entries, SimpleBlock/BlockGroup samples
//! - WAVE: `fmt `/`data`/`LIST INFO` chunks, one sample per PCM frame
//! - MP4/MOV: `moov` track boxes, samples resolved from the `stbl` tables
//!
//! ## Example
//!
//! ```no_run
//! let media = trackmap_probe::probe_file("movie.mkv").unwrap();
//!
//! println!("Container: {}", media.container);
//! println!("Duration: {:.1}ms", media.duration_ms);
//!
//! for track in media.tracks() {
//!     println!(
//!         "{} #{}: {} ({} samples, {} bps)",
//!         track.kind,
//!         track.id,
//!         track.codec,
//!         track.sample_count(),
//!         track.bitrate
//!     );
//! }
//! ```

pub mod container;
pub mod error;

pub use error::ProbeError;
pub use trackmap_media::{Container, MediaFile, MetricsOptions, WalkStats};

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{debug, info};
use trackmap_media::bitstream::DEFAULT_BUFFER_SIZE;
use trackmap_media::walker::DEFAULT_MAX_DEPTH;
use trackmap_media::{compute_metrics, BitstreamReader, TraceSink, TracingSink};

/// Default maximum number of tracks of each kind.
pub const DEFAULT_MAX_TRACKS: usize = 64;

/// Default maximum number of samples kept per track.
pub const DEFAULT_MAX_SAMPLES: usize = 16 * 1024 * 1024;

/// Probe settings.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Bitstream reader window in bytes.
    pub buffer_size: usize,
    /// Deepest element nesting the walker descends into.
    pub max_depth: usize,
    /// Maximum tracks of each kind.
    pub max_tracks: usize,
    /// Maximum samples kept per track.
    pub max_samples: usize,
    pub metrics: MetricsOptions,
    /// Set to stop a running probe between top-level elements.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
            max_tracks: DEFAULT_MAX_TRACKS,
            max_samples: DEFAULT_MAX_SAMPLES,
            metrics: MetricsOptions::default(),
            cancel: None,
        }
    }
}

/// Result of walking a container, before any track check.
#[derive(Debug, Clone)]
pub struct Demuxed {
    pub media: MediaFile,
    pub stats: WalkStats,
}

/// Probe a media file with default options
///
/// Detects the container from its magic bytes, falling back to the file
/// extension, then demuxes every track and computes the derived metrics.
///
/// # Example
///
/// ```no_run
/// let media = trackmap_probe::probe_file("/path/to/audio.wav").unwrap();
/// println!("Found {} tracks", media.track_count());
/// ```
pub fn probe_file<P: AsRef<Path>>(path: P) -> Result<MediaFile, ProbeError> {
    probe_file_with(path, &ProbeOptions::default())
}

/// Probe a media file
pub fn probe_file_with<P: AsRef<Path>>(
    path: P,
    options: &ProbeOptions,
) -> Result<MediaFile, ProbeError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ProbeError::FileNotFound(path.to_path_buf()));
    }

    let container = detect_container(path)?;
    let file = BufReader::new(File::open(path)?);

    let mut media = probe_reader(file, Some(container), options)?;
    media.file_path = Some(path.to_string_lossy().to_string());
    media.parsing_memory = trackmap_media::metrics::compute_media_memory(&media);
    Ok(media)
}

/// Probe media from any seekable source
///
/// `container` skips detection when the format is already known.
pub fn probe_reader<R: Read + Seek>(
    source: R,
    container: Option<Container>,
    options: &ProbeOptions,
) -> Result<MediaFile, ProbeError> {
    let Demuxed { mut media, stats } = demux(source, container, options, &mut TracingSink)?;

    if media.track_count() == 0 {
        return Err(ProbeError::NoTracks);
    }

    compute_metrics(&mut media, &options.metrics);
    info!(
        container = %media.container,
        tracks = media.track_count(),
        elements = stats.elements,
        failures = stats.failures,
        duration_ms = media.duration_ms,
        "probe complete"
    );
    Ok(media)
}

/// Probe media already in memory
pub fn probe_bytes(
    data: &[u8],
    container: Option<Container>,
    options: &ProbeOptions,
) -> Result<MediaFile, ProbeError> {
    probe_reader(Cursor::new(data), container, options)
}

/// Walk a container, reporting every element header to `sink`
///
/// No metrics are computed and an empty track list is not an error; this is
/// the building block for element listings.
pub fn demux<R: Read + Seek>(
    mut source: R,
    container: Option<Container>,
    options: &ProbeOptions,
    sink: &mut dyn TraceSink,
) -> Result<Demuxed, ProbeError> {
    let container = match container {
        Some(container) => container,
        None => container::detect_container_from_reader(&mut source)?,
    };
    source.rewind()?;

    let mut reader = BitstreamReader::with_buffer_size(source, options.buffer_size)?;
    let mut media = MediaFile::new(container, reader.size(), options.max_tracks);
    debug!(%container, size = reader.size(), "demuxing");

    let stats = container::demux(container, &mut reader, &mut media, options, sink)?;
    Ok(Demuxed { media, stats })
}

/// Check if a file appears to be a supported container
///
/// This performs a quick check of the file's magic bytes without
/// parsing the container.
pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
    container::detect_container(path.as_ref()).is_ok()
}

/// Get the container format of a file
///
/// Magic bytes win; the extension is only consulted when they are not
/// recognized.
pub fn detect_container<P: AsRef<Path>>(path: P) -> Result<Container, ProbeError> {
    let path = path.as_ref();
    match container::detect_container(path) {
        Ok(container) => Ok(container),
        Err(ProbeError::UnsupportedContainer(reason)) => container::container_from_extension(path)
            .ok_or(ProbeError::UnsupportedContainer(reason)),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let result = probe_file("/nonexistent/file.wav");
        assert!(matches!(result, Err(ProbeError::FileNotFound(_))));
    }

    #[test]
    fn test_unrecognized_bytes() {
        let result = probe_bytes(b"not a media file", None, &ProbeOptions::default());
        assert!(matches!(result, Err(ProbeError::UnsupportedContainer(_))));
    }

    #[test]
    fn test_hint_skips_detection() {
        // A valid EBML tree without tracks, declared as Matroska
        let data = [0xEC, 0x81, 0x00];
        let result = probe_bytes(&data, Some(Container::Matroska), &ProbeOptions::default());
        assert!(matches!(result, Err(ProbeError::NoTracks)));
    }

    #[test]
    fn test_empty_source() {
        let result = probe_bytes(&[], Some(Container::Wave), &ProbeOptions::default());
        assert!(matches!(
            result,
            Err(ProbeError::Demux(trackmap_media::Error::PrematureEnd { offset: 0 }))
        ));
    }
}
