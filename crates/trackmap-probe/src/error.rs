//! Error types for trackmap-probe

use std::path::PathBuf;

/// Errors that can occur while probing a media file
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported container format
    #[error("Unsupported container format: {0}")]
    UnsupportedContainer(String),

    /// Reading or walking the container failed
    #[error("Demux error: {0}")]
    Demux(#[from] trackmap_media::Error),

    /// The container walked cleanly but declared no tracks
    #[error("No tracks found in file")]
    NoTracks,
}
