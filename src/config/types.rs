use serde::{Deserialize, Serialize};
use trackmap_media::bitstream::DEFAULT_BUFFER_SIZE;
use trackmap_media::walker::DEFAULT_MAX_DEPTH;
use trackmap_media::{BitrateReference, MetricsOptions};
use trackmap_probe::{ProbeOptions, DEFAULT_MAX_SAMPLES, DEFAULT_MAX_TRACKS};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub reader: ReaderConfig,

    #[serde(default)]
    pub walker: WalkerConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub tracks: TracksConfig,
}

impl Config {
    /// Probe settings described by this configuration.
    pub fn probe_options(&self) -> ProbeOptions {
        ProbeOptions {
            buffer_size: self.reader.buffer_size,
            max_depth: self.walker.max_depth,
            max_tracks: self.tracks.max_tracks,
            max_samples: self.tracks.max_samples,
            metrics: self.metrics.options(),
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReaderConfig {
    /// Read window in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalkerConfig {
    /// Deepest element nesting to descend into
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

/// Which sample size CBR/VBR classification compares against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    /// The sample at `reference_index`
    #[default]
    FixedIndex,
    First,
    Median,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub bitrate_reference: ReferenceKind,

    /// Sample index used by the `fixed-index` reference (default: 10)
    #[serde(default = "default_reference_index")]
    pub reference_index: usize,

    /// Largest size difference in bytes still counted as constant bitrate
    #[serde(default = "default_cbr_tolerance")]
    pub cbr_tolerance: u32,
}

fn default_reference_index() -> usize {
    10
}

fn default_cbr_tolerance() -> u32 {
    MetricsOptions::default().cbr_tolerance
}

impl MetricsConfig {
    pub fn options(&self) -> MetricsOptions {
        let bitrate_reference = match self.bitrate_reference {
            ReferenceKind::FixedIndex => BitrateReference::FixedIndex(self.reference_index),
            ReferenceKind::First => BitrateReference::First,
            ReferenceKind::Median => BitrateReference::Median,
        };
        MetricsOptions {
            bitrate_reference,
            cbr_tolerance: self.cbr_tolerance,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bitrate_reference: ReferenceKind::default(),
            reference_index: default_reference_index(),
            cbr_tolerance: default_cbr_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TracksConfig {
    /// Maximum tracks of each kind
    #[serde(default = "default_max_tracks")]
    pub max_tracks: usize,

    /// Maximum samples kept per track
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

fn default_max_tracks() -> usize {
    DEFAULT_MAX_TRACKS
}

fn default_max_samples() -> usize {
    DEFAULT_MAX_SAMPLES
}

impl Default for TracksConfig {
    fn default() -> Self {
        Self {
            max_tracks: default_max_tracks(),
            max_samples: default_max_samples(),
        }
    }
}
