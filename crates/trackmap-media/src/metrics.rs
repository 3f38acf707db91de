//! Derived stream metrics.
//!
//! Runs once after a format walker has filled a [`MediaFile`]. Every field
//! computed here is only written when the container left it at its
//! zero/unknown default, so values declared by the container win.

use crate::codec::{BuiltinCodecTable, CodecLookup};
use crate::track::{
    AspectRatios, BitrateMode, MediaFile, Ratio, Sample, StreamKind, Track,
};
use std::mem::size_of;
use tracing::debug;

/// Which sample the CBR/VBR classification compares every sample against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitrateReference {
    /// The sample at a fixed index. A track too short to have that sample
    /// cannot be shown to be constant and is classified VBR.
    FixedIndex(usize),
    /// The first sample.
    First,
    /// The median sample size.
    Median,
}

impl Default for BitrateReference {
    fn default() -> Self {
        Self::FixedIndex(10)
    }
}

impl BitrateReference {
    /// Reference size for `samples`, `None` when it cannot be determined.
    pub fn reference_size(&self, samples: &[Sample]) -> Option<u32> {
        match *self {
            Self::FixedIndex(index) => samples.get(index).map(|s| s.size),
            Self::First => samples.first().map(|s| s.size),
            Self::Median => {
                if samples.is_empty() {
                    return None;
                }
                let mut sizes: Vec<u32> = samples.iter().map(|s| s.size).collect();
                sizes.sort_unstable();
                Some(sizes[sizes.len() / 2])
            }
        }
    }
}

/// Tunables of the metrics pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsOptions {
    pub bitrate_reference: BitrateReference,
    /// Largest size difference, in bytes, still counted as constant.
    pub cbr_tolerance: u32,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            bitrate_reference: BitrateReference::default(),
            cbr_tolerance: 1,
        }
    }
}

/// Compute every derived field with the built-in codec tables.
pub fn compute_metrics(media: &mut MediaFile, options: &MetricsOptions) {
    compute_metrics_with(media, options, &BuiltinCodecTable);
}

/// Compute every derived field, resolving codecs through `lookup`.
pub fn compute_metrics_with(
    media: &mut MediaFile,
    options: &MetricsOptions,
    lookup: &dyn CodecLookup,
) {
    for track in media.tracks_mut() {
        compute_codec(track, lookup);
        compute_pcm_settings(track);
        compute_aspect_ratios(track);
        compute_samples_data(track, options);
    }

    if media.duration_ms == 0.0 {
        media.duration_ms = media
            .tracks()
            .map(|t| t.duration_ms)
            .fold(0.0, f64::max);
    }

    media.parsing_memory = compute_media_memory(media);
}

/// Resolve an unknown codec from the container's codec tag.
pub fn compute_codec(track: &mut Track, lookup: &dyn CodecLookup) {
    if track.codec.is_unknown() {
        if let Some(tag) = &track.codec_tag {
            track.codec = lookup.resolve(tag);
        }
    }
}

/// Force PCM-family sample sizes to one frame (`channels * bytes per sample`).
///
/// Containers that pack several PCM frames per block report block sizes;
/// rewriting them keeps per-frame arithmetic right.
pub fn compute_pcm_settings(track: &mut Track) {
    if !track.codec.is_pcm_family() {
        return;
    }

    let frame_size = track.audio.channel_count as u32 * (track.audio.bits_per_sample / 8) as u32;
    if frame_size == 0 {
        return;
    }
    match track.samples.get(0) {
        Some(first) if first.size != frame_size => {}
        _ => return,
    }

    for sample in track.samples.as_mut_slice() {
        sample.size = frame_size;
    }
    track.stream_size = track.samples.len() as u64 * frame_size as u64;
    track.bitrate = 0;
    debug!(track = track.id, frame_size, "PCM sample sizes rewritten");
}

/// Pixel, video and display aspect ratios of a video track.
pub fn compute_aspect_ratios(track: &mut Track) {
    if track.kind != StreamKind::Video {
        return;
    }

    let video = &track.video;
    let pixel = video.pixel_aspect.and_then(|r| r.value()).unwrap_or(1.0);
    let storage = video
        .video_aspect
        .and_then(|r| r.value())
        .or_else(|| Ratio::new(video.width, video.height).value())
        .unwrap_or(0.0);
    let display = video
        .display_aspect
        .and_then(|r| r.value())
        .unwrap_or(if pixel == 1.0 { storage } else { storage * pixel });

    track.aspect = AspectRatios {
        pixel,
        video: storage,
        display,
    };
}

/// Frame counts, frame duration, stream size, duration, bitrate and bitrate mode.
pub fn compute_samples_data(track: &mut Track, options: &MetricsOptions) {
    let samples = track.samples.as_slice();

    if track.frame_count == 0 {
        track.frame_count = if track.sample_alignment {
            samples.len() as u64
        } else {
            samples.iter().filter(|s| s.pts != 0 || s.dts != 0).count() as u64
        };
    }
    if track.keyframe_count == 0 {
        track.keyframe_count = if track.intra_only {
            track.frame_count
        } else {
            track.samples.keyframe_count() as u64
        };
    }

    match track.kind {
        StreamKind::Audio if track.frame_duration_ms == 0.0 && samples.len() >= 2 => {
            let delta = samples[1].dts.saturating_sub(samples[0].dts);
            if delta > 0 {
                track.frame_duration_ms = delta as f64 / 1000.0;
            }
        }
        StreamKind::Video => {
            if track.frame_duration_ms == 0.0 && track.video.frame_rate > 0.0 {
                track.frame_duration_ms = 1000.0 / track.video.frame_rate;
            } else if track.video.frame_rate == 0.0 && track.frame_duration_ms > 0.0 {
                track.video.frame_rate = 1000.0 / track.frame_duration_ms;
            }
        }
        _ => {}
    }

    if track.bitrate_mode == BitrateMode::Unknown && !samples.is_empty() {
        track.bitrate_mode = classify_bitrate(samples, options);
    }

    if track.stream_size == 0 {
        track.stream_size = track.samples.total_bytes();
    }
    if track.duration_ms == 0.0 {
        track.duration_ms = track.frame_count as f64 * track.frame_duration_ms;
    }
    if track.bitrate == 0 && track.duration_ms > 0.0 {
        let bytes_per_ms = (track.stream_size as f64 / track.duration_ms).round() as u64;
        track.bitrate = bytes_per_ms * 1000 * 8;
    }
}

fn classify_bitrate(samples: &[Sample], options: &MetricsOptions) -> BitrateMode {
    let Some(reference) = options.bitrate_reference.reference_size(samples) else {
        return BitrateMode::Vbr;
    };
    let variable = samples
        .iter()
        .any(|s| s.size.abs_diff(reference) > options.cbr_tolerance);
    if variable {
        BitrateMode::Vbr
    } else {
        BitrateMode::Cbr
    }
}

/// Estimated bytes held by the parsed structures.
pub fn compute_media_memory(media: &MediaFile) -> u64 {
    let strings = [&media.creation_app, &media.title, &media.file_path]
        .iter()
        .map(|s| s.as_ref().map_or(0, String::len))
        .sum::<usize>();

    let tracks: usize = media
        .tracks()
        .map(|t| size_of::<Track>() + t.string_bytes() + t.samples.allocated() * size_of::<Sample>())
        .sum();

    (size_of::<MediaFile>() + strings + tracks) as u64
}
