//! Human-readable and JSON reports for the CLI.

use serde::Serialize;
use std::fmt::Write;

use chrono::SecondsFormat;
use trackmap_media::{
    BitrateMode, Container, ElementRecord, MediaFile, StreamKind, Track, WalkStats,
};

/// Element listing as emitted by `trackmap elements --json`.
#[derive(Debug, Serialize)]
pub struct ElementListing<'a> {
    pub container: Container,
    pub stats: WalkStats,
    pub elements: &'a [ElementRecord],
}

/// Format milliseconds as `HH:MM:SS.mmm`.
pub fn format_duration(ms: f64) -> String {
    let total = ms.max(0.0).round() as u64;
    let millis = total % 1000;
    let secs = total / 1000;
    let mins = secs / 60;
    let hours = mins / 60;
    format!("{:02}:{:02}:{:02}.{:03}", hours, mins % 60, secs % 60, millis)
}

fn bitrate_mode(mode: BitrateMode) -> &'static str {
    match mode {
        BitrateMode::Cbr => "CBR",
        BitrateMode::Vbr => "VBR",
        BitrateMode::Unknown => "unknown",
    }
}

fn render_track(out: &mut String, index: usize, track: &Track) {
    let _ = write!(out, "  [{}] #{} {}", index, track.id, track.codec);
    if let Some(tag) = &track.codec_tag {
        let _ = write!(out, " ({})", tag);
    }

    match track.kind {
        StreamKind::Video => {
            let _ = write!(out, " {}x{}", track.video.width, track.video.height);
            if track.video.frame_rate > 0.0 {
                let _ = write!(out, " {:.3} fps", track.video.frame_rate);
            }
            if track.aspect.display > 0.0 {
                let _ = write!(out, " DAR {:.3}", track.aspect.display);
            }
        }
        StreamKind::Audio => {
            let _ = write!(
                out,
                " {}ch {}Hz",
                track.audio.channel_count, track.audio.sampling_rate
            );
            if track.audio.bits_per_sample > 0 {
                let _ = write!(out, " {}-bit", track.audio.bits_per_sample);
            }
        }
        _ => {}
    }

    if let Some(ref lang) = track.language {
        let _ = write!(out, " [{}]", lang);
    }
    if let Some(ref title) = track.title {
        let _ = write!(out, " \"{}\"", title);
    }
    out.push('\n');

    let _ = writeln!(
        out,
        "      {} samples, {} frames, {} keyframes, {} bytes",
        track.sample_count(),
        track.frame_count,
        track.keyframe_count,
        track.stream_size
    );
    let _ = writeln!(
        out,
        "      duration {}, {} bps {}",
        format_duration(track.duration_ms),
        track.bitrate,
        bitrate_mode(track.bitrate_mode)
    );
}

/// Text report of a probed file.
pub fn render_media(media: &MediaFile) -> String {
    let mut out = String::new();

    if let Some(ref path) = media.file_path {
        let _ = writeln!(out, "File: {}", path);
    }
    let _ = writeln!(out, "Container: {}", media.container);
    let _ = writeln!(out, "Size: {} bytes", media.file_size);
    let _ = writeln!(out, "Duration: {}", format_duration(media.duration_ms));
    if let Some(ref title) = media.title {
        let _ = writeln!(out, "Title: {}", title);
    }
    if let Some(ref app) = media.creation_app {
        let _ = writeln!(out, "Application: {}", app);
    }
    if let Some(date) = media.creation_date {
        let _ = writeln!(
            out,
            "Created: {}",
            date.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }

    for (label, set) in [
        ("Video", &media.video),
        ("Audio", &media.audio),
        ("Subtitle", &media.subtitles),
        ("Other", &media.other),
    ] {
        if set.is_empty() && label == "Other" {
            continue;
        }
        let _ = writeln!(out, "\n{} Tracks: {}", label, set.len());
        for (i, track) in set.iter().enumerate() {
            render_track(&mut out, i, track);
        }
    }

    out
}

/// Indented element tree followed by the walk counters.
pub fn render_elements(records: &[ElementRecord], stats: &WalkStats) -> String {
    let mut out = String::new();

    for record in records {
        let _ = writeln!(
            out,
            "{:indent$}{} [0x{:X}] @{} header {} size {}",
            "",
            record.name,
            record.id,
            record.offset,
            record.header_len,
            record.size,
            indent = record.depth * 2
        );
    }

    let _ = writeln!(
        out,
        "\n{} elements, {} skipped, {} clamped, {} failures, max depth {}",
        stats.elements, stats.skipped, stats.clamped, stats.failures, stats.max_depth
    );
    if stats.stopped {
        out.push_str("walk stopped early\n");
    }
    if stats.truncated {
        out.push_str("walk ended at a corrupt element\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "00:00:00.000");
        assert_eq!(format_duration(128.0), "00:00:00.128");
        assert_eq!(format_duration(3_725_500.0), "01:02:05.500");
        assert_eq!(format_duration(-5.0), "00:00:00.000");
    }

    #[test]
    fn test_render_media() {
        let mut media = MediaFile::new(Container::Wave, 4140, 4);
        media.title = Some("Tone".to_string());
        let mut track = Track::new(1, StreamKind::Audio, 0);
        track.audio.channel_count = 2;
        track.audio.sampling_rate = 8000;
        track.bitrate_mode = BitrateMode::Cbr;
        media.add_track(track).unwrap();

        let text = render_media(&media);
        assert!(text.contains("Container: WAVE"));
        assert!(text.contains("Title: Tone"));
        assert!(text.contains("Audio Tracks: 1"));
        assert!(text.contains("2ch 8000Hz"));
        assert!(text.contains("CBR"));
        assert!(!text.contains("Other Tracks"));
    }

    #[test]
    fn test_render_elements_indents_by_depth() {
        let records = [
            ElementRecord {
                id: 0x1853_8067,
                name: Cow::Borrowed("Segment"),
                offset: 0,
                header_len: 12,
                size: 100,
                depth: 0,
            },
            ElementRecord {
                id: 0x1549_A966,
                name: Cow::Borrowed("Info"),
                offset: 12,
                header_len: 12,
                size: 20,
                depth: 1,
            },
        ];
        let stats = WalkStats {
            elements: 2,
            ..WalkStats::default()
        };

        let text = render_elements(&records, &stats);
        assert!(text.starts_with("Segment [0x18538067] @0"));
        assert!(text.contains("\n  Info [0x1549A966] @12"));
        assert!(text.contains("2 elements"));
        assert!(!text.contains("corrupt"));

        let stats = WalkStats {
            failures: 1,
            truncated: true,
            ..stats
        };
        let text = render_elements(&records, &stats);
        assert!(text.contains("1 failures"));
        assert!(text.ends_with("walk ended at a corrupt element\n"));
    }
}
