//! Example: Probe a media file and print its tracks

use std::env;
use trackmap_probe::probe_file;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <media_file>", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  {} movie.mkv", args[0]);
        std::process::exit(1);
    }

    let path = &args[1];

    match probe_file(path) {
        Ok(media) => {
            println!("File: {}", media.file_path.as_deref().unwrap_or(path));
            println!(
                "Size: {} bytes ({:.2} MB)",
                media.file_size,
                media.file_size as f64 / 1_000_000.0
            );
            println!("Container: {}", media.container);

            if media.duration_ms > 0.0 {
                let seconds = (media.duration_ms / 1000.0) as u64;
                let minutes = seconds / 60;
                let hours = minutes / 60;
                println!(
                    "Duration: {:02}:{:02}:{:02}",
                    hours,
                    minutes % 60,
                    seconds % 60
                );
            }
            if let Some(ref title) = media.title {
                println!("Title: {}", title);
            }
            if let Some(ref app) = media.creation_app {
                println!("Written by: {}", app);
            }

            println!();
            println!("Video Tracks ({}):", media.video.len());
            for (i, video) in media.video.iter().enumerate() {
                println!(
                    "  [{}] {} {}x{} {:.3} fps",
                    i, video.codec, video.video.width, video.video.height, video.video.frame_rate
                );
                println!(
                    "      {} samples, {} keyframes, {} bps ({:?})",
                    video.sample_count(),
                    video.keyframe_count,
                    video.bitrate,
                    video.bitrate_mode
                );
            }

            println!();
            println!("Audio Tracks ({}):", media.audio.len());
            for (i, audio) in media.audio.iter().enumerate() {
                print!(
                    "  [{}] {} {}ch {}Hz",
                    i, audio.codec, audio.audio.channel_count, audio.audio.sampling_rate
                );

                if audio.audio.bits_per_sample > 0 {
                    print!(" {}-bit", audio.audio.bits_per_sample);
                }

                if let Some(ref lang) = audio.language {
                    print!(" [{}]", lang);
                }

                println!(" {} samples", audio.sample_count());
            }

            if !media.subtitles.is_empty() {
                println!();
                println!("Subtitle Tracks ({}):", media.subtitles.len());
                for (i, sub) in media.subtitles.iter().enumerate() {
                    print!("  [{}] {}", i, sub.codec);

                    if let Some(ref lang) = sub.language {
                        print!(" [{}]", lang);
                    }

                    if let Some(ref title) = sub.title {
                        print!(" \"{}\"", title);
                    }

                    println!();
                }
            }
        }
        Err(e) => {
            eprintln!("Error probing file: {}", e);
            std::process::exit(1);
        }
    }
}
