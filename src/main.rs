mod cli;

use trackmap::{config, report};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use trackmap_media::RecordingSink;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            // Verbose mode: every element header and walker decision
            "trackmap=trace,trackmap_media=trace,trackmap_probe=trace".to_string()
        } else {
            "trackmap=info,trackmap_media=warn,trackmap_probe=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe { file, json } => probe_file(&file, cli.config.as_deref(), json),
        Commands::Elements {
            file,
            max_depth,
            json,
        } => list_elements(&file, cli.config.as_deref(), max_depth, json),
        Commands::Detect { file } => detect(&file),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("trackmap {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn probe_file(file: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let media = trackmap_probe::probe_file_with(file, &config.probe_options())
        .with_context(|| format!("Failed to probe {:?}", file))?;

    if json {
        let json_str = serde_json::to_string_pretty(&media)?;
        println!("{}", json_str);
    } else {
        print!("{}", report::render_media(&media));
    }

    Ok(())
}

fn list_elements(
    file: &Path,
    config_path: Option<&Path>,
    max_depth: Option<usize>,
    json: bool,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let mut options = config.probe_options();
    if let Some(depth) = max_depth {
        options.max_depth = depth;
    }

    let container = trackmap_probe::detect_container(file)?;
    let source = BufReader::new(
        File::open(file).with_context(|| format!("Failed to open {:?}", file))?,
    );

    let mut sink = RecordingSink::new();
    let demuxed = trackmap_probe::demux(source, Some(container), &options, &mut sink)
        .with_context(|| format!("Failed to walk {:?}", file))?;

    if json {
        let listing = report::ElementListing {
            container,
            stats: demuxed.stats,
            elements: &sink.records,
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        println!("Container: {}", container);
        print!("{}", report::render_elements(&sink.records, &demuxed.stats));
    }

    Ok(())
}

fn detect(file: &Path) -> Result<()> {
    let container = trackmap_probe::detect_container(file)
        .with_context(|| format!("Failed to detect container of {:?}", file))?;
    println!("{}", container);
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Reader buffer: {} bytes", config.reader.buffer_size);
    println!("  Walker max depth: {}", config.walker.max_depth);
    println!(
        "  Bitrate reference: {:?}",
        config.metrics.options().bitrate_reference
    );
    println!("  CBR tolerance: {} bytes", config.metrics.cbr_tolerance);
    println!("  Max tracks per kind: {}", config.tracks.max_tracks);
    println!("  Max samples per track: {}", config.tracks.max_samples);

    Ok(())
}
