mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./trackmap.toml",
        "~/.config/trackmap/config.toml",
        "/etc/trackmap/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.reader.buffer_size == 0 {
        anyhow::bail!("Reader buffer size cannot be 0");
    }

    if config.walker.max_depth == 0 {
        anyhow::bail!("Walker max depth cannot be 0");
    }

    if config.tracks.max_tracks == 0 {
        anyhow::bail!("Track capacity cannot be 0");
    }

    if config.tracks.max_samples == 0 {
        anyhow::bail!("Per-track sample capacity cannot be 0");
    }

    if config.metrics.bitrate_reference != ReferenceKind::FixedIndex
        && config.metrics.reference_index != 10
    {
        tracing::warn!(
            "metrics.reference_index is only used with the fixed-index bitrate reference"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackmap_media::BitrateReference;

    #[test]
    fn test_defaults_match_library() {
        let options = Config::default().probe_options();
        let library = trackmap_probe::ProbeOptions::default();
        assert_eq!(options.buffer_size, library.buffer_size);
        assert_eq!(options.max_depth, library.max_depth);
        assert_eq!(options.max_tracks, library.max_tracks);
        assert_eq!(options.max_samples, library.max_samples);
        assert_eq!(options.metrics, library.metrics);
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [metrics]
            bitrate_reference = "median"

            [tracks]
            max_samples = 500
            "#,
        )
        .unwrap();
        validate_config(&config).unwrap();

        let options = config.probe_options();
        assert_eq!(options.metrics.bitrate_reference, BitrateReference::Median);
        assert_eq!(options.max_samples, 500);
        assert_eq!(options.max_tracks, trackmap_probe::DEFAULT_MAX_TRACKS);
    }

    #[test]
    fn test_zero_values_rejected() {
        for toml in [
            "[reader]\nbuffer_size = 0",
            "[walker]\nmax_depth = 0",
            "[tracks]\nmax_tracks = 0",
            "[tracks]\nmax_samples = 0",
        ] {
            let config: Config = toml::from_str(toml).unwrap();
            assert!(validate_config(&config).is_err(), "{toml} accepted");
        }
    }
}
