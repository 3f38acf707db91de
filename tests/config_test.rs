//! Integration tests for configuration loading.

use std::fs;
use tempfile::tempdir;
use trackmap::config::{self, Config, ReferenceKind};
use trackmap_media::BitrateReference;

#[test]
fn load_full_config() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("trackmap.toml");
    fs::write(
        &path,
        r#"
[reader]
buffer_size = 65536

[walker]
max_depth = 8

[metrics]
bitrate_reference = "fixed-index"
reference_index = 3
cbr_tolerance = 0

[tracks]
max_tracks = 4
max_samples = 1000
"#,
    )
    .unwrap();

    let config = config::load_config(&path).unwrap();
    assert_eq!(config.reader.buffer_size, 65536);
    assert_eq!(config.walker.max_depth, 8);
    assert_eq!(config.metrics.bitrate_reference, ReferenceKind::FixedIndex);

    let options = config.probe_options();
    assert_eq!(options.metrics.bitrate_reference, BitrateReference::FixedIndex(3));
    assert_eq!(options.metrics.cbr_tolerance, 0);
    assert_eq!(options.max_tracks, 4);
    assert_eq!(options.max_samples, 1000);
    assert!(options.cancel.is_none());
}

#[test]
fn empty_file_uses_defaults() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("trackmap.toml");
    fs::write(&path, "").unwrap();

    let config = config::load_config(&path).unwrap();
    let defaults = Config::default();
    assert_eq!(config.reader.buffer_size, defaults.reader.buffer_size);
    assert_eq!(config.walker.max_depth, defaults.walker.max_depth);
    assert_eq!(config.metrics.reference_index, 10);
    assert_eq!(config.tracks.max_samples, defaults.tracks.max_samples);
}

#[test]
fn explicit_path_is_required_to_exist() {
    let temp = tempdir().unwrap();
    let missing = temp.path().join("missing.toml");

    let err = config::load_config_or_default(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn malformed_toml_is_reported() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("trackmap.toml");
    fs::write(&path, "[reader\nbuffer_size = ").unwrap();

    let err = config::load_config(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn unknown_reference_kind_is_rejected() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("trackmap.toml");
    fs::write(&path, "[metrics]\nbitrate_reference = \"average\"\n").unwrap();

    assert!(config::load_config(&path).is_err());
}

#[test]
fn zero_buffer_is_rejected() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("trackmap.toml");
    fs::write(&path, "[reader]\nbuffer_size = 0\n").unwrap();

    let err = config::load_config(&path).unwrap_err();
    assert!(err.to_string().contains("buffer size"));
}
