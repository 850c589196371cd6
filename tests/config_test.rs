//! Configuration loading tests
//!
//! Tests that configuration files are created with defaults, read back
//! and persisted.

use speechrt::Config;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_missing_config_is_created_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("speechrt.cfg");

    let config = Config::load_from(&path).expect("Failed to load config");

    assert!(path.exists());
    assert_eq!(config.path(), &path);
    assert_eq!(config.backend(), "auto");
    assert_eq!(config.wait_timeout(), Some(Duration::from_millis(5000)));
}

#[test]
fn test_existing_config_is_read() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("speechrt.cfg");
    fs::write(
        &path,
        "[engine]\nbackend = espeak\nwait_timeout_ms = 250\n\n\
         [speech]\nrate = 70\n\n\
         [espeak]\npath = /opt/espeak-ng/bin/espeak-ng\nplayer = aplay\n",
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();

    assert_eq!(config.backend(), "espeak");
    assert_eq!(config.wait_timeout(), Some(Duration::from_millis(250)));
    assert_eq!(config.rate(), Some(70));
    assert_eq!(config.volume(), None);
    assert_eq!(config.espeak_path().as_deref(), Some("/opt/espeak-ng/bin/espeak-ng"));
    assert_eq!(config.espeak_player().as_deref(), Some("aplay"));
}

#[test]
fn test_save_round_trips_changes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("speechrt.cfg");

    let mut config = Config::load_from(&path).unwrap();
    config.set("engine", "backend", "native");
    config.set("speech", "voice_idx", "3");
    config.save().unwrap();

    let reloaded = Config::load_from(&path).unwrap();
    assert_eq!(reloaded.backend(), "native");
    assert_eq!(reloaded.voice_idx(), Some(3));
}

#[test]
fn test_malformed_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("speechrt.cfg");
    fs::write(&path, "[engine\nbackend = auto\n").unwrap();

    assert!(Config::load_from(&path).is_err());
}

#[test]
fn test_unknown_backend_rejected() {
    let mut config = Config::default();
    config.set("engine", "backend", "festival");

    assert!(speechrt::speech::create_backend(&config).is_err());
}
