// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use checkpost::Config;
use checkpost::backends::camera::types::Facing;
use checkpost::errors::ConfigError;
use checkpost::workflow::WorkflowSettings;
use std::time::Duration;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.api.base_url, "http://localhost:3000/api");
    assert_eq!(config.api.auth_token, None);
    assert_eq!(config.api.request_timeout_secs, None);
    assert_eq!(config.camera.preferred_facing, Facing::Environment);
    assert_eq!(config.scan.sample_rate_hz, 10.0);
    assert_eq!(config.capture.jpeg_quality, 92);
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from(&dir.path().join("missing.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.api.base_url = "https://checkpoint.example/api".into();
    config.api.auth_token = Some("secret".into());
    config.camera.preferred_device = Some("cam1".into());
    config.scan.scan_window = None;
    config.scan.viewfinder_width = 800;
    config.save_to(&path).unwrap();

    assert_eq!(Config::load_from(&path).unwrap(), config);
}

#[test]
fn test_malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        Config::load_from(&path),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_workflow_settings_from_config() {
    let mut config = Config::default();
    config.camera.preferred_facing = Facing::User;
    config.scan.confirm_delay_ms = 1500;
    config.capture.shutter_delay_ms = 0;

    let settings = WorkflowSettings::from(&config);
    assert_eq!(settings.scan_constraints.facing, Facing::User);
    assert_eq!(settings.capture_constraints.ideal_width, 1920);
    assert_eq!(settings.scan_constraints.ideal_width, 1280);
    assert_eq!(settings.confirm_delay, Duration::from_millis(1500));
    assert_eq!(settings.capture.shutter_delay, Duration::ZERO);
    assert_eq!(settings.scan_window.map(|w| w.width), Some(250));
    assert_eq!(
        settings.scan_window.and_then(|w| w.viewfinder_width),
        Some(500)
    );
}
