// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use checkpost::constants::{self, api, resolution};
use std::time::Duration;

#[test]
fn test_sample_rate_bounds_contain_default() {
    assert!(constants::MIN_DECODE_SAMPLE_RATE_HZ <= constants::DECODE_SAMPLE_RATE_HZ);
    assert!(constants::DECODE_SAMPLE_RATE_HZ <= constants::MAX_DECODE_SAMPLE_RATE_HZ);
}

#[test]
fn test_capture_resolution_is_larger_than_scan() {
    assert!(
        resolution::CAPTURE_WIDTH * resolution::CAPTURE_HEIGHT
            > resolution::SCAN_WIDTH * resolution::SCAN_HEIGHT
    );
}

#[test]
fn test_timings() {
    // The shutter must fire well within the confirm pause of the next vehicle
    assert!(constants::SHUTTER_DELAY < constants::SCAN_CONFIRM_DELAY);
    assert!(constants::SCAN_CONFIRM_DELAY <= Duration::from_secs(2));
}

#[test]
fn test_capture_format() {
    assert_eq!(constants::CAPTURE_MIME_TYPE, "image/jpeg");
    assert!((1..=100).contains(&constants::CAPTURE_JPEG_QUALITY));
}

#[test]
fn test_api_paths_are_relative() {
    assert!(!api::VERIFY_PATH.starts_with('/'));
    assert!(!api::DEFAULT_BASE_URL.ends_with('/'));
}
