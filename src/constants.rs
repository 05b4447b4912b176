// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Decode sampling rate in attempts per second
pub const DECODE_SAMPLE_RATE_HZ: f32 = 10.0;

/// Lower bound on the decode sampling rate
pub const MIN_DECODE_SAMPLE_RATE_HZ: f32 = 0.5;

/// Upper bound on the decode sampling rate
pub const MAX_DECODE_SAMPLE_RATE_HZ: f32 = 30.0;

/// Default scan window edge length (centred square), in viewfinder pixels
pub const SCAN_WINDOW_SIZE: u32 = 250;

/// Viewfinder width the scan window is sized against
///
/// The window scales with the stream: 250 of 500 covers half the width of
/// any frame.
pub const SCAN_VIEWFINDER_WIDTH: u32 = 500;

/// Pause on ScanConfirmed before the capture view opens
pub const SCAN_CONFIRM_DELAY: Duration = Duration::from_millis(800);

/// Flash effect duration before the still frame is frozen
pub const SHUTTER_DELAY: Duration = Duration::from_millis(200);

/// JPEG quality used for confirmation photos (0-100)
pub const CAPTURE_JPEG_QUALITY: u8 = 92;

/// Mime type of encoded confirmation photos
pub const CAPTURE_MIME_TYPE: &str = "image/jpeg";

/// Capacity of the workflow event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Resolution hints passed to the camera platform
pub mod resolution {
    /// Width hint for the decoding stream
    pub const SCAN_WIDTH: u32 = 1280;
    /// Height hint for the decoding stream
    pub const SCAN_HEIGHT: u32 = 720;
    /// Ideal width for the still capture stream
    pub const CAPTURE_WIDTH: u32 = 1920;
    /// Ideal height for the still capture stream
    pub const CAPTURE_HEIGHT: u32 = 1080;
}

/// Verification API defaults
pub mod api {
    /// Base URL of the checkpoint API
    pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";
    /// Path of the verification endpoint, relative to the base URL
    pub const VERIFY_PATH: &str = "checkpost/verify";
    /// Multipart field carrying the identifier
    pub const IDENTIFIER_FIELD: &str = "vehicleId";
    /// Multipart field carrying the photo
    pub const IMAGE_FIELD: &str = "image";
}

/// Virtual camera timing
pub mod virtual_camera {
    /// Frame rate at which virtual devices replay their frames
    pub const FRAME_RATE_HZ: u32 = 30;
}
