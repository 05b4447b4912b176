// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Which way a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Rear camera, pointing away from the operator
    #[default]
    Environment,
    /// Front camera, pointing at the operator
    User,
    /// Facing could not be determined
    Unknown,
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Facing::Environment => write!(f, "environment"),
            Facing::User => write!(f, "user"),
            Facing::Unknown => write!(f, "unknown"),
        }
    }
}

/// Opaque platform handle of a physical camera
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Represents a camera device
///
/// Listed once per permission grant and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub id: DeviceId,
    /// Human readable label (may be empty before permission is granted)
    pub label: String,
    pub facing: Facing,
}

/// Camera permission negotiation state
///
/// Reset to `Unknown` whenever a new acquisition begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraPermissionState {
    #[default]
    Unknown,
    Requesting,
    Granted,
    Denied,
    Unsupported,
}

/// Outcome of a platform permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Granted,
    Denied,
}

/// What a stream will be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPurpose {
    /// Low latency frames for symbol decoding
    Decode,
    /// Full resolution preview for still capture
    Still,
}

/// Constraints used when opening a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub purpose: StreamPurpose,
    pub facing: Facing,
    /// Ideal width (the platform may choose another)
    pub ideal_width: u32,
    /// Ideal height (the platform may choose another)
    pub ideal_height: u32,
}

impl std::fmt::Display for StreamConstraints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} {}x{} ({})",
            self.purpose, self.ideal_width, self.ideal_height, self.facing
        )
    }
}

/// Pixel format for camera frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    RGBA,
    /// RGB24 - 24-bit RGB (3 bytes per pixel, no alpha)
    RGB24,
    /// Gray8 - 8-bit grayscale (single channel)
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::RGBA => 4,
            Self::RGB24 => 3,
            Self::Gray8 => 1,
        }
    }
}

/// A single frame delivered by a camera stream
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    pub format: PixelFormat,
    /// Bytes per row, including any padding
    pub stride: u32,
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Create a tightly packed RGBA frame
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data: Arc::from(data),
            format: PixelFormat::RGBA,
            stride: width * 4,
            captured_at: Instant::now(),
        }
    }

    /// Create a tightly packed grayscale frame
    pub fn from_gray(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data: Arc::from(data),
            format: PixelFormat::Gray8,
            stride: width,
            captured_at: Instant::now(),
        }
    }

    /// Luma of the pixel at (x, y), 0 when out of bounds
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        let offset = y as usize * self.stride as usize + x as usize * self.format.bytes_per_pixel();
        match self.format {
            PixelFormat::Gray8 => self.data.get(offset).copied().unwrap_or(0),
            PixelFormat::RGBA | PixelFormat::RGB24 => {
                let Some(px) = self.data.get(offset..offset + 3) else {
                    return 0;
                };
                // BT.601 weights in fixed point
                ((px[0] as u32 * 299 + px[1] as u32 * 587 + px[2] as u32 * 114) / 1000) as u8
            }
        }
    }

    /// RGB value of the pixel at (x, y), black when out of bounds
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let offset = y as usize * self.stride as usize + x as usize * self.format.bytes_per_pixel();
        match self.format {
            PixelFormat::Gray8 => {
                let v = self.data.get(offset).copied().unwrap_or(0);
                [v, v, v]
            }
            PixelFormat::RGBA | PixelFormat::RGB24 => match self.data.get(offset..offset + 3) {
                Some(px) => [px[0], px[1], px[2]],
                None => [0, 0, 0],
            },
        }
    }
}

/// Latest-frame slot shared between a stream and its consumers
///
/// `None` until the first frame arrives. The sender side is dropped when the
/// stream stops, which consumers observe as a closed channel.
pub type FrameReceiver = tokio::sync::watch::Receiver<Option<Arc<CameraFrame>>>;

/// Producer side of [`FrameReceiver`]
pub type FrameSender = tokio::sync::watch::Sender<Option<Arc<CameraFrame>>>;

/// Errors reported by a camera platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The requested device is not present
    DeviceNotFound(String),
    /// The device exists but could not be opened (busy, revoked, unplugged)
    OpenFailed(String),
    /// Permission was revoked while opening
    PermissionDenied,
}

impl std::fmt::Display for PlatformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformError::DeviceNotFound(id) => write!(f, "Device not found: {}", id),
            PlatformError::OpenFailed(msg) => write!(f, "Failed to open device: {}", msg),
            PlatformError::PermissionDenied => write!(f, "Permission denied"),
        }
    }
}

impl std::error::Error for PlatformError {}

impl From<PlatformError> for crate::errors::PermissionError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::PermissionDenied => crate::errors::PermissionError::Denied,
            PlatformError::DeviceNotFound(_) | PlatformError::OpenFailed(_) => {
                crate::errors::PermissionError::Unavailable
            }
        }
    }
}
