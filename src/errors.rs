// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the checkpoint verification workflow
//!
//! Only [`PermissionError`] is fatal to a session. Decode noise and format
//! rejections are not errors at all and never appear here.

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera access errors
    Permission(PermissionError),
    /// Torch control errors
    Torch(TorchError),
    /// Decode stream errors
    Decode(DecodeError),
    /// Still capture errors
    Capture(CaptureError),
    /// Verification upload errors
    Upload(UploadError),
    /// Configuration errors
    Config(ConfigError),
    /// Generic error with message
    Other(String),
}

/// Camera access errors, fatal to the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionError {
    /// The user or platform refused camera access
    Denied,
    /// No camera device exists, or the active one went away
    Unavailable,
    /// The platform has no camera API at all
    Unsupported,
}

/// Torch control errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorchError {
    /// The active device has no controllable light
    Unsupported,
    /// The handle was already released
    NotActive,
}

/// Decode stream termination reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The camera handle feeding the decoder was invalidated
    SourceClosed,
}

/// Still capture errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The preview has not produced a frame yet
    NoFrameAvailable,
    /// The frame could not be encoded
    EncodingFailed(String),
    /// The preview camera was released before the frame was taken
    Released,
}

/// Verification upload errors
///
/// The distinction between variants is advisory. The workflow treats every
/// one of them as a plain failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Connection or transport failure
    Network(String),
    /// The request did not complete within the configured timeout
    Timeout,
    /// The session token was missing, expired or refused
    Unauthorized { status: u16 },
    /// The server rejected the verification
    Rejected { status: u16, message: String },
    /// The server replied with something we could not interpret
    InvalidResponse(String),
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Reading or writing the config file failed
    Io(String),
    /// The config file is not valid JSON for [`crate::Config`]
    Parse(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Permission(e) => write!(f, "Camera error: {}", e),
            AppError::Torch(e) => write!(f, "Torch error: {}", e),
            AppError::Decode(e) => write!(f, "Decode error: {}", e),
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Upload(e) => write!(f, "Upload error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for PermissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionError::Denied => write!(f, "Camera permission denied"),
            PermissionError::Unavailable => write!(f, "No camera available"),
            PermissionError::Unsupported => write!(f, "Camera is not supported on this platform"),
        }
    }
}

impl fmt::Display for TorchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorchError::Unsupported => write!(f, "Torch is not supported by this camera"),
            TorchError::NotActive => write!(f, "Camera is not active"),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::SourceClosed => write!(f, "Camera stream closed"),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::NoFrameAvailable => write!(f, "No frame available for capture"),
            CaptureError::EncodingFailed(msg) => write!(f, "Encoding failed: {}", msg),
            CaptureError::Released => write!(f, "Camera released before capture"),
        }
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::Network(msg) => write!(f, "Network error: {}", msg),
            UploadError::Timeout => write!(f, "Request timed out"),
            UploadError::Unauthorized { status } => write!(f, "Not authorized ({})", status),
            UploadError::Rejected { status, message } => {
                write!(f, "Verification rejected ({}): {}", status, message)
            }
            UploadError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for PermissionError {}
impl std::error::Error for TorchError {}
impl std::error::Error for DecodeError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for UploadError {}
impl std::error::Error for ConfigError {}

impl From<PermissionError> for AppError {
    fn from(err: PermissionError) -> Self {
        AppError::Permission(err)
    }
}

impl From<TorchError> for AppError {
    fn from(err: TorchError) -> Self {
        AppError::Torch(err)
    }
}

impl From<DecodeError> for AppError {
    fn from(err: DecodeError) -> Self {
        AppError::Decode(err)
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        AppError::Upload(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UploadError::Timeout
        } else if err.is_decode() {
            UploadError::InvalidResponse(err.to_string())
        } else {
            UploadError::Network(err.to_string())
        }
    }
}

/// A decode stream ending means the camera went away
impl From<DecodeError> for PermissionError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::SourceClosed => PermissionError::Unavailable,
        }
    }
}
