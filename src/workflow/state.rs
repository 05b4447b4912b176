// SPDX-License-Identifier: GPL-3.0-only

//! Workflow state
//!
//! One tagged variant is the whole truth about where the operator is. Every
//! UI flag is derived from it through [`WorkflowState::view`].

use crate::capture::CapturedImage;
use crate::errors::{PermissionError, UploadError};
use crate::validator::Identifier;

/// Where the checkpoint workflow currently is
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkflowState {
    /// Acquiring the scan camera
    #[default]
    Idle,
    /// Decoding frames, waiting for a valid identifier
    Scanning,
    /// A code was accepted; the capture view opens after a short pause
    ScanConfirmed { identifier: Identifier },
    /// Live preview for the confirmation photo
    Capturing { identifier: Identifier },
    /// A photo was taken and awaits confirmation
    Reviewing {
        identifier: Identifier,
        image: CapturedImage,
    },
    /// The photo is being verified
    Uploading {
        identifier: Identifier,
        image: CapturedImage,
    },
    /// Verification succeeded
    Verified { identifier: Identifier },
    /// Verification failed; retry or retake
    UploadFailed {
        identifier: Identifier,
        image: CapturedImage,
        reason: UploadError,
    },
    /// Camera access failed; restart to try again
    CameraError { kind: PermissionError },
}

impl WorkflowState {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "Idle",
            WorkflowState::Scanning => "Scanning",
            WorkflowState::ScanConfirmed { .. } => "ScanConfirmed",
            WorkflowState::Capturing { .. } => "Capturing",
            WorkflowState::Reviewing { .. } => "Reviewing",
            WorkflowState::Uploading { .. } => "Uploading",
            WorkflowState::Verified { .. } => "Verified",
            WorkflowState::UploadFailed { .. } => "UploadFailed",
            WorkflowState::CameraError { .. } => "CameraError",
        }
    }

    /// The current identifier, if one was accepted
    pub fn identifier(&self) -> Option<&Identifier> {
        match self {
            WorkflowState::ScanConfirmed { identifier }
            | WorkflowState::Capturing { identifier }
            | WorkflowState::Reviewing { identifier, .. }
            | WorkflowState::Uploading { identifier, .. }
            | WorkflowState::Verified { identifier }
            | WorkflowState::UploadFailed { identifier, .. } => Some(identifier),
            WorkflowState::Idle
            | WorkflowState::Scanning
            | WorkflowState::CameraError { .. } => None,
        }
    }

    /// The photo held by this state, if any
    pub fn image(&self) -> Option<&CapturedImage> {
        match self {
            WorkflowState::Reviewing { image, .. }
            | WorkflowState::Uploading { image, .. }
            | WorkflowState::UploadFailed { image, .. } => Some(image),
            _ => None,
        }
    }

    /// Whether camera controls (torch, switch) apply in this state
    pub fn owns_camera(&self) -> bool {
        matches!(
            self,
            WorkflowState::Scanning | WorkflowState::Capturing { .. }
        )
    }

    /// Flags for the UI
    pub fn view(&self) -> WorkflowView {
        WorkflowView {
            is_scanning: matches!(self, WorkflowState::Scanning),
            is_uploading: matches!(self, WorkflowState::Uploading { .. }),
            upload_succeeded: matches!(self, WorkflowState::Verified { .. }),
            upload_failed: matches!(self, WorkflowState::UploadFailed { .. }),
            camera_owned: self.owns_camera(),
            can_capture: matches!(self, WorkflowState::Capturing { .. }),
            can_retake: matches!(
                self,
                WorkflowState::Reviewing { .. } | WorkflowState::UploadFailed { .. }
            ),
            identifier: self.identifier().cloned(),
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowState::CameraError { kind } => write!(f, "CameraError({})", kind),
            WorkflowState::UploadFailed {
                identifier, reason, ..
            } => write!(f, "UploadFailed({}: {})", identifier, reason),
            other => match other.identifier() {
                Some(identifier) => write!(f, "{}({})", other.name(), identifier),
                None => f.write_str(other.name()),
            },
        }
    }
}

/// Derived UI flags
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkflowView {
    pub is_scanning: bool,
    pub is_uploading: bool,
    pub upload_succeeded: bool,
    pub upload_failed: bool,
    pub camera_owned: bool,
    pub can_capture: bool,
    pub can_retake: bool,
    pub identifier: Option<Identifier>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::CameraFrame;
    use crate::validator::validate;

    fn image() -> CapturedImage {
        crate::capture::encode_jpeg(&CameraFrame::from_gray(2, 2, vec![0; 4]), 80).unwrap()
    }

    #[test]
    fn test_view_flags_follow_variant() {
        let id = validate("12-34-567").unwrap();

        let scanning = WorkflowState::Scanning.view();
        assert!(scanning.is_scanning && scanning.camera_owned);
        assert!(!scanning.can_capture);
        assert_eq!(scanning.identifier, None);

        let uploading = WorkflowState::Uploading {
            identifier: id.clone(),
            image: image(),
        }
        .view();
        assert!(uploading.is_uploading);
        assert!(!uploading.can_retake && !uploading.can_capture && !uploading.camera_owned);
        assert_eq!(uploading.identifier, Some(id.clone()));

        let failed = WorkflowState::UploadFailed {
            identifier: id.clone(),
            image: image(),
            reason: UploadError::Timeout,
        }
        .view();
        assert!(failed.upload_failed && failed.can_retake);
        assert!(!failed.upload_succeeded);

        let verified = WorkflowState::Verified { identifier: id }.view();
        assert!(verified.upload_succeeded && !verified.upload_failed);
    }

    #[test]
    fn test_only_scanning_and_capturing_own_camera() {
        let id = validate("12-34-567").unwrap();
        assert!(WorkflowState::Capturing {
            identifier: id.clone()
        }
        .owns_camera());
        assert!(!WorkflowState::Idle.owns_camera());
        assert!(!WorkflowState::ScanConfirmed { identifier: id }.owns_camera());
        assert!(!WorkflowState::CameraError {
            kind: PermissionError::Denied
        }
        .owns_camera());
    }

    #[test]
    fn test_display() {
        let id = validate("12-34-567").unwrap();
        assert_eq!(
            WorkflowState::Capturing { identifier: id }.to_string(),
            "Capturing(12-34-567)"
        );
        assert_eq!(
            WorkflowState::CameraError {
                kind: PermissionError::Unsupported
            }
            .to_string(),
            "CameraError(Camera is not supported on this platform)"
        );
    }
}
