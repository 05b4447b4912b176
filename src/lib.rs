// SPDX-License-Identifier: GPL-3.0-only

//! Checkpost - vehicle verification at transit checkpoints
//!
//! An operator scans the QR code on a vehicle, takes a confirmation photo
//! and submits both to the checkpoint API.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera platform abstraction, exclusive camera access and
//!   a virtual camera
//! - [`decoder`]: Rate-limited QR decoding over a live frame stream
//! - [`validator`]: Identifier format check
//! - [`scan`]: Scan session producing the first valid identifier
//! - [`capture`]: Confirmation photo capture
//! - [`upload`]: Verification API client
//! - [`workflow`]: The state machine tying it all together
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```ignore
//! let resource = CameraResource::new(platform);
//! let decoder = CodeDecoder::new(Arc::new(QrDetector::new()), 10.0);
//! let uploader = VerificationUploader::new(Arc::new(api));
//! let (controller, handle) =
//!     WorkflowController::new(resource, decoder, uploader, WorkflowSettings::default());
//! tokio::spawn(controller.run());
//! handle.wait_for(|s| matches!(s, WorkflowState::Capturing { .. })).await;
//! handle.capture();
//! ```

pub mod backends;
pub mod capture;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod errors;
pub mod scan;
pub mod upload;
pub mod validator;
pub mod workflow;

// Re-export commonly used types
pub use backends::camera::{CameraHandle, CameraResource};
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use validator::Identifier;
pub use workflow::{Command, WorkflowController, WorkflowHandle, WorkflowState};
