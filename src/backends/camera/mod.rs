// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ WorkflowController  │
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │   CameraResource    │  ← Exclusive ownership, permission state, release accounting
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CameraPlatform Trait│  ← Permission prompt, enumeration, streams
//! └──────────┬──────────┘
//!            │
//!            ▼
//!     ┌──────────────┐
//!     │VirtualCamera │  ← Concrete implementation
//!     └──────────────┘
//! ```

pub mod resource;
pub mod types;

pub use resource::{CameraHandle, CameraResource, HandleId, ResourceStats};
pub use types::*;

use crate::errors::TorchError;
use futures::future::BoxFuture;

/// Camera platform API
///
/// Everything that touches physical hardware goes through this trait. It
/// knows nothing about QR codes or the workflow.
pub trait CameraPlatform: Send + Sync + 'static {
    /// Whether the platform has camera APIs at all
    fn is_supported(&self) -> bool;

    /// Trigger the permission prompt
    ///
    /// Resolves immediately when the decision was already made.
    fn request_permission(&self) -> BoxFuture<'_, PermissionDecision>;

    /// Enumerate physical cameras
    ///
    /// Labels may be empty until permission has been granted.
    fn enumerate_devices(&self) -> BoxFuture<'_, Vec<CameraDevice>>;

    /// Open a stream on a device
    ///
    /// # Returns
    /// * `Ok(OpenStream)` - Frames start flowing into the returned receiver
    /// * `Err(PlatformError)` - The device could not be opened
    fn open_stream<'a>(
        &'a self,
        device: &'a CameraDevice,
        constraints: &'a StreamConstraints,
    ) -> BoxFuture<'a, Result<OpenStream, PlatformError>>;
}

/// Control surface of a running stream
pub trait StreamControl: Send {
    /// Whether the device has a controllable light
    fn torch_supported(&self) -> bool;

    /// Switch the light on or off
    fn set_torch(&mut self, on: bool) -> Result<(), TorchError>;

    /// Stop all media tracks. Must be idempotent.
    fn stop(&mut self);
}

/// A freshly opened stream
pub struct OpenStream {
    pub frames: FrameReceiver,
    pub control: Box<dyn StreamControl>,
}

impl std::fmt::Debug for OpenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenStream")
            .field("torch_supported", &self.control.torch_supported())
            .finish()
    }
}
