// SPDX-License-Identifier: GPL-3.0-only

//! Message handling
//!
//! `update()` routes each message to a focused handler. Handlers for
//! completions first compare the message epoch with the current one and
//! drop anything stale.

use super::{Camera, Command, Cue, Message, WorkflowController, WorkflowEvent, WorkflowState};
use crate::backends::camera::CameraHandle;
use crate::backends::camera::types::DeviceId;
use crate::capture::{CaptureId, CaptureSession, CapturedImage, Shutter};
use crate::errors::{CaptureError, DecodeError, PermissionError};
use crate::scan::ScanSession;
use crate::upload::UploadResult;
use crate::validator::Identifier;
use tracing::{debug, info, warn};

impl WorkflowController {
    /// Handle one message. Returns false when the controller should stop.
    pub(super) fn update(&mut self, message: Message) -> bool {
        match message {
            Message::Command(command) => return self.handle_command(command),
            Message::CameraAcquired { epoch, result } => self.handle_camera_acquired(epoch, result),
            Message::CameraSwitched { epoch, result } => self.handle_camera_switched(epoch, result),
            Message::ScanFinished { epoch, outcome } => self.handle_scan_finished(epoch, outcome),
            Message::ConfirmElapsed { epoch } => self.handle_confirm_elapsed(epoch),
            Message::Captured { epoch, result } => self.handle_captured(epoch, result),
            Message::Uploaded {
                epoch,
                capture,
                result,
            } => self.handle_uploaded(epoch, capture, result),
        }
        true
    }

    fn handle_command(&mut self, command: Command) -> bool {
        debug!(?command, state = self.state.name(), "Command");
        match command {
            Command::Capture => self.handle_capture(),
            Command::Retake => self.handle_retake(),
            Command::Confirm => self.handle_confirm(),
            Command::Retry => self.handle_retry(),
            Command::Cancel => self.handle_cancel(),
            Command::Restart => self.handle_restart(),
            Command::SetTorch(on) => self.handle_set_torch(on),
            Command::SwitchCamera(device) => self.handle_switch_camera(device),
            Command::Shutdown => {
                info!("Workflow shutdown requested");
                return false;
            }
        }
        true
    }

    fn ignore(&self, command: Command) {
        debug!(?command, state = self.state.name(), "Command not valid in this state");
    }

    fn is_stale(&self, epoch: u64, what: &str) -> bool {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, what, "Discarding stale completion");
            return true;
        }
        false
    }

    // =========================================================================
    // State entry
    // =========================================================================

    /// Release everything and acquire the scan camera
    pub(super) fn enter_idle(&mut self) {
        self.release_camera();
        self.set_state(WorkflowState::Idle);

        let epoch = self.epoch;
        let resource = self.resource.clone();
        let constraints = self.settings.scan_constraints.clone();
        self.acquire(async move {
            Message::CameraAcquired {
                epoch,
                result: resource.request_access(constraints).await,
            }
        });
    }

    fn enter_scanning(&mut self, handle: CameraHandle) {
        self.set_state(WorkflowState::Scanning);
        self.scan_latch = false;
        self.start_scan(handle);
    }

    fn enter_capturing(&mut self, identifier: Identifier) {
        self.release_camera();
        self.set_state(WorkflowState::Capturing { identifier });

        let epoch = self.epoch;
        let resource = self.resource.clone();
        let constraints = self.settings.capture_constraints.clone();
        self.acquire(async move {
            Message::CameraAcquired {
                epoch,
                result: resource.request_access(constraints).await,
            }
        });
    }

    fn enter_camera_error(&mut self, kind: PermissionError) {
        warn!(error = %kind, "Camera error");
        self.release_camera();
        self.set_state(WorkflowState::CameraError { kind });
    }

    fn enter_uploading(&mut self, identifier: Identifier, image: CapturedImage) {
        self.set_state(WorkflowState::Uploading {
            identifier: identifier.clone(),
            image: image.clone(),
        });

        let epoch = self.epoch;
        let uploader = self.uploader.clone();
        self.perform(async move {
            let result = uploader.upload(&identifier, &image).await;
            Message::Uploaded {
                epoch,
                capture: image.id,
                result,
            }
        });
    }

    // =========================================================================
    // Camera ownership
    // =========================================================================

    fn start_scan(&mut self, handle: CameraHandle) {
        let epoch = self.epoch;
        let tx = self.messages_tx.clone();
        let session = ScanSession::spawn(
            handle,
            &self.decoder,
            self.settings.scan_window,
            move |outcome| {
                let _ = tx.send(Message::ScanFinished { epoch, outcome });
            },
        );
        self.camera = Camera::Scan(session);
    }

    fn attach_preview(&mut self, handle: CameraHandle, identifier: Identifier) {
        let session = CaptureSession::new(handle, identifier, self.settings.capture);
        if self.pending_capture {
            self.pending_capture = false;
            self.fire_shutter(session.shutter());
        }
        self.camera = Camera::Preview(session);
    }

    fn fire_shutter(&mut self, shutter: Shutter) {
        self.capture_in_flight = true;
        self.emit(WorkflowEvent::Cue(Cue::Shutter));

        let epoch = self.epoch;
        self.perform(async move {
            Message::Captured {
                epoch,
                result: shutter.fire().await,
            }
        });
    }

    // =========================================================================
    // Completions
    // =========================================================================

    fn handle_camera_acquired(&mut self, epoch: u64, result: Result<CameraHandle, PermissionError>) {
        if self.is_stale(epoch, "camera acquisition") {
            if let Ok(handle) = result {
                handle.release();
            }
            return;
        }

        let handle = match result {
            Ok(handle) => handle,
            Err(kind) => return self.enter_camera_error(kind),
        };

        match &self.state {
            WorkflowState::Idle => self.enter_scanning(handle),
            WorkflowState::Capturing { identifier } => {
                let identifier = identifier.clone();
                self.attach_preview(handle, identifier);
            }
            state => {
                debug!(state = state.name(), "Camera acquired for no consumer");
                handle.release();
            }
        }
    }

    fn handle_camera_switched(&mut self, epoch: u64, result: Result<CameraHandle, PermissionError>) {
        if self.is_stale(epoch, "camera switch") {
            if let Ok(handle) = result {
                handle.release();
            }
            return;
        }

        let handle = match result {
            Ok(handle) => handle,
            Err(kind) => return self.enter_camera_error(kind),
        };

        match &self.state {
            WorkflowState::Scanning => self.start_scan(handle),
            WorkflowState::Capturing { identifier } => {
                let identifier = identifier.clone();
                self.attach_preview(handle, identifier);
            }
            state => {
                debug!(state = state.name(), "Camera switched for no consumer");
                handle.release();
            }
        }
    }

    fn handle_scan_finished(&mut self, epoch: u64, outcome: Result<Identifier, DecodeError>) {
        if self.is_stale(epoch, "scan") || self.state != WorkflowState::Scanning {
            return;
        }

        let identifier = match outcome {
            Ok(identifier) => identifier,
            Err(e) => {
                self.enter_camera_error(e.into());
                return;
            }
        };

        if self.scan_latch {
            debug!(identifier = %identifier, "Ignoring identifier after the first match");
            return;
        }
        self.scan_latch = true;

        // Decoding stops here; the camera stays up until the capture view opens
        self.camera = match std::mem::take(&mut self.camera) {
            Camera::Scan(session) => Camera::Confirmed(session.into_handle()),
            other => other,
        };

        self.set_state(WorkflowState::ScanConfirmed { identifier });
        self.emit(WorkflowEvent::Cue(Cue::ScanAccepted));

        let epoch = self.epoch;
        let delay = self.settings.confirm_delay;
        self.perform(async move {
            tokio::time::sleep(delay).await;
            Message::ConfirmElapsed { epoch }
        });
    }

    fn handle_confirm_elapsed(&mut self, epoch: u64) {
        if self.is_stale(epoch, "confirm pause") {
            return;
        }
        if let WorkflowState::ScanConfirmed { identifier } = &self.state {
            let identifier = identifier.clone();
            self.enter_capturing(identifier);
        }
    }

    fn handle_captured(&mut self, epoch: u64, result: Result<CapturedImage, CaptureError>) {
        if self.is_stale(epoch, "capture") {
            return;
        }
        self.capture_in_flight = false;

        let WorkflowState::Capturing { identifier } = &self.state else {
            return;
        };
        let identifier = identifier.clone();

        match result {
            Ok(image) => {
                self.release_camera();
                self.set_state(WorkflowState::Reviewing { identifier, image });
            }
            Err(CaptureError::Released) => self.enter_camera_error(PermissionError::Unavailable),
            Err(e) => warn!(identifier = %identifier, error = %e, "Capture failed, still previewing"),
        }
    }

    fn handle_uploaded(&mut self, epoch: u64, capture: CaptureId, result: UploadResult) {
        if self.is_stale(epoch, "upload") {
            return;
        }

        let WorkflowState::Uploading { identifier, image } = &self.state else {
            return;
        };
        if image.id != capture {
            debug!(%capture, current = %image.id, "Upload result for another capture");
            return;
        }
        let (identifier, image) = (identifier.clone(), image.clone());

        match result {
            UploadResult::Success => self.set_state(WorkflowState::Verified { identifier }),
            UploadResult::Failure(reason) => self.set_state(WorkflowState::UploadFailed {
                identifier,
                image,
                reason,
            }),
        }
    }

    // =========================================================================
    // Operator commands
    // =========================================================================

    fn handle_capture(&mut self) {
        if !matches!(self.state, WorkflowState::Capturing { .. }) {
            return self.ignore(Command::Capture);
        }
        if self.capture_in_flight {
            debug!("Capture already in progress");
            return;
        }

        match &self.camera {
            Camera::Preview(session) => {
                let shutter = session.shutter();
                self.fire_shutter(shutter);
            }
            _ => {
                debug!("Preview not ready, capturing once it is");
                self.pending_capture = true;
            }
        }
    }

    fn handle_retake(&mut self) {
        match &self.state {
            WorkflowState::Reviewing { identifier, image }
            | WorkflowState::UploadFailed {
                identifier, image, ..
            } => {
                info!(identifier = %identifier, capture = %image.id, "Discarding photo");
                let identifier = identifier.clone();
                self.enter_capturing(identifier);
            }
            WorkflowState::Uploading { .. } => {
                debug!("Retake is disabled while uploading");
            }
            _ => self.ignore(Command::Retake),
        }
    }

    fn handle_confirm(&mut self) {
        match &self.state {
            WorkflowState::Reviewing { identifier, image } => {
                let (identifier, image) = (identifier.clone(), image.clone());
                self.enter_uploading(identifier, image);
            }
            _ => self.ignore(Command::Confirm),
        }
    }

    fn handle_retry(&mut self) {
        match &self.state {
            WorkflowState::UploadFailed {
                identifier, image, ..
            } => {
                let (identifier, image) = (identifier.clone(), image.clone());
                self.enter_uploading(identifier, image);
            }
            WorkflowState::CameraError { .. } => self.enter_idle(),
            _ => self.ignore(Command::Retry),
        }
    }

    fn handle_cancel(&mut self) {
        match &self.state {
            WorkflowState::Capturing { identifier }
            | WorkflowState::Reviewing { identifier, .. }
            | WorkflowState::Uploading { identifier, .. }
            | WorkflowState::UploadFailed { identifier, .. } => {
                info!(identifier = %identifier, "Cancelled, scanning again");
                self.enter_idle();
            }
            _ => self.ignore(Command::Cancel),
        }
    }

    fn handle_restart(&mut self) {
        match &self.state {
            WorkflowState::Verified { .. } | WorkflowState::CameraError { .. } => {
                self.enter_idle()
            }
            _ => self.ignore(Command::Restart),
        }
    }

    fn handle_set_torch(&mut self, on: bool) {
        if !self.state.owns_camera() {
            return self.ignore(Command::SetTorch(on));
        }
        let Some(handle) = self.camera.handle() else {
            debug!("Torch request while the camera is being acquired");
            return;
        };

        match self.resource.set_torch(handle, on) {
            Ok(()) => self.emit(WorkflowEvent::TorchChanged { on }),
            Err(e) => {
                warn!(error = %e, "Torch request failed");
                self.emit(WorkflowEvent::TorchFailed(e));
            }
        }
    }

    fn handle_switch_camera(&mut self, device: DeviceId) {
        if !self.state.owns_camera() {
            return self.ignore(Command::SwitchCamera(device));
        }

        let handle = match std::mem::take(&mut self.camera) {
            Camera::Scan(session) => session.into_handle(),
            Camera::Preview(session) => session.into_handle(),
            other => {
                self.camera = other;
                debug!(device = %device, "Switch request while the camera is being acquired");
                return;
            }
        };

        // Anything in flight on the old camera is void
        self.bump_epoch();

        let epoch = self.epoch;
        let resource = self.resource.clone();
        self.acquire(async move {
            Message::CameraSwitched {
                epoch,
                result: resource.switch_to(handle, &device).await,
            }
        });
    }
}
