// SPDX-License-Identifier: GPL-3.0-only

//! Checkpoint workflow controller
//!
//! A single task owns the [`WorkflowState`] and processes one message at a
//! time: operator commands from [`WorkflowHandle`]s and completions of the
//! asynchronous work it started (camera acquisition, decoding, the confirm
//! pause, still capture, upload).
//!
//! Every completion carries the epoch it was started in. The epoch moves on
//! every state entry and camera switch, so a completion that arrives after
//! the operator moved on is dropped, and any camera handle inside it is
//! released by its `Drop`.
//!
//! ```text
//!   Idle ──► Scanning ──► ScanConfirmed ──► Capturing ◄──► Reviewing
//!    ▲          │                              │  ▲            │
//!    │          ▼                              │  │ retake     ▼ confirm
//!    │     CameraError ◄───────────────────────┘  └──────── Uploading
//!    │                                            retry ▲      │
//!    └──────────── restart ◄── Verified ◄── ok ─────────┼──────┤
//!                                           UploadFailed ◄─────┘
//! ```

pub mod state;
mod update;

pub use state::{WorkflowState, WorkflowView};

use crate::backends::camera::types::{DeviceId, StreamConstraints, StreamPurpose};
use crate::backends::camera::{CameraHandle, CameraResource};
use crate::capture::{CaptureId, CaptureSession, CaptureSettings, CapturedImage};
use crate::config::Config;
use crate::constants;
use crate::decoder::{CodeDecoder, ScanWindow};
use crate::errors::{CaptureError, DecodeError, PermissionError, TorchError};
use crate::scan::ScanSession;
use crate::upload::{UploadResult, VerificationUploader};
use crate::validator::Identifier;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Operator commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Take the confirmation photo
    Capture,
    /// Discard the photo and return to the preview
    Retake,
    /// Upload the photo under review
    Confirm,
    /// Upload the same photo again, or recover from a camera error
    Retry,
    /// Drop the current identifier and scan again
    Cancel,
    /// Start over for the next vehicle
    Restart,
    SetTorch(bool),
    SwitchCamera(DeviceId),
    Shutdown,
}

/// One-shot feedback for the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// A valid code was accepted
    ScanAccepted,
    /// The shutter fired
    Shutter,
}

/// Everything observers can see happen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    StateChanged(WorkflowState),
    Cue(Cue),
    TorchChanged { on: bool },
    TorchFailed(TorchError),
}

/// Controller settings
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSettings {
    pub scan_constraints: StreamConstraints,
    pub capture_constraints: StreamConstraints,
    pub scan_window: Option<ScanWindow>,
    /// Pause on ScanConfirmed before the capture view opens
    pub confirm_delay: Duration,
    pub capture: CaptureSettings,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for WorkflowSettings {
    fn from(config: &Config) -> Self {
        let camera = &config.camera;
        Self {
            scan_constraints: StreamConstraints {
                purpose: StreamPurpose::Decode,
                facing: camera.preferred_facing,
                ideal_width: camera.scan_resolution.width,
                ideal_height: camera.scan_resolution.height,
            },
            capture_constraints: StreamConstraints {
                purpose: StreamPurpose::Still,
                facing: camera.preferred_facing,
                ideal_width: camera.capture_resolution.width,
                ideal_height: camera.capture_resolution.height,
            },
            scan_window: config.scan.scan_window.map(|r| {
                ScanWindow::in_viewfinder(r.width, r.height, config.scan.viewfinder_width)
            }),
            confirm_delay: Duration::from_millis(config.scan.confirm_delay_ms),
            capture: CaptureSettings {
                shutter_delay: Duration::from_millis(config.capture.shutter_delay_ms),
                jpeg_quality: config.capture.jpeg_quality,
            },
        }
    }
}

/// Handle for driving and observing a running controller
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<WorkflowState>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowHandle {
    /// Send a command; false once the controller has stopped
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn capture(&self) -> bool {
        self.send(Command::Capture)
    }

    pub fn retake(&self) -> bool {
        self.send(Command::Retake)
    }

    pub fn confirm(&self) -> bool {
        self.send(Command::Confirm)
    }

    pub fn retry(&self) -> bool {
        self.send(Command::Retry)
    }

    pub fn cancel(&self) -> bool {
        self.send(Command::Cancel)
    }

    pub fn restart(&self) -> bool {
        self.send(Command::Restart)
    }

    pub fn set_torch(&self, on: bool) -> bool {
        self.send(Command::SetTorch(on))
    }

    pub fn switch_camera(&self, device: DeviceId) -> bool {
        self.send(Command::SwitchCamera(device))
    }

    pub fn shutdown(&self) -> bool {
        self.send(Command::Shutdown)
    }

    /// Current state
    pub fn state(&self) -> WorkflowState {
        self.state.borrow().clone()
    }

    /// A receiver that is notified on every state change
    pub fn watch_state(&self) -> watch::Receiver<WorkflowState> {
        self.state.clone()
    }

    /// Subscribe to events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Wait until the state satisfies `predicate`
    ///
    /// Returns `None` if the controller stopped first.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&WorkflowState) -> bool,
    ) -> Option<WorkflowState> {
        let mut state = self.state.clone();
        let found = match state.wait_for(|s| predicate(s)).await {
            Ok(found) => Some(found.clone()),
            Err(_) => None,
        };
        found
    }
}

/// Completions and commands, processed strictly one at a time
#[derive(Debug)]
enum Message {
    Command(Command),
    CameraAcquired {
        epoch: u64,
        result: Result<CameraHandle, PermissionError>,
    },
    CameraSwitched {
        epoch: u64,
        result: Result<CameraHandle, PermissionError>,
    },
    ScanFinished {
        epoch: u64,
        outcome: Result<Identifier, DecodeError>,
    },
    ConfirmElapsed {
        epoch: u64,
    },
    Captured {
        epoch: u64,
        result: Result<CapturedImage, CaptureError>,
    },
    Uploaded {
        epoch: u64,
        capture: CaptureId,
        result: UploadResult,
    },
}

/// The camera currently held by the controller
#[derive(Debug, Default)]
enum Camera {
    /// Nothing held (also while an acquisition or switch is pending)
    #[default]
    None,
    Scan(ScanSession),
    /// Decoding stopped, the scan camera stays up during the confirm pause
    Confirmed(CameraHandle),
    Preview(CaptureSession),
}

impl Camera {
    fn handle(&self) -> Option<&CameraHandle> {
        match self {
            Camera::None => None,
            Camera::Scan(session) => Some(session.handle()),
            Camera::Confirmed(handle) => Some(handle),
            Camera::Preview(session) => Some(session.handle()),
        }
    }

    fn release(self) {
        match self {
            Camera::None => {}
            Camera::Scan(session) => session.release(),
            Camera::Confirmed(handle) => handle.release(),
            Camera::Preview(session) => session.release(),
        }
    }
}

/// The workflow state machine
pub struct WorkflowController {
    resource: CameraResource,
    decoder: CodeDecoder,
    uploader: VerificationUploader,
    settings: WorkflowSettings,

    state: WorkflowState,
    epoch: u64,
    camera: Camera,
    /// Set by the first accepted identifier, reset on entering Scanning
    scan_latch: bool,
    /// Capture requested before the preview was ready
    pending_capture: bool,
    capture_in_flight: bool,
    /// Pending acquisition or switch; aborted when the epoch moves
    acquisition: Option<JoinHandle<()>>,

    commands: mpsc::UnboundedReceiver<Command>,
    messages_tx: mpsc::UnboundedSender<Message>,
    messages_rx: mpsc::UnboundedReceiver<Message>,
    state_tx: watch::Sender<WorkflowState>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowController {
    /// Create a controller and a handle to drive it
    ///
    /// Nothing happens until [`WorkflowController::run`] is awaited.
    pub fn new(
        resource: CameraResource,
        decoder: CodeDecoder,
        uploader: VerificationUploader,
        settings: WorkflowSettings,
    ) -> (Self, WorkflowHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(WorkflowState::Idle);
        let (events, _) = broadcast::channel(constants::EVENT_CHANNEL_CAPACITY);

        let handle = WorkflowHandle {
            commands: commands_tx,
            state: state_rx,
            events: events.clone(),
        };

        let controller = Self {
            resource,
            decoder,
            uploader,
            settings,
            state: WorkflowState::Idle,
            epoch: 0,
            camera: Camera::None,
            scan_latch: false,
            pending_capture: false,
            capture_in_flight: false,
            acquisition: None,
            commands,
            messages_tx,
            messages_rx,
            state_tx,
            events,
        };

        (controller, handle)
    }

    /// Current state
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Run until shutdown or until every handle is dropped
    ///
    /// The camera is released on the way out.
    pub async fn run(mut self) {
        info!("Workflow started");
        self.enter_idle();

        loop {
            let message = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => Message::Command(command),
                    None => {
                        debug!("All workflow handles dropped");
                        break;
                    }
                },
                Some(message) = self.messages_rx.recv() => message,
            };

            if !self.update(message) {
                break;
            }
        }

        self.abort_acquisition();
        self.release_camera();
        info!(state = self.state.name(), "Workflow stopped");
    }

    /// Spawn `future` and feed its result back as a message
    fn perform<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = Message> + Send + 'static,
    {
        let tx = self.messages_tx.clone();
        tokio::spawn(async move {
            // A closed channel means the controller stopped; dropping the
            // message releases anything it carries
            let _ = tx.send(future.await);
        })
    }

    /// Spawn a camera acquisition or switch
    ///
    /// Only one may be pending, so an outdated request can never open the
    /// camera after a newer one.
    fn acquire<F>(&mut self, future: F)
    where
        F: Future<Output = Message> + Send + 'static,
    {
        self.abort_acquisition();
        self.acquisition = Some(self.perform(future));
    }

    fn abort_acquisition(&mut self) {
        if let Some(task) = self.acquisition.take() {
            task.abort();
        }
    }

    /// Start a new epoch, invalidating everything in flight
    fn bump_epoch(&mut self) {
        self.epoch += 1;
        self.pending_capture = false;
        self.capture_in_flight = false;
        self.abort_acquisition();
    }

    fn set_state(&mut self, state: WorkflowState) {
        self.bump_epoch();
        info!(
            from = self.state.name(),
            to = %state,
            epoch = self.epoch,
            "Workflow state changed"
        );
        self.state = state.clone();
        self.state_tx.send_replace(state.clone());
        self.emit(WorkflowEvent::StateChanged(state));
    }

    fn emit(&self, event: WorkflowEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn release_camera(&mut self) {
        std::mem::take(&mut self.camera).release();
    }
}

impl std::fmt::Debug for WorkflowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowController")
            .field("state", &self.state)
            .field("epoch", &self.epoch)
            .field("camera", &self.camera.handle().map(|h| h.id()))
            .finish()
    }
}
