// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for checkpoint operations
//!
//! This module provides command-line functionality for:
//! - Validating identifier text
//! - Decoding a QR code from an image file
//! - Listing the cameras built from a set of frame images
//! - Running the full scan, capture and verify workflow headlessly

use checkpost::backends::camera::types::{DeviceId, Facing, StreamConstraints, StreamPurpose};
use checkpost::backends::camera::CameraResource;
use checkpost::backends::virtual_camera::{VirtualCameraPlatform, VirtualDevice, load_image_as_frame};
use checkpost::decoder::{CodeDecoder, QrDetector, ScanWindow, SymbolDecoder, qr_detector};
use checkpost::upload::{HttpVerificationApi, VerificationUploader};
use checkpost::workflow::{
    Command, Cue, WorkflowController, WorkflowEvent, WorkflowHandle, WorkflowSettings,
    WorkflowState,
};
use checkpost::{Config, validator};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Id of the camera built from `--frames`
const VIRTUAL_DEVICE_ID: &str = "virtual0";

/// Options for `checkpost run`
pub struct RunOptions {
    pub frames: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub interactive: bool,
    pub full_frame: bool,
}

/// Check whether `text` is a valid identifier
pub fn validate_identifier(text: &str) -> Result<(), Box<dyn std::error::Error>> {
    match validator::validate(text) {
        Some(identifier) => {
            println!("Valid identifier: {}", identifier);
            Ok(())
        }
        None => Err(format!("Not a valid identifier: {:?}", text).into()),
    }
}

/// Decode a QR code from an image file
pub fn decode_image(path: &Path, window: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    let frame = Arc::new(load_image_as_frame(path)?);
    println!("Image: {} ({}x{})", path.display(), frame.width, frame.height);

    let region = qr_detector::crop_to_window(&frame, window.map(ScanWindow::square));
    let Some(payload) = QrDetector::new().decode(&region) else {
        return Err("No QR code found".into());
    };

    println!("Payload: {}", payload);
    match validator::validate(&payload) {
        Some(identifier) => println!("Identifier: {}", identifier),
        None => println!("Identifier: none (payload has the wrong format)"),
    }
    Ok(())
}

/// List the cameras available from a set of frame images
pub fn list_cameras(frames: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    let platform = Arc::new(build_platform(frames)?);
    let resource = CameraResource::new(platform);

    let runtime = tokio::runtime::Runtime::new()?;
    let devices = runtime.block_on(async {
        // Labels are only reliable after a grant
        let handle = resource
            .request_access(StreamConstraints {
                purpose: StreamPurpose::Decode,
                facing: Facing::Environment,
                ideal_width: 0,
                ideal_height: 0,
            })
            .await?;
        let devices = resource.enumerate_devices().await;
        handle.release();
        Ok::<_, checkpost::errors::PermissionError>(devices)
    })?;

    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for device in &devices {
        println!("  [{}] {} ({})", device.id, device.label, device.facing);
    }
    println!();
    Ok(())
}

/// Run the verification workflow against the virtual camera
pub fn run_workflow(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &options.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(url) = options.api_url {
        config.api.base_url = url;
    }
    if options.token.is_some() {
        config.api.auth_token = options.token;
    }
    if options.full_frame {
        config.scan.scan_window = None;
    }

    let platform = Arc::new(build_platform(&options.frames)?);
    let resource = CameraResource::new(platform);
    resource.set_preferred_device(config.camera.preferred_device_id());

    let decoder = CodeDecoder::new(Arc::new(QrDetector::new()), config.scan.sample_rate_hz);
    let api = HttpVerificationApi::new(
        &config.api.base_url,
        config.api.auth_token.clone(),
        config.api.request_timeout_secs.map(Duration::from_secs),
    )?;
    println!("Verification endpoint: {}", api.endpoint());
    let uploader = VerificationUploader::new(Arc::new(api));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let (controller, handle) = WorkflowController::new(
            resource,
            decoder,
            uploader,
            WorkflowSettings::from(&config),
        );
        let events = handle.subscribe();
        let task = tokio::spawn(controller.run());

        if options.interactive {
            print_help();
        }
        let result = drive(&handle, events, options.interactive).await;

        handle.shutdown();
        if let Err(e) = task.await {
            warn!(error = %e, "Workflow task failed");
        }
        result
    })
}

/// One virtual camera replaying every frame image
fn build_platform(frames: &[PathBuf]) -> Result<VirtualCameraPlatform, Box<dyn std::error::Error>> {
    let device = VirtualDevice::from_images(
        VIRTUAL_DEVICE_ID,
        format!("Virtual camera ({} frames)", frames.len()),
        Facing::Environment,
        frames,
    )?
    .with_torch(true);

    Ok(VirtualCameraPlatform::builder().device(device).build())
}

/// Print events and react to them until the workflow is done
async fn drive(
    handle: &WorkflowHandle,
    mut events: broadcast::Receiver<WorkflowEvent>,
    interactive: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdin = interactive.then(|| BufReader::new(tokio::io::stdin()).lines());

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&event);
                    if !interactive && let Some(done) = auto_step(handle, &event) {
                        return done;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed workflow events");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            line = next_line(&mut stdin) => {
                let Some(line) = line else {
                    debug!("Input closed");
                    return Ok(());
                };
                match parse_command(&line) {
                    Some(Command::Shutdown) => return Ok(()),
                    Some(command) => {
                        handle.send(command);
                    }
                    None if line.trim().is_empty() => {}
                    None => {
                        println!("Unknown command: {}", line.trim());
                        print_help();
                    }
                }
            }
        }
    }
}

async fn next_line(lines: &mut Option<Lines<BufReader<Stdin>>>) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => std::future::pending().await,
    }
}

/// Advance the workflow without an operator
///
/// Returns the final outcome once the workflow reaches an end state.
fn auto_step(
    handle: &WorkflowHandle,
    event: &WorkflowEvent,
) -> Option<Result<(), Box<dyn std::error::Error>>> {
    let WorkflowEvent::StateChanged(state) = event else {
        return None;
    };

    match state {
        WorkflowState::Capturing { .. } => {
            handle.capture();
            None
        }
        WorkflowState::Reviewing { .. } => {
            handle.confirm();
            None
        }
        WorkflowState::Verified { .. } => Some(Ok(())),
        WorkflowState::UploadFailed { reason, .. } => {
            Some(Err(format!("Verification failed: {}", reason).into()))
        }
        WorkflowState::CameraError { kind } => Some(Err((*kind).into())),
        _ => None,
    }
}

fn print_event(event: &WorkflowEvent) {
    let time = Local::now().format("%H:%M:%S");
    match event {
        WorkflowEvent::StateChanged(state) => match state {
            WorkflowState::Reviewing { identifier, image } => println!(
                "[{}] Reviewing {}: {}x{} photo, {} bytes",
                time,
                identifier,
                image.width,
                image.height,
                image.data.len()
            ),
            other => println!("[{}] {}", time, other),
        },
        WorkflowEvent::Cue(Cue::ScanAccepted) => println!("[{}] * beep *", time),
        WorkflowEvent::Cue(Cue::Shutter) => println!("[{}] * click *", time),
        WorkflowEvent::TorchChanged { on } => {
            println!("[{}] Torch {}", time, if *on { "on" } else { "off" })
        }
        WorkflowEvent::TorchFailed(e) => println!("[{}] Torch: {}", time, e),
    }
}

fn print_help() {
    println!("Commands: capture, retake, confirm, retry, cancel, restart, torch on|off, switch <id>, quit");
}

/// Parse one interactive command line
fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match (words.next()?, words.next()) {
        ("capture", None) => Command::Capture,
        ("retake", None) => Command::Retake,
        ("confirm", None) => Command::Confirm,
        ("retry", None) => Command::Retry,
        ("cancel", None) => Command::Cancel,
        ("restart", None) => Command::Restart,
        ("torch", Some("on")) => Command::SetTorch(true),
        ("torch", Some("off")) => Command::SetTorch(false),
        ("switch", Some(id)) => Command::SwitchCamera(DeviceId::new(id)),
        ("quit" | "exit", None) => Command::Shutdown,
        _ => return None,
    };

    // Trailing words make the line ambiguous
    words.next().is_none().then_some(command)
}
