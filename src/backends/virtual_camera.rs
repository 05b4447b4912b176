// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera platform
//!
//! An in-process [`CameraPlatform`] whose devices replay a fixed list of
//! frames, loaded from image files or generated. Platform support, the
//! permission decision and torch capability are configurable, and every
//! opened and stopped stream is counted so release discipline can be
//! checked from the outside.

use crate::backends::camera::types::*;
use crate::backends::camera::{CameraPlatform, OpenStream, StreamControl};
use crate::constants::virtual_camera as vc;
use crate::errors::TorchError;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Load an image file as an RGBA frame
pub fn load_image_as_frame(path: &Path) -> Result<CameraFrame, image::ImageError> {
    let rgba = image::open(path)?.to_rgba8();
    let (width, height) = rgba.dimensions();

    debug!(path = %path.display(), width, height, "Loaded image as frame");
    Ok(CameraFrame::from_rgba(width, height, rgba.into_raw()))
}

/// A simulated physical camera
#[derive(Debug, Clone)]
pub struct VirtualDevice {
    device: CameraDevice,
    frames: Vec<Arc<CameraFrame>>,
    torch: bool,
    fail_open: bool,
}

impl VirtualDevice {
    /// Create a device replaying `frames` in a loop
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        facing: Facing,
        frames: Vec<CameraFrame>,
    ) -> Self {
        Self {
            device: CameraDevice {
                id: DeviceId::new(id),
                label: label.into(),
                facing,
            },
            frames: frames.into_iter().map(Arc::new).collect(),
            torch: false,
            fail_open: false,
        }
    }

    /// A device showing a flat mid-gray picture
    pub fn solid(id: impl Into<String>, label: impl Into<String>, facing: Facing) -> Self {
        let frame = CameraFrame::from_gray(64, 48, vec![128; 64 * 48]);
        Self::new(id, label, facing, vec![frame])
    }

    /// A device replaying image files
    pub fn from_images<P: AsRef<Path>>(
        id: impl Into<String>,
        label: impl Into<String>,
        facing: Facing,
        paths: &[P],
    ) -> Result<Self, image::ImageError> {
        let frames = paths
            .iter()
            .map(|p| load_image_as_frame(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        info!(count = frames.len(), "Loaded virtual camera frames");
        Ok(Self::new(id, label, facing, frames))
    }

    /// Give the device a controllable light
    pub fn with_torch(mut self, torch: bool) -> Self {
        self.torch = torch;
        self
    }

    /// Make every open of this device fail
    pub fn with_open_failure(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }
}

/// Stream open/stop counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformStats {
    pub opened: usize,
    pub stopped: usize,
}

impl PlatformStats {
    /// Streams still running
    pub fn live(&self) -> usize {
        self.opened - self.stopped
    }
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    stopped: AtomicUsize,
    permission_prompts: AtomicUsize,
}

/// Builder for [`VirtualCameraPlatform`]
#[derive(Debug)]
pub struct VirtualCameraBuilder {
    supported: bool,
    decision: PermissionDecision,
    devices: Vec<VirtualDevice>,
    frame_interval: Duration,
}

impl VirtualCameraBuilder {
    pub fn device(mut self, device: VirtualDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Report no camera API at all
    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    /// Refuse every permission prompt
    pub fn deny_permission(mut self) -> Self {
        self.decision = PermissionDecision::Denied;
        self
    }

    /// Replay frames at this rate
    pub fn frame_rate(mut self, hz: u32) -> Self {
        self.frame_interval = Duration::from_secs(1) / hz.max(1);
        self
    }

    pub fn build(self) -> VirtualCameraPlatform {
        VirtualCameraPlatform {
            supported: self.supported,
            decision: self.decision,
            devices: self.devices,
            frame_interval: self.frame_interval,
            counters: Arc::new(Counters::default()),
        }
    }
}

/// Virtual camera platform
#[derive(Debug)]
pub struct VirtualCameraPlatform {
    supported: bool,
    decision: PermissionDecision,
    devices: Vec<VirtualDevice>,
    frame_interval: Duration,
    counters: Arc<Counters>,
}

impl VirtualCameraPlatform {
    pub fn builder() -> VirtualCameraBuilder {
        VirtualCameraBuilder {
            supported: true,
            decision: PermissionDecision::Granted,
            devices: Vec::new(),
            frame_interval: Duration::from_secs(1) / vc::FRAME_RATE_HZ,
        }
    }

    /// Stream open/stop counters
    pub fn stats(&self) -> PlatformStats {
        PlatformStats {
            opened: self.counters.opened.load(Ordering::SeqCst),
            stopped: self.counters.stopped.load(Ordering::SeqCst),
        }
    }

    /// How many times the permission prompt was shown
    pub fn permission_prompts(&self) -> usize {
        self.counters.permission_prompts.load(Ordering::SeqCst)
    }
}

impl CameraPlatform for VirtualCameraPlatform {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn request_permission(&self) -> BoxFuture<'_, PermissionDecision> {
        self.counters
            .permission_prompts
            .fetch_add(1, Ordering::SeqCst);
        futures::future::ready(self.decision).boxed()
    }

    fn enumerate_devices(&self) -> BoxFuture<'_, Vec<CameraDevice>> {
        let devices = self.devices.iter().map(|d| d.device.clone()).collect();
        futures::future::ready(devices).boxed()
    }

    fn open_stream<'a>(
        &'a self,
        device: &'a CameraDevice,
        constraints: &'a StreamConstraints,
    ) -> BoxFuture<'a, Result<OpenStream, PlatformError>> {
        async move {
            let source = self
                .devices
                .iter()
                .find(|d| d.device.id == device.id)
                .ok_or_else(|| PlatformError::DeviceNotFound(device.id.to_string()))?;

            if source.fail_open {
                return Err(PlatformError::OpenFailed(format!(
                    "{} is busy",
                    source.device.label
                )));
            }

            info!(device = %source.device.label, constraints = %constraints, "Opening virtual camera stream");

            let first = source.frames.first().map(|f| Arc::new(restamp(f)));
            let (sender, frames) = tokio::sync::watch::channel(first);
            let sender = Arc::new(Mutex::new(Some(sender)));

            let pump = tokio::spawn(pump_frames(
                Arc::clone(&sender),
                source.frames.clone(),
                self.frame_interval,
            ));

            self.counters.opened.fetch_add(1, Ordering::SeqCst);

            Ok(OpenStream {
                frames,
                control: Box::new(VirtualStreamControl {
                    sender,
                    pump: Some(pump),
                    torch_supported: source.torch,
                    torch_on: false,
                    counters: Arc::clone(&self.counters),
                }),
            })
        }
        .boxed()
    }
}

type SharedSender = Arc<Mutex<Option<FrameSender>>>;

/// Frame with a fresh capture timestamp
fn restamp(frame: &CameraFrame) -> CameraFrame {
    CameraFrame {
        captured_at: Instant::now(),
        ..frame.clone()
    }
}

/// Replay frames until the sender is taken away
async fn pump_frames(sender: SharedSender, frames: Vec<Arc<CameraFrame>>, interval: Duration) {
    if frames.is_empty() {
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first frame was published when the stream opened
    ticker.tick().await;

    let mut index = 0usize;
    loop {
        ticker.tick().await;
        index = (index + 1) % frames.len();

        let guard = sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            break;
        };
        tx.send_replace(Some(Arc::new(restamp(&frames[index]))));
    }
}

struct VirtualStreamControl {
    sender: SharedSender,
    pump: Option<JoinHandle<()>>,
    torch_supported: bool,
    torch_on: bool,
    counters: Arc<Counters>,
}

impl StreamControl for VirtualStreamControl {
    fn torch_supported(&self) -> bool {
        self.torch_supported
    }

    fn set_torch(&mut self, on: bool) -> Result<(), TorchError> {
        if !self.torch_supported {
            return Err(TorchError::Unsupported);
        }
        self.torch_on = on;
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the sender closes the channel for every receiver
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        if sender.is_some() {
            self.torch_on = false;
            self.counters.stopped.fetch_add(1, Ordering::SeqCst);
            debug!("Virtual camera stream stopped");
        }
    }
}

impl Drop for VirtualStreamControl {
    fn drop(&mut self) {
        self.stop();
    }
}
