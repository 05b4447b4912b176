// SPDX-License-Identifier: GPL-3.0-only

//! Exclusive, revocable access to a physical camera
//!
//! The resource provides:
//! - Permission negotiation and device enumeration
//! - At most one live [`CameraHandle`] at a time
//! - Release on every exit path (handles release themselves on drop)
//! - Acquire/release accounting

use super::types::*;
use super::{CameraPlatform, StreamControl};
use crate::errors::{PermissionError, TorchError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Identity of one acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Acquire/release counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceStats {
    /// Handles successfully acquired
    pub acquired: usize,
    /// Handles released (each handle counts once)
    pub released: usize,
}

impl ResourceStats {
    /// Handles currently holding the hardware
    pub fn live(&self) -> usize {
        self.acquired - self.released
    }
}

/// Internal resource state
#[derive(Default)]
struct ResourceState {
    permission: CameraPermissionState,
    /// Devices listed by the last grant
    devices: Vec<CameraDevice>,
    granted_once: bool,
    preferred_device: Option<DeviceId>,
    /// The only live handle, released before any new acquisition
    active: Option<Arc<HandleSlot>>,
    stats: ResourceStats,
}

struct Shared {
    platform: Arc<dyn CameraPlatform>,
    state: Mutex<ResourceState>,
    /// Serializes acquisitions so two opens never overlap
    acquire_lock: tokio::sync::Mutex<()>,
    next_handle: AtomicU64,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ResourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop the slot's stream and account for it. Returns false if it was
    /// already released.
    fn release_slot(&self, slot: &HandleSlot) -> bool {
        if !slot.stop() {
            return false;
        }

        let mut state = self.state();
        state.stats.released += 1;
        if state.active.as_ref().is_some_and(|a| a.id == slot.id) {
            state.active = None;
        }

        info!(handle = %slot.id, device = %slot.device.label, "Released camera");
        true
    }
}

/// One opened stream
struct HandleSlot {
    id: HandleId,
    device: CameraDevice,
    constraints: StreamConstraints,
    frames: FrameReceiver,
    control: Mutex<Option<Box<dyn StreamControl>>>,
    torch_on: AtomicBool,
}

impl HandleSlot {
    fn control(&self) -> MutexGuard<'_, Option<Box<dyn StreamControl>>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self) -> bool {
        match self.control().take() {
            Some(mut control) => {
                control.stop();
                true
            }
            None => false,
        }
    }
}

/// Camera resource
///
/// Cheap to clone; all clones share the same hardware and accounting.
#[derive(Clone)]
pub struct CameraResource {
    shared: Arc<Shared>,
}

impl CameraResource {
    /// Create a resource over a platform
    pub fn new(platform: Arc<dyn CameraPlatform>) -> Self {
        Self {
            shared: Arc::new(Shared {
                platform,
                state: Mutex::new(ResourceState::default()),
                acquire_lock: tokio::sync::Mutex::new(()),
                next_handle: AtomicU64::new(1),
            }),
        }
    }

    /// Current permission negotiation state
    pub fn permission_state(&self) -> CameraPermissionState {
        self.shared.state().permission
    }

    /// Acquire/release counters
    pub fn stats(&self) -> ResourceStats {
        self.shared.state().stats
    }

    /// Device the next acquisition prefers
    pub fn preferred_device(&self) -> Option<DeviceId> {
        self.shared.state().preferred_device.clone()
    }

    /// Set the device the next acquisition prefers
    pub fn set_preferred_device(&self, device: Option<DeviceId>) {
        self.shared.state().preferred_device = device;
    }

    /// Request camera access and open a stream
    ///
    /// Any live handle is released first. Permission state is reset and
    /// renegotiated on every call.
    ///
    /// # Returns
    /// * `Ok(CameraHandle)` - Bound to one physical device
    /// * `Err(PermissionError::Unsupported)` - No camera API on this platform
    /// * `Err(PermissionError::Denied)` - The prompt was refused
    /// * `Err(PermissionError::Unavailable)` - No device, or it failed to open
    pub async fn request_access(
        &self,
        constraints: StreamConstraints,
    ) -> Result<CameraHandle, PermissionError> {
        let _guard = self.shared.acquire_lock.lock().await;
        self.release_active();

        self.set_permission(CameraPermissionState::Unknown);

        if !self.shared.platform.is_supported() {
            self.set_permission(CameraPermissionState::Unsupported);
            warn!("Camera API not supported on this platform");
            return Err(PermissionError::Unsupported);
        }

        self.set_permission(CameraPermissionState::Requesting);
        debug!("Requesting camera permission");

        match self.shared.platform.request_permission().await {
            PermissionDecision::Granted => {}
            PermissionDecision::Denied => {
                self.set_permission(CameraPermissionState::Denied);
                warn!("Camera permission denied");
                return Err(PermissionError::Denied);
            }
        }

        let devices = self.shared.platform.enumerate_devices().await;
        let device = {
            let mut state = self.shared.state();
            state.permission = CameraPermissionState::Granted;
            state.granted_once = true;
            state.devices = devices;
            select_device(
                &state.devices,
                state.preferred_device.as_ref(),
                constraints.facing,
            )
        };

        let Some(device) = device else {
            warn!("No camera devices found");
            return Err(PermissionError::Unavailable);
        };

        self.open(device, constraints).await
    }

    /// Devices listed by the last grant
    ///
    /// Before any grant this asks the platform directly, and labels may be
    /// empty.
    pub async fn enumerate_devices(&self) -> Vec<CameraDevice> {
        {
            let state = self.shared.state();
            if state.granted_once {
                return state.devices.clone();
            }
        }
        self.shared.platform.enumerate_devices().await
    }

    /// Release `current` and acquire `device_id` with the same constraints
    ///
    /// The old stream is stopped before this returns, so no frame from the
    /// old device is delivered afterwards.
    pub async fn switch_to(
        &self,
        current: CameraHandle,
        device_id: &DeviceId,
    ) -> Result<CameraHandle, PermissionError> {
        let _guard = self.shared.acquire_lock.lock().await;

        let constraints = current.slot.constraints.clone();
        info!(from = %current.device().id, to = %device_id, "Switching camera");
        drop(current);
        self.release_active();

        let device = {
            let mut state = self.shared.state();
            state.preferred_device = Some(device_id.clone());
            state.devices.iter().find(|d| &d.id == device_id).cloned()
        };

        let Some(device) = device else {
            warn!(device = %device_id, "Requested camera is not in the device list");
            return Err(PermissionError::Unavailable);
        };

        self.open(device, constraints).await
    }

    /// Switch the torch of a handle
    pub fn set_torch(&self, handle: &CameraHandle, on: bool) -> Result<(), TorchError> {
        handle.set_torch(on)
    }

    /// Release a handle
    pub fn release(&self, handle: CameraHandle) {
        handle.release();
    }

    fn set_permission(&self, permission: CameraPermissionState) {
        self.shared.state().permission = permission;
    }

    fn release_active(&self) {
        let active = self.shared.state().active.take();
        if let Some(slot) = active {
            debug!(handle = %slot.id, "Releasing previous camera before acquiring");
            self.shared.release_slot(&slot);
        }
    }

    async fn open(
        &self,
        device: CameraDevice,
        constraints: StreamConstraints,
    ) -> Result<CameraHandle, PermissionError> {
        let stream = match self
            .shared
            .platform
            .open_stream(&device, &constraints)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                warn!(device = %device.label, error = %e, "Failed to open camera");
                if e == PlatformError::PermissionDenied {
                    self.set_permission(CameraPermissionState::Denied);
                }
                return Err(e.into());
            }
        };

        let id = HandleId(self.shared.next_handle.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(HandleSlot {
            id,
            device,
            constraints,
            frames: stream.frames,
            control: Mutex::new(Some(stream.control)),
            torch_on: AtomicBool::new(false),
        });

        {
            let mut state = self.shared.state();
            state.stats.acquired += 1;
            state.active = Some(Arc::clone(&slot));
        }

        info!(
            handle = %id,
            device = %slot.device.label,
            constraints = %slot.constraints,
            "Acquired camera"
        );

        Ok(CameraHandle {
            slot,
            shared: Arc::clone(&self.shared),
        })
    }
}

impl std::fmt::Debug for CameraResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("CameraResource")
            .field("permission", &state.permission)
            .field("devices", &state.devices.len())
            .field("stats", &state.stats)
            .finish()
    }
}

/// Pick the preferred device, else the first with the wanted facing, else the first
fn select_device(
    devices: &[CameraDevice],
    preferred: Option<&DeviceId>,
    facing: Facing,
) -> Option<CameraDevice> {
    preferred
        .and_then(|id| devices.iter().find(|d| &d.id == id))
        .or_else(|| devices.iter().find(|d| d.facing == facing))
        .or_else(|| devices.first())
        .cloned()
}

/// A live camera stream bound to one physical device
///
/// Releases the hardware when dropped; [`CameraHandle::release`] does the
/// same eagerly and is idempotent.
pub struct CameraHandle {
    slot: Arc<HandleSlot>,
    shared: Arc<Shared>,
}

impl CameraHandle {
    pub fn id(&self) -> HandleId {
        self.slot.id
    }

    pub fn device(&self) -> &CameraDevice {
        &self.slot.device
    }

    pub fn constraints(&self) -> &StreamConstraints {
        &self.slot.constraints
    }

    /// A receiver of the latest frame
    pub fn frames(&self) -> FrameReceiver {
        self.slot.frames.clone()
    }

    /// The latest frame, if any arrived yet
    pub fn latest_frame(&self) -> Option<Arc<CameraFrame>> {
        self.slot.frames.borrow().clone()
    }

    pub fn is_released(&self) -> bool {
        self.slot.control().is_none()
    }

    pub fn torch_supported(&self) -> bool {
        self.slot
            .control()
            .as_ref()
            .is_some_and(|c| c.torch_supported())
    }

    pub fn torch_on(&self) -> bool {
        self.slot.torch_on.load(Ordering::Relaxed)
    }

    /// Switch the torch on or off
    pub fn set_torch(&self, on: bool) -> Result<(), TorchError> {
        let mut control = self.slot.control();
        let control = control.as_mut().ok_or(TorchError::NotActive)?;
        if !control.torch_supported() {
            return Err(TorchError::Unsupported);
        }
        control.set_torch(on)?;
        self.slot.torch_on.store(on, Ordering::Relaxed);
        debug!(handle = %self.slot.id, on, "Torch changed");
        Ok(())
    }

    /// Stop the stream. Safe to call repeatedly.
    pub fn release(&self) {
        self.shared.release_slot(&self.slot);
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraHandle")
            .field("id", &self.slot.id)
            .field("device", &self.slot.device.id)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_camera::{VirtualCameraPlatform, VirtualDevice};

    fn constraints() -> StreamConstraints {
        StreamConstraints {
            purpose: StreamPurpose::Decode,
            facing: Facing::Environment,
            ideal_width: 640,
            ideal_height: 480,
        }
    }

    fn two_camera_platform() -> Arc<VirtualCameraPlatform> {
        Arc::new(
            VirtualCameraPlatform::builder()
                .device(VirtualDevice::solid("front", "Front", Facing::User))
                .device(
                    VirtualDevice::solid("back", "Back", Facing::Environment).with_torch(true),
                )
                .build(),
        )
    }

    #[test]
    fn test_select_device_prefers_id_then_facing() {
        let devices = vec![
            CameraDevice {
                id: DeviceId::new("a"),
                label: "A".into(),
                facing: Facing::User,
            },
            CameraDevice {
                id: DeviceId::new("b"),
                label: "B".into(),
                facing: Facing::Environment,
            },
        ];

        let by_facing = select_device(&devices, None, Facing::Environment).unwrap();
        assert_eq!(by_facing.id, DeviceId::new("b"));

        let by_id = select_device(&devices, Some(&DeviceId::new("a")), Facing::Environment);
        assert_eq!(by_id.unwrap().id, DeviceId::new("a"));

        let fallback = select_device(&devices, Some(&DeviceId::new("zzz")), Facing::Unknown);
        assert_eq!(fallback.unwrap().id, DeviceId::new("a"));

        assert!(select_device(&[], None, Facing::Environment).is_none());
    }

    #[tokio::test]
    async fn test_request_access_picks_environment_camera() {
        let resource = CameraResource::new(two_camera_platform());
        assert_eq!(resource.permission_state(), CameraPermissionState::Unknown);

        let handle = resource.request_access(constraints()).await.unwrap();
        assert_eq!(handle.device().id, DeviceId::new("back"));
        assert_eq!(resource.permission_state(), CameraPermissionState::Granted);
        assert_eq!(resource.stats().live(), 1);

        resource.release(handle);
        assert_eq!(resource.stats(), ResourceStats { acquired: 1, released: 1 });
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let platform = Arc::new(VirtualCameraPlatform::builder().unsupported().build());
        let resource = CameraResource::new(platform);

        let err = resource.request_access(constraints()).await.unwrap_err();
        assert_eq!(err, PermissionError::Unsupported);
        assert_eq!(resource.permission_state(), CameraPermissionState::Unsupported);
        assert_eq!(resource.stats().acquired, 0);
    }

    #[tokio::test]
    async fn test_denied_permission() {
        let platform = Arc::new(
            VirtualCameraPlatform::builder()
                .device(VirtualDevice::solid("back", "Back", Facing::Environment))
                .deny_permission()
                .build(),
        );
        let resource = CameraResource::new(platform);

        let err = resource.request_access(constraints()).await.unwrap_err();
        assert_eq!(err, PermissionError::Denied);
        assert_eq!(resource.permission_state(), CameraPermissionState::Denied);
    }

    #[tokio::test]
    async fn test_no_devices_is_unavailable() {
        let platform = Arc::new(VirtualCameraPlatform::builder().build());
        let resource = CameraResource::new(platform);

        let err = resource.request_access(constraints()).await.unwrap_err();
        assert_eq!(err, PermissionError::Unavailable);
    }

    #[tokio::test]
    async fn test_acquire_releases_previous_handle() {
        let platform = two_camera_platform();
        let resource = CameraResource::new(platform.clone());

        let first = resource.request_access(constraints()).await.unwrap();
        let second = resource.request_access(constraints()).await.unwrap();

        assert!(first.is_released());
        assert!(!second.is_released());
        assert_eq!(platform.stats().live(), 1);

        // Dropping an already released handle does not double count
        drop(first);
        drop(second);
        assert_eq!(resource.stats(), ResourceStats { acquired: 2, released: 2 });
        assert_eq!(platform.stats().live(), 0);
    }

    #[tokio::test]
    async fn test_switch_to_releases_old_stream() {
        let platform = two_camera_platform();
        let resource = CameraResource::new(platform.clone());

        let handle = resource.request_access(constraints()).await.unwrap();
        let old_frames = handle.frames();

        let handle = resource
            .switch_to(handle, &DeviceId::new("front"))
            .await
            .unwrap();

        assert_eq!(handle.device().id, DeviceId::new("front"));
        assert_eq!(resource.preferred_device(), Some(DeviceId::new("front")));
        assert!(old_frames.has_changed().is_err(), "old stream must be closed");
        assert_eq!(platform.stats().live(), 1);
    }

    #[tokio::test]
    async fn test_switch_to_unknown_device() {
        let resource = CameraResource::new(two_camera_platform());
        let handle = resource.request_access(constraints()).await.unwrap();

        let err = resource
            .switch_to(handle, &DeviceId::new("missing"))
            .await
            .unwrap_err();
        assert_eq!(err, PermissionError::Unavailable);
        assert_eq!(resource.stats().live(), 0);
    }

    #[tokio::test]
    async fn test_torch() {
        let resource = CameraResource::new(two_camera_platform());

        let back = resource.request_access(constraints()).await.unwrap();
        resource.set_torch(&back, true).unwrap();
        assert!(back.torch_on());

        let front = resource
            .switch_to(back, &DeviceId::new("front"))
            .await
            .unwrap();
        assert_eq!(front.set_torch(true), Err(TorchError::Unsupported));

        front.release();
        assert_eq!(front.set_torch(false), Err(TorchError::NotActive));
    }

    #[tokio::test]
    async fn test_enumerate_after_grant_uses_cached_list() {
        let resource = CameraResource::new(two_camera_platform());
        let _handle = resource.request_access(constraints()).await.unwrap();

        let devices = resource.enumerate_devices().await;
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|d| !d.label.is_empty()));
    }
}
