// SPDX-License-Identifier: GPL-3.0-only

//! Still capture for the confirmation photo
//!
//! A capture session owns the preview camera for one accepted identifier.
//! Taking a still freezes the latest preview frame after the shutter delay
//! and encodes it as JPEG on the blocking pool.

use crate::backends::camera::types::{CameraFrame, FrameReceiver};
use crate::backends::camera::CameraHandle;
use crate::constants::CAPTURE_MIME_TYPE;
use crate::errors::CaptureError;
use crate::validator::Identifier;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Identity of one capture
///
/// Two captures of the same scene are still different images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureId(uuid::Uuid);

impl CaptureId {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for CaptureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An encoded confirmation photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub id: CaptureId,
    pub data: Arc<[u8]>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

impl CapturedImage {
    /// Suggested upload file name
    pub fn file_name(&self, identifier: &Identifier) -> String {
        format!("{}.jpg", identifier)
    }
}

/// Still capture settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Flash effect duration before the frame is frozen
    pub shutter_delay: Duration,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            shutter_delay: crate::constants::SHUTTER_DELAY,
            jpeg_quality: crate::constants::CAPTURE_JPEG_QUALITY,
        }
    }
}

/// The preview camera for one identifier
#[derive(Debug)]
pub struct CaptureSession {
    handle: CameraHandle,
    identifier: Identifier,
    settings: CaptureSettings,
}

impl CaptureSession {
    pub fn new(handle: CameraHandle, identifier: Identifier, settings: CaptureSettings) -> Self {
        info!(identifier = %identifier, handle = %handle.id(), "Capture preview started");
        Self {
            handle,
            identifier,
            settings,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn handle(&self) -> &CameraHandle {
        &self.handle
    }

    /// Close the session and hand the camera back
    pub fn into_handle(self) -> CameraHandle {
        self.handle
    }

    /// Latest preview frame
    pub fn preview_frame(&self) -> Option<Arc<CameraFrame>> {
        self.handle.latest_frame()
    }

    /// Detached still capture that can run while the session keeps the camera
    pub fn shutter(&self) -> Shutter {
        Shutter {
            frames: self.handle.frames(),
            settings: self.settings,
        }
    }

    /// Take a still now
    pub async fn capture(&self) -> Result<CapturedImage, CaptureError> {
        self.shutter().fire().await
    }

    /// Release the preview camera
    pub fn release(self) {
        debug!(identifier = %self.identifier, "Capture preview closed");
        self.handle.release();
    }
}

/// A pending still capture
#[derive(Debug, Clone)]
pub struct Shutter {
    frames: FrameReceiver,
    settings: CaptureSettings,
}

impl Shutter {
    /// Wait the shutter delay, freeze the latest frame and encode it
    pub async fn fire(mut self) -> Result<CapturedImage, CaptureError> {
        tokio::time::sleep(self.settings.shutter_delay).await;

        if self.frames.has_changed().is_err() {
            return Err(CaptureError::Released);
        }

        let frame = self
            .frames
            .borrow_and_update()
            .clone()
            .ok_or(CaptureError::NoFrameAvailable)?;

        let quality = self.settings.jpeg_quality;
        let image = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality))
            .await
            .map_err(|e| CaptureError::EncodingFailed(format!("Encode task failed: {}", e)))??;

        info!(
            capture = %image.id,
            width = image.width,
            height = image.height,
            bytes = image.data.len(),
            "Captured still"
        );
        Ok(image)
    }
}

/// Encode a frame as JPEG
pub fn encode_jpeg(frame: &CameraFrame, quality: u8) -> Result<CapturedImage, CaptureError> {
    let (width, height) = (frame.width, frame.height);
    if width == 0 || height == 0 {
        return Err(CaptureError::NoFrameAvailable);
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            rgb.extend_from_slice(&frame.rgb(x, y));
        }
    }

    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, quality.clamp(1, 100))
        .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| {
            warn!(error = %e, "JPEG encoding failed");
            CaptureError::EncodingFailed(e.to_string())
        })?;

    Ok(CapturedImage {
        id: CaptureId::new(),
        data: Arc::from(data),
        mime_type: CAPTURE_MIME_TYPE,
        width,
        height,
        captured_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> CameraFrame {
        let mut data = Vec::new();
        for i in 0..(8 * 6) {
            data.extend_from_slice(&[(i * 5) as u8, 100, 200, 255]);
        }
        CameraFrame::from_rgba(8, 6, data)
    }

    #[test]
    fn test_encode_jpeg_produces_decodable_image() {
        let image = encode_jpeg(&frame(), 90).unwrap();

        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!((image.width, image.height), (8, 6));
        // JPEG SOI marker
        assert_eq!(&image.data[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&image.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }

    #[test]
    fn test_each_capture_has_its_own_identity() {
        let a = encode_jpeg(&frame(), 90).unwrap();
        let b = encode_jpeg(&frame(), 90).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_frame_cannot_be_encoded() {
        let empty = CameraFrame::from_gray(0, 0, Vec::new());
        assert_eq!(encode_jpeg(&empty, 90), Err(CaptureError::NoFrameAvailable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutter_waits_for_delay() {
        let (_tx, frames) = tokio::sync::watch::channel(Some(Arc::new(frame())));
        let shutter = Shutter {
            frames,
            settings: CaptureSettings {
                shutter_delay: Duration::from_millis(200),
                jpeg_quality: 80,
            },
        };

        let start = tokio::time::Instant::now();
        let image = shutter.fire().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(image.width, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutter_without_frame() {
        let (_tx, frames) = tokio::sync::watch::channel(None);
        let shutter = Shutter {
            frames,
            settings: CaptureSettings::default(),
        };
        assert_eq!(shutter.fire().await, Err(CaptureError::NoFrameAvailable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutter_on_released_camera() {
        let (tx, frames) = tokio::sync::watch::channel(Some(Arc::new(frame())));
        let shutter = Shutter {
            frames,
            settings: CaptureSettings::default(),
        };
        drop(tx);
        assert_eq!(shutter.fire().await, Err(CaptureError::Released));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_previews_and_captures() {
        use crate::backends::camera::CameraResource;
        use crate::backends::camera::types::{Facing, StreamConstraints, StreamPurpose};
        use crate::backends::virtual_camera::{VirtualCameraPlatform, VirtualDevice};

        let platform = Arc::new(
            VirtualCameraPlatform::builder()
                .device(VirtualDevice::new(
                    "cam0",
                    "Gate camera",
                    Facing::Environment,
                    vec![frame()],
                ))
                .build(),
        );
        let resource = CameraResource::new(platform.clone());
        let handle = resource
            .request_access(StreamConstraints {
                purpose: StreamPurpose::Still,
                facing: Facing::Environment,
                ideal_width: 8,
                ideal_height: 6,
            })
            .await
            .unwrap();

        let identifier = crate::validator::validate("12-34-567").unwrap();
        let session = CaptureSession::new(handle, identifier.clone(), CaptureSettings::default());
        assert_eq!(session.identifier(), &identifier);

        let preview = session.preview_frame().unwrap();
        assert_eq!((preview.width, preview.height), (8, 6));

        let image = session.capture().await.unwrap();
        assert_eq!((image.width, image.height), (8, 6));
        assert_eq!(image.mime_type, CAPTURE_MIME_TYPE);

        // The session keeps the camera until it is released
        assert_eq!(resource.stats().live(), 1);
        session.release();
        assert_eq!(resource.stats().live(), 0);
        assert_eq!(platform.stats().live(), 0);
    }

    #[test]
    fn test_file_name_uses_identifier() {
        let image = encode_jpeg(&frame(), 90).unwrap();
        let id = crate::validator::validate("12-34-567").unwrap();
        assert_eq!(image.file_name(&id), "12-34-567.jpg");
    }
}
