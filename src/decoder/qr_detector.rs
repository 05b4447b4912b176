// SPDX-License-Identifier: GPL-3.0-only

//! QR code detection using the rqrr crate
//!
//! Frames are reduced to luma, optionally downscaled, and searched for QR
//! grids. The first grid that decodes wins.

use super::SymbolDecoder;
use super::types::{DecodedPayload, ScanWindow};
use crate::backends::camera::types::CameraFrame;
use std::sync::Arc;
use tracing::{debug, trace};

/// QR code detector
///
/// Optimized for real-time processing with frame downscaling.
#[derive(Debug, Clone)]
pub struct QrDetector {
    /// Maximum dimension for processing (frames are downscaled to this)
    max_dimension: u32,
}

impl Default for QrDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl QrDetector {
    /// Create a new QR detector with default settings
    pub fn new() -> Self {
        Self {
            // Codes held up to a checkpoint camera are large enough at 640px
            max_dimension: 640,
        }
    }

    /// Create a QR detector with custom max dimension
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }
}

impl SymbolDecoder for QrDetector {
    fn decode(&self, frame: &CameraFrame) -> Option<DecodedPayload> {
        let start = std::time::Instant::now();

        let (width, height) = (frame.width, frame.height);
        if width == 0 || height == 0 {
            return None;
        }

        let scale = (width as f32 / self.max_dimension as f32)
            .max(height as f32 / self.max_dimension as f32)
            .max(1.0);
        let proc_width = ((width as f32 / scale) as usize).max(1);
        let proc_height = ((height as f32 / scale) as usize).max(1);

        // Nearest-neighbour sampling while filling the luma plane
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            proc_width,
            proc_height,
            |x, y| {
                let src_x = ((x as f32 * scale) as u32).min(width - 1);
                let src_y = ((y as f32 * scale) as u32).min(height - 1);
                frame.luma(src_x, src_y)
            },
        );

        let grids = prepared.detect_grids();
        trace!(
            proc_width,
            proc_height,
            scale,
            grids = grids.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "QR grid detection complete"
        );

        for grid in grids {
            match grid.decode() {
                Ok((_meta, content)) => {
                    debug!(content = %content, "Decoded QR code");
                    return Some(content);
                }
                Err(e) => trace!(error = ?e, "Failed to decode QR grid"),
            }
        }

        None
    }
}

/// Copy the scan window out of a frame, without stride padding
///
/// Returns the frame unchanged when there is no window or the window covers
/// the whole frame.
pub fn crop_to_window(frame: &Arc<CameraFrame>, window: Option<ScanWindow>) -> Arc<CameraFrame> {
    let Some(window) = window else {
        return Arc::clone(frame);
    };

    let (x, y, width, height) = window.region(frame.width, frame.height);
    if (x, y, width, height) == (0, 0, frame.width, frame.height) {
        return Arc::clone(frame);
    }

    let bpp = frame.format.bytes_per_pixel();
    let stride = frame.stride as usize;
    let row_len = width as usize * bpp;
    let mut data = Vec::with_capacity(row_len * height as usize);

    for row in y..y + height {
        let row_start = row as usize * stride + x as usize * bpp;
        let row_end = row_start + row_len;
        if let Some(bytes) = frame.data.get(row_start..row_end) {
            data.extend_from_slice(bytes);
        }
    }

    Arc::new(CameraFrame {
        width,
        height,
        data: Arc::from(data),
        format: frame.format,
        stride: row_len as u32,
        captured_at: frame.captured_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::PixelFormat;
    use qrcode::{Color, QrCode};

    /// Gray frame with `text` as a QR code about `size` pixels across, centred
    fn frame_with_code(text: &str, frame_width: u32, frame_height: u32, size: u32) -> CameraFrame {
        let code = QrCode::new(text.as_bytes()).unwrap();
        let modules = code.width() as u32;
        let colors = code.to_colors();
        let module = (size / modules).max(1);
        let side = module * modules;
        let left = (frame_width - side) / 2;
        let top = (frame_height - side) / 2;

        let mut data = vec![255u8; (frame_width * frame_height) as usize];
        for y in 0..side {
            for x in 0..side {
                if colors[((y / module) * modules + x / module) as usize] == Color::Dark {
                    data[((top + y) * frame_width + left + x) as usize] = 0;
                }
            }
        }
        CameraFrame::from_gray(frame_width, frame_height, data)
    }

    /// RGBA copy of a gray frame with `padding` bytes after every row
    fn padded_rgba(gray: &CameraFrame, padding: u32) -> CameraFrame {
        let stride = gray.width * 4 + padding;
        let mut data = vec![0u8; (stride * gray.height) as usize];
        for y in 0..gray.height {
            for x in 0..gray.width {
                let v = gray.luma(x, y);
                let offset = (y * stride + x * 4) as usize;
                data[offset..offset + 4].copy_from_slice(&[v, v, v, 255]);
            }
        }
        CameraFrame {
            width: gray.width,
            height: gray.height,
            data: Arc::from(data),
            format: PixelFormat::RGBA,
            stride,
            captured_at: std::time::Instant::now(),
        }
    }

    #[test]
    fn test_crop_removes_stride_padding() {
        // 3x3 gray frame with 1 byte of padding per row
        let data: Vec<u8> = vec![
            1, 2, 3, 0, //
            4, 5, 6, 0, //
            7, 8, 9, 0, //
        ];
        let frame = Arc::new(CameraFrame {
            width: 3,
            height: 3,
            data: Arc::from(data.as_slice()),
            format: PixelFormat::Gray8,
            stride: 4,
            captured_at: std::time::Instant::now(),
        });

        let cropped = crop_to_window(&frame, Some(ScanWindow::square(1)));
        assert_eq!((cropped.width, cropped.height), (1, 1));
        assert_eq!(&cropped.data[..], &[5]);

        let row = ScanWindow {
            width: 3,
            height: 1,
            viewfinder_width: None,
        };
        let cropped = crop_to_window(&frame, Some(row));
        assert_eq!(&cropped.data[..], &[4, 5, 6]);
        assert_eq!(cropped.stride, 3);
    }

    #[test]
    fn test_crop_without_window_is_identity() {
        let frame = Arc::new(CameraFrame::from_gray(2, 2, vec![1, 2, 3, 4]));
        let cropped = crop_to_window(&frame, None);
        assert!(Arc::ptr_eq(&frame, &cropped));

        let cropped = crop_to_window(&frame, Some(ScanWindow::square(500)));
        assert!(Arc::ptr_eq(&frame, &cropped));
    }

    #[test]
    fn test_decodes_identifier() {
        let frame = frame_with_code("12-34-567", 320, 240, 168);
        assert_eq!(
            QrDetector::new().decode(&frame).as_deref(),
            Some("12-34-567")
        );
    }

    #[test]
    fn test_decodes_downscaled_frame() {
        // 1920 wide is processed at 640, a third of the size
        let frame = frame_with_code("98-76-543", 1920, 1080, 504);
        assert_eq!(
            QrDetector::new().decode(&frame).as_deref(),
            Some("98-76-543")
        );
    }

    #[test]
    fn test_large_code_decodes_inside_viewfinder_window() {
        let frame = Arc::new(padded_rgba(
            &frame_with_code("12-34-567", 1280, 720, 462),
            32,
        ));
        let detector = QrDetector::new();

        let window = ScanWindow::in_viewfinder(250, 250, 500);
        let cropped = crop_to_window(&frame, Some(window));
        assert_eq!((cropped.width, cropped.height), (640, 640));
        assert_eq!(cropped.stride, 640 * 4);
        assert_eq!(detector.decode(&cropped).as_deref(), Some("12-34-567"));

        // A box of 250 frame pixels cuts through the same code
        let cropped = crop_to_window(&frame, Some(ScanWindow::square(250)));
        assert_eq!(detector.decode(&cropped), None);
    }

    #[test]
    fn test_blank_frame_has_no_symbol() {
        let frame = CameraFrame::from_gray(120, 80, vec![255; 120 * 80]);
        assert_eq!(QrDetector::new().decode(&frame), None);
    }

    #[test]
    fn test_empty_frame_has_no_symbol() {
        let frame = CameraFrame::from_gray(0, 0, Vec::new());
        assert_eq!(QrDetector::with_max_dimension(0).decode(&frame), None);
    }
}
