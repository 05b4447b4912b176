// SPDX-License-Identifier: GPL-3.0-only

//! Core types for symbol decoding

use serde::{Deserialize, Serialize};

/// Raw text decoded from one frame
///
/// Exists only while it is being validated; never stored.
pub type DecodedPayload = String;

/// Region of interest, a box centred in the frame
///
/// With a `viewfinder_width` the box is sized against a viewfinder of that
/// width and scales with the frame, so it keeps the same share of the
/// picture at any stream resolution. Without one the sizes are frame
/// pixels. Either way the box is clamped to the frame on use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub width: u32,
    pub height: u32,
    pub viewfinder_width: Option<u32>,
}

impl ScanWindow {
    /// Square box of `size` frame pixels
    pub fn square(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            viewfinder_width: None,
        }
    }

    /// Box sized against a viewfinder `viewfinder_width` wide
    pub fn in_viewfinder(width: u32, height: u32, viewfinder_width: u32) -> Self {
        Self {
            width,
            height,
            viewfinder_width: Some(viewfinder_width),
        }
    }

    /// Pixel rectangle `(x, y, width, height)` for a frame of the given size
    pub fn region(&self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        let (width, height) = match self.viewfinder_width {
            Some(viewfinder) if viewfinder > 0 => {
                let scale = frame_width as f64 / viewfinder as f64;
                (
                    (self.width as f64 * scale).round() as u32,
                    (self.height as f64 * scale).round() as u32,
                )
            }
            _ => (self.width, self.height),
        };
        let width = width.min(frame_width);
        let height = height.min(frame_height);
        let x = (frame_width - width) / 2;
        let y = (frame_height - height) / 2;
        (x, y, width, height)
    }
}
