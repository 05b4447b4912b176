// SPDX-License-Identifier: GPL-3.0-only

//! Code decoder
//!
//! Turns a live frame stream into a lazy sequence of decode attempts. Frames
//! are sampled at a bounded rate, cropped to the scan window and handed to a
//! [`SymbolDecoder`] on the blocking pool. Each attempt is independent.
//!
//! Per-frame failures (no symbol, blur, low light) come out as `Ok(None)`.
//! Only the camera stream closing ends the sequence with an error.

pub mod qr_detector;
pub mod types;

pub use qr_detector::QrDetector;
pub use types::{DecodedPayload, ScanWindow};

use crate::backends::camera::types::{CameraFrame, FrameReceiver};
use crate::backends::camera::CameraHandle;
use crate::constants::{MAX_DECODE_SAMPLE_RATE_HZ, MIN_DECODE_SAMPLE_RATE_HZ};
use crate::errors::DecodeError;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Black-box symbol decoder
///
/// Given one frame, yields the text of a symbol found in it.
pub trait SymbolDecoder: Send + Sync + 'static {
    fn decode(&self, frame: &CameraFrame) -> Option<DecodedPayload>;
}

/// Factory for decode streams
#[derive(Clone)]
pub struct CodeDecoder {
    decoder: Arc<dyn SymbolDecoder>,
    interval: Duration,
}

impl CodeDecoder {
    /// Create a decoder sampling at `sample_rate_hz` attempts per second
    pub fn new(decoder: Arc<dyn SymbolDecoder>, sample_rate_hz: f32) -> Self {
        let rate = if sample_rate_hz.is_finite() {
            sample_rate_hz.clamp(MIN_DECODE_SAMPLE_RATE_HZ, MAX_DECODE_SAMPLE_RATE_HZ)
        } else {
            crate::constants::DECODE_SAMPLE_RATE_HZ
        };
        Self {
            decoder,
            interval: Duration::from_nanos((1e9 / rate as f64).round() as u64),
        }
    }

    /// Time between two decode attempts
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start decoding frames from a camera handle
    ///
    /// The handle stays owned by the caller; stopping the stream never
    /// releases the camera.
    pub fn start(&self, handle: &CameraHandle, scan_window: Option<ScanWindow>) -> DecodeStream {
        debug!(handle = %handle.id(), ?scan_window, "Starting decoder");
        self.start_with_frames(handle.frames(), scan_window)
    }

    /// Start decoding frames from a raw frame receiver
    pub fn start_with_frames(
        &self,
        mut frames: FrameReceiver,
        scan_window: Option<ScanWindow>,
    ) -> DecodeStream {
        let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
        let decoder = Arc::clone(&self.decoder);
        let interval = self.interval;

        let attempts = async_stream::stream! {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.wait_for(|stopped| *stopped) => break,
                    _ = ticker.tick() => {}
                }

                if frames.has_changed().is_err() {
                    warn!("Camera stream closed under the decoder");
                    yield Err(DecodeError::SourceClosed);
                    break;
                }

                let Some(frame) = frames.borrow_and_update().clone() else {
                    yield Ok(None);
                    continue;
                };

                let decoder = Arc::clone(&decoder);
                let attempt = tokio::task::spawn_blocking(move || {
                    let region = qr_detector::crop_to_window(&frame, scan_window);
                    decoder.decode(&region)
                })
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Decode task panicked");
                    None
                });

                // Stopped while the attempt was running
                if *stop_rx.borrow() {
                    break;
                }

                trace!(found = attempt.is_some(), "Decode attempt");
                yield Ok(attempt);
            }
        };

        DecodeStream {
            attempts: attempts.boxed(),
            stopper: DecodeStopper(Arc::new(stop_tx)),
        }
    }

    /// Stop a stream. Equivalent to [`DecodeStream::stop`].
    pub fn stop(stream: &DecodeStream) {
        stream.stop();
    }
}

impl std::fmt::Debug for CodeDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeDecoder")
            .field("interval", &self.interval)
            .finish()
    }
}

/// Remote stop switch for a [`DecodeStream`]
#[derive(Clone, Debug)]
pub struct DecodeStopper(Arc<tokio::sync::watch::Sender<bool>>);

impl DecodeStopper {
    /// Stop the stream. Safe to call repeatedly.
    pub fn stop(&self) {
        if !self.0.send_replace(true) {
            debug!("Decoder stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }
}

/// Lazy, non-restartable sequence of decode attempts
///
/// Ends after [`DecodeStream::stop`] or when the camera stream closes.
pub struct DecodeStream {
    attempts: BoxStream<'static, Result<Option<DecodedPayload>, DecodeError>>,
    stopper: DecodeStopper,
}

impl DecodeStream {
    pub fn stop(&self) {
        self.stopper.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopper.is_stopped()
    }

    /// A handle that can stop this stream from elsewhere
    pub fn stopper(&self) -> DecodeStopper {
        self.stopper.clone()
    }
}

impl Stream for DecodeStream {
    type Item = Result<Option<DecodedPayload>, DecodeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().attempts.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for DecodeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeStream")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
