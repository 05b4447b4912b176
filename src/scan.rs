// SPDX-License-Identifier: GPL-3.0-only

//! Scan session
//!
//! Runs the code decoder over a camera handle until the first payload that
//! validates as an [`Identifier`], then stops decoding. The camera handle
//! stays with the session until it is taken back or dropped.

use crate::backends::camera::CameraHandle;
use crate::decoder::{CodeDecoder, DecodeStopper, DecodeStream, ScanWindow};
use crate::errors::DecodeError;
use crate::validator::{self, Identifier};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Consume decode attempts until one validates
///
/// Stops the stream on the first accepted identifier, so at most one is
/// ever produced per stream. Returns `None` if the stream was stopped
/// before anything was accepted.
pub async fn first_identifier(
    stream: &mut DecodeStream,
) -> Option<Result<Identifier, DecodeError>> {
    while let Some(attempt) = stream.next().await {
        match attempt {
            Ok(Some(text)) => match validator::validate(&text) {
                Some(identifier) => {
                    stream.stop();
                    info!(identifier = %identifier, "Accepted identifier");
                    return Some(Ok(identifier));
                }
                None => trace!(len = text.len(), "Ignoring payload with wrong format"),
            },
            Ok(None) => {}
            Err(e) => return Some(Err(e)),
        }
    }
    None
}

/// Stops the decoder when dropped
#[derive(Debug)]
struct StopOnDrop(DecodeStopper);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// An active scan: camera handle plus a background decode task
#[derive(Debug)]
pub struct ScanSession {
    handle: CameraHandle,
    stopper: StopOnDrop,
    task: JoinHandle<()>,
}

impl ScanSession {
    /// Start decoding on `handle`
    ///
    /// `report` is called at most once, with the first accepted identifier
    /// or with the error that ended the stream. It is not called when the
    /// session is stopped first.
    pub fn spawn<F>(
        handle: CameraHandle,
        decoder: &CodeDecoder,
        scan_window: Option<ScanWindow>,
        report: F,
    ) -> Self
    where
        F: FnOnce(Result<Identifier, DecodeError>) + Send + 'static,
    {
        let mut stream = decoder.start(&handle, scan_window);
        let stopper = stream.stopper();

        let task = tokio::spawn(async move {
            if let Some(outcome) = first_identifier(&mut stream).await {
                report(outcome);
            }
        });

        debug!(handle = %handle.id(), "Scan session started");

        Self {
            handle,
            stopper: StopOnDrop(stopper),
            task,
        }
    }

    pub fn handle(&self) -> &CameraHandle {
        &self.handle
    }

    /// Whether decoding has been stopped
    pub fn is_stopped(&self) -> bool {
        self.stopper.0.is_stopped()
    }

    /// Stop decoding; the camera stays acquired
    pub fn stop(&self) {
        self.stopper.0.stop();
    }

    /// Stop decoding and hand the camera back
    pub fn into_handle(self) -> CameraHandle {
        self.stopper.0.stop();
        self.task.abort();
        self.handle
    }

    /// Stop decoding and release the camera
    pub fn release(self) {
        let handle = self.into_handle();
        handle.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::*;
    use crate::backends::camera::CameraResource;
    use crate::backends::virtual_camera::{VirtualCameraPlatform, VirtualDevice};
    use crate::decoder::testing::ScriptedDecoder;
    use std::sync::Arc;

    async fn acquire() -> (CameraResource, CameraHandle) {
        let platform = Arc::new(
            VirtualCameraPlatform::builder()
                .device(VirtualDevice::solid("back", "Back", Facing::Environment))
                .build(),
        );
        let resource = CameraResource::new(platform);
        let handle = resource
            .request_access(StreamConstraints {
                purpose: StreamPurpose::Decode,
                facing: Facing::Environment,
                ideal_width: 640,
                ideal_height: 480,
            })
            .await
            .unwrap();
        (resource, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_match_wins() {
        let (_resource, handle) = acquire().await;
        let script = ScriptedDecoder::new([
            None,
            Some("not-an-id"),
            Some("99-99-999"),
            Some("11-11-111"),
        ]);
        let decoder = CodeDecoder::new(Arc::new(script), 10.0);

        let mut stream = decoder.start(&handle, None);
        let id = first_identifier(&mut stream).await.unwrap().unwrap();

        assert_eq!(id.as_str(), "99-99-999");
        assert!(stream.is_stopped());
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_reports_once_and_keeps_camera() {
        let (resource, handle) = acquire().await;
        let decoder = CodeDecoder::new(
            Arc::new(ScriptedDecoder::new([Some("12-34-567"), Some("76-54-321")])),
            10.0,
        );
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let session = ScanSession::spawn(handle, &decoder, None, move |outcome| {
            let _ = tx.send(outcome);
        });

        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.unwrap().as_str(), "12-34-567");
        // The report closure is consumed, so the channel closes
        assert!(rx.recv().await.is_none());

        assert!(session.is_stopped());
        assert!(!session.handle().is_released());
        assert_eq!(resource.stats().live(), 1);

        session.release();
        assert_eq!(resource.stats().live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_reports_camera_loss() {
        let (_resource, handle) = acquire().await;
        let decoder = CodeDecoder::new(Arc::new(ScriptedDecoder::default()), 10.0);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let session = ScanSession::spawn(handle, &decoder, None, move |outcome| {
            let _ = tx.send(outcome);
        });

        // Simulate the platform revoking the stream underneath the decoder
        session.handle().release();

        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome, Err(DecodeError::SourceClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_session_never_reports() {
        let (_resource, handle) = acquire().await;
        let decoder = CodeDecoder::new(Arc::new(ScriptedDecoder::default()), 10.0);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Result<Identifier, DecodeError>>();

        let session = ScanSession::spawn(handle, &decoder, None, move |outcome| {
            let _ = tx.send(outcome);
        });
        let handle = session.into_handle();

        assert!(rx.recv().await.is_none());
        assert!(!handle.is_released());
    }
}
