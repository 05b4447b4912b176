// SPDX-License-Identifier: GPL-3.0-only

//! Verification upload
//!
//! Sends the confirmation photo and its identifier to the checkpoint API.
//! Transport retries and session management belong to the API side; the
//! workflow only sees success or failure.

use crate::capture::CapturedImage;
use crate::constants::api;
use crate::errors::UploadError;
use crate::validator::Identifier;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadResult {
    Success,
    /// The reason is advisory; every failure is handled the same way
    Failure(UploadError),
}

impl UploadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadResult::Success)
    }
}

impl From<Result<(), UploadError>> for UploadResult {
    fn from(result: Result<(), UploadError>) -> Self {
        match result {
            Ok(()) => UploadResult::Success,
            Err(e) => UploadResult::Failure(e),
        }
    }
}

/// The verification API
pub trait VerificationApi: Send + Sync + 'static {
    fn verify<'a>(
        &'a self,
        identifier: &'a Identifier,
        image: &'a CapturedImage,
    ) -> BoxFuture<'a, Result<(), UploadError>>;
}

/// Uploads captures through a [`VerificationApi`]
#[derive(Clone)]
pub struct VerificationUploader {
    api: Arc<dyn VerificationApi>,
}

impl VerificationUploader {
    pub fn new(api: Arc<dyn VerificationApi>) -> Self {
        Self { api }
    }

    /// Upload one capture
    pub async fn upload(&self, identifier: &Identifier, image: &CapturedImage) -> UploadResult {
        info!(
            identifier = %identifier,
            capture = %image.id,
            bytes = image.data.len(),
            "Uploading verification photo"
        );

        let result = UploadResult::from(self.api.verify(identifier, image).await);
        match &result {
            UploadResult::Success => info!(identifier = %identifier, "Verification succeeded"),
            UploadResult::Failure(e) => {
                warn!(identifier = %identifier, error = %e, "Verification failed")
            }
        }
        result
    }
}

impl std::fmt::Debug for VerificationUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationUploader").finish_non_exhaustive()
    }
}

/// HTTP implementation of the verification API
///
/// `POST {base_url}/checkpost/verify` as multipart form data with the
/// identifier and the photo.
#[derive(Debug, Clone)]
pub struct HttpVerificationApi {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpVerificationApi {
    /// Create a client for `base_url`
    pub fn new(
        base_url: &str,
        auth_token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, UploadError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            endpoint: verify_endpoint(base_url),
            auth_token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, identifier: &Identifier, image: &CapturedImage) -> Result<(), UploadError> {
        let part = reqwest::multipart::Part::bytes(image.data.to_vec())
            .file_name(image.file_name(identifier))
            .mime_str(image.mime_type)?;
        let form = reqwest::multipart::Form::new()
            .text(api::IDENTIFIER_FIELD, identifier.to_string())
            .part(api::IMAGE_FIELD, part);

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        debug!(endpoint = %self.endpoint, "Sending verification request");
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read response body".to_string());
        Err(classify_status(status.as_u16(), message))
    }
}

impl VerificationApi for HttpVerificationApi {
    fn verify<'a>(
        &'a self,
        identifier: &'a Identifier,
        image: &'a CapturedImage,
    ) -> BoxFuture<'a, Result<(), UploadError>> {
        self.send(identifier, image).boxed()
    }
}

/// Join the base URL and the verification path
fn verify_endpoint(base_url: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), api::VERIFY_PATH)
}

/// Map a non-success status to an upload error
fn classify_status(status: u16, message: String) -> UploadError {
    match status {
        401 | 403 => UploadError::Unauthorized { status },
        408 | 504 => UploadError::Timeout,
        _ => UploadError::Rejected { status, message },
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One recorded call to [`ScriptedApi`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedCall {
        pub identifier: Identifier,
        pub image: CapturedImage,
    }

    /// Verification API answering from a script
    ///
    /// Each call pops the next outcome (success once the script runs dry).
    /// With a gate, calls wait until [`ScriptedApi::open_gate`].
    #[derive(Default)]
    pub struct ScriptedApi {
        outcomes: Mutex<VecDeque<Result<(), UploadError>>>,
        calls: Mutex<Vec<RecordedCall>>,
        gate: Option<tokio::sync::Semaphore>,
    }

    impl ScriptedApi {
        pub fn new(outcomes: impl IntoIterator<Item = Result<(), UploadError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                ..Default::default()
            }
        }

        pub fn gated(outcomes: impl IntoIterator<Item = Result<(), UploadError>>) -> Self {
            Self {
                gate: Some(tokio::sync::Semaphore::new(0)),
                ..Self::new(outcomes)
            }
        }

        /// Let one waiting call complete
        pub fn open_gate(&self) {
            if let Some(gate) = &self.gate {
                gate.add_permits(1);
            }
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl VerificationApi for ScriptedApi {
        fn verify<'a>(
            &'a self,
            identifier: &'a Identifier,
            image: &'a CapturedImage,
        ) -> BoxFuture<'a, Result<(), UploadError>> {
            async move {
                self.calls.lock().unwrap().push(RecordedCall {
                    identifier: identifier.clone(),
                    image: image.clone(),
                });
                if let Some(gate) = &self.gate {
                    gate.acquire().await.unwrap().forget();
                }
                self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()))
            }
            .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedApi;
    use super::*;
    use crate::backends::camera::types::CameraFrame;

    fn capture() -> (Identifier, CapturedImage) {
        let frame = CameraFrame::from_gray(4, 4, vec![90; 16]);
        let image = crate::capture::encode_jpeg(&frame, 80).unwrap();
        (crate::validator::validate("12-34-567").unwrap(), image)
    }

    #[test]
    fn test_verify_endpoint_joins_cleanly() {
        assert_eq!(
            verify_endpoint("http://localhost:3000/api/"),
            "http://localhost:3000/api/checkpost/verify"
        );
        assert_eq!(
            verify_endpoint("https://example.test/api"),
            "https://example.test/api/checkpost/verify"
        );
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(401, String::new()),
            UploadError::Unauthorized { status: 401 }
        );
        assert_eq!(
            classify_status(403, String::new()),
            UploadError::Unauthorized { status: 403 }
        );
        assert_eq!(classify_status(504, String::new()), UploadError::Timeout);
        assert_eq!(
            classify_status(422, "unknown vehicle".into()),
            UploadError::Rejected {
                status: 422,
                message: "unknown vehicle".into()
            }
        );
    }

    #[tokio::test]
    async fn test_uploader_collapses_errors_into_failure() {
        let api = Arc::new(ScriptedApi::new([Err(UploadError::Timeout), Ok(())]));
        let uploader = VerificationUploader::new(api.clone());
        let (id, image) = capture();

        assert_eq!(
            uploader.upload(&id, &image).await,
            UploadResult::Failure(UploadError::Timeout)
        );
        assert!(uploader.upload(&id, &image).await.is_success());

        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].image.data, image.data);
        assert_eq!(calls[1].identifier, id);
    }

    #[tokio::test]
    async fn test_http_api_reports_network_failure() {
        // Bind and drop a listener so the port is closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let api = HttpVerificationApi::new(
            &format!("http://{}/api", addr),
            Some("token".into()),
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        let (id, image) = capture();

        let err = api.verify(&id, &image).await.unwrap_err();
        assert!(
            matches!(err, UploadError::Network(_) | UploadError::Timeout),
            "unexpected error: {:?}",
            err
        );
    }
}
