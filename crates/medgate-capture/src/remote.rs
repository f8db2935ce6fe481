//! HTTP adapter for the remote verification/training service.
//!
//! Captures travel base64-encoded inside JSON bodies. The adapter performs
//! no retries of its own; a retry is a state-machine decision because it
//! must re-arm the gate rather than resubmit the same image.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use medgate_core::config::EndpointConfig;
use medgate_core::{
    CaptureMode, OutcomeDiagnostics, SubjectContext, VerificationError, VerificationOutcome,
    VerificationPort,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// `reqwest`-backed [`VerificationPort`].
pub struct HttpVerificationPort {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    image: &'a str,
    subject_id: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    verified: bool,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: WireDetails,
}

#[derive(Deserialize, Default)]
struct WireDetails {
    #[serde(default)]
    per_layer_flags: Vec<bool>,
    #[serde(default)]
    method: String,
}

#[derive(Serialize)]
struct EnrollRequest<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct EnrollResponse {
    accepted: bool,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    message: String,
}

impl HttpVerificationPort {
    /// Builds the adapter with the endpoint's connect/request deadlines.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::Transport`] if the endpoint is not
    /// configured or the client cannot be constructed.
    pub fn new(config: &EndpointConfig) -> Result<Self, VerificationError> {
        if config.base_url.is_empty() {
            return Err(VerificationError::Transport(
                "endpoint base_url is not configured".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| VerificationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn verify_url(&self) -> String {
        format!("{}/verify", self.base_url)
    }

    fn enroll_url(&self, subject_id: &str) -> String {
        format!("{}/subjects/{}/enroll", self.base_url, subject_id)
    }

    async fn read_success<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, VerificationError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VerificationError::Service {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| VerificationError::Transport(format!("invalid response body: {e}")))
    }
}

impl From<VerifyResponse> for VerificationOutcome {
    fn from(response: VerifyResponse) -> Self {
        Self {
            verified: response.verified,
            confidence: response.confidence,
            message: response.message,
            diagnostics: OutcomeDiagnostics {
                layer_results: response.details.per_layer_flags,
                method: response.details.method,
            },
        }
    }
}

impl From<EnrollResponse> for VerificationOutcome {
    fn from(response: EnrollResponse) -> Self {
        // Enrollment acceptance needs no confidence score.
        Self {
            verified: response.accepted,
            confidence: response.confidence,
            message: response.message,
            diagnostics: OutcomeDiagnostics {
                layer_results: Vec::new(),
                method: "enrollment".to_string(),
            },
        }
    }
}

#[async_trait]
impl VerificationPort for HttpVerificationPort {
    async fn submit(
        &self,
        image: &[u8],
        context: &SubjectContext,
    ) -> Result<VerificationOutcome, VerificationError> {
        let encoded = BASE64.encode(image);
        debug!(
            mode = %context.mode,
            subject_id = %context.subject_id,
            encoded_len = encoded.len(),
            "dispatching capture to service"
        );
        match context.mode {
            CaptureMode::Verify => {
                let body = VerifyRequest {
                    image: &encoded,
                    subject_id: &context.subject_id,
                };
                let response = self
                    .client
                    .post(self.verify_url())
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| VerificationError::Transport(e.to_string()))?;
                let parsed: VerifyResponse = Self::read_success(response).await?;
                Ok(parsed.into())
            }
            CaptureMode::Enroll => {
                let body = EnrollRequest { image: &encoded };
                let response = self
                    .client
                    .post(self.enroll_url(&context.subject_id))
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| VerificationError::Transport(e.to_string()))?;
                let parsed: EnrollResponse = Self::read_success(response).await?;
                Ok(parsed.into())
            }
        }
    }
}
