//! AIClient - Posture Analysis Service Adapter
//!
//! ## Responsibilities
//!
//! - Send single-frame analysis requests (`POST /analyze-frame`)
//! - Parse the verdict
//! - Classify failures: server rejection / no response / client fault
//! - Liveness check of the service root

use crate::error::{Error, Result};
use crate::models::{AnalysisMode, AnalysisResult, InputBlob};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

/// Request timeout (30s)
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Classified analysis failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// Service answered with a non-2xx status
    #[error("{message}")]
    ServerRejected { status: u16, message: String },

    /// Network failure or timeout; nothing came back
    #[error("No response from server. Please check if the API is running.")]
    NoResponse,

    /// Local failure before or after the exchange
    #[error("{0}")]
    ClientSideFault(String),
}

impl AnalysisError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_builder() {
            AnalysisError::ClientSideFault(err.to_string())
        } else {
            AnalysisError::NoResponse
        }
    }
}

/// Anything that can analyze a payload
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(
        &self,
        payload: &InputBlob,
        mode: AnalysisMode,
    ) -> std::result::Result<AnalysisResult, AnalysisError>;
}

/// HTTP client for the posture analysis service
pub struct AiClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl AiClient {
    /// Create new AI client (30s timeout)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }

    /// Create new AI client with custom timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Check the service root answers
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Health check failed");
                false
            }
        }
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl AnalysisService for AiClient {
    async fn analyze(
        &self,
        payload: &InputBlob,
        mode: AnalysisMode,
    ) -> std::result::Result<AnalysisResult, AnalysisError> {
        let url = format!("{}/analyze-frame", self.base_url);

        let part = Part::bytes(payload.data.clone())
            .file_name(payload.name.clone())
            .mime_str(&payload.mime_type)
            .map_err(|e| AnalysisError::ClientSideFault(e.to_string()))?;

        let form = Form::new()
            .part("file", part)
            .text("posture_type", mode.as_str());

        tracing::info!(
            url = %url,
            file_name = %payload.name,
            size = payload.size(),
            mode = %mode,
            "Sending analysis request"
        );

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(AnalysisError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = server_message(status.as_u16(), &body);
            tracing::warn!(status = status.as_u16(), message = %message, "Analysis rejected");
            return Err(AnalysisError::ServerRejected {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.bytes().await.map_err(AnalysisError::from_reqwest)?;
        parse_analysis_body(&body)
    }
}

/// Pick the user-facing message out of an error body
fn server_message(status: u16, body: &str) -> String {
    let fallback = || format!("Server error ({})", status);

    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return fallback();
    };

    ["message", "detail", "error"]
        .iter()
        .filter_map(|key| json.get(*key))
        .find_map(|value| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .unwrap_or_else(fallback)
}

/// Decode a 2xx body into a verdict
fn parse_analysis_body(body: &[u8]) -> std::result::Result<AnalysisResult, AnalysisError> {
    let no_data = || AnalysisError::ClientSideFault("No analysis data received".to_string());

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(no_data());
    }

    let json: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| AnalysisError::ClientSideFault(format!("Invalid analysis response: {}", e)))?;

    if json.is_null() {
        return Err(no_data());
    }

    serde_json::from_value(json)
        .map_err(|e| AnalysisError::ClientSideFault(format!("Invalid analysis response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_precedence() {
        assert_eq!(
            server_message(400, r#"{"message": "m", "detail": "d"}"#),
            "m"
        );
        assert_eq!(
            server_message(400, r#"{"detail": "Invalid posture type. Use 'squat' or 'sitting'"}"#),
            "Invalid posture type. Use 'squat' or 'sitting'"
        );
        assert_eq!(
            server_message(400, r#"{"error": "No pose detected. Ensure a person is visible."}"#),
            "No pose detected. Ensure a person is visible."
        );
        assert_eq!(server_message(502, "<html>bad gateway</html>"), "Server error (502)");
        assert_eq!(server_message(500, r#"{"message": ""}"#), "Server error (500)");
    }

    #[test]
    fn test_server_message_structured_detail() {
        let msg = server_message(422, r#"{"detail": [{"loc": ["body", "file"]}]}"#);
        assert!(msg.contains("loc"));
    }

    #[test]
    fn test_parse_body() {
        let result = parse_analysis_body(br#"{"has_bad_posture": true, "issues": ["knee valgus"]}"#)
            .unwrap();
        assert!(result.has_bad_posture);
        assert_eq!(result.issues, vec!["knee valgus".to_string()]);
    }

    #[test]
    fn test_parse_body_empty_or_null() {
        let expected = AnalysisError::ClientSideFault("No analysis data received".to_string());
        assert_eq!(parse_analysis_body(b"").unwrap_err(), expected);
        assert_eq!(parse_analysis_body(b"null").unwrap_err(), expected);
    }

    #[test]
    fn test_parse_body_wrong_shape() {
        let err = parse_analysis_body(br#"{"issues": []}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::ClientSideFault(ref m) if m.starts_with("Invalid analysis response")));
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = AiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.timeout(), Duration::from_secs(30));
    }
}
