//! HTTP client for the analysis service.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::analysis::ImageAsset;
use crate::error::ClientError;

pub const ANALYZE_PATH: &str = "/api/recycle";
pub const SYNTHESIZE_PATH: &str = "/api/generate-audio";

/// Successful analysis payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub result: String,
    /// Base64 audio some service versions attach to the analysis response
    pub inline_audio: Option<String>,
}

/// `/api/recycle` response body. Older service versions send `error: null`
/// next to a successful result.
#[derive(Debug, Default, Deserialize)]
struct RecycleResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// `/api/generate-audio` response body
#[derive(Debug, Default, Deserialize)]
struct GenerateAudioResponse {
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateAudioRequest<'a> {
    text: &'a str,
}

/// Client for one service instance. One attempt per call, no retries.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Client,
    base_url: String,
}

impl ServiceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Submit an image for analysis.
    pub async fn analyze(&self, image: &ImageAsset) -> Result<AnalysisOutcome, ClientError> {
        log::info!(
            "Submitting {} for analysis ({} bytes)",
            image.file_name(),
            image.bytes().len()
        );

        let part = Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name().to_string())
            .mime_str(image.mime_type())
            .map_err(|e| ClientError::InvalidInput(format!("Invalid image type: {}", e)))?;

        let form = Form::new().part("image", part);

        let response = self
            .http
            .post(self.url(ANALYZE_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        interpret_analysis(status, &body)
    }

    /// Synthesize speech for `text`. Returns the base64 audio payload.
    pub async fn synthesize(&self, text: &str) -> Result<String, ClientError> {
        log::info!("Requesting speech synthesis ({} chars)", text.len());

        let response = self
            .http
            .post(self.url(SYNTHESIZE_PATH))
            .json(&GenerateAudioRequest { text })
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        interpret_synthesis(status, &body)
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Body that did not parse as the expected JSON shape.
fn unreadable(status: u16, body: &str, err: serde_json::Error) -> ClientError {
    if is_success(status) {
        ClientError::Transport(format!("Failed to parse response: {}", err))
    } else {
        let snippet: String = body.trim().chars().take(200).collect();
        ClientError::Transport(format!("HTTP {}: {}", status, snippet))
    }
}

/// Map an `/api/recycle` response to an outcome.
///
/// An `error` field wins regardless of status; a non-success status without
/// one is a transport failure; a success without a result is treated the same.
fn interpret_analysis(status: u16, body: &str) -> Result<AnalysisOutcome, ClientError> {
    let parsed: RecycleResponse =
        serde_json::from_str(body).map_err(|e| unreadable(status, body, e))?;

    if let Some(error) = non_empty(parsed.error) {
        log::warn!("Analysis service error ({}): {}", status, error);
        return Err(ClientError::Remote(error));
    }

    if !is_success(status) {
        return Err(ClientError::Transport(format!("HTTP {}", status)));
    }

    match non_empty(parsed.result) {
        Some(result) => Ok(AnalysisOutcome {
            result,
            inline_audio: non_empty(parsed.audio),
        }),
        None => Err(ClientError::Transport(
            "Response did not include a result".to_string(),
        )),
    }
}

/// Map an `/api/generate-audio` response to a base64 payload.
fn interpret_synthesis(status: u16, body: &str) -> Result<String, ClientError> {
    let parsed: GenerateAudioResponse =
        serde_json::from_str(body).map_err(|e| unreadable(status, body, e))?;

    if let Some(error) = non_empty(parsed.error) {
        log::warn!("Synthesis service error ({}): {}", status, error);
        return Err(ClientError::Remote(error));
    }

    if !is_success(status) {
        return Err(ClientError::Transport(format!("HTTP {}", status)));
    }

    non_empty(parsed.audio)
        .ok_or_else(|| ClientError::Transport("Response did not include audio".to_string()))
}
