//! OCR over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{OcrBackend, OcrOutput, TextBlock};
use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// JSON body answered by the OCR service.
#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    blocks: Vec<TextBlock>,
    #[serde(default)]
    error: Option<String>,
}

impl OcrResponse {
    fn into_output(self) -> Result<OcrOutput, OcrError> {
        if let Some(error) = self.error.filter(|e| !e.is_empty()) {
            return Err(OcrError::Recognition(error));
        }

        let output = match self.confidence {
            Some(confidence) => OcrOutput {
                text: self.text,
                confidence: confidence.clamp(0.0, 1.0),
                blocks: self.blocks,
            },
            None => OcrOutput::from_blocks(self.text, self.blocks),
        };
        Ok(output)
    }
}

/// Posts raw image bytes to an OCR service.
pub struct HttpOcrBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOcrBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, OcrError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OcrError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Build from configuration; the endpoint is mandatory.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| OcrError::Unavailable("no OCR endpoint configured".to_string()))?;
        Self::new(endpoint, Duration::from_secs(config.timeout_secs))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl OcrBackend for HttpOcrBackend {
    async fn extract_text(&self, image: &[u8]) -> Result<OcrOutput, OcrError> {
        debug!("Sending {} bytes to {}", image.len(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| OcrError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OcrError::Unavailable(format!("OCR service returned HTTP {}", status)));
        }

        let body: OcrResponse = response
            .json()
            .await
            .map_err(|e| OcrError::InvalidResponse(e.to_string()))?;
        let output = body.into_output()?;

        info!(
            "OCR extracted {} characters (confidence {:.2})",
            output.text.len(),
            output.confidence
        );
        Ok(output)
    }
}
