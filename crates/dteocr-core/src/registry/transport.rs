//! Wire access to the SII registry.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT};
use serde::Serialize;
use tracing::debug;

use crate::error::RegistryError;
use crate::models::config::RegistryConfig;
use crate::rut::Rut;

/// Form body of a "situación tributaria" query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupForm {
    #[serde(rename = "RUT")]
    pub rut: String,
    #[serde(rename = "DV")]
    pub dv: String,
    #[serde(rename = "PRG")]
    pub prg: &'static str,
    #[serde(rename = "OPC")]
    pub opc: &'static str,
}

impl LookupForm {
    pub fn new(rut: &Rut) -> Self {
        Self {
            rut: rut.body().to_string(),
            dv: rut.check().to_string(),
            prg: "STC",
            opc: "NOR",
        }
    }
}

/// Raw registry answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryResponse {
    pub status: u16,
    pub body: String,
}

impl RegistryResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Sends lookup forms to the registry.
///
/// Implementations make a single attempt; retrying is the client's job.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    async fn submit(&self, form: &LookupForm) -> Result<RegistryResponse, RegistryError>;
}

/// HTTP transport posting to the SII web form.
pub struct HttpRegistryTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRegistryTransport {
    /// Build a transport from registry settings.
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .default_headers(browser_headers())
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// The registry rejects requests that do not look like a browser.
fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36",
        ),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-CL,es;q=0.9"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

#[async_trait]
impl RegistryTransport for HttpRegistryTransport {
    async fn submit(&self, form: &LookupForm) -> Result<RegistryResponse, RegistryError> {
        debug!("POST {} RUT={} DV={}", self.endpoint, form.rut, form.dv);

        let response = self.client.post(&self.endpoint).form(form).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(RegistryResponse { status, body })
    }
}
