//
// transport.rs
// PACS-Sync
//
// Blocking HTTP access to an archive's REST surface with Basic credentials and typed status outcomes.
//
// Thales Matheus Mendonça Santos - October 2026

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;

use crate::error::TransportError;
use crate::models::PacsEndpoint;

/// Fixed per-call timeout; there is no retry at this layer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const DICOM_CONTENT_TYPE: &str = "application/dicom";

/// Minimal verbs the repositories need from an archive.
pub trait Transport: Send + Sync {
    fn get(&self, endpoint: &PacsEndpoint, path: &str) -> Result<Vec<u8>, TransportError>;

    fn post(
        &self,
        endpoint: &PacsEndpoint,
        path: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<Vec<u8>, TransportError>;

    fn delete(&self, endpoint: &PacsEndpoint, path: &str) -> Result<(), TransportError>;
}

pub type SharedTransport = Arc<dyn Transport>;

/// GET a path and decode the JSON body.
pub fn get_json<T: DeserializeOwned>(
    transport: &dyn Transport,
    endpoint: &PacsEndpoint,
    path: &str,
) -> Result<T, TransportError> {
    let body = transport.get(endpoint, path)?;
    serde_json::from_slice(&body).map_err(|e| TransportError::InvalidBody(e.to_string()))
}

/// `reqwest`-backed transport used against real archives.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn execute(&self, request: RequestBuilder, method: &str, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = request
            .send()
            .map_err(|e| TransportError::Connection(format!("HTTP {method} {url} failed: {e}")))?;

        let status = response.status().as_u16();
        if let Some(err) = TransportError::from_status(status) {
            tracing::debug!(method, url, status, "archive rejected request");
            return Err(err);
        }

        let body = response
            .bytes()
            .map_err(|e| TransportError::Connection(format!("HTTP {method} {url} body read failed: {e}")))?;
        tracing::trace!(method, url, bytes = body.len(), "archive request completed");
        Ok(body.to_vec())
    }
}

impl Transport for HttpTransport {
    fn get(&self, endpoint: &PacsEndpoint, path: &str) -> Result<Vec<u8>, TransportError> {
        let url = endpoint.join(path);
        let request = self
            .client
            .get(&url)
            .basic_auth(&endpoint.username, Some(&endpoint.password));
        self.execute(request, "GET", &url)
    }

    fn post(
        &self,
        endpoint: &PacsEndpoint,
        path: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<Vec<u8>, TransportError> {
        let url = endpoint.join(path);
        let request = self
            .client
            .post(&url)
            .basic_auth(&endpoint.username, Some(&endpoint.password))
            .header(CONTENT_TYPE, content_type)
            .body(body);
        self.execute(request, "POST", &url)
    }

    fn delete(&self, endpoint: &PacsEndpoint, path: &str) -> Result<(), TransportError> {
        let url = endpoint.join(path);
        let request = self
            .client
            .delete(&url)
            .basic_auth(&endpoint.username, Some(&endpoint.password));
        self.execute(request, "DELETE", &url).map(|_| ())
    }
}
