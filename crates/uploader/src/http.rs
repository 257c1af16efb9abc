//! HTTP session transport for the version-storage API.
//!
//! Async client using `reqwest` with `X-API-Key` authentication. Every
//! request is tagged with a fresh `X-Request-ID` and logged.

use std::time::Duration;

use appvault_protocol::constants::{
    API_KEY_HEADER, CHUNK_CHECKSUM_HEADER, CHUNK_FIELD, DEFAULT_REQUEST_TIMEOUT, HEALTH_PATH,
    REQUEST_ID_HEADER, chunk_path, complete_path, start_path,
};
use appvault_protocol::{
    ApiErrorBody, CommittedArtifact, HealthResponse, StartUploadRequest, StartUploadResponse,
};
use appvault_transfer::checksum_bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

use crate::transport::{ChunkAck, SessionTransport, StartUpload, TransportError, TransportFuture};

/// `SessionTransport` over the chunked upload REST endpoints.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport with the default 300 s request timeout.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, api_key, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a transport whose requests fail after `timeout`.
    ///
    /// An empty `api_key` sends no key header.
    pub fn with_timeout(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if !api_key.is_empty() {
            let mut value =
                HeaderValue::from_str(api_key).map_err(|_| TransportError::InvalidApiKey)?;
            value.set_sensitive(true);
            let name = HeaderName::from_bytes(API_KEY_HEADER.as_bytes())
                .map_err(|_| TransportError::InvalidApiKey)?;
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probes `GET /health`.
    pub async fn health(&self) -> Result<HealthResponse, TransportError> {
        let body = self
            .execute(self.http.get(self.url(HEALTH_PATH)), "GET", HEALTH_PATH)
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends the request and returns the body of a 2xx response.
    async fn execute(
        &self,
        builder: reqwest::RequestBuilder,
        method: &str,
        path: &str,
    ) -> Result<Vec<u8>, TransportError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        debug!(method, path, request_id = %request_id, "request");

        let resp = builder
            .header(REQUEST_ID_HEADER, &request_id)
            .send()
            .await
            .map_err(map_reqwest)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(map_reqwest)?;

        if !status.is_success() {
            let detail = error_detail(&body, status.canonical_reason());
            warn!(
                method,
                path,
                request_id = %request_id,
                status = status.as_u16(),
                detail = %detail,
                "request failed"
            );
            return Err(TransportError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        debug!(
            method,
            path,
            request_id = %request_id,
            status = status.as_u16(),
            bytes = body.len(),
            "response"
        );
        Ok(body.to_vec())
    }
}

impl HttpTransport {
    async fn open_session(&self, request: &StartUpload) -> Result<String, TransportError> {
        let form =
            StartUploadRequest::new(&request.metadata, &request.file_name, request.file_size)?;
        let path = start_path();
        let body = self
            .execute(self.http.post(self.url(&path)).form(&form), "POST", &path)
            .await?;
        let resp: StartUploadResponse = serde_json::from_slice(&body)?;
        Ok(resp.upload_id)
    }

    async fn send_chunk(
        &self,
        session_id: &str,
        index: u32,
        data: &[u8],
    ) -> Result<ChunkAck, TransportError> {
        let part = Part::bytes(data.to_vec())
            .file_name(format!("chunk-{index}"))
            .mime_str("application/octet-stream")?;
        let form = Form::new().part(CHUNK_FIELD, part);
        let path = chunk_path(session_id, index);
        let builder = self
            .http
            .post(self.url(&path))
            .header(CHUNK_CHECKSUM_HEADER, checksum_bytes(data))
            .multipart(form);
        self.execute(builder, "POST", &path).await?;
        Ok(ChunkAck {
            index,
            bytes: data.len() as u64,
        })
    }

    async fn commit(&self, session_id: &str) -> Result<CommittedArtifact, TransportError> {
        let path = complete_path(session_id);
        let body = self
            .execute(self.http.post(self.url(&path)), "POST", &path)
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl SessionTransport for HttpTransport {
    fn start<'a>(&'a self, request: &'a StartUpload) -> TransportFuture<'a, String> {
        Box::pin(self.open_session(request))
    }

    fn upload_chunk<'a>(
        &'a self,
        session_id: &'a str,
        index: u32,
        data: &'a [u8],
    ) -> TransportFuture<'a, ChunkAck> {
        Box::pin(self.send_chunk(session_id, index, data))
    }

    fn complete<'a>(&'a self, session_id: &'a str) -> TransportFuture<'a, CommittedArtifact> {
        Box::pin(self.commit(session_id))
    }
}

fn map_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connection(e.to_string())
    } else {
        TransportError::Http(e)
    }
}

/// Extracts the `detail` field of an error body, falling back to raw text.
fn error_detail(body: &[u8], reason: Option<&str>) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ApiErrorBody>(body) {
        return parsed.message();
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        reason.unwrap_or("unknown error").to_string()
    } else {
        text
    }
}
