//! HTTP transport for the Keep REST API.
//!
//! Resource codecs only see the [`Transport`] trait; [`HttpTransport`] is the
//! reqwest-backed implementation shared by all of them.

pub mod decode;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::ProviderConfig;
use crate::error::ProviderError;

const API_KEY_HEADER: &str = "x-api-key";

/// HTTP verbs used against the Keep API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("error executing request: {0}")]
    Network(#[from] reqwest::Error),
    #[error("error encoding request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid request url: {0}")]
    Url(String),
    #[error("API key contains characters that cannot be sent in a header")]
    InvalidApiKey,
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Raw upstream body, when the server answered.
    pub fn body(&self) -> Option<&str> {
        match self {
            ClientError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// A request/response channel to the Keep API.
///
/// Paths are given as segments relative to the configured base URL; each
/// segment is percent-encoded by the transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<Vec<u8>, ClientError>;

    async fn get(&self, segments: &[&str]) -> Result<Vec<u8>, ClientError> {
        self.execute(Method::Get, segments, None).await
    }

    async fn post(&self, segments: &[&str], body: &Value) -> Result<Vec<u8>, ClientError> {
        self.execute(Method::Post, segments, Some(body)).await
    }

    async fn put(&self, segments: &[&str], body: &Value) -> Result<Vec<u8>, ClientError> {
        self.execute(Method::Put, segments, Some(body)).await
    }

    async fn delete(&self, segments: &[&str]) -> Result<Vec<u8>, ClientError> {
        self.execute(Method::Delete, segments, None).await
    }
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    authenticated: bool,
}

impl HttpTransport {
    pub fn new(
        base_url: Url,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(key).map_err(|_| ClientError::InvalidApiKey)?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            client,
            base_url,
            authenticated: api_key.is_some(),
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base_url = config.base_url()?;
        let transport = Self::new(
            base_url,
            config.api_key.as_deref(),
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(transport)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Url(format!("{} cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.authenticated.then_some("[REDACTED]"))
            .finish()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<Vec<u8>, ClientError> {
        let url = self.url_for(segments)?;
        debug!(
            method = %method,
            url = %url,
            authenticated = self.authenticated,
            "sending request to Keep API"
        );

        let mut request = self.client.request(method.into(), url.clone());
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            response_bytes = bytes.len(),
            "received response from Keep API"
        );

        if status.as_u16() >= 400 {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        Ok(bytes.to_vec())
    }
}
