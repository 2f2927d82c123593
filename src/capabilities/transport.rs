//! Outbound backend transport
//!
//! The router decides which backend and route to call; a [`Transport`]
//! performs the call. [`HttpTransport`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use super::manifest::BackendKind;
use crate::Result;

/// HTTP method used for a backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single call to a backend
#[derive(Debug, Clone)]
pub struct OutboundCall {
    pub request_id: Uuid,
    pub backend: BackendKind,
    pub method: Method,
    pub url: Url,
    pub payload: Option<Value>,
    pub headers: Vec<(String, String)>,
}

/// What the backend answered with
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Decoded JSON, or the raw text as a JSON string when not JSON
    pub body: Value,
}

impl TransportResponse {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Failure to get any answer from the backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, reset, and the like
    #[error("connection failed: {0}")]
    Connect(String),

    /// The backend did not answer in time
    #[error("request timed out")]
    Timeout,
}

/// Performs backend calls
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one call; no retries
    async fn send(&self, call: OutboundCall) -> std::result::Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport whose calls time out after `timeout`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, call: OutboundCall) -> std::result::Result<TransportResponse, TransportError> {
        let mut req = match call.method {
            Method::Get => self.client.get(call.url.clone()),
            Method::Post => self.client.post(call.url.clone()),
        };

        for (name, value) in &call.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        req = req.header("x-request-id", call.request_id.to_string());

        if let Some(payload) = &call.payload {
            req = req.json(payload);
        }

        let response = req.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(classify)?;

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        tracing::debug!(
            request_id = %call.request_id,
            backend = %call.backend,
            url = %call.url,
            status,
            "backend responded"
        );

        Ok(TransportResponse { status, body })
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connect(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        let ok = TransportResponse { status: 204, body: Value::Null };
        let redirect = TransportResponse { status: 302, body: Value::Null };
        let failed = TransportResponse { status: 500, body: Value::Null };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
        assert!(!failed.is_success());
    }

    #[tokio::test]
    async fn unreachable_backend_is_connect_error() {
        let transport = HttpTransport::new(Duration::from_secs(2)).unwrap();
        let call = OutboundCall {
            request_id: Uuid::new_v4(),
            backend: BackendKind::Speech,
            method: Method::Get,
            // nothing listens on the discard port
            url: Url::parse("http://127.0.0.1:9/health").unwrap(),
            payload: None,
            headers: Vec::new(),
        };

        let err = transport.send(call).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_) | TransportError::Timeout));
    }
}
