//! HTTP boundary used by every extractor.
//!
//! Extractors never talk to reqwest directly. They build an [`HttpRequest`]
//! and hand it to an injected [`Transport`], which returns a fully buffered
//! [`HttpResponse`]. Retries, timeouts and request pacing are the transport's
//! business; extractors only interpret status codes and bodies.
//!
//! - [`Transport`] - Async trait implemented by transports
//! - [`ReqwestTransport`] - Default implementation on top of `reqwest`
//! - [`RetryPolicy`] - Transient-failure retry used by [`ReqwestTransport`]
//! - [`RequestInterval`] - Per-host minimum delay between requests

mod client;
mod error;
mod interval;
mod retry;

pub use client::{ReqwestTransport, TransportOptions};
pub use error::TransportError;
pub use interval::RequestInterval;
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, MAX_RETRY_AFTER, RetryDecision, RetryPolicy, classify_error,
    classify_status, parse_retry_after,
};

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;

/// A single outgoing request.
///
/// `params` are appended to the query string, `form` is sent as an
/// `application/x-www-form-urlencoded` body when non-empty.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Target URL without the query parameters in `params`.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Query parameters.
    pub params: BTreeMap<String, String>,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Form body fields.
    pub form: BTreeMap<String, String>,
}

impl HttpRequest {
    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Creates a request with the given method.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
            form: BTreeMap::new(),
        }
    }

    /// Replaces the query parameters.
    #[must_use]
    pub fn params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// Adds one query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replaces the request headers.
    #[must_use]
    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Adds one form field.
    #[must_use]
    pub fn form_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(key.into(), value.into());
        self
    }
}

/// A buffered response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Final URL after transport-level redirects.
    pub url: String,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            url: url.into(),
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Returns the body as lossy UTF-8 text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Capability every extractor issues its requests through.
///
/// Non-2xx statuses are returned as responses, not errors; only failures to
/// obtain a response at all are [`TransportError`]s.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a request.
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder_collects_fields() {
        let request = HttpRequest::post("https://api.example.com/login")
            .param("page", "2")
            .form_field("uname", "user");
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.params.get("page").unwrap(), "2");
        assert_eq!(request.form.get("uname").unwrap(), "user");
        assert!(request.headers.is_empty());
    }

    #[test]
    fn test_http_response_success_range() {
        assert!(HttpResponse::new(200, "u", "").is_success());
        assert!(HttpResponse::new(204, "u", "").is_success());
        assert!(!HttpResponse::new(301, "u", "").is_success());
        assert!(!HttpResponse::new(404, "u", "").is_success());
    }

    #[test]
    fn test_http_response_json_decodes_body() {
        let response = HttpResponse::new(200, "u", r#"{"session":"abc"}"#);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["session"], "abc");
        assert!(response.json::<Vec<u8>>().is_err());
    }
}
