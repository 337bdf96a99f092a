//! Outbound request/response types and the transport seam.

#[cfg(any(test, feature = "mocks"))]
mod mock;

use async_trait::async_trait;
use http::header::{AsHeaderName, IntoHeaderName};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::AuthError;

#[cfg(any(test, feature = "mocks"))]
pub use mock::MockTransport;

/// A call to a protected (or public) backend endpoint.
///
/// Credential headers are marked sensitive, so the derived `Debug` never
/// prints them.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the backend base URL, e.g. `/jobs?page=2`.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PUT, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl IntoHeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns a header as text, if present and valid UTF-8.
    pub fn header(&self, name: impl AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the bearer token carried in the `Authorization` header.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header(http::header::AUTHORIZATION)
            .and_then(|auth| auth.strip_prefix("Bearer "))
    }
}

/// The backend's answer.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn json_body(status: StatusCode, body: &serde_json::Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.to_string().into_bytes(),
        }
    }

    /// Returns true for the authorization-failure status the interceptor
    /// recovers from.
    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Sends requests to the backend.
///
/// Implementations only move bytes: they do not attach credentials and do
/// not retry. Both are the [`RequestInterceptor`](crate::RequestInterceptor)'s job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError> {
        (**self).send(request).await
    }
}
