//! reqwest-backed backend and transport.
//!
//! Requires the `http-client` feature.

use async_trait::async_trait;
use http::StatusCode;
use serde::Serialize;

use crate::config::{ClientConfig, EndpointConfig};
use crate::{
    ApiRequest, ApiResponse, AuthBackend, AuthError, Credentials, RefreshGrant, SecretString,
    TokenGrant, Transport,
};

/// Talks to the ATS backend over HTTP.
///
/// Implements both [`AuthBackend`] (the `/auth/*` endpoints) and
/// [`Transport`] (everything else). Clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    endpoints: EndpointConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

impl HttpBackend {
    /// # Errors
    /// `AuthError::ConfigurationError` if the base URL is empty or the HTTP
    /// client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, AuthError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(AuthError::ConfigurationError(
                "base_url must not be empty".to_owned(),
            ));
        }

        let timeout = config.request_timeout.to_std().map_err(|_| {
            AuthError::ConfigurationError("request_timeout must not be negative".to_owned())
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::ConfigurationError(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            endpoints: config.endpoints.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

fn network_error(err: reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::TransientNetworkFailure(err.without_url().to_string())
    }
}

fn unexpected_status(endpoint: &str, status: StatusCode) -> AuthError {
    AuthError::TransientNetworkFailure(format!("{endpoint} answered {status}"))
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn authenticate(&self, credentials: &Credentials) -> Result<TokenGrant, AuthError> {
        let response = self
            .client
            .post(self.url(&self.endpoints.login))
            .json(credentials)
            .send()
            .await
            .map_err(network_error)?;

        match response.status() {
            status if status.is_success() => {
                response.json().await.map_err(|_| AuthError::TokenInvalid)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::InvalidCredentials),
            status => Err(unexpected_status("login", status)),
        }
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<RefreshGrant, AuthError> {
        let response = self
            .client
            .post(self.url(&self.endpoints.refresh))
            .json(&RefreshBody {
                refresh_token: refresh_token.expose_secret(),
            })
            .send()
            .await
            .map_err(network_error)?;

        match response.status() {
            status if status.is_success() => {
                response.json().await.map_err(|_| AuthError::TokenInvalid)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AuthError::TokenInvalid)
            }
            status => Err(unexpected_status("refresh", status)),
        }
    }

    async fn logout(&self, access_token: &SecretString) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.url(&self.endpoints.logout))
            .bearer_auth(access_token.expose_secret())
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(unexpected_status("logout", status))
        }
    }
}

#[async_trait]
impl Transport for HttpBackend {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path))
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(network_error)?;

        Ok(ApiResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
