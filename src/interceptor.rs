use std::sync::Arc;

use http::{HeaderName, HeaderValue};

use crate::config::{ClientConfig, HeaderConfig};
use crate::{ApiRequest, ApiResponse, AuthError, RefreshCoordinator, Session, Transport};

/// Resolved names of the credential headers.
#[derive(Debug, Clone)]
struct CredentialHeaders {
    authorization: HeaderName,
    tenant: HeaderName,
    user: HeaderName,
}

impl CredentialHeaders {
    fn parse(config: &HeaderConfig) -> Result<Self, AuthError> {
        let parse = |name: &str| {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                AuthError::ConfigurationError(format!("invalid header name: {name:?}"))
            })
        };
        Ok(Self {
            authorization: parse(&config.authorization)?,
            tenant: parse(&config.tenant)?,
            user: parse(&config.user)?,
        })
    }
}

/// Sends requests with the current session's credentials attached.
///
/// Requests made without a session go out as they are. With a session, the
/// access token is refreshed first if it is about to expire, and a `401`
/// answer gets exactly one forced refresh and retry. A second `401` ends the
/// session with `AuthError::SessionExpired`.
#[derive(Clone)]
pub struct RequestInterceptor {
    coordinator: RefreshCoordinator,
    transport: Arc<dyn Transport>,
    headers: CredentialHeaders,
}

impl RequestInterceptor {
    pub fn new(coordinator: RefreshCoordinator, transport: impl Transport + 'static) -> Self {
        Self {
            coordinator,
            transport: Arc::new(transport),
            headers: CredentialHeaders {
                authorization: http::header::AUTHORIZATION,
                tenant: HeaderName::from_static("x-tenant-id"),
                user: HeaderName::from_static("x-user-id"),
            },
        }
    }

    /// # Errors
    /// `AuthError::ConfigurationError` if a configured header name is not a
    /// valid HTTP header name.
    pub fn with_config(
        coordinator: RefreshCoordinator,
        transport: Arc<dyn Transport>,
        config: &ClientConfig,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            coordinator,
            transport,
            headers: CredentialHeaders::parse(&config.headers)?,
        })
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Sends `request`, authenticated if a session exists.
    ///
    /// # Errors
    ///
    /// - `SessionExpired` - the session could not be refreshed, or the
    ///   backend refused the refreshed credentials too
    /// - `TransientNetworkFailure` - from the refresh exchange or the
    ///   transport; nothing is retried
    /// - any other transport error, unchanged
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "intercept", skip_all, fields(path = %request.path), err)
    )]
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError> {
        if !self.coordinator.store().is_authenticated() {
            log::debug!(
                target: "ats_session",
                "msg=\"no session, sending unauthenticated\" path=\"{}\"",
                request.path
            );
            let mut outbound = request.clone();
            outbound.headers.remove(&self.headers.tenant);
            outbound.headers.remove(&self.headers.user);
            return self.transport.send(&outbound).await;
        }

        let session = self.coordinator.ensure_fresh().await?;
        let response = self
            .transport
            .send(&self.authorize(request, &session)?)
            .await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        log::info!(
            target: "ats_session",
            "msg=\"request unauthorized, refreshing once\" path=\"{}\"",
            request.path
        );
        let session = self
            .coordinator
            .force_refresh(session.access_token())
            .await?;
        let retry = self
            .transport
            .send(&self.authorize(request, &session)?)
            .await?;
        if !retry.is_unauthorized() {
            return Ok(retry);
        }

        log::warn!(
            target: "ats_session",
            "msg=\"refreshed credentials refused, ending session\" path=\"{}\"",
            request.path
        );
        self.coordinator
            .expire(&session, "refreshed access token refused")
            .await;
        Err(AuthError::SessionExpired)
    }

    /// Returns a copy of `request` carrying the session's credentials.
    ///
    /// Caller-supplied tenant or user headers are dropped; they only ever
    /// come from the token.
    fn authorize(&self, request: &ApiRequest, session: &Session) -> Result<ApiRequest, AuthError> {
        let mut outbound = request.clone();
        let headers = &mut outbound.headers;

        let mut bearer = HeaderValue::from_str(&format!(
            "Bearer {}",
            session.access_token().expose_secret()
        ))
        .map_err(|_| AuthError::TokenInvalid)?;
        bearer.set_sensitive(true);
        headers.insert(self.headers.authorization.clone(), bearer);

        headers.remove(&self.headers.tenant);
        if let Some(tenant_id) = session.tenant_id() {
            let value = HeaderValue::from_str(tenant_id).map_err(|_| AuthError::TokenInvalid)?;
            headers.insert(self.headers.tenant.clone(), value);
        }

        headers.remove(&self.headers.user);
        if let Some(user_ref) = session.user_ref() {
            let value = HeaderValue::from_str(user_ref).map_err(|_| AuthError::TokenInvalid)?;
            headers.insert(self.headers.user.clone(), value);
        }

        Ok(outbound)
    }
}
