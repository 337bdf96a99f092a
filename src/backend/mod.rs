//! The authentication endpoints this crate consumes.
//!
//! The backend itself is an external collaborator; [`AuthBackend`] is the
//! seam. The HTTP implementation lives in [`crate::http`] (feature
//! `http-client`); [`MockAuthBackend`] (feature `mocks`) issues real JWTs
//! from memory for tests.

#[cfg(any(test, feature = "mocks"))]
mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{AuthError, SecretString};

#[cfg(any(test, feature = "mocks"))]
pub use mock::{MockAccount, MockAuthBackend, RefreshBehavior};

/// Login credentials.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Tokens returned by a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    #[serde(alias = "accessToken")]
    pub access_token: SecretString,
    #[serde(alias = "refreshToken")]
    pub refresh_token: SecretString,
}

/// Tokens returned by a successful refresh exchange.
///
/// `refresh_token` is present only when the backend rotates it.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshGrant {
    #[serde(alias = "accessToken")]
    pub access_token: SecretString,
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: Option<SecretString>,
}

/// Authentication endpoints of the ATS backend.
///
/// Error mapping implementations must follow:
///
/// | Situation | Error |
/// |-----------|-------|
/// | login credentials rejected | `InvalidCredentials` |
/// | refresh token rejected (expired, revoked, unknown) | `TokenInvalid` |
/// | deadline exceeded | `Timeout` |
/// | connection failure, 5xx | `TransientNetworkFailure` |
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchanges credentials for an access/refresh token pair.
    async fn authenticate(&self, credentials: &Credentials) -> Result<TokenGrant, AuthError>;

    /// Exchanges a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &SecretString) -> Result<RefreshGrant, AuthError>;

    /// Invalidates the access token server-side. Best effort.
    async fn logout(&self, access_token: &SecretString) -> Result<(), AuthError>;
}

#[async_trait]
impl<B: AuthBackend + ?Sized> AuthBackend for std::sync::Arc<B> {
    async fn authenticate(&self, credentials: &Credentials) -> Result<TokenGrant, AuthError> {
        (**self).authenticate(credentials).await
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<RefreshGrant, AuthError> {
        (**self).refresh(refresh_token).await
    }

    async fn logout(&self, access_token: &SecretString) -> Result<(), AuthError> {
        (**self).logout(access_token).await
    }
}
