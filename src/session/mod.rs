//! The session record and its store.
//!
//! A [`Session`] is built only by decoding an access token, so its claim
//! fields always describe the token it carries. The [`SessionStore`] is the
//! single owner of the current session and the only writer of durable
//! storage.

mod file_store;
mod memory_store;
mod record;
mod storage;
mod store;

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
pub use file_store::FileSessionStorage;
pub use memory_store::InMemorySessionStorage;
pub use record::{RECORD_VERSION, SessionRecord};
pub use storage::SessionStorage;
pub use store::{DEFAULT_STORAGE_KEY, SessionStore};

use crate::jwt::{AccessClaims, ClaimsDecoder};
use crate::{AuthError, Role, SecretString};

/// Where the session lifecycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Active,
    Refreshing,
}

/// The authenticated user's credentials and decoded claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    access_token: SecretString,
    refresh_token: SecretString,
    roles: BTreeSet<Role>,
    permissions: BTreeSet<String>,
    tenant_id: Option<String>,
    user_ref: Option<String>,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Builds a session by decoding `access_token`.
    ///
    /// # Errors
    /// `AuthError::TokenInvalid` if the access token is empty or its claims
    /// cannot be decoded.
    pub fn from_tokens(
        access_token: SecretString,
        refresh_token: SecretString,
        decoder: &ClaimsDecoder,
    ) -> Result<Self, AuthError> {
        let claims = decoder.decode(access_token.expose_secret())?;
        Self::from_claims(access_token, refresh_token, claims)
    }

    fn from_claims(
        access_token: SecretString,
        refresh_token: SecretString,
        claims: AccessClaims,
    ) -> Result<Self, AuthError> {
        let expires_at = claims.expires_at()?;

        Ok(Self {
            access_token,
            refresh_token,
            roles: claims.roles.into_iter().collect(),
            permissions: claims.permissions.into_iter().collect(),
            tenant_id: claims.tenant_id,
            user_ref: claims.sub,
            expires_at,
        })
    }

    /// Returns the session after a refresh exchange.
    ///
    /// The refresh token is kept unless the backend rotated it.
    pub(crate) fn refreshed(
        &self,
        access_token: SecretString,
        rotated_refresh_token: Option<SecretString>,
        decoder: &ClaimsDecoder,
    ) -> Result<Self, AuthError> {
        let refresh_token = rotated_refresh_token
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| self.refresh_token.clone());
        Self::from_tokens(access_token, refresh_token, decoder)
    }

    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &SecretString {
        &self.refresh_token
    }

    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn user_ref(&self) -> Option<&str> {
        self.user_ref.as_deref()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// Returns true if the access token expires before `now + margin`.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at <= Utc::now() + margin
    }

    /// Returns true if the session holds at least one of `roles`.
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.roles.contains(role))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}
