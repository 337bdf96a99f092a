//! Client-side session lifecycle for the ATS dashboards.
//!
//! The crate owns the authentication record of a running client and the
//! pieces that read or mutate it:
//!
//! | Piece | Type |
//! |-------|------|
//! | Session store | [`session::SessionStore`] |
//! | Refresh coordinator | [`RefreshCoordinator`] |
//! | Request interceptor | [`RequestInterceptor`] |
//! | Route guard | [`guard::RouteGuard`] |
//!
//! [`AuthClient`] wires them together. Every piece can also be built on its
//! own, which is how the tests use them.

pub mod actions;
pub mod backend;
pub mod config;
pub mod events;
pub mod guard;
#[cfg(feature = "http-client")]
pub mod http;
pub mod jwt;
pub mod session;
pub mod transport;

mod client;
mod interceptor;
mod refresh;
mod role;
mod secret;

pub use backend::{AuthBackend, Credentials, RefreshGrant, TokenGrant};
pub use client::{AuthClient, AuthClientBuilder};
pub use config::ClientConfig;
pub use interceptor::RequestInterceptor;
pub use refresh::RefreshCoordinator;
pub use role::Role;
pub use secret::SecretString;
pub use session::{Session, SessionState, SessionStore};
pub use transport::{ApiRequest, ApiResponse, Transport};

#[cfg(any(test, feature = "mocks"))]
pub use backend::MockAuthBackend;
#[cfg(any(test, feature = "mocks"))]
pub use transport::MockTransport;

use std::fmt;

/// Errors surfaced by the session subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No session was present where one is required.
    Unauthenticated,
    /// The refresh token was rejected or the refresh exchange gave up.
    /// The session has been cleared.
    SessionExpired,
    /// The session's roles do not cover the destination.
    AuthorizationDenied,
    /// Network-level failure unrelated to credential validity.
    TransientNetworkFailure(String),
    /// The backend rejected the login credentials.
    InvalidCredentials,
    /// A token could not be decoded, or the backend refused it.
    TokenInvalid,
    /// A network call exceeded its deadline.
    Timeout,
    /// The persisted session record could not be used.
    CorruptSession(String),
    /// Durable storage failed.
    StorageError(String),
    ConfigurationError(String),
}

impl std::error::Error for AuthError {}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Unauthenticated => write!(f, "Not authenticated"),
            AuthError::SessionExpired => write!(f, "Session has expired"),
            AuthError::AuthorizationDenied => write!(f, "Insufficient role for destination"),
            AuthError::TransientNetworkFailure(msg) => write!(f, "Network error: {msg}"),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
            AuthError::Timeout => write!(f, "Request timed out"),
            AuthError::CorruptSession(msg) => write!(f, "Corrupt session record: {msg}"),
            AuthError::StorageError(msg) => write!(f, "Storage error: {msg}"),
            AuthError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support;
