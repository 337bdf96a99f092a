//! Configuration types for the session client.
//!
//! # Example
//!
//! ```rust
//! use ats_session::config::{ClientConfig, HeaderConfig};
//! use chrono::Duration;
//!
//! // Use defaults
//! let config = ClientConfig::default();
//!
//! // Or customize
//! let config = ClientConfig {
//!     base_url: "https://ats.example.com/api".to_owned(),
//!     refresh_margin: Duration::seconds(60),
//!     headers: HeaderConfig {
//!         tenant: "X-Org-Id".to_owned(),
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use chrono::Duration;

use crate::AuthError;
use crate::session::DEFAULT_STORAGE_KEY;

/// Main configuration for an [`AuthClient`](crate::AuthClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the ATS backend, used by the HTTP backend and transport.
    pub base_url: String,

    /// Key of the persisted session record.
    pub storage_key: String,

    /// Access tokens expiring within this window are treated as expired so a
    /// request never leaves with a token that dies in flight.
    ///
    /// Default: 30 seconds
    pub refresh_margin: Duration,

    /// Deadline for one refresh exchange. A timed-out exchange is handled
    /// like a rejected refresh token.
    ///
    /// Default: 15 seconds
    pub refresh_timeout: Option<Duration>,

    /// Per-request timeout applied by the HTTP transport.
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,

    pub endpoints: EndpointConfig,

    pub headers: HeaderConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_owned(),
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
            refresh_margin: Duration::seconds(30),
            refresh_timeout: Some(Duration::seconds(15)),
            request_timeout: Duration::seconds(30),
            endpoints: EndpointConfig::default(),
            headers: HeaderConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Configuration for local development against a slow debug backend.
    pub fn development() -> Self {
        Self {
            refresh_margin: Duration::seconds(5),
            refresh_timeout: Some(Duration::seconds(60)),
            request_timeout: Duration::seconds(120),
            ..Self::default()
        }
    }

    /// Shorter deadlines and a wider refresh margin.
    pub fn strict() -> Self {
        Self {
            refresh_margin: Duration::seconds(60),
            refresh_timeout: Some(Duration::seconds(5)),
            request_timeout: Duration::seconds(10),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    /// Checks the configuration for values the client cannot work with.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.base_url.trim().is_empty() {
            return Err(AuthError::ConfigurationError(
                "base_url must not be empty".to_owned(),
            ));
        }
        if self.storage_key.is_empty() {
            return Err(AuthError::ConfigurationError(
                "storage_key must not be empty".to_owned(),
            ));
        }
        if self.refresh_margin < Duration::zero() {
            return Err(AuthError::ConfigurationError(
                "refresh_margin must not be negative".to_owned(),
            ));
        }
        if self
            .refresh_timeout
            .is_some_and(|timeout| timeout <= Duration::zero())
        {
            return Err(AuthError::ConfigurationError(
                "refresh_timeout must be positive".to_owned(),
            ));
        }
        self.headers.validate()
    }
}

/// Paths of the authentication endpoints, relative to `base_url`.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub login: String,
    pub refresh: String,
    pub logout: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_owned(),
            refresh: "/auth/refresh".to_owned(),
            logout: "/auth/logout".to_owned(),
        }
    }
}

/// Names of the headers the interceptor attaches.
#[derive(Debug, Clone)]
pub struct HeaderConfig {
    pub authorization: String,
    pub tenant: String,
    pub user: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            authorization: "Authorization".to_owned(),
            tenant: "X-Tenant-Id".to_owned(),
            user: "X-User-Id".to_owned(),
        }
    }
}

impl HeaderConfig {
    fn validate(&self) -> Result<(), AuthError> {
        for name in [&self.authorization, &self.tenant, &self.user] {
            http::HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                AuthError::ConfigurationError(format!("invalid header name: {name:?}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(config.storage_key, "ats_session");
        assert_eq!(config.refresh_margin, Duration::seconds(30));
        assert_eq!(config.refresh_timeout, Some(Duration::seconds(15)));
        assert_eq!(config.endpoints.refresh, "/auth/refresh");
        assert_eq!(config.headers.tenant, "X-Tenant-Id");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert_eq!(ClientConfig::strict().refresh_margin, Duration::seconds(60));
        assert_eq!(
            ClientConfig::development().refresh_timeout,
            Some(Duration::seconds(60))
        );
        assert!(ClientConfig::strict().validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = ClientConfig::new("https://ats.example.com")
            .with_refresh_margin(Duration::seconds(10))
            .with_refresh_timeout(None)
            .with_storage_key("tenant_a");

        assert_eq!(config.base_url, "https://ats.example.com");
        assert_eq!(config.refresh_margin, Duration::seconds(10));
        assert_eq!(config.refresh_timeout, None);
        assert_eq!(config.storage_key, "tenant_a");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClientConfig::new("  ").validate().is_err());
        assert!(
            ClientConfig::default()
                .with_refresh_margin(Duration::seconds(-1))
                .validate()
                .is_err()
        );
        assert!(
            ClientConfig::default()
                .with_refresh_timeout(Some(Duration::zero()))
                .validate()
                .is_err()
        );

        let mut config = ClientConfig::default();
        config.headers.tenant = "X Tenant".to_owned();
        assert!(matches!(
            config.validate(),
            Err(AuthError::ConfigurationError(ref msg)) if msg.contains("header")
        ));
    }
}
