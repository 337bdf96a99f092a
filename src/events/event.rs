use chrono::{DateTime, Utc};

use crate::Role;

/// Session lifecycle events.
///
/// Events never carry token values.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    LoginSucceeded {
        user_ref: Option<String>,
        tenant_id: Option<String>,
        roles: Vec<Role>,
        at: DateTime<Utc>,
    },
    LoginFailed {
        email: String,
        reason: String,
        at: DateTime<Utc>,
    },
    LoggedOut {
        user_ref: Option<String>,
        /// False if the backend logout call failed and only the local
        /// session was cleared.
        remote_acknowledged: bool,
        at: DateTime<Utc>,
    },

    // refresh cycle
    SessionRefreshed {
        user_ref: Option<String>,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    SessionExpired {
        user_ref: Option<String>,
        reason: String,
        at: DateTime<Utc>,
    },

    // startup
    SessionRestored {
        user_ref: Option<String>,
        at: DateTime<Utc>,
    },
    SessionDiscarded {
        reason: String,
        at: DateTime<Utc>,
    },
}

impl AuthEvent {
    /// Returns a dot-separated event name for logging/tracing.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoginSucceeded { .. } => "session.login.success",
            Self::LoginFailed { .. } => "session.login.failed",
            Self::LoggedOut { .. } => "session.logout",
            Self::SessionRefreshed { .. } => "session.refreshed",
            Self::SessionExpired { .. } => "session.expired",
            Self::SessionRestored { .. } => "session.restored",
            Self::SessionDiscarded { .. } => "session.discarded",
        }
    }

    /// Returns the timestamp when this event occurred.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::LoginSucceeded { at, .. }
            | Self::LoginFailed { at, .. }
            | Self::LoggedOut { at, .. }
            | Self::SessionRefreshed { at, .. }
            | Self::SessionExpired { at, .. }
            | Self::SessionRestored { at, .. }
            | Self::SessionDiscarded { at, .. } => *at,
        }
    }
}
