//! Role-gated navigation.
//!
//! The guard answers from the claims cached in the session store. It never
//! refreshes or calls the backend, so a role revoked server-side is still
//! honored until the next token refresh replaces the claims.

mod routes;

use std::sync::Arc;

pub use routes::{Access, RouteTable, home_path};

use crate::{AuthError, Role, SessionStore};

/// Why navigation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No session; send the user to the login page.
    Unauthenticated,
    /// Signed in, but none of the required roles.
    InsufficientRole,
}

/// Outcome of a guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }

    /// Converts a denial into the matching error.
    pub fn into_result(self) -> Result<(), AuthError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(DenyReason::Unauthenticated) => Err(AuthError::Unauthenticated),
            Self::Deny(DenyReason::InsufficientRole) => Err(AuthError::AuthorizationDenied),
        }
    }
}

/// Checks the current session's roles against a destination.
#[derive(Clone)]
pub struct RouteGuard {
    store: Arc<SessionStore>,
    routes: RouteTable,
}

impl RouteGuard {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self::with_routes(store, RouteTable::ats())
    }

    pub fn with_routes(store: Arc<SessionStore>, routes: RouteTable) -> Self {
        Self { store, routes }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Allows navigation if a session exists and holds at least one of
    /// `required_roles`. An empty list admits any signed-in user.
    pub fn authorize(&self, required_roles: &[Role]) -> Decision {
        let Some(session) = self.store.get() else {
            log::debug!(target: "ats_session", "msg=\"navigation denied, no session\"");
            return Decision::Deny(DenyReason::Unauthenticated);
        };

        if required_roles.is_empty() || session.has_any_role(required_roles) {
            return Decision::Allow;
        }

        log::debug!(
            target: "ats_session",
            "msg=\"navigation denied, insufficient role\" required=\"{}\"",
            required_roles
                .iter()
                .map(Role::as_str)
                .collect::<Vec<_>>()
                .join(",")
        );
        Decision::Deny(DenyReason::InsufficientRole)
    }

    /// Looks up `path` in the route table and checks it.
    pub fn authorize_path(&self, path: &str) -> Decision {
        match self.routes.access_for(path) {
            Access::Public => Decision::Allow,
            Access::Authenticated => self.authorize(&[]),
            Access::Roles(roles) => self.authorize(roles),
        }
    }

    /// Where to send the user after a denial: the login page without a
    /// session, their own dashboard otherwise. `None` for `Allow`.
    pub fn redirect_for(&self, decision: Decision) -> Option<String> {
        match decision {
            Decision::Allow => None,
            Decision::Deny(DenyReason::Unauthenticated) => Some(self.routes.login_path().to_owned()),
            Decision::Deny(DenyReason::InsufficientRole) => Some(
                self.store
                    .get()
                    .map_or_else(|| self.routes.login_path().to_owned(), |s| home_path(&s).to_owned()),
            ),
        }
    }
}
