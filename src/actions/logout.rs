use std::sync::Arc;

use chrono::Utc;

use crate::events::{AuthEvent, EventRegistry};
use crate::{AuthBackend, AuthError, SessionStore};

/// Ends the current session.
///
/// The backend call is best effort: the local session is cleared whether or
/// not the backend acknowledged the logout.
pub struct LogoutAction<B: AuthBackend> {
    backend: B,
    store: Arc<SessionStore>,
    events: Arc<EventRegistry>,
}

impl<B: AuthBackend> LogoutAction<B> {
    pub fn new(backend: B, store: Arc<SessionStore>) -> Self {
        Self::with_events(backend, store, Arc::new(EventRegistry::new()))
    }

    pub fn with_events(backend: B, store: Arc<SessionStore>, events: Arc<EventRegistry>) -> Self {
        LogoutAction {
            backend,
            store,
            events,
        }
    }

    /// # Returns
    ///
    /// - `Ok(())` - no session remains, in memory or in storage
    /// - `Err(AuthError::StorageError)` - the in-memory session is gone but
    ///   the persisted record could not be removed
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "logout", skip_all, err)
    )]
    pub async fn execute(&self) -> Result<(), AuthError> {
        let Some(session) = self.store.get() else {
            return self.store.clear().await;
        };

        let remote_acknowledged = match self.backend.logout(session.access_token()).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!(
                    target: "ats_session",
                    "msg=\"backend logout failed, clearing locally\" error=\"{err}\""
                );
                false
            }
        };

        let cleared = self.store.clear().await;

        log::info!(
            target: "ats_session",
            "msg=\"logout success\""
        );
        self.events
            .dispatch(AuthEvent::LoggedOut {
                user_ref: session.user_ref().map(ToOwned::to_owned),
                remote_acknowledged,
                at: Utc::now(),
            })
            .await;

        cleared
    }
}
