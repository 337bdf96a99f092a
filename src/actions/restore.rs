use std::sync::Arc;

use chrono::Utc;

use crate::events::{AuthEvent, EventRegistry};
use crate::{AuthError, RefreshCoordinator, Session};

/// What startup found in durable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// A session was restored and its access token is fresh.
    Restored(Session),
    /// Nothing was stored.
    NoSession,
    /// A record was stored but could not be used; it has been removed. The
    /// error says why (`CorruptSession`, `SessionExpired` or
    /// `Unauthenticated`).
    Discarded(AuthError),
}

/// Restores the persisted session at process start and brings it up to
/// date.
pub struct RestoreSessionAction {
    coordinator: RefreshCoordinator,
    events: Arc<EventRegistry>,
}

impl RestoreSessionAction {
    pub fn new(coordinator: RefreshCoordinator) -> Self {
        Self::with_events(coordinator, Arc::new(EventRegistry::new()))
    }

    pub fn with_events(coordinator: RefreshCoordinator, events: Arc<EventRegistry>) -> Self {
        RestoreSessionAction {
            coordinator,
            events,
        }
    }

    /// Loads the stored session and refreshes it if it expired while the
    /// client was not running.
    ///
    /// # Returns
    ///
    /// - `Ok(RestoreOutcome)` - the client is in a usable state, signed in
    ///   or not
    /// - `Err(AuthError::StorageError)` - durable storage could not be read
    /// - `Err(AuthError::TransientNetworkFailure)` - the refresh could not
    ///   reach the backend; the restored session is kept
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "restore_session", skip_all, err)
    )]
    pub async fn execute(&self) -> Result<RestoreOutcome, AuthError> {
        let store = self.coordinator.store();

        match store.load().await {
            Ok(Some(_)) => {}
            Ok(None) => return Ok(RestoreOutcome::NoSession),
            Err(err @ AuthError::CorruptSession(_)) => return Ok(self.discard(err).await),
            Err(err) => return Err(err),
        }

        match self.coordinator.ensure_fresh().await {
            Ok(session) => {
                log::info!(target: "ats_session", "msg=\"session restored\"");
                self.events
                    .dispatch(AuthEvent::SessionRestored {
                        user_ref: session.user_ref().map(ToOwned::to_owned),
                        at: Utc::now(),
                    })
                    .await;
                Ok(RestoreOutcome::Restored(session))
            }
            Err(AuthError::SessionExpired) => Ok(self.discard(AuthError::SessionExpired).await),
            Err(AuthError::Unauthenticated) => {
                // stored without a refresh token
                store.clear().await?;
                Ok(self.discard(AuthError::Unauthenticated).await)
            }
            Err(err) => Err(err),
        }
    }

    async fn discard(&self, reason: AuthError) -> RestoreOutcome {
        log::info!(
            target: "ats_session",
            "msg=\"stored session discarded\" reason=\"{reason}\""
        );
        self.events
            .dispatch(AuthEvent::SessionDiscarded {
                reason: reason.to_string(),
                at: Utc::now(),
            })
            .await;
        RestoreOutcome::Discarded(reason)
    }
}
