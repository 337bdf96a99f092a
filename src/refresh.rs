//! Token refresh coordination.
//!
//! At most one refresh exchange runs per store. The exchange is a shared
//! future parked in `pending`; callers arriving while it runs await a clone
//! of it instead of starting their own. A drop guard inside the exchange
//! empties the slot on every exit path (success, rejection, timeout, panic),
//! and because the slot holds a clone of the future, a later caller can
//! always drive an exchange whose original callers went away.
//!
//! The slot is tagged with the refresh token the exchange was started for.
//! Callers only join an exchange for the session that is stored now; once
//! that session is replaced, the next caller starts its own. Events are
//! dispatched after the slot is released, so listeners may call back into
//! the coordinator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::config::ClientConfig;
use crate::events::{AuthEvent, EventRegistry};
use crate::session::{Session, SessionStore};
use crate::{AuthBackend, AuthError, SecretString};

type PendingExchange = Shared<BoxFuture<'static, Result<(), AuthError>>>;

/// Result of an exchange and the event to announce once the slot is free.
type Outcome = (Result<(), AuthError>, Option<AuthEvent>);

struct Pending {
    id: u64,
    refresh_token: SecretString,
    exchange: PendingExchange,
}

/// Why a refresh is being considered.
enum Trigger<'a> {
    /// Refresh only if the access token is expired or inside the margin.
    Expiring,
    /// The backend refused this access token; refresh if it is still the
    /// stored one, whatever its claimed expiry.
    Rejected(&'a str),
}

/// Exchanges the refresh token for a new access token, one exchange at a
/// time.
///
/// Cheap to clone; clones share the in-flight exchange.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<SessionStore>,
    backend: Arc<dyn AuthBackend>,
    events: Arc<EventRegistry>,
    margin: chrono::Duration,
    timeout: Option<std::time::Duration>,
    pending: Mutex<Option<Pending>>,
    next_id: AtomicU64,
    exchanges: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<SessionStore>, backend: Arc<dyn AuthBackend>) -> Self {
        Self::with_config(
            store,
            backend,
            &ClientConfig::default(),
            Arc::new(EventRegistry::new()),
        )
    }

    pub fn with_config(
        store: Arc<SessionStore>,
        backend: Arc<dyn AuthBackend>,
        config: &ClientConfig,
        events: Arc<EventRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                backend,
                events,
                margin: config.refresh_margin,
                timeout: config
                    .refresh_timeout
                    .map(|t| t.to_std().unwrap_or(std::time::Duration::ZERO)),
                pending: Mutex::new(None),
                next_id: AtomicU64::new(0),
                exchanges: AtomicU64::new(0),
            }),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.inner.store
    }

    /// Number of refresh exchanges started so far.
    pub fn exchange_count(&self) -> u64 {
        self.inner.exchanges.load(Ordering::SeqCst)
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Returns a session whose access token is not about to expire,
    /// refreshing it first if needed.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` - no session, or the session has no refresh token
    /// - `SessionExpired` - the backend rejected the refresh token, or the
    ///   exchange timed out; the session has been cleared
    /// - `TransientNetworkFailure` - the exchange could not reach the
    ///   backend; the session is kept
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "ensure_fresh", skip_all, err)
    )]
    pub async fn ensure_fresh(&self) -> Result<Session, AuthError> {
        self.refresh(Trigger::Expiring).await
    }

    /// Refreshes even though the access token has not reached its claimed
    /// expiry, because the backend refused `stale_access_token`.
    ///
    /// If the stored token already differs from `stale_access_token`,
    /// another caller has refreshed in the meantime and the current session
    /// is returned as is.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "force_refresh", skip_all, err)
    )]
    pub async fn force_refresh(
        &self,
        stale_access_token: &SecretString,
    ) -> Result<Session, AuthError> {
        self.refresh(Trigger::Rejected(stale_access_token.expose_secret()))
            .await
    }

    /// Ends `session` after the backend refused freshly refreshed
    /// credentials. A session that was replaced in the meantime is kept.
    pub(crate) async fn expire(&self, session: &Session, reason: &str) {
        if let (_, Some(event)) = self.inner.expire(session, reason).await {
            self.inner.events.dispatch(event).await;
        }
    }

    async fn refresh(&self, trigger: Trigger<'_>) -> Result<Session, AuthError> {
        let exchange = {
            let mut slot = self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            let session = self.inner.store.get().ok_or(AuthError::Unauthenticated)?;
            if session.refresh_token().is_empty() {
                return Err(AuthError::Unauthenticated);
            }

            let joinable = slot
                .as_ref()
                .filter(|pending| {
                    pending.refresh_token.expose_secret()
                        == session.refresh_token().expose_secret()
                })
                .map(|pending| pending.exchange.clone());

            if let Some(exchange) = joinable {
                log::debug!(target: "ats_session", "msg=\"joining in-flight refresh\"");
                exchange
            } else {
                if slot.take().is_some() {
                    log::debug!(
                        target: "ats_session",
                        "msg=\"in-flight refresh belongs to a replaced session\""
                    );
                    self.inner.store.set_refreshing(false);
                }

                let needed = match trigger {
                    Trigger::Expiring => session.expires_within(self.inner.margin),
                    Trigger::Rejected(stale) => session.access_token().expose_secret() == stale,
                };
                if !needed {
                    return Ok(session);
                }

                let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
                let refresh_token = session.refresh_token().clone();
                let exchange = Inner::exchange(Arc::clone(&self.inner), id, session)
                    .boxed()
                    .shared();
                *slot = Some(Pending {
                    id,
                    refresh_token,
                    exchange: exchange.clone(),
                });
                self.inner.store.set_refreshing(true);
                exchange
            }
        };

        exchange.await?;
        self.inner.store.get().ok_or(AuthError::Unauthenticated)
    }
}

impl Inner {
    async fn exchange(inner: Arc<Inner>, id: u64, session: Session) -> Result<(), AuthError> {
        let release = ReleasePending { inner: &inner, id };
        let (result, event) = inner.run_exchange(&session).await;
        drop(release);

        if let Some(event) = event {
            inner.events.dispatch(event).await;
        }
        result
    }

    async fn run_exchange(&self, session: &Session) -> Outcome {
        self.exchanges.fetch_add(1, Ordering::SeqCst);

        let refresh_token = session.refresh_token().clone();
        let call = self.backend.refresh(&refresh_token);
        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(AuthError::Timeout)),
            None => call.await,
        };

        let grant = match outcome {
            Ok(grant) => grant,
            Err(AuthError::TransientNetworkFailure(msg)) => {
                log::warn!(
                    target: "ats_session",
                    "msg=\"refresh could not reach backend\" error=\"{msg}\""
                );
                return (Err(AuthError::TransientNetworkFailure(msg)), None);
            }
            Err(err) => return self.expire(session, &err.to_string()).await,
        };

        let next = match session.refreshed(
            grant.access_token,
            grant.refresh_token,
            self.store.decoder(),
        ) {
            Ok(next) => next,
            Err(_) => return self.expire(session, "refreshed token does not decode").await,
        };
        let expires_at = next.expires_at();

        match self
            .store
            .set_if_current(refresh_token.expose_secret(), next)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                log::debug!(
                    target: "ats_session",
                    "msg=\"session replaced during refresh, discarding result\""
                );
                return (Ok(()), None);
            }
            Err(err) => {
                log::warn!(
                    target: "ats_session",
                    "msg=\"refreshed session not persisted\" error=\"{err}\""
                );
            }
        }

        log::info!(target: "ats_session", "msg=\"session refreshed\"");
        let event = AuthEvent::SessionRefreshed {
            user_ref: session.user_ref().map(ToOwned::to_owned),
            expires_at,
            at: Utc::now(),
        };
        (Ok(()), Some(event))
    }

    /// Clears the session after an irrecoverable refresh failure. Nothing is
    /// cleared, and no event is returned, if `session` was replaced.
    async fn expire(&self, session: &Session, reason: &str) -> Outcome {
        match self
            .store
            .clear_if_current(session.refresh_token().expose_secret())
            .await
        {
            Ok(false) => return (Ok(()), None),
            Ok(true) => {}
            Err(err) => {
                log::warn!(
                    target: "ats_session",
                    "msg=\"failed to remove expired session record\" error=\"{err}\""
                );
            }
        }

        log::info!(
            target: "ats_session",
            "msg=\"session expired\" reason=\"{reason}\""
        );
        let event = AuthEvent::SessionExpired {
            user_ref: session.user_ref().map(ToOwned::to_owned),
            reason: reason.to_owned(),
            at: Utc::now(),
        };
        (Err(AuthError::SessionExpired), Some(event))
    }
}

/// Empties the pending slot when the exchange that owns it finishes.
struct ReleasePending<'a> {
    inner: &'a Inner,
    id: u64,
}

impl Drop for ReleasePending<'_> {
    fn drop(&mut self) {
        let released = {
            let mut slot = self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(pending) if pending.id == self.id => slot.take(),
                _ => None,
            }
        };
        if released.is_some() {
            self.inner.store.set_refreshing(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::Duration;

    use super::*;
    use crate::SessionState;
    use crate::backend::{MockAccount, MockAuthBackend, RefreshBehavior};
    use crate::events::Listener;
    use crate::jwt::ClaimsDecoder;
    use crate::session::InMemorySessionStorage;

    fn account() -> MockAccount {
        MockAccount::new("rita@example.com", "pw", &["RECRUITER"], Some("acme"))
    }

    /// Calls back into the coordinator from inside event dispatch.
    struct Reenter {
        coordinator: Arc<OnceLock<RefreshCoordinator>>,
        seen: Arc<Mutex<Vec<(&'static str, Result<Session, AuthError>)>>>,
    }

    #[async_trait]
    impl Listener for Reenter {
        async fn handle(&self, event: &AuthEvent) {
            if let Some(coordinator) = self.coordinator.get() {
                let result = coordinator.ensure_fresh().await;
                self.seen.lock().unwrap().push((event.name(), result));
            }
        }
    }

    fn setup(config: &ClientConfig) -> (MockAuthBackend, Arc<SessionStore>, RefreshCoordinator) {
        setup_with_events(config, EventRegistry::new())
    }

    fn setup_with_events(
        config: &ClientConfig,
        events: EventRegistry,
    ) -> (MockAuthBackend, Arc<SessionStore>, RefreshCoordinator) {
        let backend = MockAuthBackend::new().with_account(account());
        let store = Arc::new(SessionStore::new(
            InMemorySessionStorage::new(),
            ClaimsDecoder::unverified(),
        ));
        let coordinator = RefreshCoordinator::with_config(
            Arc::clone(&store),
            Arc::new(backend.clone()),
            config,
            Arc::new(events),
        );
        (backend, store, coordinator)
    }

    fn reentrant_setup() -> (
        MockAuthBackend,
        Arc<SessionStore>,
        RefreshCoordinator,
        Arc<Mutex<Vec<(&'static str, Result<Session, AuthError>)>>>,
    ) {
        let handle = Arc::new(OnceLock::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut events = EventRegistry::new();
        events.listen(Reenter {
            coordinator: Arc::clone(&handle),
            seen: Arc::clone(&seen),
        });
        let (backend, store, coordinator) = setup_with_events(&ClientConfig::default(), events);
        let _ = handle.set(coordinator.clone());
        (backend, store, coordinator, seen)
    }

    async fn sign_in(backend: &MockAuthBackend, store: &SessionStore, ttl: Duration) -> Session {
        sign_in_as(backend, store, &account(), ttl).await
    }

    async fn sign_in_as(
        backend: &MockAuthBackend,
        store: &SessionStore,
        account: &MockAccount,
        ttl: Duration,
    ) -> Session {
        let grant = backend.issue_tokens(account, ttl);
        let session =
            Session::from_tokens(grant.access_token, grant.refresh_token, store.decoder()).unwrap();
        store.set(session.clone()).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_fresh_token_needs_no_exchange() {
        let (backend, store, coordinator) = setup(&ClientConfig::default());
        let session = sign_in(&backend, &store, Duration::minutes(10)).await;

        let fresh = coordinator.ensure_fresh().await.unwrap();

        assert_eq!(fresh, session);
        assert_eq!(backend.refresh_calls(), 0);
        assert_eq!(coordinator.exchange_count(), 0);
    }

    #[tokio::test]
    async fn test_no_session_is_unauthenticated() {
        let (backend, _store, coordinator) = setup(&ClientConfig::default());

        let result = coordinator.ensure_fresh().await;

        assert_eq!(result.unwrap_err(), AuthError::Unauthenticated);
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_is_unauthenticated() {
        let (backend, store, coordinator) = setup(&ClientConfig::default());
        let grant = backend.issue_tokens(&account(), -Duration::seconds(10));
        let session =
            Session::from_tokens(grant.access_token, SecretString::new(""), store.decoder())
                .unwrap();
        store.set(session).await.unwrap();

        assert_eq!(
            coordinator.ensure_fresh().await.unwrap_err(),
            AuthError::Unauthenticated
        );
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once() {
        let (backend, store, coordinator) = setup(&ClientConfig::default());
        let stale = sign_in(&backend, &store, -Duration::seconds(10)).await;

        let fresh = coordinator.ensure_fresh().await.unwrap();

        assert_eq!(backend.refresh_calls(), 1);
        assert_ne!(fresh.access_token(), stale.access_token());
        assert!(!fresh.is_expired());
        assert_eq!(store.get(), Some(fresh));
        assert!(!coordinator.is_refreshing());
        assert_eq!(store.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_token_inside_margin_is_refreshed() {
        let config = ClientConfig::default().with_refresh_margin(Duration::seconds(30));
        let (backend, store, coordinator) = setup(&config);
        sign_in(&backend, &store, Duration::seconds(5)).await;

        coordinator.ensure_fresh().await.unwrap();

        assert_eq!(backend.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_exchange() {
        let (backend, store, coordinator) = setup(&ClientConfig::default());
        backend.set_refresh_delay(Some(StdDuration::from_millis(50)));
        sign_in(&backend, &store, -Duration::seconds(10)).await;

        let results =
            futures::future::join_all((0..5).map(|_| coordinator.ensure_fresh())).await;

        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(coordinator.exchange_count(), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert_eq!(result.as_ref().unwrap(), first);
        }
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_state_is_refreshing_while_in_flight() {
        let (backend, store, coordinator) = setup(&ClientConfig::default());
        backend.set_refresh_delay(Some(StdDuration::from_millis(50)));
        sign_in(&backend, &store, -Duration::seconds(10)).await;

        let observe = async {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            store.state()
        };
        let (result, observed) = tokio::join!(coordinator.ensure_fresh(), observe);

        result.unwrap();
        assert_eq!(observed, SessionState::Refreshing);
        assert_eq!(store.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_session() {
        let (backend, store, coordinator) = setup(&ClientConfig::default());
        backend.set_refresh_behavior(RefreshBehavior::Reject);
        sign_in(&backend, &store, -Duration::seconds(10)).await;

        let result = coordinator.ensure_fresh().await;

        assert_eq!(result.unwrap_err(), AuthError::SessionExpired);
        assert!(store.get().is_none());
        assert_eq!(backend.refresh_calls(), 1);

        // not retried: the next call has no session to refresh
        assert_eq!(
            coordinator.ensure_fresh().await.unwrap_err(),
            AuthError::Unauthenticated
        );
        assert_eq!(backend.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_treated_as_rejection() {
        let config = ClientConfig::default()
            .with_refresh_timeout(Some(Duration::milliseconds(20)));
        let (backend, store, coordinator) = setup(&config);
        backend.set_refresh_delay(Some(StdDuration::from_secs(5)));
        sign_in(&backend, &store, -Duration::seconds(10)).await;

        let result = coordinator.ensure_fresh().await;

        assert_eq!(result.unwrap_err(), AuthError::SessionExpired);
        assert!(store.get().is_none());
        assert!(!coordinator.is_refreshing());

        // the handle was released: a new session refreshes normally
        backend.set_refresh_delay(None);
        sign_in(&backend, &store, -Duration::seconds(10)).await;
        assert!(coordinator.ensure_fresh().await.is_ok());
        assert_eq!(coordinator.exchange_count(), 2);
    }

    #[tokio::test]
    async fn test_backend_timeout_error_expires_session() {
        let (backend, store, coordinator) = setup(&ClientConfig::default());
        backend.set_refresh_behavior(RefreshBehavior::Timeout);
        sign_in(&backend, &store, -Duration::seconds(10)).await;

        assert_eq!(
            coordinator.ensure_fresh().await.unwrap_err(),
            AuthError::SessionExpired
        );
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_network_failure_keeps_session() {
        let (backend, store, coordinator) = setup(&ClientConfig::default());
        backend.set_refresh_behavior(RefreshBehavior::NetworkFailure);
        let session = sign_in(&backend, &store, -Duration::seconds(10)).await;

        let result = coordinator.ensure_fresh().await;

        assert!(matches!(
            result,
            Err(AuthError::TransientNetworkFailure(_))
        ));
        assert_eq!(store.get(), Some(session));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_force_refresh_ignores_claimed_expiry() {
        let (backend, store, coordinator) = setup(&ClientConfig::default());
        let session = sign_in(&backend, &store, Duration::minutes(10)).await;

        let fresh = coordinator
            .force_refresh(session.access_token())
            .await
            .unwrap();

        assert_eq!(backend.refresh_calls(), 1);
        assert_ne!(fresh.access_token(), session.access_token());
    }

    #[tokio::test]
    async fn test_force_refresh_with_outdated_token_skips_exchange() {
        let (backend, store, coordinator) = setup(&ClientConfig::default());
        let current = sign_in(&backend, &store, Duration::minutes(10)).await;

        let result = coordinator
            .force_refresh(&SecretString::new("an-older-token"))
            .await
            .unwrap();

        assert_eq!(result, current);
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_stored() {
        let (backend, store, coordinator) = setup(&ClientConfig::default());
        backend.set_rotate_refresh_tokens(true);
        let stale = sign_in(&backend, &store, -Duration::seconds(10)).await;

        let fresh = coordinator.ensure_fresh().await.unwrap();

        assert_ne!(fresh.refresh_token(), stale.refresh_token());
        assert_eq!(store.get().unwrap().refresh_token(), fresh.refresh_token());
    }

    #[tokio::test]
    async fn test_logout_during_refresh_is_not_undone() {
        let (backend, store, coordinator) = setup(&ClientConfig::default());
        backend.set_refresh_delay(Some(StdDuration::from_millis(50)));
        sign_in(&backend, &store, -Duration::seconds(10)).await;

        let logout = async {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            store.clear().await.unwrap();
        };
        let (result, ()) = tokio::join!(coordinator.ensure_fresh(), logout);

        assert_eq!(result.unwrap_err(), AuthError::Unauthenticated);
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_listener_can_reenter_after_refresh() {
        let (backend, store, coordinator, seen) = reentrant_setup();
        sign_in(&backend, &store, -Duration::seconds(10)).await;

        let fresh = tokio::time::timeout(StdDuration::from_secs(2), coordinator.ensure_fresh())
            .await
            .expect("refresh did not complete")
            .unwrap();

        assert!(!coordinator.is_refreshing());
        assert_eq!(store.state(), SessionState::Active);
        assert_eq!(backend.refresh_calls(), 1);
        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].0, "session.refreshed");
            assert_eq!(seen[0].1.as_ref().unwrap(), &fresh);
        }

        let later = tokio::time::timeout(StdDuration::from_secs(2), coordinator.ensure_fresh())
            .await
            .expect("later call did not complete");
        assert_eq!(later.unwrap(), fresh);
    }

    #[tokio::test]
    async fn test_listener_can_reenter_after_expiry() {
        let (backend, store, coordinator, seen) = reentrant_setup();
        backend.set_refresh_behavior(RefreshBehavior::Reject);
        sign_in(&backend, &store, -Duration::seconds(10)).await;

        let result = tokio::time::timeout(StdDuration::from_secs(2), coordinator.ensure_fresh())
            .await
            .expect("refresh did not complete");

        assert_eq!(result.unwrap_err(), AuthError::SessionExpired);
        assert!(!coordinator.is_refreshing());
        assert_eq!(store.state(), SessionState::Unauthenticated);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("session.expired", Err(AuthError::Unauthenticated))]
        );
    }

    #[tokio::test]
    async fn test_refresh_for_replaced_session_is_not_joined() {
        let (backend, store, coordinator) = setup(&ClientConfig::default());
        backend.set_refresh_delay(Some(StdDuration::from_millis(50)));
        sign_in(&backend, &store, -Duration::seconds(10)).await;
        let other = MockAccount::new("omar@example.com", "pw", &["MANAGER"], Some("acme"));

        let relogin = async {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            store.clear().await.unwrap();
            let next = sign_in_as(&backend, &store, &other, Duration::minutes(10)).await;
            let refreshed = coordinator.force_refresh(next.access_token()).await;
            (next, refreshed)
        };
        let (first, (next, refreshed)) = tokio::join!(coordinator.ensure_fresh(), relogin);

        let refreshed = refreshed.unwrap();
        assert_ne!(refreshed.access_token(), next.access_token());
        assert_eq!(refreshed.user_ref(), next.user_ref());
        assert_eq!(backend.refresh_calls(), 2);
        assert_eq!(coordinator.exchange_count(), 2);
        assert_eq!(store.get(), Some(refreshed));
        assert!(first.is_ok());
        assert!(!coordinator.is_refreshing());
    }
}
