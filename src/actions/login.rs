use std::sync::Arc;

use chrono::Utc;

use crate::events::{AuthEvent, EventRegistry};
use crate::{AuthBackend, AuthError, Credentials, Session, SessionStore};

pub struct LoginAction<B: AuthBackend> {
    backend: B,
    store: Arc<SessionStore>,
    events: Arc<EventRegistry>,
}

impl<B: AuthBackend> LoginAction<B> {
    pub fn new(backend: B, store: Arc<SessionStore>) -> Self {
        Self::with_events(backend, store, Arc::new(EventRegistry::new()))
    }

    pub fn with_events(backend: B, store: Arc<SessionStore>, events: Arc<EventRegistry>) -> Self {
        LoginAction {
            backend,
            store,
            events,
        }
    }

    /// Signs in and makes the resulting session current.
    ///
    /// A session that cannot be persisted is still kept in memory; it only
    /// won't survive a restart.
    ///
    /// # Returns
    ///
    /// - `Ok(Session)` - the new session
    /// - `Err(AuthError::InvalidCredentials)` - the backend refused the credentials
    /// - `Err(AuthError::TokenInvalid)` - the issued access token cannot be
    ///   decoded; the store is left untouched
    /// - `Err(AuthError::TransientNetworkFailure)` / `Err(AuthError::Timeout)` -
    ///   the backend could not be reached
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "login", skip_all, err)
    )]
    pub async fn execute(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let grant = match self.backend.authenticate(credentials).await {
            Ok(grant) => grant,
            Err(err) => return Err(self.fail(credentials, err).await),
        };

        let session = match Session::from_tokens(
            grant.access_token,
            grant.refresh_token,
            self.store.decoder(),
        ) {
            Ok(session) => session,
            Err(err) => return Err(self.fail(credentials, err).await),
        };

        if let Err(err) = self.store.set(session.clone()).await {
            log::warn!(
                target: "ats_session",
                "msg=\"session not persisted\" error=\"{err}\""
            );
        }

        log::info!(
            target: "ats_session",
            "msg=\"login success\" tenant=\"{}\"",
            session.tenant_id().unwrap_or("-")
        );
        self.events
            .dispatch(AuthEvent::LoginSucceeded {
                user_ref: session.user_ref().map(ToOwned::to_owned),
                tenant_id: session.tenant_id().map(ToOwned::to_owned),
                roles: session.roles().iter().cloned().collect(),
                at: Utc::now(),
            })
            .await;

        Ok(session)
    }

    async fn fail(&self, credentials: &Credentials, err: AuthError) -> AuthError {
        log::info!(
            target: "ats_session",
            "msg=\"login failed\" reason=\"{err}\""
        );
        self.events
            .dispatch(AuthEvent::LoginFailed {
                email: credentials.email.clone(),
                reason: err.to_string(),
                at: Utc::now(),
            })
            .await;
        err
    }
}
