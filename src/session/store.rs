use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use futures::lock::Mutex;

use super::record::SessionRecord;
use super::storage::SessionStorage;
use super::{Session, SessionState};
use crate::AuthError;
use crate::jwt::ClaimsDecoder;

/// Default key under which the session record is persisted.
pub const DEFAULT_STORAGE_KEY: &str = "ats_session";

/// Single source of truth for the current [`Session`].
///
/// Reads are synchronous and served from memory. Writes go through
/// [`set`](Self::set) and [`clear`](Self::clear), which are serialized so
/// that memory and durable storage never disagree about which write came
/// last.
pub struct SessionStore {
    current: RwLock<Option<Session>>,
    storage: Box<dyn SessionStorage>,
    key: String,
    decoder: ClaimsDecoder,
    writes: Mutex<()>,
    refreshing: AtomicBool,
}

impl SessionStore {
    pub fn new(storage: impl SessionStorage + 'static, decoder: ClaimsDecoder) -> Self {
        Self::with_key(storage, decoder, DEFAULT_STORAGE_KEY)
    }

    pub fn with_key(
        storage: impl SessionStorage + 'static,
        decoder: ClaimsDecoder,
        key: impl Into<String>,
    ) -> Self {
        Self {
            current: RwLock::new(None),
            storage: Box::new(storage),
            key: key.into(),
            decoder,
            writes: Mutex::new(()),
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn decoder(&self) -> &ClaimsDecoder {
        &self.decoder
    }

    /// Returns the current session, if any.
    pub fn get(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn state(&self) -> SessionState {
        if !self.is_authenticated() {
            SessionState::Unauthenticated
        } else if self.refreshing.load(Ordering::Acquire) {
            SessionState::Refreshing
        } else {
            SessionState::Active
        }
    }

    pub(crate) fn set_refreshing(&self, refreshing: bool) {
        self.refreshing.store(refreshing, Ordering::Release);
    }

    /// Replaces the current session and persists it.
    ///
    /// The in-memory session is replaced even if persisting fails; the error
    /// then only means the session will not survive a restart.
    pub async fn set(&self, session: Session) -> Result<(), AuthError> {
        let _write = self.writes.lock().await;
        let json = SessionRecord::from_session(&session).to_json()?;
        self.replace(Some(session));
        self.storage.write(&self.key, &json).await
    }

    /// Replaces the session only if the stored refresh token is still
    /// `expected_refresh_token`.
    ///
    /// Returns `Ok(false)` without writing if the session was cleared or
    /// replaced in the meantime.
    pub(crate) async fn set_if_current(
        &self,
        expected_refresh_token: &str,
        session: Session,
    ) -> Result<bool, AuthError> {
        let _write = self.writes.lock().await;
        let still_current = self
            .get()
            .is_some_and(|s| s.refresh_token().expose_secret() == expected_refresh_token);
        if !still_current {
            return Ok(false);
        }

        let json = SessionRecord::from_session(&session).to_json()?;
        self.replace(Some(session));
        self.storage.write(&self.key, &json).await?;
        Ok(true)
    }

    /// Removes the session from memory and durable storage.
    pub async fn clear(&self) -> Result<(), AuthError> {
        let _write = self.writes.lock().await;
        self.replace(None);
        self.storage.remove(&self.key).await
    }

    /// Clears only if the stored refresh token is still `expected_refresh_token`.
    pub(crate) async fn clear_if_current(
        &self,
        expected_refresh_token: &str,
    ) -> Result<bool, AuthError> {
        let _write = self.writes.lock().await;
        let still_current = self
            .get()
            .is_some_and(|s| s.refresh_token().expose_secret() == expected_refresh_token);
        if !still_current {
            return Ok(false);
        }

        self.replace(None);
        self.storage.remove(&self.key).await?;
        Ok(true)
    }

    /// Restores the persisted session. Call once at process start.
    ///
    /// Returns `Ok(None)` if nothing is stored. An unusable record is
    /// removed and reported as `AuthError::CorruptSession`; the store is
    /// then unauthenticated and fully usable.
    pub async fn load(&self) -> Result<Option<Session>, AuthError> {
        let raw = match self.storage.read(&self.key).await? {
            Some(raw) => raw,
            None => {
                self.replace(None);
                return Ok(None);
            }
        };

        match SessionRecord::parse(&raw, &self.decoder) {
            Ok(session) => {
                self.replace(Some(session.clone()));
                Ok(Some(session))
            }
            Err(err) => {
                log::warn!(
                    target: "ats_session",
                    "msg=\"discarding persisted session\" reason=\"{err}\""
                );
                if let Err(clear_err) = self.clear().await {
                    log::warn!(
                        target: "ats_session",
                        "msg=\"failed to remove corrupt session record\" error=\"{clear_err}\""
                    );
                }
                Err(err)
            }
        }
    }

    fn replace(&self, session: Option<Session>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = session;
    }
}
