#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header};

use super::{AuthBackend, Credentials, RefreshGrant, TokenGrant};
use crate::{AuthError, SecretString};

const MOCK_SIGNING_KEY: &[u8] = b"mock-backend-signing-key-32-bytes!";

/// A user known to [`MockAuthBackend`].
#[derive(Debug, Clone)]
pub struct MockAccount {
    pub email: String,
    pub password: String,
    pub user_ref: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub tenant_id: Option<String>,
}

impl MockAccount {
    pub fn new(email: &str, password: &str, roles: &[&str], tenant_id: Option<&str>) -> Self {
        Self {
            email: email.to_owned(),
            password: password.to_owned(),
            user_ref: format!("user-{email}"),
            roles: roles.iter().map(|r| (*r).to_owned()).collect(),
            permissions: Vec::new(),
            tenant_id: tenant_id.map(ToOwned::to_owned),
        }
    }
}

/// What the next refresh exchanges do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshBehavior {
    /// Issue a new access token for a known refresh token.
    Issue,
    /// Reject every refresh token.
    Reject,
    /// Fail as if the network dropped.
    NetworkFailure,
    /// Report a deadline overrun.
    Timeout,
}

struct MockState {
    accounts: Mutex<Vec<MockAccount>>,
    refresh_tokens: Mutex<HashMap<String, MockAccount>>,
    live_access_tokens: Mutex<HashSet<String>>,
    behavior: Mutex<RefreshBehavior>,
    delay: Mutex<Option<std::time::Duration>>,
    access_ttl: Mutex<Duration>,
    rotate: AtomicBool,
    fail_logout: AtomicBool,
    login_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    next_id: AtomicUsize,
}

/// In-memory backend issuing real (HS256) JWTs.
///
/// Clones share state, so a test can keep a handle for assertions after
/// handing a clone to the client.
#[derive(Clone)]
pub struct MockAuthBackend {
    state: Arc<MockState>,
}

impl Default for MockAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                accounts: Mutex::new(Vec::new()),
                refresh_tokens: Mutex::new(HashMap::new()),
                live_access_tokens: Mutex::new(HashSet::new()),
                behavior: Mutex::new(RefreshBehavior::Issue),
                delay: Mutex::new(None),
                access_ttl: Mutex::new(Duration::minutes(15)),
                rotate: AtomicBool::new(false),
                fail_logout: AtomicBool::new(false),
                login_calls: AtomicUsize::new(0),
                refresh_calls: AtomicUsize::new(0),
                logout_calls: AtomicUsize::new(0),
                next_id: AtomicUsize::new(0),
            }),
        }
    }

    #[must_use]
    pub fn with_account(self, account: MockAccount) -> Self {
        self.state.accounts.lock().unwrap().push(account);
        self
    }

    pub fn set_refresh_behavior(&self, behavior: RefreshBehavior) {
        *self.state.behavior.lock().unwrap() = behavior;
    }

    /// Delays every refresh exchange, to widen concurrency windows.
    pub fn set_refresh_delay(&self, delay: Option<std::time::Duration>) {
        *self.state.delay.lock().unwrap() = delay;
    }

    /// Lifetime of issued access tokens (negative issues expired ones).
    pub fn set_access_ttl(&self, ttl: Duration) {
        *self.state.access_ttl.lock().unwrap() = ttl;
    }

    /// Rotate refresh tokens on every exchange.
    pub fn set_rotate_refresh_tokens(&self, rotate: bool) {
        self.state.rotate.store(rotate, Ordering::SeqCst);
    }

    pub fn set_fail_logout(&self, fail: bool) {
        self.state.fail_logout.store(fail, Ordering::SeqCst);
    }

    /// Server-side revocation of every access token issued so far.
    pub fn revoke_access_tokens(&self) {
        self.state.live_access_tokens.lock().unwrap().clear();
    }

    /// Returns true if `token` was issued here, is not revoked and has not
    /// expired.
    pub fn accepts_access_token(&self, token: &str) -> bool {
        if !self.state.live_access_tokens.lock().unwrap().contains(token) {
            return false;
        }
        let mut validation = jsonwebtoken::Validation::default();
        validation.leeway = 0;
        jsonwebtoken::decode::<serde_json::Value>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(MOCK_SIGNING_KEY),
            &validation,
        )
        .is_ok()
    }

    /// Issues a token pair for `account` without going through login.
    pub fn issue_tokens(&self, account: &MockAccount, access_ttl: Duration) -> TokenGrant {
        let access_token = self.mint_access_token(account, access_ttl);
        let refresh_token = self.mint_refresh_token(account);
        TokenGrant {
            access_token: SecretString::new(access_token),
            refresh_token: SecretString::new(refresh_token),
        }
    }

    pub fn login_calls(&self) -> usize {
        self.state.login_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.state.logout_calls.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> usize {
        self.state.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn mint_access_token(&self, account: &MockAccount, ttl: Duration) -> String {
        let now = Utc::now();
        let claims = serde_json::json!({
            "sub": account.user_ref,
            "iat": now.timestamp(),
            "exp": (now + ttl).timestamp(),
            "roles": account.roles,
            "permissions": account.permissions,
            "tenant_id": account.tenant_id,
            "jti": self.next_id(),
        });
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(MOCK_SIGNING_KEY),
        )
        .unwrap();
        self.state
            .live_access_tokens
            .lock()
            .unwrap()
            .insert(token.clone());
        token
    }

    fn mint_refresh_token(&self, account: &MockAccount) -> String {
        let token = format!("refresh-{}-{}", account.user_ref, self.next_id());
        self.state
            .refresh_tokens
            .lock()
            .unwrap()
            .insert(token.clone(), account.clone());
        token
    }
}

#[async_trait]
impl AuthBackend for MockAuthBackend {
    async fn authenticate(&self, credentials: &Credentials) -> Result<TokenGrant, AuthError> {
        self.state.login_calls.fetch_add(1, Ordering::SeqCst);

        let account = self
            .state
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|a| {
                a.email == credentials.email && a.password == credentials.password.expose_secret()
            })
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;

        let ttl = *self.state.access_ttl.lock().unwrap();
        Ok(self.issue_tokens(&account, ttl))
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<RefreshGrant, AuthError> {
        self.state.refresh_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let behavior = *self.state.behavior.lock().unwrap();
        match behavior {
            RefreshBehavior::Issue => {}
            RefreshBehavior::Reject => return Err(AuthError::TokenInvalid),
            RefreshBehavior::NetworkFailure => {
                return Err(AuthError::TransientNetworkFailure(
                    "connection reset".to_owned(),
                ));
            }
            RefreshBehavior::Timeout => return Err(AuthError::Timeout),
        }

        let rotate = self.state.rotate.load(Ordering::SeqCst);
        let account = {
            let mut tokens = self.state.refresh_tokens.lock().unwrap();
            if rotate {
                tokens.remove(refresh_token.expose_secret())
            } else {
                tokens.get(refresh_token.expose_secret()).cloned()
            }
        }
        .ok_or(AuthError::TokenInvalid)?;

        let ttl = *self.state.access_ttl.lock().unwrap();
        let access_token = SecretString::new(self.mint_access_token(&account, ttl));
        let refresh_token = rotate.then(|| SecretString::new(self.mint_refresh_token(&account)));

        Ok(RefreshGrant {
            access_token,
            refresh_token,
        })
    }

    async fn logout(&self, access_token: &SecretString) -> Result<(), AuthError> {
        self.state.logout_calls.fetch_add(1, Ordering::SeqCst);

        if self.state.fail_logout.load(Ordering::SeqCst) {
            return Err(AuthError::TransientNetworkFailure(
                "logout endpoint unavailable".to_owned(),
            ));
        }

        self.state
            .live_access_tokens
            .lock()
            .unwrap()
            .remove(access_token.expose_secret());
        Ok(())
    }
}
