#![allow(clippy::unwrap_used)]

use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header};

use crate::jwt::ClaimsDecoder;
use crate::{SecretString, Session};

pub const TEST_SECRET: &str = "test-secret-32-bytes-long-key-01";

pub fn token_with_claims(claims: &serde_json::Value) -> String {
    let key = EncodingKey::from_secret(TEST_SECRET.as_bytes());
    jsonwebtoken::encode(&Header::default(), claims, &key).unwrap()
}

/// Mints an access token expiring `ttl` from now (negative for the past).
pub fn mint_token(roles: &[&str], tenant_id: Option<&str>, ttl: Duration) -> String {
    let now = Utc::now();
    token_with_claims(&serde_json::json!({
        "sub": "user-1",
        "iat": now.timestamp(),
        "exp": (now + ttl).timestamp(),
        "roles": roles,
        "permissions": ["jobs:read"],
        "tenant_id": tenant_id,
        // Keeps tokens minted within the same second distinct.
        "jti": crate::test_support::nonce(),
    }))
}

pub fn session(roles: &[&str], tenant_id: Option<&str>, ttl: Duration) -> Session {
    Session::from_tokens(
        SecretString::new(mint_token(roles, tenant_id, ttl)),
        SecretString::new("refresh-1"),
        &ClaimsDecoder::unverified(),
    )
    .unwrap()
}

pub fn nonce() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
