use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{AuthError, Role};

/// Claims the client consumes from an access token.
///
/// Unknown claims are ignored. `roles` accepts either an array or a single
/// string (older tokens carry a lone `role`), and identifiers that arrive as
/// JSON numbers are normalised to strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject - the user reference.
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub sub: Option<String>,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// Issued at time (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, alias = "role", deserialize_with = "one_or_many")]
    pub roles: Vec<Role>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub permissions: Vec<String>,
    /// Absent for platform-level sessions.
    #[serde(
        default,
        alias = "tenantId",
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub tenant_id: Option<String>,
}

impl AccessClaims {
    /// Returns the expiry as a timestamp.
    pub fn expires_at(&self) -> Result<DateTime<Utc>, AuthError> {
        DateTime::from_timestamp(self.exp, 0).ok_or(AuthError::TokenInvalid)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Integer(i64),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        match Option::<StringOrNumber>::deserialize(deserializer)? {
            None => None,
            Some(StringOrNumber::String(s)) if s.is_empty() => None,
            Some(StringOrNumber::String(s)) => Some(s),
            Some(StringOrNumber::Integer(n)) => Some(n.to_string()),
        },
    )
}
