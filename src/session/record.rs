//! Persisted form of a [`Session`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Session;
use crate::jwt::ClaimsDecoder;
use crate::{AuthError, Role, SecretString};

/// Current layout version of [`SessionRecord`].
pub const RECORD_VERSION: u32 = 1;

/// The JSON document written to durable storage.
///
/// Claims are written out for readability of the stored file, but on load
/// they are re-derived from the access token and must agree with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub version: u32,
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub user_ref: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn from_session(session: &Session) -> Self {
        Self {
            version: RECORD_VERSION,
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            roles: session.roles.iter().cloned().collect(),
            permissions: session.permissions.iter().cloned().collect(),
            tenant_id: session.tenant_id.clone(),
            user_ref: session.user_ref.clone(),
            expires_at: session.expires_at,
        }
    }

    /// Serializes the record to JSON.
    pub fn to_json(&self) -> Result<String, AuthError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AuthError::StorageError(format!("Failed to serialize session: {e}")))
    }

    /// Parses a stored record and rebuilds the session from its tokens.
    ///
    /// # Errors
    /// `AuthError::CorruptSession` if the JSON does not parse, the version is
    /// unknown, the access token does not decode, or the stored claims
    /// disagree with the token.
    pub fn parse(raw: &str, decoder: &ClaimsDecoder) -> Result<Session, AuthError> {
        let record: SessionRecord = serde_json::from_str(raw)
            .map_err(|e| AuthError::CorruptSession(format!("unparseable record: {e}")))?;

        if record.version != RECORD_VERSION {
            return Err(AuthError::CorruptSession(format!(
                "unsupported record version {}",
                record.version
            )));
        }

        let session = Session::from_tokens(
            record.access_token.clone(),
            record.refresh_token.clone(),
            decoder,
        )
        .map_err(|_| AuthError::CorruptSession("access token does not decode".to_owned()))?;

        if SessionRecord::from_session(&session) != record {
            return Err(AuthError::CorruptSession(
                "stored claims do not match access token".to_owned(),
            ));
        }

        Ok(session)
    }
}

impl PartialEq for SessionRecord {
    fn eq(&self, other: &Self) -> bool {
        let sorted = |roles: &[Role]| {
            let mut roles = roles.to_vec();
            roles.sort();
            roles
        };
        let sorted_permissions = |permissions: &[String]| {
            let mut permissions = permissions.to_vec();
            permissions.sort();
            permissions
        };

        self.version == other.version
            && self.access_token == other.access_token
            && self.refresh_token == other.refresh_token
            && sorted(&self.roles) == sorted(&other.roles)
            && sorted_permissions(&self.permissions) == sorted_permissions(&other.permissions)
            && self.tenant_id == other.tenant_id
            && self.user_ref == other.user_ref
            && self.expires_at == other.expires_at
    }
}
