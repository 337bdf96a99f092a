use std::fmt;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use super::AccessClaims;
use crate::{AuthError, SecretString};

/// Minimum required length for a verification secret in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Decodes access-token claims locally.
///
/// Expiry is *not* enforced here: an expired token must still decode so the
/// refresh coordinator can read `exp` and decide to refresh.
#[derive(Clone)]
pub struct ClaimsDecoder {
    key: DecodingKey,
    validation: Validation,
    verified: bool,
}

impl fmt::Debug for ClaimsDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimsDecoder")
            .field("verified", &self.verified)
            .finish_non_exhaustive()
    }
}

impl ClaimsDecoder {
    /// Reads claims without checking the signature.
    pub fn unverified() -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(&[]),
            validation,
            verified: false,
        }
    }

    /// Verifies HS256 signatures with a shared secret before reading claims.
    ///
    /// # Errors
    /// Returns `AuthError::ConfigurationError` if the secret is shorter than
    /// [`MIN_SECRET_LENGTH`] bytes.
    pub fn with_secret(secret: &SecretString) -> Result<Self, AuthError> {
        if secret.expose_secret().len() < MIN_SECRET_LENGTH {
            return Err(AuthError::ConfigurationError(format!(
                "token secret must be at least {MIN_SECRET_LENGTH} bytes, got {}",
                secret.expose_secret().len()
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;

        Ok(Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
            verified: true,
        })
    }

    /// Returns true if signatures are checked.
    pub fn is_verifying(&self) -> bool {
        self.verified
    }

    /// Decodes the claims of `token`.
    ///
    /// Any malformed, badly signed, or claim-incomplete token maps to
    /// `AuthError::TokenInvalid`.
    pub fn decode(&self, token: &str) -> Result<AccessClaims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::TokenInvalid);
        }

        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.key, &self.validation)
            .map_err(|_| AuthError::TokenInvalid)?;

        // `exp` must map onto a real timestamp for the session to be usable.
        data.claims.expires_at()?;
        Ok(data.claims)
    }
}

impl Default for ClaimsDecoder {
    fn default() -> Self {
        Self::unverified()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::Role;
    use crate::test_support::{TEST_SECRET, mint_token, token_with_claims};

    #[test]
    fn test_decode_unverified() {
        let token = mint_token(&["MANAGER"], Some("acme"), Duration::minutes(5));
        let claims = ClaimsDecoder::unverified().decode(&token).unwrap();

        assert_eq!(claims.roles, vec![Role::Manager]);
        assert_eq!(claims.tenant_id.as_deref(), Some("acme"));
    }

    #[test]
    fn test_expired_token_still_decodes() {
        let token = mint_token(&["RECRUITER"], None, -Duration::hours(1));
        let claims = ClaimsDecoder::unverified().decode(&token).unwrap();
        assert!(claims.expires_at().unwrap() < Utc::now());

        let verifying = ClaimsDecoder::with_secret(&SecretString::new(TEST_SECRET)).unwrap();
        assert!(verifying.decode(&token).is_ok());
    }

    #[test]
    fn test_garbage_is_invalid() {
        let decoder = ClaimsDecoder::unverified();
        assert_eq!(decoder.decode("").unwrap_err(), AuthError::TokenInvalid);
        assert_eq!(decoder.decode("not-a-jwt").unwrap_err(), AuthError::TokenInvalid);
        assert_eq!(decoder.decode("a.b.c").unwrap_err(), AuthError::TokenInvalid);
    }

    #[test]
    fn test_missing_exp_is_invalid() {
        let token = token_with_claims(&serde_json::json!({ "roles": ["ADMIN"] }));
        assert_eq!(
            ClaimsDecoder::unverified().decode(&token).unwrap_err(),
            AuthError::TokenInvalid
        );
    }

    #[test]
    fn test_wrong_secret_rejected_when_verifying() {
        let token = mint_token(&["ADMIN"], Some("acme"), Duration::minutes(5));
        let other = SecretString::new("another-secret-that-is-32-bytes-long!");
        let decoder = ClaimsDecoder::with_secret(&other).unwrap();

        assert!(decoder.is_verifying());
        assert_eq!(decoder.decode(&token).unwrap_err(), AuthError::TokenInvalid);
    }

    #[test]
    fn test_secret_too_short() {
        let err = ClaimsDecoder::with_secret(&SecretString::new("short")).unwrap_err();
        assert!(
            matches!(err, AuthError::ConfigurationError(ref msg) if msg.contains("32 bytes")),
            "Expected ConfigurationError with '32 bytes' message"
        );
    }
}
