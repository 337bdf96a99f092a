//! Local decoding of access-token claims.
//!
//! The backend issues compact JWTs. The client only needs to *read* them:
//! expiry, roles, permissions, tenant and user reference. No network call is
//! involved, so route decisions and expiry checks stay synchronous.
//!
//! # Example
//!
//! ```ignore
//! use ats_session::jwt::ClaimsDecoder;
//!
//! // Read claims without checking the signature (the backend remains the
//! // authority; a forged token only ever reaches the backend and gets a 401).
//! let decoder = ClaimsDecoder::unverified();
//! let claims = decoder.decode(access_token)?;
//! println!("expires at {}", claims.expires_at()?);
//!
//! // Or verify HS256 signatures when the deployment shares the key.
//! let decoder = ClaimsDecoder::with_secret(&secret)?;
//! ```

mod claims;
mod decoder;

pub use claims::AccessClaims;
pub use decoder::{ClaimsDecoder, MIN_SECRET_LENGTH};
