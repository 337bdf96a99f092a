//! Session lifecycle operations.
//!
//! Each action owns handles to what it touches and exposes a single
//! `execute`. [`AuthClient`](crate::AuthClient) builds one of each; they can
//! also be used directly.

mod login;
mod logout;
mod restore;

pub use login::LoginAction;
pub use logout::LogoutAction;
pub use restore::{RestoreOutcome, RestoreSessionAction};
