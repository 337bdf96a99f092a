use async_trait::async_trait;

use super::AuthEvent;

/// Handles session events.
///
/// # Example
///
/// ```rust,ignore
/// use ats_session::events::{AuthEvent, Listener};
/// use async_trait::async_trait;
///
/// struct RedirectOnExpiry { router: Router }
///
/// #[async_trait]
/// impl Listener for RedirectOnExpiry {
///     async fn handle(&self, event: &AuthEvent) {
///         if let AuthEvent::SessionExpired { .. } = event {
///             self.router.replace("/login");
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Called for every event dispatched; match on the variant to filter.
    async fn handle(&self, event: &AuthEvent);
}
