use async_trait::async_trait;

use crate::events::{AuthEvent, Listener};

/// Emits session events as `tracing` events.
///
/// Requires the `tracing` feature to be enabled.
pub struct TracingListener;

#[async_trait]
impl Listener for TracingListener {
    async fn handle(&self, event: &AuthEvent) {
        tracing::info!(
            target: "ats_session::events",
            event_name = event.name(),
            ?event,
            "session event"
        );
    }
}
