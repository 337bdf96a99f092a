use async_trait::async_trait;

use crate::events::{AuthEvent, Listener};

/// Logs every session event through the `log` crate.
pub struct LoggingListener {
    level: log::Level,
}

impl LoggingListener {
    /// Logs at INFO level.
    pub fn new() -> Self {
        Self {
            level: log::Level::Info,
        }
    }

    pub fn with_level(level: log::Level) -> Self {
        Self { level }
    }
}

impl Default for LoggingListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Listener for LoggingListener {
    async fn handle(&self, event: &AuthEvent) {
        log::log!(
            target: "ats_session::events",
            self.level,
            "event={} {:?}",
            event.name(),
            event
        );
    }
}
