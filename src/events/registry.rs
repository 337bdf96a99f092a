use super::{AuthEvent, Listener};

/// Listeners for one client's session events.
///
/// Owned by the client rather than stored globally, so that two clients in
/// one process (or two tests) never see each other's events.
#[derive(Default)]
pub struct EventRegistry {
    listeners: Vec<Box<dyn Listener>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener to receive events.
    ///
    /// Listeners are called in the order they are registered.
    pub fn listen(&mut self, listener: impl Listener) -> &mut Self {
        self.listeners.push(Box::new(listener));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Dispatch an event to all registered listeners.
    ///
    /// With no listeners this is a no-op.
    pub async fn dispatch(&self, event: AuthEvent) {
        for listener in &self.listeners {
            listener.handle(&event).await;
        }
    }
}
