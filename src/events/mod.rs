//! Session lifecycle events.
//!
//! Actions and the refresh coordinator dispatch [`AuthEvent`]s to the
//! client's [`EventRegistry`]. The UI layer hooks in here, e.g. to redirect
//! to the login page on [`AuthEvent::SessionExpired`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ats_session::events::{EventRegistry, listeners::LoggingListener};
//!
//! let mut events = EventRegistry::new();
//! events.listen(LoggingListener::new());
//!
//! let client = AuthClient::builder(config, backend, transport)
//!     .events(events)
//!     .build()?;
//! ```

mod event;
mod listener;
mod registry;

pub mod listeners;

pub use event::AuthEvent;
pub use listener::Listener;
pub use registry::EventRegistry;
