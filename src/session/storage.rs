//! Durable storage trait.

use async_trait::async_trait;

use crate::AuthError;

/// Client-local durable storage for the serialized session record.
///
/// Implementations provide different storage backends:
/// - [`InMemorySessionStorage`](super::InMemorySessionStorage): process-local, for tests
/// - [`FileSessionStorage`](super::FileSessionStorage): one JSON file per key
///
/// Only [`SessionStore`](super::SessionStore) calls these methods.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Reads the raw record stored under `key`.
    async fn read(&self, key: &str) -> Result<Option<String>, AuthError>;

    /// Replaces the record under `key`.
    ///
    /// Must be atomic: a concurrent or later `read` sees either the previous
    /// record or the new one, never a mix.
    async fn write(&self, key: &str, record: &str) -> Result<(), AuthError>;

    /// Removes the record under `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), AuthError>;
}

#[async_trait]
impl<S: SessionStorage + ?Sized> SessionStorage for Box<S> {
    async fn read(&self, key: &str) -> Result<Option<String>, AuthError> {
        (**self).read(key).await
    }

    async fn write(&self, key: &str, record: &str) -> Result<(), AuthError> {
        (**self).write(key, record).await
    }

    async fn remove(&self, key: &str) -> Result<(), AuthError> {
        (**self).remove(key).await
    }
}
