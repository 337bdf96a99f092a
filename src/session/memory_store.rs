//! In-memory session storage.
//!
//! Suitable for tests and for clients that must not touch the disk.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::storage::SessionStorage;
use crate::AuthError;

/// In-memory session storage.
///
/// Clones share the same map, so a test can hand one clone to a
/// [`SessionStore`](super::SessionStore), drop the store, and build a new
/// store over another clone to simulate a process restart.
#[derive(Clone, Default)]
pub struct InMemorySessionStorage {
    records: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw record under `key`, bypassing the async API.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.records
            .read()
            .ok()
            .and_then(|records| records.get(key).cloned())
    }

    /// Overwrites the raw record under `key`, e.g. to plant a corrupt one.
    pub fn put_raw(&self, key: &str, record: impl Into<String>) {
        if let Ok(mut records) = self.records.write() {
            records.insert(key.to_owned(), record.into());
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, AuthError> {
        let records = self
            .records
            .read()
            .map_err(|_| AuthError::StorageError("Lock poisoned".to_owned()))?;
        Ok(records.get(key).cloned())
    }

    async fn write(&self, key: &str, record: &str) -> Result<(), AuthError> {
        self.records
            .write()
            .map_err(|_| AuthError::StorageError("Lock poisoned".to_owned()))?
            .insert(key.to_owned(), record.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AuthError> {
        self.records
            .write()
            .map_err(|_| AuthError::StorageError("Lock poisoned".to_owned()))?
            .remove(key);
        Ok(())
    }
}
