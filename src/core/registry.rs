//! In-memory client registry.
//!
//! Maps an API key to the client identity and its configured rate limits.
//! Records are created by admin registration and removed by admin deletion;
//! nothing is persisted across restarts. Key comparison is exact-match and
//! case-sensitive. The map is read-mostly (writes only on register/delete),
//! which `scc::HashMap` handles without a global lock.
use chrono::{DateTime, Utc};
use scc::HashMap;
use serde::Serialize;
use thiserror::Error;

use crate::config::RateLimits;

/// A registered client. Created on registration, immutable afterwards.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    pub api_key: String,
    pub name: String,
    pub rate_limits: RateLimits,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Client with API key {0} already exists.")]
    DuplicateKey(String),

    #[error("Client not found.")]
    NotFound,
}

/// Concurrent map from API key to [`ClientRecord`].
#[derive(Default)]
pub struct ClientRegistry {
    clients: HashMap<String, ClientRecord>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Register a new client. Fails with [`RegistryError::DuplicateKey`] if a
    /// record with the same API key already exists; the existing record is
    /// left untouched.
    pub async fn register(
        &self,
        api_key: &str,
        name: &str,
        rate_limits: RateLimits,
    ) -> Result<ClientRecord, RegistryError> {
        let record = ClientRecord {
            api_key: api_key.to_string(),
            name: name.to_string(),
            rate_limits,
            created_at: Utc::now(),
        };

        match self
            .clients
            .insert_async(api_key.to_string(), record.clone())
            .await
        {
            Ok(()) => Ok(record),
            Err(_) => Err(RegistryError::DuplicateKey(api_key.to_string())),
        }
    }

    /// Look up a client by API key. Used by authentication.
    pub async fn lookup(&self, api_key: &str) -> Option<ClientRecord> {
        self.clients
            .read_async(api_key, |_, record| record.clone())
            .await
    }

    /// Remove a client record, returning it so callers can report the
    /// client's name. The caller is responsible for cascading removal of the
    /// client's usage and rate-window state.
    pub async fn remove(&self, api_key: &str) -> Result<ClientRecord, RegistryError> {
        self.clients
            .remove_async(api_key)
            .await
            .map(|(_, record)| record)
            .ok_or(RegistryError::NotFound)
    }

    /// Enumerate all registered clients (admin use).
    pub async fn list(&self) -> Vec<ClientRecord> {
        let mut records = Vec::with_capacity(self.clients.len());
        self.clients
            .any_async(|_, record| {
                records.push(record.clone());
                false
            })
            .await;
        records
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
