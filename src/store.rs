//! # Versioned Storage
//!
//! Two layers, the same split a state store usually has between bytes and types:
//!
//! - [`Storage`] is the backend contract. It deals in raw byte entries and offers a
//!   compare-and-swap `set` keyed on the version the writer last observed.
//! - [`State`] adds typing on top. It encodes values with `serde_json` and hands out
//!   [`Variable`]s, the value+version handles the registrar keeps between commits.
//!
//! [`InMemoryStorage`] is the backend used by the demo binary and the tests. Clones
//! share the same map, so two registrars built over clones see the same durable
//! state, which is how a restart is modelled.

use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Version of an entry that does not exist yet.
pub const ABSENT_VERSION: u64 = 0;

/// A raw stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub version: u64,
    pub value: Vec<u8>,
}

/// Backend contract for durable named records.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Fetches the named entry, `None` if it was never written.
    async fn get(&self, name: &str) -> Result<Option<Entry>, StoreError>;

    /// Writes `value` if the entry is still at `expected_version`.
    ///
    /// Returns the new version on success and `None` on a version conflict.
    async fn set(
        &self,
        name: &str,
        value: Vec<u8>,
        expected_version: u64,
    ) -> Result<Option<u64>, StoreError>;
}

/// A typed value paired with the version it was read (or last written) at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable<T> {
    name: String,
    version: u64,
    value: T,
}

impl<T> Variable<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    /// Replaces the value, keeping the observed version for the next `store`.
    pub fn mutate(&self, value: T) -> Variable<T> {
        Variable {
            name: self.name.clone(),
            version: self.version,
            value,
        }
    }
}

/// Typed access to a [`Storage`] backend.
#[derive(Clone)]
pub struct State {
    storage: Arc<dyn Storage>,
}

impl State {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Reads `name`, yielding `T::default()` at [`ABSENT_VERSION`] if it is missing.
    pub async fn fetch<T>(&self, name: &str) -> Result<Variable<T>, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        match self.storage.get(name).await? {
            Some(entry) => Ok(Variable {
                name: entry.name,
                version: entry.version,
                value: serde_json::from_slice(&entry.value)?,
            }),
            None => Ok(Variable {
                name: name.to_string(),
                version: ABSENT_VERSION,
                value: T::default(),
            }),
        }
    }

    /// Conditionally writes `variable`. `Ok(None)` means someone else wrote first.
    pub async fn store<T>(&self, variable: Variable<T>) -> Result<Option<Variable<T>>, StoreError>
    where
        T: Serialize,
    {
        let bytes = serde_json::to_vec(&variable.value)?;
        let written = self
            .storage
            .set(&variable.name, bytes, variable.version)
            .await?;
        Ok(written.map(|version| Variable {
            name: variable.name,
            version,
            value: variable.value,
        }))
    }
}

/// Process-local [`Storage`]; clones share the same records.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes since construction.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Overwrites `name` regardless of its version, as a foreign writer would.
    pub fn force_set(&self, name: &str, value: Vec<u8>) -> u64 {
        let mut entries = self.entries.lock();
        let version = entries.get(name).map_or(ABSENT_VERSION, |e| e.version) + 1;
        entries.insert(
            name.to_string(),
            Entry {
                name: name.to_string(),
                version,
                value,
            },
        );
        version
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get(&self, name: &str) -> Result<Option<Entry>, StoreError> {
        Ok(self.entries.lock().get(name).cloned())
    }

    async fn set(
        &self,
        name: &str,
        value: Vec<u8>,
        expected_version: u64,
    ) -> Result<Option<u64>, StoreError> {
        let mut entries = self.entries.lock();
        let current = entries.get(name).map_or(ABSENT_VERSION, |e| e.version);
        if current != expected_version {
            return Ok(None);
        }

        let version = current + 1;
        entries.insert(
            name.to_string(),
            Entry {
                name: name.to_string(),
                version,
                value,
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(Some(version))
    }
}
