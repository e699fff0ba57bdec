//! # Test Doubles
//!
//! Two in-memory collaborators for exercising registrars without real infrastructure.
//!
//! | Double          | Stands in for        | Use it to |
//! |-----------------|----------------------|-----------|
//! | [`MockStorage`] | a [`Storage`] backend | script write failures, conflicts and stalls |
//! | [`MockMaster`]  | a [`MasterRegistrar`] | run the adapter backend end to end |
//!
//! ## Scripting writes
//!
//! `MockStorage` wraps an [`InMemoryStorage`] and consumes one scripted behaviour
//! per `set` call, in order. Once the script is exhausted writes pass through.
//! A scripted panic takes down the store task itself, the way a crashed or
//! cancelled write would.
//!
//! ```rust
//! use provider_registrar::mock::MockStorage;
//! use provider_registrar::{GenericRegistrar, Operation, Registrar, RegistrarError};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockStorage::new();
//!     mock.expect_set().fail("disk on fire");
//!
//!     let registrar = GenericRegistrar::new(Arc::new(mock.clone()));
//!     registrar.recover().await.unwrap();
//!
//!     let result = registrar.apply(Operation::admit("rp-1")).await;
//!     assert_eq!(
//!         result,
//!         Err(RegistrarError::Aborted("Failed to update registry: disk on fire".into()))
//!     );
//!     mock.verify();
//! }
//! ```
//!
//! ## Holding a write open
//!
//! [`SetExpectationBuilder::hold`] returns a [`WriteGate`]; the write does not
//! complete until the gate is released. This is how tests pile operations up
//! behind an in-flight commit.

use crate::error::{RegistrarError, StoreError};
use crate::master::{MasterRegistrar, MasterRegistry, RegistryOperation};
use crate::store::{Entry, InMemoryStorage, Storage};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

// =============================================================================
// STORAGE
// =============================================================================

enum SetBehavior {
    Pass,
    Fail(String),
    Conflict,
    Discard,
    Panic,
    Hold(oneshot::Receiver<()>),
}

enum GetBehavior {
    Fail(StoreError),
    Panic,
}

/// Scriptable [`Storage`]; clones share the script and the backing records.
#[derive(Clone, Default)]
pub struct MockStorage {
    inner: InMemoryStorage,
    sets: Arc<Mutex<VecDeque<SetBehavior>>>,
    gets: Arc<Mutex<VecDeque<GetBehavior>>>,
    set_attempts: Arc<AtomicUsize>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts on top of existing records.
    pub fn with_storage(inner: InMemoryStorage) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    /// The backing records.
    pub fn storage(&self) -> &InMemoryStorage {
        &self.inner
    }

    /// Expects a `set` call.
    pub fn expect_set(&self) -> SetExpectationBuilder {
        SetExpectationBuilder {
            sets: self.sets.clone(),
        }
    }

    /// Makes the next `get` call fail with `error`.
    pub fn fail_next_get(&self, error: StoreError) {
        self.gets.lock().push_back(GetBehavior::Fail(error));
    }

    /// Makes the next `get` call panic, killing the task that made it.
    pub fn panic_next_get(&self) {
        self.gets.lock().push_back(GetBehavior::Panic);
    }

    /// Number of `set` calls seen, whatever their outcome.
    pub fn set_attempts(&self) -> usize {
        self.set_attempts.load(Ordering::SeqCst)
    }

    /// Verifies that every scripted behaviour was consumed.
    pub fn verify(&self) {
        let remaining = self.sets.lock().len() + self.gets.lock().len();
        if remaining != 0 {
            panic!("Not all expectations were met. {} remaining", remaining);
        }
    }
}

/// Builder for `set` expectations.
pub struct SetExpectationBuilder {
    sets: Arc<Mutex<VecDeque<SetBehavior>>>,
}

impl SetExpectationBuilder {
    /// The write goes through to the backing storage.
    pub fn pass(self) {
        self.sets.lock().push_back(SetBehavior::Pass);
    }

    /// The write fails with a backend error carrying `message`.
    pub fn fail(self, message: impl Into<String>) {
        self.sets.lock().push_back(SetBehavior::Fail(message.into()));
    }

    /// The write loses the compare-and-swap.
    pub fn conflict(self) {
        self.sets.lock().push_back(SetBehavior::Conflict);
    }

    /// The write is abandoned without an outcome.
    pub fn discard(self) {
        self.sets.lock().push_back(SetBehavior::Discard);
    }

    /// The write panics, killing the task that made it.
    pub fn panic(self) {
        self.sets.lock().push_back(SetBehavior::Panic);
    }

    /// The write blocks until the returned gate is released, then goes through.
    pub fn hold(self) -> WriteGate {
        let (release, held) = oneshot::channel();
        self.sets.lock().push_back(SetBehavior::Hold(held));
        WriteGate { release }
    }
}

/// Releases a held write. Dropping the gate releases it too.
pub struct WriteGate {
    release: oneshot::Sender<()>,
}

impl WriteGate {
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn get(&self, name: &str) -> Result<Option<Entry>, StoreError> {
        let scripted = self.gets.lock().pop_front();
        match scripted {
            Some(GetBehavior::Fail(e)) => Err(e),
            Some(GetBehavior::Panic) => panic!("scripted panic reading {name}"),
            None => self.inner.get(name).await,
        }
    }

    async fn set(
        &self,
        name: &str,
        value: Vec<u8>,
        expected_version: u64,
    ) -> Result<Option<u64>, StoreError> {
        self.set_attempts.fetch_add(1, Ordering::SeqCst);
        let behavior = self.sets.lock().pop_front().unwrap_or(SetBehavior::Pass);
        match behavior {
            SetBehavior::Pass => self.inner.set(name, value, expected_version).await,
            SetBehavior::Fail(message) => Err(StoreError::Backend(message)),
            SetBehavior::Conflict => Ok(None),
            SetBehavior::Discard => Err(StoreError::Discarded),
            SetBehavior::Panic => panic!("scripted panic writing {name}"),
            SetBehavior::Hold(held) => {
                let _ = held.await;
                self.inner.set(name, value, expected_version).await
            }
        }
    }
}

// =============================================================================
// COMPOSITE REGISTRAR
// =============================================================================

/// In-memory [`MasterRegistrar`].
///
/// Applies each operation to a copy of its registry and swaps the copy in only
/// if the operation succeeds, one operation at a time.
#[derive(Default)]
pub struct MockMaster {
    registry: tokio::sync::Mutex<MasterRegistry>,
    applied: AtomicUsize,
    failures: Mutex<VecDeque<String>>,
}

impl MockMaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: MasterRegistry) -> Self {
        Self {
            registry: tokio::sync::Mutex::new(registry),
            ..Default::default()
        }
    }

    /// Snapshot of the composite registry.
    pub async fn registry(&self) -> MasterRegistry {
        self.registry.lock().await.clone()
    }

    /// Number of operations committed.
    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    /// Makes the next `apply` fail as if the master's own write failed.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.failures.lock().push_back(message.into());
    }
}

#[async_trait]
impl MasterRegistrar for MockMaster {
    async fn apply(
        &self,
        mut operation: Box<dyn RegistryOperation>,
    ) -> Result<bool, RegistrarError> {
        let mut registry = self.registry.lock().await;

        let failure = self.failures.lock().pop_front();
        if let Some(message) = failure {
            return Err(RegistrarError::Aborted(format!(
                "Failed to update registry: {message}"
            )));
        }

        let mut updated = registry.clone();
        let mutated = operation.perform(&mut updated)?;
        *registry = updated;
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(mutated)
    }
}
