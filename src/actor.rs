//! # Registrar Actor
//!
//! The [`RegistrarActor`] owns the in-memory registry, the versioned handle it was
//! read at, and the queue of operations waiting to be committed. Like any actor it
//! processes one mailbox message at a time, so none of that state needs a lock.
//!
//! ## Lifecycle
//!
//! 1. **Recover**: the first `Recover` request spawns a single fetch of the record.
//!    Later `Recover` requests wait on (or replay) that same outcome. `Apply`
//!    requests that arrive while the fetch is running are parked until it settles.
//! 2. **Commit cycle**: when an operation is queued and no write is in flight, the
//!    whole queue is detached as one batch, applied in arrival order to a copy of
//!    the registry, and written with a single compare-and-swap against the last
//!    observed version.
//! 3. **Settle**: on success the registry and version advance and every operation
//!    in the batch is resolved with its own recorded outcome. Anything queued in
//!    the meantime starts the next cycle straight away.
//! 4. **Abort**: a failed, discarded or conflicting write fails the batch and every
//!    queued operation, and the actor never writes again. New operations are
//!    rejected with the same message without being applied.
//!
//! Store calls run in their own tasks and the loop `select!`s over the mailbox and
//! the in-flight call, so callers keep getting queued while a write is outstanding.

use crate::config::RegistrarConfig;
use crate::error::{RegistrarError, StoreError};
use crate::message::{AppliedOperation, PendingOperation, RegistrarRequest, Response};
use crate::model::Registry;
use crate::store::{State, Storage, Variable};
use std::collections::VecDeque;
use std::future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

type Fetch = JoinHandle<Result<Variable<Registry>, StoreError>>;
type Write = JoinHandle<Result<Option<Variable<Registry>>, StoreError>>;

enum Recovery {
    NotStarted,
    Recovering {
        waiters: Vec<Response<()>>,
        parked: Vec<PendingOperation>,
    },
    Recovered(Result<(), RegistrarError>),
}

/// The single writer of one persisted registry.
pub struct RegistrarActor {
    receiver: mpsc::Receiver<RegistrarRequest>,
    state: State,
    record_name: String,
    recovery: Recovery,
    variable: Option<Variable<Registry>>,
    operations: VecDeque<PendingOperation>,
    error: Option<RegistrarError>,
    fetching: Option<Fetch>,
    updating: Option<Write>,
    applied: VecDeque<AppliedOperation>,
}

impl RegistrarActor {
    /// Creates the actor and the sender half of its mailbox.
    ///
    /// The actor does nothing until [`run`](Self::run) is spawned.
    pub fn new(
        storage: Arc<dyn Storage>,
        config: &RegistrarConfig,
    ) -> (Self, mpsc::Sender<RegistrarRequest>) {
        let (sender, receiver) = mpsc::channel(config.mailbox_capacity.max(1));
        let actor = Self {
            receiver,
            state: State::new(storage),
            record_name: config.record_name.clone(),
            recovery: Recovery::NotStarted,
            variable: None,
            operations: VecDeque::new(),
            error: None,
            fetching: None,
            updating: None,
            applied: VecDeque::new(),
        };
        (actor, sender)
    }

    /// Runs the event loop until the mailbox closes and all accepted work is done.
    ///
    /// After the last sender is dropped the actor still finishes the in-flight
    /// store call and commits whatever is left in the queue.
    pub async fn run(mut self) {
        let record = self.record_name.clone();
        info!(%record, "Registrar started");

        let mut open = true;
        while open || self.fetching.is_some() || self.updating.is_some() {
            tokio::select! {
                msg = self.receiver.recv(), if open => match msg {
                    Some(msg) => self.handle(msg),
                    None => {
                        debug!(%record, queued = self.operations.len(), "Mailbox closed");
                        open = false;
                    }
                },
                joined = settle(&mut self.fetching) => {
                    self.fetching = None;
                    self.recovered(joined);
                }
                joined = settle(&mut self.updating) => {
                    self.updating = None;
                    self.updated(joined);
                }
            }
        }

        let size = self.variable.as_ref().map_or(0, |v| v.get().len());
        info!(%record, size, aborted = self.error.is_some(), "Registrar stopped");
    }

    fn handle(&mut self, msg: RegistrarRequest) {
        match msg {
            RegistrarRequest::Recover { respond_to } => match &mut self.recovery {
                Recovery::NotStarted => {
                    info!(record = %self.record_name, "Recovering registry");
                    let state = self.state.clone();
                    let name = self.record_name.clone();
                    self.fetching = Some(tokio::spawn(async move {
                        state.fetch::<Registry>(&name).await
                    }));
                    self.recovery = Recovery::Recovering {
                        waiters: vec![respond_to],
                        parked: Vec::new(),
                    };
                }
                Recovery::Recovering { waiters, .. } => waiters.push(respond_to),
                Recovery::Recovered(result) => {
                    let _ = respond_to.send(result.clone());
                }
            },
            RegistrarRequest::Apply {
                operation,
                respond_to,
            } => {
                debug!(?operation, "Apply");
                match &mut self.recovery {
                    Recovery::NotStarted => {
                        warn!(?operation, "Apply before recover");
                        let _ = respond_to.send(Err(RegistrarError::NotRecovered));
                    }
                    Recovery::Recovering { parked, .. } => {
                        parked.push(PendingOperation::new(operation, respond_to));
                    }
                    Recovery::Recovered(Err(e)) => {
                        let _ = respond_to.send(Err(e.clone()));
                    }
                    Recovery::Recovered(Ok(())) => {
                        self.enqueue(PendingOperation::new(operation, respond_to));
                    }
                }
            }
        }
    }

    fn recovered(&mut self, joined: Result<Result<Variable<Registry>, StoreError>, JoinError>) {
        let result = match joined {
            Ok(Ok(variable)) => {
                info!(
                    record = %self.record_name,
                    version = variable.version(),
                    size = variable.get().len(),
                    "Recovered registry"
                );
                self.variable = Some(variable);
                Ok(())
            }
            Ok(Err(e)) => Err(RegistrarError::Recovery(e)),
            Err(_) => Err(RegistrarError::Recovery(StoreError::Discarded)),
        };
        if let Err(e) = &result {
            error!(record = %self.record_name, error = %e, "Recovery failed");
        }

        let previous = std::mem::replace(&mut self.recovery, Recovery::Recovered(result.clone()));
        if let Recovery::Recovering { waiters, parked } = previous {
            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
            match result {
                Ok(()) => {
                    self.operations.extend(parked);
                    if self.updating.is_none() {
                        self.update();
                    }
                }
                Err(e) => {
                    for operation in parked {
                        operation.fail(e.clone());
                    }
                }
            }
        }
    }

    fn enqueue(&mut self, operation: PendingOperation) {
        if let Some(e) = &self.error {
            operation.fail(e.clone());
            return;
        }

        self.operations.push_back(operation);
        if self.updating.is_none() {
            self.update();
        }
    }

    /// Starts a commit cycle over everything queued so far.
    fn update(&mut self) {
        if self.operations.is_empty() || self.error.is_some() {
            return;
        }
        let Some(variable) = self.variable.as_ref() else {
            return;
        };

        let mut registry = variable.get().clone();
        let batch: VecDeque<AppliedOperation> = std::mem::take(&mut self.operations)
            .into_iter()
            .map(|operation| {
                let applied = operation.perform(&mut registry);
                if let Err(e) = applied.outcome() {
                    warn!(
                        id = %applied.operation().id(),
                        error = %e,
                        "Failed to apply operation on resource provider registry"
                    );
                }
                applied
            })
            .collect();

        let next = variable.mutate(registry);
        debug!(
            batch = batch.len(),
            version = next.version(),
            size = next.get().len(),
            "Committing registry"
        );
        let state = self.state.clone();
        self.updating = Some(tokio::spawn(async move { state.store(next).await }));
        self.applied = batch;
    }

    fn updated(
        &mut self,
        joined: Result<Result<Option<Variable<Registry>>, StoreError>, JoinError>,
    ) {
        let applied = std::mem::take(&mut self.applied);
        let cause = match joined {
            Ok(Ok(Some(variable))) => {
                info!(
                    version = variable.version(),
                    size = variable.get().len(),
                    batch = applied.len(),
                    "Registry updated"
                );
                self.variable = Some(variable);
                for operation in applied {
                    operation.set();
                }
                self.update();
                return;
            }
            Ok(Ok(None)) => "version mismatch".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => StoreError::Discarded.to_string(),
        };

        let message = format!("Failed to update registry: {cause}");
        error!(%message, batch = applied.len(), queued = self.operations.len(), "Registrar aborting");

        let e = RegistrarError::Aborted(message);
        for operation in applied {
            operation.fail(e.clone());
        }
        for operation in self.operations.drain(..) {
            operation.fail(e.clone());
        }
        self.error = Some(e);
    }
}

async fn settle<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task {
        Some(handle) => handle.await,
        None => future::pending().await,
    }
}
