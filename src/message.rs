//! # Registrar Messages
//!
//! The types exchanged between the [`GenericRegistrar`](crate::registrar::GenericRegistrar)
//! façade and the [`RegistrarActor`](crate::actor::RegistrarActor).

use crate::error::{OperationError, RegistrarError};
use crate::model::Registry;
use crate::operation::Operation;
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by the actor.
pub type Response<T> = oneshot::Sender<Result<T, RegistrarError>>;

/// Requests accepted by the registrar actor's mailbox.
#[derive(Debug)]
pub enum RegistrarRequest {
    Recover {
        respond_to: Response<()>,
    },
    Apply {
        operation: Operation,
        respond_to: Response<bool>,
    },
}

/// An operation accepted by the actor and not yet applied.
#[derive(Debug)]
pub struct PendingOperation {
    operation: Operation,
    respond_to: Response<bool>,
}

impl PendingOperation {
    pub fn new(operation: Operation, respond_to: Response<bool>) -> Self {
        Self {
            operation,
            respond_to,
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Runs the operation against `registry`, keeping its outcome until the
    /// batch it belongs to has been written.
    pub fn perform(self, registry: &mut Registry) -> AppliedOperation {
        let outcome = self.operation.perform(registry);
        AppliedOperation {
            operation: self.operation,
            outcome,
            respond_to: self.respond_to,
        }
    }

    /// Resolves with a systemic failure without applying the operation.
    pub fn fail(self, error: RegistrarError) {
        let _ = self.respond_to.send(Err(error));
    }
}

/// An operation applied to a batch that is being written.
///
/// Resolution consumes the value, so the response channel fires exactly once.
#[derive(Debug)]
pub struct AppliedOperation {
    operation: Operation,
    outcome: Result<bool, OperationError>,
    respond_to: Response<bool>,
}

impl AppliedOperation {
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn outcome(&self) -> &Result<bool, OperationError> {
        &self.outcome
    }

    /// Resolves with the recorded outcome.
    pub fn set(self) {
        let _ = self
            .respond_to
            .send(self.outcome.map_err(RegistrarError::from));
    }

    /// Resolves with a systemic failure, ignoring the recorded outcome.
    pub fn fail(self, error: RegistrarError) {
        let _ = self.respond_to.send(Err(error));
    }
}
