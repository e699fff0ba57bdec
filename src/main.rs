//! # Registrar Demo
//!
//! Admits and removes a few resource providers, shuts the registrar down, then
//! recovers a fresh registrar from the same storage to show what was persisted.
//!
//! ```bash
//! RUST_LOG=info cargo run
//! ```

use futures::future::join_all;
use provider_registrar::config::DEFAULT_RECORD_NAME;
use provider_registrar::tracing::setup_tracing;
use provider_registrar::{GenericRegistrar, InMemoryStorage, Operation, Registrar, Registry, State};
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let storage = InMemoryStorage::new();

    let registrar = GenericRegistrar::new(Arc::new(storage.clone()));
    registrar.recover().await.map_err(|e| e.to_string())?;

    let span = tracing::info_span!("admission");
    async {
        let operations = vec![
            Operation::admit("rp-storage-1"),
            Operation::admit("rp-gpu-1"),
            Operation::admit("rp-gpu-1"),
            Operation::admit("rp-net-1"),
            Operation::remove("rp-net-1"),
            Operation::remove("rp-unknown"),
        ];

        // Submitted together so the registrar can batch them.
        let results = join_all(operations.iter().cloned().map(|op| registrar.apply(op))).await;
        for (operation, result) in operations.iter().zip(results) {
            match result {
                Ok(mutated) => info!(?operation, mutated, "Applied"),
                Err(e) if e.is_rejection() => warn!(?operation, error = %e, "Rejected"),
                Err(e) => error!(?operation, error = %e, "Registrar failed"),
            }
        }
    }
    .instrument(span)
    .await;

    registrar.shutdown().await.map_err(|e| e.to_string())?;
    info!(writes = storage.writes(), "First registrar stopped");

    let recovered = GenericRegistrar::new(Arc::new(storage.clone()));
    recovered.recover().await.map_err(|e| e.to_string())?;
    recovered.shutdown().await.map_err(|e| e.to_string())?;

    let state = State::new(Arc::new(storage));
    let variable = state
        .fetch::<Registry>(DEFAULT_RECORD_NAME)
        .await
        .map_err(|e| e.to_string())?;
    let ids: Vec<String> = variable.get().ids().map(|id| id.to_string()).collect();
    info!(version = variable.version(), ?ids, "Persisted registry");

    Ok(())
}
