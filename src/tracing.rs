//! # Observability & Tracing
//!
//! The registrar logs through `tracing` with structured fields:
//!
//! - **Lifecycle**: actor start and stop, recovery (`version`, `size`)
//! - **Commits**: `Registry updated` with the new `version`, registry `size` and `batch` size
//! - **Rejections**: a `warn!` per operation that failed its own precondition
//! - **Aborts**: an `error!` with the message every later caller will receive
//!
//! ```bash
//! RUST_LOG=info cargo run     # lifecycle and commits
//! RUST_LOG=debug cargo run    # every apply and each commit attempt
//! ```
//!
//! Typical `info` output for a burst of admits:
//!
//! ```text
//! INFO Registrar started record="RESOURCE_PROVIDER_REGISTRAR"
//! INFO Recovered registry record="RESOURCE_PROVIDER_REGISTRAR" version=0 size=0
//! INFO Registry updated version=1 size=1 batch=1
//! INFO Registry updated version=2 size=4 batch=3
//! ```

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
