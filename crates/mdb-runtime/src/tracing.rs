//! # Observability & Tracing
//!
//! The runtime logs through the `tracing` crate with structured fields, so a single
//! delivery can be followed across the endpoint handler, the container, and the pool:
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `deployment_id` | Deployment the event belongs to |
//! | `instance_id` | Bean instance involved (`#n`) |
//! | `method` | Business method, with parameter types |
//! | `transaction` | Transaction id (`tx-n`) |
//! | `error`, `root_cause` | Fault and the innermost cause it wraps |
//!
//! ## Levels
//!
//! - `info`: deploy, undeploy, endpoint activation and deactivation, reaper start/stop
//! - `debug`: per-delivery steps (instance reuse, transaction begin/commit, pooling)
//! - `warn`: tolerated faults (failed injections, unknown activation properties,
//!   release-time cleanup errors)
//! - `error`: system exceptions, construction failures, failed delivery callbacks
//!
//! ```bash
//! RUST_LOG=info cargo run -p mdb-sample
//! RUST_LOG=mdb_runtime=debug cargo run -p mdb-sample
//! ```

/// Installs a compact `tracing-subscriber` filtered by `RUST_LOG`.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
