//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing` subscriber filtered by
//! `RUST_LOG`.
//!
//! ## What Gets Traced
//!
//! - **Resolution**: `Resolving adapter`, `Resolved adapter`, cache hits and
//!   evictions, failed lookups (with `adapter_id` or `identity` fields)
//! - **Registry**: creation of resolvers and caches per directory
//! - **Adapters**: activation, hold, deactivation, destruction and
//!   endpoint publication (with `adapter` and `adapter_id` fields)
//!
//! ## Usage Examples
//!
//! ```bash
//! # Lifecycle and lookups
//! RUST_LOG=info cargo run
//!
//! # Cache hits, joined lookups and dispatches too
//! RUST_LOG=debug cargo run
//!
//! # Cache stores as well
//! RUST_LOG=trace cargo run
//! ```
//!
//! With `RUST_LOG=info` the demo prints something like:
//!
//! ```text
//! INFO activate{adapter="Hello"}: Published endpoints adapter_id=HelloAdapter replica_group_id= count=1
//! INFO activate{adapter="Hello"}: Activated adapter_id=HelloAdapter
//! INFO resolve_target{proxy=hello -t -e 1.1 @ HelloAdapter}:resolve_endpoints{...}: Resolving adapter adapter_id="HelloAdapter"
//! INFO resolve_target{proxy=hello -t -e 1.1 @ HelloAdapter}:resolve_endpoints{...}: Resolved adapter adapter_id="HelloAdapter" count=1
//! ```

/// Initializes the global tracing subscriber.
///
/// # Example
///
/// ```ignore
/// setup_tracing();
/// tracing::info!("Application started");
/// ```
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
