//! Runtime orchestration.
//!
//! - [`Runtime`] - owns configuration, the directory registry and live adapters
//! - [`RuntimeBuilder`] - wires in the directory connector and acceptor factory
//! - [`RuntimeConfig`] / [`AdapterConfig`] - serde configuration
//! - [`setup_tracing`] - initializes logging

mod config;
mod error;
mod system;
pub mod tracing;

pub use config::{AdapterConfig, RuntimeConfig};
pub use error::RuntimeError;
pub use system::{Runtime, RuntimeBuilder};
pub use tracing::setup_tracing;
