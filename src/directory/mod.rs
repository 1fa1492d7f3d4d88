//! # Directory Resolution
//!
//! Turns indirect references into endpoints by asking a remote directory
//! service (the "locator"), caching its answers and merging concurrent
//! lookups for the same target.
//!
//! ## Key Types
//!
//! - [`Directory`]: the remote lookup service, consumed as a trait.
//! - [`DirectoryCache`]: TTL cache of directory answers.
//! - [`Resolver`]: coalescing lookups against one directory.
//! - [`DirectoryRegistry`]: one resolver per distinct directory reference.
//! - [`MockDirectory`]: in-memory directory with expectations, for tests and demos.

mod cache;
mod error;
pub mod mock;
mod registry;
mod resolver;
mod single_flight;

pub use cache::{CacheTtl, DirectoryCache};
pub use error::DirectoryError;
pub use mock::MockDirectory;
pub use registry::DirectoryRegistry;
pub use resolver::{ResolvedEndpoints, Resolver};
pub use single_flight::{Flight, Leader, SingleFlight};

use crate::reference::{Endpoint, Identity, Reference};
use async_trait::async_trait;
use std::sync::Arc;

// =============================================================================
// THE COLLABORATOR CONTRACTS
// =============================================================================

/// The remote directory service.
///
/// Implementations perform the actual remote invocations; this crate only
/// decides when to call them and what to do with the answers.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Endpoints currently registered for an adapter or replica group.
    async fn find_adapter_by_id(&self, adapter_id: &str) -> Result<Vec<Endpoint>, DirectoryError>;

    /// Reference registered for a well-known object.
    async fn find_object_by_id(&self, identity: &Identity) -> Result<Arc<Reference>, DirectoryError>;

    /// Entry point adapters use to publish their endpoints, if the directory offers one.
    async fn registration(&self) -> Result<Option<Arc<dyn Registration>>, DirectoryError>;
}

/// Registration side of the directory, used by object adapters.
#[async_trait]
pub trait Registration: Send + Sync {
    /// Publishes (`Some`) or withdraws (`None`) the endpoints of an adapter.
    async fn set_adapter_endpoints(
        &self,
        adapter_id: &str,
        replica_group_id: &str,
        endpoints: Option<Vec<Endpoint>>,
    ) -> Result<(), DirectoryError>;
}

/// Creates the client side of a directory from its reference.
pub trait DirectoryConnector: Send + Sync {
    fn connect(&self, directory: &Arc<Reference>) -> Arc<dyn Directory>;
}
