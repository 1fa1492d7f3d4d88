use crate::reference::Identity;
use thiserror::Error;

/// Errors reported by the directory service or by the resolution machinery around it.
///
/// `Clone` so that one directory failure can be delivered to every caller that
/// joined the same coalesced lookup.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DirectoryError {
    /// The directory does not know the adapter or replica group.
    #[error("Adapter not found: {0}")]
    AdapterNotFound(String),

    /// The directory does not know the object.
    #[error("Object not found: {0}")]
    ObjectNotFound(Identity),

    /// The adapter tried to join a replica group the directory does not accept.
    #[error("Invalid replica group for adapter {0}")]
    InvalidReplicaGroup(String),

    /// Another adapter with the same id is already registered and active.
    #[error("Adapter already active: {0}")]
    AdapterAlreadyActive(String),

    /// The directory could not be reached or failed while processing the call.
    #[error("Directory communication failed: {0}")]
    Communication(String),

    /// Only indirect references can be resolved through a directory.
    #[error("Reference is not resolvable through a directory: {0}")]
    NotIndirect(String),

    /// No directory connector was configured for this runtime.
    #[error("No directory connector configured")]
    NoConnector,

    /// The directory registry was destroyed.
    #[error("Directory registry destroyed")]
    Destroyed,

    /// The task performing the lookup went away without reporting an outcome.
    #[error("Directory lookup abandoned")]
    Abandoned,
}

impl DirectoryError {
    /// True for the authoritative "not registered" answers that invalidate cached entries.
    pub fn is_not_registered(&self) -> bool {
        matches!(
            self,
            DirectoryError::AdapterNotFound(_) | DirectoryError::ObjectNotFound(_)
        )
    }
}
