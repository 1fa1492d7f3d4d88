use crate::directory::DirectoryError;
use crate::reference::{Identity, ReferenceError};
use thiserror::Error;

/// Errors raised by object adapters.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    /// The adapter is deactivating or deactivated and refuses the request.
    #[error("Object adapter `{0}` is deactivated")]
    Deactivated(String),

    /// The adapter is being or has been destroyed.
    #[error("Object adapter `{0}` is destroyed")]
    Destroyed(String),

    #[error("Object adapter name `{0}` is already in use")]
    NameInUse(String),

    #[error("Runtime is shut down")]
    RuntimeShutdown,

    #[error("Servant already registered for `{identity}` facet `{facet}`")]
    AlreadyRegistered { identity: Identity, facet: String },

    #[error("No servant for `{identity}` facet `{facet}`")]
    ObjectNotExist { identity: Identity, facet: String },

    /// The servant reported a failure while dispatching.
    #[error("Servant failed: {0}")]
    Servant(String),

    #[error("Cannot listen on `{endpoint}`: {reason}")]
    Bind { endpoint: String, reason: String },

    #[error("Invalid adapter configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// Publishing the adapter's endpoints to the directory failed.
    #[error("Registration failed: {0}")]
    Registration(#[from] DirectoryError),
}
