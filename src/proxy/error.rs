use crate::directory::DirectoryError;
use crate::reference::ReferenceError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProxyError {
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// The operation returns a value and cannot be sent oneway, datagram or batched.
    #[error("Operation `{operation}` requires a twoway proxy")]
    TwowayOnly { operation: String },

    /// The proxy has no way of reaching its object.
    #[error("No endpoint available for {0}")]
    NoEndpoint(String),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}
