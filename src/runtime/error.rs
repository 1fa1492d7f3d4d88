use crate::reference::ReferenceError;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Reference(#[from] ReferenceError),
}
