//! Error types for reference values and proxy strings.

use thiserror::Error;

/// Errors raised while building, parsing or changing a [`Reference`](super::Reference).
///
/// These are configuration errors: they are always reported synchronously,
/// before any network interaction takes place.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReferenceError {
    /// The identity string could not be parsed.
    #[error("Malformed identity `{0}`")]
    MalformedIdentity(String),

    /// A proxy needs an identity with a non-empty name.
    #[error("Illegal identity: the name must not be empty")]
    IllegalIdentity,

    /// The endpoint string could not be parsed.
    #[error("Malformed endpoint `{input}`: {reason}")]
    MalformedEndpoint { input: String, reason: String },

    /// The proxy string could not be parsed.
    #[error("Malformed proxy `{input}`: {reason}")]
    MalformedProxy { input: String, reason: String },

    /// A `major.minor` version string could not be parsed.
    #[error("Malformed version `{0}`")]
    MalformedVersion(String),

    /// The requested change is not supported by a reference bound to a fixed connection.
    #[error("Cannot change the {0} of a fixed proxy")]
    FixedProxy(&'static str),

    /// Locator cache timeouts must be `-1` (forever) or greater.
    #[error("Invalid locator cache timeout: {0}")]
    InvalidLocatorCacheTimeout(i32),
}
