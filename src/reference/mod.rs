//! # Reference Values
//!
//! Everything needed to describe *where* a remote object lives and *how* to
//! invoke it, as plain immutable values:
//!
//! - [`Identity`]: category and name of the object.
//! - [`Endpoint`]: a physical network address.
//! - [`Reference`]: identity plus addressing plus invocation settings.
//!
//! References are shared as `Arc<Reference>` and changed copy-on-write.

mod core;
mod endpoint;
mod error;
mod identity;
mod options;
mod parse;

pub use self::core::{Addressing, FixedConnection, Reference, ReferenceDefaults};
pub use endpoint::Endpoint;
pub use error::ReferenceError;
pub use identity::Identity;
pub use options::{
    EncodingVersion, EndpointSelection, InvocationMode, ProtocolVersion, ENCODING_1_0,
    ENCODING_1_1, PROTOCOL_1_0,
};
pub use parse::parse_reference;
