//! # Object Adapters
//!
//! The server side: adapters host servants, accept their requests and
//! publish their endpoints to the directory.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ─┬─> Held ─> Activating ─> Active ─> Deactivating ─> Deactivated ─> Destroying ─> Destroyed
//!                └────────────┘
//! ```
//!
//! `Deactivating` completes only after every in-flight collocated dispatch
//! has drained.

mod acceptor;
mod core;
mod error;
mod servant;
mod state;

pub use self::core::{DispatchGuard, ObjectAdapter};
pub use acceptor::{Acceptor, AcceptorFactory, AcceptorState, LocalAcceptor, LocalAcceptorFactory};
pub use error::AdapterError;
pub use servant::{servant_fn, Current, FnServant, Servant, ServantTable};
pub use state::AdapterState;
