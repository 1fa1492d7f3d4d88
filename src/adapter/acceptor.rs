//! Incoming connection factories.
//!
//! The transport that actually accepts connections lives outside this crate;
//! adapters drive it through [`Acceptor`]. [`LocalAcceptor`] is an in-process
//! implementation that only tracks state, used when no transport is plugged in.

use super::AdapterError;
use crate::reference::Endpoint;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// One listening endpoint of an adapter.
#[async_trait]
pub trait Acceptor: Send + Sync {
    /// The endpoint as it is actually bound, e.g. with an assigned port.
    fn endpoint(&self) -> Endpoint;

    /// Starts accepting connections and reading requests.
    fn activate(&self);

    /// Stops reading new requests; connections stay open.
    fn hold(&self);

    /// Closes the listener and all its connections.
    fn destroy(&self);

    /// Resolves once every connection has stopped reading requests.
    async fn wait_until_holding(&self);

    /// Resolves once the listener and all its connections are closed.
    async fn wait_until_finished(&self);
}

/// Creates acceptors for configured endpoints.
pub trait AcceptorFactory: Send + Sync {
    fn bind(&self, endpoint: &Endpoint) -> Result<Arc<dyn Acceptor>, AdapterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptorState {
    Holding,
    Accepting,
    Closed,
}

/// In-process acceptor.
pub struct LocalAcceptor {
    endpoint: Endpoint,
    state: watch::Sender<AcceptorState>,
}

impl LocalAcceptor {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            state: watch::channel(AcceptorState::Holding).0,
        }
    }

    pub fn state(&self) -> AcceptorState {
        *self.state.borrow()
    }

    fn set(&self, next: AcceptorState) {
        self.state.send_if_modified(|state| {
            // Closed is final.
            if *state == AcceptorState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    async fn wait_for(&self, condition: impl FnMut(&AcceptorState) -> bool) {
        let mut receiver = self.state.subscribe();
        // The sender lives as long as `self`, so this only ends when the condition holds.
        let _ = receiver.wait_for(condition).await;
    }
}

#[async_trait]
impl Acceptor for LocalAcceptor {
    fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    fn activate(&self) {
        self.set(AcceptorState::Accepting);
    }

    fn hold(&self) {
        self.set(AcceptorState::Holding);
    }

    fn destroy(&self) {
        self.set(AcceptorState::Closed);
    }

    async fn wait_until_holding(&self) {
        self.wait_for(|state| *state != AcceptorState::Accepting).await;
    }

    async fn wait_until_finished(&self) {
        self.wait_for(|state| *state == AcceptorState::Closed).await;
    }
}

/// Binds [`LocalAcceptor`]s, assigning ports to endpoints configured with port 0.
pub struct LocalAcceptorFactory {
    next_port: AtomicU16,
}

impl LocalAcceptorFactory {
    pub fn new(first_port: u16) -> Self {
        Self {
            next_port: AtomicU16::new(first_port),
        }
    }
}

impl Default for LocalAcceptorFactory {
    fn default() -> Self {
        Self::new(40000)
    }
}

impl AcceptorFactory for LocalAcceptorFactory {
    fn bind(&self, endpoint: &Endpoint) -> Result<Arc<dyn Acceptor>, AdapterError> {
        let mut bound = endpoint.clone();
        if bound.port == 0 {
            bound.port = self.next_port.fetch_add(1, Ordering::SeqCst);
            if bound.port == 0 {
                return Err(AdapterError::Bind {
                    endpoint: endpoint.to_string(),
                    reason: "no free port left".into(),
                });
            }
        }
        if bound.host.is_empty() {
            bound.host = "localhost".into();
        }
        debug!(endpoint = %bound, "Bound local acceptor");
        Ok(Arc::new(LocalAcceptor::new(bound)))
    }
}
