//! # The Object Adapter
//!
//! Hosts servants, owns the acceptors that receive their requests and
//! publishes its endpoints to the directory so indirect references naming its
//! adapter id resolve to it.
//!
//! # Architecture Note
//! The lifecycle state and the in-flight dispatch count live together in one
//! `watch` channel. Every transition is a single `send_modify` on the pair, and
//! every `wait_for_*` is a `wait_for` on the same channel, so a waiter can never
//! observe a state without the count that justified it.

use super::{Acceptor, AdapterError, AdapterState, Current, Servant, ServantTable};
use crate::proxy::Proxy;
use crate::reference::{Addressing, Endpoint, Identity, Reference};
use crate::runtime::{AdapterConfig, Runtime};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Lifecycle {
    state: AdapterState,
    dispatches: usize,
    /// The adapter has published its endpoints at least once.
    registered: bool,
    /// Acceptors have been destroyed by deactivation.
    connections_closed: bool,
}

impl Lifecycle {
    fn drained(&self) -> bool {
        self.state == AdapterState::Deactivating && self.connections_closed && self.dispatches == 0
    }
}

enum Claim {
    Proceed { previous: AdapterState, registered: bool },
    Wait,
    Done,
    Refused(AdapterError),
}

pub struct ObjectAdapter {
    name: String,
    runtime: Arc<Runtime>,
    adapter_id: String,
    replica_group_id: String,
    acceptors: Vec<Arc<dyn Acceptor>>,
    configured_published: Option<Vec<Endpoint>>,
    published: Mutex<Vec<Endpoint>>,
    locator: Mutex<Option<Arc<Reference>>>,
    servants: Mutex<ServantTable>,
    lifecycle: watch::Sender<Lifecycle>,
}

impl fmt::Debug for ObjectAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectAdapter")
            .field("name", &self.name)
            .field("adapter_id", &self.adapter_id)
            .field("state", &self.state())
            .finish()
    }
}

impl ObjectAdapter {
    /// Binds the configured endpoints. The adapter starts `Uninitialized`;
    /// the runtime moves it on according to `hold_on_creation`.
    pub(crate) fn new(
        name: String,
        runtime: Arc<Runtime>,
        config: &AdapterConfig,
        locator: Option<Arc<Reference>>,
    ) -> Result<Self, AdapterError> {
        if config.adapter_id.is_empty() && !config.replica_group_id.is_empty() {
            return Err(AdapterError::Config(format!(
                "adapter `{name}` has a replica group but no adapter id"
            )));
        }

        let acceptors = config
            .endpoints
            .iter()
            .map(|endpoint| runtime.acceptor_factory().bind(endpoint))
            .collect::<Result<Vec<_>, _>>()?;

        let adapter = Self {
            name,
            runtime,
            adapter_id: config.adapter_id.clone(),
            replica_group_id: config.replica_group_id.clone(),
            acceptors,
            configured_published: config.published_endpoints.clone(),
            published: Mutex::new(Vec::new()),
            locator: Mutex::new(locator),
            servants: Mutex::new(ServantTable::default()),
            lifecycle: watch::channel(Lifecycle {
                state: AdapterState::Uninitialized,
                dispatches: 0,
                registered: false,
                connections_closed: false,
            })
            .0,
        };
        *adapter.published.lock() = adapter.compute_published_endpoints();
        Ok(adapter)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adapter_id(&self) -> &str {
        &self.adapter_id
    }

    pub fn replica_group_id(&self) -> &str {
        &self.replica_group_id
    }

    pub fn state(&self) -> AdapterState {
        self.lifecycle.borrow().state
    }

    /// Number of collocated dispatches currently running.
    pub fn dispatch_count(&self) -> usize {
        self.lifecycle.borrow().dispatches
    }

    /// The endpoints the acceptors are bound to.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.acceptors.iter().map(|acceptor| acceptor.endpoint()).collect()
    }

    async fn wait_until(&self, condition: impl FnMut(&Lifecycle) -> bool) -> Lifecycle {
        let mut receiver = self.lifecycle.subscribe();
        let lifecycle = match receiver.wait_for(condition).await {
            Ok(lifecycle) => *lifecycle,
            // Unreachable while `self` owns the sender.
            Err(_) => *self.lifecycle.borrow(),
        };
        lifecycle
    }

    fn refusal(&self, state: AdapterState) -> Option<AdapterError> {
        if state >= AdapterState::Destroying {
            Some(AdapterError::Destroyed(self.name.clone()))
        } else if state.is_deactivating() {
            Some(AdapterError::Deactivated(self.name.clone()))
        } else {
            None
        }
    }

    /// Fails once deactivation has started.
    pub fn check_for_deactivation(&self) -> Result<(), AdapterError> {
        match self.refusal(self.state()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    // =========================================================================
    // State machine
    // =========================================================================

    /// Publishes the adapter's endpoints (first activation only) and starts
    /// accepting requests.
    ///
    /// On a registration failure the adapter returns to the state it was in
    /// and activation can be retried.
    #[instrument(skip(self), fields(adapter = %self.name))]
    pub async fn activate(&self) -> Result<(), AdapterError> {
        let (previous, registered) = loop {
            let mut claim = Claim::Wait;
            self.lifecycle.send_if_modified(|lifecycle| match lifecycle.state {
                AdapterState::Uninitialized | AdapterState::Held => {
                    claim = Claim::Proceed {
                        previous: lifecycle.state,
                        registered: lifecycle.registered,
                    };
                    lifecycle.state = AdapterState::Activating;
                    true
                }
                AdapterState::Activating => false,
                AdapterState::Active => {
                    claim = Claim::Done;
                    false
                }
                state => {
                    if let Some(error) = self.refusal(state) {
                        claim = Claim::Refused(error);
                    }
                    false
                }
            });

            match claim {
                Claim::Proceed {
                    previous,
                    registered,
                } => break (previous, registered),
                Claim::Wait => {
                    self.wait_until(|lifecycle| lifecycle.state != AdapterState::Activating)
                        .await;
                }
                Claim::Done => return Ok(()),
                Claim::Refused(error) => return Err(error),
            }
        };

        if !registered {
            if let Err(error) = self.update_directory(true).await {
                warn!(%error, "Activation failed");
                self.lifecycle.send_modify(|lifecycle| {
                    if lifecycle.state == AdapterState::Activating {
                        lifecycle.state = previous;
                    }
                });
                return Err(error);
            }
        }

        let mut now_active = false;
        self.lifecycle.send_modify(|lifecycle| {
            lifecycle.registered = true;
            // A hold or deactivate that arrived meanwhile wins.
            if lifecycle.state == AdapterState::Activating {
                lifecycle.state = AdapterState::Active;
                now_active = true;
            }
        });
        if now_active {
            for acceptor in &self.acceptors {
                acceptor.activate();
            }
            info!(adapter_id = %self.adapter_id, "Activated");
        }
        Ok(())
    }

    /// Stops reading new requests without closing connections.
    pub fn hold(&self) -> Result<(), AdapterError> {
        let mut refused = None;
        self.lifecycle.send_if_modified(|lifecycle| {
            refused = self.refusal(lifecycle.state);
            if refused.is_some() || lifecycle.state == AdapterState::Held {
                return false;
            }
            lifecycle.state = AdapterState::Held;
            true
        });
        if let Some(error) = refused {
            return Err(error);
        }
        for acceptor in &self.acceptors {
            acceptor.hold();
        }
        debug!(adapter = %self.name, "Held");
        Ok(())
    }

    /// Resolves once every acceptor has stopped reading requests.
    pub async fn wait_for_hold(&self) -> Result<(), AdapterError> {
        self.check_for_deactivation()?;
        for acceptor in &self.acceptors {
            acceptor.wait_until_holding().await;
        }
        Ok(())
    }

    /// Refuses new requests, withdraws the adapter's endpoints from the
    /// directory and closes its acceptors. Completes to `Deactivated` once the
    /// last in-flight dispatch has drained. Calling it again is a no-op.
    #[instrument(skip(self), fields(adapter = %self.name))]
    pub async fn deactivate(&self) {
        // An activation in progress finishes first so directory updates stay ordered.
        self.wait_until(|lifecycle| lifecycle.state != AdapterState::Activating)
            .await;

        let mut registered = None;
        self.lifecycle.send_if_modified(|lifecycle| {
            if lifecycle.state.is_deactivating() {
                return false;
            }
            registered = Some(lifecycle.registered);
            lifecycle.state = AdapterState::Deactivating;
            true
        });
        let Some(registered) = registered else {
            return;
        };
        info!("Deactivating");

        if registered {
            if let Err(error) = self.update_directory(false).await {
                warn!(%error, "Failed to withdraw endpoints from the directory");
            }
        }

        for acceptor in &self.acceptors {
            acceptor.destroy();
        }

        self.lifecycle.send_modify(|lifecycle| {
            lifecycle.connections_closed = true;
            if lifecycle.drained() {
                lifecycle.state = AdapterState::Deactivated;
            }
        });
    }

    /// Resolves once the adapter is deactivated and its acceptors are closed.
    pub async fn wait_for_deactivate(&self) {
        self.wait_until(|lifecycle| lifecycle.state >= AdapterState::Deactivated)
            .await;
        for acceptor in &self.acceptors {
            acceptor.wait_until_finished().await;
        }
    }

    pub fn is_deactivated(&self) -> bool {
        self.state() >= AdapterState::Deactivated
    }

    /// Deactivates, waits for the drain and releases every servant.
    ///
    /// Concurrent and repeated calls all return once the adapter is destroyed.
    #[instrument(skip(self), fields(adapter = %self.name))]
    pub async fn destroy(&self) {
        self.deactivate().await;
        self.wait_for_deactivate().await;

        let mut claimed = false;
        self.lifecycle.send_if_modified(|lifecycle| {
            if lifecycle.state != AdapterState::Deactivated {
                return false;
            }
            lifecycle.state = AdapterState::Destroying;
            claimed = true;
            true
        });
        if !claimed {
            self.wait_until(|lifecycle| lifecycle.state == AdapterState::Destroyed)
                .await;
            return;
        }

        self.servants.lock().clear();
        self.runtime.forget_adapter(&self.name);
        self.lifecycle.send_modify(|lifecycle| {
            lifecycle.state = AdapterState::Destroyed;
        });
        info!("Destroyed");
    }

    // =========================================================================
    // Dispatch accounting
    // =========================================================================

    /// Counts a collocated dispatch until the returned guard is dropped.
    /// Refused once deactivation has started.
    pub fn begin_dispatch(&self) -> Result<DispatchGuard<'_>, AdapterError> {
        let mut refused = None;
        self.lifecycle.send_if_modified(|lifecycle| {
            refused = self.refusal(lifecycle.state);
            if refused.is_some() {
                return false;
            }
            lifecycle.dispatches += 1;
            true
        });
        match refused {
            Some(error) => Err(error),
            None => Ok(DispatchGuard { adapter: self }),
        }
    }

    /// Runs a request against a servant of this adapter, in process.
    #[instrument(skip(self, payload), fields(adapter = %self.name, %identity))]
    pub async fn dispatch_collocated(
        &self,
        identity: &Identity,
        facet: &str,
        operation: &str,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, AdapterError> {
        let _guard = self.begin_dispatch()?;
        let servant = self
            .find(identity, facet)
            .ok_or_else(|| AdapterError::ObjectNotExist {
                identity: identity.clone(),
                facet: facet.to_owned(),
            })?;
        let current = Current {
            adapter: self.name.clone(),
            identity: identity.clone(),
            facet: facet.to_owned(),
            operation: operation.to_owned(),
        };
        debug!(operation, "Dispatching");
        servant
            .dispatch(&current, payload)
            .await
            .map_err(AdapterError::Servant)
    }

    // =========================================================================
    // Servants
    // =========================================================================

    /// Registers `servant` under `identity` and returns a proxy for it.
    pub fn add(&self, identity: Identity, servant: Arc<dyn Servant>) -> Result<Proxy, AdapterError> {
        self.add_facet(identity, "", servant)
    }

    pub fn add_facet(
        &self,
        identity: Identity,
        facet: &str,
        servant: Arc<dyn Servant>,
    ) -> Result<Proxy, AdapterError> {
        self.check_for_deactivation()?;
        let proxy = self.create_proxy(identity.clone())?.with_facet(facet);
        self.servants.lock().add(&identity, facet, servant)?;
        debug!(adapter = %self.name, %identity, facet, "Added servant");
        Ok(proxy)
    }

    pub fn remove(&self, identity: &Identity, facet: &str) -> Result<Arc<dyn Servant>, AdapterError> {
        self.check_for_deactivation()?;
        self.servants.lock().remove(identity, facet)
    }

    pub fn find(&self, identity: &Identity, facet: &str) -> Option<Arc<dyn Servant>> {
        self.servants.lock().find(identity, facet)
    }

    // =========================================================================
    // Proxies
    // =========================================================================

    /// Indirect proxy when the adapter has an adapter id, direct otherwise.
    pub fn create_proxy(&self, identity: Identity) -> Result<Proxy, AdapterError> {
        if self.adapter_id.is_empty() {
            self.create_direct_proxy(identity)
        } else {
            self.create_indirect_proxy(identity)
        }
    }

    /// Proxy carrying the adapter's published endpoints.
    pub fn create_direct_proxy(&self, identity: Identity) -> Result<Proxy, AdapterError> {
        let endpoints = self.published_endpoints();
        self.new_proxy(identity, Addressing::Direct(endpoints))
    }

    /// Proxy naming the replica group, or the adapter id when there is none.
    pub fn create_indirect_proxy(&self, identity: Identity) -> Result<Proxy, AdapterError> {
        let id = if self.replica_group_id.is_empty() {
            &self.adapter_id
        } else {
            &self.replica_group_id
        };
        self.new_proxy(identity, Addressing::Indirect(id.clone()))
    }

    fn new_proxy(&self, identity: Identity, addressing: Addressing) -> Result<Proxy, AdapterError> {
        self.check_for_deactivation()?;
        let mut defaults = self.runtime.reference_defaults().clone();
        defaults.locator = self.locator.lock().clone();
        let reference = Reference::with_defaults(identity, addressing, &defaults)?;
        Ok(Proxy::new(Arc::new(reference), Arc::clone(&self.runtime)))
    }

    // =========================================================================
    // Published endpoints & directory
    // =========================================================================

    pub fn published_endpoints(&self) -> Vec<Endpoint> {
        self.published.lock().clone()
    }

    fn compute_published_endpoints(&self) -> Vec<Endpoint> {
        match &self.configured_published {
            Some(endpoints) => endpoints.clone(),
            None => self.endpoints(),
        }
    }

    /// Replaces the published endpoints, pushing them to the directory if
    /// the adapter has registered before.
    pub async fn set_published_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<(), AdapterError> {
        self.check_for_deactivation()?;
        *self.published.lock() = endpoints;
        self.republish().await
    }

    /// Recomputes the published endpoints from configuration and acceptors.
    pub async fn refresh_published_endpoints(&self) -> Result<(), AdapterError> {
        self.check_for_deactivation()?;
        *self.published.lock() = self.compute_published_endpoints();
        self.republish().await
    }

    async fn republish(&self) -> Result<(), AdapterError> {
        let registered = self.lifecycle.borrow().registered;
        if registered {
            self.update_directory(true).await?;
        }
        Ok(())
    }

    pub fn locator(&self) -> Option<Proxy> {
        self.locator
            .lock()
            .clone()
            .map(|locator| Proxy::new(locator, Arc::clone(&self.runtime)))
    }

    /// Changes the directory used for registration and for new proxies.
    pub fn set_locator(&self, locator: Option<&Proxy>) -> Result<(), AdapterError> {
        self.check_for_deactivation()?;
        *self.locator.lock() = locator.map(|proxy| Arc::clone(proxy.reference()));
        Ok(())
    }

    /// Publishes (`publish`) or withdraws the adapter's endpoints. Adapters
    /// without an adapter id or without a locator have nothing to do.
    async fn update_directory(&self, publish: bool) -> Result<(), AdapterError> {
        if self.adapter_id.is_empty() {
            return Ok(());
        }
        let locator = self.locator.lock().clone();
        let Some(locator) = locator else {
            return Ok(());
        };

        let resolver = self.runtime.directories().get(&locator)?;
        let Some(registration) = resolver.registration().await? else {
            debug!(adapter_id = %self.adapter_id, "Directory has no registration entry point");
            return Ok(());
        };

        let endpoints = publish.then(|| self.published_endpoints());
        registration
            .set_adapter_endpoints(&self.adapter_id, &self.replica_group_id, endpoints.clone())
            .await?;

        match endpoints {
            Some(endpoints) => info!(
                adapter_id = %self.adapter_id,
                replica_group_id = %self.replica_group_id,
                count = endpoints.len(),
                "Published endpoints"
            ),
            None => info!(adapter_id = %self.adapter_id, "Withdrew endpoints"),
        }
        Ok(())
    }
}

/// Keeps a collocated dispatch counted while alive.
pub struct DispatchGuard<'a> {
    adapter: &'a ObjectAdapter,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.adapter.lifecycle.send_modify(|lifecycle| {
            lifecycle.dispatches -= 1;
            if lifecycle.drained() {
                lifecycle.state = AdapterState::Deactivated;
            }
        });
    }
}
