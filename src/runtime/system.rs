use super::{AdapterConfig, RuntimeConfig, RuntimeError};
use crate::adapter::{AcceptorFactory, AdapterError, LocalAcceptorFactory, ObjectAdapter};
use crate::directory::{DirectoryConnector, DirectoryRegistry};
use crate::proxy::{Proxy, ProxyError};
use crate::reference::{parse_reference, Addressing, Endpoint, Identity, Reference, ReferenceDefaults};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Assembles a [`Runtime`] from configuration and its external collaborators.
///
/// # Example
///
/// ```ignore
/// let runtime = RuntimeBuilder::new(config)
///     .with_directory_connector(Arc::new(directory))
///     .build()?;
///
/// let proxy = runtime.string_to_proxy("hello @ HelloAdapter")?;
/// // ...
/// runtime.shutdown().await;
/// ```
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    connector: Option<Arc<dyn DirectoryConnector>>,
    acceptors: Option<Arc<dyn AcceptorFactory>>,
}

impl RuntimeBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            connector: None,
            acceptors: None,
        }
    }

    /// Client side of the directory service. Without one, indirect proxies cannot be resolved.
    pub fn with_directory_connector(mut self, connector: Arc<dyn DirectoryConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Transport used by adapters to listen. Defaults to [`LocalAcceptorFactory`].
    pub fn with_acceptor_factory(mut self, acceptors: Arc<dyn AcceptorFactory>) -> Self {
        self.acceptors = Some(acceptors);
        self
    }

    pub fn build(self) -> Result<Arc<Runtime>, RuntimeError> {
        let defaults = self.config.reference_defaults()?;
        let directories =
            DirectoryRegistry::new(self.connector, self.config.background_locator_cache_updates);
        let acceptors = self
            .acceptors
            .unwrap_or_else(|| Arc::new(LocalAcceptorFactory::default()));

        info!(
            locator = self.config.default_locator.as_deref().unwrap_or("none"),
            "Runtime started"
        );
        Ok(Arc::new(Runtime {
            config: self.config,
            defaults,
            directories,
            acceptors,
            adapters: Mutex::new(HashMap::new()),
            next_adapter: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        }))
    }
}

/// Owns everything proxies and adapters share: configuration, reference
/// defaults, the directory registry and the set of live adapters.
///
/// `shutdown()` destroys every live adapter and then the directory registry.
pub struct Runtime {
    config: RuntimeConfig,
    defaults: ReferenceDefaults,
    directories: DirectoryRegistry,
    acceptors: Arc<dyn AcceptorFactory>,
    /// Live adapters. An entry is removed only when its adapter is destroyed.
    adapters: Mutex<HashMap<String, Arc<ObjectAdapter>>>,
    next_adapter: AtomicU64,
    shut_down: AtomicBool,
}

impl Runtime {
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn reference_defaults(&self) -> &ReferenceDefaults {
        &self.defaults
    }

    pub fn directories(&self) -> &DirectoryRegistry {
        &self.directories
    }

    pub fn acceptor_factory(&self) -> &Arc<dyn AcceptorFactory> {
        &self.acceptors
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Proxies
    // =========================================================================

    /// Parses a proxy string; unspecified settings come from the configuration.
    pub fn string_to_proxy(self: &Arc<Self>, text: &str) -> Result<Proxy, ProxyError> {
        let reference = parse_reference(text, &self.defaults)?;
        Ok(self.proxy(reference))
    }

    pub fn proxy(self: &Arc<Self>, reference: Reference) -> Proxy {
        Proxy::new(Arc::new(reference), Arc::clone(self))
    }

    pub fn create_direct_proxy(
        self: &Arc<Self>,
        identity: Identity,
        endpoints: Vec<Endpoint>,
    ) -> Result<Proxy, ProxyError> {
        let reference =
            Reference::with_defaults(identity, Addressing::Direct(endpoints), &self.defaults)?;
        Ok(self.proxy(reference))
    }

    /// An empty `adapter_id` makes a well-known proxy.
    pub fn create_indirect_proxy(
        self: &Arc<Self>,
        identity: Identity,
        adapter_id: impl Into<String>,
    ) -> Result<Proxy, ProxyError> {
        let reference = Reference::with_defaults(
            identity,
            Addressing::Indirect(adapter_id.into()),
            &self.defaults,
        )?;
        Ok(self.proxy(reference))
    }

    /// The configured default directory.
    pub fn default_locator(self: &Arc<Self>) -> Option<Proxy> {
        self.defaults
            .locator
            .as_ref()
            .map(|locator| Proxy::new(Arc::clone(locator), Arc::clone(self)))
    }

    // =========================================================================
    // Adapters
    // =========================================================================

    /// Creates an adapter configured from `config.adapters[name]`, or with
    /// defaults when there is no such entry.
    pub async fn create_object_adapter(
        self: &Arc<Self>,
        name: &str,
    ) -> Result<Arc<ObjectAdapter>, AdapterError> {
        let config = self.config.adapters.get(name).cloned().unwrap_or_default();
        self.create_object_adapter_with_config(name, config).await
    }

    /// Creates an adapter from explicit settings. An empty name gets a
    /// generated one. The adapter is held or activated according to
    /// `hold_on_creation`.
    pub async fn create_object_adapter_with_config(
        self: &Arc<Self>,
        name: &str,
        config: AdapterConfig,
    ) -> Result<Arc<ObjectAdapter>, AdapterError> {
        if self.is_shut_down() {
            return Err(AdapterError::RuntimeShutdown);
        }
        let name = if name.is_empty() {
            format!("adapter-{}", self.next_adapter.fetch_add(1, Ordering::SeqCst))
        } else {
            name.to_owned()
        };

        let locator = match &config.locator {
            Some(text) => Some(Arc::new(parse_reference(text, &self.defaults)?)),
            None => self.defaults.locator.clone(),
        };

        let adapter = {
            let mut adapters = self.adapters.lock();
            if adapters.contains_key(&name) {
                return Err(AdapterError::NameInUse(name));
            }
            let adapter = Arc::new(ObjectAdapter::new(
                name.clone(),
                Arc::clone(self),
                &config,
                locator,
            )?);
            adapters.insert(name.clone(), Arc::clone(&adapter));
            adapter
        };
        info!(adapter = %name, adapter_id = %config.adapter_id, "Created object adapter");

        let started = if config.hold_on_creation {
            adapter.hold()
        } else {
            adapter.activate().await
        };
        if let Err(error) = started {
            adapter.destroy().await;
            return Err(error);
        }
        Ok(adapter)
    }

    /// Live adapter by name.
    pub fn find_object_adapter(&self, name: &str) -> Option<Arc<ObjectAdapter>> {
        self.adapters.lock().get(name).cloned()
    }

    pub(crate) fn forget_adapter(&self, name: &str) {
        self.adapters.lock().remove(name);
    }

    /// Destroys every live adapter, then the directory registry. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down runtime...");

        let live: Vec<Arc<ObjectAdapter>> = self
            .adapters
            .lock()
            .values()
            .cloned()
            .collect();
        for adapter in live {
            adapter.destroy().await;
        }

        self.directories.destroy();
        info!("Runtime shutdown complete.");
    }
}
