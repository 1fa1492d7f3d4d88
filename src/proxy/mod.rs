//! # Proxy Façade
//!
//! The user-facing handle to a remote object: a [`Reference`] plus the
//! [`Runtime`] whose directories resolve it.
//!
//! Proxies are always valid and never null. Configuration methods return new
//! proxies; when nothing changes the returned proxy shares the original
//! reference instance.

mod error;

pub use error::ProxyError;

use crate::directory::{CacheTtl, Resolver};
use crate::reference::{
    EncodingVersion, Endpoint, EndpointSelection, FixedConnection, Identity, InvocationMode,
    Reference,
};
use crate::runtime::Runtime;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Where the invocation layer should send a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationTarget {
    /// Reuse this established connection.
    Connection(FixedConnection),
    /// Connect to one of these endpoints; `cached` tells whether they came from
    /// the directory cache and may therefore be stale.
    Endpoints { endpoints: Vec<Endpoint>, cached: bool },
}

#[derive(Clone)]
pub struct Proxy {
    reference: Arc<Reference>,
    runtime: Arc<Runtime>,
}

impl Proxy {
    pub(crate) fn new(reference: Arc<Reference>, runtime: Arc<Runtime>) -> Self {
        Self { reference, runtime }
    }

    fn derive(&self, reference: Arc<Reference>) -> Self {
        Self {
            reference,
            runtime: Arc::clone(&self.runtime),
        }
    }

    pub fn reference(&self) -> &Arc<Reference> {
        &self.reference
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn identity(&self) -> &Identity {
        self.reference.identity()
    }

    pub fn facet(&self) -> &str {
        self.reference.facet()
    }

    pub fn adapter_id(&self) -> &str {
        self.reference.adapter_id()
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        self.reference.endpoints()
    }

    pub fn mode(&self) -> InvocationMode {
        self.reference.mode()
    }

    pub fn is_twoway(&self) -> bool {
        self.reference.mode().is_twoway()
    }

    pub fn is_secure(&self) -> bool {
        self.reference.is_secure()
    }

    pub fn is_prefer_secure(&self) -> bool {
        self.reference.is_prefer_secure()
    }

    pub fn encoding(&self) -> EncodingVersion {
        self.reference.encoding()
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        self.reference.context()
    }

    pub fn is_connection_cached(&self) -> bool {
        self.reference.is_connection_cached()
    }

    pub fn connection_id(&self) -> &str {
        self.reference.connection_id()
    }

    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.reference.invocation_timeout()
    }

    pub fn compress(&self) -> Option<bool> {
        self.reference.compress()
    }

    pub fn endpoint_selection(&self) -> EndpointSelection {
        self.reference.endpoint_selection()
    }

    pub fn locator_cache_timeout(&self) -> i32 {
        self.reference.locator_cache_timeout()
    }

    pub fn is_collocation_optimized(&self) -> bool {
        self.reference.is_collocation_optimized()
    }

    pub fn is_fixed(&self) -> bool {
        self.reference.is_fixed()
    }

    pub fn locator(&self) -> Option<Proxy> {
        self.reference
            .locator()
            .map(|locator| self.derive(Arc::clone(locator)))
    }

    pub fn router(&self) -> Option<Proxy> {
        self.reference
            .router()
            .map(|router| self.derive(Arc::clone(router)))
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    pub fn with_identity(&self, identity: Identity) -> Result<Self, ProxyError> {
        Ok(self.derive(self.reference.with_identity(identity)?))
    }

    pub fn with_facet(&self, facet: impl Into<String>) -> Self {
        self.derive(self.reference.with_facet(facet))
    }

    pub fn with_mode(&self, mode: InvocationMode) -> Self {
        self.derive(self.reference.with_mode(mode))
    }

    pub fn with_twoway(&self) -> Self {
        self.with_mode(InvocationMode::Twoway)
    }

    pub fn with_oneway(&self) -> Self {
        self.with_mode(InvocationMode::Oneway)
    }

    pub fn with_secure(&self, secure: bool) -> Self {
        self.derive(self.reference.with_secure(secure))
    }

    pub fn with_encoding(&self, encoding: EncodingVersion) -> Self {
        self.derive(self.reference.with_encoding(encoding))
    }

    pub fn with_context(&self, context: BTreeMap<String, String>) -> Self {
        self.derive(self.reference.with_context(context))
    }

    pub fn with_compress(&self, compress: bool) -> Self {
        self.derive(self.reference.with_compress(compress))
    }

    pub fn with_invocation_timeout(&self, timeout: Option<Duration>) -> Self {
        self.derive(self.reference.with_invocation_timeout(timeout))
    }

    pub fn with_fixed_connection(&self, connection: FixedConnection) -> Self {
        self.derive(self.reference.with_fixed_connection(connection))
    }

    pub fn with_adapter_id(&self, adapter_id: impl Into<String>) -> Result<Self, ProxyError> {
        Ok(self.derive(self.reference.with_adapter_id(adapter_id)?))
    }

    pub fn with_endpoints(&self, endpoints: Vec<Endpoint>) -> Result<Self, ProxyError> {
        Ok(self.derive(self.reference.with_endpoints(endpoints)?))
    }

    pub fn with_locator(&self, locator: Option<&Proxy>) -> Result<Self, ProxyError> {
        let locator = locator.map(|proxy| Arc::clone(&proxy.reference));
        Ok(self.derive(self.reference.with_locator(locator)?))
    }

    pub fn with_router(&self, router: Option<&Proxy>) -> Result<Self, ProxyError> {
        let router = router.map(|proxy| Arc::clone(&proxy.reference));
        Ok(self.derive(self.reference.with_router(router)?))
    }

    pub fn with_connection_cached(&self, cached: bool) -> Result<Self, ProxyError> {
        Ok(self.derive(self.reference.with_connection_cached(cached)?))
    }

    pub fn with_connection_id(&self, connection_id: impl Into<String>) -> Result<Self, ProxyError> {
        Ok(self.derive(self.reference.with_connection_id(connection_id)?))
    }

    pub fn with_prefer_secure(&self, prefer_secure: bool) -> Result<Self, ProxyError> {
        Ok(self.derive(self.reference.with_prefer_secure(prefer_secure)?))
    }

    pub fn with_endpoint_selection(&self, selection: EndpointSelection) -> Result<Self, ProxyError> {
        Ok(self.derive(self.reference.with_endpoint_selection(selection)?))
    }

    pub fn with_locator_cache_timeout(&self, timeout: i32) -> Result<Self, ProxyError> {
        Ok(self.derive(self.reference.with_locator_cache_timeout(timeout)?))
    }

    pub fn with_collocation_optimized(&self, optimized: bool) -> Result<Self, ProxyError> {
        Ok(self.derive(self.reference.with_collocation_optimized(optimized)?))
    }

    // -------------------------------------------------------------------------
    // Invocation support
    // -------------------------------------------------------------------------

    /// Fails unless the proxy is twoway; called before sending operations that return a value.
    pub fn check_twoway_only(&self, operation: &str) -> Result<(), ProxyError> {
        if self.is_twoway() {
            Ok(())
        } else {
            Err(ProxyError::TwowayOnly {
                operation: operation.to_owned(),
            })
        }
    }

    /// The resolver of this proxy's directory, if it is indirect and has one.
    pub fn resolver(&self) -> Result<Option<Resolver>, ProxyError> {
        if !self.reference.is_indirect() {
            return Ok(None);
        }
        match self.reference.locator() {
            Some(locator) => Ok(Some(self.runtime.directories().get(locator)?)),
            None => Ok(None),
        }
    }

    /// Determines where a request through this proxy goes, consulting the
    /// directory for indirect proxies.
    #[instrument(skip(self), fields(proxy = %self))]
    pub async fn resolve_target(&self) -> Result<InvocationTarget, ProxyError> {
        if let Some(connection) = self.reference.fixed_connection() {
            return Ok(InvocationTarget::Connection(connection.clone()));
        }
        if !self.reference.is_indirect() {
            return Ok(InvocationTarget::Endpoints {
                endpoints: self.reference.endpoints().to_vec(),
                cached: false,
            });
        }

        let resolver = self
            .resolver()?
            .ok_or_else(|| ProxyError::NoEndpoint(self.to_string()))?;
        let ttl = CacheTtl::from(self.reference.locator_cache_timeout());
        let resolved = resolver.resolve_endpoints(&self.reference, ttl).await?;
        debug!(count = resolved.endpoints.len(), cached = resolved.cached, "Resolved target");
        Ok(InvocationTarget::Endpoints {
            endpoints: resolved.endpoints,
            cached: resolved.cached,
        })
    }

    /// Validates the invocation mode and resolves the target in one step.
    pub async fn prepare_invocation(
        &self,
        operation: &str,
        twoway_only: bool,
    ) -> Result<InvocationTarget, ProxyError> {
        if twoway_only {
            self.check_twoway_only(operation)?;
        }
        self.resolve_target().await
    }

    /// Drops cached directory answers for this proxy, e.g. after its endpoints
    /// turned out to be unreachable.
    pub fn clear_locator_cache(&self) -> Result<(), ProxyError> {
        if let Some(resolver) = self.resolver()? {
            resolver.clear_cache(&self.reference);
        }
        Ok(())
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        *self.reference == *other.reference
    }
}

impl Eq for Proxy {}

impl Hash for Proxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.reference.hash(state);
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Proxy").field(&self.reference.to_string()).finish()
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.reference, f)
    }
}
