//! # The Immutable Reference
//!
//! A [`Reference`] is the complete description of how to reach a remote object and
//! how to invoke it. It is never mutated: every `with_*` method returns a new
//! `Arc<Reference>` that differs in exactly one field, or the *same* `Arc` when the
//! requested value is already in place.

use super::{
    EncodingVersion, Endpoint, EndpointSelection, Identity, InvocationMode, ProtocolVersion,
    ReferenceError,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Handle to an already established connection that a fixed reference is bound to.
///
/// The connection itself belongs to the transport layer; this value only
/// identifies it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FixedConnection {
    pub id: u64,
    pub endpoint: Endpoint,
}

impl FixedConnection {
    pub fn new(id: u64, endpoint: Endpoint) -> Self {
        Self { id, endpoint }
    }
}

/// Where a reference's requests go.
///
/// Exactly one addressing mode is active at a time, which is what makes
/// "direct endpoints XOR adapter id" impossible to violate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Addressing {
    /// Literal, non-empty, ordered list of endpoints.
    Direct(Vec<Endpoint>),
    /// Adapter id or replica group id resolved through the directory.
    /// An empty id makes this a well-known reference, resolved by identity.
    Indirect(String),
    /// Bound to an existing connection; neither endpoints nor an adapter id apply.
    Fixed(FixedConnection),
}

/// Values a freshly created reference starts from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDefaults {
    pub encoding: EncodingVersion,
    pub locator: Option<Arc<Reference>>,
    pub locator_cache_timeout: i32,
    pub prefer_secure: bool,
    pub cache_connection: bool,
    pub endpoint_selection: EndpointSelection,
    pub invocation_timeout: Option<Duration>,
}

impl Default for ReferenceDefaults {
    fn default() -> Self {
        Self {
            encoding: EncodingVersion::default(),
            locator: None,
            locator_cache_timeout: -1,
            prefer_secure: false,
            cache_connection: true,
            endpoint_selection: EndpointSelection::Random,
            invocation_timeout: None,
        }
    }
}

/// Immutable addressing and invocation configuration of a remote object.
///
/// Equality and hashing are structural over every field, so two references
/// built independently from the same proxy string compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub(super) identity: Identity,
    pub(super) facet: String,
    pub(super) mode: InvocationMode,
    pub(super) secure: bool,
    pub(super) protocol: ProtocolVersion,
    pub(super) encoding: EncodingVersion,
    pub(super) addressing: Addressing,
    pub(super) locator: Option<Arc<Reference>>,
    pub(super) router: Option<Arc<Reference>>,
    pub(super) context: BTreeMap<String, String>,
    pub(super) cache_connection: bool,
    pub(super) connection_id: String,
    pub(super) invocation_timeout: Option<Duration>,
    pub(super) prefer_secure: bool,
    pub(super) compress: Option<bool>,
    pub(super) endpoint_selection: EndpointSelection,
    pub(super) locator_cache_timeout: i32,
    pub(super) collocation_optimized: bool,
}

impl Reference {
    /// Creates a reference with the given identity and addressing, taking every
    /// other setting from `defaults`.
    pub fn with_defaults(
        identity: Identity,
        addressing: Addressing,
        defaults: &ReferenceDefaults,
    ) -> Result<Self, ReferenceError> {
        if identity.is_empty() {
            return Err(ReferenceError::IllegalIdentity);
        }
        let addressing = match addressing {
            Addressing::Direct(endpoints) if endpoints.is_empty() => {
                Addressing::Indirect(String::new())
            }
            other => other,
        };
        Ok(Self {
            identity,
            facet: String::new(),
            mode: InvocationMode::Twoway,
            secure: false,
            protocol: ProtocolVersion::default(),
            encoding: defaults.encoding,
            addressing,
            locator: defaults.locator.clone(),
            router: None,
            context: BTreeMap::new(),
            cache_connection: defaults.cache_connection,
            connection_id: String::new(),
            invocation_timeout: defaults.invocation_timeout,
            prefer_secure: defaults.prefer_secure,
            compress: None,
            endpoint_selection: defaults.endpoint_selection,
            locator_cache_timeout: defaults.locator_cache_timeout,
            collocation_optimized: true,
        })
    }

    /// Direct reference with built-in defaults.
    pub fn direct(identity: Identity, endpoints: Vec<Endpoint>) -> Result<Self, ReferenceError> {
        Self::with_defaults(identity, Addressing::Direct(endpoints), &ReferenceDefaults::default())
    }

    /// Indirect reference with built-in defaults. An empty adapter id yields a
    /// well-known reference.
    pub fn indirect(
        identity: Identity,
        adapter_id: impl Into<String>,
    ) -> Result<Self, ReferenceError> {
        Self::with_defaults(
            identity,
            Addressing::Indirect(adapter_id.into()),
            &ReferenceDefaults::default(),
        )
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn facet(&self) -> &str {
        &self.facet
    }

    pub fn mode(&self) -> InvocationMode {
        self.mode
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    pub fn encoding(&self) -> EncodingVersion {
        self.encoding
    }

    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    /// The adapter or replica group id; empty for direct, fixed and well-known references.
    pub fn adapter_id(&self) -> &str {
        match &self.addressing {
            Addressing::Indirect(adapter_id) => adapter_id,
            _ => "",
        }
    }

    /// The literal endpoints; empty unless the reference is direct.
    pub fn endpoints(&self) -> &[Endpoint] {
        match &self.addressing {
            Addressing::Direct(endpoints) => endpoints,
            _ => &[],
        }
    }

    pub fn fixed_connection(&self) -> Option<&FixedConnection> {
        match &self.addressing {
            Addressing::Fixed(connection) => Some(connection),
            _ => None,
        }
    }

    pub fn locator(&self) -> Option<&Arc<Reference>> {
        self.locator.as_ref()
    }

    pub fn router(&self) -> Option<&Arc<Reference>> {
        self.router.as_ref()
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn is_connection_cached(&self) -> bool {
        self.cache_connection
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.invocation_timeout
    }

    pub fn is_prefer_secure(&self) -> bool {
        self.prefer_secure
    }

    pub fn compress(&self) -> Option<bool> {
        self.compress
    }

    pub fn endpoint_selection(&self) -> EndpointSelection {
        self.endpoint_selection
    }

    pub fn locator_cache_timeout(&self) -> i32 {
        self.locator_cache_timeout
    }

    pub fn is_collocation_optimized(&self) -> bool {
        self.collocation_optimized
    }

    pub fn is_indirect(&self) -> bool {
        matches!(self.addressing, Addressing::Indirect(_))
    }

    /// Indirect reference without an adapter id: resolved by its identity alone.
    pub fn is_well_known(&self) -> bool {
        matches!(&self.addressing, Addressing::Indirect(adapter_id) if adapter_id.is_empty())
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.addressing, Addressing::Fixed(_))
    }

    // -------------------------------------------------------------------------
    // Copy-on-write changes
    // -------------------------------------------------------------------------

    fn update<T: PartialEq>(
        self: &Arc<Self>,
        current: &T,
        value: T,
        apply: impl FnOnce(&mut Reference, T),
    ) -> Arc<Self> {
        if *current == value {
            return Arc::clone(self);
        }
        let mut next = Reference::clone(self);
        apply(&mut next, value);
        Arc::new(next)
    }

    fn check_not_fixed(&self, what: &'static str) -> Result<(), ReferenceError> {
        if self.is_fixed() {
            Err(ReferenceError::FixedProxy(what))
        } else {
            Ok(())
        }
    }

    pub fn with_identity(self: &Arc<Self>, identity: Identity) -> Result<Arc<Self>, ReferenceError> {
        if identity.is_empty() {
            return Err(ReferenceError::IllegalIdentity);
        }
        Ok(self.update(&self.identity, identity, |r, v| r.identity = v))
    }

    pub fn with_facet(self: &Arc<Self>, facet: impl Into<String>) -> Arc<Self> {
        self.update(&self.facet, facet.into(), |r, v| r.facet = v)
    }

    pub fn with_mode(self: &Arc<Self>, mode: InvocationMode) -> Arc<Self> {
        self.update(&self.mode, mode, |r, v| r.mode = v)
    }

    pub fn with_secure(self: &Arc<Self>, secure: bool) -> Arc<Self> {
        self.update(&self.secure, secure, |r, v| r.secure = v)
    }

    pub fn with_encoding(self: &Arc<Self>, encoding: EncodingVersion) -> Arc<Self> {
        self.update(&self.encoding, encoding, |r, v| r.encoding = v)
    }

    pub fn with_context(self: &Arc<Self>, context: BTreeMap<String, String>) -> Arc<Self> {
        self.update(&self.context, context, |r, v| r.context = v)
    }

    pub fn with_compress(self: &Arc<Self>, compress: bool) -> Arc<Self> {
        self.update(&self.compress, Some(compress), |r, v| r.compress = v)
    }

    pub fn with_invocation_timeout(self: &Arc<Self>, timeout: Option<Duration>) -> Arc<Self> {
        self.update(&self.invocation_timeout, timeout, |r, v| r.invocation_timeout = v)
    }

    /// Binds the reference to an existing connection. Directory, router and
    /// locator settings no longer apply afterwards.
    pub fn with_fixed_connection(self: &Arc<Self>, connection: FixedConnection) -> Arc<Self> {
        if self.fixed_connection() == Some(&connection) {
            return Arc::clone(self);
        }
        let mut next = Reference::clone(self);
        next.addressing = Addressing::Fixed(connection);
        next.locator = None;
        next.router = None;
        Arc::new(next)
    }

    /// Switches to indirect addressing through `adapter_id`, dropping any endpoints.
    pub fn with_adapter_id(
        self: &Arc<Self>,
        adapter_id: impl Into<String>,
    ) -> Result<Arc<Self>, ReferenceError> {
        self.check_not_fixed("adapter id")?;
        let adapter_id = adapter_id.into();
        if self.adapter_id() == adapter_id {
            return Ok(Arc::clone(self));
        }
        let mut next = Reference::clone(self);
        next.addressing = Addressing::Indirect(adapter_id);
        Ok(Arc::new(next))
    }

    /// Switches to direct addressing, dropping any adapter id. An empty list
    /// leaves a well-known reference.
    pub fn with_endpoints(
        self: &Arc<Self>,
        endpoints: Vec<Endpoint>,
    ) -> Result<Arc<Self>, ReferenceError> {
        self.check_not_fixed("endpoints")?;
        if self.endpoints() == endpoints.as_slice() {
            return Ok(Arc::clone(self));
        }
        let mut next = Reference::clone(self);
        next.addressing = if endpoints.is_empty() {
            Addressing::Indirect(String::new())
        } else {
            Addressing::Direct(endpoints)
        };
        Ok(Arc::new(next))
    }

    pub fn with_locator(
        self: &Arc<Self>,
        locator: Option<Arc<Reference>>,
    ) -> Result<Arc<Self>, ReferenceError> {
        self.check_not_fixed("locator")?;
        Ok(self.update(&self.locator, locator, |r, v| r.locator = v))
    }

    pub fn with_router(
        self: &Arc<Self>,
        router: Option<Arc<Reference>>,
    ) -> Result<Arc<Self>, ReferenceError> {
        self.check_not_fixed("router")?;
        Ok(self.update(&self.router, router, |r, v| r.router = v))
    }

    pub fn with_connection_cached(self: &Arc<Self>, cached: bool) -> Result<Arc<Self>, ReferenceError> {
        self.check_not_fixed("connection caching")?;
        Ok(self.update(&self.cache_connection, cached, |r, v| r.cache_connection = v))
    }

    pub fn with_connection_id(
        self: &Arc<Self>,
        connection_id: impl Into<String>,
    ) -> Result<Arc<Self>, ReferenceError> {
        self.check_not_fixed("connection id")?;
        Ok(self.update(&self.connection_id, connection_id.into(), |r, v| r.connection_id = v))
    }

    pub fn with_prefer_secure(self: &Arc<Self>, prefer_secure: bool) -> Result<Arc<Self>, ReferenceError> {
        self.check_not_fixed("secure preference")?;
        Ok(self.update(&self.prefer_secure, prefer_secure, |r, v| r.prefer_secure = v))
    }

    pub fn with_endpoint_selection(
        self: &Arc<Self>,
        selection: EndpointSelection,
    ) -> Result<Arc<Self>, ReferenceError> {
        self.check_not_fixed("endpoint selection")?;
        Ok(self.update(&self.endpoint_selection, selection, |r, v| r.endpoint_selection = v))
    }

    /// `-1` caches forever, `0` disables caching, `n` caches for `n` seconds.
    pub fn with_locator_cache_timeout(self: &Arc<Self>, timeout: i32) -> Result<Arc<Self>, ReferenceError> {
        self.check_not_fixed("locator cache timeout")?;
        if timeout < -1 {
            return Err(ReferenceError::InvalidLocatorCacheTimeout(timeout));
        }
        Ok(self.update(&self.locator_cache_timeout, timeout, |r, v| r.locator_cache_timeout = v))
    }

    pub fn with_collocation_optimized(
        self: &Arc<Self>,
        optimized: bool,
    ) -> Result<Arc<Self>, ReferenceError> {
        self.check_not_fixed("collocation optimization")?;
        Ok(self.update(&self.collocation_optimized, optimized, |r, v| r.collocation_optimized = v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Arc<Reference> {
        Arc::new(Reference::indirect(Identity::named("hello"), "HelloAdapter").unwrap())
    }

    #[test]
    fn test_unchanged_value_returns_same_instance() {
        let reference = sample();
        assert!(Arc::ptr_eq(&reference, &reference.with_secure(false)));
        assert!(Arc::ptr_eq(&reference, &reference.with_facet("")));
        assert!(Arc::ptr_eq(&reference, &reference.with_adapter_id("HelloAdapter").unwrap()));
        assert!(Arc::ptr_eq(&reference, &reference.with_locator_cache_timeout(-1).unwrap()));
    }

    #[test]
    fn test_change_produces_new_value() {
        let reference = sample();
        let secure = reference.with_secure(true);
        assert!(!Arc::ptr_eq(&reference, &secure));
        assert!(secure.is_secure());
        assert!(!reference.is_secure());
        assert_ne!(*reference, *secure);
        assert_eq!(*reference, *secure.with_secure(false));
    }

    #[test]
    fn test_addressing_is_exclusive() {
        let reference = sample();
        let direct = reference
            .with_endpoints(vec![Endpoint::tcp("localhost", 10000)])
            .unwrap();
        assert_eq!(direct.adapter_id(), "");
        assert_eq!(direct.endpoints().len(), 1);

        let indirect = direct.with_adapter_id("Other").unwrap();
        assert!(indirect.endpoints().is_empty());
        assert_eq!(indirect.adapter_id(), "Other");

        let well_known = indirect.with_adapter_id("").unwrap();
        assert!(well_known.is_well_known());
    }

    #[test]
    fn test_empty_direct_becomes_well_known() {
        let reference = Reference::direct(Identity::named("hello"), vec![]).unwrap();
        assert!(reference.is_well_known());
    }

    #[test]
    fn test_fixed_reference_rejects_addressing_changes() {
        let fixed = sample().with_fixed_connection(FixedConnection::new(7, Endpoint::tcp("h", 1)));
        assert!(fixed.is_fixed());
        assert!(fixed.locator().is_none());
        assert_eq!(
            fixed.with_adapter_id("x").unwrap_err(),
            ReferenceError::FixedProxy("adapter id")
        );
        assert!(fixed.with_locator(None).is_err());
        assert!(fixed.with_locator_cache_timeout(10).is_err());
        // Invocation settings remain adjustable.
        assert!(fixed.with_secure(true).is_secure());
    }

    #[test]
    fn test_invalid_locator_cache_timeout() {
        assert_eq!(
            sample().with_locator_cache_timeout(-2).unwrap_err(),
            ReferenceError::InvalidLocatorCacheTimeout(-2)
        );
    }

    #[test]
    fn test_empty_identity_rejected() {
        assert_eq!(
            Reference::indirect(Identity::default(), "A").unwrap_err(),
            ReferenceError::IllegalIdentity
        );
    }
}
