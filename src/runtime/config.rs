//! Runtime and adapter configuration.
//!
//! Plain serde structs: load them from any format, or build them in code
//! starting from `Default`.

use super::RuntimeError;
use crate::reference::{
    parse_reference, EncodingVersion, Endpoint, EndpointSelection, ReferenceDefaults,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Proxy string of the directory every new proxy uses unless told otherwise.
    pub default_locator: Option<String>,
    /// Seconds a directory answer stays usable: `-1` forever, `0` never.
    pub locator_cache_timeout: i32,
    /// Serve expired directory answers while refreshing them in the background.
    pub background_locator_cache_updates: bool,
    pub default_encoding: EncodingVersion,
    pub prefer_secure: bool,
    pub cache_connection: bool,
    pub endpoint_selection: EndpointSelection,
    /// `None` waits forever.
    pub invocation_timeout_ms: Option<u64>,
    /// Per-adapter settings, by adapter name.
    pub adapters: BTreeMap<String, AdapterConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_locator: None,
            locator_cache_timeout: -1,
            background_locator_cache_updates: false,
            default_encoding: EncodingVersion::default(),
            prefer_secure: false,
            cache_connection: true,
            endpoint_selection: EndpointSelection::Random,
            invocation_timeout_ms: None,
            adapters: BTreeMap::new(),
        }
    }
}

impl RuntimeConfig {
    /// Validates the settings and turns them into reference defaults.
    pub fn reference_defaults(&self) -> Result<ReferenceDefaults, RuntimeError> {
        if self.locator_cache_timeout < -1 {
            return Err(RuntimeError::Config(format!(
                "locator_cache_timeout must be -1 or greater, got {}",
                self.locator_cache_timeout
            )));
        }

        let mut defaults = ReferenceDefaults {
            encoding: self.default_encoding,
            locator: None,
            locator_cache_timeout: self.locator_cache_timeout,
            prefer_secure: self.prefer_secure,
            cache_connection: self.cache_connection,
            endpoint_selection: self.endpoint_selection,
            invocation_timeout: self.invocation_timeout_ms.map(Duration::from_millis),
        };
        if let Some(locator) = &self.default_locator {
            // The locator itself is not located through a locator.
            defaults.locator = Some(Arc::new(parse_reference(locator, &defaults)?));
        }
        Ok(defaults)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Registered with the directory when non-empty; proxies become indirect.
    pub adapter_id: String,
    /// Replica group the adapter joins; requires an adapter id.
    pub replica_group_id: String,
    pub endpoints: Vec<Endpoint>,
    /// Overrides what is advertised in direct proxies and to the directory.
    pub published_endpoints: Option<Vec<Endpoint>>,
    /// Proxy string of the directory to register with; defaults to the runtime's.
    pub locator: Option<String>,
    /// Start in `Held` and wait for an explicit `activate()`.
    pub hold_on_creation: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            adapter_id: String::new(),
            replica_group_id: String::new(),
            endpoints: Vec::new(),
            published_endpoints: None,
            locator: None,
            hold_on_creation: true,
        }
    }
}

impl AdapterConfig {
    pub fn with_adapter_id(mut self, adapter_id: impl Into<String>) -> Self {
        self.adapter_id = adapter_id.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }
}
