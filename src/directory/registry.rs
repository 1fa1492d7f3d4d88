//! # Directory Registry
//!
//! Hands out one [`Resolver`] per distinct directory reference so that
//! equivalent directory proxies share their pending lookups.
//!
//! Caches are shared more widely than resolvers: every directory reference
//! with the same identity and encoding uses the same [`DirectoryCache`], even
//! when other settings (timeouts, context, ...) differ.

use super::{DirectoryCache, DirectoryConnector, DirectoryError, Resolver};
use crate::reference::{EncodingVersion, Identity, Reference};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
struct RegistryState {
    destroyed: bool,
    resolvers: HashMap<Arc<Reference>, Resolver>,
    caches: HashMap<(Identity, EncodingVersion), Arc<DirectoryCache>>,
}

pub struct DirectoryRegistry {
    connector: Option<Arc<dyn DirectoryConnector>>,
    background: bool,
    state: Mutex<RegistryState>,
}

impl DirectoryRegistry {
    /// Without a connector every [`DirectoryRegistry::get`] fails with
    /// [`DirectoryError::NoConnector`].
    pub fn new(connector: Option<Arc<dyn DirectoryConnector>>, background: bool) -> Self {
        Self {
            connector,
            background,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Returns the resolver for `directory`, creating it on first use.
    ///
    /// A directory is never itself located through a directory, so any
    /// locator configured on `directory` is ignored when keying.
    pub fn get(&self, directory: &Arc<Reference>) -> Result<Resolver, DirectoryError> {
        let key = directory
            .with_locator(None)
            .unwrap_or_else(|_| Arc::clone(directory));

        let mut state = self.state.lock();
        if state.destroyed {
            return Err(DirectoryError::Destroyed);
        }
        if let Some(resolver) = state.resolvers.get(&key) {
            return Ok(resolver.clone());
        }

        let connector = self.connector.as_ref().ok_or(DirectoryError::NoConnector)?;
        let cache = state
            .caches
            .entry((key.identity().clone(), key.encoding()))
            .or_insert_with(|| {
                debug!(identity = %key.identity(), "Created directory cache");
                Arc::new(DirectoryCache::new())
            })
            .clone();

        let resolver = Resolver::new(
            Arc::clone(&key),
            connector.connect(&key),
            cache,
            self.background,
        );
        info!(directory = %key, "Created resolver");
        state.resolvers.insert(key, resolver.clone());
        Ok(resolver)
    }

    /// Clears every cache and refuses further use.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        for resolver in state.resolvers.values() {
            resolver.destroy();
        }
        state.resolvers.clear();
        state.caches.clear();
        info!("Directory registry destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }
}
