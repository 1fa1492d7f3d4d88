//! # Resolver
//!
//! Resolves indirect references against one directory.
//!
//! # Architecture Note
//! Every lookup goes through a [`SingleFlight`] keyed by adapter id or by
//! identity, so N concurrent callers for the same key cause exactly one
//! directory call. The call itself runs in a spawned task: a caller that gives
//! up waiting never strands the others.
//!
//! A well-known lookup is two steps. The object lookup yields a reference
//! naming an adapter; each waiter then resolves that adapter with its own TTL,
//! which goes through the adapter flight and is coalesced in turn.

use super::single_flight::{Flight, SingleFlight};
use super::{CacheTtl, Directory, DirectoryCache, DirectoryError, Registration};
use crate::reference::{Addressing, Endpoint, Identity, Reference};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

type Outcome<T> = Result<T, DirectoryError>;

/// Endpoints for a reference, and whether they came from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoints {
    pub endpoints: Vec<Endpoint>,
    pub cached: bool,
}

struct ResolverInner {
    directory_reference: Arc<Reference>,
    directory: Arc<dyn Directory>,
    cache: Arc<DirectoryCache>,
    background: bool,
    adapter_requests: SingleFlight<String, Outcome<Vec<Endpoint>>>,
    object_requests: SingleFlight<Identity, Outcome<Arc<Reference>>>,
    registration: OnceCell<Option<Arc<dyn Registration>>>,
}

/// Coalescing lookups against one directory. Cheap to clone.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("directory", &self.inner.directory_reference.to_string())
            .field("background", &self.inner.background)
            .finish()
    }
}

impl Resolver {
    /// `background` makes expired entries usable while a refresh runs behind the caller.
    pub fn new(
        directory_reference: Arc<Reference>,
        directory: Arc<dyn Directory>,
        cache: Arc<DirectoryCache>,
        background: bool,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                directory_reference,
                directory,
                cache,
                background,
                adapter_requests: SingleFlight::new(),
                object_requests: SingleFlight::new(),
                registration: OnceCell::new(),
            }),
        }
    }

    pub fn directory_reference(&self) -> &Arc<Reference> {
        &self.inner.directory_reference
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.inner.directory
    }

    pub fn cache(&self) -> &Arc<DirectoryCache> {
        &self.inner.cache
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolves `reference` to endpoints.
    ///
    /// Direct references complete immediately. Indirect ones are served from
    /// the cache when fresh for `ttl`, otherwise from a (possibly shared)
    /// directory call. Failures are not retried here.
    #[instrument(skip(self, reference), fields(reference = %reference))]
    pub async fn resolve_endpoints(
        &self,
        reference: &Reference,
        ttl: CacheTtl,
    ) -> Result<ResolvedEndpoints, DirectoryError> {
        match reference.addressing() {
            Addressing::Direct(endpoints) => Ok(ResolvedEndpoints {
                endpoints: endpoints.clone(),
                cached: false,
            }),
            Addressing::Fixed(_) => Err(DirectoryError::NotIndirect(reference.to_string())),
            Addressing::Indirect(adapter_id) if !adapter_id.is_empty() => {
                self.resolve_adapter(adapter_id, ttl).await
            }
            Addressing::Indirect(_) => self.resolve_well_known(reference.identity(), ttl).await,
        }
    }

    /// Callback form of [`Resolver::resolve_endpoints`]: returns at once and
    /// hands the outcome to `on_complete` from a spawned task.
    pub fn resolve_endpoints_with<F>(
        &self,
        reference: Arc<Reference>,
        ttl: CacheTtl,
        on_complete: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<ResolvedEndpoints, DirectoryError>) + Send + 'static,
    {
        let resolver = self.clone();
        tokio::spawn(async move {
            let outcome = resolver.resolve_endpoints(&reference, ttl).await;
            on_complete(outcome);
        })
    }

    async fn resolve_adapter(
        &self,
        adapter_id: &str,
        ttl: CacheTtl,
    ) -> Result<ResolvedEndpoints, DirectoryError> {
        let cache = &self.inner.cache;
        if let Some(endpoints) = cache.lookup_adapter(adapter_id, ttl) {
            debug!(adapter_id, "Found adapter endpoints in cache");
            return Ok(ResolvedEndpoints {
                endpoints,
                cached: true,
            });
        }

        if self.inner.background && ttl != CacheTtl::Disabled {
            if let Some(endpoints) = cache.stale_adapter(adapter_id) {
                debug!(adapter_id, "Using expired adapter endpoints, refreshing");
                drop(self.join_adapter(adapter_id));
                return Ok(ResolvedEndpoints {
                    endpoints,
                    cached: true,
                });
            }
        }

        let endpoints = wait(self.join_adapter(adapter_id)).await?;
        Ok(ResolvedEndpoints {
            endpoints,
            cached: false,
        })
    }

    async fn resolve_well_known(
        &self,
        identity: &Identity,
        ttl: CacheTtl,
    ) -> Result<ResolvedEndpoints, DirectoryError> {
        let cache = &self.inner.cache;
        let (object, object_cached) = match cache.lookup_object(identity, ttl) {
            Some(object) => {
                debug!(%identity, "Found object in cache");
                (object, true)
            }
            None => match cache.stale_object(identity) {
                Some(object) if self.inner.background && ttl != CacheTtl::Disabled => {
                    debug!(%identity, "Using expired object, refreshing");
                    drop(self.join_object(identity));
                    (object, true)
                }
                _ => (wait(self.join_object(identity)).await?, false),
            },
        };

        match object.addressing() {
            Addressing::Direct(endpoints) => Ok(ResolvedEndpoints {
                endpoints: endpoints.clone(),
                cached: object_cached,
            }),
            Addressing::Indirect(adapter_id) if !adapter_id.is_empty() => {
                match self.resolve_adapter(adapter_id, ttl).await {
                    Ok(resolved) => Ok(ResolvedEndpoints {
                        endpoints: resolved.endpoints,
                        cached: object_cached && resolved.cached,
                    }),
                    Err(error) => {
                        if error.is_not_registered() {
                            cache.evict_object(identity);
                        }
                        Err(error)
                    }
                }
            }
            // Unusable answers are rejected before they reach the cache.
            Addressing::Indirect(_) | Addressing::Fixed(_) => {
                cache.evict_object(identity);
                Err(DirectoryError::ObjectNotFound(identity.clone()))
            }
        }
    }

    fn join_adapter(&self, adapter_id: &str) -> oneshot::Receiver<Outcome<Vec<Endpoint>>> {
        match self.inner.adapter_requests.join(&adapter_id.to_owned()) {
            Flight::Follower(receiver) => {
                trace!(adapter_id, "Joined pending adapter lookup");
                receiver
            }
            Flight::Leader(leader, receiver) => {
                let inner = Arc::clone(&self.inner);
                let adapter_id = adapter_id.to_owned();
                tokio::spawn(async move {
                    let outcome = inner.fetch_adapter(&adapter_id).await;
                    leader.finish(outcome);
                });
                receiver
            }
        }
    }

    fn join_object(&self, identity: &Identity) -> oneshot::Receiver<Outcome<Arc<Reference>>> {
        match self.inner.object_requests.join(identity) {
            Flight::Follower(receiver) => {
                trace!(%identity, "Joined pending object lookup");
                receiver
            }
            Flight::Leader(leader, receiver) => {
                let inner = Arc::clone(&self.inner);
                let identity = identity.clone();
                tokio::spawn(async move {
                    let outcome = inner.fetch_object(&identity).await;
                    leader.finish(outcome);
                });
                receiver
            }
        }
    }

    // =========================================================================
    // Cache maintenance
    // =========================================================================

    /// Forgets what the cache holds for `reference`, typically after its
    /// endpoints turned out to be unreachable.
    ///
    /// For a well-known reference the adapter entry its object pointed to is
    /// dropped too.
    pub fn clear_cache(&self, reference: &Reference) {
        let cache = &self.inner.cache;
        match reference.addressing() {
            Addressing::Indirect(adapter_id) if !adapter_id.is_empty() => {
                if let Some(endpoints) = cache.evict_adapter(adapter_id) {
                    debug!(adapter_id, count = endpoints.len(), "Removed adapter from cache");
                }
            }
            Addressing::Indirect(_) => {
                let identity = reference.identity();
                if let Some(object) = cache.evict_object(identity) {
                    debug!(%identity, "Removed object from cache");
                    if object.is_indirect() && !object.is_well_known() {
                        cache.evict_adapter(object.adapter_id());
                    }
                }
            }
            Addressing::Direct(_) | Addressing::Fixed(_) => {}
        }
    }

    /// The directory's registration entry point, fetched once and remembered,
    /// including when the directory has none.
    pub async fn registration(&self) -> Result<Option<Arc<dyn Registration>>, DirectoryError> {
        let directory = &self.inner.directory;
        self.inner
            .registration
            .get_or_try_init(|| directory.registration())
            .await
            .cloned()
    }

    pub fn destroy(&self) {
        self.inner.cache.clear();
    }
}

async fn wait<T>(receiver: oneshot::Receiver<Outcome<T>>) -> Outcome<T> {
    receiver.await.unwrap_or(Err(DirectoryError::Abandoned))
}

impl ResolverInner {
    async fn fetch_adapter(&self, adapter_id: &str) -> Outcome<Vec<Endpoint>> {
        info!(adapter_id, "Resolving adapter");
        let outcome = match self.directory.find_adapter_by_id(adapter_id).await {
            Ok(endpoints) if endpoints.is_empty() => {
                Err(DirectoryError::AdapterNotFound(adapter_id.to_owned()))
            }
            other => other,
        };

        match &outcome {
            Ok(endpoints) => {
                info!(adapter_id, count = endpoints.len(), "Resolved adapter");
                self.cache.store_adapter(adapter_id, endpoints.clone());
            }
            Err(error) => {
                warn!(adapter_id, %error, "Adapter lookup failed");
                self.cache.evict_adapter(adapter_id);
            }
        }
        outcome
    }

    async fn fetch_object(&self, identity: &Identity) -> Outcome<Arc<Reference>> {
        info!(%identity, "Resolving object");
        let outcome = match self.directory.find_object_by_id(identity).await {
            Ok(object) if object.is_well_known() || object.is_fixed() => {
                Err(DirectoryError::ObjectNotFound(identity.clone()))
            }
            other => other,
        };

        match &outcome {
            Ok(object) => {
                info!(%identity, object = %object, "Resolved object");
                self.cache.store_object(identity, Arc::clone(object));
            }
            Err(error) => {
                warn!(%identity, %error, "Object lookup failed");
                self.cache.evict_object(identity);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MockDirectory;
    use std::time::Duration;

    fn resolver(mock: &MockDirectory, background: bool) -> Resolver {
        let directory_reference = Arc::new("Locator:tcp -h localhost -p 4061".parse().unwrap());
        Resolver::new(
            directory_reference,
            Arc::new(mock.clone()),
            Arc::new(DirectoryCache::new()),
            background,
        )
    }

    fn indirect(adapter_id: &str) -> Reference {
        Reference::indirect(Identity::named("hello"), adapter_id).unwrap()
    }

    #[tokio::test]
    async fn test_direct_reference_skips_directory() {
        let mock = MockDirectory::new();
        let resolver = resolver(&mock, false);
        let reference = Reference::direct(Identity::named("hello"), vec![Endpoint::tcp("h", 1)]).unwrap();

        let resolved = resolver.resolve_endpoints(&reference, CacheTtl::Unlimited).await.unwrap();
        assert_eq!(resolved.endpoints, vec![Endpoint::tcp("h", 1)]);
        assert!(!resolved.cached);
        assert_eq!(mock.adapter_lookups(), 0);
    }

    #[tokio::test]
    async fn test_cache_hit_after_lookup() {
        let mock = MockDirectory::new();
        mock.register_adapter("A", vec![Endpoint::tcp("h", 4061)]);
        let resolver = resolver(&mock, false);

        let first = resolver.resolve_endpoints(&indirect("A"), CacheTtl::Unlimited).await.unwrap();
        let second = resolver.resolve_endpoints(&indirect("A"), CacheTtl::Unlimited).await.unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.endpoints, second.endpoints);
        assert_eq!(mock.adapter_lookups(), 1);
    }

    #[tokio::test]
    async fn test_empty_endpoints_mean_not_registered() {
        let mock = MockDirectory::new();
        mock.expect_find_adapter("A").return_ok(vec![]);
        let resolver = resolver(&mock, false);

        let error = resolver.resolve_endpoints(&indirect("A"), CacheTtl::Unlimited).await.unwrap_err();
        assert_eq!(error, DirectoryError::AdapterNotFound("A".into()));
        mock.verify();
    }

    #[tokio::test]
    async fn test_well_known_resolves_through_adapter() {
        let mock = MockDirectory::new();
        mock.register_object(indirect("A"));
        mock.register_adapter("A", vec![Endpoint::tcp("h", 4061)]);
        let resolver = resolver(&mock, false);

        let well_known = indirect("");
        let resolved = resolver.resolve_endpoints(&well_known, CacheTtl::Unlimited).await.unwrap();
        assert_eq!(resolved.endpoints, vec![Endpoint::tcp("h", 4061)]);
        assert!(!resolved.cached);

        let again = resolver.resolve_endpoints(&well_known, CacheTtl::Unlimited).await.unwrap();
        assert!(again.cached);
        assert_eq!((mock.object_lookups(), mock.adapter_lookups()), (1, 1));
    }

    #[tokio::test]
    async fn test_unusable_object_answer_is_rejected() {
        let mock = MockDirectory::new();
        mock.expect_find_object(Identity::named("hello")).return_ok(indirect(""));
        let resolver = resolver(&mock, false);

        let error = resolver.resolve_endpoints(&indirect(""), CacheTtl::Unlimited).await.unwrap_err();
        assert_eq!(error, DirectoryError::ObjectNotFound(Identity::named("hello")));
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_adapter_failure_evicts_object_entry() {
        let mock = MockDirectory::new();
        mock.register_object(indirect("A"));
        mock.expect_find_object(Identity::named("hello")).return_ok(indirect("A"));
        mock.expect_find_adapter("A").return_err(DirectoryError::AdapterNotFound("A".into()));
        let resolver = resolver(&mock, false);

        let error = resolver.resolve_endpoints(&indirect(""), CacheTtl::Unlimited).await.unwrap_err();
        assert!(error.is_not_registered());
        assert!(resolver.cache().lookup_object(&Identity::named("hello"), CacheTtl::Unlimited).is_none());
        mock.verify();
    }

    #[tokio::test]
    async fn test_clear_cache_for_well_known_drops_adapter_too() {
        let mock = MockDirectory::new();
        mock.register_object(indirect("A"));
        mock.register_adapter("A", vec![Endpoint::tcp("h", 4061)]);
        let resolver = resolver(&mock, false);

        resolver.resolve_endpoints(&indirect(""), CacheTtl::Unlimited).await.unwrap();
        resolver.clear_cache(&indirect(""));
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_serves_stale_entry() {
        let mock = MockDirectory::new();
        mock.register_adapter("A", vec![Endpoint::tcp("old", 1)]);
        let resolver = resolver(&mock, true);

        resolver.resolve_endpoints(&indirect("A"), CacheTtl::Seconds(1)).await.unwrap();
        mock.register_adapter("A", vec![Endpoint::tcp("new", 1)]);
        tokio::time::advance(Duration::from_secs(2)).await;

        let stale = resolver.resolve_endpoints(&indirect("A"), CacheTtl::Seconds(1)).await.unwrap();
        assert!(stale.cached);
        assert_eq!(stale.endpoints, vec![Endpoint::tcp("old", 1)]);

        // Let the refresh task run.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(
            resolver.cache().stale_adapter("A"),
            Some(vec![Endpoint::tcp("new", 1)])
        );
        assert_eq!(mock.adapter_lookups(), 2);
    }

    #[tokio::test]
    async fn test_registration_fetched_once() {
        let mock = MockDirectory::new();
        let resolver = resolver(&mock, false);
        assert!(resolver.registration().await.unwrap().is_some());
        assert!(resolver.registration().await.unwrap().is_some());
        assert_eq!(mock.registration_fetches(), 1);
    }

    #[tokio::test]
    async fn test_callback_form() {
        let mock = MockDirectory::new();
        mock.register_adapter("A", vec![Endpoint::tcp("h", 4061)]);
        let resolver = resolver(&mock, false);

        let (sender, receiver) = oneshot::channel();
        resolver.resolve_endpoints_with(Arc::new(indirect("A")), CacheTtl::Unlimited, move |outcome| {
            let _ = sender.send(outcome);
        });
        let resolved = receiver.await.unwrap().unwrap();
        assert_eq!(resolved.endpoints, vec![Endpoint::tcp("h", 4061)]);
    }
}
