//! Servants and the table an adapter keeps them in.

use super::AdapterError;
use crate::reference::Identity;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Information about the request being dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct Current {
    pub adapter: String,
    pub identity: Identity,
    pub facet: String,
    pub operation: String,
}

/// The implementation of an object hosted by an adapter.
///
/// Payloads are opaque: encoding and decoding belong to generated code.
#[async_trait]
pub trait Servant: Send + Sync {
    async fn dispatch(&self, current: &Current, payload: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// Servant backed by a plain function.
pub struct FnServant<F>(F);

#[async_trait]
impl<F> Servant for FnServant<F>
where
    F: Fn(&Current, Vec<u8>) -> Result<Vec<u8>, String> + Send + Sync,
{
    async fn dispatch(&self, current: &Current, payload: Vec<u8>) -> Result<Vec<u8>, String> {
        (self.0)(current, payload)
    }
}

pub fn servant_fn<F>(f: F) -> Arc<dyn Servant>
where
    F: Fn(&Current, Vec<u8>) -> Result<Vec<u8>, String> + Send + Sync + 'static,
{
    Arc::new(FnServant(f))
}

/// Servants by identity, then by facet.
#[derive(Default)]
pub struct ServantTable {
    servants: HashMap<Identity, HashMap<String, Arc<dyn Servant>>>,
}

impl fmt::Debug for ServantTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.servants.keys()).finish()
    }
}

impl ServantTable {
    pub fn add(
        &mut self,
        identity: &Identity,
        facet: &str,
        servant: Arc<dyn Servant>,
    ) -> Result<(), AdapterError> {
        let facets = self.servants.entry(identity.clone()).or_default();
        if facets.contains_key(facet) {
            return Err(AdapterError::AlreadyRegistered {
                identity: identity.clone(),
                facet: facet.to_owned(),
            });
        }
        facets.insert(facet.to_owned(), servant);
        Ok(())
    }

    pub fn remove(&mut self, identity: &Identity, facet: &str) -> Result<Arc<dyn Servant>, AdapterError> {
        let not_found = || AdapterError::ObjectNotExist {
            identity: identity.clone(),
            facet: facet.to_owned(),
        };
        let facets = self.servants.get_mut(identity).ok_or_else(not_found)?;
        let servant = facets.remove(facet).ok_or_else(not_found)?;
        if facets.is_empty() {
            self.servants.remove(identity);
        }
        Ok(servant)
    }

    /// Removes every facet of `identity`.
    pub fn remove_all_facets(
        &mut self,
        identity: &Identity,
    ) -> Result<HashMap<String, Arc<dyn Servant>>, AdapterError> {
        self.servants
            .remove(identity)
            .ok_or_else(|| AdapterError::ObjectNotExist {
                identity: identity.clone(),
                facet: String::new(),
            })
    }

    pub fn find(&self, identity: &Identity, facet: &str) -> Option<Arc<dyn Servant>> {
        self.servants.get(identity)?.get(facet).cloned()
    }

    pub fn len(&self) -> usize {
        self.servants.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.servants.is_empty()
    }

    pub fn clear(&mut self) {
        self.servants.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo() -> Arc<dyn Servant> {
        servant_fn(|_, payload| Ok(payload))
    }

    #[test]
    fn test_add_find_remove() {
        let mut table = ServantTable::default();
        let identity = Identity::named("hello");
        table.add(&identity, "", echo()).unwrap();
        table.add(&identity, "admin", echo()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.find(&identity, "admin").is_some());
        assert!(table.find(&identity, "other").is_none());

        assert!(matches!(
            table.add(&identity, "", echo()),
            Err(AdapterError::AlreadyRegistered { .. })
        ));

        table.remove(&identity, "").unwrap();
        table.remove(&identity, "admin").unwrap();
        assert!(table.is_empty());
        assert!(table.remove(&identity, "").is_err());
    }

    #[tokio::test]
    async fn test_fn_servant_dispatch() {
        let servant = servant_fn(|current, _| Ok(current.operation.clone().into_bytes()));
        let current = Current {
            adapter: "Hello".into(),
            identity: Identity::named("hello"),
            facet: String::new(),
            operation: "sayHello".into(),
        };
        assert_eq!(servant.dispatch(&current, vec![]).await.unwrap(), b"sayHello".to_vec());
    }
}
