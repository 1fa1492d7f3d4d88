//! # Mock Directory
//!
//! An in-memory [`Directory`] for tests and demos.
//!
//! Queue expectations with [`MockDirectory::expect_find_adapter`] or
//! [`MockDirectory::expect_find_object`]; each incoming call consumes the next
//! one in order. Once the queue is empty, calls are answered from the
//! registered tables, which adapters fill through the mock's [`Registration`].

use super::{Directory, DirectoryConnector, DirectoryError, Registration};
use crate::reference::{Endpoint, Identity, Reference};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

enum Expectation {
    FindAdapter {
        adapter_id: String,
        delay: Option<Duration>,
        response: Result<Vec<Endpoint>, DirectoryError>,
    },
    FindObject {
        identity: Identity,
        delay: Option<Duration>,
        response: Result<Arc<Reference>, DirectoryError>,
    },
}

/// One call made through the mock's registration entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRecord {
    pub adapter_id: String,
    pub replica_group_id: String,
    pub endpoints: Option<Vec<Endpoint>>,
}

#[derive(Default)]
struct MockState {
    expectations: VecDeque<Expectation>,
    mismatches: Vec<String>,
    adapters: HashMap<String, Vec<Endpoint>>,
    replica_groups: HashMap<String, BTreeMap<String, Vec<Endpoint>>>,
    objects: HashMap<Identity, Arc<Reference>>,
    latency: Option<Duration>,
    adapter_lookups: usize,
    object_lookups: usize,
    registration_fetches: usize,
    without_registration: bool,
    registration_failure: Option<DirectoryError>,
    registrations: Vec<RegistrationRecord>,
}

/// A directory with expectation tracking and an in-memory fallback table.
///
/// # Example
/// ```ignore
/// let mock = MockDirectory::new();
/// mock.expect_find_adapter("A")
///     .after(Duration::from_millis(50))
///     .return_ok(vec![Endpoint::tcp("h", 4061)]);
///
/// // Use the mock as a `Directory` or `DirectoryConnector`...
/// mock.verify(); // Ensures all expectations were met
/// ```
#[derive(Clone, Default)]
pub struct MockDirectory {
    state: Arc<Mutex<MockState>>,
}

impl MockDirectory {
    /// Creates a mock with no expectations and empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects a `find_adapter_by_id` call.
    pub fn expect_find_adapter(&self, adapter_id: impl Into<String>) -> FindAdapterBuilder {
        FindAdapterBuilder {
            adapter_id: adapter_id.into(),
            delay: None,
            state: Arc::clone(&self.state),
        }
    }

    /// Expects a `find_object_by_id` call.
    pub fn expect_find_object(&self, identity: Identity) -> FindObjectBuilder {
        FindObjectBuilder {
            identity,
            delay: None,
            state: Arc::clone(&self.state),
        }
    }

    /// Delay applied to every answer from the fallback tables.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = Some(latency);
        self
    }

    /// Makes `registration()` report that the directory has no registration entry point.
    pub fn without_registration(self) -> Self {
        self.state.lock().without_registration = true;
        self
    }

    /// Makes every registration call fail with `error`.
    pub fn fail_registration_with(&self, error: DirectoryError) {
        self.state.lock().registration_failure = Some(error);
    }

    pub fn clear_registration_failure(&self) {
        self.state.lock().registration_failure = None;
    }

    pub fn register_adapter(&self, adapter_id: impl Into<String>, endpoints: Vec<Endpoint>) {
        self.state.lock().adapters.insert(adapter_id.into(), endpoints);
    }

    /// Registers a well-known object under its own identity.
    pub fn register_object(&self, reference: Reference) {
        let identity = reference.identity().clone();
        self.state.lock().objects.insert(identity, Arc::new(reference));
    }

    pub fn adapter_lookups(&self) -> usize {
        self.state.lock().adapter_lookups
    }

    pub fn object_lookups(&self) -> usize {
        self.state.lock().object_lookups
    }

    pub fn registration_fetches(&self) -> usize {
        self.state.lock().registration_fetches
    }

    pub fn registrations(&self) -> Vec<RegistrationRecord> {
        self.state.lock().registrations.clone()
    }

    /// Endpoints currently registered for an adapter or replica group.
    pub fn registered_endpoints(&self, adapter_id: &str) -> Option<Vec<Endpoint>> {
        lookup_table(&self.state.lock(), adapter_id)
    }

    /// Verifies that all expectations were met and none was violated.
    pub fn verify(&self) {
        let state = self.state.lock();
        if !state.mismatches.is_empty() {
            panic!("Unexpected directory calls: {:?}", state.mismatches);
        }
        if !state.expectations.is_empty() {
            panic!(
                "Not all expectations were met. {} remaining",
                state.expectations.len()
            );
        }
    }
}

fn lookup_table(state: &MockState, adapter_id: &str) -> Option<Vec<Endpoint>> {
    if let Some(endpoints) = state.adapters.get(adapter_id) {
        return Some(endpoints.clone());
    }
    state
        .replica_groups
        .get(adapter_id)
        .map(|members| members.values().flatten().cloned().collect())
}

async fn delay(duration: Option<Duration>) {
    if let Some(duration) = duration {
        tokio::time::sleep(duration).await;
    }
}

/// Builder for `find_adapter_by_id` expectations.
pub struct FindAdapterBuilder {
    adapter_id: String,
    delay: Option<Duration>,
    state: Arc<Mutex<MockState>>,
}

impl FindAdapterBuilder {
    /// Answers only after `delay` has passed.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets the expectation to return endpoints.
    pub fn return_ok(self, endpoints: Vec<Endpoint>) {
        self.push(Ok(endpoints));
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: DirectoryError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<Vec<Endpoint>, DirectoryError>) {
        self.state.lock().expectations.push_back(Expectation::FindAdapter {
            adapter_id: self.adapter_id,
            delay: self.delay,
            response,
        });
    }
}

/// Builder for `find_object_by_id` expectations.
pub struct FindObjectBuilder {
    identity: Identity,
    delay: Option<Duration>,
    state: Arc<Mutex<MockState>>,
}

impl FindObjectBuilder {
    /// Answers only after `delay` has passed.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets the expectation to return a reference.
    pub fn return_ok(self, reference: Reference) {
        self.push(Ok(Arc::new(reference)));
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: DirectoryError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<Arc<Reference>, DirectoryError>) {
        self.state.lock().expectations.push_back(Expectation::FindObject {
            identity: self.identity,
            delay: self.delay,
            response,
        });
    }
}

// =============================================================================
// THE DIRECTORY IMPLEMENTATION
// =============================================================================

#[async_trait]
impl Directory for MockDirectory {
    async fn find_adapter_by_id(&self, adapter_id: &str) -> Result<Vec<Endpoint>, DirectoryError> {
        let (wait, response) = {
            let mut state = self.state.lock();
            state.adapter_lookups += 1;
            match state.expectations.pop_front() {
                Some(Expectation::FindAdapter {
                    adapter_id: expected,
                    delay,
                    response,
                }) if expected == adapter_id => (delay, response),
                Some(other) => {
                    // Keep the unmatched expectation so verify() reports it.
                    state.expectations.push_front(other);
                    state.mismatches.push(format!("find_adapter_by_id({adapter_id})"));
                    (None, Err(DirectoryError::Communication("unexpected call".into())))
                }
                None => {
                    let response = lookup_table(&state, adapter_id)
                        .ok_or_else(|| DirectoryError::AdapterNotFound(adapter_id.to_owned()));
                    (state.latency, response)
                }
            }
        };
        delay(wait).await;
        response
    }

    async fn find_object_by_id(&self, identity: &Identity) -> Result<Arc<Reference>, DirectoryError> {
        let (wait, response) = {
            let mut state = self.state.lock();
            state.object_lookups += 1;
            match state.expectations.pop_front() {
                Some(Expectation::FindObject {
                    identity: expected,
                    delay,
                    response,
                }) if expected == *identity => (delay, response),
                Some(other) => {
                    state.expectations.push_front(other);
                    state.mismatches.push(format!("find_object_by_id({identity})"));
                    (None, Err(DirectoryError::Communication("unexpected call".into())))
                }
                None => {
                    let response = state
                        .objects
                        .get(identity)
                        .cloned()
                        .ok_or_else(|| DirectoryError::ObjectNotFound(identity.clone()));
                    (state.latency, response)
                }
            }
        };
        delay(wait).await;
        response
    }

    async fn registration(&self) -> Result<Option<Arc<dyn Registration>>, DirectoryError> {
        let mut state = self.state.lock();
        state.registration_fetches += 1;
        if state.without_registration {
            return Ok(None);
        }
        Ok(Some(Arc::new(MockRegistration {
            state: Arc::clone(&self.state),
        })))
    }
}

impl DirectoryConnector for MockDirectory {
    fn connect(&self, _directory: &Arc<Reference>) -> Arc<dyn Directory> {
        Arc::new(self.clone())
    }
}

struct MockRegistration {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Registration for MockRegistration {
    async fn set_adapter_endpoints(
        &self,
        adapter_id: &str,
        replica_group_id: &str,
        endpoints: Option<Vec<Endpoint>>,
    ) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        state.registrations.push(RegistrationRecord {
            adapter_id: adapter_id.to_owned(),
            replica_group_id: replica_group_id.to_owned(),
            endpoints: endpoints.clone(),
        });
        if let Some(error) = state.registration_failure.clone() {
            return Err(error);
        }

        match endpoints {
            Some(endpoints) => {
                if !replica_group_id.is_empty() {
                    state
                        .replica_groups
                        .entry(replica_group_id.to_owned())
                        .or_default()
                        .insert(adapter_id.to_owned(), endpoints.clone());
                }
                state.adapters.insert(adapter_id.to_owned(), endpoints);
            }
            None => {
                state.adapters.remove(adapter_id);
                if let Some(members) = state.replica_groups.get_mut(replica_group_id) {
                    members.remove(adapter_id);
                    if members.is_empty() {
                        state.replica_groups.remove(replica_group_id);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_with_expectations() {
        let mock = MockDirectory::new();
        mock.expect_find_adapter("A").return_ok(vec![Endpoint::tcp("h", 1)]);
        mock.expect_find_object(Identity::named("hello"))
            .return_err(DirectoryError::ObjectNotFound(Identity::named("hello")));

        assert_eq!(mock.find_adapter_by_id("A").await.unwrap(), vec![Endpoint::tcp("h", 1)]);
        assert!(mock.find_object_by_id(&Identity::named("hello")).await.is_err());
        mock.verify();
    }

    #[tokio::test]
    #[should_panic(expected = "Unexpected directory calls")]
    async fn test_mismatch_fails_verify() {
        let mock = MockDirectory::new();
        mock.expect_find_adapter("A").return_ok(vec![]);
        let _ = mock.find_adapter_by_id("B").await;
        mock.verify();
    }

    #[tokio::test]
    async fn test_registration_fills_table() {
        let mock = MockDirectory::new();
        let registration = mock.registration().await.unwrap().unwrap();
        registration
            .set_adapter_endpoints("A1", "Group", Some(vec![Endpoint::tcp("h1", 1)]))
            .await
            .unwrap();
        registration
            .set_adapter_endpoints("A2", "Group", Some(vec![Endpoint::tcp("h2", 2)]))
            .await
            .unwrap();

        assert_eq!(mock.find_adapter_by_id("Group").await.unwrap().len(), 2);
        registration.set_adapter_endpoints("A1", "Group", None).await.unwrap();
        assert_eq!(mock.registered_endpoints("A1"), None);
        assert_eq!(mock.registered_endpoints("Group"), Some(vec![Endpoint::tcp("h2", 2)]));
        assert_eq!(mock.registrations().len(), 3);
    }
}
