use async_trait::async_trait;
use proxy_runtime::adapter::{servant_fn, AdapterError, AdapterState, Current, ObjectAdapter, Servant};
use proxy_runtime::directory::{DirectoryError, MockDirectory};
use proxy_runtime::proxy::InvocationTarget;
use proxy_runtime::reference::{Endpoint, Identity};
use proxy_runtime::runtime::{AdapterConfig, Runtime, RuntimeBuilder, RuntimeConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn runtime(mock: &MockDirectory) -> Arc<Runtime> {
    let config = RuntimeConfig {
        default_locator: Some("Locator:tcp -h localhost -p 4061".into()),
        ..RuntimeConfig::default()
    };
    RuntimeBuilder::new(config)
        .with_directory_connector(Arc::new(mock.clone()))
        .build()
        .unwrap()
}

fn hello_config() -> AdapterConfig {
    AdapterConfig::default()
        .with_adapter_id("A")
        .with_endpoint(Endpoint::tcp("localhost", 10000))
}

async fn hello_adapter(runtime: &Arc<Runtime>) -> Arc<ObjectAdapter> {
    runtime
        .create_object_adapter_with_config("Hello", hello_config())
        .await
        .unwrap()
}

/// Servant that blocks until released.
struct Gate {
    release: Arc<Notify>,
}

#[async_trait]
impl Servant for Gate {
    async fn dispatch(&self, _current: &Current, payload: Vec<u8>) -> Result<Vec<u8>, String> {
        self.release.notified().await;
        Ok(payload)
    }
}

async fn wait_for_dispatches(adapter: &ObjectAdapter, count: usize) {
    while adapter.dispatch_count() != count {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_activation_publishes_endpoints() {
    let mock = MockDirectory::new();
    let runtime = runtime(&mock);
    let adapter = hello_adapter(&runtime).await;
    assert_eq!(adapter.state(), AdapterState::Held);
    assert_eq!(mock.registered_endpoints("A"), None);

    adapter.activate().await.unwrap();
    assert_eq!(adapter.state(), AdapterState::Active);
    assert_eq!(
        mock.registered_endpoints("A"),
        Some(vec![Endpoint::tcp("localhost", 10000)])
    );

    let proxy = adapter
        .add(Identity::named("hello"), servant_fn(|_, payload| Ok(payload)))
        .unwrap();
    assert_eq!(proxy.adapter_id(), "A");
    assert_eq!(
        proxy.resolve_target().await.unwrap(),
        InvocationTarget::Endpoints {
            endpoints: vec![Endpoint::tcp("localhost", 10000)],
            cached: false
        }
    );

    // Activating again does not register again.
    adapter.hold().unwrap();
    adapter.wait_for_hold().await.unwrap();
    adapter.activate().await.unwrap();
    assert_eq!(mock.registrations().len(), 1);
}

#[tokio::test]
async fn test_deactivation_waits_for_in_flight_dispatch() {
    let mock = MockDirectory::new();
    let runtime = runtime(&mock);
    let adapter = hello_adapter(&runtime).await;
    adapter.activate().await.unwrap();

    let release = Arc::new(Notify::new());
    let identity = Identity::named("slow");
    adapter
        .add(identity.clone(), Arc::new(Gate { release: Arc::clone(&release) }))
        .unwrap();

    let dispatch = {
        let adapter = Arc::clone(&adapter);
        let identity = identity.clone();
        tokio::spawn(async move {
            adapter
                .dispatch_collocated(&identity, "", "work", b"payload".to_vec())
                .await
        })
    };
    wait_for_dispatches(&adapter, 1).await;

    adapter.deactivate().await;
    assert_eq!(adapter.state(), AdapterState::Deactivating);
    assert!(!adapter.is_deactivated());
    assert_eq!(mock.registered_endpoints("A"), None);

    let waiter = {
        let adapter = Arc::clone(&adapter);
        tokio::spawn(async move { adapter.wait_for_deactivate().await })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!waiter.is_finished());

    assert_eq!(
        adapter
            .dispatch_collocated(&identity, "", "work", vec![])
            .await
            .unwrap_err(),
        AdapterError::Deactivated("Hello".into())
    );

    release.notify_one();
    assert_eq!(dispatch.await.unwrap().unwrap(), b"payload".to_vec());
    waiter.await.unwrap();
    assert_eq!(adapter.state(), AdapterState::Deactivated);
    assert_eq!(adapter.dispatch_count(), 0);
}

#[tokio::test]
async fn test_activate_after_destroy_fails() {
    let runtime = runtime(&MockDirectory::new());
    let adapter = hello_adapter(&runtime).await;
    adapter.destroy().await;

    assert_eq!(adapter.state(), AdapterState::Destroyed);
    assert_eq!(
        adapter.activate().await.unwrap_err(),
        AdapterError::Destroyed("Hello".into())
    );
    assert!(adapter.hold().is_err());
}

#[tokio::test]
async fn test_activate_after_deactivate_fails() {
    let runtime = runtime(&MockDirectory::new());
    let adapter = hello_adapter(&runtime).await;
    adapter.deactivate().await;
    assert_eq!(
        adapter.activate().await.unwrap_err(),
        AdapterError::Deactivated("Hello".into())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_destroy_is_idempotent() {
    let mock = MockDirectory::new();
    let runtime = runtime(&mock);
    let adapter = hello_adapter(&runtime).await;
    adapter.activate().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let adapter = Arc::clone(&adapter);
        handles.push(tokio::spawn(async move {
            adapter.destroy().await;
            adapter.state()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), AdapterState::Destroyed);
    }

    // Endpoints are withdrawn exactly once.
    let withdrawals = mock
        .registrations()
        .iter()
        .filter(|record| record.endpoints.is_none())
        .count();
    assert_eq!(withdrawals, 1);
    assert!(runtime.find_object_adapter("Hello").is_none());
}

#[tokio::test]
async fn test_failed_registration_can_be_retried() {
    let mock = MockDirectory::new();
    mock.fail_registration_with(DirectoryError::AdapterAlreadyActive("A".into()));
    let runtime = runtime(&mock);
    let adapter = hello_adapter(&runtime).await;

    assert_eq!(
        adapter.activate().await.unwrap_err(),
        AdapterError::Registration(DirectoryError::AdapterAlreadyActive("A".into()))
    );
    assert_eq!(adapter.state(), AdapterState::Held);

    mock.clear_registration_failure();
    adapter.activate().await.unwrap();
    assert_eq!(adapter.state(), AdapterState::Active);
}

#[tokio::test]
async fn test_activate_on_creation() {
    let mock = MockDirectory::new();
    let runtime = runtime(&mock);
    let config = AdapterConfig {
        hold_on_creation: false,
        ..hello_config()
    };
    let adapter = runtime
        .create_object_adapter_with_config("Hello", config)
        .await
        .unwrap();
    assert_eq!(adapter.state(), AdapterState::Active);
    assert!(mock.registered_endpoints("A").is_some());
}

#[tokio::test]
async fn test_adapter_names_are_unique_until_destroyed() {
    let runtime = runtime(&MockDirectory::new());
    let adapter = hello_adapter(&runtime).await;
    assert_eq!(
        runtime
            .create_object_adapter_with_config("Hello", hello_config())
            .await
            .unwrap_err(),
        AdapterError::NameInUse("Hello".into())
    );

    adapter.destroy().await;
    hello_adapter(&runtime).await;
}

async fn resolved_endpoints(proxy: &proxy_runtime::proxy::Proxy) -> Vec<Endpoint> {
    match proxy.resolve_target().await.unwrap() {
        InvocationTarget::Endpoints { endpoints, .. } => endpoints,
        InvocationTarget::Connection(_) => panic!("expected endpoints"),
    }
}

#[tokio::test]
async fn test_replica_group_proxies() {
    let mock = MockDirectory::new();
    let runtime = runtime(&mock);

    for (name, port) in [("A1", 10001), ("A2", 10002)] {
        let config = AdapterConfig {
            replica_group_id: "Group".into(),
            hold_on_creation: false,
            ..AdapterConfig::default()
                .with_adapter_id(name)
                .with_endpoint(Endpoint::tcp("localhost", port))
        };
        runtime
            .create_object_adapter_with_config(name, config)
            .await
            .unwrap();
    }

    let first = runtime.find_object_adapter("A1").unwrap();
    let proxy = first.create_proxy(Identity::named("hello")).unwrap();
    assert_eq!(proxy.adapter_id(), "Group");
    assert_eq!(
        resolved_endpoints(&proxy).await,
        vec![
            Endpoint::tcp("localhost", 10001),
            Endpoint::tcp("localhost", 10002)
        ]
    );

    // A member leaving the group withdraws only its own endpoints.
    let second = runtime.find_object_adapter("A2").unwrap();
    second.deactivate().await;
    second.wait_for_deactivate().await;
    proxy.clear_locator_cache().unwrap();
    assert_eq!(
        resolved_endpoints(&proxy).await,
        vec![Endpoint::tcp("localhost", 10001)]
    );
    assert_eq!(mock.registered_endpoints("A2"), None);
}

#[tokio::test]
async fn test_runtime_keeps_adapters_alive_until_destroyed() {
    let mock = MockDirectory::new();
    let runtime = runtime(&mock);
    let config = AdapterConfig {
        hold_on_creation: false,
        ..hello_config()
    };
    drop(
        runtime
            .create_object_adapter_with_config("Hello", config)
            .await
            .unwrap(),
    );

    let adapter = runtime.find_object_adapter("Hello").unwrap();
    assert_eq!(adapter.state(), AdapterState::Active);
    drop(adapter);
    assert_eq!(
        mock.registered_endpoints("A"),
        Some(vec![Endpoint::tcp("localhost", 10000)])
    );

    runtime.shutdown().await;
    assert_eq!(mock.registered_endpoints("A"), None);
    assert!(runtime.find_object_adapter("Hello").is_none());
}

#[tokio::test]
async fn test_published_endpoints() {
    let mock = MockDirectory::new();
    let runtime = runtime(&mock);
    let config = AdapterConfig {
        published_endpoints: Some(vec![Endpoint::tcp("public.example.com", 443)]),
        ..hello_config()
    };
    let adapter = runtime
        .create_object_adapter_with_config("Hello", config)
        .await
        .unwrap();
    adapter.activate().await.unwrap();
    assert_eq!(
        mock.registered_endpoints("A"),
        Some(vec![Endpoint::tcp("public.example.com", 443)])
    );

    let direct = adapter.create_direct_proxy(Identity::named("hello")).unwrap();
    assert_eq!(direct.endpoints(), &[Endpoint::tcp("public.example.com", 443)]);

    adapter
        .set_published_endpoints(vec![Endpoint::tcp("other.example.com", 443)])
        .await
        .unwrap();
    assert_eq!(
        mock.registered_endpoints("A"),
        Some(vec![Endpoint::tcp("other.example.com", 443)])
    );

    adapter.refresh_published_endpoints().await.unwrap();
    assert_eq!(
        adapter.published_endpoints(),
        vec![Endpoint::tcp("public.example.com", 443)]
    );
}

#[tokio::test]
async fn test_adapter_without_id_creates_direct_proxies() {
    let runtime = runtime(&MockDirectory::new());
    let config = AdapterConfig::default().with_endpoint(Endpoint::tcp("", 0));
    let adapter = runtime
        .create_object_adapter_with_config("", config)
        .await
        .unwrap();
    assert!(adapter.name().starts_with("adapter-"));

    let proxy = adapter.create_proxy(Identity::named("hello")).unwrap();
    assert_eq!(proxy.endpoints(), adapter.endpoints().as_slice());
    assert_ne!(proxy.endpoints()[0].port, 0);
}

#[tokio::test]
async fn test_servant_management_and_collocated_dispatch() {
    let runtime = runtime(&MockDirectory::new());
    let adapter = hello_adapter(&runtime).await;
    let identity = Identity::new("greeters", "hello");

    let proxy = adapter
        .add_facet(
            identity.clone(),
            "v2",
            servant_fn(|current, _| Ok(current.facet.clone().into_bytes())),
        )
        .unwrap();
    assert_eq!(proxy.facet(), "v2");

    let reply = adapter
        .dispatch_collocated(&identity, "v2", "greet", vec![])
        .await
        .unwrap();
    assert_eq!(reply, b"v2".to_vec());

    assert!(matches!(
        adapter.dispatch_collocated(&identity, "", "greet", vec![]).await,
        Err(AdapterError::ObjectNotExist { .. })
    ));

    adapter.remove(&identity, "v2").unwrap();
    assert!(adapter.find(&identity, "v2").is_none());
}

#[tokio::test]
async fn test_runtime_shutdown_destroys_adapters() {
    let runtime = runtime(&MockDirectory::new());
    let adapter = hello_adapter(&runtime).await;
    adapter.activate().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), runtime.shutdown())
        .await
        .unwrap();
    assert_eq!(adapter.state(), AdapterState::Destroyed);
    assert!(runtime.directories().is_destroyed());
    assert_eq!(
        runtime.create_object_adapter("Other").await.unwrap_err(),
        AdapterError::RuntimeShutdown
    );
}
