//! # Proxy Runtime Demo
//!
//! Runs a server and a client in one process against the in-memory
//! [`MockDirectory`](proxy_runtime::directory::MockDirectory):
//!
//! 1. An adapter `Hello` with adapter id `HelloAdapter` registers its endpoints.
//! 2. A client resolves `hello @ HelloAdapter` twice; the second time is a cache hit.
//! 3. The request is dispatched collocated, then everything shuts down.
//!
//! ```bash
//! RUST_LOG=info cargo run
//! ```

use proxy_runtime::adapter::servant_fn;
use proxy_runtime::directory::MockDirectory;
use proxy_runtime::proxy::InvocationTarget;
use proxy_runtime::reference::{Endpoint, Identity};
use proxy_runtime::runtime::{setup_tracing, AdapterConfig, RuntimeBuilder, RuntimeConfig};
use std::sync::Arc;
use tracing::{info, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    info!("Starting proxy runtime demo");

    let directory = MockDirectory::new();
    let config = RuntimeConfig {
        default_locator: Some("DemoLocator/Locator:tcp -h localhost -p 4061".to_string()),
        locator_cache_timeout: 30,
        ..RuntimeConfig::default()
    };
    let runtime = RuntimeBuilder::new(config)
        .with_directory_connector(Arc::new(directory.clone()))
        .build()
        .map_err(|e| e.to_string())?;

    // Server side
    let span = tracing::info_span!("server_startup");
    let adapter = async {
        let config = AdapterConfig::default()
            .with_adapter_id("HelloAdapter")
            .with_endpoint(Endpoint::tcp("localhost", 0));
        let adapter = runtime
            .create_object_adapter_with_config("Hello", config)
            .await
            .map_err(|e| e.to_string())?;

        let hello = servant_fn(|current, payload| {
            let name = String::from_utf8_lossy(&payload);
            Ok(format!("Hello, {name}! ({} on {})", current.operation, current.adapter).into_bytes())
        });
        adapter
            .add(Identity::named("hello"), hello)
            .map_err(|e| e.to_string())?;
        adapter.activate().await.map_err(|e| e.to_string())?;
        Ok::<_, String>(adapter)
    }
    .instrument(span)
    .await?;

    info!(
        endpoints = ?directory.registered_endpoints("HelloAdapter"),
        "Adapter registered"
    );

    // Client side
    let proxy = runtime
        .string_to_proxy("hello @ HelloAdapter")
        .map_err(|e| e.to_string())?;

    let span = tracing::info_span!("client_calls");
    async {
        for attempt in 1..=2 {
            match proxy.prepare_invocation("sayHello", true).await {
                Ok(InvocationTarget::Endpoints { endpoints, cached }) => {
                    info!(attempt, ?endpoints, cached, "Resolved target");
                }
                Ok(InvocationTarget::Connection(connection)) => {
                    info!(attempt, id = connection.id, "Using fixed connection");
                }
                Err(e) => return Err(e.to_string()),
            }
        }

        let reply = adapter
            .dispatch_collocated(proxy.identity(), proxy.facet(), "sayHello", b"World".to_vec())
            .await
            .map_err(|e| e.to_string())?;
        info!(reply = %String::from_utf8_lossy(&reply), "Collocated call returned");
        Ok(())
    }
    .instrument(span)
    .await?;

    info!(lookups = directory.adapter_lookups(), "Directory lookups issued");

    runtime.shutdown().await;

    info!("Application completed successfully");
    Ok(())
}
