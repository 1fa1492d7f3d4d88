#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Proxy Runtime
//!
//! > **Addressing, locating and hosting remote objects.**
//!
//! This crate is the core of an RPC runtime. A caller holds a [`Proxy`](proxy::Proxy)
//! to a remote object; the runtime turns the proxy's *logical* address (an
//! identity plus either endpoints or an adapter id) into *physical* endpoints by
//! asking a directory service, caching the answers and merging concurrent
//! lookups. On the server side, object adapters host servants and publish
//! their endpoints to the same directory.
//!
//! Wire encoding, connections and retry policy live outside this crate and
//! plug in through traits.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Immutable References
//! A [`Reference`](reference::Reference) never changes. Every `with_*` call
//! produces a new `Arc<Reference>`, or hands back the same one when the value
//! is already set. Proxies can be shared freely across tasks.
//!
//! ### One Lookup per Key
//! The [`Resolver`](directory::Resolver) keeps at most one directory call in
//! flight per adapter id and per identity. Everyone asking for the same key
//! while it runs gets the same answer, success or failure.
//!
//! ### Observable Lifecycles
//! Adapter state and the in-flight dispatch count are published through a
//! single `tokio::sync::watch` channel, so `wait_for_deactivate()` never
//! returns while a dispatch is still running.
//!
//! ## 👩‍💻 Architecture Notes
//!
//! ### 1. Type-Safe Error Handling
//! Each layer has its own error type ([`ReferenceError`](reference::ReferenceError),
//! [`DirectoryError`](directory::DirectoryError), [`ProxyError`](proxy::ProxyError),
//! [`AdapterError`](adapter::AdapterError)). They are `Clone` because one
//! directory failure is delivered to every coalesced caller.
//!
//! ### 2. Collaborators as Traits
//! The directory service ([`Directory`](directory::Directory)), incoming
//! transports ([`Acceptor`](adapter::Acceptor)) and servants
//! ([`Servant`](adapter::Servant)) are `async_trait` objects.
//!
//! ### 3. Observability
//! `tracing` everywhere, with `adapter_id`, `identity` and `adapter` fields.
//! See the [`runtime::tracing`] module for details.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Values ([`reference`])
//! Identities, endpoints, versions and the [`Reference`](reference::Reference)
//! itself, with its proxy string form.
//!
//! ### 2. The Handle ([`proxy`])
//! [`Proxy`](proxy::Proxy) wraps a reference and the runtime that resolves it.
//!
//! ### 3. The Lookup ([`directory`])
//! Cache, single-flight coalescing, resolvers and the per-directory registry,
//! plus [`MockDirectory`](directory::MockDirectory) for tests.
//!
//! ### 4. The Server Side ([`adapter`])
//! [`ObjectAdapter`](adapter::ObjectAdapter) and its lifecycle state machine.
//!
//! ### 5. The Orchestrator ([`runtime`])
//! [`Runtime`](runtime::Runtime) wires everything together from a
//! [`RuntimeConfig`](runtime::RuntimeConfig) and shuts it down again.
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Run the demo with info logs
//! RUST_LOG=info cargo run
//!
//! # Run the tests
//! cargo test
//! ```

pub mod adapter;
pub mod directory;
pub mod proxy;
pub mod reference;
pub mod runtime;
