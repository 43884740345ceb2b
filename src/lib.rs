//! Dendrite - an authenticated API-key gateway for a single upstream HTTP API.
//!
//! Dendrite sits in front of one upstream API and enforces per-client
//! admission control before forwarding anything: clients authenticate with a
//! static bearer API key, pass a two-window sliding-window rate limit, have
//! their usage counted, and only then is the request relayed upstream with
//! the upstream's own credential. Responses are shaped on the way back —
//! JSON bodies can be rewritten (upstream-hosted image URLs become
//! gateway-hosted ones), binary and audio responses are relayed as opaque
//! streams, and upstream error bodies are sanitized so the upstream's
//! identity never leaks.
//!
//! # Features
//! - Bearer API-key authentication against an in-memory client registry
//! - Per-client sliding-window rate limiting over two independent windows
//!   (per minute, per day)
//! - Per-client usage counters exposed via stats endpoints
//! - Admin endpoints for registering, enumerating and deleting clients
//! - Response-shape-aware forwarding: buffered JSON with URL rewriting, or
//!   unbuffered binary stream relay
//! - Upstream error normalization with absolute-URL stripping
//! - Metrics (via the `metrics` facade) & structured tracing via `tracing`
//! - Graceful shutdown
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use dendrite::{
//!     GatewayService, HttpHandler, RequestForwarder, UpstreamClientAdapter, build_router,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = Arc::new(dendrite::config::loader::load_config("config.toml").await?);
//! let gateway = Arc::new(GatewayService::new(config.clone()));
//! let http_client = Arc::new(UpstreamClientAdapter::new()?);
//! let forwarder = RequestForwarder::new(http_client, &config);
//! let app = build_router(Arc::new(HttpHandler::new(gateway, forwarder)));
//! // Serve `app` with axum::serve (see the binary crate)
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping business logic inside `core`. End users should prefer the
//! re‑exports documented below instead of reaching into internal modules
//! directly.
//!
//! # Error Handling
//! All fallible APIs return `eyre::Result<T>` or a domain specific error
//! type. Client-facing failures always surface as JSON bodies with an
//! `error` field and a status mirroring the failure kind.
//!
//! # Concurrency & Data Structures
//! For shared mutable maps the project uses `scc::HashMap` to maintain
//! predictable performance characteristics under contention; the rate
//! limiter's prune-check-append sequence runs under the per-key entry lock.
// Re-export public modules with explicit visibility controls
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpHandler, RequestForwarder, UpstreamClientAdapter, build_router},
    core::GatewayService,
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
