pub mod forwarder;
pub mod http_client;
pub mod http_handler;
pub mod middleware;

/// Re-export commonly used types from adapters
pub use forwarder::{RequestForwarder, ResponseMode};
pub use http_client::UpstreamClientAdapter;
pub use http_handler::{HttpHandler, build_router};
