//! todoctl-server: HTTP binding for the todoctl services
//!
//! Request validation and error-to-status mapping live here; the services
//! in `todoctl-core` only see validated input and return structured errors.

pub mod http;

pub use http::{build_router, run_server, ApiError, AppState, ServerConfig, ServerError};
