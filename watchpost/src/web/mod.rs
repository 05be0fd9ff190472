//! HTTP surface: pages, diagnostic endpoints and the middleware around them.
//!
//! ```text
//! TraceLayer -> auth_gate -> exception_handler -> CatchPanicLayer -> handlers
//! ```

pub mod api;
pub mod auth;
pub mod middleware;
pub mod routes;
pub mod templates;

pub use middleware::{AppState, Identity};
pub use routes::app_router;
