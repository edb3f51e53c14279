//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing, method check)
//!     → routing (path → Site)
//!     → dispatch.rs (admission, suspension, deadline)
//!         → worker: upstream fetch → relay
//!     → response resumed to the client
//! ```

pub mod dispatch;
pub mod request;
pub mod server;

pub use dispatch::Dispatcher;
pub use request::{request_id, UuidRequestId, X_REQUEST_ID};
pub use server::HttpServer;
