//! Upstream fetch subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request headers + Site
//!     → request.rs (header allow-list, deproxied cookies, forwarded-for)
//!     → client.rs (acquire connection permit, GET remote URL)
//!     → UpstreamResponse (status, headers, streaming body, permit)
//! ```
//!
//! # Design Decisions
//! - One client per process, built at startup and owned by the server
//! - Upstream connections are capped at the worker count; the permit is
//!   held until the response body has been fully relayed or dropped
//! - `Accept-Encoding` is never forwarded, so bodies arrive identity-encoded
//! - Redirects are not followed; they are relayed and rewritten
//! - No retries: failures surface to the job, which logs and gives up

pub mod client;
pub mod request;

pub use client::{UpstreamClient, UpstreamResponse};
pub use request::{OutboundRequest, FORWARDED_REQUEST_HEADERS};
