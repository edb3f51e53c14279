//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt subscriber)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The request span follows a proxy job onto its worker
//! - Handler log lines carry the `x-request-id` value
//! - Expected outcomes (rejections, expired requests) log below warn
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
