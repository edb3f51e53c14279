//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Logging → Load config → Validate → Metrics → Upstream client
//!     → Admission controller → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Close admission (queued jobs dropped, running jobs
//!     cancelled) → Stop accepting → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Outstanding proxy work is cancelled at shutdown, never awaited

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
