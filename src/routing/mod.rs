//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (site lookup)
//!     → matcher.rs (prefix match on a path-segment boundary)
//!     → Return: matched Site + remaining path, or NoMatch
//!
//! Table Compilation (at startup and on reload):
//!     SiteConfig[]
//!     → Site::from_config
//!     → Sort by prefix length, longest first
//!     → Freeze as immutable SiteRouter
//! ```
//!
//! # Design Decisions
//! - Table compiled up front, immutable at runtime, swapped whole on reload
//! - Prefix matching only; regexes are reserved for body rewriting
//! - Longest prefix wins, so nested sites (`/a` and `/a/b`) are unambiguous
//! - Disabled sites stay in the table so they can answer 404 explicitly

pub mod matcher;
pub mod router;

pub use router::{RouteMatch, SiteRouter};
