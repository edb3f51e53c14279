//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, rewrite rules compiled once)
//!     → ProxyConfig (validated, immutable)
//!     → sites compiled into the routing table
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps its site table atomically
//!     → in-flight jobs keep the site snapshot they started with
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only the site table is hot-reloadable; pool sizing is fixed at startup

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::ProxyConfig;
pub use schema::ListenerConfig;
pub use schema::TlsConfig;
pub use schema::PoolConfig;
pub use schema::TimeoutConfig;
pub use schema::UpstreamConfig;
pub use schema::ObservabilityConfig;
pub use schema::SiteConfig;
pub use schema::RewriteRuleConfig;
