//! Site-mapping reverse proxy.
//!
//! Publishes remote origins ("sites") under local path prefixes, with a
//! bounded worker pool, cookie namespacing, redirect translation and
//! rule-driven body rewriting.

pub mod admission;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;
pub mod routing;
pub mod site;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
