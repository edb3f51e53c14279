//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the site proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Worker pool sizing (admission control).
    pub pool: PoolConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Outbound request settings.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Proxied sites.
    pub sites: Vec<SiteConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Worker pool configuration.
///
/// `workers` also caps the number of simultaneous upstream connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of jobs running at once.
    pub workers: usize,

    /// Maximum number of admitted jobs waiting for a worker.
    pub backlog: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 32,
            backlog: 256,
        }
    }
}

/// Upper bound accepted for any timeout, in seconds (one day).
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Timeout configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Hard deadline for a suspended request, in seconds.
    pub suspend_secs: u64,

    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            suspend_secs: 60,
            connect_secs: 10,
        }
    }
}

/// Outbound request configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Value of the `Via` header added to every relayed response.
    pub via: String,

    /// Header carrying the real client address to the origin.
    pub forwarded_for_header: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            via: "1.1 site-proxy".to_string(),
            forwarded_for_header: "X-Forwarded-For".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A proxied site: a local path prefix backed by a remote origin.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    /// Site identifier; also names the cookie namespace (`proxy<id>`).
    pub id: String,

    /// Path prefix under which the site is reachable (e.g. "/site-42").
    pub local_prefix: String,

    /// Base URL of the origin server.
    pub remote_url: String,

    /// Disabled sites answer 404 without contacting the origin.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Cookie names forwarded without namespacing.
    #[serde(default)]
    pub cookie_passthrough_names: Vec<String>,

    /// Ordered body rewrite rules.
    #[serde(default)]
    pub rewrite_rules: Vec<RewriteRuleConfig>,
}

fn default_enabled() -> bool {
    true
}

/// A URL-gated text substitution applied to response bodies.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RewriteRuleConfig {
    /// Regex that must match the whole outbound URL.
    pub path_pattern: String,

    /// Regex applied to every body line.
    pub body_pattern: String,

    /// Substitution template. `$1` and `${name}` expand capture groups; a
    /// numbered reference takes only as many digits as the pattern has groups,
    /// and `$$` is a literal `$`.
    pub replacement: String,
}
