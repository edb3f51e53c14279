//! Proxied site model.
//!
//! # Data Flow
//! ```text
//! SiteConfig (serde, from config file)
//!     → Site::from_config (parse remote URL, compile rewrite rules)
//!     → Arc<Site> held by the routing table
//!     → snapshot handed to each proxy job
//! ```
//!
//! # Design Decisions
//! - Rewrite rules are compiled once per site load, not per request
//! - A job keeps its `Arc<Site>` even if the table is swapped by a reload
//! - The cookie namespace is derived from the site id (`proxy<id>`)

pub mod cookies;
pub mod rewrite;

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::SiteConfig;
use self::cookies::CookieNamespace;
use self::rewrite::{Rewrites, RuleSet};

/// Error building a [`Site`] from its configuration.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("site `{site}`: local prefix `{prefix}` must start with '/'")]
    InvalidPrefix { site: String, prefix: String },

    #[error("site `{site}`: remote url `{url}` is invalid: {reason}")]
    InvalidRemoteUrl {
        site: String,
        url: String,
        reason: String,
    },

    #[error("site `{site}`: rewrite rule #{index} does not compile: {source}")]
    InvalidRule {
        site: String,
        index: usize,
        #[source]
        source: regex::Error,
    },
}

/// Error building the origin URL for an inbound path.
#[derive(Debug, Error)]
pub enum OutboundUrlError {
    #[error("invalid outbound url: {0}")]
    Parse(#[from] url::ParseError),

    #[error("path `{0}` leaves the site's remote path")]
    Escapes(String),
}

/// A configured mapping from a local URL prefix to a remote origin.
#[derive(Debug)]
pub struct Site {
    id: String,
    /// Normalised without a trailing '/'; the root site is the empty string.
    local_prefix: String,
    /// Normalised without a trailing '/'.
    remote_url: String,
    remote: Url,
    enabled: bool,
    passthrough: HashSet<String>,
    rules: RuleSet,
    namespace: CookieNamespace,
}

impl Site {
    /// Validate and compile a site definition.
    pub fn from_config(config: &SiteConfig) -> Result<Self, SiteError> {
        if !config.local_prefix.starts_with('/') {
            return Err(SiteError::InvalidPrefix {
                site: config.id.clone(),
                prefix: config.local_prefix.clone(),
            });
        }

        let remote = Url::parse(&config.remote_url).map_err(|e| SiteError::InvalidRemoteUrl {
            site: config.id.clone(),
            url: config.remote_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(remote.scheme(), "http" | "https") || remote.host_str().is_none() {
            return Err(SiteError::InvalidRemoteUrl {
                site: config.id.clone(),
                url: config.remote_url.clone(),
                reason: "expected an absolute http(s) url".to_string(),
            });
        }

        let rules = RuleSet::compile(&config.rewrite_rules).map_err(|(index, source)| {
            SiteError::InvalidRule {
                site: config.id.clone(),
                index,
                source,
            }
        })?;

        Ok(Self {
            id: config.id.clone(),
            local_prefix: config.local_prefix.trim_end_matches('/').to_string(),
            remote_url: config.remote_url.trim_end_matches('/').to_string(),
            remote,
            enabled: config.enabled,
            passthrough: config.cookie_passthrough_names.iter().cloned().collect(),
            rules,
            namespace: CookieNamespace::for_site(&config.id),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn local_prefix(&self) -> &str {
        &self.local_prefix
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    /// Path component of the origin URL, used to scope forwarded cookies.
    pub fn remote_path(&self) -> &str {
        self.remote.path()
    }

    /// Host of the origin URL.
    pub fn remote_host(&self) -> &str {
        self.remote.host_str().unwrap_or_default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn passthrough_names(&self) -> &HashSet<String> {
        &self.passthrough
    }

    pub fn cookie_namespace(&self) -> &CookieNamespace {
        &self.namespace
    }

    /// Rewrite rules whose path pattern matches `url`, in configured order.
    pub fn rewrites_for(&self, url: &Url) -> Rewrites {
        self.rules.matching(url.as_str())
    }

    /// Build `remote_url + remainder + ?query`.
    ///
    /// `remainder` is the inbound path with the local prefix removed; it is
    /// either empty or starts with '/'. Dot segments (plain or percent-encoded)
    /// are resolved by the parser, and a result outside the remote path is
    /// rejected.
    pub fn outbound_url(&self, remainder: &str, query: Option<&str>) -> Result<Url, OutboundUrlError> {
        let mut target = String::with_capacity(self.remote_url.len() + remainder.len() + 16);
        target.push_str(&self.remote_url);
        target.push_str(remainder);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }
        let url = Url::parse(&target)?;
        if !self.contains_path(url.path()) {
            return Err(OutboundUrlError::Escapes(url.path().to_string()));
        }
        Ok(url)
    }

    fn contains_path(&self, path: &str) -> bool {
        let base = self.remote.path().trim_end_matches('/');
        if base.is_empty() {
            return true;
        }
        match path.strip_prefix(base) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}
