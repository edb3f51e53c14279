//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (worker count, timeouts)
//! - Detect duplicate site ids and conflicting local prefixes
//! - Compile every site so bad URLs and regexes fail at load time
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{ProxyConfig, MAX_TIMEOUT_SECS};
use crate::site::{Site, SiteError};

/// A single semantic problem in a configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("pool.workers must be greater than zero")]
    NoWorkers,

    #[error("timeouts.suspend_secs must be greater than zero")]
    NoSuspendTimeout,

    #[error("pool.workers + pool.backlog must not exceed {max}")]
    PoolTooLarge { max: usize },

    #[error("timeouts.{field} = {value} is out of range (1..={max})")]
    TimeoutOutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("upstream.{field} is not a valid header: {value:?}")]
    InvalidHeader { field: &'static str, value: String },

    #[error("duplicate site id `{0}`")]
    DuplicateSiteId(String),

    #[error("local prefix `{prefix}` of site `{site}` is already used")]
    DuplicatePrefix { site: String, prefix: String },

    #[error(transparent)]
    Site(#[from] SiteError),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.pool.workers == 0 {
        errors.push(ValidationError::NoWorkers);
    }
    match config.pool.workers.checked_add(config.pool.backlog) {
        Some(total) if total <= tokio::sync::Semaphore::MAX_PERMITS => {}
        _ => errors.push(ValidationError::PoolTooLarge {
            max: tokio::sync::Semaphore::MAX_PERMITS,
        }),
    }
    if config.timeouts.suspend_secs == 0 {
        errors.push(ValidationError::NoSuspendTimeout);
    } else if config.timeouts.suspend_secs > MAX_TIMEOUT_SECS {
        errors.push(ValidationError::TimeoutOutOfRange {
            field: "suspend_secs",
            value: config.timeouts.suspend_secs,
            max: MAX_TIMEOUT_SECS,
        });
    }
    if !(1..=MAX_TIMEOUT_SECS).contains(&config.timeouts.connect_secs) {
        errors.push(ValidationError::TimeoutOutOfRange {
            field: "connect_secs",
            value: config.timeouts.connect_secs,
            max: MAX_TIMEOUT_SECS,
        });
    }
    if axum::http::HeaderName::from_bytes(config.upstream.forwarded_for_header.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeader {
            field: "forwarded_for_header",
            value: config.upstream.forwarded_for_header.clone(),
        });
    }
    if axum::http::HeaderValue::from_str(&config.upstream.via).is_err() {
        errors.push(ValidationError::InvalidHeader {
            field: "via",
            value: config.upstream.via.clone(),
        });
    }

    let mut ids = HashSet::new();
    let mut prefixes = HashSet::new();
    for site in &config.sites {
        if !ids.insert(site.id.as_str()) {
            errors.push(ValidationError::DuplicateSiteId(site.id.clone()));
        }
        if !prefixes.insert(site.local_prefix.trim_end_matches('/')) {
            errors.push(ValidationError::DuplicatePrefix {
                site: site.id.clone(),
                prefix: site.local_prefix.clone(),
            });
        }
        if let Err(e) = Site::from_config(site) {
            errors.push(e.into());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
