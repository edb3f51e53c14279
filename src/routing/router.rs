//! Site lookup.
//!
//! # Responsibilities
//! - Store compiled sites
//! - Look up the site owning a request path
//! - Return matched site or explicit no-match

use std::sync::Arc;

use crate::config::SiteConfig;
use crate::routing::matcher::PathPrefixMatcher;
use crate::site::{Site, SiteError};

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    pub site: Arc<Site>,
    /// Request path with the local prefix removed.
    pub remainder: &'a str,
}

/// Immutable table of sites ordered by prefix length, longest first.
#[derive(Debug, Default)]
pub struct SiteRouter {
    sites: Vec<(PathPrefixMatcher, Arc<Site>)>,
}

impl SiteRouter {
    pub fn new(sites: Vec<Site>) -> Self {
        let mut sites: Vec<_> = sites
            .into_iter()
            .map(|site| (PathPrefixMatcher::new(site.local_prefix()), Arc::new(site)))
            .collect();
        sites.sort_by(|a, b| b.0.prefix().len().cmp(&a.0.prefix().len()));
        Self { sites }
    }

    /// Compile every site definition.
    pub fn from_config(configs: &[SiteConfig]) -> Result<Self, SiteError> {
        let sites = configs
            .iter()
            .map(Site::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(sites))
    }

    pub fn match_path<'a>(&self, path: &'a str) -> Option<RouteMatch<'a>> {
        self.sites.iter().find_map(|(matcher, site)| {
            matcher.strip(path).map(|remainder| RouteMatch {
                site: Arc::clone(site),
                remainder,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
