//! Error types shared by the proxy pipeline.

use thiserror::Error;

use crate::site::SiteError;

/// Errors raised while building the server or running a proxy job.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A site definition could not be turned into a runtime site.
    #[error("invalid site configuration: {0}")]
    Site(#[from] SiteError),

    /// A configured header name or value is not valid HTTP.
    #[error("invalid header setting `{0}`")]
    InvalidHeader(String),

    /// The shared upstream client could not be constructed.
    #[error("failed to build upstream client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// Network or protocol failure talking to the origin.
    #[error("upstream request to {url} failed: {source}")]
    Upstream {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream connection limiter was closed during shutdown.
    #[error("upstream connection pool is closed")]
    PoolClosed,

    /// The suspended request was resumed before the response was handed over.
    #[error("request expired before the response could be written")]
    Expired,

    /// The downstream body channel closed mid-relay.
    #[error("client went away while the body was being relayed")]
    ClientGone,
}

impl ProxyError {
    /// Expected races with the request deadline or the client. Logged at info, not warn.
    pub fn is_abandonment(&self) -> bool {
        matches!(self, ProxyError::Expired | ProxyError::ClientGone)
    }
}
