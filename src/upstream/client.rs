//! Shared upstream HTTP client.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::admission::clamp_permits;
use crate::config::{PoolConfig, TimeoutConfig};
use crate::error::ProxyError;
use crate::upstream::request::OutboundRequest;

/// Upstream client with a connection ceiling equal to the worker count.
#[derive(Debug)]
pub struct UpstreamClient {
    client: reqwest::Client,
    connections: Arc<Semaphore>,
    max_connections: usize,
}

impl UpstreamClient {
    pub fn new(pool: &PoolConfig, timeouts: &TimeoutConfig) -> Result<Self, ProxyError> {
        let max_connections = clamp_permits(pool.workers);
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .no_proxy()
            .build()
            .map_err(ProxyError::ClientBuild)?;

        tracing::info!(max_connections, "Upstream client ready");

        Ok(Self {
            client,
            connections: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Send the request and return once the response head has arrived.
    pub async fn fetch(&self, request: OutboundRequest) -> Result<UpstreamResponse, ProxyError> {
        let permit = Arc::clone(&self.connections)
            .acquire_owned()
            .await
            .map_err(|_| ProxyError::PoolClosed)?;

        let url = request.url.to_string();
        tracing::debug!(url = %url, "Fetching from origin");

        let response = self
            .client
            .get(request.url)
            .headers(request.headers)
            .send()
            .await
            .map_err(|source| ProxyError::Upstream {
                url: url.clone(),
                source,
            })?;

        Ok(UpstreamResponse {
            url,
            response,
            _permit: permit,
        })
    }

    pub fn available_connections(&self) -> usize {
        self.connections.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Refuse further fetches. Outstanding responses keep their permits.
    pub fn close(&self) {
        self.connections.close();
    }
}

/// An origin response whose body has not been consumed yet.
///
/// Dropping it releases the connection and its permit.
#[derive(Debug)]
pub struct UpstreamResponse {
    url: String,
    response: reqwest::Response,
    _permit: OwnedSemaphorePermit,
}

impl UpstreamResponse {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    /// Next body chunk, `None` at end of body.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, ProxyError> {
        self.response
            .chunk()
            .await
            .map_err(|source| ProxyError::Upstream {
                url: self.url.clone(),
                source,
            })
    }
}
