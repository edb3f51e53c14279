//! Asynchronous request dispatch.
//!
//! # Responsibilities
//! - Admit or reject the request without blocking
//! - Suspend the handler while a worker runs fetch → relay
//! - Enforce the hard deadline on both sides of the suspension
//! - Turn pipeline outcomes into a response and a log line of the right severity
//!
//! # Outcomes
//! ```text
//! rejected                      → 404 / 503 (debug)
//! worker hands over a response  → relayed status, body streamed by the worker
//! worker fails before a head    → 502, empty body (warn)
//! deadline before a head        → 504, empty body; worker abandons later (info)
//! deadline mid-body             → body ends where it was (info)
//! client gone mid-body          → worker stops (info)
//! ```

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::Instrument;

use crate::admission::Admission;
use crate::config::schema::MAX_TIMEOUT_SECS;
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::relay::{self, BodySink, RelaySettings};
use crate::site::Site;
use crate::upstream::{OutboundRequest, UpstreamClient};

/// Chunks buffered between the worker and the connection.
const BODY_CHANNEL_DEPTH: usize = 8;

/// Owns the pool, the upstream client and the suspension deadline.
#[derive(Debug)]
pub struct Dispatcher {
    admission: Admission,
    upstream: Arc<UpstreamClient>,
    settings: Arc<RelaySettings>,
    suspend_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        admission: Admission,
        upstream: UpstreamClient,
        settings: RelaySettings,
        suspend_timeout: Duration,
    ) -> Self {
        Self {
            admission,
            upstream: Arc::new(upstream),
            settings: Arc::new(settings),
            suspend_timeout,
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Cancel outstanding work and refuse new jobs.
    pub fn shutdown(&self) {
        self.admission.shutdown();
        self.upstream.close();
    }

    /// Proxy one request for `site`, suspending until a worker answers or the deadline passes.
    pub async fn dispatch(&self, site: Arc<Site>, request: OutboundRequest, head_only: bool) -> Response {
        let start = std::time::Instant::now();

        let ticket = match self.admission.admit(&site) {
            Ok(ticket) => ticket,
            Err(rejection) => {
                tracing::debug!(site = %site.id(), reason = %rejection, "Request not admitted");
                metrics::record_rejection(rejection.reason());
                let response = rejection.into_response();
                metrics::record_request(site.id(), response.status().as_u16(), start);
                return response;
            }
        };

        let deadline = deadline_after(self.suspend_timeout);
        let (reply, resumed) = oneshot::channel();
        let job = ProxyJob {
            site: Arc::clone(&site),
            request,
            head_only,
            deadline,
            reply,
            upstream: Arc::clone(&self.upstream),
            settings: Arc::clone(&self.settings),
        };
        ticket.spawn(job.run().instrument(tracing::Span::current()));

        let response = match tokio::time::timeout_at(deadline, resumed).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) if self.admission.is_closed() => StatusCode::SERVICE_UNAVAILABLE.into_response(),
            Ok(Err(_)) => StatusCode::BAD_GATEWAY.into_response(),
            Err(_) => {
                tracing::info!(site = %site.id(), "Deadline passed before the origin answered");
                StatusCode::GATEWAY_TIMEOUT.into_response()
            }
        };
        metrics::record_request(site.id(), response.status().as_u16(), start);
        response
    }
}

/// An admitted request: everything the worker needs, detached from the handler.
struct ProxyJob {
    site: Arc<Site>,
    request: OutboundRequest,
    head_only: bool,
    deadline: Instant,
    reply: oneshot::Sender<Response>,
    upstream: Arc<UpstreamClient>,
    settings: Arc<RelaySettings>,
}

impl ProxyJob {
    async fn run(self) {
        let site = self.site.id().to_string();
        let url = self.request.url.to_string();

        match tokio::time::timeout_at(self.deadline, self.execute()).await {
            Ok(Ok(bytes)) => {
                tracing::debug!(site = %site, url = %url, bytes, "Proxy job complete");
            }
            Ok(Err(e)) if e.is_abandonment() => {
                tracing::info!(site = %site, url = %url, reason = %e, "Proxy job abandoned");
                metrics::record_abandoned(match e {
                    ProxyError::Expired => "expired",
                    _ => "client_gone",
                });
            }
            Ok(Err(e)) => {
                tracing::warn!(site = %site, url = %url, error = %e, "Proxy job failed");
            }
            Err(_) => {
                tracing::info!(site = %site, url = %url, "Deadline passed while relaying, abandoning");
                metrics::record_abandoned("deadline");
            }
        }
    }

    async fn execute(self) -> Result<u64, ProxyError> {
        let ProxyJob {
            site,
            request,
            head_only,
            reply,
            upstream,
            settings,
            ..
        } = self;

        let url = request.url.clone();
        let rewrites = site.rewrites_for(&url);
        let origin = upstream.fetch(request).await?;
        let status = origin.status();

        let headers = relay::response_headers(
            &site,
            url.as_str(),
            status,
            origin.headers(),
            !rewrites.is_empty(),
            &settings.via,
        );
        let mode = relay::body_mode(head_only, status, origin.headers(), rewrites);

        let (sink, body) = body_channel();
        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;

        if reply.send(response).is_err() {
            return Err(ProxyError::Expired);
        }
        relay::relay_body(origin, mode, &sink).await
    }
}

/// `now + timeout`, capped at the longest configurable timeout.
fn deadline_after(timeout: Duration) -> Instant {
    let timeout = timeout.min(Duration::from_secs(MAX_TIMEOUT_SECS));
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now)
}

/// A response body fed chunk by chunk from a worker.
fn body_channel() -> (BodySink, Body) {
    let (tx, mut rx) = mpsc::channel::<Result<Bytes, io::Error>>(BODY_CHANNEL_DEPTH);
    let stream = futures_util::stream::poll_fn(move |cx| rx.poll_recv(cx));
    (tx, Body::from_stream(stream))
}
