//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (request ID, tracing)
//! - Bind server to a plain or TLS listener
//! - Resolve the site for each request and hand it to the dispatcher
//! - Apply site table reloads
//! - Cancel outstanding proxy work on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderName, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admission::Admission;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::dispatch::Dispatcher;
use crate::http::request::{request_id, UuidRequestId};
use crate::relay::RelaySettings;
use crate::routing::SiteRouter;
use crate::upstream::{OutboundRequest, UpstreamClient};

/// Grace period for open TLS connections after shutdown.
const TLS_DRAIN_SECS: u64 = 5;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub sites: Arc<ArcSwap<SiteRouter>>,
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP server for the site proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    sites: Arc<ArcSwap<SiteRouter>>,
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// The upstream client and the worker pool are built here, once, and
    /// live as long as the server.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let table = SiteRouter::from_config(&config.sites)?;
        if table.is_empty() {
            tracing::warn!("No sites configured, every request will be answered with 404");
        } else {
            tracing::info!(sites = table.len(), "Site table loaded");
        }
        let sites = Arc::new(ArcSwap::from_pointee(table));

        let settings = RelaySettings {
            via: HeaderValue::from_str(&config.upstream.via)
                .map_err(|_| ProxyError::InvalidHeader(config.upstream.via.clone()))?,
            forwarded_for: HeaderName::from_bytes(config.upstream.forwarded_for_header.as_bytes())
                .map_err(|_| ProxyError::InvalidHeader(config.upstream.forwarded_for_header.clone()))?,
        };
        let upstream = UpstreamClient::new(&config.pool, &config.timeouts)?;
        let dispatcher = Arc::new(Dispatcher::new(
            Admission::new(config.pool),
            upstream,
            settings,
            Duration::from_secs(config.timeouts.suspend_secs),
        ));

        let state = AppState {
            sites: Arc::clone(&sites),
            dispatcher: Arc::clone(&dispatcher),
        };
        let router = Self::build_router(state);

        Ok(Self {
            router,
            config,
            sites,
            dispatcher,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reloader = tokio::spawn(apply_config_updates(
            Arc::clone(&self.sites),
            self.config.clone(),
            config_updates,
        ));

        let dispatcher = Arc::clone(&self.dispatcher);
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
                dispatcher.shutdown();
            })
            .await?;

        reloader.abort();
        self.dispatcher.shutdown();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server over TLS on `addr`.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let reloader = tokio::spawn(apply_config_updates(
            Arc::clone(&self.sites),
            self.config.clone(),
            config_updates,
        ));

        let handle = axum_server::Handle::new();
        let watcher = {
            let handle = handle.clone();
            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
                dispatcher.shutdown();
                handle.graceful_shutdown(Some(Duration::from_secs(TLS_DRAIN_SECS)));
            })
        };

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app)
            .await?;

        watcher.abort();
        reloader.abort();
        self.dispatcher.shutdown();
        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Swap in the site table of every valid configuration received.
async fn apply_config_updates(
    sites: Arc<ArcSwap<SiteRouter>>,
    current: ProxyConfig,
    mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
) {
    while let Some(config) = updates.recv().await {
        if config.pool != current.pool
            || config.timeouts != current.timeouts
            || config.listener.bind_address != current.listener.bind_address
            || config.upstream.via != current.upstream.via
            || config.upstream.forwarded_for_header != current.upstream.forwarded_for_header
        {
            tracing::warn!("Listener, pool, timeout and upstream changes need a restart; reloading sites only");
        }
        match SiteRouter::from_config(&config.sites) {
            Ok(router) => {
                if router.is_empty() {
                    tracing::warn!("Reloaded site table is empty");
                }
                tracing::info!(sites = router.len(), "Site table reloaded");
                sites.store(Arc::new(router));
            }
            Err(e) => {
                tracing::error!(error = %e, "Rejected site table reload");
            }
        }
    }
}

/// Main proxy handler.
/// Resolves the site, builds the outbound request and dispatches it.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let request_id = request_id(&request).to_string();

    let head_only = match *request.method() {
        Method::GET => false,
        Method::HEAD => true,
        _ => {
            tracing::debug!(request_id = %request_id, method = %request.method(), "Method not proxied");
            return (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "GET, HEAD")]).into_response();
        }
    };

    // Nothing borrowed from `request` may live across the await below.
    let (site, outbound) = {
        let sites = state.sites.load_full();
        let path = request.uri().path();
        let Some(route) = sites.match_path(path) else {
            tracing::debug!(request_id = %request_id, path = %path, "No site matched");
            return StatusCode::NOT_FOUND.into_response();
        };

        let url = match route.site.outbound_url(route.remainder, request.uri().query()) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(request_id = %request_id, path = %path, error = %e, "Cannot build outbound url");
                return StatusCode::BAD_REQUEST.into_response();
            }
        };

        tracing::debug!(
            request_id = %request_id,
            site = %route.site.id(),
            url = %url,
            "Proxying request"
        );

        let outbound = OutboundRequest::new(
            url,
            request.headers(),
            &route.site,
            addr.ip(),
            &state.dispatcher.settings().forwarded_for,
        );
        (route.site, outbound)
    };

    state.dispatcher.dispatch(site, outbound, head_only).await
}
