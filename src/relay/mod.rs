//! Response relay subsystem.
//!
//! # Data Flow
//! ```text
//! UpstreamResponse (status, headers, body)
//!     → headers.rs (allow-list, drop Content-Length when rewriting, add Via)
//!     → redirect.rs (map Location back under the local prefix)
//!     → site::cookies (namespace Set-Cookie)
//!     → body.rs (byte copy, or decode → rewrite lines → encode)
//!     → client
//! ```
//!
//! # Design Decisions
//! - 200/304/404 are routine; other statuses pass through with a warning
//! - No buffering beyond one line when rewriting, one chunk otherwise
//! - The origin response is owned by the relay and dropped on every path

pub mod body;
pub mod headers;
pub mod redirect;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, LOCATION, SET_COOKIE};
use axum::http::StatusCode;

use crate::site::cookies;
use crate::site::rewrite::Rewrites;
use crate::site::Site;

pub use body::{relay_body, BodyMode, BodySink, LineRewriter};
pub use headers::filter_response_headers;
pub use redirect::rewrite_location;

/// Fixed per-process relay settings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// `Via` value added to every response.
    pub via: HeaderValue,
    /// Header carrying the client address to the origin.
    pub forwarded_for: HeaderName,
}

/// Build the client-facing headers for an origin response.
pub fn response_headers(
    site: &Site,
    url: &str,
    status: StatusCode,
    upstream: &HeaderMap,
    rewriting: bool,
    via: &HeaderValue,
) -> HeaderMap {
    let mut headers = filter_response_headers(upstream, rewriting, via);

    match status.as_u16() {
        200 | 301 | 302 | 304 | 404 => {}
        other => {
            tracing::warn!(site = %site.id(), url = %url, status = other, "Unexpected upstream status");
        }
    }

    if redirect::is_redirect(status) {
        if let Some(location) = upstream.get(LOCATION).and_then(|v| v.to_str().ok()) {
            let rewritten = rewrite_location(location, site);
            match HeaderValue::from_str(&rewritten) {
                Ok(value) => {
                    tracing::debug!(from = %location, to = %rewritten, "Redirect rewritten");
                    headers.insert(LOCATION, value);
                }
                Err(e) => tracing::warn!(error = %e, "Rewritten Location is not a valid header"),
            }
        }
    }

    let set_cookies = cookies::proxy(
        upstream.get_all(SET_COOKIE).iter().filter_map(|v| v.to_str().ok()),
        site.passthrough_names(),
        site.cookie_namespace(),
    );
    for cookie in set_cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => tracing::debug!(error = %e, "Dropping unencodable Set-Cookie"),
        }
    }

    headers
}

/// Decide how the body is relayed.
pub fn body_mode(head_only: bool, status: StatusCode, upstream: &HeaderMap, rewrites: Rewrites) -> BodyMode {
    if head_only || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return BodyMode::Discard;
    }
    if rewrites.is_empty() {
        return BodyMode::Passthrough;
    }
    let encoding = body::charset(upstream);
    if !encoding.is_ascii_compatible() {
        tracing::debug!(charset = encoding.name(), "Charset cannot be split into lines, relaying unmodified");
        return BodyMode::Passthrough;
    }
    BodyMode::Rewrite(LineRewriter::new(encoding, rewrites))
}
