//! Response header filtering.

use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_LANGUAGE, CONTENT_LENGTH, CONTENT_TYPE, DATE,
    ETAG, EXPIRES, LAST_MODIFIED, VARY, VIA,
};

/// Origin response headers copied to the client. Everything else is dropped.
pub const RELAYED_RESPONSE_HEADERS: [HeaderName; 8] = [
    CONTENT_TYPE,
    CONTENT_LANGUAGE,
    CONTENT_LENGTH,
    VARY,
    EXPIRES,
    ETAG,
    DATE,
    LAST_MODIFIED,
];

/// Copy allow-listed headers and add `Via`.
///
/// `Content-Length` is dropped when the body is rewritten.
pub fn filter_response_headers(upstream: &HeaderMap, rewriting: bool, via: &HeaderValue) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in &RELAYED_RESPONSE_HEADERS {
        if rewriting && name == CONTENT_LENGTH {
            continue;
        }
        for value in upstream.get_all(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers.insert(VIA, via.clone());
    headers
}
