//! Outbound request construction.

use std::net::IpAddr;

use axum::http::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_CHARSET, ACCEPT_LANGUAGE, COOKIE,
    IF_MODIFIED_SINCE, IF_NONE_MATCH, REFERER, USER_AGENT,
};
use url::Url;

use crate::site::cookies;
use crate::site::Site;

/// Inbound headers copied to the origin. Everything else is dropped.
pub const FORWARDED_REQUEST_HEADERS: [HeaderName; 7] = [
    ACCEPT,
    ACCEPT_CHARSET,
    ACCEPT_LANGUAGE,
    IF_NONE_MATCH,
    IF_MODIFIED_SINCE,
    REFERER,
    USER_AGENT,
];

/// A GET request ready to be sent to the origin.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: Url,
    pub headers: HeaderMap,
}

impl OutboundRequest {
    pub fn new(
        url: Url,
        inbound: &HeaderMap,
        site: &Site,
        client_ip: IpAddr,
        forwarded_for: &HeaderName,
    ) -> Self {
        let mut headers = HeaderMap::new();
        for name in &FORWARDED_REQUEST_HEADERS {
            for value in inbound.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        let forwarded_cookies = cookies::deproxy(
            inbound.get_all(COOKIE).iter().filter_map(|v| v.to_str().ok()),
            site.cookie_namespace(),
            site.remote_host(),
            site.remote_path(),
        );
        if let Some(cookie) = cookies::cookie_header(&forwarded_cookies) {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    headers.insert(COOKIE, value);
                }
                Err(e) => tracing::debug!(error = %e, "Dropping unencodable cookie header"),
            }
        }

        if let Ok(value) = HeaderValue::from_str(&client_ip.to_string()) {
            headers.insert(forwarded_for.clone(), value);
        }

        Self { url, headers }
    }
}
