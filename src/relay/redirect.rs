//! Redirect target rewriting.
//!
//! Redirects into the origin's URL space are mapped back under the site's
//! local prefix so the client never leaves the proxy. Anything else is an
//! external redirect and is left alone.

use std::borrow::Cow;

use axum::http::StatusCode;

use crate::site::Site;

/// Statuses whose `Location` is rewritten.
pub fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Map `location` from the origin's URL space into the proxy's.
pub fn rewrite_location<'a>(location: &'a str, site: &Site) -> Cow<'a, str> {
    let Some(rest) = location.strip_prefix(site.remote_url()) else {
        return Cow::Borrowed(location);
    };
    if !(rest.is_empty() || rest.starts_with(['/', '?', '#'])) {
        // Same textual prefix but a different path segment, e.g. /foo vs /foobar.
        return Cow::Borrowed(location);
    }

    let mut local = String::with_capacity(site.local_prefix().len() + rest.len() + 1);
    local.push_str(site.local_prefix());
    if local.is_empty() && !rest.starts_with('/') {
        local.push('/');
    }
    local.push_str(rest);
    Cow::Owned(local)
}
