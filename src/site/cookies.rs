//! Cookie namespace translation.
//!
//! Several origins share the proxy host's single cookie jar. Origin cookies
//! are renamed to `proxy<id>_<name>` on the way to the browser and the prefix
//! is stripped again on the way back, so two sites never overwrite each
//! other's cookies.
//!
//! ```text
//! browser ── Cookie: proxySite1_session=abc ──▶ deproxy ── Cookie: session=abc ──▶ origin
//! browser ◀── Set-Cookie: proxySite1_session=abc ── proxy ◀── Set-Cookie: session=abc ── origin
//! ```

use std::collections::HashSet;

use cookie::Cookie;

/// Separator between the namespace prefix and the origin cookie name.
pub const NAMESPACE_SEPARATOR: char = '_';

/// A cookie as forwarded to the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePair {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
}

/// Per-site cookie name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieNamespace {
    prefix: String,
}

impl CookieNamespace {
    pub fn for_site(site_id: &str) -> Self {
        Self {
            prefix: format!("proxy{site_id}"),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Origin name of a namespaced cookie, or `None` if it does not bear the prefix.
    pub fn strip<'a>(&self, name: &'a str) -> Option<&'a str> {
        name.strip_prefix(self.prefix.as_str())?
            .strip_prefix(NAMESPACE_SEPARATOR)
            .filter(|rest| !rest.is_empty())
    }

    pub fn qualify(&self, name: &str) -> String {
        format!("{}{}{}", self.prefix, NAMESPACE_SEPARATOR, name)
    }
}

/// Translate browser `Cookie` headers into the cookies sent to the origin.
///
/// Namespaced cookies lose their prefix; everything else is forwarded as-is.
/// All forwarded cookies are scoped to the origin host and `remote_path`.
pub fn deproxy<'a, I>(
    cookie_headers: I,
    namespace: &CookieNamespace,
    remote_host: &str,
    remote_path: &str,
) -> Vec<CookiePair>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut forwarded = Vec::new();
    for header in cookie_headers {
        for parsed in Cookie::split_parse(header) {
            let cookie = match parsed {
                Ok(cookie) => cookie,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed request cookie");
                    continue;
                }
            };
            let name = namespace.strip(cookie.name()).unwrap_or(cookie.name());
            forwarded.push(CookiePair {
                name: name.to_string(),
                value: cookie.value().to_string(),
                domain: Some(remote_host.to_string()),
                path: Some(remote_path.to_string()),
            });
        }
    }
    forwarded
}

/// Render forwarded cookies as a single `Cookie` request header value.
pub fn cookie_header(cookies: &[CookiePair]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    let rendered: Vec<String> = cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect();
    Some(rendered.join("; "))
}

/// Translate origin `Set-Cookie` values into the ones sent to the browser.
///
/// Passthrough names are forwarded verbatim. Every other cookie is renamed
/// into the site namespace by replacing the name in the origin's header text,
/// so the value and every attribute (including ones this proxy does not
/// know) stay byte for byte. None are added.
pub fn proxy<'a, I>(
    set_cookie_headers: I,
    passthrough: &HashSet<String>,
    namespace: &CookieNamespace,
) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = Vec::new();
    for raw in set_cookie_headers {
        let cookie = match Cookie::parse(raw) {
            Ok(cookie) => cookie,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed Set-Cookie from origin");
                continue;
            }
        };
        if passthrough.contains(cookie.name()) {
            out.push(raw.to_string());
            continue;
        }
        let renamed = namespace.qualify(cookie.name());
        match raw.trim_start().strip_prefix(cookie.name()) {
            Some(rest) => out.push(format!("{renamed}{rest}")),
            None => {
                let mut cookie = cookie;
                cookie.set_name(renamed);
                out.push(cookie.to_string());
            }
        }
    }
    out
}
