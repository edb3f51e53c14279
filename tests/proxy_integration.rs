//! End-to-end tests: real proxy, mock origins, HTTP client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_LENGTH, LOCATION, SET_COOKIE, VIA};
use reqwest::StatusCode;
use site_proxy::config::{ProxyConfig, RewriteRuleConfig};

mod common;
use common::{client, raw_get, site, start_origin, start_proxy, Reply};

fn html_rule() -> RewriteRuleConfig {
    RewriteRuleConfig {
        path_pattern: r".*\.html".into(),
        body_pattern: "http://old".into(),
        replacement: "http://new".into(),
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn forwards_path_query_and_allow_listed_headers() {
    let origin = start_origin(|_| Reply::ok("hello").header("Content-Type", "text/plain")).await;
    let mut config = ProxyConfig::default();
    config.sites.push(site("Site1", "/site1", &origin.url("/foo")));
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client()
        .get(format!("http://{proxy}/site1/bar/baz?x=1&y=2"))
        .header("User-Agent", "integration-test")
        .header("Accept-Language", "en")
        .header("Accept-Encoding", "gzip")
        .header("Authorization", "Bearer secret")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get(VIA).unwrap(), "1.1 site-proxy");
    assert_eq!(res.headers().get("content-type").unwrap(), "text/plain");
    assert_eq!(res.text().await.unwrap(), "hello");

    let seen = origin.last_request();
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.target, "/foo/bar/baz?x=1&y=2");
    assert_eq!(seen.header("user-agent"), Some("integration-test"));
    assert_eq!(seen.header("accept-language"), Some("en"));
    assert_eq!(seen.header("x-forwarded-for"), Some("127.0.0.1"));
    assert_eq!(seen.header("accept-encoding"), None);
    assert_eq!(seen.header("authorization"), None);
}

#[tokio::test]
async fn unknown_prefix_and_disabled_site_are_not_found() {
    let origin = start_origin(|_| Reply::ok("should not be reached")).await;
    let mut config = ProxyConfig::default();
    let mut disabled = site("Site1", "/site1", &origin.url("/"));
    disabled.enabled = false;
    config.sites.push(disabled);
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client().get(format!("http://{proxy}/site1/page")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client().get(format!("http://{proxy}/elsewhere")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    assert_eq!(origin.hits(), 0);
}

#[tokio::test]
async fn longest_prefix_wins_on_segment_boundary() {
    let root = start_origin(|_| Reply::ok("root")).await;
    let nested = start_origin(|_| Reply::ok("nested")).await;
    let mut config = ProxyConfig::default();
    config.sites.push(site("Root", "/", &root.url("/")));
    config.sites.push(site("Nested", "/a", &nested.url("/")));
    let (proxy, _shutdown) = start_proxy(config).await;

    let body = |path: &'static str| {
        let url = format!("http://{proxy}{path}");
        async move { client().get(url).send().await.unwrap().text().await.unwrap() }
    };

    assert_eq!(body("/a/x").await, "nested");
    assert_eq!(body("/a").await, "nested");
    assert_eq!(body("/ab").await, "root");
    assert_eq!(body("/").await, "root");
    assert_eq!(root.last_request().target, "/");
    assert_eq!(nested.requests()[0].target, "/x");
}

#[tokio::test]
async fn dot_segments_stay_inside_the_site() {
    let origin = start_origin(|_| Reply::ok("tenant")).await;
    let mut config = ProxyConfig::default();
    config.sites.push(site("Site1", "/site1", &origin.url("/tenantA")));
    let (proxy, _shutdown) = start_proxy(config).await;

    assert_eq!(raw_get(proxy, "/site1/%2e%2e/tenantB/secret").await, 400);
    assert_eq!(raw_get(proxy, "/site1/../tenantB/secret").await, 400);
    assert_eq!(origin.hits(), 0);

    assert_eq!(raw_get(proxy, "/site1/a/../b").await, 200);
    assert_eq!(origin.last_request().target, "/tenantA/b");
}

#[tokio::test]
async fn other_methods_are_refused() {
    let origin = start_origin(|_| Reply::ok("x")).await;
    let mut config = ProxyConfig::default();
    config.sites.push(site("Site1", "/site1", &origin.url("/")));
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client()
        .post(format!("http://{proxy}/site1/form"))
        .body("a=1")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers().get("allow").unwrap(), "GET, HEAD");
    assert_eq!(origin.hits(), 0);
}

#[tokio::test]
async fn head_is_fetched_with_get_and_has_no_body() {
    let origin = start_origin(|_| Reply::ok("body bytes").header("ETag", "\"v1\"")).await;
    let mut config = ProxyConfig::default();
    config.sites.push(site("Site1", "/site1", &origin.url("/")));
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client().head(format!("http://{proxy}/site1/doc")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get("etag").unwrap(), "\"v1\"");
    assert!(res.bytes().await.unwrap().is_empty());
    assert_eq!(origin.last_request().method, "GET");
}

#[tokio::test]
async fn not_found_and_not_modified_pass_through() {
    let origin = start_origin(|request| match request.target.as_str() {
        "/missing" => Reply::status(404).body("no such page"),
        _ => Reply::status(304).header("ETag", "\"v1\""),
    })
    .await;
    let mut config = ProxyConfig::default();
    config.sites.push(site("Site1", "/site1", &origin.url("/")));
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client().get(format!("http://{proxy}/site1/missing")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "no such page");

    let res = client()
        .get(format!("http://{proxy}/site1/cached"))
        .header("If-None-Match", "\"v1\"")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(res.headers().get("etag").unwrap(), "\"v1\"");
    assert_eq!(origin.last_request().header("if-none-match"), Some("\"v1\""));
}

#[tokio::test]
async fn redirects_into_origin_are_mapped_under_prefix() {
    let origin_addr = Arc::new(std::sync::OnceLock::<String>::new());
    let remote = Arc::clone(&origin_addr);
    let origin = start_origin(move |request| {
        let base = remote.get().cloned().unwrap_or_default();
        match request.target.as_str() {
            "/foo/internal" => Reply::status(302).header("Location", &format!("{base}/foo/landing?x=1")),
            "/foo/moved" => Reply::status(301).header("Location", &format!("{base}/foobar")),
            _ => Reply::status(302).header("Location", "https://elsewhere.example/x"),
        }
    })
    .await;
    origin_addr.set(origin.url("")).unwrap();

    let mut config = ProxyConfig::default();
    config.sites.push(site("Site1", "/site1", &origin.url("/foo")));
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client().get(format!("http://{proxy}/site1/internal")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers().get(LOCATION).unwrap(), "/site1/landing?x=1");

    let res = client().get(format!("http://{proxy}/site1/moved")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        res.headers().get(LOCATION).unwrap().to_str().unwrap(),
        origin.url("/foobar")
    );

    let res = client().get(format!("http://{proxy}/site1/external")).send().await.unwrap();
    assert_eq!(res.headers().get(LOCATION).unwrap(), "https://elsewhere.example/x");
}

#[tokio::test]
async fn cookies_are_namespaced_per_site() {
    let origin = start_origin(|_| {
        Reply::ok("ok")
            .header("Set-Cookie", "session=xyz; Path=/")
            .header("Set-Cookie", "JSESSIONID=j1")
    })
    .await;
    let mut config = ProxyConfig::default();
    let mut site1 = site("Site1", "/site1", &origin.url("/"));
    site1.cookie_passthrough_names.push("JSESSIONID".into());
    config.sites.push(site1);
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client()
        .get(format!("http://{proxy}/site1/"))
        .header("Cookie", "proxySite1_session=abc; theme=dark")
        .send()
        .await
        .unwrap();

    let set_cookies: Vec<_> = res
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(set_cookies, ["proxySite1_session=xyz; Path=/", "JSESSIONID=j1"]);
    assert_eq!(origin.last_request().header("cookie"), Some("session=abc; theme=dark"));
}

#[tokio::test]
async fn matching_urls_are_rewritten_without_content_length() {
    let body = "<a href=\"http://old/x\">link</a>\r\nplain line\n";
    let origin = start_origin(move |_| Reply::ok(body).header("Content-Type", "text/html")).await;
    let mut config = ProxyConfig::default();
    let mut site1 = site("Site1", "/site1", &origin.url("/"));
    site1.rewrite_rules.push(html_rule());
    config.sites.push(site1);
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client().get(format!("http://{proxy}/site1/index.html")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(CONTENT_LENGTH).is_none());
    assert_eq!(
        res.text().await.unwrap(),
        "<a href=\"http://new/x\">link</a>\r\nplain line\n"
    );

    let res = client().get(format!("http://{proxy}/site1/style.css")).send().await.unwrap();
    assert_eq!(
        res.headers().get(CONTENT_LENGTH).unwrap().to_str().unwrap(),
        body.len().to_string()
    );
    assert_eq!(&res.bytes().await.unwrap()[..], body.as_bytes());
}

#[tokio::test]
async fn rewrite_respects_declared_charset() {
    let origin = start_origin(|_| {
        Reply::ok(&b"caf\xe9 http://old/menu\n"[..])
            .header("Content-Type", "text/html; charset=iso-8859-1")
    })
    .await;
    let mut config = ProxyConfig::default();
    let mut site1 = site("Site1", "/site1", &origin.url("/"));
    site1.rewrite_rules.push(html_rule());
    config.sites.push(site1);
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client().get(format!("http://{proxy}/site1/menu.html")).send().await.unwrap();
    assert_eq!(&res.bytes().await.unwrap()[..], b"caf\xe9 http://new/menu\n");
}

#[tokio::test]
async fn saturated_pool_answers_service_unavailable() {
    let origin = start_origin(|_| Reply::ok("slow").after(Duration::from_secs(3))).await;
    let mut config = ProxyConfig::default();
    config.pool.workers = 1;
    config.pool.backlog = 1;
    config.sites.push(site("Site1", "/site1", &origin.url("/")));
    let (proxy, _shutdown) = start_proxy(config).await;

    let completed = Arc::new(AtomicUsize::new(0));
    let mut in_flight = Vec::new();
    for _ in 0..2 {
        let completed = Arc::clone(&completed);
        let url = format!("http://{proxy}/site1/slow");
        in_flight.push(tokio::spawn(async move {
            let res = client().get(url).send().await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            completed.fetch_add(1, Ordering::SeqCst);
        }));
    }

    // One running on the worker, one waiting in the backlog.
    wait_for(|| origin.hits() == 1).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    let res = client().get(format!("http://{proxy}/site1/slow")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(completed.load(Ordering::SeqCst), 0);

    for handle in in_flight {
        handle.await.unwrap();
    }
    assert_eq!(origin.hits(), 2);
}

#[tokio::test]
async fn slow_origin_hits_the_deadline() {
    let origin = start_origin(|_| Reply::ok("too late").after(Duration::from_secs(5))).await;
    let mut config = ProxyConfig::default();
    config.timeouts.suspend_secs = 1;
    config.sites.push(site("Site1", "/site1", &origin.url("/")));
    let (proxy, _shutdown) = start_proxy(config).await;

    let start = Instant::now();
    let res = client().get(format!("http://{proxy}/site1/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn deadline_frees_the_worker_for_the_next_request() {
    let origin = start_origin(|request| {
        if request.target.ends_with("/stuck") {
            Reply::ok("never seen").after(Duration::from_secs(10))
        } else {
            Reply::ok("fresh")
        }
    })
    .await;
    let mut config = ProxyConfig::default();
    config.pool.workers = 1;
    config.pool.backlog = 0;
    config.timeouts.suspend_secs = 1;
    config.sites.push(site("Site1", "/site1", &origin.url("/")));
    let (proxy, _shutdown) = start_proxy(config).await;

    let start = Instant::now();
    let res = client().get(format!("http://{proxy}/site1/stuck")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);

    loop {
        let res = client().get(format!("http://{proxy}/site1/next")).send().await.unwrap();
        match res.status() {
            StatusCode::OK => break,
            StatusCode::SERVICE_UNAVAILABLE => tokio::time::sleep(Duration::from_millis(50)).await,
            other => panic!("unexpected status {other}"),
        }
        assert!(start.elapsed() < Duration::from_secs(5), "worker still held by the timed-out job");
    }
}

#[tokio::test]
async fn client_leaving_mid_body_frees_the_worker() {
    let origin = start_origin(|request| {
        if request.target.ends_with("/big") {
            Reply::ok(vec![b'x'; 40 * 1024]).paced(40, Duration::from_millis(250))
        } else {
            Reply::ok("small")
        }
    })
    .await;
    let mut config = ProxyConfig::default();
    config.pool.workers = 1;
    config.pool.backlog = 0;
    config.timeouts.suspend_secs = 30;
    config.sites.push(site("Site1", "/site1", &origin.url("/")));
    let (proxy, _shutdown) = start_proxy(config).await;

    let mut res = client().get(format!("http://{proxy}/site1/big")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.chunk().await.unwrap().is_some());
    drop(res);

    let dropped = Instant::now();
    loop {
        let res = client().get(format!("http://{proxy}/site1/small")).send().await.unwrap();
        match res.status() {
            StatusCode::OK => break,
            StatusCode::SERVICE_UNAVAILABLE => tokio::time::sleep(Duration::from_millis(50)).await,
            other => panic!("unexpected status {other}"),
        }
        assert!(dropped.elapsed() < Duration::from_secs(5), "worker kept relaying to a closed client");
    }
}

#[tokio::test]
async fn deadline_cuts_a_slow_body_short() {
    let full = vec![b'y'; 20 * 1024];
    let body = full.clone();
    let origin = start_origin(move |_| Reply::ok(body.clone()).paced(20, Duration::from_millis(250))).await;
    let mut config = ProxyConfig::default();
    config.timeouts.suspend_secs = 1;
    config.sites.push(site("Site1", "/site1", &origin.url("/")));
    let (proxy, _shutdown) = start_proxy(config).await;

    let start = Instant::now();
    let res = client().get(format!("http://{proxy}/site1/slow-body")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    if let Ok(bytes) = res.bytes().await {
        assert!(bytes.len() < full.len());
    }
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn unreachable_origin_is_bad_gateway() {
    let dead = common::closed_port().await;
    let mut config = ProxyConfig::default();
    config.sites.push(site("Site1", "/site1", &format!("http://{dead}")));
    let (proxy, _shutdown) = start_proxy(config).await;

    let res = client().get(format!("http://{proxy}/site1/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn shutdown_stops_the_listener() {
    let origin = start_origin(|_| Reply::ok("up")).await;
    let mut config = ProxyConfig::default();
    config.sites.push(site("Site1", "/site1", &origin.url("/")));
    let (proxy, shutdown) = start_proxy(config).await;

    let res = client().get(format!("http://{proxy}/site1/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    shutdown.trigger();
    let mut refused = false;
    for _ in 0..100 {
        if client().get(format!("http://{proxy}/site1/")).send().await.is_err() {
            refused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(refused, "proxy kept accepting after shutdown");
}
