//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use site_proxy::config::{ProxyConfig, SiteConfig};
use site_proxy::http::HttpServer;
use site_proxy::lifecycle::Shutdown;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// A request as the origin saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// What the mock origin answers.
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    delay: Option<Duration>,
    /// Body split into this many writes, `interval` apart.
    pace: Option<(usize, Duration)>,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            delay: None,
            pace: None,
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::status(200).body(body)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Wait before sending anything.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Send the body in `pieces` writes, `interval` apart.
    pub fn paced(mut self, pieces: usize, interval: Duration) -> Self {
        self.pace = Some((pieces.max(1), interval));
        self
    }

    fn encode_head(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} Mock\r\n", self.status);
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        if self.status != 304 && self.status != 204 {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        head.push_str("Connection: close\r\n\r\n");
        head.into_bytes()
    }

    async fn write_to(&self, socket: &mut TcpStream) -> std::io::Result<()> {
        socket.write_all(&self.encode_head()).await?;
        match self.pace {
            None => socket.write_all(&self.body).await?,
            Some((pieces, interval)) => {
                let size = self.body.len().div_ceil(pieces).max(1);
                for piece in self.body.chunks(size) {
                    socket.write_all(piece).await?;
                    socket.flush().await?;
                    tokio::time::sleep(interval).await;
                }
            }
        }
        Ok(())
    }
}

/// A programmable origin server on an ephemeral port.
pub struct MockOrigin {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    hits: Arc<AtomicUsize>,
}

impl MockOrigin {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests().pop().expect("origin saw no request")
    }
}

/// Start an origin that answers every request with `respond(request)`.
pub async fn start_origin<F>(respond: F) -> MockOrigin
where
    F: Fn(&RecordedRequest) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let hits = Arc::new(AtomicUsize::new(0));
    let respond = Arc::new(respond);

    {
        let requests = Arc::clone(&requests);
        let hits = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let requests = Arc::clone(&requests);
                let hits = Arc::clone(&hits);
                let respond = Arc::clone(&respond);
                tokio::spawn(async move {
                    serve_one(socket, &*respond, &requests, &hits).await;
                });
            }
        });
    }

    MockOrigin {
        addr,
        requests,
        hits,
    }
}

async fn serve_one<F>(
    mut socket: TcpStream,
    respond: &F,
    requests: &Mutex<Vec<RecordedRequest>>,
    hits: &AtomicUsize,
) where
    F: Fn(&RecordedRequest) -> Reply,
{
    let Some(request) = read_request_head(&mut socket).await else {
        return;
    };
    hits.fetch_add(1, Ordering::SeqCst);
    let reply = respond(&request);
    requests.lock().unwrap().push(request);

    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }
    if reply.write_to(&mut socket).await.is_ok() {
        let _ = socket.shutdown().await;
    }
}

async fn read_request_head(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    Some(RecordedRequest {
        method,
        target,
        headers,
    })
}

/// Send `GET target` byte for byte, bypassing client-side path normalisation.
/// Returns the response status.
pub async fn raw_get(addr: SocketAddr, target: &str) -> u16 {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {target} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    socket.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    socket.read_to_end(&mut response).await.unwrap();
    let text = String::from_utf8_lossy(&response);
    text.split(' ')
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("malformed status line")
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn site(id: &str, local_prefix: &str, remote_url: &str) -> SiteConfig {
    SiteConfig {
        id: id.to_string(),
        local_prefix: local_prefix.to_string(),
        remote_url: remote_url.to_string(),
        enabled: true,
        cookie_passthrough_names: Vec::new(),
        rewrite_rules: Vec::new(),
    }
}

/// Start a proxy on an ephemeral port. Keep the `Shutdown` alive for the test.
pub async fn start_proxy(mut config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();

    let shutdown = Shutdown::new();
    let (_tx, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).expect("proxy config rejected");
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    (addr, shutdown)
}

/// Client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
