//! Body relay: byte-for-byte copy or line-by-line rewrite.

use std::borrow::Cow;
use std::io;

use axum::body::Bytes;
use axum::http::header::{HeaderMap, CONTENT_TYPE};
use encoding_rs::{Encoding, UTF_8};
use tokio::sync::mpsc;

use crate::error::ProxyError;
use crate::site::rewrite::Rewrites;
use crate::upstream::UpstreamResponse;

/// Sending half of a relayed response body.
pub type BodySink = mpsc::Sender<Result<Bytes, io::Error>>;

/// How the origin body reaches the client.
#[derive(Debug)]
pub enum BodyMode {
    /// Copy chunks unchanged.
    Passthrough,
    /// Decode, rewrite every line, re-encode.
    Rewrite(LineRewriter),
    /// Send no body (HEAD, 204, 304).
    Discard,
}

/// Charset declared by `Content-Type`, UTF-8 when absent or unknown.
pub fn charset(headers: &HeaderMap) -> &'static Encoding {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|content_type| {
            content_type.split(';').skip(1).find_map(|param| {
                let (key, value) = param.split_once('=')?;
                if key.trim().eq_ignore_ascii_case("charset") {
                    Encoding::for_label(value.trim().trim_matches('"').as_bytes())
                } else {
                    None
                }
            })
        })
        .unwrap_or(UTF_8)
}

/// Longest line buffered for rewriting. Longer lines are relayed unmodified.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Incremental line rewriter.
///
/// Bytes are buffered until a `\n` arrives; each complete line is decoded,
/// rewritten and re-encoded with its original terminator. A line that grows
/// past the line limit is flushed as-is up to its terminator.
#[derive(Debug)]
pub struct LineRewriter {
    encoding: &'static Encoding,
    rewrites: Rewrites,
    pending: Vec<u8>,
    max_line: usize,
    /// Inside a line that exceeded `max_line`.
    overlong: bool,
}

impl LineRewriter {
    pub fn new(encoding: &'static Encoding, rewrites: Rewrites) -> Self {
        Self {
            encoding,
            rewrites,
            pending: Vec::new(),
            max_line: MAX_LINE_BYTES,
            overlong: false,
        }
    }

    pub fn with_line_limit(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    /// Feed a chunk; returns the bytes of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut chunk = chunk;

        if self.overlong {
            match memchr_newline(chunk) {
                Some(end) => {
                    out.extend_from_slice(&chunk[..=end]);
                    chunk = &chunk[end + 1..];
                    self.overlong = false;
                }
                None => {
                    out.extend_from_slice(chunk);
                    return out;
                }
            }
        }

        // Only the new bytes can hold a terminator; `pending` never does.
        let searched = self.pending.len();
        self.pending.extend_from_slice(chunk);
        if let Some(last_newline) = self.pending[searched..].iter().rposition(|&b| b == b'\n') {
            let rest = self.pending.split_off(searched + last_newline + 1);
            let complete = std::mem::replace(&mut self.pending, rest);

            out.reserve(complete.len());
            for line in complete.split_inclusive(|&b| b == b'\n') {
                let (content, terminator) = split_terminator(line);
                self.rewrite_line(content, &mut out);
                out.extend_from_slice(terminator);
            }
        }

        if self.pending.len() > self.max_line {
            tracing::debug!(limit = self.max_line, "Line too long to rewrite, relaying unmodified");
            out.append(&mut self.pending);
            self.overlong = true;
        }
        out
    }

    /// Flush a trailing line that had no terminator.
    pub fn finish(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        self.overlong = false;
        if !self.pending.is_empty() {
            let last = std::mem::take(&mut self.pending);
            self.rewrite_line(&last, &mut out);
        }
        out
    }

    fn rewrite_line(&self, line: &[u8], out: &mut Vec<u8>) {
        let (text, had_errors) = self.encoding.decode_without_bom_handling(line);
        match self.rewrites.apply(&text) {
            // Untouched lines keep their exact bytes.
            Cow::Borrowed(_) => out.extend_from_slice(line),
            // Re-encoding would replace the undecodable bytes with U+FFFD.
            Cow::Owned(_) if had_errors => {
                tracing::debug!(charset = self.encoding.name(), "Line does not decode cleanly, relaying unmodified");
                out.extend_from_slice(line);
            }
            Cow::Owned(rewritten) => {
                let (encoded, _, _) = self.encoding.encode(&rewritten);
                out.extend_from_slice(&encoded);
            }
        }
    }
}

fn memchr_newline(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == b'\n')
}

fn split_terminator(line: &[u8]) -> (&[u8], &[u8]) {
    let cut = if line.ends_with(b"\r\n") {
        line.len() - 2
    } else if line.ends_with(b"\n") {
        line.len() - 1
    } else {
        line.len()
    };
    line.split_at(cut)
}

/// Stream the origin body into `sink` according to `mode`.
///
/// Returns the number of bytes written. The origin response is dropped on
/// every path, which releases its connection.
pub async fn relay_body(
    mut upstream: UpstreamResponse,
    mode: BodyMode,
    sink: &BodySink,
) -> Result<u64, ProxyError> {
    let mut rewriter = match mode {
        BodyMode::Discard => return Ok(0),
        BodyMode::Passthrough => None,
        BodyMode::Rewrite(rewriter) => Some(rewriter),
    };

    let mut written = 0u64;
    loop {
        let chunk = match upstream.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                // Abort the downstream body rather than let a truncated one look complete.
                let _ = sink
                    .send(Err(io::Error::other("upstream body interrupted")))
                    .await;
                return Err(e);
            }
        };

        let out = match rewriter.as_mut() {
            Some(rewriter) => Bytes::from(rewriter.push(&chunk)),
            None => chunk,
        };
        written += send(sink, out).await?;
    }

    if let Some(mut rewriter) = rewriter {
        written += send(sink, Bytes::from(rewriter.finish())).await?;
    }
    Ok(written)
}

async fn send(sink: &BodySink, bytes: Bytes) -> Result<u64, ProxyError> {
    if bytes.is_empty() {
        return Ok(0);
    }
    let len = bytes.len() as u64;
    sink.send(Ok(bytes)).await.map_err(|_| ProxyError::ClientGone)?;
    Ok(len)
}
