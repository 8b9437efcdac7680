// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! Minimal HTTP/1.1 request/response framing over a [`ByteStream`].
//!
//! One flush is one `POST /write?precision=n` carrying the committed rows.
//! The response decides the outcome: 2xx succeeds, 401/403 is an auth
//! failure, other 4xx is a server-confirmed data defect (never retried),
//! 5xx is a transient server fault (retryable). Keep-alive is honored
//! until the server says otherwise.
//!
//! Header and body sizes are capped so a misbehaving peer cannot balloon
//! memory.

use std::io::{Read, Write};
use std::net::Shutdown;
use std::time::Duration;

use crate::config::SenderConfig;
use crate::error::{conn_err, Error, Result};
use crate::transport::BoxedByteStream;

/// Ingestion endpoint; the designated timestamp is in nanoseconds.
const INGESTION_PATH: &str = "/write?precision=n";

/// Cap on response header block size.
const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Cap on response body size.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Cap on the server message embedded in an error.
const MAX_MESSAGE_LEN: usize = 512;

/// HTTP request/response channel.
pub(crate) struct HttpTransport {
    stream: Option<BoxedByteStream>,
    host: String,
    port: u16,
    auth_header: Option<String>,
    request_timeout: Duration,
}

impl HttpTransport {
    pub(crate) fn new(stream: BoxedByteStream, config: &SenderConfig) -> Self {
        Self {
            stream: Some(stream),
            host: config.host.clone(),
            port: config.port,
            auth_header: config.auth.http_header(),
            request_timeout: config.request_timeout,
        }
    }

    /// Whether the keep-alive connection is still open.
    pub(crate) fn is_healthy(&self) -> bool {
        self.stream.is_some()
    }

    pub(crate) fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Run one request/response cycle for `bytes`.
    pub(crate) fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let head = request_head(
            &self.host,
            self.port,
            self.auth_header.as_deref(),
            bytes.len(),
        );
        let result = match self.stream.as_mut() {
            Some(stream) => request_cycle(stream, self.request_timeout, &head, bytes),
            None => Err(Error::Connection("transport closed".into())),
        };
        match result {
            Ok(response) => {
                if response.wants_close() {
                    log::debug!("server closed the keep-alive connection");
                    self.close();
                }
                response.into_result()
            }
            Err(e) => {
                // The connection state is unknown mid-cycle; drop it.
                self.close();
                Err(e)
            }
        }
    }
}

/// Render the request head (everything before the body).
fn request_head(host: &str, port: u16, auth: Option<&str>, body_len: usize) -> String {
    let mut head = format!(
        "POST {} HTTP/1.1\r\n\
         Host: {}:{}\r\n\
         User-Agent: linesink/{}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n",
        INGESTION_PATH,
        host,
        port,
        env!("CARGO_PKG_VERSION"),
        body_len
    );
    if let Some(auth) = auth {
        head.push_str("Authorization: ");
        head.push_str(auth);
        head.push_str("\r\n");
    }
    head.push_str("\r\n");
    head
}

/// Arm the per-request timeouts, write the request, read the response.
fn request_cycle(
    stream: &mut BoxedByteStream,
    timeout: Duration,
    head: &str,
    body: &[u8],
) -> Result<HttpResponse> {
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|()| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| conn_err("arming request timeout", &e))?;
    perform_request(stream, head, body)
}

/// Write the request and read the response.
fn perform_request<S: Read + Write + ?Sized>(
    stream: &mut S,
    head: &str,
    body: &[u8],
) -> Result<HttpResponse> {
    stream
        .write_all(head.as_bytes())
        .map_err(|e| conn_err("writing request", &e))?;
    stream
        .write_all(body)
        .and_then(|()| stream.flush())
        .map_err(|e| conn_err("writing request", &e))?;
    read_response(stream)
}

// ============================================================================
// Response
// ============================================================================

/// A parsed HTTP response.
#[derive(Debug)]
pub(crate) struct HttpResponse {
    pub(crate) status: u16,
    headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
}

impl HttpResponse {
    /// Case-insensitive header lookup.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the server asked to close the connection.
    fn wants_close(&self) -> bool {
        self.header("connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
    }

    /// Extract a human-readable server message from the body.
    fn message(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        let text = text.trim();
        // Ingestion servers answer errors with a JSON object; surface its
        // message field when present.
        if text.starts_with('{') {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
                if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
                    return truncate(msg);
                }
                if let Some(msg) = value.get("error").and_then(|m| m.as_str()) {
                    return truncate(msg);
                }
            }
        }
        truncate(text)
    }

    /// Map the status class onto the error taxonomy.
    fn into_result(self) -> Result<()> {
        match self.status {
            200..=299 => Ok(()),
            401 | 403 => Err(Error::Auth(format!(
                "server returned HTTP {}: {}",
                self.status,
                self.message()
            ))),
            500..=599 => Err(Error::Connection(format!(
                "server fault (HTTP {}): {}",
                self.status,
                self.message()
            ))),
            status => Err(Error::Rejected {
                status,
                message: self.message(),
            }),
        }
    }
}

fn truncate(s: &str) -> String {
    if s.len() <= MAX_MESSAGE_LEN {
        s.to_string()
    } else {
        let mut end = MAX_MESSAGE_LEN;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// Read and parse one response from `stream`.
fn read_response<S: Read + ?Sized>(stream: &mut S) -> Result<HttpResponse> {
    // Accumulate until the blank line ending the header block.
    let mut buf = Vec::with_capacity(1024);
    let header_end = loop {
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(Error::Connection(format!(
                "response headers exceed {} bytes",
                MAX_HEADER_BYTES
            )));
        }
        let mut chunk = [0u8; 4096];
        let n = stream
            .read(&mut chunk)
            .map_err(|e| conn_err("reading response", &e))?;
        if n == 0 {
            return Err(Error::Connection(
                "connection closed before response headers".into(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = std::str::from_utf8(&buf[..header_end])
        .map_err(|_| Error::Connection("response headers are not UTF-8".into()))?;
    let mut lines = head.split("\r\n");
    let status_line = lines
        .next()
        .ok_or_else(|| Error::Connection("empty response".into()))?;
    let (version, status) = parse_status_line(status_line)?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::Connection(format!("malformed header line {:?}", line)))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let mut response = HttpResponse {
        status,
        headers,
        body: buf[header_end..].to_vec(),
    };
    read_body(stream, &mut response, version)?;
    Ok(response)
}

/// Parse `HTTP/1.x <status> <reason>`.
fn parse_status_line(line: &str) -> Result<(u8, u16)> {
    let mut parts = line.splitn(3, ' ');
    let version = match parts.next() {
        Some("HTTP/1.1") => 1u8,
        Some("HTTP/1.0") => 0u8,
        other => {
            return Err(Error::Connection(format!(
                "unsupported HTTP version in status line {:?}",
                other.unwrap_or("")
            )));
        }
    };
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| Error::Connection(format!("malformed status line {:?}", line)))?;
    Ok((version, status))
}

/// Complete `response.body` according to the framing headers.
fn read_body<S: Read + ?Sized>(
    stream: &mut S,
    response: &mut HttpResponse,
    version: u8,
) -> Result<()> {
    if response
        .header("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    {
        let initial = std::mem::take(&mut response.body);
        response.body = decode_chunked(stream, initial)?;
        return Ok(());
    }

    if let Some(len) = response.header("content-length") {
        let len: usize = len
            .parse()
            .map_err(|_| Error::Connection(format!("invalid Content-Length {:?}", len)))?;
        if len > MAX_BODY_BYTES {
            return Err(Error::Connection(format!(
                "response body of {} bytes exceeds the {} byte cap",
                len, MAX_BODY_BYTES
            )));
        }
        while response.body.len() < len {
            let mut chunk = [0u8; 4096];
            let want = (len - response.body.len()).min(chunk.len());
            let n = stream
                .read(&mut chunk[..want])
                .map_err(|e| conn_err("reading response body", &e))?;
            if n == 0 {
                return Err(Error::Connection(
                    "connection closed mid response body".into(),
                ));
            }
            response.body.extend_from_slice(&chunk[..n]);
        }
        response.body.truncate(len);
        return Ok(());
    }

    // No framing header: HTTP/1.0 and close-delimited responses run to EOF;
    // a keep-alive 1.1 response without one has no body (e.g. 204).
    if version == 0 || response.wants_close() {
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream
                .read(&mut chunk)
                .map_err(|e| conn_err("reading response body", &e))?;
            if n == 0 {
                break;
            }
            response.body.extend_from_slice(&chunk[..n]);
            if response.body.len() > MAX_BODY_BYTES {
                return Err(Error::Connection(format!(
                    "response body exceeds the {} byte cap",
                    MAX_BODY_BYTES
                )));
            }
        }
    }
    Ok(())
}

/// Decode a chunked body. `carry` holds bytes already read past the headers.
fn decode_chunked<S: Read + ?Sized>(stream: &mut S, carry: Vec<u8>) -> Result<Vec<u8>> {
    let mut raw = carry;
    let mut pos = 0usize;
    let mut body = Vec::new();

    loop {
        let line_end = loop {
            if let Some(off) = find_subsequence(&raw[pos..], b"\r\n") {
                break pos + off;
            }
            fill(stream, &mut raw)?;
        };
        let size_text = std::str::from_utf8(&raw[pos..line_end])
            .map_err(|_| Error::Connection("malformed chunk size".into()))?;
        let size_text = size_text.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| Error::Connection(format!("malformed chunk size {:?}", size_text)))?;
        pos = line_end + 2;

        if size == 0 {
            // Trailer section ends with an empty line; we do not surface
            // trailers, just drain up to it.
            loop {
                if let Some(off) = find_subsequence(&raw[pos..], b"\r\n") {
                    if off == 0 {
                        return Ok(body);
                    }
                    pos += off + 2;
                } else {
                    fill(stream, &mut raw)?;
                }
            }
        }

        if body.len() + size > MAX_BODY_BYTES {
            return Err(Error::Connection(format!(
                "chunked body exceeds the {} byte cap",
                MAX_BODY_BYTES
            )));
        }
        while raw.len() < pos + size + 2 {
            fill(stream, &mut raw)?;
        }
        body.extend_from_slice(&raw[pos..pos + size]);
        pos += size + 2; // skip the chunk's trailing CRLF
    }
}

/// Read more bytes into `raw`, failing on EOF.
fn fill<S: Read + ?Sized>(stream: &mut S, raw: &mut Vec<u8>) -> Result<()> {
    let mut chunk = [0u8; 4096];
    let n = stream
        .read(&mut chunk)
        .map_err(|e| conn_err("reading response body", &e))?;
    if n == 0 {
        return Err(Error::Connection(
            "connection closed mid chunked body".into(),
        ));
    }
    raw.extend_from_slice(&chunk[..n]);
    Ok(())
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
