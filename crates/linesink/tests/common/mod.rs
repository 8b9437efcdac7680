// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! Shared fixtures for the integration tests: a reference line-protocol
//! parser and in-process mock ingestion servers (TCP and HTTP).

#![allow(dead_code)] // not every test file uses every fixture

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ============================================================================
// Reference line-protocol parser
// ============================================================================

/// A field value decoded by the reference parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    TimestampMicros(i64),
}

/// One decoded row.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub table: String,
    pub symbols: Vec<(String, String)>,
    pub fields: Vec<(String, ParsedValue)>,
    pub timestamp: Option<i64>,
}

/// Decode a whole buffer of `\n`-terminated rows.
pub fn parse_lines(bytes: &[u8]) -> Vec<ParsedRow> {
    let text = std::str::from_utf8(bytes).expect("wire bytes are UTF-8");
    assert!(
        text.is_empty() || text.ends_with('\n'),
        "committed bytes must end with a row terminator"
    );
    text.split_terminator('\n').map(parse_line).collect()
}

fn parse_line(line: &str) -> ParsedRow {
    let mut cursor = Cursor {
        bytes: line.as_bytes(),
        pos: 0,
    };

    let table = cursor.unquoted_token(&[b',', b' ']);
    let mut symbols = Vec::new();
    while cursor.peek() == Some(b',') {
        cursor.pos += 1;
        let name = cursor.unquoted_token(&[b'=']);
        cursor.pos += 1;
        let value = cursor.unquoted_token(&[b',', b' ']);
        symbols.push((name, value));
    }

    assert_eq!(cursor.peek(), Some(b' '), "fields section expected");
    cursor.pos += 1;

    let mut fields = Vec::new();
    loop {
        let name = cursor.unquoted_token(&[b'=']);
        cursor.pos += 1;
        let value = if cursor.peek() == Some(b'"') {
            cursor.quoted_string()
        } else {
            classify_scalar(&cursor.raw_token(&[b',', b' ']))
        };
        fields.push((name, value));
        match cursor.peek() {
            Some(b',') => cursor.pos += 1,
            _ => break,
        }
    }

    let timestamp = if cursor.peek() == Some(b' ') {
        cursor.pos += 1;
        let token = cursor.raw_token(&[]);
        Some(token.parse().expect("timestamp is an integer"))
    } else {
        None
    };
    assert_eq!(cursor.peek(), None, "trailing bytes after row");

    ParsedRow {
        table,
        symbols,
        fields,
        timestamp,
    }
}

fn classify_scalar(token: &str) -> ParsedValue {
    match token {
        "true" | "t" | "T" => return ParsedValue::Bool(true),
        "false" | "f" | "F" => return ParsedValue::Bool(false),
        _ => {}
    }
    if let Some(num) = token.strip_suffix('i') {
        return ParsedValue::Int(num.parse().expect("integer field"));
    }
    if let Some(num) = token.strip_suffix('t') {
        return ParsedValue::TimestampMicros(num.parse().expect("timestamp field"));
    }
    ParsedValue::Float(token.parse().expect("float field"))
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Read up to an unescaped delimiter, decoding `\x` escapes.
    fn unquoted_token(&mut self, delims: &[u8]) -> String {
        let mut out = Vec::new();
        while let Some(b) = self.peek() {
            if b == b'\\' {
                self.pos += 1;
                if let Some(next) = self.peek() {
                    out.push(next);
                    self.pos += 1;
                }
                continue;
            }
            if delims.contains(&b) {
                break;
            }
            out.push(b);
            self.pos += 1;
        }
        String::from_utf8(out).expect("token is UTF-8")
    }

    /// Read up to a delimiter without unescaping (numeric tokens).
    fn raw_token(&mut self, delims: &[u8]) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if delims.contains(&b) {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8(self.bytes[start..self.pos].to_vec()).expect("token is UTF-8")
    }

    /// Read a double-quoted string with `\"`, `\\`, `\n`, `\r` escapes.
    fn quoted_string(&mut self) -> ParsedValue {
        assert_eq!(self.peek(), Some(b'"'));
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b'n') => out.push(b'\n'),
                        Some(b'r') => out.push(b'\r'),
                        Some(other) => out.push(other),
                        None => panic!("dangling escape in quoted string"),
                    }
                    self.pos += 1;
                }
                Some(b) => {
                    out.push(b);
                    self.pos += 1;
                }
                None => panic!("unterminated quoted string"),
            }
        }
        ParsedValue::Str(String::from_utf8(out).expect("string is UTF-8"))
    }
}

// ============================================================================
// Mock TCP ingestion server
// ============================================================================

/// RFC 6979 appendix A.2.5 P-256 test key, shared by auth tests.
pub const TEST_KEY_D_HEX: &str =
    "C9AFA9D845BA75166B5C215767B1D6934E50C3DB36E89B127B8A622B120F6721";
pub const TEST_KEY_X_HEX: &str =
    "60FED4BA255A9D31C961EB74C6356D68C049B8923B61FA6CE669622E60F29FB6";
pub const TEST_KEY_Y_HEX: &str =
    "7903FE1008B8BC99A41AE9E95628BC64F2F1B20C2D7E9F5177A3C294D4462299";

pub fn hex_decode(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

/// Handle to an in-process TCP ingestion server.
pub struct TcpServer {
    pub addr: SocketAddr,
    data: Arc<Mutex<Vec<u8>>>,
    auth_results: Arc<Mutex<Vec<bool>>>,
}

impl TcpServer {
    /// Spawn a capture-only server (no auth).
    pub fn spawn() -> Self {
        Self::spawn_inner(false)
    }

    /// Spawn a server that runs the key-pair challenge handshake on every
    /// connection, verifying signatures against the shared test key.
    pub fn spawn_with_auth() -> Self {
        Self::spawn_inner(true)
    }

    fn spawn_inner(auth: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let addr = listener.local_addr().unwrap();
        let data = Arc::new(Mutex::new(Vec::new()));
        let auth_results = Arc::new(Mutex::new(Vec::new()));

        let thread_data = Arc::clone(&data);
        let thread_auth = Arc::clone(&auth_results);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                if auth {
                    let ok = run_auth_handshake(&mut stream);
                    thread_auth.lock().unwrap().push(ok);
                    if !ok {
                        continue;
                    }
                }
                let mut chunk = [0u8; 4096];
                while let Ok(n) = stream.read(&mut chunk) {
                    if n == 0 {
                        break;
                    }
                    thread_data.lock().unwrap().extend_from_slice(&chunk[..n]);
                }
            }
        });

        Self {
            addr,
            data,
            auth_results,
        }
    }

    /// Block until the captured bytes satisfy `predicate` (5 s timeout).
    pub fn wait_for<F: Fn(&[u8]) -> bool>(&self, predicate: F) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            {
                let data = self.data.lock().unwrap();
                if predicate(&data) {
                    return data.clone();
                }
            }
            assert!(
                Instant::now() < deadline,
                "mock server did not receive the expected bytes in time"
            );
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Auth handshake outcomes, one per authenticated connection.
    pub fn auth_results(&self) -> Vec<bool> {
        self.auth_results.lock().unwrap().clone()
    }
}

/// Server side of the challenge/response: key id line in, challenge out,
/// signature line in, verified against the test public key.
fn run_auth_handshake(stream: &mut TcpStream) -> bool {
    let Some(_key_id) = read_line(stream) else {
        return false;
    };
    if stream.write_all(b"mockserverchallenge\n").is_err() {
        return false;
    }
    let Some(signature_b64) = read_line(stream) else {
        return false;
    };
    use base64::Engine;
    let Ok(signature) =
        base64::engine::general_purpose::STANDARD.decode(signature_b64.as_bytes())
    else {
        return false;
    };

    let mut public = vec![0x04];
    public.extend_from_slice(&hex_decode(TEST_KEY_X_HEX));
    public.extend_from_slice(&hex_decode(TEST_KEY_Y_HEX));
    let key = ring::signature::UnparsedPublicKey::new(
        &ring::signature::ECDSA_P256_SHA256_FIXED,
        public,
    );
    key.verify(b"mockserverchallenge", &signature).is_ok()
}

fn read_line(stream: &mut TcpStream) -> Option<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte) {
            Ok(0) | Err(_) => return None,
            Ok(_) => {
                if byte[0] == b'\n' {
                    return String::from_utf8(line).ok();
                }
                line.push(byte[0]);
                if line.len() > 4096 {
                    return None;
                }
            }
        }
    }
}

// ============================================================================
// Mock HTTP ingestion server
// ============================================================================

/// One scripted HTTP response.
pub struct HttpReply {
    pub status: u16,
    pub body: String,
    /// Close the connection after this response.
    pub close: bool,
}

impl HttpReply {
    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: String::new(),
            close: false,
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: format!("{{\"message\":\"{}\"}}", message),
            close: false,
        }
    }
}

/// A captured ingestion request.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.split("\r\n").find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }
}

/// Handle to an in-process HTTP ingestion server.
pub struct HttpServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl HttpServer {
    /// Spawn a server answering with `script` in order, then 204s.
    pub fn spawn(script: Vec<HttpReply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(Mutex::new(script.into_iter().collect::<VecDeque<_>>()));

        let thread_requests = Arc::clone(&requests);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                loop {
                    let Some(request) = read_http_request(&mut stream) else {
                        break;
                    };
                    thread_requests.lock().unwrap().push(request);
                    let reply = script
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or_else(HttpReply::no_content);
                    let reason = match reply.status {
                        204 => "No Content",
                        200 => "OK",
                        400 => "Bad Request",
                        401 => "Unauthorized",
                        404 => "Not Found",
                        500 => "Internal Server Error",
                        503 => "Service Unavailable",
                        _ => "Status",
                    };
                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{}\r\n{}",
                        reply.status,
                        reason,
                        reply.body.len(),
                        if reply.close { "Connection: close\r\n" } else { "" },
                        reply.body
                    );
                    if stream.write_all(response.as_bytes()).is_err() {
                        break;
                    }
                    if reply.close {
                        break;
                    }
                }
            }
        });

        Self { addr, requests }
    }

    /// Block until `count` requests have been captured (5 s timeout).
    pub fn wait_for_requests(&self, count: usize) -> Vec<CapturedRequest> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            {
                let requests = self.requests.lock().unwrap();
                if requests.len() >= count {
                    return requests.clone();
                }
            }
            assert!(
                Instant::now() < deadline,
                "mock server did not receive {} requests in time",
                count
            );
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Read one request: header block plus a Content-Length body.
fn read_http_request(stream: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let mut chunk = [0u8; 4096];
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8(buf[..header_end].to_vec()).ok()?;
    let content_length: usize = head
        .split("\r\n")
        .find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.eq_ignore_ascii_case("content-length")
                .then(|| v.trim().parse().ok())?
        })
        .unwrap_or(0);

    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let mut chunk = [0u8; 4096];
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return None,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
        }
    }
    body.truncate(content_length);
    Some(CapturedRequest { head, body })
}
