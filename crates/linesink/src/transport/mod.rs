// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! Transport layer: one live duplex channel per session.
//!
//! The [`ByteStream`] trait unifies plain TCP and TLS streams so the rest
//! of the transport code is agnostic about encryption. [`Transport`] is the
//! tagged dispatch over the two wire disciplines:
//!
//! - **Stream** (TCP/TLS): fire-and-forget writes; faults surface as broken
//!   pipes or resets on a later operation.
//! - **Http** (HTTP/HTTPS): each send is a full request/response cycle and
//!   the server can reject a batch with a structured error.
//!
//! Dispatch is resolved once at session construction, not per call.

pub(crate) mod http;
pub(crate) mod tcp;
#[cfg(feature = "tls")]
pub(crate) mod tls;

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

use crate::auth::AuthParams;
use crate::config::SenderConfig;
use crate::error::{conn_err, Error, Result};

/// Abstraction over the byte-oriented client streams (TCP, TLS).
pub(crate) trait ByteStream: Read + Write + Send {
    /// Shut the stream down; closing twice is a no-op at the call site.
    fn shutdown(&mut self, how: Shutdown) -> std::io::Result<()>;

    /// Peer address, for logging.
    fn peer_addr(&self) -> std::io::Result<SocketAddr>;

    /// Set the read timeout.
    fn set_read_timeout(&self, dur: Option<Duration>) -> std::io::Result<()>;

    /// Set the write timeout.
    fn set_write_timeout(&self, dur: Option<Duration>) -> std::io::Result<()>;

    /// Whether this stream is TLS-wrapped (for logging).
    fn is_tls(&self) -> bool {
        false
    }
}

impl ByteStream for std::net::TcpStream {
    fn shutdown(&mut self, how: Shutdown) -> std::io::Result<()> {
        std::net::TcpStream::shutdown(self, how)
    }

    fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        std::net::TcpStream::peer_addr(self)
    }

    fn set_read_timeout(&self, dur: Option<Duration>) -> std::io::Result<()> {
        std::net::TcpStream::set_read_timeout(self, dur)
    }

    fn set_write_timeout(&self, dur: Option<Duration>) -> std::io::Result<()> {
        std::net::TcpStream::set_write_timeout(self, dur)
    }
}

/// Boxed stream the transports hold.
pub(crate) type BoxedByteStream = Box<dyn ByteStream>;

// ============================================================================
// Transport dispatch
// ============================================================================

/// The session's live channel, dispatched by wire discipline.
pub(crate) enum Transport {
    /// Streaming TCP or TLS channel.
    Stream(StreamTransport),
    /// HTTP or HTTPS request/response channel.
    Http(http::HttpTransport),
    /// Scripted channel for unit tests.
    #[cfg(test)]
    Mock(MockTransport),
}

impl Transport {
    /// Establish the channel described by `config`, including TLS wrapping
    /// and the per-connection auth handshake for streaming transports.
    pub(crate) fn connect(config: &SenderConfig) -> Result<Self> {
        let stream = open_stream(config)?;
        if config.protocol.is_http() {
            Ok(Transport::Http(http::HttpTransport::new(stream, config)))
        } else {
            let mut transport = StreamTransport {
                stream: Some(stream),
            };
            transport.login(&config.auth)?;
            Ok(Transport::Stream(transport))
        }
    }

    /// Send one batch of committed rows.
    pub(crate) fn send(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            Transport::Stream(t) => t.send(bytes),
            Transport::Http(t) => t.send(bytes),
            #[cfg(test)]
            Transport::Mock(t) => t.send(bytes),
        }
    }

    /// Whether the channel is still usable without re-establishment.
    pub(crate) fn is_healthy(&self) -> bool {
        match self {
            Transport::Stream(t) => t.stream.is_some(),
            Transport::Http(t) => t.is_healthy(),
            #[cfg(test)]
            Transport::Mock(_) => true,
        }
    }

    /// Close the channel. Idempotent: closing a closed transport is a no-op.
    pub(crate) fn close(&mut self) {
        match self {
            Transport::Stream(t) => t.close(),
            Transport::Http(t) => t.close(),
            #[cfg(test)]
            Transport::Mock(_) => {}
        }
    }
}

/// Dial and (if configured) TLS-wrap the underlying socket.
fn open_stream(config: &SenderConfig) -> Result<BoxedByteStream> {
    let tcp = tcp::dial(config)?;
    if config.protocol.is_tls() {
        #[cfg(feature = "tls")]
        {
            let tls = tls::wrap(tcp, config)?;
            return Ok(Box::new(tls));
        }
        #[cfg(not(feature = "tls"))]
        return Err(Error::Config(
            "TLS transports require the 'tls' feature".into(),
        ));
    }
    Ok(Box::new(tcp))
}

// ============================================================================
// Streaming transport (TCP / TLS)
// ============================================================================

/// Fire-and-forget streaming channel.
pub(crate) struct StreamTransport {
    stream: Option<BoxedByteStream>,
}

impl StreamTransport {
    /// Run the per-connection auth handshake, if any.
    fn login(&mut self, auth: &AuthParams) -> Result<()> {
        match auth {
            AuthParams::None => Ok(()),
            #[cfg(feature = "ecdsa-auth")]
            AuthParams::Ecdsa(key) => {
                let stream = self
                    .stream
                    .as_mut()
                    .ok_or_else(|| Error::Connection("transport closed".into()))?;
                crate::auth::tcp_login(stream, key)
            }
            // Basic/token credentials never reach a streaming transport;
            // config validation pairs them with HTTP.
            _ => Err(Error::Config(
                "credentials not usable on a streaming transport".into(),
            )),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::Connection("transport closed".into()))?;
        stream
            .write_all(bytes)
            .and_then(|()| stream.flush())
            .map_err(|e| conn_err("streaming send", &e))
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // Best effort; the peer may already be gone.
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

// ============================================================================
// Mock transport (unit tests)
// ============================================================================

/// Scripted transport for exercising the session's retry logic without a
/// network.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MockTransport {
    /// Outcome script, one entry consumed per send; empty means success.
    pub script: std::collections::VecDeque<Result<()>>,
    /// Captured payloads of successful sends.
    pub sent: Vec<Vec<u8>>,
    /// Number of times the session "reconnected" this mock.
    pub reconnects: u32,
}

#[cfg(test)]
impl MockTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        match self.script.pop_front() {
            Some(Ok(())) | None => {
                self.sent.push(bytes.to_vec());
                Ok(())
            }
            Some(Err(e)) => Err(e),
        }
    }
}
