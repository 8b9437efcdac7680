// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! Plain TCP dialing.
//!
//! Connects with a bounded timeout per resolved address, disables Nagle
//! (ingestion batches are already coalesced by the buffer), and arms
//! keep-alive probes so a dead peer is noticed between flushes.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};

use crate::config::SenderConfig;
use crate::error::{Error, Result};

/// Keep-alive idle time before the first probe.
const KEEPALIVE_IDLE: Duration = Duration::from_secs(30);

/// Resolve and connect `config.host:config.port`.
pub(crate) fn dial(config: &SenderConfig) -> Result<TcpStream> {
    let addrs: Vec<_> = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| {
            Error::Connection(format!(
                "resolving {}:{}: {}",
                config.host, config.port, e
            ))
        })?
        .collect();

    let mut last_err = None;
    for addr in addrs {
        log::debug!("connecting to {} (timeout {:?})", addr, config.connect_timeout);
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(stream) => {
                configure(&stream, config)?;
                log::debug!("connected to {}", addr);
                return Ok(stream);
            }
            Err(e) => {
                log::debug!("connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    match last_err {
        Some(e) => Err(Error::Connection(format!(
            "connecting to {}:{}: {}",
            config.host, config.port, e
        ))),
        None => Err(Error::Connection(format!(
            "{}:{} resolved to no addresses",
            config.host, config.port
        ))),
    }
}

/// Apply per-socket options from the config.
fn configure(stream: &TcpStream, config: &SenderConfig) -> Result<()> {
    stream
        .set_nodelay(true)
        .and_then(|()| stream.set_read_timeout(Some(config.request_timeout)))
        .and_then(|()| stream.set_write_timeout(Some(config.request_timeout)))
        .map_err(|e| Error::Connection(format!("configuring socket: {}", e)))?;

    let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_IDLE);
    SockRef::from(stream)
        .set_tcp_keepalive(&keepalive)
        .map_err(|e| Error::Connection(format!("enabling keep-alive: {}", e)))?;
    Ok(())
}
