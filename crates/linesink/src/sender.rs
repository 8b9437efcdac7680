// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! Sender session: row building, auto-flush policy, flush with bounded
//! retry, reconnect-on-fault.
//!
//! One session owns one buffer and one live transport; rows flush in exact
//! commit order over a single connection, so the wire stream is never
//! reordered. Sessions are the scaling unit: run one per producer thread.
//!
//! A failed flush never drops data. Transient faults are retried with
//! exponential backoff over a freshly established connection; once the
//! budget is exhausted the buffer is still intact and re-flushable.

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::buffer::{Buffer, FieldValue};
use crate::config::{SenderConfig, MAX_RETRY_BACKOFF};
use crate::error::{Error, Result};
use crate::timestamp::TimestampNanos;
use crate::transport::Transport;

/// Lifecycle state of the session's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel (before connect, or after close).
    Disconnected,
    /// Channel being established.
    Connecting,
    /// Channel up, auth handshake done, nothing sent yet.
    Authenticated,
    /// At least one batch delivered on this channel.
    Streaming,
    /// Channel failed; next flush re-establishes it.
    Faulted,
}

/// An ingestion session against one server.
///
/// # Example
///
/// ```no_run
/// use linesink::{Sender, TimestampNanos};
///
/// let mut sender = Sender::from_conf("tcp::addr=localhost:9009;")?;
/// sender
///     .row("sensor")?
///     .symbol("city", "ldn")?
///     .field("temp", 21.5)?
///     .at(TimestampNanos::now()?)?;
/// sender.flush()?;
/// sender.close();
/// # Ok::<(), linesink::Error>(())
/// ```
pub struct Sender {
    config: SenderConfig,
    buffer: Buffer,
    transport: Option<Transport>,
    state: ConnectionState,
    last_flush: Instant,
    closed: bool,
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("config", &self.config)
            .field("buffer", &self.buffer)
            .field("state", &self.state)
            .field("connected", &self.transport.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Sender {
    /// Connect a new session. The transport is established and
    /// authenticated before this returns.
    pub fn connect(config: SenderConfig) -> Result<Self> {
        config.validate()?;
        let buffer = Buffer::with_max_name_len(config.max_name_len);
        let mut sender = Self {
            config,
            buffer,
            transport: None,
            state: ConnectionState::Disconnected,
            last_flush: Instant::now(),
            closed: false,
        };
        sender.establish()?;
        info!(
            "session established: {:?} to {}:{}",
            sender.config.protocol, sender.config.host, sender.config.port
        );
        Ok(sender)
    }

    /// Connect a new session from a configuration string.
    ///
    /// See [`conf`](crate::conf) for the grammar.
    pub fn from_conf(conf: &str) -> Result<Self> {
        Self::connect(crate::conf::parse_conf(conf)?)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Current channel state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The configuration this session was built with.
    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Read-only view of the pending (committed, unflushed) rows.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Number of committed rows awaiting flush.
    pub fn pending_rows(&self) -> usize {
        self.buffer.row_count()
    }

    /// Number of committed bytes awaiting flush.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    // ========================================================================
    // Row building
    // ========================================================================

    /// Open a row for `table`. Dropping the returned handle without
    /// committing discards the row and leaves the buffer untouched.
    pub fn row(&mut self, table: &str) -> Result<Row<'_>> {
        self.check_open()?;
        self.buffer.begin_row(table)?;
        Ok(Row {
            sender: self,
            finished: false,
        })
    }

    // ========================================================================
    // Flushing
    // ========================================================================

    /// Send all committed rows, retrying transient faults with bounded
    /// exponential backoff. On success the buffer is drained; on failure it
    /// is left fully intact.
    pub fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        if self.buffer.is_empty() {
            self.last_flush = Instant::now();
            return Ok(());
        }

        let mut attempt: u32 = 0;
        loop {
            match self.try_send() {
                Ok(()) => {
                    let rows = self.buffer.row_count();
                    self.buffer.clear();
                    self.last_flush = Instant::now();
                    self.state = ConnectionState::Streaming;
                    debug!("flushed {} rows", rows);
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.config.retry_attempts => {
                    self.state = ConnectionState::Faulted;
                    self.teardown();
                    let delay = backoff_delay(self.config.retry_backoff, attempt);
                    attempt += 1;
                    warn!(
                        "flush attempt {} failed ({}), retrying in {:?}",
                        attempt, e, delay
                    );
                    std::thread::sleep(delay);
                }
                Err(e) if e.is_retryable() => {
                    self.state = ConnectionState::Faulted;
                    self.teardown();
                    error!(
                        "flush failed after {} attempts, {} rows still buffered: {}",
                        attempt + 1,
                        self.buffer.row_count(),
                        e
                    );
                    return Err(Error::Flush {
                        attempts: attempt + 1,
                        last: e.to_string(),
                    });
                }
                Err(e) => {
                    // Terminal failure. Server rejections leave the channel
                    // usable; trust and auth failures do not.
                    if matches!(e, Error::Tls(_) | Error::Auth(_)) {
                        self.state = ConnectionState::Faulted;
                        self.teardown();
                    }
                    error!("flush failed, {} rows still buffered: {}", self.buffer.row_count(), e);
                    return Err(e);
                }
            }
        }
    }

    /// Close the session, releasing the channel. Idempotent; buffered rows
    /// that were never flushed are dropped with a warning.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if !self.buffer.is_empty() {
            warn!(
                "closing with {} unflushed rows ({} bytes) in the buffer",
                self.buffer.row_count(),
                self.buffer.len()
            );
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.state = ConnectionState::Disconnected;
        debug!("session closed");
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Config("session is closed".into()));
        }
        Ok(())
    }

    fn establish(&mut self) -> Result<()> {
        self.state = ConnectionState::Connecting;
        match Transport::connect(&self.config) {
            Ok(transport) => {
                self.transport = Some(transport);
                self.state = ConnectionState::Authenticated;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Faulted;
                Err(e)
            }
        }
    }

    /// Drop the channel entirely; the next send re-establishes from config.
    fn teardown(&mut self) {
        #[cfg(test)]
        if let Some(Transport::Mock(mock)) = self.transport.as_mut() {
            mock.reconnects += 1;
            return;
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }

    fn try_send(&mut self) -> Result<()> {
        let healthy = self.transport.as_ref().is_some_and(Transport::is_healthy);
        if !healthy {
            self.teardown();
            self.establish()?;
        }
        match self.transport.as_mut() {
            Some(transport) => transport.send(self.buffer.as_bytes()),
            None => Err(Error::Connection("transport closed".into())),
        }
    }

    /// Auto-flush evaluation, run once after every committed row.
    fn after_commit(&mut self) -> Result<()> {
        let rows_hit = self
            .config
            .auto_flush_rows
            .is_some_and(|t| self.buffer.row_count() >= t);
        let bytes_hit = self
            .config
            .auto_flush_bytes
            .is_some_and(|t| self.buffer.len() >= t);
        let stale = self
            .config
            .auto_flush_interval
            .is_some_and(|t| self.last_flush.elapsed() >= t);
        if rows_hit || bytes_hit || stale {
            debug!(
                "auto-flush: rows={} bytes={} (rows_hit={} bytes_hit={} stale={})",
                self.buffer.row_count(),
                self.buffer.len(),
                rows_hit,
                bytes_hit,
                stale
            );
            return self.flush();
        }
        Ok(())
    }

    #[cfg(test)]
    fn with_mock(config: SenderConfig, mock: crate::transport::MockTransport) -> Self {
        Self {
            config,
            buffer: Buffer::new(),
            transport: Some(Transport::Mock(mock)),
            state: ConnectionState::Authenticated,
            last_flush: Instant::now(),
            closed: false,
        }
    }

    #[cfg(test)]
    fn mock(&self) -> &crate::transport::MockTransport {
        match self.transport.as_ref() {
            Some(Transport::Mock(mock)) => mock,
            _ => panic!("not a mock transport"),
        }
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.close();
    }
}

/// Exponential backoff: `base * 2^attempt`, capped.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16)).min(MAX_RETRY_BACKOFF)
}

// ============================================================================
// Row handle
// ============================================================================

/// Handle for the row being built. Commit with [`at`](Row::at) or
/// [`at_now`](Row::at_now); dropping the handle first discards the row.
#[derive(Debug)]
pub struct Row<'a> {
    sender: &'a mut Sender,
    finished: bool,
}

impl Row<'_> {
    /// Append a symbol (tag) column. Symbols must precede fields.
    pub fn symbol(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        self.sender.buffer.symbol(name, value)?;
        Ok(self)
    }

    /// Append a field column.
    pub fn field<'v>(&mut self, name: &str, value: impl Into<FieldValue<'v>>) -> Result<&mut Self> {
        self.sender.buffer.field(name, value)?;
        Ok(self)
    }

    /// Commit the row with a designated timestamp, then run the auto-flush
    /// check. The handle is spent afterwards; further calls fail.
    pub fn at(&mut self, ts: TimestampNanos) -> Result<()> {
        self.sender.buffer.set_timestamp(ts)?;
        self.commit()
    }

    /// Commit the row without a timestamp (the server assigns ingestion
    /// time), then run the auto-flush check. The handle is spent
    /// afterwards; further calls fail.
    pub fn at_now(&mut self) -> Result<()> {
        self.commit()
    }

    fn commit(&mut self) -> Result<()> {
        self.sender.buffer.commit_row()?;
        // The row is in the committed region now; a failing auto-flush must
        // not discard it on drop.
        self.finished = true;
        self.sender.after_commit()
    }
}

impl Drop for Row<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.sender.buffer.discard_row();
        }
    }
}
