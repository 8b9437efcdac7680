// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! # linesink - Line Protocol ingestion client
//!
//! A write-only client for time-series databases that ingest the InfluxDB
//! Line Protocol (ILP): rows are built into an in-memory buffer with strict
//! format and validation guarantees, then flushed over TCP, TLS or HTTP(S)
//! with authentication, bounded retries and transparent reconnection.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linesink::{Sender, TimestampNanos, Result};
//!
//! fn main() -> Result<()> {
//!     let mut sender = Sender::from_conf("tcp::addr=localhost:9009;")?;
//!
//!     sender
//!         .row("sensor")?
//!         .symbol("city", "ldn")?
//!         .field("temp", 21.5)?
//!         .at(TimestampNanos::new(1000)?)?;
//!
//!     sender.flush()?;
//!     sender.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------------+
//! |                          Sender Session                           |
//! |   auth handshake | auto-flush policy | retry/backoff | reconnect  |
//! +-------------------------------------------------------------------+
//! |                      Buffer + Row Builder                         |
//! |   escaping rules | column ordering | commit/rollback marks        |
//! +-------------------------------------------------------------------+
//! |                           Transport                               |
//! |   plain TCP | TLS (rustls) | HTTP/1.1 request-response            |
//! +-------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Sender`] | Ingestion session: rows in, batches out |
//! | [`Buffer`] | Standalone row buffer with commit/rollback |
//! | [`SenderConfig`] | Explicit session configuration |
//! | [`FieldValue`] | Typed field values (bool/int/float/string/timestamp) |
//! | [`Error`] | The full error taxonomy, split by retryability |
//!
//! ## Concurrency
//!
//! One producer thread per [`Sender`]; rows flush in exact commit order.
//! Run multiple independent senders to scale out concurrent producers.
//!
//! ## Features
//!
//! - `tls` (default): TLS transports via rustls
//! - `ecdsa-auth` (default): key-pair auth for the TCP transport via ring

/// Credentials and per-connection auth handshakes.
pub mod auth;
/// Row buffer: serialization, escaping, commit/rollback.
pub mod buffer;
/// Configuration-string parsing (`tcp::addr=host:port;...`).
pub mod conf;
/// Session configuration structs and YAML loading.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Sender session and row handle.
pub mod sender;
/// Timestamp newtypes.
pub mod timestamp;
/// Transport layer (TCP, TLS, HTTP).
mod transport;

pub use auth::AuthParams;
#[cfg(feature = "ecdsa-auth")]
pub use auth::EcdsaKey;
pub use buffer::{Buffer, FieldValue, DEFAULT_MAX_NAME_LEN};
pub use config::{Protocol, SenderConfig, TlsVerifyMode};
pub use error::{Error, Result};
pub use sender::{ConnectionState, Row, Sender};
pub use timestamp::{TimestampMicros, TimestampNanos};
