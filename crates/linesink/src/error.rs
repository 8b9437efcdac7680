// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! Error taxonomy for the ingestion client.
//!
//! Row-construction errors are always local: they never touch the network
//! and the buffer stays consistent once the offending row is discarded.
//! Transport errors split into retryable faults (connection establishment,
//! broken streams) and terminal ones (TLS trust, auth, server rejection).

use std::io;

/// All errors surfaced by this crate.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Row construction (local, buffer stays consistent via discard)
    // ========================================================================
    /// Table or column name is empty, too long, or contains a character the
    /// wire format cannot carry in a name position.
    InvalidName(String),
    /// Row-builder call out of sequence (e.g. a symbol after a field).
    ColumnOrder(String),
    /// Column name repeated within the same row.
    DuplicateColumn(String),
    /// Row committed without any field column.
    EmptyRow(String),
    /// Designated timestamp set twice on the same row.
    TimestampAlreadySet(String),
    /// A value cannot be represented in the wire encoding
    /// (non-UTF-8 input at a decode point, or a row-terminator character
    /// inside an unquoted value).
    Encoding(String),
    /// Numeric or timestamp value outside the protocol's representable range.
    Range(String),

    // ========================================================================
    // Configuration
    // ========================================================================
    /// Invalid configuration (bad conf string, conflicting options,
    /// feature not compiled in).
    Config(String),

    // ========================================================================
    // Transport establishment and I/O
    // ========================================================================
    /// Host unreachable, connection refused, reset, or timed out.
    /// Retryable: the fault is transient from the client's point of view.
    Connection(String),
    /// TLS handshake or certificate trust failure. Not retryable.
    Tls(String),
    /// Authentication handshake failed or was rejected by the server.
    /// Not retryable: retrying the same credentials cannot succeed.
    Auth(String),

    // ========================================================================
    // Flush outcomes
    // ========================================================================
    /// Retry budget exhausted while flushing. The buffer is left intact so
    /// the caller may retry or persist the rows elsewhere.
    Flush {
        /// Number of send attempts made.
        attempts: u32,
        /// The last transport failure observed.
        last: String,
    },
    /// Server-confirmed data defect (HTTP 4xx class). Not retried: resending
    /// unchanged rows cannot succeed. The buffer is left intact.
    Rejected {
        /// HTTP status code reported by the server.
        status: u16,
        /// Server-provided error message, if any.
        message: String,
    },

    // ========================================================================
    // Other
    // ========================================================================
    /// Local I/O error outside a live connection (config file, CA file).
    Io(io::Error),
}

impl Error {
    /// Whether a flush-time failure of this kind is worth another attempt
    /// over a freshly established connection.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Row construction
            Error::InvalidName(msg) => write!(f, "invalid name: {}", msg),
            Error::ColumnOrder(msg) => write!(f, "column order violation: {}", msg),
            Error::DuplicateColumn(name) => write!(f, "duplicate column: {}", name),
            Error::EmptyRow(table) => {
                write!(f, "row for table {:?} has no field column", table)
            }
            Error::TimestampAlreadySet(table) => {
                write!(f, "timestamp already set for row in table {:?}", table)
            }
            Error::Encoding(msg) => write!(f, "encoding error: {}", msg),
            Error::Range(msg) => write!(f, "value out of range: {}", msg),
            // Configuration
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            // Transport
            Error::Connection(msg) => write!(f, "connection error: {}", msg),
            Error::Tls(msg) => write!(f, "TLS error: {}", msg),
            Error::Auth(msg) => write!(f, "authentication error: {}", msg),
            // Flush
            Error::Flush { attempts, last } => {
                write!(f, "flush failed after {} attempts: {}", attempts, last)
            }
            Error::Rejected { status, message } => {
                write!(f, "server rejected data (HTTP {}): {}", status, message)
            }
            // Other
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Convenient alias for API results using the crate's [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;

/// Map an I/O failure on a live connection to a [`Error::Connection`],
/// keeping the `ErrorKind` visible in the message.
pub(crate) fn conn_err(context: &str, e: &io::Error) -> Error {
    Error::Connection(format!("{}: {} ({:?})", context, e, e.kind()))
}
