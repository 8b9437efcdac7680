// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! Timestamp newtypes with protocol range checks.
//!
//! The wire format carries the designated row timestamp in nanoseconds and
//! timestamp field values in microseconds. Both newtypes reject negative
//! values: servers refuse pre-epoch rows, and catching that at build time
//! keeps the failure local instead of a round-trip rejection.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Nanoseconds since the Unix epoch. Used for the designated row timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimestampNanos(i64);

impl TimestampNanos {
    /// Wrap a nanosecond epoch offset, rejecting negative values.
    pub fn new(nanos: i64) -> Result<Self> {
        if nanos < 0 {
            return Err(Error::Range(format!(
                "timestamp must be non-negative, got {} ns",
                nanos
            )));
        }
        Ok(Self(nanos))
    }

    /// Current wall-clock time.
    pub fn now() -> Result<Self> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Range(format!("system clock before Unix epoch: {}", e)))?;
        let nanos = i64::try_from(elapsed.as_nanos())
            .map_err(|_| Error::Range("system time exceeds i64 nanoseconds".into()))?;
        Ok(Self(nanos))
    }

    /// Convert a `SystemTime`, rejecting pre-epoch instants.
    pub fn from_system_time(t: SystemTime) -> Result<Self> {
        let elapsed = t
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Range(format!("timestamp before Unix epoch: {}", e)))?;
        let nanos = i64::try_from(elapsed.as_nanos())
            .map_err(|_| Error::Range("timestamp exceeds i64 nanoseconds".into()))?;
        Ok(Self(nanos))
    }

    /// The raw nanosecond value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

/// Microseconds since the Unix epoch. Used for timestamp field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimestampMicros(i64);

impl TimestampMicros {
    /// Wrap a microsecond epoch offset, rejecting negative values.
    pub fn new(micros: i64) -> Result<Self> {
        if micros < 0 {
            return Err(Error::Range(format!(
                "timestamp must be non-negative, got {} us",
                micros
            )));
        }
        Ok(Self(micros))
    }

    /// Current wall-clock time.
    pub fn now() -> Result<Self> {
        Ok(TimestampNanos::now()?.into())
    }

    /// The raw microsecond value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<TimestampNanos> for TimestampMicros {
    fn from(ts: TimestampNanos) -> Self {
        // Non-negative by construction, floor division keeps it so.
        Self(ts.as_i64() / 1_000)
    }
}
