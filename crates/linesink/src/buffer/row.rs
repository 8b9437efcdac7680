// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! Row-builder state machine.
//!
//! The wire format carries no schema, so column ordering at write time is
//! the only thing standing between the caller and a row the server rejects
//! opaquely. The legal sequence is:
//!
//! ```text
//! TableSet -> (symbol)* -> (field)+ -> [timestamp] -> commit | discard
//! ```
//!
//! Every violation is reported as [`Error::ColumnOrder`] and leaves the row
//! discardable but never committed.
//!
//! [`Error::ColumnOrder`]: crate::Error::ColumnOrder

use std::collections::HashSet;

use crate::error::{Error, Result};

/// Phase of the row currently being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowPhase {
    /// Table name written; symbols or fields may follow.
    TableSet,
    /// At least one symbol written; more symbols or the first field may follow.
    Symbols,
    /// At least one field written; more fields or the timestamp may follow.
    Fields,
}

/// Book-keeping for the row between `begin_row` and commit/discard.
#[derive(Debug)]
pub(crate) struct RowState {
    /// Byte offset of the row start (equals the committed end).
    pub(crate) start: usize,
    /// Table name, kept for error messages.
    pub(crate) table: String,
    pub(crate) phase: RowPhase,
    /// Designated timestamp in nanoseconds, written at commit.
    pub(crate) timestamp: Option<i64>,
}

impl RowState {
    pub(crate) fn new(start: usize, table: &str) -> Self {
        Self {
            start,
            table: table.to_string(),
            phase: RowPhase::TableSet,
            timestamp: None,
        }
    }

    /// Register a symbol column. Legal before any field.
    pub(crate) fn on_symbol(&mut self) -> Result<()> {
        match self.phase {
            RowPhase::TableSet | RowPhase::Symbols => {
                self.phase = RowPhase::Symbols;
                Ok(())
            }
            RowPhase::Fields => Err(Error::ColumnOrder(format!(
                "symbol after field in row for table {:?}",
                self.table
            ))),
        }
    }

    /// Register a field column. Legal any time before commit.
    pub(crate) fn on_field(&mut self) {
        self.phase = RowPhase::Fields;
    }

    /// Register the designated timestamp. Legal once, after a field.
    pub(crate) fn on_timestamp(&mut self, nanos: i64) -> Result<()> {
        if self.phase != RowPhase::Fields {
            return Err(Error::ColumnOrder(format!(
                "timestamp before any field in row for table {:?}",
                self.table
            )));
        }
        if self.timestamp.is_some() {
            return Err(Error::TimestampAlreadySet(self.table.clone()));
        }
        self.timestamp = Some(nanos);
        Ok(())
    }

    /// Check the row is committable (at least one field).
    pub(crate) fn on_commit(&self) -> Result<()> {
        if self.phase != RowPhase::Fields {
            return Err(Error::EmptyRow(self.table.clone()));
        }
        Ok(())
    }
}

/// Per-row duplicate-column tracker, reused across rows to amortize the
/// allocation.
#[derive(Debug, Default)]
pub(crate) struct ColumnTracker {
    seen: HashSet<String>,
}

impl ColumnTracker {
    pub(crate) fn reset(&mut self) {
        self.seen.clear();
    }

    /// Fail if `name` already appeared in this row.
    pub(crate) fn check(&self, name: &str) -> Result<()> {
        if self.seen.contains(name) {
            return Err(Error::DuplicateColumn(name.to_string()));
        }
        Ok(())
    }

    /// Record `name`, failing if it already appeared in this row.
    pub(crate) fn record(&mut self, name: &str) -> Result<()> {
        if !self.seen.insert(name.to_string()) {
            return Err(Error::DuplicateColumn(name.to_string()));
        }
        Ok(())
    }
}
