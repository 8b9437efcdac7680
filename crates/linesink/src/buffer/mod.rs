// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! Growable row buffer with commit/rollback marks.
//!
//! The buffer owns a contiguous byte region. Bytes in `[0, committed_end)`
//! are always a sequence of complete, newline-terminated rows; the open row
//! (if any) lives in `[committed_end, len)` and is either promoted by
//! `commit_row` or truncated away by `discard_row`. Capacity grows
//! geometrically and is never released until the buffer is dropped, so a
//! long-lived session amortizes allocation across flush cycles.

mod escape;
mod row;
mod value;

pub use value::FieldValue;

use crate::error::{Error, Result};
use crate::timestamp::TimestampNanos;
use row::{ColumnTracker, RowPhase, RowState};

/// Default cap on table and column name length, in bytes.
pub const DEFAULT_MAX_NAME_LEN: usize = 127;

/// In-memory accumulator of serialized rows.
///
/// # Example
///
/// ```
/// use linesink::{Buffer, TimestampNanos};
///
/// let mut buf = Buffer::new();
/// buf.begin_row("sensor")?;
/// buf.symbol("city", "ldn")?;
/// buf.field("temp", 21.5)?;
/// buf.set_timestamp(TimestampNanos::new(1000)?)?;
/// buf.commit_row()?;
/// assert_eq!(buf.as_bytes(), b"sensor,city=ldn temp=21.5 1000\n");
/// # Ok::<(), linesink::Error>(())
/// ```
#[derive(Debug)]
pub struct Buffer {
    bytes: Vec<u8>,
    /// End of the committed region; `bytes[committed_end..]` is the open row.
    committed_end: usize,
    row_count: usize,
    open: Option<RowState>,
    columns: ColumnTracker,
    max_name_len: usize,
}

impl Buffer {
    /// Create an empty buffer with the default name-length cap.
    pub fn new() -> Self {
        Self::with_max_name_len(DEFAULT_MAX_NAME_LEN)
    }

    /// Create an empty buffer with a custom table/column name length cap.
    pub fn with_max_name_len(max_name_len: usize) -> Self {
        Self {
            bytes: Vec::new(),
            committed_end: 0,
            row_count: 0,
            open: None,
            columns: ColumnTracker::default(),
            max_name_len,
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// The committed region: complete rows only, each `\n`-terminated.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.committed_end]
    }

    /// Number of committed bytes.
    pub fn len(&self) -> usize {
        self.committed_end
    }

    /// Whether no rows have been committed.
    pub fn is_empty(&self) -> bool {
        self.committed_end == 0
    }

    /// Number of committed rows.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Current allocated capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Name-length cap this buffer validates against.
    pub fn max_name_len(&self) -> usize {
        self.max_name_len
    }

    /// Reserve room for at least `additional` more bytes.
    pub fn reserve(&mut self, additional: usize) {
        self.bytes.reserve(additional);
    }

    /// Drop all committed rows and any open row, keeping the allocation.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.committed_end = 0;
        self.row_count = 0;
        self.open = None;
        self.columns.reset();
    }

    // ========================================================================
    // Row building
    // ========================================================================

    /// Open a new row scope for `table`.
    pub fn begin_row(&mut self, table: &str) -> Result<()> {
        if self.open.is_some() {
            return Err(Error::ColumnOrder(format!(
                "begin_row({:?}) while a row is already open",
                table
            )));
        }
        escape::check_name("table", table, self.max_name_len)?;
        let state = RowState::new(self.committed_end, table);
        escape::write_table(&mut self.bytes, table);
        self.columns.reset();
        self.open = Some(state);
        Ok(())
    }

    /// Append a symbol (tag) column to the open row.
    pub fn symbol(&mut self, name: &str, value: &str) -> Result<()> {
        escape::check_name("column", name, self.max_name_len)?;
        let row = self
            .open
            .as_mut()
            .ok_or_else(|| Error::ColumnOrder("symbol without an open row".into()))?;
        row.on_symbol()?;
        self.columns.check(name)?;
        let col_start = self.bytes.len();
        self.bytes.push(b',');
        escape::write_column_name(&mut self.bytes, name);
        self.bytes.push(b'=');
        if let Err(e) = escape::write_symbol_value(&mut self.bytes, value) {
            // Roll back the half-written column so an ignored error can
            // never reach commit_row as malformed bytes.
            self.bytes.truncate(col_start);
            return Err(e);
        }
        self.columns.record(name)?;
        Ok(())
    }

    /// Append a field column to the open row.
    pub fn field<'a>(&mut self, name: &str, value: impl Into<FieldValue<'a>>) -> Result<()> {
        escape::check_name("column", name, self.max_name_len)?;
        let row = self
            .open
            .as_mut()
            .ok_or_else(|| Error::ColumnOrder("field without an open row".into()))?;
        let first_field = row.phase != RowPhase::Fields;
        self.columns.check(name)?;
        let col_start = self.bytes.len();
        self.bytes.push(if first_field { b' ' } else { b',' });
        escape::write_column_name(&mut self.bytes, name);
        self.bytes.push(b'=');
        if let Err(e) = value.into().write_to(&mut self.bytes) {
            self.bytes.truncate(col_start);
            return Err(e);
        }
        row.on_field();
        self.columns.record(name)?;
        Ok(())
    }

    /// Set the designated row timestamp; at most once, after a field.
    pub fn set_timestamp(&mut self, ts: TimestampNanos) -> Result<()> {
        let row = self
            .open
            .as_mut()
            .ok_or_else(|| Error::ColumnOrder("set_timestamp without an open row".into()))?;
        row.on_timestamp(ts.as_i64())
    }

    /// Finalize the open row into the committed region.
    ///
    /// On any error the row stays open and discardable; committed bytes are
    /// never touched.
    pub fn commit_row(&mut self) -> Result<()> {
        let row = self
            .open
            .as_ref()
            .ok_or_else(|| Error::ColumnOrder("commit_row without an open row".into()))?;
        row.on_commit()?;
        if let Some(nanos) = row.timestamp {
            self.bytes.push(b' ');
            use std::io::Write;
            write!(&mut self.bytes, "{}", nanos).expect("write to Vec cannot fail");
        }
        self.bytes.push(b'\n');
        self.committed_end = self.bytes.len();
        self.row_count += 1;
        self.open = None;
        Ok(())
    }

    /// Roll the buffer back to the last committed row, as if the open row
    /// had never been started. A no-op when no row is open.
    pub fn discard_row(&mut self) {
        if let Some(row) = self.open.take() {
            debug_assert_eq!(row.start, self.committed_end);
            self.bytes.truncate(self.committed_end);
            self.columns.reset();
        }
    }

    /// Whether a row is currently open.
    pub fn has_open_row(&self) -> bool {
        self.open.is_some()
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed(buf: &Buffer) -> &str {
        std::str::from_utf8(buf.as_bytes()).unwrap()
    }

    #[test]
    fn test_single_row_exact_bytes() {
        let mut buf = Buffer::new();
        buf.begin_row("sensor").unwrap();
        buf.symbol("city", "ldn").unwrap();
        buf.field("temp", 21.5).unwrap();
        buf.set_timestamp(TimestampNanos::new(1000).unwrap()).unwrap();
        buf.commit_row().unwrap();
        assert_eq!(committed(&buf), "sensor,city=ldn temp=21.5 1000\n");
        assert_eq!(buf.row_count(), 1);
    }

    #[test]
    fn test_row_without_timestamp() {
        let mut buf = Buffer::new();
        buf.begin_row("t").unwrap();
        buf.field("f", 1i64).unwrap();
        buf.commit_row().unwrap();
        assert_eq!(committed(&buf), "t f=1i\n");
    }

    #[test]
    fn test_multiple_fields_and_symbols() {
        let mut buf = Buffer::new();
        buf.begin_row("weather").unwrap();
        buf.symbol("station", "north").unwrap();
        buf.symbol("country", "uk").unwrap();
        buf.field("temp", 22.1).unwrap();
        buf.field("humidity", 65i64).unwrap();
        buf.field("ok", true).unwrap();
        buf.commit_row().unwrap();
        assert_eq!(
            committed(&buf),
            "weather,station=north,country=uk temp=22.1,humidity=65i,ok=true\n"
        );
    }

    #[test]
    fn test_discard_restores_committed_bytes() {
        let mut buf = Buffer::new();
        buf.begin_row("a").unwrap();
        buf.field("f", 1i64).unwrap();
        buf.commit_row().unwrap();
        let before = buf.as_bytes().to_vec();

        buf.begin_row("b").unwrap();
        buf.symbol("s", "v").unwrap();
        buf.field("g", 2i64).unwrap();
        buf.discard_row();

        assert_eq!(buf.as_bytes(), before.as_slice());
        assert_eq!(buf.row_count(), 1);
        assert!(!buf.has_open_row());
    }

    #[test]
    fn test_discard_without_open_row_is_noop() {
        let mut buf = Buffer::new();
        buf.discard_row();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_row_fails_and_leaves_committed_intact() {
        let mut buf = Buffer::new();
        buf.begin_row("a").unwrap();
        buf.field("f", 1i64).unwrap();
        buf.commit_row().unwrap();
        let before = buf.as_bytes().to_vec();

        buf.begin_row("b").unwrap();
        buf.symbol("only", "symbols").unwrap();
        let err = buf.commit_row().unwrap_err();
        assert!(matches!(err, Error::EmptyRow(t) if t == "b"));
        // Row still open; discard rolls back cleanly.
        buf.discard_row();
        assert_eq!(buf.as_bytes(), before.as_slice());
    }

    #[test]
    fn test_symbol_after_field_fails() {
        let mut buf = Buffer::new();
        buf.begin_row("t").unwrap();
        buf.field("f", 1i64).unwrap();
        assert!(matches!(
            buf.symbol("s", "v").unwrap_err(),
            Error::ColumnOrder(_)
        ));
    }

    #[test]
    fn test_duplicate_column_fails() {
        let mut buf = Buffer::new();
        buf.begin_row("t").unwrap();
        buf.symbol("city", "ldn").unwrap();
        assert!(matches!(
            buf.field("city", 1i64).unwrap_err(),
            Error::DuplicateColumn(_)
        ));
    }

    #[test]
    fn test_timestamp_twice_fails() {
        let mut buf = Buffer::new();
        buf.begin_row("t").unwrap();
        buf.field("f", 1i64).unwrap();
        buf.set_timestamp(TimestampNanos::new(1).unwrap()).unwrap();
        assert!(matches!(
            buf.set_timestamp(TimestampNanos::new(2).unwrap()).unwrap_err(),
            Error::TimestampAlreadySet(_)
        ));
    }

    #[test]
    fn test_begin_row_while_open_fails() {
        let mut buf = Buffer::new();
        buf.begin_row("a").unwrap();
        assert!(matches!(
            buf.begin_row("b").unwrap_err(),
            Error::ColumnOrder(_)
        ));
    }

    #[test]
    fn test_calls_without_open_row_fail() {
        let mut buf = Buffer::new();
        assert!(buf.symbol("s", "v").is_err());
        assert!(buf.field("f", 1i64).is_err());
        assert!(buf.set_timestamp(TimestampNanos::new(1).unwrap()).is_err());
        assert!(buf.commit_row().is_err());
    }

    #[test]
    fn test_invalid_table_name() {
        let mut buf = Buffer::new();
        assert!(matches!(
            buf.begin_row("").unwrap_err(),
            Error::InvalidName(_)
        ));
        assert!(matches!(
            buf.begin_row("bad\nname").unwrap_err(),
            Error::InvalidName(_)
        ));
        // Failed begin leaves nothing open.
        assert!(!buf.has_open_row());
    }

    #[test]
    fn test_max_name_len_configurable() {
        let mut buf = Buffer::with_max_name_len(4);
        assert!(buf.begin_row("abcd").is_ok());
        buf.discard_row();
        assert!(buf.begin_row("abcde").is_err());
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut buf = Buffer::new();
        for i in 0..100 {
            buf.begin_row("t").unwrap();
            buf.field("n", i as i64).unwrap();
            buf.commit_row().unwrap();
        }
        let cap = buf.capacity();
        assert!(cap > 0);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.row_count(), 0);
        assert_eq!(buf.capacity(), cap);
    }

    #[test]
    fn test_escaped_row() {
        let mut buf = Buffer::new();
        buf.begin_row("my measurement").unwrap();
        buf.symbol("tag key", "tag,value").unwrap();
        buf.field("field=key", "hello \"world\"").unwrap();
        buf.set_timestamp(TimestampNanos::new(3_000_000_000).unwrap())
            .unwrap();
        buf.commit_row().unwrap();
        assert_eq!(
            committed(&buf),
            "my\\ measurement,tag\\ key=tag\\,value field\\=key=\"hello \\\"world\\\"\" 3000000000\n"
        );
    }

    #[test]
    fn test_bad_symbol_value_rolls_back_column_bytes() {
        let mut buf = Buffer::new();
        buf.begin_row("t").unwrap();
        buf.symbol("ok", "fine").unwrap();
        let before_len = buf.bytes.len();
        assert!(buf.symbol("bad", "new\nline").is_err());
        // The half-written column is gone; the row is still committable.
        assert_eq!(buf.bytes.len(), before_len);
        buf.field("f", 1i64).unwrap();
        buf.commit_row().unwrap();
        assert_eq!(committed(&buf), "t,ok=fine f=1i\n");
    }

    #[test]
    fn test_no_literal_newline_except_terminators() {
        let mut buf = Buffer::new();
        buf.begin_row("t").unwrap();
        buf.field("note", "line one\nline two").unwrap();
        buf.commit_row().unwrap();
        let body = &buf.as_bytes()[..buf.len() - 1];
        assert!(!body.contains(&b'\n'));
    }
}
