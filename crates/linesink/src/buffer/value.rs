// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 linesink contributors

//! Typed field values and their wire rendering.

use crate::buffer::escape;
use crate::error::Result;
use crate::timestamp::{TimestampMicros, TimestampNanos};

/// A value that can be stored in a field column.
///
/// Wire rendering:
/// - Boolean: `true` / `false`
/// - Integer: suffixed with `i` (e.g. `42i`) so the server does not read it
///   as a float
/// - Float: shortest round-trip decimal form, no suffix
/// - String: double-quoted with context escaping
/// - Timestamp: microseconds suffixed with `t` (e.g. `1700000000000000t`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    /// Boolean value.
    Boolean(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    Str(&'a str),
    /// Microsecond-precision timestamp.
    Timestamp(TimestampMicros),
}

impl FieldValue<'_> {
    /// Append this value's wire form to `out`.
    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        use std::io::Write;
        match self {
            FieldValue::Boolean(true) => out.extend_from_slice(b"true"),
            FieldValue::Boolean(false) => out.extend_from_slice(b"false"),
            FieldValue::Integer(v) => {
                write!(out, "{}i", v).expect("write to Vec cannot fail");
            }
            FieldValue::Float(v) => {
                // `{}` renders the shortest form that parses back exactly;
                // a bare `1` is still a float on the wire (no suffix).
                write!(out, "{}", v).expect("write to Vec cannot fail");
            }
            FieldValue::Str(s) => escape::write_quoted_string(out, s)?,
            FieldValue::Timestamp(ts) => {
                write!(out, "{}t", ts.as_i64()).expect("write to Vec cannot fail");
            }
        }
        Ok(())
    }
}

impl From<bool> for FieldValue<'_> {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<i64> for FieldValue<'_> {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue<'_> {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v.into())
    }
}

impl From<f64> for FieldValue<'_> {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl<'a> From<&'a str> for FieldValue<'a> {
    fn from(v: &'a str) -> Self {
        FieldValue::Str(v)
    }
}

impl<'a> From<&'a String> for FieldValue<'a> {
    fn from(v: &'a String) -> Self {
        FieldValue::Str(v.as_str())
    }
}

impl From<TimestampMicros> for FieldValue<'_> {
    fn from(v: TimestampMicros) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl From<TimestampNanos> for FieldValue<'_> {
    fn from(v: TimestampNanos) -> Self {
        FieldValue::Timestamp(v.into())
    }
}
