//! Flattening of nested records into single-level key/value maps.
//!
//! Keys are built by joining the path through the original nesting with a
//! [`KeyStyle`]. Sequences are index-flattened: element `i` is keyed exactly
//! as a map entry named `i` would be, so `{"tags": ["a", "b"]}` becomes
//! `tags_0`, `tags_1` under the underscore style. Empty maps and sequences
//! produce no keys.
//!
//! When two paths produce the same key (possible with lossy styles such as
//! underscore joining or lower-casing) the entry visited last wins. Maps are
//! visited in key order, so the outcome is deterministic.

use crate::record::{RecordMap, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Deepest nesting accepted before flattening gives up.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Error, PartialEq)]
pub enum FlattenError {
    #[error("record nesting exceeds {limit} levels at '{path}'")]
    TooDeep { path: String, limit: usize },
}

/// How path segments are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinStyle {
    /// `a.b.c`
    Dot,
    /// `a_b_c`
    Underscore,
    /// `a/b/c`
    Path,
    /// `a[b][c]`
    Rails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStyle {
    pub join: JoinStyle,
    #[serde(default)]
    pub lowercase: bool,
}

impl KeyStyle {
    pub const DOT: KeyStyle = KeyStyle::new(JoinStyle::Dot);
    pub const UNDERSCORE: KeyStyle = KeyStyle::new(JoinStyle::Underscore);
    pub const PATH: KeyStyle = KeyStyle::new(JoinStyle::Path);
    pub const RAILS: KeyStyle = KeyStyle::new(JoinStyle::Rails);

    pub const fn new(join: JoinStyle) -> Self {
        Self {
            join,
            lowercase: false,
        }
    }

    pub const fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }

    fn join(&self, prefix: &str, segment: &str) -> String {
        let segment = if self.lowercase {
            segment.to_lowercase()
        } else {
            segment.to_string()
        };

        if prefix.is_empty() {
            return segment;
        }

        match self.join {
            JoinStyle::Dot => format!("{}.{}", prefix, segment),
            JoinStyle::Underscore => format!("{}_{}", prefix, segment),
            JoinStyle::Path => format!("{}/{}", prefix, segment),
            JoinStyle::Rails => format!("{}[{}]", prefix, segment),
        }
    }
}

impl Default for KeyStyle {
    fn default() -> Self {
        KeyStyle::UNDERSCORE
    }
}

/// A leaf value after flattening.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for Scalar {
    /// Text is written as-is and bytes are decoded as UTF-8 (lossily).
    /// Nil renders as the empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Nil => Ok(()),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::UInt(n) => write!(f, "{}", n),
            Scalar::Float(n) => write!(f, "{}", n),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

pub type FlatRecord = BTreeMap<String, Scalar>;

/// Flatten `record`, prefixing every produced key with `prefix`.
pub fn flatten(
    record: &RecordMap,
    prefix: &str,
    style: KeyStyle,
) -> Result<FlatRecord, FlattenError> {
    let mut out = FlatRecord::new();
    flatten_map(record, prefix, style, 0, &mut out)?;
    Ok(out)
}

fn flatten_map(
    map: &RecordMap,
    prefix: &str,
    style: KeyStyle,
    depth: usize,
    out: &mut FlatRecord,
) -> Result<(), FlattenError> {
    for (key, value) in map {
        flatten_value(value, &style.join(prefix, key), style, depth, out)?;
    }
    Ok(())
}

fn flatten_value(
    value: &Value,
    key: &str,
    style: KeyStyle,
    depth: usize,
    out: &mut FlatRecord,
) -> Result<(), FlattenError> {
    let scalar = match value {
        Value::Map(nested) => {
            check_depth(key, depth)?;
            return flatten_map(nested, key, style, depth + 1, out);
        }
        Value::Seq(items) => {
            check_depth(key, depth)?;
            for (idx, item) in items.iter().enumerate() {
                let item_key = style.join(key, &idx.to_string());
                flatten_value(item, &item_key, style, depth + 1, out)?;
            }
            return Ok(());
        }
        Value::Nil => Scalar::Nil,
        Value::Bool(b) => Scalar::Bool(*b),
        Value::Int(n) => Scalar::Int(*n),
        Value::UInt(n) => Scalar::UInt(*n),
        Value::Float(n) => Scalar::Float(*n),
        Value::Text(s) => Scalar::Text(s.clone()),
        Value::Bytes(b) => Scalar::Bytes(b.clone()),
    };

    out.insert(key.to_string(), scalar);
    Ok(())
}

fn check_depth(path: &str, depth: usize) -> Result<(), FlattenError> {
    if depth >= MAX_DEPTH {
        return Err(FlattenError::TooDeep {
            path: path.to_string(),
            limit: MAX_DEPTH,
        });
    }
    Ok(())
}
