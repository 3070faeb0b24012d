use super::{RawRecord, RecordMap, Value};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("line {line}: invalid JSON: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: expected [timestamp, {{...}}] or {{...}}, got {found}")]
    Shape { line: usize, found: &'static str },

    #[error("line {line}: input is not valid UTF-8")]
    Utf8 { line: usize },
}

/// Yields records from one framed chunk handed over by the host.
///
/// Decoding is sequential; callers stop at the first error and keep whatever
/// was already decoded.
pub trait RecordDecoder {
    fn next_record(&mut self) -> Option<Result<RawRecord, DecodeError>>;
}

/// Decoder for newline-delimited JSON chunks.
///
/// Each non-blank line is either `[timestamp, {...}]` or a bare object. The
/// timestamp may be integer or fractional epoch seconds, an object
/// `{"sec": .., "nsec": ..}`, or an RFC 3339 string; anything else is
/// replaced by the current time.
pub struct JsonLinesDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> JsonLinesDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            line: 0,
        }
    }

    fn next_line(&mut self) -> Option<&'a [u8]> {
        if self.pos >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.pos..];
        let end = rest.iter().position(|b| *b == b'\n').unwrap_or(rest.len());
        self.pos += end + 1;
        self.line += 1;
        Some(&rest[..end])
    }

    fn decode_line(line_no: usize, raw: &[u8]) -> Result<RawRecord, DecodeError> {
        let json: serde_json::Value = serde_json::from_slice(raw)
            .map_err(|source| DecodeError::Json { line: line_no, source })?;

        match json {
            serde_json::Value::Object(fields) => Ok(RawRecord {
                timestamp: Utc::now(),
                body: into_record_map(fields),
            }),
            serde_json::Value::Array(mut items) if items.len() == 2 => {
                let body = items.pop();
                let ts = items.pop();
                match (ts, body) {
                    (Some(ts), Some(serde_json::Value::Object(fields))) => Ok(RawRecord {
                        timestamp: parse_timestamp(&ts).unwrap_or_else(Utc::now),
                        body: into_record_map(fields),
                    }),
                    _ => Err(DecodeError::Shape {
                        line: line_no,
                        found: "array without an object body",
                    }),
                }
            }
            other => Err(DecodeError::Shape {
                line: line_no,
                found: json_kind(&other),
            }),
        }
    }
}

impl RecordDecoder for JsonLinesDecoder<'_> {
    fn next_record(&mut self) -> Option<Result<RawRecord, DecodeError>> {
        while let Some(raw) = self.next_line() {
            let line_no = self.line;
            let raw = match std::str::from_utf8(raw) {
                Ok(s) => s.trim(),
                Err(_) => return Some(Err(DecodeError::Utf8 { line: line_no })),
            };
            if raw.is_empty() {
                continue;
            }
            return Some(Self::decode_line(line_no, raw.as_bytes()));
        }
        None
    }
}

fn into_record_map(fields: serde_json::Map<String, serde_json::Value>) -> RecordMap {
    fields
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Interpret a host timestamp. Returns `None` for unknown shapes.
pub fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                DateTime::from_timestamp(secs, 0)
            } else {
                let f = n.as_f64()?;
                let secs = f.floor();
                let nanos = ((f - secs) * 1_000_000_000.0).round() as u32;
                DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
            }
        }
        serde_json::Value::Object(fields) => {
            let secs = fields.get("sec")?.as_i64()?;
            let nanos = fields.get("nsec").and_then(|n| n.as_u64()).unwrap_or(0);
            DateTime::from_timestamp(secs, u32::try_from(nanos).ok()?)
        }
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}
