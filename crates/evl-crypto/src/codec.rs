use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use evl_types::{Digest, Event};

/// The immutable envelope fields of an event that feed its hash.
#[derive(Clone, Copy, Debug)]
pub struct Envelope<'a> {
    pub specversion: &'a str,
    pub id: u64,
    pub time: &'a DateTime<Utc>,
    pub source: &'a str,
    pub subject: &'a str,
    pub event_type: &'a str,
    pub datacontenttype: &'a str,
}

impl<'a> Envelope<'a> {
    /// Borrow the envelope of a committed event.
    pub fn of(event: &'a Event) -> Self {
        Self {
            specversion: &event.specversion,
            id: event.id,
            time: &event.time,
            source: &event.source,
            subject: &event.subject,
            event_type: &event.event_type,
            datacontenttype: &event.datacontenttype,
        }
    }
}

/// Fixed field order of the digest input. Never reorder: every stored hash
/// depends on it.
#[derive(Serialize)]
struct DigestLayout<'a> {
    specversion: &'a str,
    id: u64,
    time: String,
    source: &'a str,
    subject: &'a str,
    event_type: &'a str,
    datacontenttype: &'a str,
    predecessorhash: [u8; 32],
    content_digest: [u8; 32],
}

/// Serialize an envelope, its predecessor hash, and its content digest into
/// the exact bytes that are hashed.
///
/// The encoding is bincode over a fixed struct: integers are little-endian,
/// strings carry a u64 length prefix, digests are raw 32-byte arrays. No map
/// is involved, so the output depends only on field values.
pub fn digest_input(
    envelope: &Envelope<'_>,
    predecessor: &Digest,
    content_digest: &Digest,
) -> Result<Vec<u8>, CodecError> {
    let layout = DigestLayout {
        specversion: envelope.specversion,
        id: envelope.id,
        time: format_time(envelope.time),
        source: envelope.source,
        subject: envelope.subject,
        event_type: envelope.event_type,
        datacontenttype: envelope.datacontenttype,
        predecessorhash: *predecessor.as_bytes(),
        content_digest: *content_digest.as_bytes(),
    };
    bincode::serialize(&layout).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// RFC 3339 with nanosecond precision and a `Z` suffix.
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Canonical JSON encoding of a payload document.
///
/// Object keys are sorted bytewise at every level, no whitespace is emitted,
/// and floats with an integral value are written as integers, so `1.0` and
/// `1` digest identically.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

/// Largest integer magnitude an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String(key.clone()), out)?;
                out.push(b':');
                write_canonical(&map[key], out)?;
            }
            out.push(b'}');
            Ok(())
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
            Ok(())
        }
        Value::Number(number) if number.is_f64() => {
            match number.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => {
                    out.extend_from_slice((f as i64).to_string().as_bytes());
                    Ok(())
                }
                _ => write_scalar(value, out),
            }
        }
        _ => write_scalar(value, out),
    }
}

fn write_scalar(value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    serde_json::to_writer(&mut *out, value).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Errors from digest input encoding.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
