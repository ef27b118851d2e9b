//! Frame codec: wire form to structured form and back.
//!
//! Frames travel in one of two wire encodings. Text frames are plain UTF-8
//! JSON documents. Binary frames are GLB-style containers: a 12-byte header
//! (magic, container version, total length) followed by a JSON chunk and an
//! optional opaque binary tail holding bulk data referenced from the JSON.
//!
//! The codec is a set of stateless functions. It never interprets frame
//! content beyond the timestamps it rewrites for loop rebasing; the binary
//! tail passes through decode/encode byte for byte.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;

use crate::error::{Result, StreamError};

/// Container magic, `glTF` little-endian.
const GLB_MAGIC: u32 = 0x4654_6C67;
/// Container version we emit. Decoding accepts any version.
const GLB_VERSION: u32 = 2;
/// JSON chunk type, `JSON` little-endian.
const CHUNK_JSON: u32 = 0x4E4F_534A;

const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

/// Wire encoding of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncoding {
    /// GLB container, sent as a binary transport message.
    Binary,
    /// JSON document, sent as a text transport message.
    Text,
}

/// A frame as it crosses the transport: one websocket message.
#[derive(Debug, Clone, PartialEq)]
pub enum WirePayload {
    Binary(Bytes),
    Text(String),
}

impl WirePayload {
    /// The encoding tag this payload carries.
    pub fn encoding(&self) -> FrameEncoding {
        match self {
            WirePayload::Binary(_) => FrameEncoding::Binary,
            WirePayload::Text(_) => FrameEncoding::Text,
        }
    }
}

/// A frame unpacked into editable form.
///
/// `tail` is the binary chunk region of a GLB container, preserved verbatim
/// so re-encoding after a timestamp rewrite does not disturb bulk data.
/// Always empty for text frames.
#[derive(Debug, Clone)]
pub struct StructuredFrame {
    pub json: Value,
    pub encoding: FrameEncoding,
    pub tail: Bytes,
}

/// Unpack a wire payload into structured form.
///
/// # Errors
///
/// Returns [`StreamError::MalformedFrame`] when a binary payload is not a
/// valid container, and [`StreamError::Codec`] when the JSON itself does
/// not parse.
pub fn unpack(payload: &WirePayload) -> Result<StructuredFrame> {
    match payload {
        WirePayload::Binary(bytes) => {
            let (json, tail) = decode_container(bytes)?;
            Ok(StructuredFrame { json, encoding: FrameEncoding::Binary, tail })
        }
        WirePayload::Text(text) => {
            let json = serde_json::from_str(text)
                .map_err(|e| StreamError::codec("text frame", e))?;
            Ok(StructuredFrame { json, encoding: FrameEncoding::Text, tail: Bytes::new() })
        }
    }
}

/// Pack a structured frame back into its wire form.
pub fn pack(frame: &StructuredFrame) -> Result<WirePayload> {
    match frame.encoding {
        FrameEncoding::Binary => Ok(WirePayload::Binary(encode_container(&frame.json, &frame.tail)?)),
        FrameEncoding::Text => {
            let text = serde_json::to_string(&frame.json)
                .map_err(|e| StreamError::codec("text frame", e))?;
            Ok(WirePayload::Text(text))
        }
    }
}

/// Shift every update timestamp in a frame's structured form by `offset_ms`.
///
/// Rewrites `data.updates[*].timestamp` and each nested
/// `time_series[*].timestamp`. Fields that are absent or non-numeric are
/// left alone.
pub fn rebase_timestamps(json: &mut Value, offset_ms: f64) {
    let Some(updates) = json
        .get_mut("data")
        .and_then(|d| d.get_mut("updates"))
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    for update in updates {
        shift_number(update, "timestamp", offset_ms);

        if let Some(series) = update.get_mut("time_series").and_then(Value::as_array_mut) {
            for entry in series {
                shift_number(entry, "timestamp", offset_ms);
            }
        }
    }
}

fn shift_number(obj: &mut Value, key: &str, offset: f64) {
    if let Some(ts) = obj.get(key).and_then(Value::as_f64) {
        obj[key] = Value::from(ts + offset);
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn decode_container(bytes: &Bytes) -> Result<(Value, Bytes)> {
    if bytes.len() < HEADER_LEN + CHUNK_HEADER_LEN {
        return Err(StreamError::malformed(format!(
            "container truncated: {} bytes",
            bytes.len()
        )));
    }

    if read_u32(bytes, 0) != GLB_MAGIC {
        return Err(StreamError::malformed("bad container magic"));
    }

    let declared_len = read_u32(bytes, 8) as usize;
    if declared_len > bytes.len() {
        return Err(StreamError::malformed(format!(
            "container declares {declared_len} bytes, got {}",
            bytes.len()
        )));
    }

    let chunk_len = read_u32(bytes, HEADER_LEN) as usize;
    let chunk_type = read_u32(bytes, HEADER_LEN + 4);
    if chunk_type != CHUNK_JSON {
        return Err(StreamError::malformed("first chunk is not JSON"));
    }

    let json_start = HEADER_LEN + CHUNK_HEADER_LEN;
    let json_end = json_start
        .checked_add(chunk_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| StreamError::malformed("JSON chunk overruns container"))?;

    let json = serde_json::from_slice(&bytes[json_start..json_end])
        .map_err(|e| StreamError::codec("binary frame JSON chunk", e))?;

    let tail = bytes.slice(json_end..);
    Ok((json, tail))
}

fn encode_container(json: &Value, tail: &Bytes) -> Result<Bytes> {
    let mut doc = serde_json::to_vec(json).map_err(|e| StreamError::codec("binary frame", e))?;
    // JSON chunks are padded to 4-byte alignment with spaces.
    while doc.len() % 4 != 0 {
        doc.push(b' ');
    }

    let total = HEADER_LEN + CHUNK_HEADER_LEN + doc.len() + tail.len();
    let mut out = BytesMut::with_capacity(total);
    out.put_u32_le(GLB_MAGIC);
    out.put_u32_le(GLB_VERSION);
    out.put_u32_le(total as u32);
    out.put_u32_le(doc.len() as u32);
    out.put_u32_le(CHUNK_JSON);
    out.put_slice(&doc);
    out.put_slice(tail);
    Ok(out.freeze())
}
