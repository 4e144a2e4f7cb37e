use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::{debug, warn};

use super::value::Value;

/// Encodes a bencode value to a byte vector.
///
/// The output follows the canonical bencode format:
/// - Integers: `i<number>e`
/// - Byte strings: `<length>:<data>`
/// - Lists: `l<items>e`
/// - Dictionaries: `d<key><value>...e` (keys sorted lexicographically)
///
/// Encoding cannot fail: every [`Value`] has exactly one wire form.
///
/// # Examples
///
/// ```
/// use limpet::bencode::{encode, Value};
///
/// assert_eq!(encode(&Value::Integer(42)), b"i42e");
/// assert_eq!(encode(&Value::Integer(-5)), b"i-5e");
/// assert_eq!(encode(&Value::string("hello")), b"5:hello");
///
/// let list = Value::List(vec![Value::Integer(1), Value::string("two")]);
/// assert_eq!(encode(&list), b"li1e3:twoe");
/// ```
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Integer(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Bytes(b) => write_bytes(b, out),
        Value::List(l) => {
            out.push(b'l');
            for item in l {
                write_value(item, out);
            }
            out.push(b'e');
        }
        Value::Dict(d) => {
            out.push(b'd');
            for (key, val) in d {
                write_bytes(key, out);
                write_value(val, out);
            }
            out.push(b'e');
        }
    }
}

fn write_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
}

enum Context {
    Map(BTreeMap<Bytes, Value>),
    List(Vec<Value>),
}

/// An accumulating bencode encoder.
///
/// [`new_map`](Encoder::new_map) or [`new_list`](Encoder::new_list) opens a
/// context, [`put`](Encoder::put) and [`push`](Encoder::push) append to it,
/// and [`flush`](Encoder::flush) writes the accumulated structure to the
/// output buffer. Appends without a matching open context are ignored with a
/// diagnostic rather than failing. The output is retrieved exactly once:
/// [`into_bytes`](Encoder::into_bytes) and
/// [`into_string`](Encoder::into_string) consume the encoder.
///
/// # Examples
///
/// ```
/// use limpet::bencode::Encoder;
///
/// let mut encoder = Encoder::new();
/// encoder.new_map();
/// encoder.put("port", 6881i64);
/// encoder.put("v", "limpet");
/// encoder.flush();
///
/// assert_eq!(encoder.into_bytes(), b"d4:porti6881e1:v6:limpete");
/// ```
#[derive(Default)]
pub struct Encoder {
    context: Option<Context>,
    out: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a fresh dictionary context, replacing any previous one.
    pub fn new_map(&mut self) -> &mut Self {
        self.context = Some(Context::Map(BTreeMap::new()));
        self
    }

    /// Opens a fresh list context, replacing any previous one.
    pub fn new_list(&mut self) -> &mut Self {
        self.context = Some(Context::List(Vec::new()));
        self
    }

    /// Adds an entry to the open dictionary context.
    ///
    /// Ignored when no dictionary context is open.
    pub fn put(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        match self.context {
            Some(Context::Map(ref mut map)) => {
                map.insert(Bytes::copy_from_slice(key.as_bytes()), value.into());
            }
            _ => debug!(key, "bencode put without an open dictionary"),
        }
        self
    }

    /// Appends a value to the open list context.
    ///
    /// Ignored when no list context is open.
    pub fn push(&mut self, value: impl Into<Value>) -> &mut Self {
        match self.context {
            Some(Context::List(ref mut list)) => list.push(value.into()),
            _ => debug!("bencode push without an open list"),
        }
        self
    }

    /// Writes the accumulated context to the output buffer.
    ///
    /// The context stays open, so further appends and flushes are possible.
    pub fn flush(&mut self) -> &mut Self {
        match self.context {
            Some(Context::Map(ref map)) => out_dict(map, &mut self.out),
            Some(Context::List(ref list)) => out_list(list, &mut self.out),
            None => warn!("bencode flush without an open context"),
        }
        self
    }

    /// Writes a dictionary directly to the output buffer.
    pub fn build_map(&mut self, map: &BTreeMap<Bytes, Value>) -> &mut Self {
        out_dict(map, &mut self.out);
        self
    }

    /// Writes a list directly to the output buffer.
    pub fn build_list(&mut self, list: &[Value]) -> &mut Self {
        out_list(list, &mut self.out);
        self
    }

    /// Appends raw bytes to the output buffer, unframed.
    pub fn build_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.out.extend_from_slice(bytes);
        self
    }

    /// Consumes the encoder and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    /// Consumes the encoder and returns the output as a string, replacing
    /// invalid UTF-8 sequences.
    pub fn into_string(self) -> String {
        String::from_utf8_lossy(&self.out).into_owned()
    }
}

fn out_dict(map: &BTreeMap<Bytes, Value>, out: &mut Vec<u8>) {
    out.push(b'd');
    for (key, val) in map {
        write_bytes(key, out);
        write_value(val, out);
    }
    out.push(b'e');
}

fn out_list(list: &[Value], out: &mut Vec<u8>) {
    out.push(b'l');
    for item in list {
        write_value(item, out);
    }
    out.push(b'e');
}

/// Encodes a dictionary in one call.
pub fn encode_map(map: &BTreeMap<Bytes, Value>) -> Vec<u8> {
    let mut out = Vec::new();
    out_dict(map, &mut out);
    out
}

/// Encodes a list in one call.
pub fn encode_list(list: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    out_list(list, &mut out);
    out
}
