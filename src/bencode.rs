//! Bencode encoding and decoding ([BEP-3]).
//!
//! Bencode is the serialization format used throughout BitTorrent for
//! structured data: `.torrent` metadata, tracker responses, and extension
//! protocol payloads.
//!
//! Four data types exist:
//!
//! | Type | Format | Example |
//! |------|--------|---------|
//! | Integer | `i<number>e` | `i42e` → 42 |
//! | Byte String | `<length>:<data>` | `4:spam` → "spam" |
//! | List | `l<items>e` | `l4:spami42ee` → ["spam", 42] |
//! | Dictionary | `d<key><value>...e` | `d3:foo3:bare` → {"foo": "bar"} |
//!
//! Dictionaries encode with their keys in sorted byte order, so any decoded
//! value re-encodes to its canonical form.
//!
//! ```
//! use limpet::bencode::{decode, encode, Value};
//!
//! let value = decode(b"d3:foo3:bare").unwrap();
//! assert_eq!(value.get(b"foo").and_then(|v| v.as_str()), Some("bar"));
//! assert_eq!(encode(&value), b"d3:foo3:bare");
//! ```
//!
//! For messages assembled field by field, [`Encoder`] accumulates entries
//! and materializes them on [`flush`](Encoder::flush):
//!
//! ```
//! use limpet::bencode::Encoder;
//!
//! let mut encoder = Encoder::new();
//! encoder.new_map();
//! encoder.put("port", 6881i64);
//! encoder.flush();
//! assert_eq!(encoder.into_bytes(), b"d4:porti6881ee");
//! ```
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod decode;
mod encode;
mod error;
mod value;

pub use decode::decode;
pub use encode::{encode, encode_list, encode_map, Encoder};
pub use error::BencodeError;
pub use value::Value;
