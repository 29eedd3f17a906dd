//! Key codec (spec §4.1): textual keys (UTF-8, truncated to a hard maximum)
//! and integer keys (fixed-width little-endian, 32-bit by default, 64-bit as
//! a per-family option).
//!
//! Mirrors `original_source/core/db_core.py`'s `serialize_key`/
//! `deserialize_key`, which truncates string keys to `cf.LMDB_MAX_KEY` bytes
//! and packs integer keys with `struct.pack("I"|"Q", ...)` (native-endian on
//! the original's little-endian build hosts; this crate pins little-endian
//! explicitly so on-disk layout is portable).

use byteorder::{ByteOrder, LittleEndian};

/// LocalID: the dense 32-bit integer every column family keys by (spec §3).
pub type LocalId = u32;

/// Encode a `LocalId` as a 4-byte little-endian key.
pub fn encode_u32_key(id: LocalId) -> [u8; 4] {
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, id);
    buf
}

/// Decode a 4-byte little-endian `LocalId` key. Panics if `bytes` is not
/// exactly 4 bytes — callers only ever pass keys read back from a table
/// declared with this codec, so a length mismatch indicates a corrupt store.
pub fn decode_u32_key(bytes: &[u8]) -> LocalId {
    LittleEndian::read_u32(bytes)
}

/// Encode a 64-bit key, used by column families that opt into the wider
/// integer-key variant (spec §4.1).
pub fn encode_u64_key(id: u64) -> [u8; 8] {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, id);
    buf
}

pub fn decode_u64_key(bytes: &[u8]) -> u64 {
    LittleEndian::read_u64(bytes)
}

/// Encode a textual key, truncating deterministically to `max_key_bytes`
/// (spec §4.1, §8 boundary behavior: "Values whose UTF-8 key exceeds
/// `max_key_bytes` are truncated deterministically to that byte length").
///
/// Truncation happens on a UTF-8 boundary so the result is always valid
/// UTF-8, even though it may no longer round-trip to the original string.
pub fn encode_text_key(s: &str, max_key_bytes: usize) -> Vec<u8> {
    if s.len() <= max_key_bytes {
        return s.as_bytes().to_vec();
    }
    let mut end = max_key_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.as_bytes()[..end].to_vec()
}
