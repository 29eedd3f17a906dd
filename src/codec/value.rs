//! Value codec (spec §4.1): four variants, selected per call site and never
//! stored alongside the value — the caller must know the expected encoding
//! for each column family, same as the original's `bytes_value=` parameter
//! threaded through every `DBCore` method
//! (`original_source/core/db_core.py`).

use crate::error::DecodeError;
use byteorder::{ByteOrder, LittleEndian};
use roaring::RoaringBitmap;
use std::io::{Read, Write};

/// `OBJ`: MessagePack of an arbitrary `serde`-representable tree, optionally
/// wrapped in an LZ4 frame. The original compresses every family except
/// `label` (`compress_value=True` for `labels`/`descriptions`/`aliases`/
/// `sitelinks`/`claims`); this crate makes that choice explicit at the call
/// site via the `compressed` flag rather than a per-family global.
pub fn encode_obj<T: serde::Serialize>(value: &T, compressed: bool) -> Vec<u8> {
    let packed = rmp_serde::to_vec_named(value).expect("OBJ value must be msgpack-representable");
    if compressed {
        compress_frame(&packed)
    } else {
        packed
    }
}

pub fn decode_obj<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
    compressed: bool,
) -> Result<T, DecodeError> {
    let raw;
    let packed: &[u8] = if compressed {
        raw = decompress_frame(bytes)?;
        &raw
    } else {
        bytes
    };
    Ok(rmp_serde::from_slice(packed)?)
}

fn compress_frame(data: &[u8]) -> Vec<u8> {
    let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::with_capacity(data.len()));
    encoder
        .write_all(data)
        .expect("writing to an in-memory Vec cannot fail");
    encoder
        .finish()
        .expect("finishing an in-memory LZ4 frame cannot fail")
}

fn decompress_frame(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = lz4_flex::frame::FrameDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(DecodeError::Bitmap)?;
    Ok(out)
}

/// `INT_NUMPY`: a packed little-endian `u32` array. Input is sorted and
/// deduplicated on encode, matching the original's
/// `np.array(sorted(set(value)), dtype=np.uint32).tobytes()`.
pub fn encode_int_numpy(values: impl IntoIterator<Item = u32>) -> Vec<u8> {
    let mut sorted: Vec<u32> = values.into_iter().collect();
    sorted.sort_unstable();
    sorted.dedup();
    let mut bytes = vec![0u8; sorted.len() * 4];
    for (i, v) in sorted.iter().enumerate() {
        LittleEndian::write_u32(&mut bytes[i * 4..i * 4 + 4], *v);
    }
    bytes
}

pub fn decode_int_numpy(bytes: &[u8]) -> Result<Vec<u32>, DecodeError> {
    if bytes.len() % 4 != 0 {
        return Err(DecodeError::NumpyLength(bytes.len()));
    }
    Ok(bytes.chunks_exact(4).map(LittleEndian::read_u32).collect())
}

/// `INT_BITMAP`: a compressed-bitmap serialization of `u32` LocalIDs,
/// suitable for set operations (union/intersection/difference) without a
/// full decode. Analogous to the original's `pyroaring.BitMap.serialize()`.
pub fn encode_int_bitmap(values: impl IntoIterator<Item = u32>) -> Vec<u8> {
    let bitmap: RoaringBitmap = values.into_iter().collect();
    let mut bytes = Vec::with_capacity(bitmap.serialized_size());
    bitmap
        .serialize_into(&mut bytes)
        .expect("writing to an in-memory Vec cannot fail");
    bytes
}

pub fn decode_int_bitmap(bytes: &[u8]) -> Result<RoaringBitmap, DecodeError> {
    RoaringBitmap::deserialize_from(bytes).map_err(DecodeError::Bitmap)
}

/// `PLAIN`: raw UTF-8 bytes, used only for the `label` column family.
pub fn encode_plain(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

pub fn decode_plain(bytes: &[u8]) -> Result<String, DecodeError> {
    Ok(std::str::from_utf8(bytes)?.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn obj_round_trips_uncompressed() {
        let mut value = BTreeMap::new();
        value.insert("en".to_owned(), "Belgium".to_owned());
        value.insert("ja".to_owned(), "ベルギー".to_owned());
        let bytes = encode_obj(&value, false);
        let decoded: BTreeMap<String, String> = decode_obj(&bytes, false).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn obj_round_trips_compressed() {
        let value = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        let bytes = encode_obj(&value, true);
        let decoded: Vec<String> = decode_obj(&bytes, true).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn int_numpy_sorts_and_dedups() {
        let bytes = encode_int_numpy([5, 1, 3, 1, 5]);
        assert_eq!(decode_int_numpy(&bytes).unwrap(), vec![1, 3, 5]);
    }

    #[test]
    fn int_numpy_rejects_truncated_buffers() {
        assert!(decode_int_numpy(&[1, 2, 3]).is_err());
    }

    #[test]
    fn int_bitmap_round_trips() {
        let bytes = encode_int_bitmap([31, 42, 7842]);
        let bitmap = decode_int_bitmap(&bytes).unwrap();
        assert!(bitmap.contains(31));
        assert!(bitmap.contains(42));
        assert!(bitmap.contains(7842));
        assert_eq!(bitmap.len(), 3);
    }

    #[test]
    fn plain_round_trips() {
        let bytes = encode_plain("Belgium");
        assert_eq!(decode_plain(&bytes).unwrap(), "Belgium");
    }
}
