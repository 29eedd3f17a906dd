//! The identifier dictionary (spec §4.3, "L2"): a static ordered-string
//! structure giving `local_of(string) -> LocalId` and the dual
//! `string_of(LocalId) -> string`, persisted to one file and loaded via
//! memory mapping.
//!
//! Built once from a deduplicated, sorted set of entity-ID strings. The
//! forward direction is an [`fst::Map`] (string → its rank in sort order);
//! the reverse direction is a sorted offsets/blob table addressed directly
//! by rank, since an FST alone has no efficient reverse lookup. Ranks are
//! assigned in sorted order, so the two structures always agree — this is
//! the direct analogue of `marisa_trie.Trie`, which supports both
//! `trie.get(key)` and `trie.restore_key(id)` natively
//! (`original_source/core/db_wd.py`).

use crate::codec::LocalId;
use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const HEADER_LEN: u64 = 32;

/// A static minimal ordered-string dictionary, memory-mapped from disk.
/// Immutable after construction (spec §4.3's invariant).
pub struct Dictionary {
    map: fst::Map<Mmap>,
    offsets: Mmap,
    blob: Mmap,
    len: u32,
}

impl Dictionary {
    /// Build a dictionary from a deduplicated, sorted iterator of entity-ID
    /// strings and persist it to `path`, then open it via memory mapping.
    ///
    /// # Panics
    /// Panics (in debug builds, via `debug_assert!`) if `strings` is not
    /// already sorted and deduplicated — callers are expected to collect
    /// into a `BTreeSet<String>` first, as ingestion Stage A does.
    pub fn build(strings: impl IntoIterator<Item = String>, path: &Path) -> Result<Dictionary> {
        let strings: Vec<String> = strings.into_iter().collect();
        debug_assert!(
            strings.windows(2).all(|w| w[0] < w[1]),
            "Dictionary::build requires sorted, deduplicated input"
        );

        let mut offsets = Vec::with_capacity((strings.len() + 1) * 4);
        offsets.extend_from_slice(&0u32.to_le_bytes());
        let mut blob = Vec::new();
        for s in &strings {
            blob.extend_from_slice(s.as_bytes());
            let offset: u32 = blob
                .len()
                .try_into()
                .expect("dictionary blob exceeds 4 GiB, split the dump");
            offsets.extend_from_slice(&offset.to_le_bytes());
        }

        let mut fst_bytes = Vec::new();
        {
            let mut builder = fst::MapBuilder::new(&mut fst_bytes)?;
            for (rank, s) in strings.iter().enumerate() {
                builder.insert(s.as_bytes(), rank as u64)?;
            }
            builder.finish()?;
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let mut header = [0u8; HEADER_LEN as usize];
        LittleEndian::write_u64(&mut header[0..8], strings.len() as u64);
        LittleEndian::write_u64(&mut header[8..16], fst_bytes.len() as u64);
        LittleEndian::write_u64(&mut header[16..24], offsets.len() as u64);
        LittleEndian::write_u64(&mut header[24..32], blob.len() as u64);
        writer.write_all(&header)?;
        writer.write_all(&fst_bytes)?;
        writer.write_all(&offsets)?;
        writer.write_all(&blob)?;
        writer.flush()?;
        drop(writer);

        Dictionary::open(path)
    }

    /// Open a previously built dictionary file via memory mapping.
    pub fn open(path: &Path) -> Result<Dictionary> {
        let file = File::open(path)?;
        let header_map = unsafe { MmapOptions::new().len(HEADER_LEN as usize).map(&file)? };
        let len = LittleEndian::read_u64(&header_map[0..8]);
        let fst_len = LittleEndian::read_u64(&header_map[8..16]);
        let offsets_len = LittleEndian::read_u64(&header_map[16..24]);
        let blob_len = LittleEndian::read_u64(&header_map[24..32]);
        drop(header_map);

        let fst_mmap = unsafe {
            MmapOptions::new()
                .offset(HEADER_LEN)
                .len(fst_len as usize)
                .map(&file)?
        };
        let offsets = unsafe {
            MmapOptions::new()
                .offset(HEADER_LEN + fst_len)
                .len(offsets_len as usize)
                .map(&file)?
        };
        let blob = unsafe {
            MmapOptions::new()
                .offset(HEADER_LEN + fst_len + offsets_len)
                .len(blob_len as usize)
                .map(&file)?
        };

        let map = fst::Map::new(fst_mmap).map_err(Error::Dictionary)?;

        Ok(Dictionary {
            map,
            offsets,
            blob,
            len: len
                .try_into()
                .expect("dictionary entity count exceeds u32::MAX"),
        })
    }

    /// `local_of(string) -> LocalId?`. Undefined (returns `None`) for
    /// strings outside the dictionary.
    pub fn local_of(&self, s: &str) -> Option<LocalId> {
        self.map.get(s.as_bytes()).map(|v| v as LocalId)
    }

    /// `string_of(LocalId) -> string`. Panics only if `id` is out of range
    /// — callers that hold an `id` read back from any column family are
    /// guaranteed it came from this dictionary (spec §3's "every entity
    /// referenced anywhere... must have a LocalID").
    pub fn string_of(&self, id: LocalId) -> Option<&str> {
        if id >= self.len {
            return None;
        }
        let start = self.offset_at(id) as usize;
        let end = self.offset_at(id + 1) as usize;
        std::str::from_utf8(&self.blob[start..end]).ok()
    }

    fn offset_at(&self, rank: u32) -> u32 {
        let at = rank as usize * 4;
        LittleEndian::read_u32(&self.offsets[at..at + 4])
    }

    /// Total number of entities in the dictionary.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate all strings in sorted order.
    pub fn iter_strings(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.len).map(move |id| self.string_of(id).expect("rank in range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample_ids() -> BTreeSet<String> {
        ["P31", "P279", "Q31", "Q5", "Q7842", "Q2983844", "Q6581097", "Q3624078"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn round_trips_every_string() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict.bin");
        let strings = sample_ids();
        let dict = Dictionary::build(strings.clone(), &path).unwrap();

        assert_eq!(dict.len(), strings.len() as u32);
        for s in &strings {
            let id = dict.local_of(s).expect("known string resolves");
            assert_eq!(dict.string_of(id).unwrap(), s);
        }
    }

    #[test]
    fn unknown_string_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict.bin");
        let dict = Dictionary::build(sample_ids(), &path).unwrap();
        assert_eq!(dict.local_of("Q999999999"), None);
    }

    #[test]
    fn reopen_after_build_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict.bin");
        let strings = sample_ids();
        {
            Dictionary::build(strings.clone(), &path).unwrap();
        }
        let reopened = Dictionary::open(&path).unwrap();
        for s in &strings {
            let id = reopened.local_of(s).unwrap();
            assert_eq!(reopened.string_of(id).unwrap(), s);
        }
    }

    #[test]
    fn iter_strings_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict.bin");
        let dict = Dictionary::build(sample_ids(), &path).unwrap();
        let collected: Vec<&str> = dict.iter_strings().collect();
        let mut sorted = collected.clone();
        sorted.sort_unstable();
        assert_eq!(collected, sorted);
    }
}
