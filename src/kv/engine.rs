//! The KV engine (spec §4.2, "L1"): a thin wrapper over an embedded
//! memory-mapped ordered KV store exposing multiple named sub-tables, read
//! transactions, bulk write transactions, prefix/range iteration, and an
//! automatic map-size-growth retry on "database full".
//!
//! Every table is opened as a raw `ByteSlice -> ByteSlice` sub-database —
//! the `Engine` itself is byte-agnostic; what the bytes mean is entirely the
//! codec layer's concern (spec §4.1), mirroring `meilisearch-milli`'s
//! `Index` struct, which wraps one `heed::Env` with several named
//! `Database<KC, DC>` fields (`examples/other_examples/...milli-src-index.rs`).

use crate::error::{Error, Result};
use crate::kv::tables;
use heed::types::ByteSlice;
use heed::{Env, EnvOpenOptions};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Fixed map-growth increment on "map full", matching the original's
/// `cf.SIZE_1GB * 5` (`original_source/core/db_core.py::write_bulk`).
const MAP_GROWTH_INCREMENT: usize = 5 * 1024 * 1024 * 1024;

/// The original retries `write_bulk` unboundedly on repeated `MapFullError`.
/// This crate bounds the retry count, since an environment that cannot grow
/// enough in three 5 GiB steps has a more fundamental problem than transient
/// exhaustion (see DESIGN.md).
const MAX_GROWTH_ATTEMPTS: u32 = 3;

type RawDb = heed::Database<ByteSlice, ByteSlice>;

/// Merge policy for [`Engine::update_bulk_buffered`], spec §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Union of decoded `INT_NUMPY` collections; skips the write entirely
    /// when the incoming set is already a subset of the stored set.
    Set,
    /// Append-to-collection, used by counters.
    Counter,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UpdateStats {
    pub new: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Wraps one LMDB environment and its named column families.
pub struct Engine {
    env: Env,
    tables: HashMap<&'static str, RawDb>,
}

impl Engine {
    /// Open (creating if absent) the KV file at `path` with every table
    /// from [`tables::ALL`]. `path` names the file itself — the store has
    /// no subdirectory (spec §4.2, §6).
    pub fn open(path: &Path, map_size_bytes: u64, max_tables: u32) -> Result<Engine> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // single file (no subdir), asynchronous writeback (requires WRITEMAP),
        // no inter-process lock — matches `lmdb.open(..., map_async=True,
        // subdir=False, lock=False, ...)` in `original_source/core/db_core.py`.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size_bytes as usize)
                .max_dbs(max_tables)
                .flag(heed::flags::Flags::MdbNoSubDir)
                .flag(heed::flags::Flags::MdbWriteMap)
                .flag(heed::flags::Flags::MdbMapAsync)
                .flag(heed::flags::Flags::MdbNoLock)
                .open(path)?
        };

        let mut tables = HashMap::new();
        for &name in tables::ALL {
            let db: RawDb = env.create_database(Some(name))?;
            tables.insert(name, db);
        }

        Ok(Engine { env, tables })
    }

    fn table(&self, name: &str) -> &RawDb {
        self.tables
            .get(name)
            .unwrap_or_else(|| panic!("unknown table {name:?}"))
    }

    pub fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let rtxn = self.env.read_txn()?;
        Ok(self.table(table).get(&rtxn, key)?.map(<[u8]>::to_vec))
    }

    pub fn get_multi(&self, table: &str, keys: &[Vec<u8>]) -> Result<HashMap<Vec<u8>, Vec<u8>>> {
        let rtxn = self.env.read_txn()?;
        let db = self.table(table);
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = db.get(&rtxn, key)? {
                out.insert(key.clone(), value.to_vec());
            }
        }
        Ok(out)
    }

    pub fn contains(&self, table: &str, key: &[u8]) -> Result<bool> {
        let rtxn = self.env.read_txn()?;
        Ok(self.table(table).get(&rtxn, key)?.is_some())
    }

    /// The value's length without deserializing it, used by the query
    /// planner's posting-size estimate (spec §4.5, step 1).
    pub fn value_size(&self, table: &str, key: &[u8]) -> Result<Option<usize>> {
        let rtxn = self.env.read_txn()?;
        Ok(self.table(table).get(&rtxn, key)?.map(<[u8]>::len))
    }

    pub fn range(&self, table: &str, from: &[u8], to: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let rtxn = self.env.read_txn()?;
        let db = self.table(table);
        let mut out = Vec::new();
        for item in db.range(&rtxn, &(from..to))? {
            let (key, value) = item?;
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    pub fn prefix(&self, table: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let rtxn = self.env.read_txn()?;
        let db = self.table(table);
        let mut out = Vec::new();
        for item in db.prefix_iter(&rtxn, prefix)? {
            let (key, value) = item?;
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    pub fn delete(&self, table: &str, key: &[u8]) -> Result<bool> {
        let mut wtxn = self.env.write_txn()?;
        let deleted = self.table(table).delete(&mut wtxn, key)?;
        wtxn.commit()?;
        Ok(deleted)
    }

    pub fn delete_prefix(&self, table: &str, prefix: &[u8]) -> Result<usize> {
        let keys: Vec<Vec<u8>> = self
            .prefix(table, prefix)?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        let mut wtxn = self.env.write_txn()?;
        let db = self.table(table);
        let mut removed = 0;
        for key in &keys {
            if db.delete(&mut wtxn, key)? {
                removed += 1;
            }
        }
        wtxn.commit()?;
        Ok(removed)
    }

    /// One write transaction, optionally pre-sorted for insertion locality
    /// (spec §4.2). Recovers from "map full" by growing the map and
    /// retrying; degrades to per-key `put` on a persistent transaction
    /// error.
    pub fn write_bulk(
        &self,
        table: &str,
        mut pairs: Vec<(Vec<u8>, Vec<u8>)>,
        sort_key: bool,
    ) -> Result<usize> {
        if sort_key {
            pairs.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        }
        self.write_bulk_attempt(table, pairs, 0)
    }

    fn write_bulk_attempt(
        &self,
        table: &str,
        pairs: Vec<(Vec<u8>, Vec<u8>)>,
        growth_attempts: u32,
    ) -> Result<usize> {
        let db = self.table(table);
        let attempted = pairs.len();
        let outcome: heed::Result<()> = (|| {
            let mut wtxn = self.env.write_txn()?;
            for (key, value) in &pairs {
                db.put(&mut wtxn, key, value)?;
            }
            wtxn.commit()
        })();

        match outcome {
            Ok(()) => Ok(attempted),
            Err(heed::Error::Mdb(heed::MdbError::MapFull)) => {
                if growth_attempts >= MAX_GROWTH_ATTEMPTS {
                    return Err(Error::MapFull {
                        attempts: growth_attempts,
                    });
                }
                let current = self.env.info().map_size;
                tracing::warn!(
                    table,
                    growth_attempts,
                    current_map_size = current,
                    "map full, growing and retrying"
                );
                unsafe {
                    self.env.resize(current + MAP_GROWTH_INCREMENT)?;
                }
                self.write_bulk_attempt(table, pairs, growth_attempts + 1)
            }
            Err(err) => {
                tracing::warn!(
                    table,
                    error = %err,
                    "bulk write transaction failed, degrading to per-key put"
                );
                let mut written = 0;
                for (key, value) in &pairs {
                    if self.put_one(db, key, value).is_ok() {
                        written += 1;
                    }
                }
                Ok(written)
            }
        }
    }

    fn put_one(&self, db: &RawDb, key: &[u8], value: &[u8]) -> heed::Result<()> {
        let mut wtxn = self.env.write_txn()?;
        db.put(&mut wtxn, key, value)?;
        wtxn.commit()
    }

    /// Streaming variant of [`Engine::write_bulk`] that flushes whenever
    /// the accumulated `sum(len(k)+len(v))` exceeds `budget`.
    pub fn write_bulk_buffered(
        &self,
        table: &str,
        pairs: impl IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
        budget: u64,
    ) -> Result<usize> {
        let mut buffer = Vec::new();
        let mut buffered_bytes = 0u64;
        let mut total = 0;
        for (key, value) in pairs {
            buffered_bytes += (key.len() + value.len()) as u64;
            buffer.push((key, value));
            if buffered_bytes >= budget {
                total += self.write_bulk(table, std::mem::take(&mut buffer), true)?;
                buffered_bytes = 0;
            }
        }
        if !buffer.is_empty() {
            total += self.write_bulk(table, buffer, true)?;
        }
        Ok(total)
    }

    /// Read-modify-write over `INT_NUMPY`-encoded collections (spec §4.2).
    pub fn update_bulk_buffered(
        &self,
        table: &str,
        updates: impl IntoIterator<Item = (Vec<u8>, Vec<u32>)>,
        policy: MergePolicy,
        budget: u64,
    ) -> Result<UpdateStats> {
        let mut buffer: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let mut buffered_bytes = 0u64;
        let mut stats = UpdateStats::default();

        for (key, incoming) in updates {
            let existing = self.get(table, &key)?;
            let Some(encoded) = self.merge_one(&existing, incoming, policy, &mut stats)? else {
                continue;
            };
            buffered_bytes += (key.len() + encoded.len()) as u64;
            buffer.push((key, encoded));
            if buffered_bytes >= budget {
                self.write_bulk(table, std::mem::take(&mut buffer), true)?;
                buffered_bytes = 0;
            }
        }
        if !buffer.is_empty() {
            self.write_bulk(table, buffer, true)?;
        }
        Ok(stats)
    }

    fn merge_one(
        &self,
        existing: &Option<Vec<u8>>,
        incoming: Vec<u32>,
        policy: MergePolicy,
        stats: &mut UpdateStats,
    ) -> Result<Option<Vec<u8>>> {
        let Some(bytes) = existing else {
            stats.new += 1;
            return Ok(Some(crate::codec::value::encode_int_numpy(incoming)));
        };

        let decode = |bytes: &[u8]| -> Result<Vec<u32>> {
            crate::codec::value::decode_int_numpy(bytes).map_err(|source| Error::Decode {
                table: "update_bulk_buffered",
                source,
            })
        };

        match policy {
            MergePolicy::Set => {
                let current: BTreeSet<u32> = decode(bytes)?.into_iter().collect();
                if incoming.iter().all(|v| current.contains(v)) {
                    stats.skipped += 1;
                    return Ok(None);
                }
                stats.updated += 1;
                let merged: BTreeSet<u32> = current.into_iter().chain(incoming).collect();
                Ok(Some(crate::codec::value::encode_int_numpy(merged)))
            }
            MergePolicy::Counter => {
                let mut current = decode(bytes)?;
                current.extend(incoming);
                stats.updated += 1;
                Ok(Some(crate::codec::value::encode_int_numpy(current)))
            }
        }
    }

    /// Dumps the current store into a fresh, compacted file.
    pub fn compact_copy(&self, new_path: &Path) -> Result<()> {
        self.env
            .copy_to_path(new_path, heed::CompactionOption::Enabled)?;
        Ok(())
    }
}
