//! `Config`: every recognized option from spec §6, threaded explicitly
//! through [`crate::Store::open`] / [`crate::Store::build`] rather than read
//! from process-wide state.

use std::collections::BTreeSet;
use std::path::PathBuf;

/// 10 GiB, the default virtual address window reserved for a secondary
/// store file; the main store defaults to [`Config::map_size_bytes`]'s own
/// much larger default instead.
const DEFAULT_SIDE_MAP_SIZE_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// ≈100 GiB, matching `original_source/config.py`'s `LMDB_MAP_SIZE` scaled
/// to the main store's documented default (spec §6).
const DEFAULT_MAP_SIZE_BYTES: u64 = 100 * 1024 * 1024 * 1024;

const DEFAULT_MAX_KEY_BYTES: usize = 511;

const DEFAULT_WORKER_COUNT: usize = 6;

/// The fixed set of structural entity classes whose attribute data is
/// stripped during ingestion (spec §3, §4.4). Literal IDs carried over from
/// `original_source/config.py`'s `WIKIDATA_IDENTIFIERS`.
pub fn default_structural_class_ids() -> BTreeSet<String> {
    [
        "Q4167410",  // disambiguation page
        "Q4167836",  // category
        "Q24046192", // category stub
        "Q20010800", // user category
        "Q11266439", // template
        "Q11753321", // navigational template
        "Q19842659", // user template
        "Q21528878", // redirect page
        "Q17362920", // duplicated page
        "Q14204246", // project page
        "Q21025364", // project page
        "Q17442446", // internal item
        "Q26267864", // KML file
        "Q4663903",  // portal
        "Q15184295", // module
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

/// Configuration threaded through [`crate::Store::open`] and
/// [`crate::Store::build`]. Mirrors spec §6's recognized option set.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory holding the persisted KV file, dictionary file, and
    /// optional sidecar page file.
    pub data_dir: PathBuf,

    /// Path to the gzip/bzip2 entity JSON-lines dump, consumed by ingestion
    /// Stage B. `None` when the store is opened read-only against an
    /// already-built `data_dir`.
    pub json_dump_path: Option<PathBuf>,

    /// Path to the gzipped `page` SQL dump, consumed by ingestion Stage A.
    pub page_sql_path: Option<PathBuf>,

    /// Path to the gzipped `redirect` SQL dump, consumed by ingestion
    /// Stage A.
    pub redirect_sql_path: Option<PathBuf>,

    /// Maximum number of named sub-tables the KV engine may open. Must be
    /// at least 11 (the nine column families of spec §3, plus headroom).
    pub max_tables: u32,

    /// Virtual address window reserved for the main KV file.
    pub map_size_bytes: u64,

    /// Flush threshold for buffered bulk writes: `sum(len(k) + len(v))`.
    pub write_buffer_bytes: u64,

    /// Hard cap on a textual key's encoded UTF-8 length; longer keys are
    /// truncated deterministically (spec §4.1).
    pub max_key_bytes: usize,

    /// Size of the `rayon` thread pool used by ingestion Stage B's parallel
    /// JSON parsing.
    pub worker_count: usize,

    /// Entity classes whose instances are stripped of attribute data on
    /// ingest but retained in the dictionary and redirects.
    pub structural_class_ids: BTreeSet<String>,

    /// File name (relative to `data_dir`) of the main KV store.
    pub kv_file_name: String,

    /// File name (relative to `data_dir`) of the persisted identifier
    /// dictionary.
    pub dictionary_file_name: String,

    /// File name (relative to `data_dir`) of the optional sidecar page
    /// file reserved for future extensions (spec §6).
    pub page_file_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("."),
            json_dump_path: None,
            page_sql_path: None,
            redirect_sql_path: None,
            max_tables: 11,
            map_size_bytes: DEFAULT_MAP_SIZE_BYTES,
            write_buffer_bytes: default_write_buffer_bytes(),
            max_key_bytes: DEFAULT_MAX_KEY_BYTES,
            worker_count: DEFAULT_WORKER_COUNT,
            structural_class_ids: default_structural_class_ids(),
            kv_file_name: "qid_store.mdb".to_owned(),
            dictionary_file_name: "qid_store.trie".to_owned(),
            page_file_name: "qid_store.page".to_owned(),
        }
    }
}

/// `min(RAM/10, 1 GiB)`, the original's `LMDB_BUFF_BYTES_SIZE` (spec §6).
/// Falls back to [`DEFAULT_SIDE_MAP_SIZE_BYTES`] / 10 when the host memory
/// size cannot be determined.
fn default_write_buffer_bytes() -> u64 {
    const ONE_GIB: u64 = 1024 * 1024 * 1024;
    let ram = sys_total_memory_bytes().unwrap_or(DEFAULT_SIDE_MAP_SIZE_BYTES);
    (ram / 10).min(ONE_GIB)
}

#[cfg(target_os = "linux")]
fn sys_total_memory_bytes() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kib: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kib * 1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn sys_total_memory_bytes() -> Option<u64> {
    None
}

impl Config {
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_json_dump_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.json_dump_path = Some(path.into());
        self
    }

    pub fn with_page_sql_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.page_sql_path = Some(path.into());
        self
    }

    pub fn with_redirect_sql_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.redirect_sql_path = Some(path.into());
        self
    }

    pub fn kv_path(&self) -> PathBuf {
        self.data_dir.join(&self.kv_file_name)
    }

    pub fn dictionary_path(&self) -> PathBuf {
        self.data_dir.join(&self.dictionary_file_name)
    }

    pub fn page_path(&self) -> PathBuf {
        self.data_dir.join(&self.page_file_name)
    }
}
