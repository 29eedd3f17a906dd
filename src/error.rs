//! Error kinds for `qid_store`, per spec §7.
//!
//! Only [`Error::Io`], [`Error::Kv`], and [`Error::Dictionary`] are fatal and
//! propagate to the caller. Decode and ingest-parse failures are logged and
//! degrade to `None` / a skipped record at the call site — they never reach
//! this enum except inside [`crate::ingest::IngestReport`].

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("KV engine error: {0}")]
    Kv(#[from] heed::Error),

    #[error("dictionary error: {0}")]
    Dictionary(#[from] fst::Error),

    #[error("value decode error in table {table}: {source}")]
    Decode {
        table: &'static str,
        #[source]
        source: DecodeError,
    },

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("map size exhausted after {attempts} growth attempt(s)")]
    MapFull { attempts: u32 },

    #[error("entity id {0:?} does not match ^[PQ][0-9]+$")]
    MalformedEntityId(String),
}

/// Failure decoding a single stored value. Callers of [`crate::kv::Engine`]
/// convert this into a logged warning and a `None` result; it is never
/// fatal.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("msgpack: {0}")]
    MsgPack(#[from] rmp_serde::decode::Error),

    #[error("bitmap: {0}")]
    Bitmap(std::io::Error),

    #[error("numpy array length {0} is not a multiple of 4")]
    NumpyLength(usize),

    #[error("utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;
