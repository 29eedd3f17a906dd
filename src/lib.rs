//! `qid_store`: a local, read-mostly knowledge-graph store over a
//! structured-data dump of encyclopedic entities.
//!
//! Three layers, bottom to top:
//!
//! - [`dict`] (`L2`): a static string↔[`codec::LocalId`] dictionary, backing
//!   every other layer's integer keys.
//! - [`kv`] (`L1`): the embedded columnar KV engine and its named tables.
//! - [`ingest`] (`L3`) builds both of the above from a MediaWiki SQL dump
//!   pair and a JSON entity dump; [`index`] (also `L3`) answers boolean
//!   statement queries over the resulting inverted index.
//!
//! [`Store`] is the composed read surface applications use.

pub mod codec;
pub mod config;
pub mod dict;
pub mod error;
pub mod index;
pub mod ingest;
pub mod kv;
pub mod model;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use ingest::IngestReport;
pub use model::Item;
pub use store::Store;
