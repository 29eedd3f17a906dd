//! The embedded KV engine (spec §4.2, "L1") and its column-family layout
//! (spec §3).

pub mod engine;
pub mod tables;

pub use engine::{Engine, MergePolicy, UpdateStats};
