//! Dump decompression (spec §6). Dispatches on file extension the same way
//! as `DumpReaderWikidata.__iter__` (`original_source/core/db_wd.py`): bz2,
//! gzip, or a plain text file — SQL and JSON dumps share the same framing.

use crate::error::Result;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Open `path`, transparently decompressing `.bz2`/`.gz` by extension, and
/// return a buffered line reader positioned at the start of the file.
pub fn open_lines(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let name = path.to_string_lossy();
    let reader: Box<dyn BufRead> = if name.ends_with(".bz2") {
        Box::new(BufReader::new(BzDecoder::new(file)))
    } else if name.ends_with(".gz") {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

/// Iterate the non-empty lines of `reader`, discarding I/O errors with a
/// logged warning (a single unreadable line is never fatal to a dump scan).
pub fn lines(mut reader: Box<dyn BufRead>) -> impl Iterator<Item = String> {
    std::iter::from_fn(move || loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => return None,
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\n', '\r']);
                if trimmed.is_empty() {
                    continue;
                }
                return Some(trimmed.to_owned());
            }
            Err(err) => {
                tracing::warn!(error = %err, "error reading dump line, stopping scan");
                return None;
            }
        }
    })
}
