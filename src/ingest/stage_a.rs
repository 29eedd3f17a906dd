//! Stage A (spec §4.4): parse the `page` and `redirect` SQL dumps to build
//! the identifier dictionary and the `redirect`/`redirect_of` column
//! families.

use crate::codec::key::{encode_u32_key, LocalId};
use crate::codec::value::encode_int_numpy;
use crate::dict::Dictionary;
use crate::error::Result;
use crate::ingest::dump_reader;
use crate::ingest::IngestReport;
use crate::kv::{tables, Engine};
use crate::model::is_entity_id;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Splits one `INSERT INTO ... VALUES (...), (...), ...;` line into its row
/// tuples, matching `parse_sql_values` in
/// `original_source/core/db_wd.py` byte-for-byte in intent: a `csv::Reader`
/// configured for MySQL dump quoting over the substring after `` ` VALUES ``,
/// with row boundaries detected by scanning for a `)`-terminated field
/// immediately followed by a new `(`.
pub fn parse_sql_values(line: &str) -> Result<Vec<Vec<String>>> {
    const MARKER: &str = "` VALUES ";
    let Some(marker_at) = line.find(MARKER) else {
        return Ok(Vec::new());
    };
    let values = &line[marker_at + MARKER.len()..];

    let mut builder = csv::ReaderBuilder::new();
    builder
        .delimiter(b',')
        .quote(b'\'')
        .escape(Some(b'\\'))
        .double_quote(false)
        .flexible(true)
        .has_headers(false);
    let mut reader = builder.from_reader(values.as_bytes());

    let mut fields: Vec<String> = Vec::new();
    for record in reader.records() {
        let record = record?;
        fields.extend(record.iter().map(str::to_owned));
    }

    let mut rows = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for mut column in fields {
        if column.is_empty() || column == "NULL" {
            current.push('\0'.to_string());
            continue;
        }
        if column.starts_with('(') {
            let mut new_row = false;
            if let Some(last) = current.last_mut() {
                if last.ends_with(')') {
                    last.pop();
                    new_row = true;
                }
            }
            if new_row {
                rows.push(std::mem::take(&mut current));
            }
            if current.is_empty() {
                column = column[1..].to_owned();
            }
        }
        current.push(column);
    }
    if let Some(last) = current.last() {
        if last.ends_with(");") {
            let mut last_owned = current.pop().expect("checked non-empty above");
            last_owned.truncate(last_owned.len() - 2);
            current.push(last_owned);
            rows.push(current);
        }
    }
    Ok(rows)
}

/// Runs Stage A end to end: parses `page_sql_path` to build the dictionary,
/// then `redirect_sql_path` to populate `redirect`/`redirect_of`.
pub fn run(
    page_sql_path: &Path,
    redirect_sql_path: &Path,
    dictionary_path: &Path,
    engine: &Engine,
    report: &mut IngestReport,
) -> Result<Dictionary> {
    let mut page_to_entity: HashMap<String, String> = HashMap::new();
    let mut entity_ids: BTreeSet<String> = BTreeSet::new();

    for line in dump_reader::lines(dump_reader::open_lines(page_sql_path)?) {
        if !line.starts_with("INSERT INTO") {
            continue;
        }
        for row in parse_sql_values(&line)? {
            let (Some(page_id), Some(title)) = (row.first(), row.get(2)) else {
                continue;
            };
            if is_entity_id(title) {
                report.pages_parsed += 1;
                page_to_entity.insert(page_id.clone(), title.clone());
                entity_ids.insert(title.clone());
            }
        }
    }

    let dictionary = Dictionary::build(entity_ids, dictionary_path)?;

    let mut redirect_pairs: Vec<(LocalId, LocalId)> = Vec::new();
    for line in dump_reader::lines(dump_reader::open_lines(redirect_sql_path)?) {
        if !line.starts_with("INSERT INTO") {
            continue;
        }
        for row in parse_sql_values(&line)? {
            let (Some(from_page), Some(target)) = (row.first(), row.get(2)) else {
                continue;
            };
            let Some(entity) = page_to_entity.get(from_page) else {
                continue;
            };
            let Some(from_local) = dictionary.local_of(entity) else {
                continue;
            };
            if !is_entity_id(target) {
                continue;
            }
            let Some(to_local) = dictionary.local_of(target) else {
                continue;
            };
            redirect_pairs.push((from_local, to_local));
        }
    }

    let redirect_rows: Vec<(Vec<u8>, Vec<u8>)> = redirect_pairs
        .iter()
        .map(|&(from, to)| (encode_u32_key(from).to_vec(), encode_u32_key(to).to_vec()))
        .collect();
    engine.write_bulk(tables::REDIRECT, redirect_rows, true)?;

    let mut inverse: BTreeMap<LocalId, BTreeSet<LocalId>> = BTreeMap::new();
    for &(from, to) in &redirect_pairs {
        inverse.entry(to).or_default().insert(from);
    }
    let redirect_of_rows: Vec<(Vec<u8>, Vec<u8>)> = inverse
        .into_iter()
        .map(|(to, froms)| (encode_u32_key(to).to_vec(), encode_int_numpy(froms)))
        .collect();
    engine.write_bulk(tables::REDIRECT_OF, redirect_of_rows, true)?;

    report.redirects_written += redirect_pairs.len() as u64;

    Ok(dictionary)
}
