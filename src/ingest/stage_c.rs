//! Stage C (spec §4.4): scan `claims` linearly and build the two-level
//! inverted index (`claim_ent_inv`) used by
//! [`crate::index::has_statements`].

use crate::codec::key::{decode_u32_key, encode_text_key, LocalId};
use crate::codec::value::{decode_obj, encode_int_bitmap};
use crate::error::Result;
use crate::ingest::IngestReport;
use crate::kv::{tables, Engine};
use crate::model::{Claims, EntityRef, TypedValue};
use roaring::RoaringBitmap;
use std::collections::{BTreeMap, BTreeSet};

/// Scans `claims`, accumulating `(tail, prop) -> bitmap(heads)` postings for
/// every resolved `wikibase-entityid` value, then emits the tail-only union
/// postings and writes everything in one contiguous-by-tail batch (spec
/// §4.4 step: "a tail-only posting immediately followed by all its
/// tail+prop postings").
pub fn run(engine: &Engine, max_key_bytes: usize, report: &mut IngestReport) -> Result<()> {
    let entries = engine.prefix(tables::CLAIMS, &[])?;
    let mut postings: BTreeMap<(LocalId, LocalId), RoaringBitmap> = BTreeMap::new();

    for (key, value) in entries {
        let head = decode_u32_key(&key);
        let claims: Claims = match decode_obj(&value, true) {
            Ok(claims) => claims,
            Err(source) => {
                tracing::warn!(
                    head,
                    error = %source,
                    "failed to decode claims while building the inverted index, skipping entity"
                );
                continue;
            }
        };
        let Some(props) = claims.get("wikibase-entityid") else {
            continue;
        };
        for (&prop, statements) in props {
            for stmt in statements {
                if let TypedValue::EntityId(EntityRef::Local(tail)) = stmt.value {
                    postings.entry((tail, prop)).or_default().insert(head);
                }
            }
        }
    }

    let tails: BTreeSet<LocalId> = postings.keys().map(|&(tail, _)| tail).collect();
    let mut rows: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();

    for tail in tails {
        let mut union = RoaringBitmap::new();
        let mut prop_rows: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        for (&(_, prop), bitmap) in postings.range((tail, LocalId::MIN)..=(tail, LocalId::MAX)) {
            for head in bitmap {
                union.insert(head);
            }
            let key = encode_text_key(&format!("{tail}|{prop}"), max_key_bytes);
            prop_rows.push((key, encode_int_bitmap(bitmap.iter())));
        }
        let tail_key = encode_text_key(&tail.to_string(), max_key_bytes);
        rows.push((tail_key, encode_int_bitmap(union.iter())));
        rows.extend(prop_rows);
    }

    report.postings_written += rows.len() as u64;
    engine.write_bulk(tables::CLAIM_ENT_INV, rows, false)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::key::encode_u32_key;
    use crate::codec::value::encode_obj;
    use crate::model::StatementValue;

    fn open_tmp() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(&dir.path().join("store.mdb"), 64 * 1024 * 1024, 16).unwrap();
        (dir, engine)
    }

    #[test]
    fn builds_tail_and_tail_prop_postings() {
        let (_dir, engine) = open_tmp();

        let mut claims: Claims = BTreeMap::new();
        let mut props: BTreeMap<LocalId, Vec<StatementValue>> = BTreeMap::new();
        props.insert(
            31, // P31
            vec![StatementValue {
                value: TypedValue::EntityId(EntityRef::Local(5)), // Q5 (human)
                references: Vec::new(),
            }],
        );
        claims.insert("wikibase-entityid".to_owned(), props);

        let bytes = encode_obj(&claims, true);
        engine
            .write_bulk(
                tables::CLAIMS,
                vec![(encode_u32_key(100).to_vec(), bytes)],
                true,
            )
            .unwrap();

        let mut report = IngestReport::default();
        run(&engine, 511, &mut report).unwrap();
        assert_eq!(report.postings_written, 2);

        let tail_only = engine.get(tables::CLAIM_ENT_INV, b"5").unwrap().unwrap();
        let bitmap = crate::codec::value::decode_int_bitmap(&tail_only).unwrap();
        assert!(bitmap.contains(100));

        let tail_prop = engine
            .get(tables::CLAIM_ENT_INV, b"5|31")
            .unwrap()
            .unwrap();
        let bitmap = crate::codec::value::decode_int_bitmap(&tail_prop).unwrap();
        assert!(bitmap.contains(100));
    }
}
