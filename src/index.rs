//! The boolean statement-search query planner (spec §4.5, `has_statements`):
//! AND/OR/NOT folding over inverted-index postings, selectivity-ordered by a
//! byte-length probe that never materializes a bitmap it doesn't need.

use crate::codec::key::{encode_text_key, LocalId};
use crate::codec::value::decode_int_bitmap;
use crate::error::Result;
use crate::kv::{tables, Engine};
use roaring::RoaringBitmap;

/// Boolean combinator applied when folding a clause's posting into the
/// running accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    And,
    Or,
    Not,
}

/// One clause of a [`has_statements`] query: `tail` is a `LocalID`, `prop`
/// optionally narrows the posting to a specific property.
#[derive(Debug, Clone, Copy)]
pub struct Clause {
    pub op: Op,
    pub property: Option<LocalId>,
    pub tail: LocalId,
}

impl Clause {
    pub fn new(op: Op, property: Option<LocalId>, tail: LocalId) -> Clause {
        Clause { op, property, tail }
    }

    fn posting_key(&self, max_key_bytes: usize) -> Vec<u8> {
        let text = match self.property {
            Some(prop) => format!("{}|{}", self.tail, prop),
            None => self.tail.to_string(),
        };
        encode_text_key(&text, max_key_bytes)
    }
}

/// Evaluates an ordered list of clauses against `claim_ent_inv` (spec §4.5):
///
/// 1. Probe each clause's posting byte length (without materializing it) as
///    a selectivity estimate; clauses whose posting is absent are treated as
///    empty.
/// 2. Sort clauses ascending by estimate (most selective first).
/// 3. Fold left from the first clause's posting: `AND` intersects, `OR`
///    unions, `NOT` subtracts. Short-circuits `AND` once the accumulator is
///    empty.
///
/// Returns `None` when every clause misses (spec §8: "Empty input ... returns
/// an empty list" — callers map `None` to an empty result set the same way).
pub fn has_statements(
    engine: &Engine,
    max_key_bytes: usize,
    clauses: &[Clause],
) -> Result<RoaringBitmap> {
    if clauses.is_empty() {
        return Ok(RoaringBitmap::new());
    }

    let mut estimated: Vec<(usize, &Clause, Vec<u8>)> = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let key = clause.posting_key(max_key_bytes);
        let size = engine.value_size(tables::CLAIM_ENT_INV, &key)?.unwrap_or(0);
        estimated.push((size, clause, key));
    }
    estimated.sort_by_key(|(size, clause, _)| (*size, clause.op != Op::And));

    let mut acc: Option<RoaringBitmap> = None;
    for (_, clause, key) in estimated {
        let posting = match engine.get(tables::CLAIM_ENT_INV, &key)? {
            Some(bytes) => match decode_int_bitmap(&bytes) {
                Ok(bitmap) => bitmap,
                Err(source) => {
                    tracing::warn!(error = %source, "failed to decode posting, treating as empty");
                    RoaringBitmap::new()
                }
            },
            None => RoaringBitmap::new(),
        };

        acc = Some(match (acc, clause.op) {
            (None, _) => posting,
            (Some(acc), Op::And) => acc & posting,
            (Some(acc), Op::Or) => acc | posting,
            (Some(acc), Op::Not) => acc - posting,
        });

        if let Some(current) = &acc {
            if current.is_empty() && clauses.iter().all(|c| c.op != Op::Or) {
                break;
            }
        }
    }

    Ok(acc.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::key::encode_u32_key;
    use crate::codec::value::encode_int_bitmap;

    fn open_tmp() -> (tempfile::TempDir, Engine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::open(&dir.path().join("store.mdb"), 64 * 1024 * 1024, 16).unwrap();
        (dir, engine)
    }

    fn put_posting(engine: &Engine, key: &str, members: &[u32]) {
        engine
            .write_bulk(
                tables::CLAIM_ENT_INV,
                vec![(
                    key.as_bytes().to_vec(),
                    encode_int_bitmap(members.iter().copied()),
                )],
                true,
            )
            .unwrap();
    }

    #[test]
    fn and_of_two_present_clauses_intersects() {
        let (_dir, engine) = open_tmp();
        put_posting(&engine, "5|31", &[100, 200, 300]);
        put_posting(&engine, "6581097|21", &[100, 400]);

        let clauses = [
            Clause::new(Op::And, Some(31), 5),
            Clause::new(Op::And, Some(21), 6581097),
        ];
        let result = has_statements(&engine, 511, &clauses).unwrap();
        assert_eq!(result.iter().collect::<Vec<_>>(), vec![100]);
    }

    #[test]
    fn missing_posting_is_treated_as_empty() {
        let (_dir, engine) = open_tmp();
        put_posting(&engine, "5|31", &[100]);
        let clauses = [
            Clause::new(Op::And, Some(31), 5),
            Clause::new(Op::And, Some(999), 1),
        ];
        let result = has_statements(&engine, 511, &clauses).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn or_unions_present_clauses_even_when_one_is_absent() {
        let (_dir, engine) = open_tmp();
        put_posting(&engine, "5", &[1, 2]);
        let clauses = [
            Clause::new(Op::Or, None, 5),
            Clause::new(Op::Or, None, 999),
        ];
        let result = has_statements(&engine, 511, &clauses).unwrap();
        assert_eq!(result.iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn empty_clause_list_returns_empty() {
        let (_dir, engine) = open_tmp();
        let result = has_statements(&engine, 511, &[]).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn tail_only_clause_without_property() {
        let (_dir, engine) = open_tmp();
        put_posting(&engine, "6581072", &[1, 2, 3]);
        let clauses = [Clause::new(Op::And, None, 6581072)];
        let result = has_statements(&engine, 511, &clauses).unwrap();
        assert_eq!(result.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
