//! Stage B (spec §4.4): stream the JSON entity dump, canonicalize each
//! entity into its six columnar attributes, apply the structural-class
//! filter, and feed a buffered bulk writer. Parsing (this module's pure
//! `parse_entity_record`) is the parallelizable half; dictionary-lookup
//! resolution and writing happen sequentially on the calling thread,
//! mirroring `parse_json_dump` (parallel, pure) versus
//! `build_from_json_dump`'s main-thread `lid`-resolution and buffering loop
//! in `original_source/core/db_wd.py`.

use crate::codec::key::{encode_u32_key, LocalId};
use crate::codec::value::{encode_obj, encode_plain};
use crate::config::Config;
use crate::dict::Dictionary;
use crate::error::Result;
use crate::ingest::dump_reader;
use crate::ingest::IngestReport;
use crate::kv::{tables, Engine};
use crate::model::{
    is_entity_id, Claims, EntityRef, ReferenceNode, StatementValue, TypedValue, UnitRef,
    DIMENSIONLESS_UNIT,
};
use rayon::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// The six attributes projected from one JSON-dump line, with claim property
/// and entity-ID references still in their raw string form — dictionary
/// resolution happens one step later, in [`resolve_claims`].
#[derive(Debug, Clone, Default)]
pub struct ParsedEntity {
    pub label: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub descriptions: BTreeMap<String, String>,
    pub aliases: BTreeMap<String, BTreeSet<String>>,
    pub sitelinks: BTreeMap<String, String>,
    pub claims: RawClaims,
}

pub type RawClaims = BTreeMap<String, BTreeMap<String, Vec<RawStatement>>>;
pub type RawReferenceNode = BTreeMap<String, BTreeMap<String, Vec<RawTypedValue>>>;

#[derive(Debug, Clone)]
pub struct RawStatement {
    pub value: RawTypedValue,
    pub references: Vec<RawReferenceNode>,
}

#[derive(Debug, Clone)]
pub enum RawTypedValue {
    EntityId(String),
    Quantity { amount: String, unit: String },
    Time(String),
    MonolingualText(String),
    Other(Value),
}

/// Pure per-line projection, safe to run on a `rayon` worker. Returns `None`
/// for framing lines (`[`, `]`), malformed JSON, non-`item` entities, and
/// entities whose ID doesn't match `^[PQ][0-9]+$` (spec §4.4 steps 1-2).
pub fn parse_entity_record(line: &str) -> Option<(String, ParsedEntity)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed == "[" || trimmed == "]" {
        return None;
    }
    let trimmed = trimmed.strip_suffix(',').unwrap_or(trimmed);
    let obj: Value = serde_json::from_str(trimmed).ok()?;

    if obj.get("type").and_then(Value::as_str) != Some("item") {
        return None;
    }
    let id = obj.get("id").and_then(Value::as_str)?.to_owned();
    if !is_entity_id(&id) {
        return None;
    }

    let labels = lang_string_map(&obj, "labels", "value");
    let descriptions = lang_string_map(&obj, "descriptions", "value");
    let sitelinks = lang_string_map(&obj, "sitelinks", "title");
    let aliases = lang_string_set_map(&obj, "aliases");
    let label = Some(labels.get("en").cloned().unwrap_or_else(|| id.clone()));
    let claims = parse_claims(&obj);

    Some((
        id,
        ParsedEntity {
            label,
            labels,
            descriptions,
            aliases,
            sitelinks,
            claims,
        },
    ))
}

fn lang_string_map(obj: &Value, attribute: &str, field: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(map) = obj.get(attribute).and_then(Value::as_object) {
        for (lang, entry) in map {
            if let Some(s) = entry.get(field).and_then(Value::as_str) {
                out.insert(lang.clone(), s.to_owned());
            }
        }
    }
    out
}

fn lang_string_set_map(obj: &Value, attribute: &str) -> BTreeMap<String, BTreeSet<String>> {
    let mut out = BTreeMap::new();
    if let Some(map) = obj.get(attribute).and_then(Value::as_object) {
        for (lang, entries) in map {
            let Some(entries) = entries.as_array() else {
                continue;
            };
            let set: BTreeSet<String> = entries
                .iter()
                .filter_map(|e| e.get("value").and_then(Value::as_str))
                .map(str::to_owned)
                .collect();
            if !set.is_empty() {
                out.insert(lang.clone(), set);
            }
        }
    }
    out
}

fn parse_claims(obj: &Value) -> RawClaims {
    let mut claims: RawClaims = BTreeMap::new();
    let Some(claims_obj) = obj.get("claims").and_then(Value::as_object) else {
        return claims;
    };
    for (prop, claim_list) in claims_obj {
        let Some(claim_list) = claim_list.as_array() else {
            continue;
        };
        for claim in claim_list {
            let Some(datavalue) = claim.get("mainsnak").and_then(|m| m.get("datavalue")) else {
                continue;
            };
            let Some(claim_type) = datavalue.get("type").and_then(Value::as_str) else {
                continue;
            };
            let value = datavalue.get("value").cloned().unwrap_or(Value::Null);
            let typed = normalize_typed_value(claim_type, &value);
            let references = normalize_references(claim);
            claims
                .entry(claim_type.to_owned())
                .or_default()
                .entry(prop.clone())
                .or_default()
                .push(RawStatement {
                    value: typed,
                    references,
                });
        }
    }
    claims
}

fn normalize_references(claim: &Value) -> Vec<RawReferenceNode> {
    let Some(refs) = claim.get("references").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut nodes = Vec::new();
    for reference_node in refs {
        let Some(snaks) = reference_node.get("snaks").and_then(Value::as_object) else {
            continue;
        };
        let mut node: RawReferenceNode = BTreeMap::new();
        for (ref_prop, ref_claims) in snaks {
            let Some(ref_claims) = ref_claims.as_array() else {
                continue;
            };
            for ref_claim in ref_claims {
                let Some(datavalue) = ref_claim.get("datavalue") else {
                    continue;
                };
                let Some(ref_type) = datavalue.get("type").and_then(Value::as_str) else {
                    continue;
                };
                let value = datavalue.get("value").cloned().unwrap_or(Value::Null);
                let typed = normalize_typed_value(ref_type, &value);
                node.entry(ref_type.to_owned())
                    .or_default()
                    .entry(ref_prop.clone())
                    .or_default()
                    .push(typed);
            }
        }
        if !node.is_empty() {
            nodes.push(node);
        }
    }
    nodes
}

/// Per-claim-type normalization, one-for-one with `parse_json_dump`'s value
/// handling in `original_source/core/db_wd.py`: time strips `T00:00:00Z` and
/// a leading `+`; quantity strips the entity-IRI unit prefix and a leading
/// `+` on the amount; monolingualtext keeps only `text`.
fn normalize_typed_value(claim_type: &str, value: &Value) -> RawTypedValue {
    match claim_type {
        "wikibase-entityid" => {
            let id = value
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            RawTypedValue::EntityId(id)
        }
        "time" => {
            let time = value.get("time").and_then(Value::as_str).unwrap_or_default();
            RawTypedValue::Time(strip_leading_plus(&time.replace("T00:00:00Z", "")))
        }
        "quantity" => {
            let raw_unit = value.get("unit").and_then(Value::as_str).unwrap_or_default();
            let unit = raw_unit
                .strip_prefix(crate::model::ENTITY_IRI_PREFIX)
                .unwrap_or(raw_unit)
                .to_owned();
            let amount = value.get("amount").and_then(Value::as_str).unwrap_or_default();
            RawTypedValue::Quantity {
                amount: strip_leading_plus(amount),
                unit,
            }
        }
        "monolingualtext" => {
            let text = value
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            RawTypedValue::MonolingualText(text)
        }
        _ => RawTypedValue::Other(value.clone()),
    }
}

fn strip_leading_plus(s: &str) -> String {
    s.strip_prefix('+').unwrap_or(s).to_owned()
}

/// The structural-entity filter (spec §3, §4.4 step 5): short-circuits on
/// the first matching `P31`/`P279` value, exactly as the original's two
/// sequential `set.intersection` checks.
fn is_structural(claims: &RawClaims, structural_class_ids: &BTreeSet<String>) -> bool {
    let Some(entity_claims) = claims.get("wikibase-entityid") else {
        return false;
    };
    for prop in ["P31", "P279"] {
        let Some(statements) = entity_claims.get(prop) else {
            continue;
        };
        let hit = statements.iter().any(|stmt| {
            matches!(&stmt.value, RawTypedValue::EntityId(id) if structural_class_ids.contains(id))
        });
        if hit {
            return true;
        }
    }
    false
}

fn resolve_entity_ref(id: &str, dictionary: &Dictionary) -> EntityRef {
    match dictionary.local_of(id) {
        Some(local) => EntityRef::Local(local),
        None => EntityRef::Raw(id.to_owned()),
    }
}

fn resolve_typed_value(raw: RawTypedValue, dictionary: &Dictionary) -> TypedValue {
    match raw {
        RawTypedValue::EntityId(id) => TypedValue::EntityId(resolve_entity_ref(&id, dictionary)),
        RawTypedValue::Quantity { amount, unit } => {
            let unit = if unit == DIMENSIONLESS_UNIT {
                UnitRef::Dimensionless
            } else {
                match dictionary.local_of(&unit) {
                    Some(local) => UnitRef::Local(local),
                    None => UnitRef::Raw(unit),
                }
            };
            TypedValue::Quantity { amount, unit }
        }
        RawTypedValue::Time(t) => TypedValue::Time(t),
        RawTypedValue::MonolingualText(t) => TypedValue::MonolingualText(t),
        RawTypedValue::Other(v) => TypedValue::Other(v),
    }
}

fn resolve_reference_node(raw: RawReferenceNode, dictionary: &Dictionary) -> ReferenceNode {
    raw.into_iter()
        .map(|(value_type, props)| {
            let resolved = props
                .into_iter()
                .filter_map(|(prop, values)| {
                    let prop_id = dictionary.local_of(&prop)?;
                    let values = values
                        .into_iter()
                        .map(|v| resolve_typed_value(v, dictionary))
                        .collect();
                    Some((prop_id, values))
                })
                .collect();
            (value_type, resolved)
        })
        .collect()
}

/// Resolves a [`RawClaims`] tree into the persisted [`Claims`] shape.
/// Statements whose property string is not in the dictionary are dropped
/// (a property that never appears in the page dump cannot be addressed by
/// `LocalID`, so it cannot be queried regardless).
fn resolve_claims(raw: RawClaims, dictionary: &Dictionary) -> Claims {
    raw.into_iter()
        .map(|(value_type, props)| {
            let resolved: BTreeMap<LocalId, Vec<StatementValue>> = props
                .into_iter()
                .filter_map(|(prop, statements)| {
                    let prop_id = dictionary.local_of(&prop)?;
                    let statements = statements
                        .into_iter()
                        .map(|stmt| StatementValue {
                            value: resolve_typed_value(stmt.value, dictionary),
                            references: stmt
                                .references
                                .into_iter()
                                .map(|r| resolve_reference_node(r, dictionary))
                                .collect(),
                        })
                        .collect();
                    Some((prop_id, statements))
                })
                .collect();
            (value_type, resolved)
        })
        .collect()
}

/// Runs Stage B end to end against an already-built dictionary.
pub fn run(
    json_dump_path: &Path,
    dictionary: &Dictionary,
    engine: &Engine,
    config: &Config,
    report: &mut IngestReport,
) -> Result<()> {
    let lines: Vec<String> =
        dump_reader::lines(dump_reader::open_lines(json_dump_path)?).collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count.max(1))
        .build()
        .expect("thread pool construction cannot fail for a positive thread count");
    let parsed: Vec<(String, ParsedEntity)> =
        pool.install(|| lines.par_iter().filter_map(|line| parse_entity_record(line)).collect());

    const ATTR_TABLES: [&str; 6] = [
        tables::LABEL,
        tables::LABELS,
        tables::DESCRIPTIONS,
        tables::ALIASES,
        tables::SITELINKS,
        tables::CLAIMS,
    ];
    let mut buffers: HashMap<&'static str, Vec<(LocalId, Vec<u8>)>> =
        ATTR_TABLES.iter().map(|&t| (t, Vec::new())).collect();
    let mut buffered_bytes: u64 = 0;

    for (id, entity) in parsed {
        report.entities_parsed += 1;
        let Some(lid) = dictionary.local_of(&id) else {
            report.entities_skipped_malformed += 1;
            continue;
        };
        if is_structural(&entity.claims, &config.structural_class_ids) {
            report.entities_skipped_structural += 1;
            continue;
        }

        if let Some(label) = &entity.label {
            let bytes = encode_plain(label);
            buffered_bytes += (bytes.len() + 4) as u64;
            buffers.get_mut(tables::LABEL).unwrap().push((lid, bytes));
        }
        if !entity.labels.is_empty() {
            let bytes = encode_obj(&entity.labels, true);
            buffered_bytes += (bytes.len() + 4) as u64;
            buffers.get_mut(tables::LABELS).unwrap().push((lid, bytes));
        }
        if !entity.descriptions.is_empty() {
            let bytes = encode_obj(&entity.descriptions, true);
            buffered_bytes += (bytes.len() + 4) as u64;
            buffers
                .get_mut(tables::DESCRIPTIONS)
                .unwrap()
                .push((lid, bytes));
        }
        if !entity.aliases.is_empty() {
            let bytes = encode_obj(&entity.aliases, true);
            buffered_bytes += (bytes.len() + 4) as u64;
            buffers.get_mut(tables::ALIASES).unwrap().push((lid, bytes));
        }
        if !entity.sitelinks.is_empty() {
            let bytes = encode_obj(&entity.sitelinks, true);
            buffered_bytes += (bytes.len() + 4) as u64;
            buffers
                .get_mut(tables::SITELINKS)
                .unwrap()
                .push((lid, bytes));
        }
        if !entity.claims.is_empty() {
            let claims = resolve_claims(entity.claims, dictionary);
            if !claims.is_empty() {
                let bytes = encode_obj(&claims, true);
                buffered_bytes += (bytes.len() + 4) as u64;
                buffers.get_mut(tables::CLAIMS).unwrap().push((lid, bytes));
            }
        }
        report.entities_written += 1;

        if buffered_bytes >= config.write_buffer_bytes {
            flush_buffers(engine, &mut buffers)?;
            buffered_bytes = 0;
        }
    }
    flush_buffers(engine, &mut buffers)?;
    Ok(())
}

fn flush_buffers(
    engine: &Engine,
    buffers: &mut HashMap<&'static str, Vec<(LocalId, Vec<u8>)>>,
) -> Result<()> {
    for (&table, rows) in buffers.iter_mut() {
        if rows.is_empty() {
            continue;
        }
        rows.sort_unstable_by_key(|(lid, _)| *lid);
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = rows
            .drain(..)
            .map(|(lid, value)| (encode_u32_key(lid).to_vec(), value))
            .collect();
        engine.write_bulk(table, pairs, false)?;
    }
    Ok(())
}
