//! In-memory shapes for entity data (spec §3, §9). Claim values are a
//! schema'd sum type rather than a dynamic tree — the "recommended" option
//! spec.md §9 calls out for "dynamic maps with heterogeneous values" — with
//! a catch-all variant for forward compatibility with dump-format additions.

use crate::codec::LocalId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// IRI prefix stripped from quantity units during ingestion. Never appears
/// in a persisted value; it is purely an ingestion-time detail
/// (`original_source/core/config.py`'s `WD` prefix).
pub const ENTITY_IRI_PREFIX: &str = "http://www.wikidata.org/entity/";

/// Literal compared against (post prefix-stripping) to detect the
/// dimensionless quantity unit, both on encode and on decode (spec.md §9's
/// first Open Question).
pub const DIMENSIONLESS_UNIT: &str = "1";

/// Sentinel written in place of [`DIMENSIONLESS_UNIT`] in the persisted
/// `quantity` tuple.
pub const DIMENSIONLESS_SENTINEL: i64 = -1;

/// Returns `true` for strings matching `^[PQ][0-9]+$` (spec §3).
pub fn is_entity_id(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some('P') | Some('Q') => {}
        _ => return false,
    }
    let rest = chars.as_str();
    !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
}

/// A reference to an entity inside a claim value: resolved to a [`LocalId`]
/// when the target is known to the dictionary, otherwise carried as the raw
/// string (spec §3: "unknown strings pass through verbatim").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityRef {
    Local(LocalId),
    Raw(String),
}

/// A quantity's unit: the dimensionless sentinel, a resolved entity, or an
/// unresolved raw string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitRef {
    Dimensionless,
    Local(LocalId),
    Raw(String),
}

/// The tagged union of claim-value payloads (spec §3's `<typed>`). The
/// `value_type` string discriminant lives one level up, as the outer map
/// key of [`Claims`]/[`ReferenceNode`] — this enum only carries the payload
/// shape for each known type, plus [`TypedValue::Other`] for anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    EntityId(EntityRef),
    Quantity { amount: String, unit: UnitRef },
    Time(String),
    MonolingualText(String),
    Other(serde_json::Value),
}

/// `value_type → { property_local_id → [V, ...] }`, the shape shared by
/// both `claims` (`V = StatementValue`) and reference nodes
/// (`V = TypedValue`) per spec §3.
pub type ValueTypeMap<V> = BTreeMap<String, BTreeMap<LocalId, Vec<V>>>;

/// A single statement's value plus its (possibly empty) provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementValue {
    pub value: TypedValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceNode>,
}

/// The provenance attached to a statement — itself a typed property-value
/// map (spec's GLOSSARY: "Reference node").
pub type ReferenceNode = ValueTypeMap<TypedValue>;

/// The full nested claim map persisted in the `claims` column family.
pub type Claims = ValueTypeMap<StatementValue>;

/// `{lang → string}`, used for `labels` and `descriptions`.
pub type LangStringMap = BTreeMap<String, String>;

/// `{lang → set<string>}`; set semantics mean insertion order is never
/// preserved (spec.md §9's third Open Question).
pub type LangStringSetMap = BTreeMap<String, BTreeSet<String>>;

/// `{site_key → page_title}`.
pub type SiteLinkMap = BTreeMap<String, String>;

/// The six attributes projected from one JSON-dump entity (spec §4.4 step
/// 3), prior to per-family codec encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub label: Option<String>,
    #[serde(default)]
    pub labels: LangStringMap,
    #[serde(default)]
    pub descriptions: LangStringMap,
    #[serde(default)]
    pub aliases: LangStringSetMap,
    #[serde(default)]
    pub sitelinks: SiteLinkMap,
    #[serde(default)]
    pub claims: Claims,
}

/// `claims` with every `LocalId` restored to its entity-ID string (spec
/// §4.5: "On read, LocalIDs inside claim values are restored to strings").
/// Unlike [`Claims`], this is the shape the query surface actually returns —
/// `Claims` itself is an on-disk/in-transit representation only.
pub type DecodedClaims = BTreeMap<String, BTreeMap<String, Vec<DecodedStatement>>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedStatement {
    pub value: DecodedValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<DecodedReferenceNode>,
}

pub type DecodedReferenceNode = BTreeMap<String, BTreeMap<String, Vec<DecodedValue>>>;

/// The decoded dual of [`TypedValue`]: `unit: "1"` replaces the `-1`
/// sentinel (spec §4.5), and every [`EntityRef`]/[`UnitRef::Local`] becomes
/// a plain entity-ID string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DecodedValue {
    EntityId(String),
    Quantity { amount: String, unit: String },
    Time(String),
    MonolingualText(String),
    Other(serde_json::Value),
}

/// The bundled result of [`crate::store::Store::get_item`] (spec §4.5's
/// "Composite read"), omitting fields that were absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Item {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "LangStringMap::is_empty")]
    pub labels: LangStringMap,
    #[serde(skip_serializing_if = "LangStringMap::is_empty")]
    pub descriptions: LangStringMap,
    #[serde(skip_serializing_if = "LangStringSetMap::is_empty")]
    pub aliases: LangStringSetMap,
    #[serde(skip_serializing_if = "SiteLinkMap::is_empty")]
    pub sitelinks: SiteLinkMap,
    #[serde(skip_serializing_if = "DecodedClaims::is_empty")]
    pub claims: DecodedClaims,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_shape_matches_pq_digits() {
        assert!(is_entity_id("Q31"));
        assert!(is_entity_id("P279"));
        assert!(!is_entity_id("Q"));
        assert!(!is_entity_id("X31"));
        assert!(!is_entity_id("Q31a"));
        assert!(!is_entity_id(""));
    }
}
