//! The public read-only query surface (spec §4.5, "L4"): point reads, the
//! composite `get_item`, type navigation, redirects, sitelinks, and boolean
//! statement search. Two entry points: [`Store::open`] against an
//! already-built data directory, and [`Store::build`] which runs ingestion
//! end to end first.

use crate::codec::key::{decode_u32_key, encode_u32_key, LocalId};
use crate::codec::value::{decode_int_numpy, decode_obj, decode_plain};
use crate::config::Config;
use crate::dict::Dictionary;
use crate::error::Result;
use crate::index::{self, Op};
use crate::ingest::{stage_a, stage_b, stage_c, IngestReport};
use crate::kv::{tables, Engine};
use crate::model::{
    Claims, DecodedClaims, DecodedReferenceNode, DecodedStatement, DecodedValue, EntityRef, Item,
    LangStringMap, LangStringSetMap, ReferenceNode, SiteLinkMap, TypedValue, UnitRef,
    DIMENSIONLESS_UNIT,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Owns the KV engine and dictionary for the lifetime of the store; all read
/// methods borrow without copying (spec §3's "Ownership").
pub struct Store {
    engine: Engine,
    dictionary: Dictionary,
    config: Config,
}

impl Store {
    /// Opens an already-built data directory read-only.
    pub fn open(config: Config) -> Result<Store> {
        let engine = Engine::open(&config.kv_path(), config.map_size_bytes, config.max_tables)?;
        let dictionary = Dictionary::open(&config.dictionary_path())?;
        Ok(Store {
            engine,
            dictionary,
            config,
        })
    }

    /// Runs ingestion end to end (Stage A, then B, then C) and returns the
    /// opened store plus a best-effort report of what was skipped.
    pub fn build(config: Config) -> Result<(Store, IngestReport)> {
        let page_sql_path = config
            .page_sql_path
            .clone()
            .expect("Config::page_sql_path is required to build a store");
        let redirect_sql_path = config
            .redirect_sql_path
            .clone()
            .expect("Config::redirect_sql_path is required to build a store");
        let json_dump_path = config
            .json_dump_path
            .clone()
            .expect("Config::json_dump_path is required to build a store");

        let engine = Engine::open(&config.kv_path(), config.map_size_bytes, config.max_tables)?;
        let mut report = IngestReport::default();

        let dictionary = stage_a::run(
            &page_sql_path,
            &redirect_sql_path,
            &config.dictionary_path(),
            &engine,
            &mut report,
        )?;
        stage_b::run(&json_dump_path, &dictionary, &engine, &config, &mut report)?;
        stage_c::run(&engine, config.max_key_bytes, &mut report)?;

        tracing::info!(
            entities_written = report.entities_written,
            entities_skipped_structural = report.entities_skipped_structural,
            postings_written = report.postings_written,
            "ingestion complete"
        );

        Ok((
            Store {
                engine,
                dictionary,
                config,
            },
            report,
        ))
    }

    fn label_by_lid(&self, lid: LocalId) -> Result<Option<String>> {
        let Some(bytes) = self.engine.get(tables::LABEL, &encode_u32_key(lid))? else {
            return Ok(None);
        };
        match decode_plain(&bytes) {
            Ok(s) => Ok(Some(s)),
            Err(source) => {
                tracing::warn!(lid, error = %source, "failed to decode label");
                Ok(None)
            }
        }
    }

    /// English (or dump-provided fallback) display label.
    pub fn label(&self, id: &str) -> Result<Option<String>> {
        match self.dictionary.local_of(id) {
            Some(lid) => self.label_by_lid(lid),
            None => Ok(None),
        }
    }

    fn obj_by_lid<T: serde::de::DeserializeOwned>(
        &self,
        table: &'static str,
        lid: LocalId,
    ) -> Result<Option<T>> {
        let Some(bytes) = self.engine.get(table, &encode_u32_key(lid))? else {
            return Ok(None);
        };
        match decode_obj(&bytes, true) {
            Ok(value) => Ok(Some(value)),
            Err(source) => {
                tracing::warn!(table, lid, error = %source, "failed to decode value");
                Ok(None)
            }
        }
    }

    pub fn labels(&self, id: &str) -> Result<Option<LangStringMap>> {
        let Some(lid) = self.dictionary.local_of(id) else {
            return Ok(None);
        };
        self.obj_by_lid(tables::LABELS, lid)
    }

    /// Language-scoped convenience over [`Store::labels`].
    pub fn label_in_lang(&self, id: &str, lang: &str) -> Result<Option<String>> {
        Ok(self.labels(id)?.and_then(|m| m.get(lang).cloned()))
    }

    pub fn descriptions(&self, id: &str) -> Result<Option<LangStringMap>> {
        let Some(lid) = self.dictionary.local_of(id) else {
            return Ok(None);
        };
        self.obj_by_lid(tables::DESCRIPTIONS, lid)
    }

    pub fn description_in_lang(&self, id: &str, lang: &str) -> Result<Option<String>> {
        Ok(self.descriptions(id)?.and_then(|m| m.get(lang).cloned()))
    }

    pub fn aliases(&self, id: &str) -> Result<Option<LangStringSetMap>> {
        let Some(lid) = self.dictionary.local_of(id) else {
            return Ok(None);
        };
        self.obj_by_lid(tables::ALIASES, lid)
    }

    pub fn sitelinks(&self, id: &str) -> Result<Option<SiteLinkMap>> {
        let Some(lid) = self.dictionary.local_of(id) else {
            return Ok(None);
        };
        self.obj_by_lid(tables::SITELINKS, lid)
    }

    fn raw_claims(&self, id: &str) -> Result<Option<Claims>> {
        let Some(lid) = self.dictionary.local_of(id) else {
            return Ok(None);
        };
        self.obj_by_lid(tables::CLAIMS, lid)
    }

    /// Nested statement map with every `LocalId` restored to an entity-ID
    /// string (spec §4.5).
    pub fn claims(&self, id: &str) -> Result<Option<DecodedClaims>> {
        Ok(self.raw_claims(id)?.map(|c| self.decode_claims(c)))
    }

    fn resolve_id(&self, lid: LocalId) -> String {
        self.dictionary
            .string_of(lid)
            .map(str::to_owned)
            .unwrap_or_else(|| lid.to_string())
    }

    fn decode_entity_ref(&self, value: EntityRef) -> String {
        match value {
            EntityRef::Local(lid) => self.resolve_id(lid),
            EntityRef::Raw(s) => s,
        }
    }

    fn decode_typed_value(&self, value: TypedValue) -> DecodedValue {
        match value {
            TypedValue::EntityId(r) => DecodedValue::EntityId(self.decode_entity_ref(r)),
            TypedValue::Quantity { amount, unit } => {
                let unit = match unit {
                    UnitRef::Dimensionless => DIMENSIONLESS_UNIT.to_owned(),
                    UnitRef::Local(lid) => self.resolve_id(lid),
                    UnitRef::Raw(s) => s,
                };
                DecodedValue::Quantity { amount, unit }
            }
            TypedValue::Time(t) => DecodedValue::Time(t),
            TypedValue::MonolingualText(t) => DecodedValue::MonolingualText(t),
            TypedValue::Other(v) => DecodedValue::Other(v),
        }
    }

    fn decode_reference_node(&self, node: ReferenceNode) -> DecodedReferenceNode {
        node.into_iter()
            .map(|(value_type, props)| {
                let decoded: BTreeMap<String, Vec<DecodedValue>> = props
                    .into_iter()
                    .map(|(prop, values)| {
                        let prop = self.resolve_id(prop);
                        let values = values
                            .into_iter()
                            .map(|v| self.decode_typed_value(v))
                            .collect();
                        (prop, values)
                    })
                    .collect();
                (value_type, decoded)
            })
            .collect()
    }

    fn decode_claims(&self, claims: Claims) -> DecodedClaims {
        claims
            .into_iter()
            .map(|(value_type, props)| {
                let decoded: BTreeMap<String, Vec<DecodedStatement>> = props
                    .into_iter()
                    .map(|(prop, statements)| {
                        let prop = self.resolve_id(prop);
                        let statements = statements
                            .into_iter()
                            .map(|stmt| DecodedStatement {
                                value: self.decode_typed_value(stmt.value),
                                references: stmt
                                    .references
                                    .into_iter()
                                    .map(|r| self.decode_reference_node(r))
                                    .collect(),
                            })
                            .collect();
                        (prop, statements)
                    })
                    .collect();
                (value_type, decoded)
            })
            .collect()
    }

    /// Bundles the six point reads into one map, omitting absent fields
    /// (spec §4.5's "Composite read").
    pub fn get_item(&self, id: &str) -> Result<Option<Item>> {
        if self.dictionary.local_of(id).is_none() {
            return Ok(None);
        }
        let mut item = Item {
            id: id.to_owned(),
            ..Item::default()
        };
        item.label = self.label(id)?;
        item.labels = self.labels(id)?.unwrap_or_default();
        item.descriptions = self.descriptions(id)?.unwrap_or_default();
        item.aliases = self.aliases(id)?.unwrap_or_default();
        item.sitelinks = self.sitelinks(id)?.unwrap_or_default();
        item.claims = self.claims(id)?.unwrap_or_default();
        Ok(Some(item))
    }

    fn ptype_pid(&self, value_type: &str, pid: &str, id: &str) -> Result<Option<Vec<String>>> {
        let Some(claims) = self.raw_claims(id)? else {
            return Ok(None);
        };
        let Some(pid_local) = self.dictionary.local_of(pid) else {
            return Ok(None);
        };
        let Some(bucket) = claims.get(value_type) else {
            return Ok(None);
        };
        let Some(statements) = bucket.get(&pid_local) else {
            return Ok(None);
        };
        let values = statements
            .iter()
            .map(|stmt| match &stmt.value {
                TypedValue::EntityId(EntityRef::Local(lid)) => self.resolve_id(*lid),
                TypedValue::EntityId(EntityRef::Raw(s)) => s.clone(),
                other => format!("{other:?}"),
            })
            .collect();
        Ok(Some(values))
    }

    /// Values of `claims["wikibase-entityid"]["P31"]`.
    pub fn instance_of(&self, id: &str) -> Result<Option<Vec<String>>> {
        self.ptype_pid("wikibase-entityid", "P31", id)
    }

    /// Values of `claims["wikibase-entityid"]["P279"]`.
    pub fn subclass_of(&self, id: &str) -> Result<Option<Vec<String>>> {
        self.ptype_pid("wikibase-entityid", "P279", id)
    }

    /// Transitive closure under `P31` then `P279*`; visits each class at
    /// most once, returned unordered (spec §4.5).
    pub fn all_types(&self, id: &str) -> Result<Vec<String>> {
        let Some(seed) = self.instance_of(id)? else {
            return Ok(Vec::new());
        };
        let mut results: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = seed.into_iter().collect();
        while let Some(current) = queue.pop_front() {
            results.insert(current.clone());
            if let Some(supers) = self.subclass_of(&current)? {
                for s in supers {
                    if !results.contains(&s) {
                        queue.push_back(s);
                    }
                }
            }
        }
        Ok(results.into_iter().collect())
    }

    /// Single-hop redirect target, or `None` if `id` does not redirect.
    pub fn redirect(&self, id: &str) -> Result<Option<String>> {
        let Some(lid) = self.dictionary.local_of(id) else {
            return Ok(None);
        };
        let Some(bytes) = self.engine.get(tables::REDIRECT, &encode_u32_key(lid))? else {
            return Ok(None);
        };
        if bytes.len() != 4 {
            return Ok(None);
        }
        Ok(Some(self.resolve_id(decode_u32_key(&bytes))))
    }

    /// Entities whose single-hop redirect target is `id`.
    pub fn redirect_of(&self, id: &str) -> Result<Option<Vec<String>>> {
        let Some(lid) = self.dictionary.local_of(id) else {
            return Ok(None);
        };
        let Some(bytes) = self.engine.get(tables::REDIRECT_OF, &encode_u32_key(lid))? else {
            return Ok(None);
        };
        match decode_int_numpy(&bytes) {
            Ok(ids) => Ok(Some(ids.into_iter().map(|lid| self.resolve_id(lid)).collect())),
            Err(source) => {
                tracing::warn!(id, error = %source, "failed to decode redirect_of");
                Ok(None)
            }
        }
    }

    /// Wikipedia page title for `lang`, looked up as `"{lang}wiki"` in
    /// `sitelinks`.
    pub fn wikipedia_title(&self, lang: &str, id: &str) -> Result<Option<String>> {
        let key = format!("{lang}wiki");
        Ok(self.sitelinks(id)?.and_then(|m| m.get(&key).cloned()))
    }

    /// `https://{lang}.wikipedia.org/wiki/{title}`, with spaces replaced by
    /// `_`.
    pub fn wikipedia_link(&self, lang: &str, id: &str) -> Result<Option<String>> {
        let Some(title) = self.wikipedia_title(lang, id)? else {
            return Ok(None);
        };
        let title = title.replace(' ', "_");
        Ok(Some(format!("https://{lang}.wikipedia.org/wiki/{title}")))
    }

    /// Boolean statement search (spec §4.5). Returns entity-ID strings in
    /// whatever order the underlying bitmap yields (ascending `LocalId`).
    pub fn has_statements(&self, clauses: &[(Op, Option<&str>, &str)]) -> Result<Vec<String>> {
        Ok(self
            .has_statements_local(clauses)?
            .into_iter()
            .map(|lid| self.resolve_id(lid))
            .collect())
    }

    /// As [`Store::has_statements`] but returns raw `LocalId`s, skipping the
    /// final dictionary lookup.
    pub fn has_statements_local(&self, clauses: &[(Op, Option<&str>, &str)]) -> Result<Vec<LocalId>> {
        let mut resolved = Vec::with_capacity(clauses.len());
        for &(op, property, tail) in clauses {
            let tail_local = self.dictionary.local_of(tail);
            let property_local = property.map(|p| self.dictionary.local_of(p));
            let unresolvable = tail_local.is_none() || matches!(property_local, Some(None));
            if unresolvable {
                if op == Op::And {
                    return Ok(Vec::new());
                }
                continue;
            }
            resolved.push(index::Clause::new(
                op,
                property_local.flatten(),
                tail_local.expect("checked above"),
            ));
        }
        let bitmap = index::has_statements(&self.engine, self.config.max_key_bytes, &resolved)?;
        Ok(bitmap.iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::value::{encode_int_numpy, encode_obj, encode_plain};

    fn build_fixture() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default().with_data_dir(dir.path());

        let ids: BTreeSet<String> = ["Q31", "Q5", "Q3624078", "P31"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let dictionary = Dictionary::build(ids, &config.dictionary_path()).unwrap();
        let engine = Engine::open(&config.kv_path(), config.map_size_bytes, config.max_tables)
            .unwrap();

        let q31 = dictionary.local_of("Q31").unwrap();
        let q5 = dictionary.local_of("Q5").unwrap();
        let q3624078 = dictionary.local_of("Q3624078").unwrap();
        let p31 = dictionary.local_of("P31").unwrap();

        engine
            .write_bulk(
                tables::LABEL,
                vec![(encode_u32_key(q31).to_vec(), encode_plain("Belgium"))],
                true,
            )
            .unwrap();

        let mut labels: LangStringMap = BTreeMap::new();
        labels.insert("en".to_owned(), "Belgium".to_owned());
        labels.insert("ja".to_owned(), "ベルギー".to_owned());
        engine
            .write_bulk(
                tables::LABELS,
                vec![(encode_u32_key(q31).to_vec(), encode_obj(&labels, true))],
                true,
            )
            .unwrap();

        let mut sitelinks: SiteLinkMap = BTreeMap::new();
        sitelinks.insert("jawiki".to_owned(), "ベルギー".to_owned());
        engine
            .write_bulk(
                tables::SITELINKS,
                vec![(encode_u32_key(q31).to_vec(), encode_obj(&sitelinks, true))],
                true,
            )
            .unwrap();

        let mut claims: Claims = BTreeMap::new();
        let mut entity_props: BTreeMap<LocalId, Vec<crate::model::StatementValue>> =
            BTreeMap::new();
        entity_props.insert(
            p31,
            vec![crate::model::StatementValue {
                value: TypedValue::EntityId(EntityRef::Local(q5)),
                references: Vec::new(),
            }],
        );
        claims.insert("wikibase-entityid".to_owned(), entity_props);
        engine
            .write_bulk(
                tables::CLAIMS,
                vec![(encode_u32_key(q31).to_vec(), encode_obj(&claims, true))],
                true,
            )
            .unwrap();

        engine
            .write_bulk(
                tables::REDIRECT_OF,
                vec![(
                    encode_u32_key(q31).to_vec(),
                    encode_int_numpy([q3624078]),
                )],
                true,
            )
            .unwrap();
        engine
            .write_bulk(
                tables::REDIRECT,
                vec![(encode_u32_key(q3624078).to_vec(), encode_u32_key(q31).to_vec())],
                true,
            )
            .unwrap();

        let store = Store {
            engine,
            dictionary,
            config,
        };
        (dir, store)
    }

    #[test]
    fn label_and_lang_scoped_labels() {
        let (_dir, store) = build_fixture();
        assert_eq!(store.label("Q31").unwrap().as_deref(), Some("Belgium"));
        assert_eq!(
            store.label_in_lang("Q31", "ja").unwrap().as_deref(),
            Some("ベルギー")
        );
        assert_eq!(store.label("Q999999").unwrap(), None);
    }

    #[test]
    fn wikipedia_link_builds_expected_url() {
        let (_dir, store) = build_fixture();
        let link = store.wikipedia_link("ja", "Q31").unwrap().unwrap();
        assert_eq!(link, "https://ja.wikipedia.org/wiki/ベルギー");
    }

    #[test]
    fn instance_of_resolves_entity_ids() {
        let (_dir, store) = build_fixture();
        let types = store.instance_of("Q31").unwrap().unwrap();
        assert_eq!(types, vec!["Q5".to_owned()]);
    }

    #[test]
    fn redirect_round_trips_with_redirect_of() {
        let (_dir, store) = build_fixture();
        let sources = store.redirect_of("Q31").unwrap().unwrap();
        assert_eq!(sources, vec!["Q3624078".to_owned()]);
        assert_eq!(
            store.redirect(&sources[0]).unwrap().as_deref(),
            Some("Q31")
        );
    }

    #[test]
    fn get_item_bundles_available_fields() {
        let (_dir, store) = build_fixture();
        let item = store.get_item("Q31").unwrap().unwrap();
        assert_eq!(item.label.as_deref(), Some("Belgium"));
        assert!(!item.claims.is_empty());
        assert!(store.get_item("Q999999").unwrap().is_none());
    }
}
