use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::error::MergeError;
use crate::model::{AttributeBag, EntityRecord, SourceRecord};

/// Folds per-source attribute bags into entity records under
/// `{source}_{field}` keys and tracks every column written so far.
#[derive(Debug, Clone, Default)]
pub struct AttributeMerger {
    schema: BTreeSet<String>,
    /// source -> nested bag key -> sub-namespace
    nested: BTreeMap<String, BTreeMap<String, String>>,
}

impl AttributeMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename nested bags of `source`, e.g. `Params -> param`.
    pub fn with_nested_prefixes(mut self, source: &str, prefixes: BTreeMap<String, String>) -> Self {
        if !prefixes.is_empty() {
            self.nested.insert(source.to_string(), prefixes);
        }
        self
    }

    /// Add the columns of an existing record (seed) to the schema.
    pub fn observe(&mut self, record: &EntityRecord) {
        self.schema.extend(record.attributes.keys().cloned());
    }

    /// Merge a matched candidate: identifier, display name, attributes.
    pub fn merge(
        &mut self,
        target: &mut EntityRecord,
        source: &str,
        candidate: &SourceRecord,
    ) -> Result<usize, MergeError> {
        let written = self.merge_bag(target, source, &candidate.attributes)?;

        if let Some(id) = candidate.source_id.as_ref().filter(|id| !id.is_empty()) {
            target
                .source_identifiers
                .entry(source.to_string())
                .or_insert_with(|| id.clone());
        }
        if target.display_name.is_empty() && !candidate.display_name.is_empty() {
            target.display_name = candidate.display_name.clone();
        }
        Ok(written)
    }

    /// Write every bag entry into `target.attributes` under the source's
    /// namespace. Nothing is written if any key is owned by another source.
    pub fn merge_bag(
        &mut self,
        target: &mut EntityRecord,
        source: &str,
        bag: &AttributeBag,
    ) -> Result<usize, MergeError> {
        let entries = self.flatten(&target.canonical_key, source, bag)?;

        for key in entries.keys() {
            if let Some(owner) = target.provenance.get(key) {
                if owner != source {
                    return Err(MergeError::SchemaCollision {
                        canonical_key: target.canonical_key.clone(),
                        attribute: key.clone(),
                        existing_source: owner.clone(),
                        incoming_source: source.to_string(),
                    });
                }
            }
        }

        let written = entries.len();
        for (key, value) in entries {
            self.schema.insert(key.clone());
            target.provenance.insert(key.clone(), source.to_string());
            target.attributes.insert(key, value);
        }
        target.matched.insert(source.to_string());
        Ok(written)
    }

    /// Two bag entries that flatten to the same column are an error, not a
    /// silent overwrite.
    fn flatten(
        &self,
        canonical_key: &str,
        source: &str,
        bag: &AttributeBag,
    ) -> Result<BTreeMap<String, Value>, MergeError> {
        let renames = self.nested.get(source);
        let mut out = BTreeMap::new();
        let mut put = |key: String, value: &Value| {
            if out.contains_key(&key) {
                return Err(MergeError::FlattenCollision {
                    canonical_key: canonical_key.to_string(),
                    source: source.to_string(),
                    attribute: key,
                });
            }
            out.insert(key, value.clone());
            Ok(())
        };

        for (field, value) in bag {
            match value {
                Value::Object(inner) => {
                    let sub = renames
                        .and_then(|r| r.get(field))
                        .map(String::as_str)
                        .unwrap_or(field.as_str());
                    for (inner_field, inner_value) in inner {
                        put(format!("{source}_{sub}_{inner_field}"), inner_value)?;
                    }
                }
                _ => put(format!("{source}_{field}"), value)?,
            }
        }
        Ok(out)
    }

    pub fn schema(&self) -> &BTreeSet<String> {
        &self.schema
    }

    pub fn into_schema(self) -> Vec<String> {
        self.schema.into_iter().collect()
    }
}
