use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{CanonicalKey, SourceIdentifier};
use crate::normalize::{is_blank_key, normalize};

#[derive(Debug, Clone, PartialEq, Eq)]
struct AliasEntry {
    display_name: String,
    source_id: SourceIdentifier,
}

/// Two distinct registrations that normalize to the same key within one
/// source. The first registration is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousAlias {
    pub source: String,
    pub canonical_key: CanonicalKey,
    pub kept_name: String,
    pub kept_id: SourceIdentifier,
    pub rejected_name: String,
    pub rejected_id: SourceIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    New,
    /// Same name and identifier registered again.
    Repeat,
    Collision(AmbiguousAlias),
    /// Name normalized to an empty key; nothing stored.
    EmptyKey,
}

/// Canonical key -> per-source identifier registry.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: BTreeMap<CanonicalKey, BTreeMap<String, AliasEntry>>,
    by_id: BTreeMap<(String, SourceIdentifier), CanonicalKey>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: &str, display_name: &str, source_id: &str) -> Registration {
        let key = normalize(display_name);
        if is_blank_key(&key) {
            log::debug!("alias '{display_name}' ({source}) has an empty key, ignored");
            return Registration::EmptyKey;
        }

        let per_source = self.entries.entry(key.clone()).or_default();
        if let Some(kept) = per_source.get(source) {
            if kept.display_name == display_name && kept.source_id == source_id {
                return Registration::Repeat;
            }
            return Registration::Collision(AmbiguousAlias {
                source: source.to_string(),
                canonical_key: key,
                kept_name: kept.display_name.clone(),
                kept_id: kept.source_id.clone(),
                rejected_name: display_name.to_string(),
                rejected_id: source_id.to_string(),
            });
        }

        per_source.insert(
            source.to_string(),
            AliasEntry { display_name: display_name.to_string(), source_id: source_id.to_string() },
        );
        self.by_id
            .entry((source.to_string(), source_id.to_string()))
            .or_insert(key);
        Registration::New
    }

    pub fn lookup(&self, key: &str, source: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|m| m.get(source))
            .map(|e| e.source_id.as_str())
    }

    /// Reverse lookup: which key did `source` register `source_id` under.
    pub fn key_for(&self, source: &str, source_id: &str) -> Option<&str> {
        self.by_id
            .get(&(source.to_string(), source_id.to_string()))
            .map(String::as_str)
    }

    pub fn display_name_for(&self, source: &str, source_id: &str) -> Option<&str> {
        let key = self.key_for(source, source_id)?;
        self.entries
            .get(key)
            .and_then(|m| m.get(source))
            .map(|e| e.display_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut table = AliasTable::new();
        assert_eq!(table.register("calc", "Bowser Jr.", "koopajr"), Registration::New);
        assert_eq!(table.register("calc", "Rosalina & Luma", "rosetta"), Registration::New);

        assert_eq!(table.lookup("bowser-jr", "calc"), Some("koopajr"));
        assert_eq!(table.lookup("rosalina-luma", "calc"), Some("rosetta"));
        assert_eq!(table.lookup("bowser-jr", "hitboxes"), None);
        assert_eq!(table.key_for("calc", "rosetta"), Some("rosalina-luma"));
        assert_eq!(table.display_name_for("calc", "koopajr"), Some("Bowser Jr."));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn same_key_different_sources_coexist() {
        let mut table = AliasTable::new();
        table.register("calc", "Bowser", "koopa");
        assert_eq!(table.register("hitboxes", "bowser", "14"), Registration::New);
        assert_eq!(table.lookup("bowser", "calc"), Some("koopa"));
        assert_eq!(table.lookup("bowser", "hitboxes"), Some("14"));
    }

    #[test]
    fn collision_keeps_first() {
        let mut table = AliasTable::new();
        table.register("calc", "Mr. Game & Watch", "gamewatch");
        let reg = table.register("calc", "mr game & watch", "gnw");

        let Registration::Collision(c) = reg else {
            panic!("expected collision, got {reg:?}");
        };
        assert_eq!(c.canonical_key, "mr-game-watch");
        assert_eq!(c.kept_id, "gamewatch");
        assert_eq!(c.rejected_name, "mr game & watch");
        assert_eq!(table.lookup("mr-game-watch", "calc"), Some("gamewatch"));
        assert_eq!(table.key_for("calc", "gnw"), None);
    }

    #[test]
    fn repeat_is_not_a_collision() {
        let mut table = AliasTable::new();
        table.register("calc", "Pit", "pit");
        assert_eq!(table.register("calc", "Pit", "pit"), Registration::Repeat);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn empty_key_rejected() {
        let mut table = AliasTable::new();
        assert_eq!(table.register("calc", "...", "x"), Registration::EmptyKey);
        assert_eq!(table.register("calc", " & ", "y"), Registration::EmptyKey);
        assert!(table.is_empty());
        assert_eq!(table.key_for("calc", "x"), None);
        assert_eq!(table.key_for("calc", "y"), None);
    }
}
