use serde::Serialize;

use crate::alias::AliasTable;
use crate::model::{CanonicalKey, RecordSet, SourceRecord};
use crate::normalize::{is_blank_key, normalize};

/// Matching strategies in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    ExactKey,
    SourceIdentifier,
    Substring,
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactKey => write!(f, "exact_key"),
            Self::SourceIdentifier => write!(f, "source_identifier"),
            Self::Substring => write!(f, "substring"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub canonical_key: CanonicalKey,
    pub strategy: MatchStrategy,
}

impl Resolution {
    /// Substring hits are accepted but flagged for manual review.
    pub fn needs_review(&self) -> bool {
        self.strategy == MatchStrategy::Substring
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoMatchReason {
    /// Candidate name normalized to "" and it carried no usable identifier.
    EmptyKey,
    NotFound,
    /// Several records contain (or are contained in) the candidate key.
    Ambiguous { candidates: Vec<CanonicalKey> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(Resolution),
    NoMatch(NoMatchReason),
}

/// Resolves secondary-source candidates against known records.
///
/// Never mutates anything; what to do with a `NoMatch` is the caller's call.
pub struct EntityMatcher<'a> {
    aliases: &'a AliasTable,
    substring_fallback: bool,
}

impl<'a> EntityMatcher<'a> {
    pub fn new(aliases: &'a AliasTable) -> Self {
        Self { aliases, substring_fallback: true }
    }

    pub fn with_substring_fallback(mut self, enabled: bool) -> Self {
        self.substring_fallback = enabled;
        self
    }

    pub fn resolve(&self, candidate: &SourceRecord, known: &RecordSet, source: &str) -> MatchOutcome {
        let key = normalize(&candidate.display_name);

        if let Some(found) = self.by_exact_key(&key, known) {
            return MatchOutcome::Matched(Resolution { canonical_key: found, strategy: MatchStrategy::ExactKey });
        }

        if let Some(found) = self.by_source_id(candidate, known, source) {
            return MatchOutcome::Matched(Resolution {
                canonical_key: found,
                strategy: MatchStrategy::SourceIdentifier,
            });
        }

        if is_blank_key(&key) {
            log::debug!("{source}: empty-key candidate rejected (id {:?})", candidate.source_id);
            return MatchOutcome::NoMatch(NoMatchReason::EmptyKey);
        }

        if !self.substring_fallback {
            return MatchOutcome::NoMatch(NoMatchReason::NotFound);
        }

        let mut hits = self.by_substring(&key, known);
        match hits.len() {
            0 => MatchOutcome::NoMatch(NoMatchReason::NotFound),
            1 => MatchOutcome::Matched(Resolution {
                canonical_key: hits.remove(0),
                strategy: MatchStrategy::Substring,
            }),
            _ => MatchOutcome::NoMatch(NoMatchReason::Ambiguous { candidates: hits }),
        }
    }

    fn by_exact_key(&self, key: &str, known: &RecordSet) -> Option<CanonicalKey> {
        if is_blank_key(key) {
            return None;
        }
        known
            .values()
            .find(|r| normalize(&r.display_name) == key)
            .map(|r| r.canonical_key.clone())
    }

    fn by_source_id(&self, candidate: &SourceRecord, known: &RecordSet, source: &str) -> Option<CanonicalKey> {
        let id = candidate.source_id.as_deref().filter(|id| !id.is_empty())?;
        known
            .values()
            .find(|r| {
                r.source_identifiers.get(source).map(String::as_str) == Some(id)
                    || self.aliases.lookup(&r.canonical_key, source) == Some(id)
            })
            .map(|r| r.canonical_key.clone())
    }

    fn by_substring(&self, key: &str, known: &RecordSet) -> Vec<CanonicalKey> {
        known
            .values()
            .filter(|r| {
                let other = normalize(&r.display_name);
                !is_blank_key(&other) && (other.contains(key) || key.contains(other.as_str()))
            })
            .map(|r| r.canonical_key.clone())
            .collect()
    }
}
