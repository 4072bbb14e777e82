use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::alias::AmbiguousAlias;
use crate::matcher::{MatchStrategy, NoMatchReason};

/// Normalized comparison key (see [`crate::normalize`]).
pub type CanonicalKey = String;

/// Opaque identifier meaningful only inside one source. Integer ids are
/// carried as their decimal string.
pub type SourceIdentifier = String;

/// Raw attribute set supplied by one source for one entity.
pub type AttributeBag = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One `(display_name, source_identifier, attribute_bag)` tuple from a loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRecord {
    pub display_name: String,
    pub source_id: Option<SourceIdentifier>,
    pub attributes: AttributeBag,
}

impl SourceRecord {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self { display_name: display_name.into(), ..Self::default() }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.source_id = Some(id.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A `(display_name -> identifier)` list for one source.
#[derive(Debug, Clone, Default)]
pub struct AliasList {
    pub source: String,
    pub entries: Vec<(String, SourceIdentifier)>,
}

/// Pre-loaded records grouped by source name.
#[derive(Debug, Default)]
pub struct MergeInput {
    pub sources: BTreeMap<String, Vec<SourceRecord>>,
    pub aliases: Vec<AliasList>,
    /// Records from a previous run's output. Merged keys keep their owner.
    pub seed: Vec<EntityRecord>,
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Created from the primary source, no secondary attempted yet.
    #[default]
    New,
    /// A secondary source is being resolved.
    Matching,
    /// At least one secondary source matched.
    Enriched,
    /// Every secondary source so far failed to match.
    Unmatched,
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Matching => write!(f, "matching"),
            Self::Enriched => write!(f, "enriched"),
            Self::Unmatched => write!(f, "unmatched"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub canonical_key: CanonicalKey,
    pub display_name: String,
    #[serde(default)]
    pub source_identifiers: BTreeMap<String, SourceIdentifier>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Namespaced attribute key -> source that wrote it.
    #[serde(default)]
    pub provenance: BTreeMap<String, String>,
    #[serde(default)]
    pub matched: BTreeSet<String>,
    #[serde(default)]
    pub unmatched: bool,
    #[serde(default)]
    pub state: RecordState,
}

impl EntityRecord {
    pub fn new(canonical_key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            canonical_key: canonical_key.into(),
            display_name: display_name.into(),
            source_identifiers: BTreeMap::new(),
            attributes: BTreeMap::new(),
            provenance: BTreeMap::new(),
            matched: BTreeSet::new(),
            unmatched: false,
            state: RecordState::New,
        }
    }

    /// Enter `Matching` for a secondary pass. Terminal states other than
    /// `Unmatched` are left alone.
    pub fn begin_matching(&mut self) {
        if matches!(self.state, RecordState::New | RecordState::Unmatched) {
            self.state = RecordState::Matching;
        }
    }

    pub fn mark_enriched(&mut self) {
        self.state = RecordState::Enriched;
        self.unmatched = false;
    }

    /// Close a pass: anything still `New` or `Matching` becomes `Unmatched`.
    pub fn settle(&mut self) {
        if matches!(self.state, RecordState::New | RecordState::Matching) {
            self.state = RecordState::Unmatched;
        }
        self.unmatched = self.state == RecordState::Unmatched;
    }
}

/// Entity records keyed (and therefore ordered) by canonical key.
pub type RecordSet = BTreeMap<CanonicalKey, EntityRecord>;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A candidate no strategy could resolve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Orphan {
    pub source: String,
    pub display_name: String,
    pub canonical_key: CanonicalKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceIdentifier>,
    pub reason: NoMatchReason,
    /// True when the orphan policy created a record for it.
    pub created: bool,
}

/// A match accepted on weak evidence that a human should confirm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewItem {
    pub source: String,
    pub candidate_name: String,
    pub candidate_key: CanonicalKey,
    pub matched_key: CanonicalKey,
    pub strategy: MatchStrategy,
}

/// A second candidate of one source resolving to an already-merged record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateMatch {
    pub source: String,
    pub canonical_key: CanonicalKey,
    pub candidate_name: String,
    pub strategy: MatchStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    pub ambiguous_aliases: Vec<AmbiguousAlias>,
    pub orphans: Vec<Orphan>,
    pub review: Vec<ReviewItem>,
    pub duplicate_matches: Vec<DuplicateMatch>,
    /// Seed records whose key was already taken by an earlier seed record.
    pub duplicate_seeds: Vec<CanonicalKey>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeSummary {
    pub records: usize,
    pub enriched: usize,
    pub unmatched: usize,
    pub orphans: usize,
    pub orphans_created: usize,
    pub ambiguous_aliases: usize,
    pub review: usize,
    pub duplicate_matches: usize,
    pub duplicate_seeds: usize,
    pub columns: usize,
    pub strategy_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeMeta {
    pub config_name: String,
    pub primary: String,
    pub secondaries: Vec<String>,
    pub engine_version: String,
    pub run_at: String,
    /// `sha256:<hex>` over the canonical serialization of `records`.
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub meta: MergeMeta,
    pub summary: MergeSummary,
    /// Ordered union of every namespaced attribute key.
    pub schema: Vec<String>,
    pub records: Vec<EntityRecord>,
    pub report: MergeReport,
}
