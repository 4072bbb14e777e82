use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::matcher::MatchStrategy;
use crate::model::{EntityRecord, MergeReport, MergeSummary, RecordState};

/// Compute summary statistics from the final record set and report.
pub fn compute_summary(
    records: &[EntityRecord],
    report: &MergeReport,
    columns: usize,
    strategies: &[MatchStrategy],
) -> MergeSummary {
    let mut strategy_counts: BTreeMap<String, usize> = BTreeMap::new();
    for s in strategies {
        *strategy_counts.entry(s.to_string()).or_insert(0) += 1;
    }

    MergeSummary {
        records: records.len(),
        enriched: records.iter().filter(|r| r.state == RecordState::Enriched).count(),
        unmatched: records.iter().filter(|r| r.unmatched).count(),
        orphans: report.orphans.len(),
        orphans_created: report.orphans.iter().filter(|o| o.created).count(),
        ambiguous_aliases: report.ambiguous_aliases.len(),
        review: report.review.len(),
        duplicate_matches: report.duplicate_matches.len(),
        duplicate_seeds: report.duplicate_seeds.len(),
        columns,
        strategy_counts,
    }
}

/// `sha256:<hex>` over one JSON line per record, in key order.
pub fn fingerprint(records: &[EntityRecord]) -> String {
    let mut hasher = Sha256::new();
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        // Records hold only BTreeMaps, so field order is stable.
        match serde_json::to_string(record) {
            Ok(line) => hasher.update(line.as_bytes()),
            Err(_) => hasher.update(record.canonical_key.as_bytes()),
        }
    }
    format!("sha256:{:x}", hasher.finalize())
}
