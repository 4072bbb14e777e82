use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use crate::alias::{AliasTable, AmbiguousAlias, Registration};
use crate::config::{MergeConfig, OrphanPolicy};
use crate::error::MergeError;
use crate::evidence::{compute_summary, fingerprint};
use crate::matcher::{EntityMatcher, MatchOutcome, MatchStrategy, NoMatchReason};
use crate::merger::AttributeMerger;
use crate::model::{
    CanonicalKey, DuplicateMatch, EntityRecord, MergeInput, MergeMeta, MergeReport, MergeResult,
    Orphan, RecordSet, RecordState, ReviewItem, SourceRecord,
};
use crate::normalize::{is_blank_key, normalize};

/// Run the merge per config. Returns one record per entity plus a report.
pub fn run(config: &MergeConfig, input: &MergeInput) -> Result<MergeResult, MergeError> {
    let mut merger = AttributeMerger::new();
    for source in config.source_order() {
        if let Some(sc) = config.sources.get(source) {
            merger = merger.with_nested_prefixes(source, sc.nested.clone());
        }
    }

    let source_names: Vec<&str> = config.source_order().collect();
    let mut records = RecordSet::new();
    let mut report = MergeReport::default();
    for seed in &input.seed {
        if records.contains_key(&seed.canonical_key) {
            log::warn!("seed: duplicate record '{}' ignored, first one kept", seed.canonical_key);
            report.duplicate_seeds.push(seed.canonical_key.clone());
            continue;
        }
        let mut seed = seed.clone();
        infer_provenance(&mut seed, &source_names);
        merger.observe(&seed);
        records.insert(seed.canonical_key.clone(), seed);
    }

    let aliases = build_alias_table(config, input, &mut report);

    let primary_rows = input
        .sources
        .get(&config.primary)
        .ok_or_else(|| MergeError::UnknownSource(format!("primary source '{}' has no data", config.primary)))?;
    scan_primary(&config.primary, primary_rows, &mut records, &mut merger, &mut report)?;

    let matcher = EntityMatcher::new(&aliases).with_substring_fallback(config.matching.substring_fallback);
    let mut strategies = Vec::new();

    for source in &config.secondaries {
        let rows = input
            .sources
            .get(source)
            .ok_or_else(|| MergeError::UnknownSource(format!("secondary source '{source}' has no data")))?;
        let pass = SecondaryPass {
            source,
            orphans: config.orphans,
            matcher: &matcher,
            aliases: &aliases,
        };
        pass.run(rows, &mut records, &mut merger, &mut report, &mut strategies)?;
    }

    for record in records.values_mut() {
        record.settle();
    }

    let records: Vec<EntityRecord> = records.into_values().collect();
    let schema = merger.into_schema();
    let summary = compute_summary(&records, &report, schema.len(), &strategies);

    log::info!(
        "{}: {} records ({} enriched, {} unmatched), {} columns, {} orphans",
        config.name,
        summary.records,
        summary.enriched,
        summary.unmatched,
        summary.columns,
        summary.orphans,
    );

    Ok(MergeResult {
        meta: MergeMeta {
            config_name: config.name.clone(),
            primary: config.primary.clone(),
            secondaries: config.secondaries.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            fingerprint: fingerprint(&records),
        },
        summary,
        schema,
        records,
        report,
    })
}

/// Inline config entries first, then loaded alias lists. First registration wins.
fn build_alias_table(config: &MergeConfig, input: &MergeInput, report: &mut MergeReport) -> AliasTable {
    let mut table = AliasTable::new();

    let inline = config
        .aliases
        .iter()
        .flat_map(|(source, ac)| ac.entries.iter().map(move |(name, id)| (source.as_str(), name.as_str(), id.as_str())));
    let loaded = input
        .aliases
        .iter()
        .flat_map(|list| list.entries.iter().map(move |(name, id)| (list.source.as_str(), name.as_str(), id.as_str())));

    for (source, name, id) in inline.chain(loaded) {
        if let Registration::Collision(c) = table.register(source, name, id) {
            log::warn!(
                "{source}: alias '{}' collides with '{}' on key '{}'",
                c.rejected_name,
                c.kept_name,
                c.canonical_key
            );
            report.ambiguous_aliases.push(c);
        }
    }
    table
}

/// Create or enrich one record per distinct primary key.
fn scan_primary(
    source: &str,
    rows: &[SourceRecord],
    records: &mut RecordSet,
    merger: &mut AttributeMerger,
    report: &mut MergeReport,
) -> Result<(), MergeError> {
    let mut seen: BTreeMap<CanonicalKey, &SourceRecord> = BTreeMap::new();

    for row in rows {
        let key = normalize(&row.display_name);
        if is_blank_key(&key) {
            log::debug!("{source}: row {:?} has an empty key, skipped", row.display_name);
            report.orphans.push(orphan(source, row, key, NoMatchReason::EmptyKey, false));
            continue;
        }

        if let Some(kept) = seen.get(&key) {
            if kept.display_name != row.display_name || kept.source_id != row.source_id {
                log::warn!("{source}: '{}' duplicates '{}' (key '{key}')", row.display_name, kept.display_name);
                report.ambiguous_aliases.push(AmbiguousAlias {
                    source: source.to_string(),
                    canonical_key: key,
                    kept_name: kept.display_name.clone(),
                    kept_id: kept.source_id.clone().unwrap_or_default(),
                    rejected_name: row.display_name.clone(),
                    rejected_id: row.source_id.clone().unwrap_or_default(),
                });
            }
            continue;
        }
        seen.insert(key.clone(), row);

        let record = records
            .entry(key.clone())
            .or_insert_with(|| EntityRecord::new(key, row.display_name.clone()));
        merger.merge(record, source, row)?;
    }
    Ok(())
}

struct SecondaryPass<'a> {
    source: &'a str,
    orphans: OrphanPolicy,
    matcher: &'a EntityMatcher<'a>,
    aliases: &'a AliasTable,
}

impl SecondaryPass<'_> {
    fn run(
        &self,
        rows: &[SourceRecord],
        records: &mut RecordSet,
        merger: &mut AttributeMerger,
        report: &mut MergeReport,
        strategies: &mut Vec<MatchStrategy>,
    ) -> Result<(), MergeError> {
        let source = self.source;
        for record in records.values_mut() {
            record.begin_matching();
        }

        // Orphans are created after the pass so candidates of this source
        // only ever match records that existed before it.
        let mut pending: Vec<(Cow<'_, SourceRecord>, NoMatchReason)> = Vec::new();
        let mut merged: BTreeSet<CanonicalKey> = BTreeSet::new();

        for row in rows {
            let row = self.named(row);
            match self.matcher.resolve(&row, records, source) {
                MatchOutcome::Matched(res) => {
                    if !merged.insert(res.canonical_key.clone()) {
                        log::warn!(
                            "{source}: '{}' resolves to already merged '{}', skipped",
                            row.display_name,
                            res.canonical_key
                        );
                        report.duplicate_matches.push(DuplicateMatch {
                            source: source.to_string(),
                            canonical_key: res.canonical_key,
                            candidate_name: row.display_name.clone(),
                            strategy: res.strategy,
                        });
                        continue;
                    }
                    if res.needs_review() {
                        log::warn!(
                            "{source}: '{}' matched '{}' by {} only, flagged for review",
                            row.display_name,
                            res.canonical_key,
                            res.strategy
                        );
                        report.review.push(ReviewItem {
                            source: source.to_string(),
                            candidate_name: row.display_name.clone(),
                            candidate_key: normalize(&row.display_name),
                            matched_key: res.canonical_key.clone(),
                            strategy: res.strategy,
                        });
                    }
                    let Some(record) = records.get_mut(&res.canonical_key) else {
                        continue;
                    };
                    let corroborated = record.matched.iter().any(|s| s != source);
                    merger.merge(record, source, &row)?;
                    if corroborated {
                        record.mark_enriched();
                    }
                    strategies.push(res.strategy);
                    log::debug!("{source}: '{}' -> '{}' ({})", row.display_name, res.canonical_key, res.strategy);
                }
                MatchOutcome::NoMatch(reason) => pending.push((row, reason)),
            }
        }

        for (row, reason) in pending {
            let key = normalize(&row.display_name);
            let create = self.orphans == OrphanPolicy::Create
                && !is_blank_key(&key)
                && !matches!(reason, NoMatchReason::Ambiguous { .. })
                && !records.contains_key(&key);

            if create {
                let mut record = EntityRecord::new(key.clone(), row.display_name.clone());
                merger.merge(&mut record, source, &row)?;
                record.state = RecordState::Unmatched;
                record.unmatched = true;
                records.insert(key.clone(), record);
            }
            log::warn!("{source}: no match for '{}' ({reason:?})", row.display_name);
            report.orphans.push(orphan(source, &row, key, reason, create));
        }

        for record in records.values_mut() {
            record.settle();
        }
        Ok(())
    }

    /// Name id-only candidates from the alias table, falling back to the id.
    fn named<'r>(&self, row: &'r SourceRecord) -> Cow<'r, SourceRecord> {
        if !is_blank_key(&normalize(&row.display_name)) {
            return Cow::Borrowed(row);
        }
        let Some(id) = row.source_id.as_deref().filter(|id| !id.is_empty()) else {
            return Cow::Borrowed(row);
        };
        let name = self.aliases.display_name_for(self.source, id).unwrap_or(id);
        let mut named = row.clone();
        named.display_name = name.to_string();
        Cow::Owned(named)
    }
}

fn orphan(source: &str, row: &SourceRecord, key: CanonicalKey, reason: NoMatchReason, created: bool) -> Orphan {
    Orphan {
        source: source.to_string(),
        display_name: row.display_name.clone(),
        canonical_key: key,
        source_id: row.source_id.clone(),
        reason,
        created,
    }
}

/// Seeds written without provenance get it back from their key prefix,
/// longest matching source name first.
fn infer_provenance(record: &mut EntityRecord, sources: &[&str]) {
    let mut by_len: Vec<&str> = sources.to_vec();
    by_len.sort_by_key(|s| std::cmp::Reverse(s.len()));

    for key in record.attributes.keys() {
        if record.provenance.contains_key(key) {
            continue;
        }
        if let Some(owner) = by_len.iter().find(|s| key.starts_with(&format!("{s}_"))) {
            record.provenance.insert(key.clone(), owner.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONFIG: &str = r#"
name = "Engine Test"
primary = "primary"
secondaries = ["secondary"]

[sources.primary]
file = "primary.json"

[sources.secondary]
file = "secondary.json"
"#;

    fn input(primary: Vec<SourceRecord>, secondary: Vec<SourceRecord>) -> MergeInput {
        MergeInput {
            sources: BTreeMap::from([("primary".into(), primary), ("secondary".into(), secondary)]),
            ..MergeInput::default()
        }
    }

    fn config() -> MergeConfig {
        MergeConfig::from_toml(CONFIG).unwrap()
    }

    #[test]
    fn king_dedede_end_to_end() {
        let result = run(
            &config(),
            &input(
                vec![SourceRecord::new("King Dedede").with_id("K1")],
                vec![SourceRecord::new("king-dedede").with_attr("weight", 112)],
            ),
        )
        .unwrap();

        assert_eq!(result.records.len(), 1);
        let rec = &result.records[0];
        assert_eq!(rec.canonical_key, "king-dedede");
        assert_eq!(rec.display_name, "King Dedede");
        assert_eq!(rec.attributes, BTreeMap::from([("secondary_weight".to_string(), json!(112))]));
        assert_eq!(rec.matched.iter().collect::<Vec<_>>(), vec!["primary", "secondary"]);
        assert_eq!(rec.source_identifiers["primary"], "K1");
        assert!(!rec.unmatched);
        assert_eq!(rec.state, RecordState::Enriched);
    }

    #[test]
    fn unmatched_candidate_creates_record() {
        let result = run(
            &config(),
            &input(
                vec![SourceRecord::new("Kirby")],
                vec![SourceRecord::new("Unknown Fighter").with_attr("weight", 50)],
            ),
        )
        .unwrap();

        assert_eq!(result.records.len(), 2);
        let kirby = &result.records[0];
        assert_eq!(kirby.canonical_key, "kirby");
        assert!(kirby.unmatched);

        let unknown = &result.records[1];
        assert_eq!(unknown.canonical_key, "unknown-fighter");
        assert!(unknown.unmatched);
        assert_eq!(unknown.attributes["secondary_weight"], json!(50));
        assert_eq!(result.report.orphans.len(), 1);
        assert!(result.report.orphans[0].created);
    }

    #[test]
    fn report_policy_keeps_orphans_out() {
        let toml = CONFIG.replace("secondaries = [\"secondary\"]", "secondaries = [\"secondary\"]\norphans = \"report\"");
        let config = MergeConfig::from_toml(&toml).unwrap();
        let result = run(
            &config,
            &input(vec![SourceRecord::new("Kirby")], vec![SourceRecord::new("Unknown Fighter")]),
        )
        .unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.report.orphans.len(), 1);
        assert!(!result.report.orphans[0].created);
    }

    #[test]
    fn duplicate_primary_keys_first_wins() {
        let result = run(
            &config(),
            &input(
                vec![
                    SourceRecord::new("Mr. Game & Watch").with_attr("tier", "B"),
                    SourceRecord::new("Mr Game and Watch").with_attr("tier", "X"),
                    SourceRecord::new("mr game & watch").with_attr("tier", "C"),
                ],
                vec![],
            ),
        )
        .unwrap();

        // "mr-game-and-watch" is a distinct key; the third row collides
        assert_eq!(result.records.len(), 2);
        let gnw = result.records.iter().find(|r| r.canonical_key == "mr-game-watch").unwrap();
        assert_eq!(gnw.attributes["primary_tier"], json!("B"));
        assert_eq!(result.report.ambiguous_aliases.len(), 1);
        assert_eq!(result.report.ambiguous_aliases[0].rejected_name, "mr game & watch");
    }

    #[test]
    fn second_candidate_for_same_record_is_reported() {
        let result = run(
            &config(),
            &input(
                vec![SourceRecord::new("Ness")],
                vec![
                    SourceRecord::new("Ness").with_attr("weight", 94),
                    SourceRecord::new("NESS").with_attr("weight", 1),
                ],
            ),
        )
        .unwrap();

        assert_eq!(result.records[0].attributes["secondary_weight"], json!(94));
        assert_eq!(result.report.duplicate_matches.len(), 1);
        assert_eq!(result.summary.duplicate_matches, 1);
    }

    #[test]
    fn id_only_candidate_named_from_alias() {
        let toml = format!("{CONFIG}\n[aliases.secondary.entries]\n\"Bowser\" = \"koopa\"\n");
        let config = MergeConfig::from_toml(&toml).unwrap();
        let result = run(
            &config,
            &input(
                vec![SourceRecord::new("Bowser"), SourceRecord::new("Bowser Jr.")],
                vec![SourceRecord::new("").with_id("koopa").with_attr("weight", 135)],
            ),
        )
        .unwrap();

        let bowser = &result.records[0];
        assert_eq!(bowser.canonical_key, "bowser");
        assert_eq!(bowser.attributes["secondary_weight"], json!(135));
        assert_eq!(bowser.source_identifiers["secondary"], "koopa");
        assert!(result.records[1].unmatched);
    }

    #[test]
    fn nameless_idless_candidate_is_empty_key_orphan() {
        let result = run(
            &config(),
            &input(vec![SourceRecord::new("Pit")], vec![SourceRecord::new("").with_attr("weight", 1)]),
        )
        .unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.report.orphans[0].reason, NoMatchReason::EmptyKey);
        assert!(!result.report.orphans[0].created);
    }

    #[test]
    fn missing_source_data() {
        let mut inp = input(vec![SourceRecord::new("Pit")], vec![]);
        inp.sources.remove("secondary");
        let err = run(&config(), &inp).unwrap_err();
        assert!(matches!(err, MergeError::UnknownSource(_)), "{err}");
    }

    #[test]
    fn seed_without_provenance_is_protected() {
        let mut seeded = EntityRecord::new("pit", "Pit");
        seeded.attributes.insert("secondary_weight".into(), json!(96));
        let mut inp = input(vec![SourceRecord::new("Pit").with_attr("weight", 1)], vec![]);
        inp.seed = vec![seeded];

        let result = run(&config(), &inp).unwrap();
        let pit = &result.records[0];
        assert_eq!(pit.provenance["secondary_weight"], "secondary");
        assert_eq!(pit.attributes["secondary_weight"], json!(96));
        assert_eq!(pit.attributes["primary_weight"], json!(1));
    }

    #[test]
    fn separator_only_names_never_become_records() {
        let result = run(
            &config(),
            &input(
                vec![SourceRecord::new("Pit"), SourceRecord::new(" ")],
                vec![SourceRecord::new(" ").with_attr("weight", 1), SourceRecord::new(" & ")],
            ),
        )
        .unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].canonical_key, "pit");
        assert!(result.records[0].attributes.is_empty());
        assert_eq!(result.report.orphans.len(), 3);
        assert!(result.report.orphans.iter().all(|o| o.reason == NoMatchReason::EmptyKey && !o.created));
    }

    #[test]
    fn duplicate_seed_keys_are_reported() {
        let mut first = EntityRecord::new("pit", "Pit");
        first.attributes.insert("secondary_weight".into(), json!(96));
        let mut second = EntityRecord::new("pit", "Pit");
        second.attributes.insert("secondary_weight".into(), json!(1));
        second.attributes.insert("secondary_speed".into(), json!(2));

        let mut inp = input(vec![SourceRecord::new("Pit")], vec![]);
        inp.seed = vec![first, second];
        let result = run(&config(), &inp).unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].attributes["secondary_weight"], json!(96));
        assert!(!result.records[0].attributes.contains_key("secondary_speed"));
        assert!(!result.schema.contains(&"secondary_speed".to_string()));
        assert_eq!(result.report.duplicate_seeds, vec!["pit".to_string()]);
        assert_eq!(result.summary.duplicate_seeds, 1);
    }
}
