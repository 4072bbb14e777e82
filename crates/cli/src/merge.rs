//! `roster run` / `roster validate` - config-driven multi-source merging.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use roster_merge::model::{MergeInput, MergeResult};
use roster_merge::{MergeConfig, MergeError};

use crate::exit_codes::{EXIT_ERROR, EXIT_INVALID_CONFIG, EXIT_RUNTIME, EXIT_UNRESOLVED};
use crate::CliError;

fn merge_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn engine_err(e: MergeError) -> CliError {
    match e {
        MergeError::ConfigParse(_) | MergeError::ConfigValidation(_) => merge_err(EXIT_INVALID_CONFIG, e.to_string()),
        MergeError::SchemaCollision { .. } => merge_err(EXIT_RUNTIME, e.to_string())
            .with_hint("rename one of the sources so their `{source}_` prefixes cannot overlap"),
        MergeError::FlattenCollision { .. } => merge_err(EXIT_RUNTIME, e.to_string())
            .with_hint("change the source's `nested` rename or the clashing field so each column is written once"),
        MergeError::UnknownSource(_) | MergeError::Io(_) => merge_err(EXIT_RUNTIME, e.to_string()),
    }
}

fn read_config(config_path: &Path) -> Result<MergeConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| merge_err(EXIT_RUNTIME, format!("cannot read config: {e}")))?;
    MergeConfig::from_toml(&config_str).map_err(engine_err)
}

/// Read every source, alias list and seed the config names.
fn load_input(config: &MergeConfig, base_dir: &Path, seed_override: Option<&Path>) -> Result<MergeInput, CliError> {
    let mut input = MergeInput::default();

    for name in config.source_order() {
        let Some(sc) = config.sources.get(name) else {
            continue;
        };
        let path = base_dir.join(&sc.file);
        let rows = roster_io::load_source(&path, sc).map_err(|e| engine_err(MergeError::Io(e)))?;
        input.sources.insert(name.to_string(), rows);
    }

    for (source, ac) in &config.aliases {
        let Some(file) = &ac.file else {
            continue;
        };
        let path = base_dir.join(file);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| merge_err(EXIT_RUNTIME, format!("cannot read {}: {e}", path.display())))?;
        let list = roster_io::json::load_aliases(&content, source)
            .map_err(|e| merge_err(EXIT_RUNTIME, format!("{}: {e}", path.display())))?;
        input.aliases.push(list);
    }

    // An explicit --seed must exist; the config's seed may not yet (first run).
    let seed_path = match (seed_override, &config.output.seed) {
        (Some(path), _) => Some(path.to_path_buf()),
        (None, Some(file)) => {
            let path = base_dir.join(file);
            if path.exists() {
                Some(path)
            } else {
                log::info!("seed {} not found, starting empty", path.display());
                None
            }
        }
        (None, None) => None,
    };
    if let Some(path) = seed_path {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| merge_err(EXIT_RUNTIME, format!("cannot read seed {}: {e}", path.display())))?;
        input.seed = roster_io::json::load_seed(&content)
            .map_err(|e| merge_err(EXIT_RUNTIME, format!("{}: {e}", path.display())))?;
        eprintln!("seeded {} record(s) from {}", input.seed.len(), path.display());
    }

    Ok(input)
}

fn write_sinks(
    config: &MergeConfig,
    base_dir: &Path,
    result: &MergeResult,
    output_override: Option<&Path>,
) -> Result<(), CliError> {
    let json_path = output_override
        .map(Path::to_path_buf)
        .or_else(|| config.output.json.as_ref().map(|f| base_dir.join(f)));

    if let Some(path) = json_path {
        roster_io::json::export(result, &path)
            .map_err(|e| merge_err(EXIT_RUNTIME, format!("cannot write {}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }
    if let Some(file) = &config.output.csv {
        let path = base_dir.join(file);
        roster_io::csv::export(result, &path)
            .map_err(|e| merge_err(EXIT_RUNTIME, format!("cannot write {}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }
    if let Some(file) = &config.output.sqlite {
        let path = base_dir.join(file);
        roster_io::sqlite::save(result, &path)
            .map_err(|e| merge_err(EXIT_RUNTIME, format!("cannot write {}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}

fn print_summary(result: &MergeResult) {
    let s = &result.summary;
    eprintln!(
        "roster '{}': {} records, {} enriched, {} unmatched, {} columns",
        result.meta.config_name, s.records, s.enriched, s.unmatched, s.columns,
    );

    let strategies: Vec<String> = s.strategy_counts.iter().map(|(k, v)| format!("{k}={v}")).collect();
    if !strategies.is_empty() {
        eprintln!("matches: {}", strategies.join(", "));
    }
    if s.orphans > 0 {
        eprintln!("orphans: {} ({} created as unmatched records)", s.orphans, s.orphans_created);
    }
    for item in &result.report.review {
        eprintln!(
            "review: {} '{}' -> {} ({})",
            item.source, item.candidate_name, item.matched_key, item.strategy
        );
    }
    for alias in &result.report.ambiguous_aliases {
        eprintln!(
            "ambiguous: {} '{}' and '{}' both normalize to {}",
            alias.source, alias.kept_name, alias.rejected_name, alias.canonical_key
        );
    }
    if s.duplicate_matches > 0 {
        eprintln!("duplicate matches skipped: {}", s.duplicate_matches);
    }
    for key in &result.report.duplicate_seeds {
        eprintln!("seed: duplicate record '{key}' ignored");
    }
}

pub fn cmd_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    seed_file: Option<PathBuf>,
    strict: bool,
) -> Result<(), CliError> {
    let config = read_config(&config_path)?;

    // Resolve file paths relative to config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));

    let input = load_input(&config, base_dir, seed_file.as_deref())?;
    let counts: BTreeMap<&str, usize> = input.sources.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
    log::info!("loaded {counts:?}");

    let result = roster_merge::run(&config, &input).map_err(engine_err)?;

    write_sinks(&config, base_dir, &result, output_file.as_deref())?;

    if json_output {
        let json_str = serde_json::to_string_pretty(&result)
            .map_err(|e| merge_err(EXIT_ERROR, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    }

    print_summary(&result);

    let s = &result.summary;
    let unresolved = s.unmatched + (s.orphans - s.orphans_created);
    if strict && unresolved > 0 {
        return Err(merge_err(EXIT_UNRESOLVED, format!("{unresolved} unresolved entities (--strict)")));
    }
    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let alias_lists = config.aliases.values().filter(|a| a.file.is_some()).count();
    let inline: usize = config.aliases.values().map(|a| a.entries.len()).sum();

    eprintln!(
        "valid: '{}' with primary '{}', {} secondary source(s), {} alias file(s), {} inline alias(es)",
        config.name,
        config.primary,
        config.secondaries.len(),
        alias_lists,
        inline,
    );
    Ok(())
}
