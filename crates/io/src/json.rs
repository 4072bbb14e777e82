// JSON sources, alias lists, seeds and result export

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde_json::Value;

use roster_merge::config::SourceConfig;
use roster_merge::model::{AliasList, EntityRecord, MergeResult, SourceRecord};

/// Either an object keyed by display name or an array of objects.
pub fn load_rows(content: &str, sc: &SourceConfig) -> Result<Vec<SourceRecord>, String> {
    let doc: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;

    match doc {
        Value::Object(entries) => entries
            .into_iter()
            .map(|(name, value)| match value {
                Value::Object(fields) => Ok(crate::record_from_fields(fields, Some(&name), sc)),
                other => Err(format!("entry '{name}' is {}, expected an object", kind(&other))),
            })
            .collect(),
        Value::Array(items) => {
            if sc.name_field.is_none() {
                return Err("array sources need a name_field".to_string());
            }
            items
                .into_iter()
                .enumerate()
                .map(|(i, value)| match value {
                    Value::Object(fields) => Ok(crate::record_from_fields(fields, None, sc)),
                    other => Err(format!("item {i} is {}, expected an object", kind(&other))),
                })
                .collect()
        }
        other => Err(format!("top level is {}, expected an object or array", kind(&other))),
    }
}

/// `{ "display name": "identifier", ... }` for one source.
pub fn load_aliases(content: &str, source: &str) -> Result<AliasList, String> {
    let doc: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let map = match doc {
        Value::Object(map) => map,
        other => return Err(format!("alias list is {}, expected an object", kind(&other))),
    };

    let mut entries = Vec::with_capacity(map.len());
    for (name, id) in map {
        let id = match id {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            other => return Err(format!("alias '{name}' is {}, expected a string", kind(&other))),
        };
        entries.push((name, id));
    }
    Ok(AliasList { source: source.to_string(), entries })
}

/// Records from a previous run: a full result document or a bare record array.
pub fn load_seed(content: &str) -> Result<Vec<EntityRecord>, String> {
    let doc: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let records = match doc {
        Value::Object(mut map) => map
            .remove("records")
            .ok_or_else(|| "seed object has no 'records' field".to_string())?,
        array @ Value::Array(_) => array,
        other => return Err(format!("seed is {}, expected an object or array", kind(&other))),
    };
    serde_json::from_value(records).map_err(|e| format!("seed records: {e}"))
}

/// Write the full result (meta, summary, schema, records, report).
pub fn export(result: &MergeResult, path: &Path) -> Result<(), String> {
    let file = File::create(path).map_err(|e| e.to_string())?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, result).map_err(|e| e.to_string())?;
    Ok(())
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn object_keyed_by_name() {
        let content = r#"{
            "Ness": { "weight": 94, "Params": { "gravity": 0.069 } },
            "Lucas": { "weight": 94, "internal_name": "lucas" }
        }"#;
        let sc = SourceConfig { id_field: Some("internal_name".into()), ..SourceConfig::default() };
        let rows = load_rows(content, &sc).unwrap();

        assert_eq!(rows.len(), 2);
        let lucas = rows.iter().find(|r| r.display_name == "Lucas").unwrap();
        assert_eq!(lucas.source_id.as_deref(), Some("lucas"));
        let ness = rows.iter().find(|r| r.display_name == "Ness").unwrap();
        assert_eq!(ness.source_id, None);
        assert_eq!(ness.attributes["Params"], json!({"gravity": 0.069}));
    }

    #[test]
    fn object_keeps_file_order() {
        let content = r#"{
            "mr game & watch": { "tier": "first" },
            "Mr. Game & Watch": { "tier": "second" }
        }"#;
        let rows = load_rows(content, &SourceConfig::default()).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(names, vec!["mr game & watch", "Mr. Game & Watch"]);
    }

    #[test]
    fn alias_list_keeps_file_order() {
        let list = load_aliases(r#"{ "zelda": "first", "Zelda": "second" }"#, "calculator").unwrap();
        assert_eq!(
            list.entries,
            vec![("zelda".to_string(), "first".to_string()), ("Zelda".to_string(), "second".to_string())]
        );
    }

    #[test]
    fn first_row_in_file_wins() {
        use roster_merge::config::MergeConfig;
        use roster_merge::model::MergeInput;

        let content = r#"{
            "mr game & watch": { "tier": "first" },
            "Mr. Game & Watch": { "tier": "second" }
        }"#;
        let config = MergeConfig::from_toml("name = \"order\"\nprimary = \"r\"\n[sources.r]\nfile = \"r.json\"\n").unwrap();
        let input = MergeInput {
            sources: [("r".to_string(), load_rows(content, &config.sources["r"]).unwrap())].into_iter().collect(),
            ..MergeInput::default()
        };
        let result = roster_merge::run(&config, &input).unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].attributes["r_tier"], json!("first"));
        assert_eq!(result.report.ambiguous_aliases[0].rejected_name, "Mr. Game & Watch");
    }

    #[test]
    fn array_needs_name_field() {
        let content = r#"[{ "game_name": "Pit", "weight": 96 }]"#;
        let err = load_rows(content, &SourceConfig::default()).unwrap_err();
        assert!(err.contains("name_field"), "{err}");

        let sc = SourceConfig { name_field: Some("game_name".into()), ..SourceConfig::default() };
        let rows = load_rows(content, &sc).unwrap();
        assert_eq!(rows[0].display_name, "Pit");
        assert_eq!(rows[0].attributes["weight"], json!(96));
    }

    #[test]
    fn rejects_scalars() {
        let sc = SourceConfig { name_field: Some("n".into()), ..SourceConfig::default() };
        assert!(load_rows("[1]", &sc).unwrap_err().contains("item 0 is a number"));
        assert!(load_rows(r#"{"Pit": 3}"#, &sc).unwrap_err().contains("entry 'Pit'"));
        assert!(load_rows("\"x\"", &sc).is_err());
    }

    #[test]
    fn alias_list() {
        let list = load_aliases(r#"{ "Bowser": "koopa", "Mii Brawler": 51 }"#, "calculator").unwrap();
        assert_eq!(list.source, "calculator");
        assert!(list.entries.contains(&("Bowser".to_string(), "koopa".to_string())));
        assert!(list.entries.contains(&("Mii Brawler".to_string(), "51".to_string())));

        assert!(load_aliases(r#"{ "Bowser": null }"#, "calculator").is_err());
    }

    #[test]
    fn seed_from_bare_array_or_result() {
        let records = r#"[{ "canonical_key": "pit", "display_name": "Pit",
            "attributes": { "calc_weight": 96 }, "unmatched": false, "state": "enriched" }]"#;
        let seed = load_seed(records).unwrap();
        assert_eq!(seed[0].canonical_key, "pit");
        assert_eq!(seed[0].attributes["calc_weight"], json!(96));

        let wrapped = format!(r#"{{ "meta": {{}}, "records": {records} }}"#);
        assert_eq!(load_seed(&wrapped).unwrap(), seed);

        assert!(load_seed(r#"{ "meta": {} }"#).unwrap_err().contains("records"));
    }

    #[test]
    fn seed_missing_state_defaults() {
        let seed = load_seed(r#"[{ "canonical_key": "pit", "display_name": "Pit" }]"#).unwrap();
        assert!(!seed[0].unmatched);
        assert!(seed[0].matched.is_empty());
    }

    #[test]
    fn export_then_seed() {
        use roster_merge::config::MergeConfig;
        use roster_merge::model::MergeInput;

        let config = MergeConfig::from_toml(
            "name = \"seeded\"\nprimary = \"roster\"\n[sources.roster]\nfile = \"r.json\"\n",
        )
        .unwrap();
        let input = MergeInput {
            sources: [("roster".to_string(), vec![SourceRecord::new("Pit").with_attr("series", "Kid Icarus")])]
                .into_iter()
                .collect(),
            ..MergeInput::default()
        };
        let result = roster_merge::run(&config, &input).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("merged.json");
        export(&result, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let doc: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(doc["meta"]["config_name"], "seeded");
        assert_eq!(doc["schema"], json!(["roster_series"]));

        let seed = load_seed(&content).unwrap();
        assert_eq!(seed, result.records);
    }
}
