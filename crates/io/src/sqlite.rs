// Merged result export to SQLite

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;

use roster_merge::model::MergeResult;

const SCHEMA: &str = r#"
CREATE TABLE meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE source_identifiers (
    canonical_key TEXT NOT NULL,
    source TEXT NOT NULL,
    identifier TEXT NOT NULL,
    PRIMARY KEY (canonical_key, source)
);
"#;

const FIXED_COLUMNS: [&str; 5] = ["canonical_key", "display_name", "state", "unmatched", "matched"];

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// INTEGER if every value is an integer or boolean, REAL if numeric, else TEXT.
fn column_type(result: &MergeResult, column: &str) -> &'static str {
    let mut ty = None;
    for value in result.records.iter().filter_map(|r| r.attributes.get(column)) {
        let this = match value {
            Value::Null => continue,
            Value::Bool(_) => "INTEGER",
            Value::Number(n) if n.is_i64() || n.is_u64() => "INTEGER",
            Value::Number(_) => "REAL",
            _ => return "TEXT",
        };
        ty = match (ty, this) {
            (None, t) => Some(t),
            (Some("INTEGER"), "INTEGER") => Some("INTEGER"),
            _ => Some("REAL"),
        };
    }
    ty.unwrap_or("TEXT")
}

fn sql_value(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => SqlValue::Integer(i),
            (None, Some(f)) => SqlValue::Real(f),
            (None, None) => SqlValue::Text(n.to_string()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// SQLite identifiers are case-insensitive, so `calc_Weight` and
/// `calc_weight` cannot both be columns.
fn check_columns(schema: &[String]) -> Result<(), String> {
    let mut seen: BTreeSet<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
    for column in schema {
        if !seen.insert(column.to_lowercase()) {
            return Err(format!("column '{column}' clashes with another column in SQLite"));
        }
    }
    Ok(())
}

/// Write `entities` (one column per schema key), `source_identifiers` and `meta`.
pub fn save(result: &MergeResult, path: &Path) -> Result<(), String> {
    check_columns(&result.schema)?;

    if path.exists() {
        std::fs::remove_file(path).map_err(|e| e.to_string())?;
    }

    let mut conn = Connection::open(path).map_err(|e| e.to_string())?;
    conn.execute_batch(SCHEMA).map_err(|e| e.to_string())?;

    let mut ddl = String::from(
        "CREATE TABLE entities (\n    canonical_key TEXT PRIMARY KEY,\n    display_name TEXT NOT NULL,\n    \
         state TEXT NOT NULL,\n    unmatched INTEGER NOT NULL,\n    matched TEXT NOT NULL",
    );
    for column in &result.schema {
        ddl.push_str(&format!(",\n    {} {}", quote_ident(column), column_type(result, column)));
    }
    ddl.push_str("\n)");
    conn.execute_batch(&ddl).map_err(|e| e.to_string())?;

    let tx = conn.transaction().map_err(|e| e.to_string())?;

    let meta = [
        ("config_name", result.meta.config_name.clone()),
        ("primary", result.meta.primary.clone()),
        ("secondaries", result.meta.secondaries.join(",")),
        ("engine_version", result.meta.engine_version.clone()),
        ("run_at", result.meta.run_at.clone()),
        ("fingerprint", result.meta.fingerprint.clone()),
        ("records", result.summary.records.to_string()),
    ];
    for (key, value) in meta {
        tx.execute("INSERT INTO meta (key, value) VALUES (?1, ?2)", params![key, value])
            .map_err(|e| e.to_string())?;
    }

    {
        let columns: Vec<String> = FIXED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(result.schema.iter().map(|c| quote_ident(c)))
            .collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO entities ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        let mut stmt = tx.prepare(&sql).map_err(|e| e.to_string())?;
        let mut ids = tx
            .prepare("INSERT INTO source_identifiers (canonical_key, source, identifier) VALUES (?1, ?2, ?3)")
            .map_err(|e| e.to_string())?;

        for rec in &result.records {
            let mut values = vec![
                SqlValue::Text(rec.canonical_key.clone()),
                SqlValue::Text(rec.display_name.clone()),
                SqlValue::Text(rec.state.to_string()),
                SqlValue::Integer(i64::from(rec.unmatched)),
                SqlValue::Text(rec.matched.iter().cloned().collect::<Vec<_>>().join(";")),
            ];
            values.extend(
                result
                    .schema
                    .iter()
                    .map(|c| rec.attributes.get(c).map(sql_value).unwrap_or(SqlValue::Null)),
            );
            stmt.execute(params_from_iter(values)).map_err(|e| e.to_string())?;

            for (source, id) in &rec.source_identifiers {
                ids.execute(params![rec.canonical_key, source, id]).map_err(|e| e.to_string())?;
            }
        }
    }

    tx.commit().map_err(|e| e.to_string())?;
    log::debug!("{}: {} entities written", path.display(), result.records.len());
    Ok(())
}
