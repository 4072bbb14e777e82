// CSV source import / merged-result export

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use serde_json::{Map, Value};

use roster_merge::config::SourceConfig;
use roster_merge::model::{MergeResult, SourceRecord};

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        let target = counts.first().copied().unwrap_or(0);
        if target <= 1 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Integer, float, boolean, else text. Empty cells carry no value.
fn typed_cell(raw: &str) -> Option<Value> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() {
            return Some(Value::from(f));
        }
    }
    match s.to_ascii_lowercase().as_str() {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        _ => Some(Value::String(raw.to_string())),
    }
}

/// Header row names the fields; `name_field` is required.
pub fn load_rows(content: &str, sc: &SourceConfig) -> Result<Vec<SourceRecord>, String> {
    let name_field = sc
        .name_field
        .as_deref()
        .ok_or_else(|| "csv sources need a name_field".to_string())?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    if !headers.iter().any(|h| h == name_field) {
        return Err(format!("name_field '{name_field}' not in header"));
    }

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|e| format!("row {}: {e}", i + 2))?;
        let mut fields = Map::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            // Name and identifier stay text even when they look numeric.
            let value = if header == name_field || sc.id_field.as_deref() == Some(header) {
                let text = cell.trim();
                (!text.is_empty()).then(|| Value::String(text.to_string()))
            } else {
                typed_cell(cell)
            };
            if let Some(value) = value {
                fields.insert(header.to_string(), value);
            }
        }
        rows.push(crate::record_from_fields(fields, None, sc));
    }
    Ok(rows)
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One row per record: identity columns, `id_<source>` per source, then the schema.
pub fn export(result: &MergeResult, path: &Path) -> Result<(), String> {
    let id_sources: BTreeSet<&str> = result
        .records
        .iter()
        .flat_map(|r| r.source_identifiers.keys().map(String::as_str))
        .collect();

    let mut writer = csv::WriterBuilder::new().from_path(path).map_err(|e| e.to_string())?;

    let mut header: Vec<String> = ["canonical_key", "display_name", "state", "unmatched", "matched"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend(id_sources.iter().map(|s| format!("id_{s}")));
    header.extend(result.schema.iter().cloned());
    writer.write_record(&header).map_err(|e| e.to_string())?;

    for rec in &result.records {
        let mut row = vec![
            rec.canonical_key.clone(),
            rec.display_name.clone(),
            rec.state.to_string(),
            rec.unmatched.to_string(),
            rec.matched.iter().cloned().collect::<Vec<_>>().join(";"),
        ];
        for source in &id_sources {
            row.push(rec.source_identifiers.get(*source).cloned().unwrap_or_default());
        }
        for column in &result.schema {
            row.push(rec.attributes.get(column).map(cell_text).unwrap_or_default());
        }
        writer.write_record(&row).map_err(|e| e.to_string())?;
    }

    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}
