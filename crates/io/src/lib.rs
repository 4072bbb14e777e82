// Source loaders and output sinks

pub mod csv;
pub mod json;
pub mod sqlite;

use std::path::Path;

use serde_json::{Map, Value};

use roster_merge::config::{SourceConfig, SourceFormat};
use roster_merge::model::SourceRecord;

/// Load one configured source file into candidate records.
pub fn load_source(path: &Path, sc: &SourceConfig) -> Result<Vec<SourceRecord>, String> {
    let rows = match sc.format {
        SourceFormat::Json => {
            let content = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
            json::load_rows(&content, sc)
        }
        SourceFormat::Csv => {
            let content = csv::read_file_as_utf8(path).map_err(|e| format!("{}: {e}", path.display()))?;
            csv::load_rows(&content, sc)
        }
    }
    .map_err(|e| format!("{}: {e}", path.display()))?;

    log::debug!("{}: {} rows ({})", path.display(), rows.len(), sc.format);
    Ok(rows)
}

/// Split a loaded field map into name, identifier and attribute bag.
///
/// `fallback_name` is used when the source has no `name_field` (JSON objects
/// keyed by display name).
pub(crate) fn record_from_fields(
    mut fields: Map<String, Value>,
    fallback_name: Option<&str>,
    sc: &SourceConfig,
) -> SourceRecord {
    let named = sc.name_field.as_ref().and_then(|f| fields.remove(f)).map(scalar_text);
    let mut display_name = named.or_else(|| fallback_name.map(String::from)).unwrap_or_default();

    if let Some(delim) = sc.strip_name_prefix.as_deref().filter(|d| !d.is_empty()) {
        if let Some((_, rest)) = display_name.split_once(delim) {
            display_name = rest.to_string();
        }
    }

    let source_id = sc
        .id_field
        .as_ref()
        .and_then(|f| fields.remove(f))
        .filter(|v| !v.is_null())
        .map(scalar_text)
        .filter(|id| !id.is_empty());

    for field in &sc.exclude {
        fields.remove(field);
    }

    SourceRecord {
        display_name,
        source_id,
        attributes: fields.into_iter().collect(),
    }
}

/// Strings as-is, integers as their decimal text, anything else as JSON.
pub(crate) fn scalar_text(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
