use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::error::MergeError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MergeConfig {
    pub name: String,
    /// Source whose records define the entity set.
    pub primary: String,
    /// Sources resolved against the entity set, in this order.
    #[serde(default)]
    pub secondaries: Vec<String>,
    #[serde(default)]
    pub orphans: OrphanPolicy,
    #[serde(default)]
    pub matching: MatchingConfig,
    pub sources: BTreeMap<String, SourceConfig>,
    #[serde(default)]
    pub aliases: BTreeMap<String, AliasConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Orphans + matching
// ---------------------------------------------------------------------------

/// What to do with a secondary candidate no strategy could resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Create a new record flagged unmatched.
    #[default]
    Create,
    /// Only list it in the report.
    Report,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_true")]
    pub substring_fallback: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { substring_fallback: true }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    #[default]
    Json,
    Csv,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    pub file: String,
    #[serde(default)]
    pub format: SourceFormat,
    /// Field holding the display name. JSON objects keyed by name need none.
    #[serde(default)]
    pub name_field: Option<String>,
    #[serde(default)]
    pub id_field: Option<String>,
    /// Drop everything up to and including the first occurrence of this
    /// delimiter in names, e.g. `"_"` turns `"23_king-dedede"` into `"king-dedede"`.
    #[serde(default)]
    pub strip_name_prefix: Option<String>,
    /// Fields never copied into the attribute bag.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Nested bag key -> sub-namespace.
    #[serde(default)]
    pub nested: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Aliases + output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AliasConfig {
    /// JSON object of `display name -> identifier`.
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub json: Option<String>,
    #[serde(default)]
    pub csv: Option<String>,
    #[serde(default)]
    pub sqlite: Option<String>,
    /// Previous JSON output to start from.
    #[serde(default)]
    pub seed: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + validate
// ---------------------------------------------------------------------------

impl MergeConfig {
    pub fn from_toml(s: &str) -> Result<Self, MergeError> {
        let config: Self = toml::from_str(s).map_err(|e| MergeError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        for name in self.sources.keys() {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(MergeError::ConfigValidation(format!(
                    "source name {name:?} must be non-empty and contain no whitespace"
                )));
            }
        }

        if !self.sources.contains_key(&self.primary) {
            return Err(MergeError::ConfigValidation(format!(
                "primary source '{}' is not declared under [sources]",
                self.primary
            )));
        }

        let mut seen = BTreeSet::new();
        for name in &self.secondaries {
            if name == &self.primary {
                return Err(MergeError::ConfigValidation(format!(
                    "source '{name}' is both primary and secondary"
                )));
            }
            if !self.sources.contains_key(name) {
                return Err(MergeError::ConfigValidation(format!(
                    "secondary source '{name}' is not declared under [sources]"
                )));
            }
            if !seen.insert(name) {
                return Err(MergeError::ConfigValidation(format!(
                    "secondary source '{name}' is listed twice"
                )));
            }
        }

        for name in self.aliases.keys() {
            if !self.sources.contains_key(name) {
                return Err(MergeError::ConfigValidation(format!(
                    "aliases given for undeclared source '{name}'"
                )));
            }
        }

        Ok(())
    }

    /// Primary first, then secondaries in order.
    pub fn source_order(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.secondaries.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
name = "Roster"
primary = "hitboxes"
secondaries = ["calculator"]

[sources.hitboxes]
file = "characters.csv"
format = "csv"
name_field = "character_id"
strip_name_prefix = "_"

[sources.calculator]
file = "attributes.json"
id_field = "internal_name"
exclude = ["game_name"]
[sources.calculator.nested]
Params = "param"

[aliases.calculator.entries]
"Bowser" = "koopa"
"#;

    #[test]
    fn parse_basic() {
        let config = MergeConfig::from_toml(BASIC).unwrap();
        assert_eq!(config.name, "Roster");
        assert_eq!(config.orphans, OrphanPolicy::Create);
        assert!(config.matching.substring_fallback);
        assert_eq!(config.sources["hitboxes"].format, SourceFormat::Csv);
        assert_eq!(config.sources["calculator"].format, SourceFormat::Json);
        assert_eq!(config.sources["calculator"].nested["Params"], "param");
        assert_eq!(config.aliases["calculator"].entries["Bowser"], "koopa");
        assert_eq!(config.source_order().collect::<Vec<_>>(), vec!["hitboxes", "calculator"]);
    }

    #[test]
    fn orphan_policy_and_matching() {
        let toml = BASIC.replace(
            "secondaries = [\"calculator\"]",
            "secondaries = [\"calculator\"]\norphans = \"report\"\n[matching]\nsubstring_fallback = false",
        );
        let config = MergeConfig::from_toml(&toml).unwrap();
        assert_eq!(config.orphans, OrphanPolicy::Report);
        assert!(!config.matching.substring_fallback);
    }

    #[test]
    fn undeclared_primary() {
        let toml = BASIC.replace("primary = \"hitboxes\"", "primary = \"nope\"");
        let err = MergeConfig::from_toml(&toml).unwrap_err();
        assert!(matches!(err, MergeError::ConfigValidation(_)), "{err}");
    }

    #[test]
    fn primary_listed_as_secondary() {
        let toml = BASIC.replace("[\"calculator\"]", "[\"calculator\", \"hitboxes\"]");
        let err = MergeConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("both primary and secondary"), "{err}");
    }

    #[test]
    fn duplicate_secondary() {
        let toml = BASIC.replace("[\"calculator\"]", "[\"calculator\", \"calculator\"]");
        let err = MergeConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("listed twice"), "{err}");
    }

    #[test]
    fn aliases_for_unknown_source() {
        let toml = format!("{BASIC}\n[aliases.ghost.entries]\n\"Kirby\" = \"kirby\"\n");
        let err = MergeConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("undeclared source 'ghost'"), "{err}");
    }

    #[test]
    fn bad_toml() {
        let err = MergeConfig::from_toml("name = ").unwrap_err();
        assert!(matches!(err, MergeError::ConfigParse(_)));
    }
}
