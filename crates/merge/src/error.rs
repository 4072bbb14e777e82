use std::fmt;

#[derive(Debug)]
pub enum MergeError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (undeclared source, duplicate secondary, etc.).
    ConfigValidation(String),
    /// A source named by the config has no loaded records.
    UnknownSource(String),
    /// A namespaced attribute key is already owned by a different source.
    SchemaCollision {
        canonical_key: String,
        attribute: String,
        existing_source: String,
        incoming_source: String,
    },
    /// Two fields of one source bag flatten to the same namespaced key.
    FlattenCollision {
        canonical_key: String,
        source: String,
        attribute: String,
    },
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::UnknownSource(source) => write!(f, "unknown source: {source}"),
            Self::SchemaCollision { canonical_key, attribute, existing_source, incoming_source } => {
                write!(
                    f,
                    "record '{canonical_key}': attribute '{attribute}' belongs to source \
                     '{existing_source}', refusing write from '{incoming_source}'"
                )
            }
            Self::FlattenCollision { canonical_key, source, attribute } => {
                write!(f, "record '{canonical_key}': two '{source}' fields flatten to '{attribute}'")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for MergeError {}
