//! `roster-merge` - Multi-source entity matching and attribute merging engine.
//!
//! Pure engine crate: receives pre-loaded source records, returns one merged
//! record per entity plus a report of everything it could not resolve.
//! No CLI or IO dependencies.

pub mod alias;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod matcher;
pub mod merger;
pub mod model;
pub mod normalize;

pub use alias::AliasTable;
pub use config::MergeConfig;
pub use engine::run;
pub use error::MergeError;
pub use matcher::EntityMatcher;
pub use merger::AttributeMerger;
pub use model::{EntityRecord, MergeInput, MergeResult, SourceRecord};
pub use normalize::{is_blank_key, normalize};
