//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Scripts rely on them, so existing values never change meaning.
//!
//! | Code | Description                                          |
//! |------|------------------------------------------------------|
//! | 0    | Success                                              |
//! | 1    | General error (unspecified)                          |
//! | 2    | CLI usage error (bad args)                           |
//! | 3    | Config could not be parsed or failed validation      |
//! | 4    | Runtime failure: unreadable input, merge error, sink |
//! | 5    | `--strict` and some entities stayed unresolved       |

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments. clap exits with this itself.
#[allow(dead_code)]
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Merge (3-5)
// =============================================================================

/// Config file is not valid TOML or fails validation.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Cannot read a config/source/alias/seed file, the merge aborted
/// (schema collision, missing source data), or a sink failed to write.
pub const EXIT_RUNTIME: u8 = 4;

/// `--strict` was given and the run left unmatched records or dropped orphans.
pub const EXIT_UNRESOLVED: u8 = 5;
