//! CLI Exit Code Registry
//!
//! Single source of truth for the exit codes of `casebook`. Schedulers and
//! wrapper scripts branch on them, so they are part of the shell contract.
//!
//! | Code | Meaning                                                     |
//! |------|-------------------------------------------------------------|
//! | 0    | Success (findings, if any, were reported and persisted)     |
//! | 1    | General error (unspecified)                                 |
//! | 2    | Usage error (bad arguments, unparseable date options)       |
//! | 3    | Invalid configuration (TOML syntax or semantic validation)  |
//! | 4    | Source precondition failed (missing column, bad date/count, |
//! |      | duplicate or decreasing dates, metric arity, empty source)  |
//! | 5    | A changed artifact violated its schema; nothing was written |
//! | 6    | I/O failure reading sources or previous state, or writing   |
//! | 7    | Artifacts were published but the notification failed       |
//!
//! Data findings never change the exit code. They are reported on stderr,
//! in the `--json` report and in the persisted finding list.
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into [`recon_exit_code`] or the command's error handling

use casebook_recon::ReconError;

/// Success - the run completed.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments. clap exits with this code on its own.
pub const EXIT_USAGE: u8 = 2;

/// Config file could not be parsed or failed validation.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// A source file broke a shape precondition of the pipeline.
pub const EXIT_PRECONDITION: u8 = 4;

/// A changed artifact failed schema validation.
pub const EXIT_SCHEMA: u8 = 5;

/// Reading or writing files, or fetching previous state, failed.
pub const EXIT_IO: u8 = 6;

/// Publication succeeded but the notification could not be delivered.
pub const EXIT_NOTIFY: u8 = 7;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ReconError::SchemaViolation { .. } => EXIT_SCHEMA,
        ReconError::Io(_) => EXIT_IO,
        e if e.is_precondition() => EXIT_PRECONDITION,
        _ => EXIT_ERROR,
    }
}
