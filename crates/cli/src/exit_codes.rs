//! CLI Exit Code Registry
//!
//! Single source of truth for `dataact` exit codes. Scripts and upload
//! pipelines branch on these, so they are part of the shell contract.
//!
//! | Code | Meaning                                              |
//! |------|------------------------------------------------------|
//! | 0    | Success: no error-severity entries                   |
//! | 1    | I/O failure (unreadable input, unwritable output)    |
//! | 2    | CLI usage error (bad args, unknown submission type)  |
//! | 3    | Validation finished and found errors                 |
//! | 4    | Configuration, schema or rule-load failure           |
//!
//! Warnings and info notices never change the exit code.

/// Success - no error-severity entries in the report.
pub const EXIT_SUCCESS: u8 = 0;

/// I/O failure - a file could not be opened, read or written.
pub const EXIT_IO: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// The report contains at least one error-severity entry.
pub const EXIT_VALIDATION_ERRORS: u8 = 3;

/// Config, schema file or rule set rejected at startup.
pub const EXIT_CONFIG: u8 = 4;

use dataact_validator::ValidatorError;

/// Map a startup error to its exit code.
pub fn validator_exit_code(err: &ValidatorError) -> u8 {
    match err {
        ValidatorError::Configuration(_) | ValidatorError::RuleLoad(_) => EXIT_CONFIG,
        ValidatorError::Io(_) => EXIT_IO,
    }
}
