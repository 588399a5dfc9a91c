//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success                                                   |
//! | 1    | Run finished but at least one group recorded an error     |
//! | 2    | CLI usage error (bad args)                                |
//! | 3    | Configuration error (settings file, env, credentials)     |
//! | 4    | Run could not start (auth rejected, patients not loaded)  |
//! | 5    | `single`: target patient not in the PG                    |
//! | 6    | Cannot write the `--output` file                          |

use regmerge_recon::ReconError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Reconciliation finished, but some groups have errors in their outcome.
pub const EXIT_GROUP_ERRORS: u8 = 1;

/// Usage error - bad arguments, missing required options.
/// clap exits with this code on its own parse failures.
pub const EXIT_USAGE: u8 = 2;

/// Settings could not be loaded or failed validation.
pub const EXIT_CONFIG: u8 = 3;

/// Registry rejected the credentials or the PG's patients could not be loaded.
pub const EXIT_RUN_START: u8 = 4;

/// `single --patient-id` names a patient the PG does not have.
pub const EXIT_TARGET_NOT_FOUND: u8 = 5;

/// The report could not be written to `--output`.
pub const EXIT_OUTPUT_WRITE: u8 = 6;

/// Map a fatal engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::InvalidOptions(_) => EXIT_CONFIG,
        ReconError::Auth { .. } | ReconError::FetchPatients { .. } => EXIT_RUN_START,
        ReconError::TargetNotFound { .. } => EXIT_TARGET_NOT_FOUND,
    }
}
