//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `gridcalc` exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Success                                                  |
//! | 1    | A script command failed (bad command or sheet error)     |
//! | 2    | CLI usage error (bad args), reported by clap             |
//! | 3    | I/O error (unreadable script, closed output)             |

use crate::script::ScriptError;

/// Success - every command ran.
pub const EXIT_SUCCESS: u8 = 0;

/// A script line could not be parsed, or the sheet rejected it.
pub const EXIT_SCRIPT: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Reading the script or writing output failed.
pub const EXIT_IO: u8 = 3;

/// Map an error from running a script to an exit code.
///
/// Errors that are not `ScriptError`s come from opening the script file.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ScriptError>() {
        Some(ScriptError::Io(_)) => EXIT_IO,
        Some(_) => EXIT_SCRIPT,
        None if err.downcast_ref::<std::io::Error>().is_some() => EXIT_IO,
        None => EXIT_SCRIPT,
    }
}
