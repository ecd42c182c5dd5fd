//! `gridcalc` command-line host: runs line-oriented scripts against a
//! `gridcalc_engine::Sheet`.

pub mod exit_codes;
pub mod script;

pub use script::{parse_line, write_sheet, Command, PrintMode, RunSummary, Runner, ScriptError};
