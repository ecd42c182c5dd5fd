// Script runner - line-oriented commands driving a single Sheet
//
// One command per line; blank lines and lines starting with `#` are ignored:
//
//   set <A1> <text...>   text is the rest of the line after one space
//   clear <A1>
//   get <A1>             prints the value
//   text <A1>            prints the text as entered
//   size                 prints ROWSxCOLS
//   print values|texts   tab-separated grid
//   dump                 JSON snapshot of non-empty cells

use std::io::{self, BufRead, Write};

use clap::ValueEnum;
use thiserror::Error;

use gridcalc_engine::{Address, ParseAddressError, Sheet, SheetError};

/// How to render the whole sheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PrintMode {
    /// Computed values, tab-separated
    Values,
    /// Texts as entered, tab-separated
    Texts,
    /// JSON snapshot of non-empty cells
    Json,
    /// Nothing
    None,
}

/// A parsed script line.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Set { addr: Address, text: String },
    Clear(Address),
    Get(Address),
    Text(Address),
    Size,
    Print(PrintMode),
    Dump,
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("line {line}: unknown command '{command}'")]
    UnknownCommand { line: usize, command: String },

    #[error("line {line}: {message}")]
    Usage { line: usize, message: String },

    #[error("line {line}: bad address '{text}': {error}")]
    Address {
        line: usize,
        text: String,
        error: ParseAddressError,
    },

    #[error("line {line}: {error}")]
    Sheet { line: usize, error: SheetError },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ScriptError {
    /// 1-based script line, if the error belongs to one.
    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::UnknownCommand { line, .. }
            | ScriptError::Usage { line, .. }
            | ScriptError::Address { line, .. }
            | ScriptError::Sheet { line, .. } => Some(*line),
            ScriptError::Io(_) => None,
        }
    }
}

/// Parse one script line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<Command>, ScriptError> {
    let line = line.strip_suffix('\r').unwrap_or(line).trim_start();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let usage = |message: &str| ScriptError::Usage {
        line: line_no,
        message: message.to_string(),
    };

    let command = match word {
        "set" => {
            // The text keeps its spaces; only the one separator is consumed
            let (addr, text) = rest.split_once(' ').unwrap_or((rest, ""));
            Command::Set {
                addr: parse_address(line_no, addr)?,
                text: text.to_string(),
            }
        }
        "clear" => Command::Clear(parse_address(line_no, rest.trim())?),
        "get" => Command::Get(parse_address(line_no, rest.trim())?),
        "text" => Command::Text(parse_address(line_no, rest.trim())?),
        "size" => Command::Size,
        "dump" => Command::Dump,
        "print" => match rest.trim() {
            "values" => Command::Print(PrintMode::Values),
            "texts" => Command::Print(PrintMode::Texts),
            _ => return Err(usage("expected 'print values' or 'print texts'")),
        },
        _ => {
            return Err(ScriptError::UnknownCommand {
                line: line_no,
                command: word.to_string(),
            })
        }
    };

    Ok(Some(command))
}

fn parse_address(line: usize, text: &str) -> Result<Address, ScriptError> {
    text.parse().map_err(|error| ScriptError::Address {
        line,
        text: text.to_string(),
        error,
    })
}

/// Write the whole sheet in `mode`.
pub fn write_sheet<W: Write + ?Sized>(sheet: &Sheet, mode: PrintMode, out: &mut W) -> io::Result<()> {
    match mode {
        PrintMode::Values => sheet.print_values(out),
        PrintMode::Texts => sheet.print_texts(out),
        PrintMode::Json => {
            serde_json::to_writer_pretty(&mut *out, &sheet.snapshot())?;
            writeln!(out)
        }
        PrintMode::None => Ok(()),
    }
}

/// Outcome of a script run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Commands that ran successfully.
    pub executed: usize,
    /// Failures skipped over with `keep_going`.
    pub failures: Vec<ScriptError>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Executes script commands against an owned Sheet, writing command output
/// to `out`.
pub struct Runner<W: Write> {
    sheet: Sheet,
    out: W,
    keep_going: bool,
}

impl<W: Write> Runner<W> {
    pub fn new(out: W) -> Self {
        Self {
            sheet: Sheet::new(),
            out,
            keep_going: false,
        }
    }

    /// Continue past failing commands instead of stopping at the first.
    pub fn keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    pub fn into_parts(self) -> (Sheet, W) {
        (self.sheet, self.out)
    }

    /// Run every line of `input`.
    ///
    /// Without `keep_going` the first failing command is returned as the
    /// error. I/O errors always stop the run.
    pub fn run<R: BufRead>(&mut self, input: R) -> Result<RunSummary, ScriptError> {
        let mut summary = RunSummary::default();

        for (idx, line) in input.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;

            let outcome = parse_line(line_no, &line).and_then(|command| match command {
                Some(command) => self.execute(line_no, &command).map(Some),
                None => Ok(None),
            });

            match outcome {
                Ok(Some(())) => summary.executed += 1,
                Ok(None) => {}
                Err(e @ ScriptError::Io(_)) => return Err(e),
                Err(e) if self.keep_going => {
                    log::debug!("continuing past {}", e);
                    summary.failures.push(e);
                }
                Err(e) => return Err(e),
            }
        }

        self.out.flush()?;
        log::info!(
            "script done: {} commands, {} failures, {} cells",
            summary.executed,
            summary.failures.len(),
            self.sheet.cell_count()
        );
        Ok(summary)
    }

    /// Execute a single command.
    pub fn execute(&mut self, line: usize, command: &Command) -> Result<(), ScriptError> {
        let sheet_err = |error: SheetError| ScriptError::Sheet { line, error };
        log::debug!("line {}: {:?}", line, command);

        match command {
            Command::Set { addr, text } => self.sheet.set_cell(*addr, text).map_err(sheet_err)?,
            Command::Clear(addr) => self.sheet.clear_cell(*addr).map_err(sheet_err)?,
            Command::Get(addr) => {
                let value = self.sheet.value_at(*addr).map_err(sheet_err)?;
                writeln!(self.out, "{}", value)?;
            }
            Command::Text(addr) => {
                let text = self.sheet.text_at(*addr).map_err(sheet_err)?;
                writeln!(self.out, "{}", text)?;
            }
            Command::Size => writeln!(self.out, "{}", self.sheet.printable_size())?,
            Command::Print(mode) => write_sheet(&self.sheet, *mode, &mut self.out)?,
            Command::Dump => write_sheet(&self.sheet, PrintMode::Json, &mut self.out)?,
        }

        Ok(())
    }
}
