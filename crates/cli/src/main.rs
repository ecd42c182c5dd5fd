// gridcalc CLI - runs spreadsheet scripts headlessly

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gridcalc_cli::exit_codes::{exit_code, EXIT_SCRIPT, EXIT_SUCCESS};
use gridcalc_cli::{write_sheet, PrintMode, Runner};

#[derive(Parser)]
#[command(name = "gridcalc")]
#[command(about = "Spreadsheet engine with lazy recalculation (script mode, headless)")]
#[command(version)]
struct Cli {
    /// Log filter (e.g. `debug`, `gridcalc_engine=debug`)
    #[arg(long, global = true, env = "GRIDCALC_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command script against a fresh sheet
    #[command(after_help = "\
Script commands (one per line, '#' starts a comment):
  set <A1> <text...>    clear <A1>    get <A1>    text <A1>
  size                  print values|texts        dump

Examples:
  gridcalc run budget.grid
  printf 'set A1 2\\nset B1 =A1*21\\n' | gridcalc run --print texts")]
    Run {
        /// Script file (omit to read from stdin)
        script: Option<PathBuf>,

        /// What to print once the script finishes
        #[arg(long, value_enum, default_value_t = PrintMode::Values)]
        print: PrintMode,

        /// Continue after a failing command, reporting it on stderr
        #[arg(long)]
        keep_going: bool,
    },
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    // init also installs the `log` bridge for the engine's records
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = match cli.command {
        Commands::Run {
            script,
            print,
            keep_going,
        } => cmd_run(script, print, keep_going),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

// ============================================================================
// run
// ============================================================================

fn cmd_run(script: Option<PathBuf>, print: PrintMode, keep_going: bool) -> Result<u8> {
    let input: Box<dyn BufRead> = match &script {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open script {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };

    let stdout = io::stdout();
    let mut runner = Runner::new(stdout.lock()).keep_going(keep_going);
    let summary = runner.run(input)?;

    for failure in &summary.failures {
        eprintln!("error: {}", failure);
    }

    let (sheet, mut out) = runner.into_parts();
    write_sheet(&sheet, print, &mut out).map_err(gridcalc_cli::ScriptError::from)?;
    out.flush().map_err(gridcalc_cli::ScriptError::from)?;

    Ok(if summary.is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_SCRIPT
    })
}
