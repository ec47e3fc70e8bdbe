//! kelp CLI entry point.
//!
//! Usage:
//!   kelp                  # Interactive REPL
//!   kelp -c <line>        # Run one command line and exit
//!   kelp script.kelp      # Run a file of command lines

use std::env;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kelp_repl::Repl;

fn main() -> ExitCode {
    // Respects RUST_LOG.
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {error:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None => {
            kelp_repl::run()?;
            Ok(ExitCode::SUCCESS)
        }

        Some("--help" | "-h") => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }

        Some("--version" | "-V") => {
            println!("kelp {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }

        Some("-c") => {
            let line = args.get(2).context("-c requires a command line argument")?;
            run_line(line)
        }

        Some(path) if !path.starts_with('-') => run_script(path),

        Some(unknown) => {
            eprintln!("Unknown option: {unknown}");
            eprintln!("Run 'kelp --help' for usage.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_help() {
    println!(
        r#"kelp v{} — a pipeline shell for Lua and external commands

Usage:
  kelp                  Interactive REPL
  kelp -c <line>        Run one command line and exit
  kelp <script>         Run a file of command lines

Options:
  -c <line>             Execute a command line and exit
  -h, --help            Show this help
  -V, --version         Show version

Inside a line, stages separated by `|` thread the current value `_`:
  kelp -c 'echo hi | cat'
  kelp -c '-6 | math.abs(_) | _ * 7'

Special commands (interactive):
  %cd [dir]             Change directory (home when omitted)
  %d                    Toggle debug tracing
  %t                    Toggle error traces (implies %d)
  %u                    Undo the last value change
  %r                    Reload the init script
  _                     Print the current value again
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Execute one command line and exit.
fn run_line(line: &str) -> Result<ExitCode> {
    let mut repl = Repl::new()?;
    if repl.run_command_line(line) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Run a file of command lines, stopping at the first failed line.
fn run_script(path: &str) -> Result<ExitCode> {
    let source =
        std::fs::read_to_string(path).with_context(|| format!("failed to read script: {path}"))?;

    let skip = usize::from(source.starts_with("#!"));
    let mut repl = Repl::new()?;

    for line in source.lines().skip(skip) {
        // Blank lines are continuation input only while a statement is open.
        if line.trim().is_empty() && !repl.incomplete() {
            continue;
        }
        if !repl.run_command_line(line) {
            return Ok(ExitCode::FAILURE);
        }
    }

    Ok(ExitCode::SUCCESS)
}
