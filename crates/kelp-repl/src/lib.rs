//! kelp REPL — the line-oriented front end for the pipeline engine.
//!
//! This crate reads one line of text at a time and drives the engine:
//!
//! - administrative `%` commands (`%cd`, `%d`, `%t`, `%u`, `%r`) and the bare
//!   `_` re-print command are handled here, before dispatch
//! - everything else is split on unescaped `|` separators and fed to the
//!   engine stage by stage
//! - the prompt tracks the engine's continuation state (`>>> ` vs `... `)
//! - line editing, filename completion, and persisted history come from
//!   rustyline

use std::path::PathBuf;

use anyhow::{Context, Result};
use rustyline::completion::FilenameCompleter;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Completer, Editor, Helper, Highlighter, Hinter, Validator};

use kelp_engine::{paths, split_command_line, Engine};

const PS1: &str = ">>> ";
const PS2: &str = "... ";

/// Editor helper: filename completion, nothing else.
#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct ReplHelper {
    #[rustyline(Completer)]
    completer: FilenameCompleter,
}

/// REPL state: the engine plus the prompt-level continuation flag.
pub struct Repl {
    engine: Engine,
    incomplete: bool,
}

impl Repl {
    /// Create a REPL around a fresh engine (loads the user's init script).
    pub fn new() -> Result<Self> {
        let engine = Engine::new().context("failed to create engine")?;
        Ok(Self::with_engine(engine))
    }

    /// Wrap an existing engine. Used by tests and the CLI.
    pub fn with_engine(engine: Engine) -> Self {
        Self {
            engine,
            incomplete: false,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// True when the next line continues an incomplete statement.
    pub fn incomplete(&self) -> bool {
        self.incomplete
    }

    /// The prompt matching the current continuation state.
    pub fn prompt(&self) -> &'static str {
        if self.incomplete {
            PS2
        } else {
            PS1
        }
    }

    /// Abandon the current command line and return to top-level state.
    pub fn interrupt(&mut self) {
        self.engine.reset();
        self.incomplete = false;
    }

    /// Run one full command line.
    ///
    /// Returns false when the line was abandoned because a stage failed; the
    /// engine has already reset itself in that case.
    pub fn run_command_line(&mut self, line: &str) -> bool {
        let commands = split_command_line(line);
        let total = commands.len();
        for (i, command) in commands.iter().enumerate() {
            if !self.run_command(command, i + 1, total) {
                return false;
            }
        }
        true
    }

    fn run_command(&mut self, command: &str, position: usize, total: usize) -> bool {
        if self.handle_special(command) {
            return true;
        }

        match self.engine.run(command, position, total) {
            Ok(outcome) => {
                self.incomplete = outcome.incomplete;
                if outcome.should_print {
                    if let Err(error) = self.engine.print() {
                        eprintln!("print failed: {error}");
                    }
                }
                true
            }
            Err(error) => {
                // The engine already reset itself; revert the prompt too.
                eprintln!("{error}");
                self.incomplete = false;
                false
            }
        }
    }

    /// Administrative commands, checked before dispatch.
    fn handle_special(&mut self, command: &str) -> bool {
        let trimmed = command.trim();

        if trimmed == "%cd" || trimmed.starts_with("%cd ") {
            let rest = trimmed["%cd".len()..].trim();
            let target = if rest.is_empty() {
                home_dir()
            } else {
                PathBuf::from(rest)
            };
            if let Err(error) = self.engine.change_directory(&target) {
                eprintln!("{error}");
            }
            return true;
        }

        match trimmed {
            "%d" => {
                self.engine.toggle_debug();
                true
            }
            "%t" => {
                self.engine.toggle_error_traces();
                // Error traces are only visible with debug tracing on.
                if self.engine.error_traces_enabled() && !self.engine.debug_enabled() {
                    self.engine.toggle_debug();
                }
                true
            }
            "%u" => {
                self.engine.undo();
                true
            }
            "%r" => {
                match self.engine.load_init_file() {
                    Ok(true) => eprintln!("Reloaded."),
                    Ok(false) => eprintln!(
                        "Init file {} does not exist.",
                        self.engine.init_path().display()
                    ),
                    Err(error) => eprintln!("{error}"),
                }
                true
            }
            "_" => {
                if let Err(error) = self.engine.print() {
                    eprintln!("print failed: {error}");
                }
                true
            }
            _ => false,
        }
    }
}

fn home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Run the interactive REPL until end-of-input.
pub fn run() -> Result<()> {
    println!("kelp v{}", env!("CARGO_PKG_VERSION"));
    println!("Lua and shell commands share the line; `_` threads between stages.");

    let mut rl: Editor<ReplHelper, DefaultHistory> =
        Editor::new().context("failed to create editor")?;
    rl.set_helper(Some(ReplHelper {
        completer: FilenameCompleter::new(),
    }));

    let history_path = paths::history_file();
    if let Some(ref path) = history_path {
        if let Err(error) = rl.load_history(path) {
            // Missing history is expected on first run.
            let not_found = matches!(&error, ReadlineError::Io(io_error)
                if io_error.kind() == std::io::ErrorKind::NotFound);
            if !not_found {
                tracing::warn!("failed to load history: {error}");
            }
        }
    }

    let mut repl = Repl::new()?;

    loop {
        match rl.readline(repl.prompt()) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(error) = rl.add_history_entry(line.as_str()) {
                        tracing::warn!("failed to add history entry: {error}");
                    }
                }
                repl.run_command_line(&line);
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("^C");
                repl.interrupt();
            }
            Err(ReadlineError::Eof) => {
                eprintln!("^D");
                break;
            }
            Err(error) => {
                eprintln!("Error: {error}");
                break;
            }
        }
    }

    save_history(&mut rl, &history_path);
    Ok(())
}

fn save_history(rl: &mut Editor<ReplHelper, DefaultHistory>, history_path: &Option<PathBuf>) {
    if let Some(path) = history_path {
        if let Some(parent) = path.parent() {
            if let Err(error) = std::fs::create_dir_all(parent) {
                tracing::warn!("failed to create history directory: {error}");
            }
        }
        if let Err(error) = rl.save_history(path) {
            tracing::warn!("failed to save history: {error}");
        }
    }
}
