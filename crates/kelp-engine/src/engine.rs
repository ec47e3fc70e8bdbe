//! The pipeline dispatch engine.
//!
//! One `Engine` per session owns the value register, the incomplete-input
//! buffer, the pipe-chain tracker, and the embedded Lua host. Each command
//! string fed to [`Engine::run`] is classified by a fixed cascade:
//!
//! ```text
//! command ──▶ expression? ──▶ statement? ──▶ external process
//!             (cheapest to     (may owe a     (always handles,
//!              disprove)        continuation)  unless it fails)
//! ```
//!
//! The cascade is ordered from most specific to most general so that a bare
//! value, a defined helper call, and an external binary name can share the
//! same surface syntax without the user marking which one they mean. Each
//! classifier returns a [`Disposition`]; "not handled" drives the
//! fall-through, it is never surfaced to the caller.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use kelp_types::{RunOutcome, Value};

use crate::lang::{Exec, LangError, LuaHost};
use crate::process::{self, ProcessError};
use crate::{paths, pty};

/// Fixed indentation marker prefixed to every debug trace line.
const TRACE_INDENT: &str = "                    ";

/// Errors surfaced by engine operations.
///
/// Classification fall-through is internal; whatever reaches the caller here
/// has already triggered an implicit reset (except directory changes, which
/// leave all state untouched).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    /// No path accepted the text. Only possible for input that is
    /// simultaneously invalid code and not a runnable external command.
    #[error("could not handle command {0:?}")]
    Unhandled(String),
    #[error("no such directory: {}", .0.display())]
    NoSuchDirectory(PathBuf),
    #[error(transparent)]
    Lang(#[from] LangError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What one classifier in the dispatch cascade decided.
enum Disposition {
    /// The input does not belong to this path; try the next one.
    NotHandled,
    /// The path accepted the input.
    Handled { should_print: bool },
    /// The path accepted the input but failed in a way the caller must see.
    Failed(EngineError),
}

/// Construction options for [`Engine`].
pub struct EngineConfig {
    /// Load the user's init script during construction.
    pub load_init: bool,
    /// Override the init script location (defaults to [`paths::init_file`]).
    pub init_file: Option<PathBuf>,
    /// Sink for [`Engine::print`] output.
    pub out: Box<dyn Write>,
    /// Sink for diagnostics and debug traces.
    pub err: Box<dyn Write>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            load_init: true,
            init_file: None,
            out: Box::new(io::stdout()),
            err: Box::new(io::stderr()),
        }
    }
}

impl EngineConfig {
    /// A configuration that skips the user's init script. Used by tests and
    /// by callers that want a pristine namespace.
    pub fn bare() -> Self {
        Self {
            load_init: false,
            ..Self::default()
        }
    }

    /// Replace both output sinks.
    pub fn with_sinks(mut self, out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        self.out = out;
        self.err = err;
        self
    }

    /// Use a specific init script path.
    pub fn with_init_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.init_file = Some(path.into());
        self
    }
}

/// The per-session dispatch engine.
pub struct Engine {
    /// The implicit current value threaded between stages.
    value: Value,
    /// Snapshot of `value` taken at the start of the most recent `run`.
    previous: Value,
    /// Accumulated text of an as-yet-incomplete statement.
    pending: String,
    /// True when process commands should take `value` as piped input.
    in_pipeline: bool,
    debug: bool,
    trace_on_error: bool,
    lang: LuaHost,
    init_path: PathBuf,
    out: Box<dyn Write>,
    err: Box<dyn Write>,
}

impl Engine {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, EngineError> {
        let lang = LuaHost::new()?;
        let mut engine = Self {
            value: Value::Absent,
            previous: Value::Absent,
            pending: String::new(),
            in_pipeline: false,
            debug: false,
            trace_on_error: false,
            lang,
            init_path: config.init_file.unwrap_or_else(paths::init_file),
            out: config.out,
            err: config.err,
        };
        if config.load_init {
            engine.load_init_file()?;
        }
        Ok(engine)
    }

    /// Dispatch one pipeline stage.
    ///
    /// `position` is 1-based within the `total` stages of the current line.
    /// Mutates the value register; returns whether a continuation line is
    /// owed and whether the caller should print the value.
    pub fn run(
        &mut self,
        command: &str,
        position: usize,
        total: usize,
    ) -> Result<RunOutcome, EngineError> {
        tracing::debug!(command, position, total, "dispatching");
        self.trace(format!("Processing {command:?}."));
        self.previous = self.value.clone();

        let trimmed = command.trim();
        let full_text = if self.pending.is_empty() {
            trimmed.to_string()
        } else if trimmed.is_empty() {
            // A blank continuation contributes nothing but its newline.
            format!("{}\n", self.pending)
        } else {
            // Continuations keep the raw text; indentation may matter to the
            // embedded language.
            format!("{}\n{}", self.pending, command)
        };

        // In a pipeline if we already were, if this is not the first command
        // of a multi-command line, or if a multi-command line begins with a
        // bare separator.
        self.in_pipeline = self.in_pipeline
            || position > 1
            || (total > 1 && position == 1 && full_text.is_empty());
        self.trace(if self.in_pipeline {
            "In pipeline."
        } else {
            "Not in pipeline."
        });

        let is_last = position == total;
        let cascade: [(&str, fn(&mut Self, &str, bool) -> Disposition); 3] = [
            ("expression", Self::try_eval),
            ("statement", Self::try_exec),
            ("process", Self::try_process),
        ];

        for (name, classify) in cascade {
            match classify(self, &full_text, is_last) {
                Disposition::NotHandled => continue,
                Disposition::Handled { should_print } => {
                    tracing::debug!(path = name, "handled");
                    if is_last {
                        // A line ending in a bare separator keeps the chain
                        // open into the next line; anything else closes it.
                        self.in_pipeline = full_text.is_empty();
                    }
                    return Ok(RunOutcome {
                        incomplete: !self.pending.is_empty(),
                        should_print,
                    });
                }
                Disposition::Failed(error) => {
                    self.reset();
                    return Err(error);
                }
            }
        }

        self.reset();
        Err(EngineError::Unhandled(command.to_string()))
    }

    /// Expression path: evaluate the text as a single expression with `_`
    /// bound to the current value and print output captured.
    fn try_eval(&mut self, full_text: &str, is_last: bool) -> Disposition {
        if full_text.is_empty() {
            self.trace("Eval skipped (command empty).");
            return Disposition::NotHandled;
        }
        // A comment-only line would evaluate as a bare `return` and clear
        // the register; let the statement path take it as a no-op instead.
        if full_text.starts_with("--") {
            self.trace("Eval skipped (comment).");
            return Disposition::NotHandled;
        }

        self.trace(format!("Trying eval {full_text:?}."));
        let eval = match self.lang.eval(full_text, &self.value) {
            Ok(eval) => eval,
            Err(error) => {
                self.trace(format!("Could not eval: {error}."));
                if self.trace_on_error {
                    self.trace(format!("{error:#}"));
                }
                return Disposition::NotHandled;
            }
        };

        self.trace(format!("Eval returned {:?}.", eval.result));
        self.pending.clear();
        let mut should_print = is_last;

        if eval.ignored {
            // The sentinel leaves the register untouched.
            should_print = false;
        } else {
            self.value = match eval.result {
                Some(Value::Text(text)) => Value::Text(strip_one_newline(text)),
                Some(value) => value,
                None if eval.printed.is_empty() => {
                    should_print = false;
                    Value::Absent
                }
                None => {
                    self.trace(format!("Eval printed {:?}.", eval.printed));
                    text_or_lines(strip_one_newline(eval.printed))
                }
            };
        }

        Disposition::Handled { should_print }
    }

    /// Statement path: feed the text to the incremental compiler, buffering
    /// it when more lines are needed.
    fn try_exec(&mut self, full_text: &str, is_last: bool) -> Disposition {
        self.trace(format!("Trying to compile {full_text:?}."));
        match self.lang.exec(full_text, &self.value) {
            Exec::Invalid(message) => {
                self.trace(format!("Syntax error: {message}."));
                self.pending.clear();
                Disposition::NotHandled
            }
            Exec::Incomplete => {
                self.trace("Incomplete command.");
                self.pending = full_text.to_string();
                Disposition::Handled {
                    should_print: false,
                }
            }
            // A statement that compiled but raised falls through: a
            // syntactically valid line naming an undefined external command
            // degrades into a shell attempt.
            Exec::Error(message) => {
                self.trace(format!("Could not exec: {message}."));
                if self.trace_on_error {
                    self.trace(message);
                }
                self.pending.clear();
                Disposition::NotHandled
            }
            Exec::Done(printed) => {
                self.trace("Exec succeeded.");
                self.pending.clear();
                let mut should_print = is_last;
                if printed.is_empty() {
                    should_print = false;
                } else {
                    self.trace(format!("Exec printed {printed:?}."));
                    self.value = text_or_lines(strip_one_newline(printed));
                }
                Disposition::Handled { should_print }
            }
        }
    }

    /// Process path: hand the text to the external backend, piping the
    /// current value in when inside a pipeline chain.
    fn try_process(&mut self, full_text: &str, is_last: bool) -> Disposition {
        self.trace(format!(
            "Trying process {:?} with value {:?}.",
            full_text, self.value
        ));
        let piped = if self.in_pipeline {
            self.value.render_piped()
        } else {
            None
        };

        // The last stage of a line gets the pseudo-terminal when the session
        // is attached to one; earlier stages and non-terminal sessions run
        // captured.
        let interactive = is_last && pty::stdio_is_terminal();
        let result = if interactive {
            pty::run_interactive(full_text, piped.as_deref())
        } else {
            process::run_captured(full_text, piped.as_deref())
        };

        match result {
            Err(error) => Disposition::Failed(EngineError::Process(error)),
            Ok(output) => {
                self.trace(format!("Process returned {output:?}."));
                // An interactive run already echoed its output live.
                let mut should_print = is_last && !interactive;
                if output.is_empty() {
                    self.value = Value::Lines(Vec::new());
                    should_print = false;
                } else {
                    let stripped = strip_one_newline(output);
                    self.value =
                        Value::Lines(stripped.split('\n').map(str::to_string).collect());
                }
                Disposition::Handled { should_print }
            }
        }
    }

    /// Render the current value to the output sink.
    ///
    /// Text is printed with at most one trailing newline ensured, a line
    /// sequence as newline-joined lines, anything else via its default
    /// textual form. Idempotent between runs.
    pub fn print(&mut self) -> io::Result<()> {
        match &self.value {
            Value::Text(text) => {
                if text.ends_with('\n') {
                    write!(self.out, "{text}")?;
                } else {
                    writeln!(self.out, "{text}")?;
                }
            }
            Value::Lines(lines) => writeln!(self.out, "{}", lines.join("\n"))?,
            other => writeln!(self.out, "{other}")?,
        }
        self.out.flush()
    }

    /// Change the process's working directory.
    ///
    /// Never touches the value register, so an administrative action cannot
    /// overwrite the pipeline value.
    pub fn change_directory(&self, path: &Path) -> Result<(), EngineError> {
        if let Err(error) = std::env::set_current_dir(path) {
            if error.kind() == io::ErrorKind::NotFound {
                return Err(EngineError::NoSuchDirectory(path.to_path_buf()));
            }
            return Err(error.into());
        }
        Ok(())
    }

    /// Run the user's init script into the shared namespace.
    ///
    /// Returns false when the script does not exist.
    pub fn load_init_file(&mut self) -> Result<bool, EngineError> {
        let loaded = self.lang.load_init_file(&self.init_path)?;
        match loaded {
            None => Ok(false),
            Some(printed) => {
                if !printed.is_empty() {
                    self.out.write_all(printed.as_bytes())?;
                    self.out.flush()?;
                }
                Ok(true)
            }
        }
    }

    pub fn toggle_debug(&mut self) {
        self.debug = !self.debug;
    }

    pub fn toggle_error_traces(&mut self) {
        self.trace_on_error = !self.trace_on_error;
    }

    /// Restore the value register from the snapshot taken before the most
    /// recent `run`.
    pub fn undo(&mut self) {
        self.value = self.previous.clone();
    }

    /// Clear the volatile session state: the continuation buffer, the
    /// pipeline chain, and the value register (snapshotted for undo first).
    pub fn reset(&mut self) {
        self.previous = std::mem::take(&mut self.value);
        self.pending.clear();
        self.in_pipeline = false;
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// True when the engine is owed a continuation line.
    pub fn incomplete(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn in_pipeline(&self) -> bool {
        self.in_pipeline
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    pub fn error_traces_enabled(&self) -> bool {
        self.trace_on_error
    }

    pub fn init_path(&self) -> &Path {
        &self.init_path
    }

    /// Emit one debug trace line to the diagnostic sink. Observational only.
    fn trace(&mut self, message: impl AsRef<str>) {
        if self.debug {
            let _ = writeln!(self.err, "{TRACE_INDENT}{}", message.as_ref());
        }
    }
}

/// Strip at most one trailing newline.
fn strip_one_newline(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
    }
    text
}

/// Multi-line text becomes a line sequence, anything else stays text.
fn text_or_lines(text: String) -> Value {
    if text.contains('\n') {
        Value::Lines(text.split('\n').map(str::to_string).collect())
    } else {
        Value::Text(text)
    }
}
