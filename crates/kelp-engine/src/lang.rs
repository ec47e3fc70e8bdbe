//! The embedded Lua host.
//!
//! One `LuaHost` per engine holds the session's shared namespace: names the
//! user defines accumulate in the globals across the whole session, and the
//! special `_` binding is refreshed from the value register before every
//! call. Completeness detection is delegated to Lua's own compiler, surfaced
//! by mlua as `Error::SyntaxError { incomplete_input }`.
//!
//! Two installs at construction shape the dispatch cascade:
//!
//! - `print` is overridden to capture output into a host-side buffer, so the
//!   engine can turn printed text into the next stage's value.
//! - A strict-globals `__index` metatable makes reading an unknown name an
//!   error. Without it a bare command word like `cat` would evaluate to `nil`
//!   and never fall through to the external-process path.

use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::{Function, Lua, Table, Value as LuaValue, Variadic};
use thiserror::Error;

use kelp_types::Value;

/// Registry slot holding the unique `ignore` sentinel table.
const IGNORE_KEY: &str = "kelp.ignore";

/// Errors from the host itself (construction and init-script loading).
///
/// Failures while evaluating user input are not represented here; they stay
/// `mlua::Error` and drive the dispatch cascade instead of being surfaced.
#[derive(Debug, Error)]
pub enum LangError {
    #[error("lua error: {0}")]
    Lua(#[from] mlua::Error),
    #[error("could not read init file {path}: {source}")]
    InitRead {
        path: PathBuf,
        source: io::Error,
    },
}

/// The result of a successful expression evaluation.
#[derive(Debug)]
pub struct Eval {
    /// The expression's value; `None` when it evaluated to `nil`.
    pub result: Option<Value>,
    /// Output captured from `print` during evaluation.
    pub printed: String,
    /// True when the result was the `ignore` sentinel.
    pub ignored: bool,
}

/// The result of feeding text to the statement path.
#[derive(Debug)]
pub enum Exec {
    /// The text is not a valid statement.
    Invalid(String),
    /// The text is a valid prefix of a larger statement; more lines needed.
    Incomplete,
    /// The statement compiled but raised at runtime.
    Error(String),
    /// The statement ran; carries the output captured from `print`.
    Done(String),
}

/// An embedded Lua interpreter holding one session's shared namespace.
pub struct LuaHost {
    lua: Lua,
    printed: Rc<RefCell<String>>,
}

impl LuaHost {
    pub fn new() -> Result<Self, LangError> {
        let lua = Lua::new();
        let printed = Rc::new(RefCell::new(String::new()));

        let buffer = printed.clone();
        let print = lua.create_function(move |lua, args: Variadic<LuaValue>| {
            let tostring: Function = lua.globals().get("tostring")?;
            let mut line = String::new();
            for (i, arg) in args.into_iter().enumerate() {
                if i > 0 {
                    line.push('\t');
                }
                let rendered: String = tostring.call(arg)?;
                line.push_str(&rendered);
            }
            line.push('\n');
            buffer.borrow_mut().push_str(&line);
            Ok(())
        })?;
        lua.globals().set("print", print)?;

        let ignore = lua.create_table()?;
        lua.globals().set("ignore", ignore.clone())?;
        lua.set_named_registry_value(IGNORE_KEY, ignore)?;

        // Strict globals. `_` stays readable as nil so expressions can test
        // it before any value exists.
        lua.load(
            r#"
            setmetatable(_G, {
                __index = function(_, name)
                    if name == "_" then
                        return nil
                    end
                    error("undefined name '" .. tostring(name) .. "'", 2)
                end,
            })
            "#,
        )
        .set_name("=(strict)")
        .exec()?;

        Ok(Self { lua, printed })
    }

    /// Evaluate `src` as a single expression with `_` bound to `current`.
    ///
    /// Any failure — parse or runtime, including the strict-globals trap on
    /// an unknown name — is returned as an error for the caller to treat as
    /// "not handled".
    pub fn eval(&self, src: &str, current: &Value) -> mlua::Result<Eval> {
        self.bind_current(current)?;
        self.printed.borrow_mut().clear();

        let chunk = format!("return {src}");
        let result: LuaValue = self.lua.load(&chunk).set_name("=(eval)").eval()?;

        let printed = std::mem::take(&mut *self.printed.borrow_mut());
        let ignored = self.is_ignore(&result)?;
        let result = match result {
            LuaValue::Nil => None,
            value => Some(self.from_lua(value)?),
        };

        Ok(Eval {
            result,
            printed,
            ignored,
        })
    }

    /// Feed `src` to the compiler and, when it is a complete statement,
    /// execute it with `_` bound to `current`.
    pub fn exec(&self, src: &str, current: &Value) -> Exec {
        if let Err(e) = self.bind_current(current) {
            return Exec::Error(e.to_string());
        }
        self.printed.borrow_mut().clear();

        let function = match self.lua.load(src).set_name("=(input)").into_function() {
            Ok(function) => function,
            Err(mlua::Error::SyntaxError {
                incomplete_input: true,
                message,
            }) => {
                // A bare word (`cat`) parses as a non-call expression
                // statement whose error also lands at end of input. The
                // parser emits exactly "syntax error near <eof>" for that
                // case and only that case; it is not a continuation.
                if bare_word_error(&message) {
                    return Exec::Invalid(message);
                }
                return Exec::Incomplete;
            }
            Err(mlua::Error::SyntaxError { message, .. }) => return Exec::Invalid(message),
            Err(e) => return Exec::Error(e.to_string()),
        };

        match function.call::<()>(()) {
            Ok(()) => Exec::Done(std::mem::take(&mut *self.printed.borrow_mut())),
            Err(e) => Exec::Error(e.to_string()),
        }
    }

    /// Run the user's init script into the shared namespace.
    ///
    /// Returns `None` when the file does not exist, otherwise the output the
    /// script printed while loading.
    pub fn load_init_file(&self, path: &Path) -> Result<Option<String>, LangError> {
        if !path.exists() {
            return Ok(None);
        }
        let source = std::fs::read_to_string(path).map_err(|source| LangError::InitRead {
            path: path.to_path_buf(),
            source,
        })?;

        self.printed.borrow_mut().clear();
        self.lua
            .load(&source)
            .set_name(format!("@{}", path.display()))
            .exec()?;

        Ok(Some(std::mem::take(&mut *self.printed.borrow_mut())))
    }

    fn bind_current(&self, current: &Value) -> mlua::Result<()> {
        let bound = self.to_lua(current)?;
        self.lua.globals().set("_", bound)
    }

    fn is_ignore(&self, value: &LuaValue) -> mlua::Result<bool> {
        if !matches!(value, LuaValue::Table(_)) {
            return Ok(false);
        }
        let sentinel: LuaValue = self.lua.named_registry_value(IGNORE_KEY)?;
        let rawequal: Function = self.lua.globals().get("rawequal")?;
        rawequal.call((value.clone(), sentinel))
    }

    fn to_lua(&self, value: &Value) -> mlua::Result<LuaValue> {
        Ok(match value {
            Value::Absent => LuaValue::Nil,
            Value::Bool(b) => LuaValue::Boolean(*b),
            Value::Int(i) => LuaValue::Integer(*i),
            Value::Float(x) => LuaValue::Number(*x),
            Value::Text(s) => LuaValue::String(self.lua.create_string(s)?),
            Value::Lines(lines) => LuaValue::Table(
                self.lua
                    .create_sequence_from(lines.iter().map(|line| line.as_str()))?,
            ),
        })
    }

    fn from_lua(&self, value: LuaValue) -> mlua::Result<Value> {
        Ok(match value {
            LuaValue::Nil => Value::Absent,
            LuaValue::Boolean(b) => Value::Bool(b),
            LuaValue::Integer(i) => Value::Int(i),
            LuaValue::Number(x) => Value::Float(x),
            LuaValue::String(s) => Value::Text(s.to_str()?.to_string()),
            LuaValue::Table(table) => self.table_to_value(table)?,
            other => Value::Text(self.tostring(other)?),
        })
    }

    /// Convert a sequence table of scalars to a line sequence; anything else
    /// falls back to its `tostring` form.
    fn table_to_value(&self, table: Table) -> mlua::Result<Value> {
        let mut lines = Vec::new();
        for item in table.clone().sequence_values::<LuaValue>() {
            match item? {
                LuaValue::String(s) => lines.push(s.to_str()?.to_string()),
                LuaValue::Boolean(b) => lines.push(b.to_string()),
                LuaValue::Integer(i) => lines.push(i.to_string()),
                LuaValue::Number(x) => lines.push(x.to_string()),
                _ => return Ok(Value::Text(self.tostring(LuaValue::Table(table))?)),
            }
        }

        let entries = table.clone().pairs::<LuaValue, LuaValue>().count();
        if entries == lines.len() {
            Ok(Value::Lines(lines))
        } else {
            Ok(Value::Text(self.tostring(LuaValue::Table(table))?))
        }
    }

    fn tostring(&self, value: LuaValue) -> mlua::Result<String> {
        let tostring: Function = self.lua.globals().get("tostring")?;
        tostring.call(value)
    }
}

/// True for the end-of-input error a lone non-call expression produces.
fn bare_word_error(message: &str) -> bool {
    message.ends_with("syntax error near <eof>")
        || message.ends_with("syntax error near '<eof>'")
}
