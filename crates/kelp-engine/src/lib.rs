//! kelp-engine: the core of kelp.
//!
//! This crate provides:
//!
//! - **Engine**: the per-command dispatch cascade (expression → statement →
//!   external process), the incomplete-input buffer, the value register, and
//!   the pipe-chain tracker
//! - **Lang**: the embedded Lua host — evaluation, execution,
//!   incremental-completeness detection, and the shared session namespace
//! - **Process**: captured external-process execution
//! - **Pty**: interactive external-process execution behind a pseudo-terminal
//! - **Line**: command-line splitting on unescaped pipe separators
//! - **Paths**: XDG-compliant path helpers for the init script and history

pub mod engine;
pub mod lang;
pub mod line;
pub mod paths;
pub mod process;
pub mod pty;

pub use engine::{Engine, EngineConfig, EngineError};
pub use line::split_command_line;
pub use process::ProcessError;

