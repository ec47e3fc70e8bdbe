//! XDG-compliant paths for kelp's on-disk collaborators.
//!
//! | Purpose | Location |
//! |---------|----------|
//! | Init script | `$XDG_CONFIG_HOME/kelp/init.lua` |
//! | REPL history | `$XDG_DATA_HOME/kelp/history.txt` |

use std::path::PathBuf;

use directories::BaseDirs;

/// Path of the user's init script.
///
/// Falls back to a dotfile in the current directory when no home directory
/// can be determined.
pub fn init_file() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("kelp").join("init.lua"))
        .unwrap_or_else(|| PathBuf::from(".kelp-init.lua"))
}

/// Path of the persisted REPL history, when a home directory exists.
pub fn history_file() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.data_dir().join("kelp").join("history.txt"))
}
