//! Test helpers shared by kelp's crates.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use kelp_engine::{Engine, EngineConfig};

/// A clonable in-memory sink. Clones share the same buffer, so a test can
/// hand one copy to the engine and keep another to inspect what was written.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let buf = self.0.lock().expect("buffer lock");
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.0.lock().expect("buffer lock");
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// An engine wired to in-memory sinks, with no init script.
///
/// Returns the engine plus handles to its output and diagnostic sinks.
pub fn test_engine() -> (Engine, SharedBuf, SharedBuf) {
    let out = SharedBuf::new();
    let err = SharedBuf::new();
    let config = EngineConfig::bare()
        .with_init_file(PathBuf::from("/nonexistent/kelp-test/init.lua"))
        .with_sinks(Box::new(out.clone()), Box::new(err.clone()));
    let engine = Engine::with_config(config).expect("engine construction");
    (engine, out, err)
}
