//! Canned command outputs for testing collectors without `zpool`/`zfs`.

use crate::collector::traits::CommandRunner;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, RwLock};

/// Replays registered stdout for exact command lines.
///
/// The key is the program followed by its arguments, space-joined.
/// Clones share the same table, so tests can change a listing between
/// publish cycles.
#[derive(Debug, Clone, Default)]
pub struct MockCommand {
    outputs: Arc<RwLock<HashMap<String, String>>>,
}

impl MockCommand {
    /// Creates a runner that knows no commands.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the stdout of a command line.
    pub fn set_output(&self, program: &str, args: &[&str], stdout: impl Into<String>) {
        let mut outputs = self.outputs.write().unwrap_or_else(|e| e.into_inner());
        outputs.insert(command_key(program, args), stdout.into());
    }

    /// Forgets a command line; running it afterwards fails.
    pub fn remove(&self, program: &str, args: &[&str]) {
        let mut outputs = self.outputs.write().unwrap_or_else(|e| e.into_inner());
        outputs.remove(&command_key(program, args));
    }
}

fn command_key(program: &str, args: &[&str]) -> String {
    let mut key = program.to_string();
    for arg in args {
        key.push(' ');
        key.push_str(arg);
    }
    key
}

impl CommandRunner for MockCommand {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<String> {
        let key = command_key(program, args);
        let outputs = self.outputs.read().unwrap_or_else(|e| e.into_inner());
        outputs.get(&key).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("command not mocked: {}", key),
            )
        })
    }
}
