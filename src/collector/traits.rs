//! Abstractions over the storage system's query surfaces.
//!
//! The `FileSystem` trait covers kstat files, the `CommandRunner` trait
//! covers the `zpool`/`zfs` listing commands. Both have a real implementation
//! for production and an in-memory mock (see [`crate::collector::mock`]) so
//! collectors can be tested without a ZFS host.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Abstraction for filesystem operations.
///
/// This trait allows collectors to read from the real filesystem or from
/// a mock implementation for testing purposes.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    ///
    /// # Arguments
    /// * `path` - Path to the file to read
    ///
    /// # Returns
    /// The file contents as a string, or an I/O error if the file cannot be read.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Abstraction for running a short-lived command and capturing its stdout.
///
/// Used for `zpool list` / `zfs list`, which print one point-in-time
/// listing and exit.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and returns its standard output.
    ///
    /// A non-zero exit status is reported as an error carrying the
    /// command's stderr.
    fn run(&self, program: &str, args: &[&str]) -> io::Result<String>;
}

/// Runs commands through `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealCommand;

impl RealCommand {
    /// Creates a new `RealCommand` instance.
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for RealCommand {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<String> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(io::Error::other(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
