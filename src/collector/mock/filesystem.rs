//! In-memory mock filesystem for testing collectors without real kstat files.
//!
//! Clones share the same underlying storage, so a test can keep one handle
//! and rewrite counter files while a sampler thread reads through another.

use crate::collector::traits::FileSystem;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// In-memory filesystem for testing: a flat map from path to contents.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: Arc<RwLock<HashMap<PathBuf, String>>>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a file with the given content.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.insert(path.as_ref().to_path_buf(), content.into());
    }

    /// Removes a file.
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.remove(path.as_ref());
    }

    /// Writes the `io` kstat of a pool under `kstat_root`.
    ///
    /// Only the four counters the collector reads are meaningful; the rest
    /// of the row is zero-filled the way an idle pool reports them.
    pub fn set_pool_io(
        &self,
        kstat_root: impl AsRef<Path>,
        pool: &str,
        nread: u64,
        nwritten: u64,
        reads: u64,
        writes: u64,
    ) {
        let content = format!(
            "12 3 0x00 1 80 1520138781 2218418458811\n\
             nread    nwritten reads    writes   wtime    wlentime wupdate  rtime    rlentime rupdate  wcnt     rcnt\n\
             {nread} {nwritten} {reads} {writes} 0 0 0 0 0 0 0 0\n"
        );
        self.add_file(kstat_root.as_ref().join(pool).join("io"), content);
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }
}
