//! Point-in-time reads of pools, datasets and kernel statistics.

pub mod arc;
pub mod parser;

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::collector::traits::{CommandRunner, FileSystem};
use crate::model::{ArcStats, DatasetInfo, PoolInfo, PoolIoCounters};

use parser::{ParseError, parse_kstat_io, parse_kstat_named, parse_zfs_list, parse_zpool_list};

/// Default location of the ZFS kstat tree on Linux.
pub const DEFAULT_KSTAT_PATH: &str = "/proc/spl/kstat/zfs";

/// Arguments for the pool listing.
pub const ZPOOL_LIST_ARGS: [&str; 4] = ["list", "-Hp", "-o", "name,size,allocated,free,health"];

/// Arguments for a pool's recursive dataset listing, without the pool name.
pub const ZFS_LIST_ARGS: [&str; 7] = [
    "list",
    "-Hp",
    "-r",
    "-t",
    "filesystem,volume",
    "-o",
    "name,type,used,available,volsize",
];

/// Error type for collection failures.
#[derive(Debug)]
pub enum CollectError {
    /// I/O error reading a kstat file.
    Io(io::Error),
    /// A listing command could not be run or exited non-zero.
    Command { program: String, source: io::Error },
    /// Parse error in a listing or kstat file.
    Parse(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Command { program, source } => {
                write!(f, "command {} failed: {}", program, source)
            }
            CollectError::Parse(msg) => write!(f, "parse error: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Io(e) => Some(e),
            CollectError::Command { source, .. } => Some(source),
            CollectError::Parse(_) => None,
        }
    }
}

impl From<io::Error> for CollectError {
    fn from(e: io::Error) -> Self {
        CollectError::Io(e)
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e.message)
    }
}

/// Reads pool, dataset and ARC state from the storage system.
///
/// Every call is a fresh point-in-time read; nothing is cached here.
#[derive(Debug, Clone)]
pub struct ZfsCollector<F: FileSystem + Clone, C: CommandRunner + Clone> {
    fs: F,
    commands: C,
    kstat_path: PathBuf,
    zpool_bin: String,
    zfs_bin: String,
}

impl<F: FileSystem + Clone, C: CommandRunner + Clone> ZfsCollector<F, C> {
    /// Creates a collector using `zpool`/`zfs` from `$PATH`.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `commands` - Command runner (real or mock)
    /// * `kstat_path` - Base path of the ZFS kstat tree (usually "/proc/spl/kstat/zfs")
    pub fn new(fs: F, commands: C, kstat_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            commands,
            kstat_path: kstat_path.into(),
            zpool_bin: "zpool".to_string(),
            zfs_bin: "zfs".to_string(),
        }
    }

    /// Overrides the `zpool` and `zfs` executables.
    pub fn with_binaries(mut self, zpool: impl Into<String>, zfs: impl Into<String>) -> Self {
        self.zpool_bin = zpool.into();
        self.zfs_bin = zfs.into();
        self
    }

    pub fn kstat_path(&self) -> &Path {
        &self.kstat_path
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<String, CollectError> {
        trace!(program, ?args, "running listing command");
        self.commands
            .run(program, args)
            .map_err(|source| CollectError::Command {
                program: program.to_string(),
                source,
            })
    }

    /// Enumerates all imported pools.
    pub fn collect_pools(&self) -> Result<Vec<PoolInfo>, CollectError> {
        let output = self.run(&self.zpool_bin, &ZPOOL_LIST_ARGS)?;
        Ok(parse_zpool_list(&output)?)
    }

    /// Reads the cumulative root-vdev I/O counters of a pool.
    ///
    /// Pools without an `io` kstat report zero counters.
    pub fn collect_pool_io(&self, pool: &str) -> Result<PoolIoCounters, CollectError> {
        let path = self.kstat_path.join(pool).join("io");
        match self.fs.read_to_string(&path) {
            Ok(content) => Ok(parse_kstat_io(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(pool, path = %path.display(), "no io kstat, reporting zero counters");
                Ok(PoolIoCounters::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerates the descendant filesystems and volumes of a pool.
    ///
    /// The pool's root dataset itself is not included.
    pub fn collect_datasets(&self, pool: &str) -> Result<Vec<DatasetInfo>, CollectError> {
        let mut args: Vec<&str> = ZFS_LIST_ARGS.to_vec();
        args.push(pool);
        let output = self.run(&self.zfs_bin, &args)?;
        let mut datasets = parse_zfs_list(&output)?;
        datasets.retain(|d| d.name != pool);
        Ok(datasets)
    }

    /// Reads the ARC/L2ARC statistics. Keys missing from the kstat read as 0.
    pub fn collect_arcstats(&self) -> Result<ArcStats, CollectError> {
        let path = self.kstat_path.join("arcstats");
        let content = self.fs.read_to_string(&path)?;
        let stats = parse_kstat_named(&content)?;
        let get = |name: &str| stats.get(name).copied().unwrap_or(0);

        Ok(ArcStats {
            size: get("size"),
            meta_used: get("arc_meta_used"),
            data_size: get("data_size"),
            hits: get("hits"),
            misses: get("misses"),
            target_size: get("c"),
            mru_target_size: get("p"),
            l2_hits: get("l2_hits"),
            l2_misses: get("l2_misses"),
            l2_read_bytes: get("l2_read_bytes"),
            l2_write_bytes: get("l2_write_bytes"),
            l2_size: get("l2_size"),
        })
    }
}
