//! Pre-built mock ZFS hosts for testing.
//!
//! These scenarios provide realistic `zpool`/`zfs` listings and kstat files
//! for testing collectors, samplers and the publisher.

use std::path::PathBuf;

use super::command::MockCommand;
use super::filesystem::MockFs;
use crate::collector::zfs::{DEFAULT_KSTAT_PATH, ZFS_LIST_ARGS, ZPOOL_LIST_ARGS, ZfsCollector};

/// `arcstats` of a host with 1 GiB of ARC, 80% hit rate and a small L2ARC.
pub const TYPICAL_ARCSTATS: &str = "\
13 1 0x01 96 26112 1947061339 1088937898436088
name                            type data
hits                            4    800
misses                          4    200
demand_data_hits                4    600
size                            4    1073741824
c                               4    2147483648
p                               4    1073741824
c_min                           4    33554432
c_max                           4    4294967296
data_size                       4    805306368
arc_meta_used                   4    268435456
l2_hits                         4    4294967301
l2_misses                       4    7
l2_read_bytes                   4    10240
l2_write_bytes                  4    4398046511104
l2_size                         4    1048576
";

/// A mock host: a shared filesystem, shared command outputs and the kstat
/// root they are laid out under.
#[derive(Debug, Clone)]
pub struct MockZfsHost {
    pub fs: MockFs,
    pub commands: MockCommand,
    pub kstat_path: PathBuf,
}

impl Default for MockZfsHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockZfsHost {
    /// An empty host: no pools, no kstats.
    pub fn new() -> Self {
        let host = Self {
            fs: MockFs::new(),
            commands: MockCommand::new(),
            kstat_path: PathBuf::from(DEFAULT_KSTAT_PATH),
        };
        host.set_pools(&[]);
        host
    }

    /// Two pools with datasets, I/O counters and ARC statistics.
    ///
    /// * `tank`: 16 MiB, half used, ONLINE, with two filesystems and a volume.
    /// * `backup`: ~2 TB, DEGRADED, with one filesystem.
    pub fn typical_system() -> Self {
        let host = Self::new();

        host.set_pools(&[
            ("tank", 16777216, 8388608, 8388608, "ONLINE"),
            ("backup", 2_000_000_000_000, 1_500_000_000_000, 500_000_000_000, "DEGRADED"),
        ]);
        host.set_datasets(
            "tank",
            &[
                ("tank", "filesystem", 8000000, 8000000, None),
                ("tank/home", "filesystem", 4096000, 8000000, None),
                ("tank/home/alice", "filesystem", 1024000, 8000000, None),
                ("tank/vm0", "volume", 2097152, 8000000, Some(4194304)),
            ],
        );
        host.set_datasets(
            "backup",
            &[
                ("backup", "filesystem", 1_500_000_000_000, 500_000_000_000, None),
                ("backup/archive", "filesystem", 1_400_000_000_000, 500_000_000_000, None),
            ],
        );

        host.set_pool_io("tank", 1_048_576, 2_097_152, 100, 200);
        host.set_pool_io("backup", 0, 0, 0, 0);
        host.fs
            .add_file(host.kstat_path.join("arcstats"), TYPICAL_ARCSTATS);

        host
    }

    /// Replaces the `zpool list` output.
    ///
    /// Rows are `(name, size, allocated, free, health)`.
    pub fn set_pools(&self, pools: &[(&str, u64, u64, u64, &str)]) {
        let mut out = String::new();
        for (name, size, allocated, free, health) in pools {
            out.push_str(&format!("{name}\t{size}\t{allocated}\t{free}\t{health}\n"));
        }
        self.commands.set_output("zpool", &ZPOOL_LIST_ARGS, out);
    }

    /// Replaces the `zfs list` output of one pool.
    ///
    /// Rows are `(name, type, used, available, volsize)`.
    pub fn set_datasets(&self, pool: &str, datasets: &[(&str, &str, u64, u64, Option<u64>)]) {
        let mut out = String::new();
        for (name, kind, used, available, volsize) in datasets {
            let volsize = volsize.map_or_else(|| "-".to_string(), |v| v.to_string());
            out.push_str(&format!("{name}\t{kind}\t{used}\t{available}\t{volsize}\n"));
        }
        let mut args: Vec<&str> = ZFS_LIST_ARGS.to_vec();
        args.push(pool);
        self.commands.set_output("zfs", &args, out);
    }

    /// Replaces the `io` kstat of one pool.
    pub fn set_pool_io(&self, pool: &str, nread: u64, nwritten: u64, reads: u64, writes: u64) {
        self.fs
            .set_pool_io(&self.kstat_path, pool, nread, nwritten, reads, writes);
    }

    /// A collector reading this host.
    pub fn collector(&self) -> ZfsCollector<MockFs, MockCommand> {
        ZfsCollector::new(self.fs.clone(), self.commands.clone(), &self.kstat_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::collector::traits::{CommandRunner, FileSystem};

    #[test]
    fn test_typical_system_layout() {
        let host = MockZfsHost::typical_system();

        assert!(host.fs.read_to_string(Path::new("/proc/spl/kstat/zfs/arcstats")).is_ok());
        assert!(host.fs.read_to_string(Path::new("/proc/spl/kstat/zfs/tank/io")).is_ok());

        let listing = host.commands.run("zpool", &ZPOOL_LIST_ARGS).unwrap();
        assert_eq!(listing.lines().count(), 2);
    }

    #[test]
    fn test_empty_host_has_no_pools() {
        let host = MockZfsHost::new();
        assert!(host.collector().collect_pools().unwrap().is_empty());
    }
}
