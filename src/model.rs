//! Point-in-time records read from the storage system.

/// Cumulative root-vdev I/O counters of one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolIoCounters {
    pub read_ops: u64,
    pub write_ops: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

impl PoolIoCounters {
    /// Field-wise `self - prev`.
    ///
    /// A field that went backwards (pool re-imported, counters reset) yields
    /// zero instead of a wrapped value.
    pub fn delta_since(&self, prev: &PoolIoCounters) -> PoolIoCounters {
        PoolIoCounters {
            read_ops: self.read_ops.saturating_sub(prev.read_ops),
            write_ops: self.write_ops.saturating_sub(prev.write_ops),
            read_bytes: self.read_bytes.saturating_sub(prev.read_bytes),
            write_bytes: self.write_bytes.saturating_sub(prev.write_bytes),
        }
    }
}

/// Pool health as numbered by `ZPoolHealthType` in FREENAS-MIB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolHealth {
    Online = 0,
    Degraded = 1,
    Faulted = 2,
    Offline = 3,
    Unavail = 4,
    Removed = 5,
}

impl PoolHealth {
    /// Looks up the health string reported by `zpool list` (any case).
    pub fn from_state(state: &str) -> Option<Self> {
        match state.to_ascii_lowercase().as_str() {
            "online" => Some(Self::Online),
            "degraded" => Some(Self::Degraded),
            "faulted" => Some(Self::Faulted),
            "offline" => Some(Self::Offline),
            "unavail" => Some(Self::Unavail),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

/// One row of `zpool list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolInfo {
    pub name: String,
    /// Total size in bytes.
    pub size: u64,
    /// Allocated bytes.
    pub allocated: u64,
    /// Free bytes.
    pub free: u64,
    /// Health string as reported (e.g. "ONLINE").
    pub health: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Filesystem,
    Volume,
}

/// One descendant dataset of a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    pub name: String,
    pub kind: DatasetKind,
    pub used: u64,
    pub available: u64,
    /// Nominal size; only volumes have one.
    pub volsize: Option<u64>,
}

/// The subset of `arcstats` the agent publishes. Values are raw (bytes or
/// event counts) as the kernel reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArcStats {
    pub size: u64,
    pub meta_used: u64,
    pub data_size: u64,
    pub hits: u64,
    pub misses: u64,
    /// Target size (`c`).
    pub target_size: u64,
    /// MRU target size (`p`).
    pub mru_target_size: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub l2_read_bytes: u64,
    pub l2_write_bytes: u64,
    pub l2_size: u64,
}
