//! The publish loop.
//!
//! Alternates between answering protocol requests and, once per publish
//! interval, rebuilding every table and scalar of the registry from fresh
//! storage queries, the pool I/O sampler and the zilstat readers.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::agent::RequestServer;
use crate::collector::traits::{CommandRunner, FileSystem};
use crate::collector::zfs::arc::{ArcEfficiency, format_miss_percent};
use crate::collector::zfs::{CollectError, ZfsCollector};
use crate::mib::{ArcScalars, DatasetRow, FreenasMib, L2ArcScalars, MibError, PoolRow, ZilScalars};
use crate::model::{ArcStats, DatasetInfo, DatasetKind, PoolHealth, PoolInfo};
use crate::sampler::{PoolIoStore, PoolIoValues, ZilstatReaders};
use crate::util::{allocation_units, kib32, to_i32, wrap32};

/// Error type for a failed publish cycle or request round.
#[derive(Debug)]
pub enum PublishError {
    /// A storage or kstat query failed.
    Collect(CollectError),
    /// The registry rejected an update.
    Mib(MibError),
    /// Writing a protocol response failed.
    Io(io::Error),
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::Collect(e) => write!(f, "collection failed: {}", e),
            PublishError::Mib(e) => write!(f, "registry update failed: {}", e),
            PublishError::Io(e) => write!(f, "protocol I/O failed: {}", e),
        }
    }
}

impl std::error::Error for PublishError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PublishError::Collect(e) => Some(e),
            PublishError::Mib(e) => Some(e),
            PublishError::Io(e) => Some(e),
        }
    }
}

impl From<CollectError> for PublishError {
    fn from(e: CollectError) -> Self {
        PublishError::Collect(e)
    }
}

impl From<MibError> for PublishError {
    fn from(e: MibError) -> Self {
        PublishError::Mib(e)
    }
}

impl From<io::Error> for PublishError {
    fn from(e: io::Error) -> Self {
        PublishError::Io(e)
    }
}

/// Maps a `zpool list` health string to its MIB code.
///
/// Unknown states are reported as unavail.
fn health_code(pool: &PoolInfo) -> i32 {
    PoolHealth::from_state(&pool.health)
        .unwrap_or_else(|| {
            warn!(pool = %pool.name, state = %pool.health, "unknown pool health, reporting unavail");
            PoolHealth::Unavail
        })
        .code()
}

fn pool_row(pool: &PoolInfo, io: &PoolIoValues) -> PoolRow {
    let scaled = allocation_units([pool.size, pool.allocated, pool.free]);
    let [size, used, available] = scaled.values;
    let overall = io.overall.get(&pool.name).copied().unwrap_or_default();
    let delta = io.per_interval.get(&pool.name).copied().unwrap_or_default();

    PoolRow {
        name: pool.name.clone(),
        allocation_units: to_i32(scaled.unit),
        size: to_i32(size),
        used: to_i32(used),
        available: to_i32(available),
        health: health_code(pool),
        read_ops: overall.read_ops,
        write_ops: overall.write_ops,
        read_bytes: overall.read_bytes,
        write_bytes: overall.write_bytes,
        read_ops_1sec: delta.read_ops,
        write_ops_1sec: delta.write_ops,
        read_bytes_1sec: delta.read_bytes,
        write_bytes_1sec: delta.write_bytes,
    }
}

fn dataset_row(dataset: &DatasetInfo) -> DatasetRow {
    let size = match (dataset.kind, dataset.volsize) {
        (DatasetKind::Volume, Some(volsize)) => volsize,
        _ => dataset.used.saturating_add(dataset.available),
    };
    let scaled = allocation_units([size, dataset.used, dataset.available]);
    let [size, used, available] = scaled.values;

    DatasetRow {
        name: dataset.name.clone(),
        allocation_units: to_i32(scaled.unit),
        size: to_i32(size),
        used: to_i32(used),
        available: to_i32(available),
    }
}

fn arc_scalars(stats: &ArcStats) -> ArcScalars {
    let efficiency = ArcEfficiency::from_stats(stats);
    let strip = |ratio: &str| ratio.trim_end_matches('%').to_string();

    ArcScalars {
        size: kib32(stats.size),
        meta: kib32(stats.meta_used),
        data: kib32(stats.data_size),
        hits: wrap32(stats.hits),
        misses: wrap32(stats.misses),
        c: kib32(stats.target_size),
        p: kib32(stats.mru_target_size),
        miss_percent: format_miss_percent(stats.hits, stats.misses),
        cache_hit_ratio: strip(&efficiency.cache_hit_ratio),
        cache_miss_ratio: strip(&efficiency.cache_miss_ratio),
    }
}

fn l2arc_scalars(stats: &ArcStats) -> L2ArcScalars {
    L2ArcScalars {
        hits: wrap32(stats.l2_hits),
        misses: wrap32(stats.l2_misses),
        read: kib32(stats.l2_read_bytes),
        write: kib32(stats.l2_write_bytes),
        size: kib32(stats.l2_size),
    }
}

/// Owns the registry and refreshes it from the collectors.
pub struct Publisher<F: FileSystem + Clone, C: CommandRunner + Clone> {
    collector: ZfsCollector<F, C>,
    pool_io: Arc<PoolIoStore>,
    zilstat: ZilstatReaders,
    mib: FreenasMib,
    interval: Duration,
    last_publish: Option<DateTime<Utc>>,
}

impl<F: FileSystem + Clone, C: CommandRunner + Clone> Publisher<F, C> {
    /// Creates a publisher refreshing `mib` every `interval`.
    pub fn new(
        collector: ZfsCollector<F, C>,
        pool_io: Arc<PoolIoStore>,
        zilstat: ZilstatReaders,
        mib: FreenasMib,
        interval: Duration,
    ) -> Self {
        Self {
            collector,
            pool_io,
            zilstat,
            mib,
            interval,
            last_publish: None,
        }
    }

    pub fn mib(&self) -> &FreenasMib {
        &self.mib
    }

    /// Completion time of the last successful cycle.
    pub fn last_publish(&self) -> Option<DateTime<Utc>> {
        self.last_publish
    }

    /// Rebuilds every table and scalar.
    ///
    /// Tables are emptied first, so pools and datasets that disappeared
    /// leave no rows behind. On error the registry may be partially updated.
    pub fn publish_cycle(&mut self) -> Result<(), PublishError> {
        let t0 = Instant::now();
        let io = self.pool_io.get_values();

        let pools = self.collector.collect_pools()?;
        let mut filesystems = Vec::new();
        let mut volumes = Vec::new();
        for pool in &pools {
            for dataset in self.collector.collect_datasets(&pool.name)? {
                match dataset.kind {
                    DatasetKind::Filesystem => filesystems.push(dataset),
                    DatasetKind::Volume => volumes.push(dataset),
                }
            }
        }

        self.mib.clear_tables()?;
        for pool in &pools {
            self.mib.add_pool(&pool_row(pool, &io))?;
        }
        for dataset in &filesystems {
            self.mib.add_dataset(&dataset_row(dataset))?;
        }
        for volume in &volumes {
            self.mib.add_zvol(&dataset_row(volume))?;
        }

        let arc = self.collector.collect_arcstats()?;
        self.mib.set_arc(&arc_scalars(&arc))?;
        self.mib.set_l2arc(&l2arc_scalars(&arc))?;

        let (ops_1sec, ops_5sec, ops_10sec) = self.zilstat.ops();
        self.mib.set_zil(&ZilScalars {
            ops_1sec,
            ops_5sec,
            ops_10sec,
        })?;

        let now = Utc::now();
        self.last_publish = Some(now);
        debug!(
            pools = pools.len(),
            datasets = filesystems.len(),
            zvols = volumes.len(),
            duration_us = t0.elapsed().as_micros() as u64,
            at = %now.format("%H:%M:%S%.3f"),
            "published"
        );
        Ok(())
    }

    /// Serves `server` and republishes every interval until `running`
    /// clears or the server closes.
    ///
    /// Publishes once before the first request is answered.
    pub fn run<S: RequestServer>(
        &mut self,
        server: &mut S,
        running: &AtomicBool,
        poll: Duration,
    ) -> Result<(), PublishError> {
        self.publish_cycle()?;
        let mut last = Instant::now();
        info!(
            interval_ms = self.interval.as_millis() as u64,
            objects = self.mib.mib().len(),
            "publishing"
        );

        while running.load(Ordering::SeqCst) {
            let answered = server.process_pending(self.mib.mib(), poll)?;
            if answered > 0 {
                trace!(answered, "requests served");
            }
            if server.is_closed() {
                info!("request stream closed");
                break;
            }
            if last.elapsed() >= self.interval {
                self.publish_cycle()?;
                last = Instant::now();
            }
        }
        Ok(())
    }

    /// Stops the zilstat readers.
    pub fn shutdown(&mut self) {
        self.zilstat.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::PassPersistServer;
    use crate::collector::mock::{MockCommand, MockFs, MockZfsHost};
    use crate::mib::freenas::DEFAULT_BASE_OID;
    use crate::mib::{Value, parse_oid};
    use crate::sampler::{IoCounterMap, ZilstatReader, sample_once};
    use std::io::Cursor;

    const ZFS: &str = ".1.3.6.1.4.1.50536.1";

    fn publisher(host: &MockZfsHost) -> Publisher<MockFs, MockCommand> {
        publisher_with(host, Arc::new(PoolIoStore::new()), ZilstatReaders::disabled())
    }

    fn publisher_with(
        host: &MockZfsHost,
        store: Arc<PoolIoStore>,
        zilstat: ZilstatReaders,
    ) -> Publisher<MockFs, MockCommand> {
        Publisher::new(
            host.collector(),
            store,
            zilstat,
            FreenasMib::new(&DEFAULT_BASE_OID).unwrap(),
            Duration::from_secs(1),
        )
    }

    fn get<'a>(p: &'a Publisher<MockFs, MockCommand>, suffix: &str) -> Option<&'a Value> {
        p.mib().mib().get(&parse_oid(&format!("{ZFS}{suffix}")).unwrap())
    }

    fn string(s: &str) -> Value {
        Value::DisplayString(s.to_string())
    }

    #[test]
    fn test_pool_rows() {
        let host = MockZfsHost::typical_system();
        let mut p = publisher(&host);
        p.publish_cycle().unwrap();

        assert_eq!(get(&p, ".1.1.1.2.0"), Some(&string("tank")));
        assert_eq!(get(&p, ".1.1.1.3.0"), Some(&Value::Integer32(4096)));
        assert_eq!(get(&p, ".1.1.1.4.0"), Some(&Value::Integer32(4096)));
        assert_eq!(get(&p, ".1.1.1.5.0"), Some(&Value::Integer32(2048)));
        assert_eq!(get(&p, ".1.1.1.6.0"), Some(&Value::Integer32(2048)));
        assert_eq!(get(&p, ".1.1.1.7.0"), Some(&Value::Integer32(0)));

        assert_eq!(get(&p, ".1.1.1.2.1"), Some(&string("backup")));
        assert_eq!(get(&p, ".1.1.1.4.1"), Some(&Value::Integer32(488_281_250)));
        assert_eq!(get(&p, ".1.1.1.7.1"), Some(&Value::Integer32(1)));

        // No sampler tick yet: counters are zero.
        assert_eq!(get(&p, ".1.1.1.8.0"), Some(&Value::Counter64(0)));
        assert!(p.last_publish().is_some());
    }

    #[test]
    fn test_pool_counters_from_store() {
        let host = MockZfsHost::typical_system();
        let store = Arc::new(PoolIoStore::new());
        sample_once(&host.collector(), &store).unwrap();
        host.set_pool_io("tank", 1_048_576 + 4096, 2_097_152, 110, 200);
        sample_once(&host.collector(), &store).unwrap();

        let mut p = publisher_with(&host, store, ZilstatReaders::disabled());
        p.publish_cycle().unwrap();

        assert_eq!(get(&p, ".1.1.1.8.0"), Some(&Value::Counter64(110)));
        assert_eq!(get(&p, ".1.1.1.9.0"), Some(&Value::Counter64(200)));
        assert_eq!(get(&p, ".1.1.1.10.0"), Some(&Value::Counter64(1_052_672)));
        assert_eq!(get(&p, ".1.1.1.12.0"), Some(&Value::Counter64(10)));
        assert_eq!(get(&p, ".1.1.1.13.0"), Some(&Value::Counter64(0)));
        assert_eq!(get(&p, ".1.1.1.14.0"), Some(&Value::Counter64(4096)));
    }

    #[test]
    fn test_dataset_and_zvol_rows() {
        let host = MockZfsHost::typical_system();
        let mut p = publisher(&host);
        p.publish_cycle().unwrap();

        assert_eq!(get(&p, ".2.1.1.2.0"), Some(&string("tank/home")));
        assert_eq!(get(&p, ".2.1.1.4.0"), Some(&Value::Integer32(2953)));
        assert_eq!(get(&p, ".2.1.1.5.0"), Some(&Value::Integer32(1000)));
        assert_eq!(get(&p, ".2.1.1.6.0"), Some(&Value::Integer32(1953)));
        assert_eq!(get(&p, ".2.1.1.2.1"), Some(&string("tank/home/alice")));
        assert_eq!(get(&p, ".2.1.1.2.2"), Some(&string("backup/archive")));
        assert_eq!(p.mib().dataset_count(), 3);

        assert_eq!(get(&p, ".3.1.1.2.0"), Some(&string("tank/vm0")));
        assert_eq!(get(&p, ".3.1.1.4.0"), Some(&Value::Integer32(1024)));
        assert_eq!(get(&p, ".3.1.1.5.0"), Some(&Value::Integer32(512)));
        assert_eq!(p.mib().zvol_count(), 1);
    }

    #[test]
    fn test_removed_pool_leaves_no_row() {
        let host = MockZfsHost::typical_system();
        let mut p = publisher(&host);
        p.publish_cycle().unwrap();
        assert_eq!(p.mib().pool_count(), 2);

        host.set_pools(&[("tank", 16777216, 8388608, 8388608, "ONLINE")]);
        p.publish_cycle().unwrap();

        assert_eq!(p.mib().pool_count(), 1);
        assert_eq!(get(&p, ".1.1.1.2.1"), None);
        assert_eq!(get(&p, ".2.1.1.2.2"), None);
        assert_eq!(p.mib().dataset_count(), 2);
    }

    #[test]
    fn test_unknown_health_is_unavail() {
        let host = MockZfsHost::typical_system();
        host.set_pools(&[("tank", 16777216, 8388608, 8388608, "SUSPENDED")]);
        let mut p = publisher(&host);
        p.publish_cycle().unwrap();

        assert_eq!(get(&p, ".1.1.1.7.0"), Some(&Value::Integer32(4)));
    }

    #[test]
    fn test_arc_scalars() {
        let host = MockZfsHost::typical_system();
        let mut p = publisher(&host);
        p.publish_cycle().unwrap();

        assert_eq!(get(&p, ".4.1.0"), Some(&Value::Unsigned32(1_048_576)));
        assert_eq!(get(&p, ".4.2.0"), Some(&Value::Unsigned32(262_144)));
        assert_eq!(get(&p, ".4.3.0"), Some(&Value::Unsigned32(786_432)));
        assert_eq!(get(&p, ".4.4.0"), Some(&Value::Unsigned32(800)));
        assert_eq!(get(&p, ".4.5.0"), Some(&Value::Unsigned32(200)));
        assert_eq!(get(&p, ".4.6.0"), Some(&Value::Unsigned32(2_097_152)));
        assert_eq!(get(&p, ".4.7.0"), Some(&Value::Unsigned32(1_048_576)));
        assert_eq!(get(&p, ".4.8.0"), Some(&string("20.0")));
        assert_eq!(get(&p, ".4.9.0"), Some(&string("80.00")));
        assert_eq!(get(&p, ".4.10.0"), Some(&string("20.00")));
    }

    #[test]
    fn test_l2arc_scalars_wrap() {
        let host = MockZfsHost::typical_system();
        let mut p = publisher(&host);
        p.publish_cycle().unwrap();

        assert_eq!(get(&p, ".5.1.0"), Some(&Value::Counter32(5)));
        assert_eq!(get(&p, ".5.2.0"), Some(&Value::Counter32(7)));
        assert_eq!(get(&p, ".5.3.0"), Some(&Value::Counter32(10)));
        // 4 TiB is exactly 2^32 KiB.
        assert_eq!(get(&p, ".5.4.0"), Some(&Value::Counter32(0)));
        assert_eq!(get(&p, ".5.5.0"), Some(&Value::Unsigned32(1024)));
    }

    #[test]
    fn test_idle_arc_reports_zero_percent() {
        let host = MockZfsHost::typical_system();
        host.fs.add_file(
            host.kstat_path.join("arcstats"),
            "13 1 0x01 2 96 1 1\nname type data\nhits 4 0\nmisses 4 0\n",
        );
        let mut p = publisher(&host);
        p.publish_cycle().unwrap();

        assert_eq!(get(&p, ".4.8.0"), Some(&string("0")));
        assert_eq!(get(&p, ".4.9.0"), Some(&string("0.00")));
        assert_eq!(get(&p, ".5.5.0"), Some(&Value::Unsigned32(0)));
    }

    #[test]
    fn test_zilstat_ops_published() {
        let host = MockZfsHost::typical_system();
        let header = "N-Bytes N-Bytes/s N-Max-Rate B-Bytes B-Bytes/s B-Max-Rate ops <=4kB 4-32kB >=32kB\n";
        let reader = |interval: u32, ops: u64| {
            let input = format!("{header}0 0 0 0 0 0 {ops} 0 0 0\n");
            ZilstatReader::from_reader(interval, Cursor::new(input)).unwrap()
        };
        let mut zilstat = ZilstatReaders {
            one_sec: Some(reader(1, 3)),
            five_sec: Some(reader(5, 15)),
            ten_sec: None,
        };
        // Wait for both streams to be consumed.
        zilstat.stop();

        let mut p = publisher_with(&host, Arc::new(PoolIoStore::new()), zilstat);
        p.publish_cycle().unwrap();

        assert_eq!(get(&p, ".6.1.0"), Some(&Value::Counter64(3)));
        assert_eq!(get(&p, ".6.2.0"), Some(&Value::Counter64(15)));
        assert_eq!(get(&p, ".6.3.0"), Some(&Value::Counter64(0)));
    }

    #[test]
    fn test_collect_failure_propagates() {
        let host = MockZfsHost::typical_system();
        host.fs.remove_file(host.kstat_path.join("arcstats"));
        let mut p = publisher(&host);

        let err = p.publish_cycle().unwrap_err();
        assert!(matches!(err, PublishError::Collect(_)));
        assert!(p.last_publish().is_none());
    }

    #[test]
    fn test_run_serves_until_input_closes() {
        let host = MockZfsHost::typical_system();
        let mut p = publisher(&host);
        let input = format!("PING\nget\n{ZFS}.1.1.1.2.0\ngetnext\n{ZFS}.5.5.0\n");
        let mut server = PassPersistServer::from_reader(Cursor::new(input), Vec::new()).unwrap();
        let running = AtomicBool::new(true);

        p.run(&mut server, &running, Duration::from_millis(20)).unwrap();

        let output = String::from_utf8(server.get_ref().clone()).unwrap();
        assert_eq!(
            output,
            format!("PONG\n{ZFS}.1.1.1.2.0\nstring\ntank\n{ZFS}.6.1.0\ncounter64\n0\n")
        );
        assert!(server.is_closed());
    }

    #[test]
    fn test_run_stops_when_flag_clears() {
        let host = MockZfsHost::typical_system();
        let mut p = publisher(&host);
        let mut server = PassPersistServer::from_reader(Cursor::new(String::new()), Vec::new()).unwrap();
        let running = AtomicBool::new(false);

        p.run(&mut server, &running, Duration::from_millis(10)).unwrap();
        assert!(p.last_publish().is_some());
    }

    #[test]
    fn test_stale_sampler_entries_ignored() {
        let host = MockZfsHost::typical_system();
        let store = Arc::new(PoolIoStore::new());
        let mut current = IoCounterMap::new();
        current.insert("gone".to_string(), Default::default());
        store.record(current);

        let mut p = publisher_with(&host, Arc::clone(&store), ZilstatReaders::disabled());
        p.publish_cycle().unwrap();

        // Sampler entries without a pool row are ignored.
        assert_eq!(p.mib().pool_count(), 2);
        assert_eq!(get(&p, ".1.1.1.8.1"), Some(&Value::Counter64(0)));
    }
}
