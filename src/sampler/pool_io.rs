//! Per-pool I/O counters and their per-interval deltas.
//!
//! A background thread reads every pool's cumulative counters once per
//! interval and records them in a [`PoolIoStore`]. The store keeps the
//! latest absolute values and the difference to the previous tick, both
//! behind one mutex, so a reader always sees a consistent pair.

use std::collections::HashMap;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::collector::traits::{CommandRunner, FileSystem};
use crate::collector::zfs::{CollectError, ZfsCollector};
use crate::model::PoolIoCounters;

/// Counters keyed by pool name.
pub type IoCounterMap = HashMap<String, PoolIoCounters>;

/// A point-in-time copy of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolIoValues {
    /// Cumulative counters as of the last completed tick.
    pub overall: IoCounterMap,
    /// Difference between the last two ticks. Zero for pools seen only once.
    pub per_interval: IoCounterMap,
}

/// Latest absolute counters plus the most recent delta, under one lock.
#[derive(Debug, Default)]
pub struct PoolIoStore {
    values: Mutex<PoolIoValues>,
}

impl PoolIoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored snapshot with `current`.
    ///
    /// Pools absent from `current` are dropped from both maps.
    pub fn record(&self, current: IoCounterMap) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());

        let per_interval = current
            .iter()
            .map(|(name, counters)| {
                let delta = values
                    .overall
                    .get(name)
                    .map(|prev| counters.delta_since(prev))
                    .unwrap_or_default();
                (name.clone(), delta)
            })
            .collect();

        values.overall = current;
        values.per_interval = per_interval;
    }

    /// Returns independent copies of both maps as of the last `record`.
    pub fn get_values(&self) -> PoolIoValues {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Reads every pool's counters and records them in `store`.
///
/// The storage queries run before the store's lock is taken.
/// Returns the number of pools recorded.
pub fn sample_once<F, C>(
    collector: &ZfsCollector<F, C>,
    store: &PoolIoStore,
) -> Result<usize, CollectError>
where
    F: FileSystem + Clone,
    C: CommandRunner + Clone,
{
    let pools = collector.collect_pools()?;
    let mut current = IoCounterMap::with_capacity(pools.len());
    for pool in pools {
        let counters = collector.collect_pool_io(&pool.name)?;
        current.insert(pool.name, counters);
    }

    let count = current.len();
    store.record(current);
    Ok(count)
}

/// Background sampler thread feeding a [`PoolIoStore`].
pub struct PoolIoSampler {
    store: Arc<PoolIoStore>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PoolIoSampler {
    /// Starts sampling every `interval`.
    ///
    /// The first sample is taken one interval after start.
    pub fn spawn<F, C>(collector: ZfsCollector<F, C>, interval: Duration) -> io::Result<Self>
    where
        F: FileSystem + Clone + 'static,
        C: CommandRunner + Clone + 'static,
    {
        let store = Arc::new(PoolIoStore::new());
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_store = Arc::clone(&store);

        let handle = thread::Builder::new()
            .name("pool-io".to_string())
            .spawn(move || {
                debug!(interval_ms = interval.as_millis() as u64, "pool I/O sampler started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let t0 = Instant::now();
                    match sample_once(&collector, &thread_store) {
                        Ok(pools) => trace!(
                            pools,
                            duration_us = t0.elapsed().as_micros() as u64,
                            "pool I/O sampled"
                        ),
                        Err(e) => warn!(error = %e, "pool I/O sample failed, keeping previous tick"),
                    }
                }
                debug!("pool I/O sampler stopped");
            })?;

        info!("pool I/O sampler running");

        Ok(Self {
            store,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Shared handle to the store this sampler writes.
    pub fn store(&self) -> Arc<PoolIoStore> {
        Arc::clone(&self.store)
    }

    /// See [`PoolIoStore::get_values`].
    pub fn get_values(&self) -> PoolIoValues {
        self.store.get_values()
    }

    /// Signals the thread to stop and waits for it. Idempotent.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("pool I/O sampler thread panicked");
        }
    }
}

impl Drop for PoolIoSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
