//! Background samplers.
//!
//! Each sampler owns one thread and publishes its results through a small
//! mutex-guarded cell that the publish loop reads without blocking on I/O.

pub mod pool_io;
pub mod zilstat;

pub use pool_io::{IoCounterMap, PoolIoSampler, PoolIoStore, PoolIoValues, sample_once};
pub use zilstat::{DEFAULT_ZILSTAT_PATH, ZilstatReader, ZilstatReaders, ZilstatSample};
