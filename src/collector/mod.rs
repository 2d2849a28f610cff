//! Storage-system collectors.
//!
//! This module reads point-in-time pool, dataset and ARC state. Access to the
//! host goes through two narrow traits so every collector can run against
//! in-memory fixtures.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      ZfsCollector                        │
//! │  - zpool list  (pools, sizes, health)                    │
//! │  - zfs list -r (filesystems, volumes)                    │
//! │  - kstat <pool>/io, kstat arcstats                       │
//! └──────────────┬───────────────────────────┬───────────────┘
//!                │                           │
//!         ┌──────▼────────┐           ┌──────▼──────┐
//!         │ CommandRunner │ (trait)   │ FileSystem  │ (trait)
//!         └──────┬────────┘           └──────┬──────┘
//!        ┌───────┴───────┐           ┌───────┴───────┐
//!  ┌─────▼─────┐ ┌───────▼─────┐ ┌───▼─────┐ ┌───────▼─────┐
//!  │RealCommand│ │ MockCommand │ │ RealFs  │ │   MockFs    │
//!  └───────────┘ └─────────────┘ └─────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use zfsnmp::collector::mock::MockZfsHost;
//!
//! let host = MockZfsHost::typical_system();
//! let pools = host.collector().collect_pools().unwrap();
//! assert_eq!(pools[0].name, "tank");
//! ```

pub mod mock;
pub mod traits;
pub mod zfs;

pub use mock::{MockCommand, MockFs, MockZfsHost};
pub use traits::{CommandRunner, FileSystem, RealCommand, RealFs};
pub use zfs::{CollectError, DEFAULT_KSTAT_PATH, ZfsCollector};
