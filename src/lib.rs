//! zfsnmp - ZFS storage telemetry published over SNMP.
//!
//! This library provides the pieces assembled by the `zfsnmpd` daemon:
//! - `collector` - pool, dataset and ARC queries behind mockable traits
//! - `sampler` - background pool I/O and zilstat samplers
//! - `mib` - the ordered object registry and the FREENAS-MIB layout
//! - `agent` - the net-snmp `pass_persist` adapter
//! - `publisher` - the loop tying them together

pub mod agent;
pub mod collector;
pub mod mib;
pub mod model;
pub mod publisher;
pub mod sampler;
pub mod util;
