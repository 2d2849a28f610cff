//! Utility modules for zfsnmp.

pub mod units;

pub use units::{Scaled, allocation_units, kib32, scale_to_units, to_i32, wrap32};
