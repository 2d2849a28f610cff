//! Mock implementations for testing.
//!
//! This module provides `MockFs`, `MockCommand` and pre-built scenarios for
//! testing collectors without a ZFS host.

mod command;
mod filesystem;
mod scenarios;

pub use command::MockCommand;
pub use filesystem::MockFs;
pub use scenarios::{MockZfsHost, TYPICAL_ARCSTATS};
