//! Protocol adapters exposing the MIB registry to an SNMP agent.

pub mod pass_persist;

use std::io;
use std::time::Duration;

use crate::mib::Mib;

pub use pass_persist::{PassPersistServer, Request};

/// A source of read requests against the registry.
///
/// The publish loop alternates between answering requests and refreshing the
/// registry, so implementations never hold a reference to the [`Mib`] between
/// calls.
pub trait RequestServer {
    /// Answers requests arriving within `timeout`.
    ///
    /// Returns the number of requests answered. Returns early once the
    /// request stream is closed.
    fn process_pending(&mut self, mib: &Mib, timeout: Duration) -> io::Result<usize>;

    /// Whether the peer has gone away. No further requests will arrive.
    fn is_closed(&self) -> bool;
}
