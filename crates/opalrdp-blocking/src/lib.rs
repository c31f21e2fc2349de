//! Blocking driver for the sans-IO connection sequence: a TPKT-aware
//! framed reader plus the `connect_begin` / `connect_finalize` pair
//! split around the external TLS upgrade.

#[macro_use]
extern crate tracing;

mod connector;
mod framed;

use std::io;
use std::time::Duration;

pub use self::connector::{connect_begin, connect_finalize, mark_as_upgraded, single_sequence_step, ShouldUpgrade, Upgraded};
pub use self::framed::Framed;

/// TCP connect deadline, applied by the caller before handing the
/// stream over.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read deadline while waiting on the licensing phase.
pub const LICENSING_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for the TLS handshake (external) and the CredSSP exchange.
pub const SECURITY_UPGRADE_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-deadline control over the underlying socket.
///
/// Streams layered over a socket (TLS wrappers and the like) implement
/// this by delegating to the socket they own.
pub trait StreamDeadline {
    fn set_read_deadline(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

impl StreamDeadline for std::net::TcpStream {
    fn set_read_deadline(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }
}
