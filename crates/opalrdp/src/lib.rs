//! Meta crate re-exporting the OpalRDP crates behind feature gates.

#[cfg(feature = "core")]
pub use opalrdp_core as core;

#[cfg(feature = "pdu")]
pub use opalrdp_pdu as pdu;

#[cfg(feature = "graphics")]
pub use opalrdp_graphics as graphics;

#[cfg(feature = "connector")]
pub use opalrdp_connector as connector;

#[cfg(feature = "session")]
pub use opalrdp_session as session;

#[cfg(feature = "blocking")]
pub use opalrdp_blocking as blocking;
