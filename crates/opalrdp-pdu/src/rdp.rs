//! RDP share-layer messages used by the connection sequence: share
//! control / share data headers, the client info packet, the licensing
//! messages the client accepts, the capability exchange envelope and the
//! finalization PDUs.

pub mod capability;
pub mod client_info;
pub mod finalization;
pub mod headers;
pub mod license;

pub use self::capability::{ClientConfirmActive, ServerDemandActive};
pub use self::client_info::ClientInfo;
pub use self::finalization::{ControlAction, ControlPdu, FontPdu, SynchronizePdu};
pub use self::headers::{ShareControlHeader, ShareControlPdu, ShareDataHeader, ShareDataPdu, StreamPriority};
pub use self::license::{LicenseMessage, LicensingErrorMessage};
