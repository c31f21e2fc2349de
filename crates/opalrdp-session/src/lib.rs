//! Active-phase session state: the per-channel demultiplexer over MCS
//! send-data-indications and the RemoteFX frame pipeline feeding the
//! compositor.

#[macro_use]
extern crate tracing;

mod active_stage;
pub mod rfx;

use core::fmt;

use opalrdp_pdu::mcs::DisconnectReason;
use opalrdp_pdu::rfx::RfxRectangle;

pub use self::active_stage::{ActiveStage, ActiveStageOutput};
pub use self::rfx::DecodingContext;

/// Consumer of decoded tiles.
///
/// Invoked with the tile's grid position and its 64x64 RGBA pixels after
/// each successful decode; the compositor owns surface management.
pub trait Compositor {
    fn apply_tile(&mut self, tile_x: u16, tile_y: u16, rgba: &[u8]);

    /// Called at FRAME_END with the frame index and its dirty region.
    fn frame_complete(&mut self, _frame_index: u32, _dirty_rectangles: &[RfxRectangle]) {}
}

pub type SessionResult<T> = Result<T, SessionError>;

pub type SessionError = opalrdp_error::Error<SessionErrorKind>;

#[non_exhaustive]
#[derive(Debug)]
pub enum SessionErrorKind {
    Encode(opalrdp_core::EncodeError),
    Decode(opalrdp_core::DecodeError),
    /// The server tore the session down.
    Disconnected(DisconnectReason),
    Reason(String),
    General,
}

impl fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionErrorKind::Encode(_) => write!(f, "encode error"),
            SessionErrorKind::Decode(_) => write!(f, "decode error"),
            SessionErrorKind::Disconnected(reason) => write!(f, "disconnected: {reason}"),
            SessionErrorKind::Reason(description) => write!(f, "reason: {description}"),
            SessionErrorKind::General => write!(f, "general error"),
        }
    }
}

impl std::error::Error for SessionErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionErrorKind::Encode(e) => Some(e),
            SessionErrorKind::Decode(e) => Some(e),
            _ => None,
        }
    }
}

pub trait SessionErrorExt {
    fn encode(error: opalrdp_core::EncodeError) -> Self;
    fn decode(error: opalrdp_core::DecodeError) -> Self;
    fn general(context: &'static str) -> Self;
    fn reason(context: &'static str, reason: impl Into<String>) -> Self;
}

impl SessionErrorExt for SessionError {
    fn encode(error: opalrdp_core::EncodeError) -> Self {
        Self::new("encode error", SessionErrorKind::Encode(error))
    }

    fn decode(error: opalrdp_core::DecodeError) -> Self {
        Self::new("decode error", SessionErrorKind::Decode(error))
    }

    fn general(context: &'static str) -> Self {
        Self::new(context, SessionErrorKind::General)
    }

    fn reason(context: &'static str, reason: impl Into<String>) -> Self {
        Self::new(context, SessionErrorKind::Reason(reason.into()))
    }
}
