//! Sans-IO state machines driving the RDP connection sequence.
//!
//! The connector never touches a socket: callers feed it the bytes of
//! the next PDU (sized via [`Sequence::next_pdu_hint`]) and flush
//! whatever it writes into the output buffer. I/O, TLS and the CredSSP
//! token exchange live outside, behind the [`NlaAuthenticator`] trait
//! and the transport driver.

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

mod channel_connection;
mod connection;
mod connection_finalization;
mod license_exchange;
mod nla;

use core::any::Any;
use core::fmt;

use opalrdp_core::{encode_buf, encode_vec, Encode, WriteBuf};
use opalrdp_pdu::mcs::DisconnectReason;
use opalrdp_pdu::nego::FailureCode;
use opalrdp_pdu::x224::X224Data;
use opalrdp_pdu::PduHint;

pub use self::channel_connection::{ChannelConnectionSequence, ChannelConnectionState};
pub use self::connection::{encode_send_data_request, ClientConnector, ClientConnectorState, ConnectionResult};
pub use self::connection_finalization::{ConnectionFinalizationSequence, ConnectionFinalizationState};
pub use self::license_exchange::{LicenseExchangeSequence, LicenseExchangeState};
pub use self::nla::{NlaAuthenticator, NlaSequence, NlaState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopSize {
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

/// Connection parameters, read-only once the sequence starts.
#[derive(Debug, Clone)]
pub struct Config {
    pub desktop_size: DesktopSize,
    /// Request TLS security.
    pub enable_tls: bool,
    /// Request CredSSP Network Level Authentication (implies TLS).
    pub enable_nla: bool,
    pub credentials: Credentials,
    pub client_name: String,
    pub client_build: u32,
    pub keyboard_layout: u32,
    /// Client address reported in the extended client info.
    pub client_address: String,
    pub client_dir: String,
    /// Static virtual channels to announce in CS_NET, joined in order.
    pub channel_names: Vec<String>,
    /// Opaque combined capability sets for the Confirm Active PDU.
    pub client_capabilities: Vec<u8>,
}

/// One state of a connection sub-sequence.
pub trait State: Send + fmt::Debug + 'static {
    fn name(&self) -> &'static str;
    fn is_terminal(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl State for () {
    fn name(&self) -> &'static str {
        "()"
    }

    fn is_terminal(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Outcome of one [`Sequence::step`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Written {
    Nothing,
    Size(core::num::NonZeroUsize),
}

impl Written {
    #[inline]
    pub fn from_size(value: usize) -> ConnectorResult<Self> {
        core::num::NonZeroUsize::new(value)
            .map(Self::Size)
            .ok_or_else(|| ConnectorError::general("invalid written length (cannot be zero)"))
    }

    #[inline]
    pub fn is_nothing(self) -> bool {
        matches!(self, Self::Nothing)
    }

    #[inline]
    pub fn size(self) -> Option<usize> {
        if let Self::Size(size) = self {
            Some(size.get())
        } else {
            None
        }
    }
}

/// A sans-IO state machine: the driver reads the number of bytes the
/// hint asks for, calls `step`, and writes out whatever was produced.
pub trait Sequence: Send {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint>;

    fn state(&self) -> &dyn State;

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written>;

    fn step_no_input(&mut self, output: &mut WriteBuf) -> ConnectorResult<Written> {
        self.step(&[], output)
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;

pub type ConnectorError = opalrdp_error::Error<ConnectorErrorKind>;

#[non_exhaustive]
#[derive(Debug)]
pub enum ConnectorErrorKind {
    Encode(opalrdp_core::EncodeError),
    Decode(opalrdp_core::DecodeError),
    /// The server refused the X.224 security negotiation.
    Negotiation(FailureCode),
    /// The MCS Connect-Response carried a non-zero T.125 result.
    ConnectResponseFailed(u8),
    /// The server tore the domain down.
    DisconnectUltimatum(DisconnectReason),
    /// The licensing phase failed with the given error code.
    License(u32),
    Reason(String),
    General,
    Custom,
}

impl fmt::Display for ConnectorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorErrorKind::Encode(_) => write!(f, "encode error"),
            ConnectorErrorKind::Decode(_) => write!(f, "decode error"),
            ConnectorErrorKind::Negotiation(code) => write!(f, "negotiation failure: {code}"),
            ConnectorErrorKind::ConnectResponseFailed(result) => write!(
                f,
                "MCS Connect-Response failed: {} ({result})",
                opalrdp_pdu::mcs::result_description(*result)
            ),
            ConnectorErrorKind::DisconnectUltimatum(reason) => {
                write!(f, "server disconnected the session: {reason}")
            }
            ConnectorErrorKind::License(code) => write!(f, "license error (code {code:#010X})"),
            ConnectorErrorKind::Reason(description) => write!(f, "reason: {description}"),
            ConnectorErrorKind::General => write!(f, "general error"),
            ConnectorErrorKind::Custom => write!(f, "custom error"),
        }
    }
}

impl std::error::Error for ConnectorErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectorErrorKind::Encode(e) => Some(e),
            ConnectorErrorKind::Decode(e) => Some(e),
            _ => None,
        }
    }
}

pub trait ConnectorErrorExt {
    fn encode(error: opalrdp_core::EncodeError) -> Self;
    fn decode(error: opalrdp_core::DecodeError) -> Self;
    fn general(context: &'static str) -> Self;
    fn reason(context: &'static str, reason: impl Into<String>) -> Self;
    fn custom<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static;
}

impl ConnectorErrorExt for ConnectorError {
    fn encode(error: opalrdp_core::EncodeError) -> Self {
        Self::new("encode error", ConnectorErrorKind::Encode(error))
    }

    fn decode(error: opalrdp_core::DecodeError) -> Self {
        Self::new("decode error", ConnectorErrorKind::Decode(error))
    }

    fn general(context: &'static str) -> Self {
        Self::new(context, ConnectorErrorKind::General)
    }

    fn reason(context: &'static str, reason: impl Into<String>) -> Self {
        Self::new(context, ConnectorErrorKind::Reason(reason.into()))
    }

    fn custom<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static,
    {
        Self::new(context, ConnectorErrorKind::Custom).with_source(e)
    }
}

pub trait ConnectorResultExt {
    #[must_use]
    fn with_context(self, context: &'static str) -> Self;
}

impl<T> ConnectorResultExt for ConnectorResult<T> {
    fn with_context(self, context: &'static str) -> Self {
        self.map_err(|mut e| {
            e.context = context;
            e
        })
    }
}

/// Encodes a PDU into an X.224 data TPDU inside a TPKT record.
pub fn encode_x224_packet<T>(x224_msg: &T, buf: &mut WriteBuf) -> ConnectorResult<usize>
where
    T: Encode,
{
    let x224_msg_buf = encode_vec(x224_msg).map_err(ConnectorError::encode)?;

    let pdu = X224Data {
        data: std::borrow::Cow::Owned(x224_msg_buf),
    };

    encode_buf(&pdu, buf).map_err(ConnectorError::encode)
}
