//! PDUs of the connection initiation stage: the X.224 connection request
//! with the RDP negotiation sub-PDU, and the matching connection confirm.

use core::fmt;

use bitflags::bitflags;
use tap::prelude::*;

use opalrdp_core::{
    ensure_size, invalid_field_err, unexpected_message_type_err, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};

use crate::tpdu::{TpduCode, TpduHeader};
use crate::tpkt::TpktHeader;
use crate::x224::{impl_x224_pdu_framing, X224Pdu};

bitflags! {
    /// Security protocols negotiated during connection initiation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SecurityProtocol: u32 {
        const RDP = 0x0000_0000;
        const SSL = 0x0000_0001;
        const HYBRID = 0x0000_0002;
        const HYBRID_EX = 0x0000_0008;
    }
}

impl SecurityProtocol {
    pub fn is_standard_rdp_security(self) -> bool {
        self.is_empty()
    }
}

impl fmt::Display for SecurityProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct RequestFlags: u8 {
        const RESTRICTED_ADMIN_MODE_REQUIRED = 0x01;
        const REDIRECTED_AUTHENTICATION_MODE_REQUIRED = 0x02;
        const CORRELATION_INFO_PRESENT = 0x08;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ResponseFlags: u8 {
        const EXTENDED_CLIENT_DATA_SUPPORTED = 0x01;
        const DYNVC_GFX_PROTOCOL_SUPPORTED = 0x02;
        const RDP_NEG_RSP_RESERVED = 0x04;
        const RESTRICTED_ADMIN_MODE_SUPPORTED = 0x08;
        const REDIRECTED_AUTHENTICATION_MODE_SUPPORTED = 0x10;
    }
}

/// Failure code carried by an RDP Negotiation Failure sub-PDU.
///
/// Each code maps to a specific, actionable message; see
/// [`FailureCode::description`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FailureCode(u32);

impl FailureCode {
    pub const SSL_REQUIRED_BY_SERVER: Self = Self(0x01);
    pub const SSL_NOT_ALLOWED_BY_SERVER: Self = Self(0x02);
    pub const SSL_CERT_NOT_ON_SERVER: Self = Self(0x03);
    pub const INCONSISTENT_FLAGS: Self = Self(0x04);
    pub const HYBRID_REQUIRED_BY_SERVER: Self = Self(0x05);
    pub const SSL_WITH_USER_AUTH_REQUIRED_BY_SERVER: Self = Self(0x06);

    pub fn description(self) -> &'static str {
        match self {
            Self::SSL_REQUIRED_BY_SERVER => "the server requires TLS security; enable TLS on the client",
            Self::SSL_NOT_ALLOWED_BY_SERVER => {
                "the server does not allow TLS security; only standard RDP security is accepted"
            }
            Self::SSL_CERT_NOT_ON_SERVER => "the server has no certificate installed for TLS",
            Self::INCONSISTENT_FLAGS => "the negotiation flags sent by the client are inconsistent",
            Self::HYBRID_REQUIRED_BY_SERVER => {
                "the server requires Network Level Authentication (NLA); enable NLA or reconfigure the server"
            }
            Self::SSL_WITH_USER_AUTH_REQUIRED_BY_SERVER => {
                "the server requires TLS with user authentication; enable TLS on the client"
            }
            _ => "the server reported an unknown negotiation failure",
        }
    }
}

impl From<u32> for FailureCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<FailureCode> for u32 {
    fn from(value: FailureCode) -> Self {
        value.0
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {:#04X})", self.description(), self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct NegoMsgType(u8);

impl NegoMsgType {
    const REQUEST: Self = Self(0x01);
    const RESPONSE: Self = Self(0x02);
    const FAILURE: Self = Self(0x03);
}

/// Cookie field of the connection request (`Cookie: mstshash=<id>\r\n`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie(pub String);

impl Cookie {
    const PREFIX: &'static str = "Cookie: mstshash=";
    const TERMINATOR: u16 = 0x0A0D; // CR LF, little-endian

    fn read(src: &mut ReadCursor<'_>) -> DecodeResult<Option<Self>> {
        if src.len() < Self::PREFIX.len() + 2 {
            return Ok(None);
        }

        if src.peek_slice(Self::PREFIX.len()) != Self::PREFIX.as_bytes() {
            return Ok(None);
        }

        src.advance(Self::PREFIX.len());

        let identifier_start = src.pos();

        while src.peek_u16() != Self::TERMINATOR {
            src.advance(1);
            ensure_size!(ctx: "Cookie", in: src, size: 2);
        }

        let identifier_end = src.pos();
        src.advance(2);

        let identifier = core::str::from_utf8(&src.inner()[identifier_start..identifier_end])
            .map_err(|_| invalid_field_err("Cookie", "identifier", "not valid UTF-8"))?
            .to_owned();

        Ok(Some(Self(identifier)))
    }

    fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: "Cookie", in: dst, size: self.size());

        dst.write_slice(Self::PREFIX.as_bytes());
        dst.write_slice(self.0.as_bytes());
        dst.write_u16(Self::TERMINATOR);

        Ok(())
    }

    fn size(&self) -> usize {
        Self::PREFIX.len() + self.0.len() + 2
    }
}

/// Client X.224 Connection Request with the RDP negotiation sub-PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub cookie: Option<Cookie>,
    pub flags: RequestFlags,
    pub protocol: SecurityProtocol,
}

impl ConnectionRequest {
    const RDP_NEG_REQ_SIZE: u16 = 8;
}

impl<'de> X224Pdu<'de> for ConnectionRequest {
    const X224_NAME: &'static str = "Client X.224 Connection Request";

    const TPDU_CODE: TpduCode = TpduCode::CONNECTION_REQUEST;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        if let Some(cookie) = &self.cookie {
            cookie.write(dst)?;
        }

        if self.protocol != SecurityProtocol::RDP {
            dst.write_u8(NegoMsgType::REQUEST.0);
            dst.write_u8(self.flags.bits());
            dst.write_u16(Self::RDP_NEG_REQ_SIZE);
            dst.write_u32(self.protocol.bits());
        }

        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'de>, _: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self> {
        let variable_part_size = tpdu.variable_part_size();

        ensure_size!(ctx: Self::X224_NAME, in: src, size: variable_part_size);

        let cookie = Cookie::read(src)?;

        let variable_part_rest_size = variable_part_size
            .checked_sub(cookie.as_ref().map(Cookie::size).unwrap_or(0))
            .ok_or_else(|| {
                invalid_field_err(Self::X224_NAME, "li", "advertised variable part smaller than the cookie")
            })?;

        if variable_part_rest_size >= usize::from(Self::RDP_NEG_REQ_SIZE) {
            let msg_type = NegoMsgType(src.read_u8());

            if msg_type != NegoMsgType::REQUEST {
                return Err(unexpected_message_type_err!(Self::X224_NAME, msg_type.0));
            }

            let flags = RequestFlags::from_bits_truncate(src.read_u8());
            let _length = src.read_u16();
            let protocol = SecurityProtocol::from_bits_truncate(src.read_u32());

            Ok(Self { cookie, flags, protocol })
        } else {
            Ok(Self {
                cookie,
                flags: RequestFlags::empty(),
                protocol: SecurityProtocol::RDP,
            })
        }
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        let cookie_size = self.cookie.as_ref().map(Cookie::size).unwrap_or(0);

        let neg_req_size = if self.protocol == SecurityProtocol::RDP {
            0
        } else {
            usize::from(Self::RDP_NEG_REQ_SIZE)
        };

        cookie_size + neg_req_size
    }

    fn tpdu_user_data_size(&self) -> usize {
        0
    }
}

impl_x224_pdu_framing!(ConnectionRequest);

/// Server X.224 Connection Confirm: either a negotiation response carrying
/// the selected protocol, or a negotiation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionConfirm {
    Response {
        flags: ResponseFlags,
        protocol: SecurityProtocol,
    },
    Failure {
        code: FailureCode,
    },
}

impl ConnectionConfirm {
    const RDP_NEG_RSP_SIZE: u16 = 8;
}

impl<'de> X224Pdu<'de> for ConnectionConfirm {
    const X224_NAME: &'static str = "Server X.224 Connection Confirm";

    const TPDU_CODE: TpduCode = TpduCode::CONNECTION_CONFIRM;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            ConnectionConfirm::Response { flags, protocol } => {
                dst.write_u8(NegoMsgType::RESPONSE.0);
                dst.write_u8(flags.bits());
                dst.write_u16(Self::RDP_NEG_RSP_SIZE);
                dst.write_u32(protocol.bits());
            }
            ConnectionConfirm::Failure { code } => {
                dst.write_u8(NegoMsgType::FAILURE.0);
                dst.write_u8(0);
                dst.write_u16(Self::RDP_NEG_RSP_SIZE);
                dst.write_u32(u32::from(*code));
            }
        }

        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'de>, _: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self> {
        let variable_part_size = tpdu.variable_part_size();

        ensure_size!(ctx: Self::X224_NAME, in: src, size: variable_part_size);

        if variable_part_size == 0 {
            return Ok(Self::Response {
                flags: ResponseFlags::empty(),
                protocol: SecurityProtocol::RDP,
            });
        }

        // type (1) + flags (1) + length (2) + protocol / code (4)
        ensure_size!(ctx: Self::X224_NAME, in: src, size: 8);

        match NegoMsgType(src.read_u8()) {
            NegoMsgType::RESPONSE => {
                let flags = ResponseFlags::from_bits_truncate(src.read_u8());
                let _length = src.read_u16();
                let protocol = SecurityProtocol::from_bits_truncate(src.read_u32());

                Self::Response { flags, protocol }.pipe(Ok)
            }
            NegoMsgType::FAILURE => {
                let _flags = src.read_u8();
                let _length = src.read_u16();
                let code = FailureCode::from(src.read_u32());

                Self::Failure { code }.pipe(Ok)
            }
            unexpected => Err(unexpected_message_type_err!(Self::X224_NAME, unexpected.0)),
        }
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        usize::from(Self::RDP_NEG_RSP_SIZE)
    }

    fn tpdu_user_data_size(&self) -> usize {
        0
    }
}

impl_x224_pdu_framing!(ConnectionConfirm);
