//! Licensing messages, reduced to what the client accepts: a server new
//! license, or an error alert carrying `STATUS_VALID_CLIENT`. The full
//! MS-RDPELE exchange (client random, platform challenge, license
//! upgrade) is deliberately not implemented.

use opalrdp_core::{
    ensure_fixed_part_size, ensure_size, Decode, DecodeResult, ReadCursor,
};

pub const STATUS_VALID_CLIENT: u32 = 0x0000_0007;
pub const ST_NO_TRANSITION: u32 = 0x0000_0002;

const MSG_LICENSE_REQUEST: u8 = 0x01;
const MSG_PLATFORM_CHALLENGE: u8 = 0x02;
const MSG_NEW_LICENSE: u8 = 0x03;
const MSG_UPGRADE_LICENSE: u8 = 0x04;
const MSG_ERROR_ALERT: u8 = 0xFF;

/// LICENSE_PREAMBLE: message type, flags and the total message size.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LicensePreamble {
    msg_type: u8,
    flags: u8,
    msg_size: u16,
}

impl LicensePreamble {
    const NAME: &'static str = "LicensePreamble";

    const FIXED_PART_SIZE: usize = 1 /* bMsgType */ + 1 /* flags */ + 2 /* wMsgSize */;
}

impl<'de> Decode<'de> for LicensePreamble {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self {
            msg_type: src.read_u8(),
            flags: src.read_u8(),
            msg_size: src.read_u16(),
        })
    }
}

/// LICENSE_ERROR_MESSAGE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicensingErrorMessage {
    pub error_code: u32,
    pub state_transition: u32,
}

impl LicensingErrorMessage {
    const NAME: &'static str = "LicensingErrorMessage";

    const FIXED_PART_SIZE: usize = 4 /* dwErrorCode */ + 4 /* dwStateTransition */;

    /// The benign outcome: the server does not run license exchange.
    pub fn is_valid_client(&self) -> bool {
        self.error_code == STATUS_VALID_CLIENT && self.state_transition == ST_NO_TRANSITION
    }
}

impl<'de> Decode<'de> for LicensingErrorMessage {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let error_code = src.read_u32();
        let state_transition = src.read_u32();

        // trailing LICENSE_BINARY_BLOB, irrelevant to the outcome
        if src.len() >= 4 {
            src.advance(2); // wBlobType
            let blob_len = usize::from(src.read_u16());
            ensure_size!(ctx: Self::NAME, in: src, size: blob_len);
            src.advance(blob_len);
        }

        Ok(Self {
            error_code,
            state_transition,
        })
    }
}

/// A licensing message as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseMessage {
    /// SERVER_NEW_LICENSE; the license payload itself is not retained.
    NewLicense,
    ErrorAlert(LicensingErrorMessage),
    /// Any other message of the full MS-RDPELE exchange.
    Unsupported(u8),
}

impl LicenseMessage {
    const NAME: &'static str = "LicenseMessage";
}

impl<'de> Decode<'de> for LicenseMessage {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let preamble = LicensePreamble::decode(src)?;

        let body_size = usize::from(preamble.msg_size).saturating_sub(LicensePreamble::FIXED_PART_SIZE);
        ensure_size!(ctx: Self::NAME, in: src, size: body_size);
        let mut body = ReadCursor::new(src.read_slice(body_size));

        match preamble.msg_type {
            MSG_NEW_LICENSE => Ok(Self::NewLicense),
            MSG_ERROR_ALERT => Ok(Self::ErrorAlert(LicensingErrorMessage::decode(&mut body)?)),
            ty @ (MSG_LICENSE_REQUEST | MSG_PLATFORM_CHALLENGE | MSG_UPGRADE_LICENSE) => Ok(Self::Unsupported(ty)),
            ty => Ok(Self::Unsupported(ty)),
        }
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::decode;

    use super::*;

    #[test]
    fn valid_client_error_alert_is_benign() {
        let encoded = [
            0xFF, 0x03, 0x14, 0x00, // preamble: ERROR_ALERT, flags, size 20
            0x07, 0x00, 0x00, 0x00, // STATUS_VALID_CLIENT
            0x02, 0x00, 0x00, 0x00, // ST_NO_TRANSITION
            0x04, 0x00, 0x00, 0x00, // empty error info blob
            0x00, 0x00, 0x00, 0x00, // trailing padding inside msgSize
        ];

        let message: LicenseMessage = decode(&encoded).unwrap();
        let alert = match message {
            LicenseMessage::ErrorAlert(alert) => alert,
            other => panic!("unexpected message: {other:?}"),
        };

        assert!(alert.is_valid_client());
    }

    #[test]
    fn other_error_codes_are_not_benign() {
        let encoded = [
            0xFF, 0x03, 0x0C, 0x00, //
            0x06, 0x00, 0x00, 0x00, // ERR_INVALID_CLIENT
            0x02, 0x00, 0x00, 0x00,
        ];

        let message: LicenseMessage = decode(&encoded).unwrap();
        match message {
            LicenseMessage::ErrorAlert(alert) => assert!(!alert.is_valid_client()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn new_license_is_accepted_without_reading_the_payload() {
        let encoded = [0x03, 0x03, 0x08, 0x00, 0xAA, 0xBB, 0xCC, 0xDD];

        let message: LicenseMessage = decode(&encoded).unwrap();
        assert_eq!(message, LicenseMessage::NewLicense);
    }

    #[test]
    fn platform_challenge_is_surfaced_as_unsupported() {
        let encoded = [0x02, 0x03, 0x04, 0x00];

        let message: LicenseMessage = decode(&encoded).unwrap();
        assert_eq!(message, LicenseMessage::Unsupported(0x02));
    }
}
