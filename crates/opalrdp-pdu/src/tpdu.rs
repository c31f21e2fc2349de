use opalrdp_core::{
    ensure_fixed_part_size, ensure_size, invalid_field_err, read_padding, unexpected_message_type_err, DecodeResult,
    EncodeResult, ReadCursor, WriteCursor,
};

use crate::tpkt::TpktHeader;

/// X.224 TPDU code; RDP uses class 0 only.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TpduCode(u8);

impl TpduCode {
    pub const CONNECTION_REQUEST: Self = Self(0xE0);
    pub const CONNECTION_CONFIRM: Self = Self(0xD0);
    pub const DISCONNECT_REQUEST: Self = Self(0x80);
    pub const DATA: Self = Self(0xF0);

    pub fn header_fixed_part_size(self) -> usize {
        if self == TpduCode::DATA {
            TpduHeader::DATA_FIXED_PART_SIZE
        } else {
            TpduHeader::NOT_DATA_FIXED_PART_SIZE
        }
    }

    pub fn check_expected(self, expected: TpduCode) -> DecodeResult<()> {
        if self == expected {
            Ok(())
        } else {
            Err(unexpected_message_type_err!(TpduHeader::NAME, self.0))
        }
    }
}

impl From<u8> for TpduCode {
    fn from(value: u8) -> Self {
        // The connection confirm code carries the credit in its low nibble.
        if value & 0xF0 == 0xD0 {
            Self(0xD0)
        } else {
            Self(value)
        }
    }
}

impl From<TpduCode> for u8 {
    fn from(value: TpduCode) -> Self {
        value.0
    }
}

/// X.224 TPDU header, immediately following a TPKT header.
///
/// The length indicator covers the header (fixed and variable parts)
/// excluding the LI octet itself and any user data:
///
/// ```diagram
/// | LI | fixed part | variable part | user data |
/// |    | <——————————— LI —————————> |           |
/// ```
///
/// Data TPDUs have a three byte fixed part `{LI, 0xF0, EOT}`; every other
/// code has seven: `{LI, code, DST-REF(2), SRC-REF(2), class}`.
#[derive(Debug, PartialEq, Eq)]
pub struct TpduHeader {
    pub li: u8,
    pub code: TpduCode,
}

impl TpduHeader {
    pub const DATA_FIXED_PART_SIZE: usize = 3;
    pub const NOT_DATA_FIXED_PART_SIZE: usize = 7;

    pub const NAME: &'static str = "TpduHeader";

    const FIXED_PART_SIZE: usize = Self::DATA_FIXED_PART_SIZE;

    pub const DATA_LENGTH_INDICATOR: u8 = 0x02;
    const EOT: u8 = 0x80;

    pub fn read(src: &mut ReadCursor<'_>, tpkt: &TpktHeader) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let li = src.read_u8();
        let code = TpduCode::from(src.read_u8());

        if usize::from(li) + 1 + TpktHeader::SIZE > tpkt.packet_length() {
            return Err(invalid_field_err(
                Self::NAME,
                "li",
                "TPDU length greater than the TPKT length",
            ));
        }

        // 255 is reserved for possible extensions
        if li == 0xFF {
            return Err(invalid_field_err(Self::NAME, "li", "reserved length indicator"));
        }

        if code == TpduCode::DATA {
            if li != Self::DATA_LENGTH_INDICATOR {
                return Err(invalid_field_err(Self::NAME, "li", "bad data TPDU length indicator"));
            }
            read_padding!(src, 1); // EOT
        } else {
            ensure_size!(in: src, size: 5);
            read_padding!(src, 5); // DST-REF, SRC-REF, class options
        }

        Ok(Self { li, code })
    }

    pub fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u8(self.li);
        dst.write_u8(u8::from(self.code));

        if self.code == TpduCode::DATA {
            dst.write_u8(Self::EOT);
        } else {
            ensure_size!(in: dst, size: 5);
            dst.write_u16(0); // DST-REF
            dst.write_u16(0); // SRC-REF
            dst.write_u8(0); // class 0
        }

        Ok(())
    }

    pub fn fixed_part_size(&self) -> usize {
        self.code.header_fixed_part_size()
    }

    pub fn variable_part_size(&self) -> usize {
        self.size() - self.fixed_part_size()
    }

    /// Size of the whole header, LI octet and variable part included.
    pub fn size(&self) -> usize {
        usize::from(self.li) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_header_is_three_bytes() {
        let buf = [0x02, 0xF0, 0x80, 0xAA];
        let tpkt = TpktHeader {
            packet_length: (TpktHeader::SIZE + buf.len()) as u16,
        };

        let mut src = ReadCursor::new(&buf);
        let tpdu = TpduHeader::read(&mut src, &tpkt).unwrap();

        assert_eq!(tpdu.code, TpduCode::DATA);
        assert_eq!(tpdu.size(), 3);
        assert_eq!(tpdu.variable_part_size(), 0);
        assert_eq!(src.read_u8(), 0xAA);
    }

    #[test]
    fn data_header_with_bad_li_is_rejected() {
        let buf = [0x03, 0xF0, 0x80, 0xAA];
        let tpkt = TpktHeader {
            packet_length: (TpktHeader::SIZE + buf.len()) as u16,
        };

        let mut src = ReadCursor::new(&buf);
        assert!(TpduHeader::read(&mut src, &tpkt).is_err());
    }

    #[test]
    fn connection_confirm_code_ignores_credit_nibble() {
        assert_eq!(TpduCode::from(0xD3), TpduCode::CONNECTION_CONFIRM);
    }

    #[test]
    fn li_exceeding_tpkt_length_is_rejected() {
        let buf = [0x40, 0xE0, 0x00, 0x00, 0x00, 0x00, 0x00];
        let tpkt = TpktHeader {
            packet_length: (TpktHeader::SIZE + buf.len()) as u16,
        };

        let mut src = ReadCursor::new(&buf);
        assert!(TpduHeader::read(&mut src, &tpkt).is_err());
    }
}
