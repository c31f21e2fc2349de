use opalrdp_core::{
    ensure_fixed_part_size, read_padding, unsupported_version_err, write_padding, DecodeResult, EncodeResult,
    ReadCursor, WriteCursor,
};

/// TPKT header
///
/// Defined in RFC 1006 and ITU-T T.123: a version byte (always 3), a
/// reserved byte, and the total record length as a 16-bit big-endian
/// integer *including* the four header bytes. The shortest legal record is
/// therefore the header itself plus a three byte X.224 TPDU.
#[derive(PartialEq, Eq, Debug)]
pub struct TpktHeader {
    /// Length of the entire packet in octets, including the header.
    pub packet_length: u16,
}

impl TpktHeader {
    pub const VERSION: u8 = 3;

    pub const SIZE: usize = 4;

    pub const NAME: &'static str = "TpktHeader";

    const FIXED_PART_SIZE: usize = Self::SIZE;

    pub fn read(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let version = src.read_u8();

        if version != Self::VERSION {
            return Err(unsupported_version_err!("TPKT version", version));
        }

        read_padding!(src, 1);

        let packet_length = src.read_u16_be();

        Ok(Self { packet_length })
    }

    pub fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u8(Self::VERSION);

        write_padding!(dst, 1);

        dst.write_u16_be(self.packet_length);

        Ok(())
    }

    pub fn packet_length(&self) -> usize {
        usize::from(self.packet_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_payload_boundaries() {
        // 7-byte record carrying the payload DE AD BE
        let buf = [0x03, 0x00, 0x00, 0x07, 0xDE, 0xAD, 0xBE];
        let mut src = ReadCursor::new(&buf);

        let tpkt = TpktHeader::read(&mut src).unwrap();
        assert_eq!(tpkt.packet_length(), 7);

        let payload = src.read_slice(tpkt.packet_length() - TpktHeader::SIZE);
        assert_eq!(payload, &[0xDE, 0xAD, 0xBE]);
        assert_eq!(src.pos(), 7);
    }

    #[test]
    fn version_other_than_three_is_rejected() {
        let buf = [0x04, 0x00, 0x00, 0x07];
        let mut src = ReadCursor::new(&buf);
        assert!(TpktHeader::read(&mut src).is_err());
    }

    #[test]
    fn header_shorter_than_four_bytes_is_rejected() {
        let buf = [0x03, 0x00, 0x00];
        let mut src = ReadCursor::new(&buf);
        assert!(TpktHeader::read(&mut src).is_err());
    }

    #[test]
    fn write_then_read_roundtrip() {
        let mut buf = [0u8; 4];
        let mut dst = WriteCursor::new(&mut buf);
        TpktHeader { packet_length: 0x1234 }.write(&mut dst).unwrap();

        let mut src = ReadCursor::new(&buf);
        assert_eq!(TpktHeader::read(&mut src).unwrap().packet_length, 0x1234);
    }
}
