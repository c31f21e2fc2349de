use std::borrow::Cow;

use opalrdp_core::{
    ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

use crate::tpdu::{TpduCode, TpduHeader};
use crate::tpkt::TpktHeader;

/// A PDU carried inside a TPKT record and an X.224 TPDU.
///
/// Implementors describe the body only; the blanket [`Encode`] / [`Decode`]
/// implementations take care of both framing layers.
pub trait X224Pdu<'de>: Sized {
    const X224_NAME: &'static str;

    const TPDU_CODE: TpduCode;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()>;

    fn x224_body_decode(src: &mut ReadCursor<'de>, tpkt: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self>;

    /// Size of the TPDU header variable part (counted by LI).
    fn tpdu_header_variable_part_size(&self) -> usize;

    /// Size of the user data following the TPDU header (not counted by LI).
    fn tpdu_user_data_size(&self) -> usize;
}

/// Implements [`Encode`] / [`Decode`] for a concrete [`X224Pdu`] type.
///
/// `Encode`/`Decode` are foreign traits, so a single blanket `impl<T:
/// X224Pdu> Encode for T` is rejected by coherence (E0210); this macro
/// generates the identical per-type impls instead.
macro_rules! impl_x224_pdu_framing {
    ($ty:ident) => {
        impl_x224_pdu_framing!(@encode $ty);

        impl<'de> Decode<'de> for $ty {
            fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
                impl_x224_pdu_framing!(@decode_body src)
            }
        }
    };
    ($ty:ident < $lt:lifetime >) => {
        impl_x224_pdu_framing!(@encode $ty < $lt >);

        impl<$lt> Decode<$lt> for $ty<$lt> {
            fn decode(src: &mut ReadCursor<$lt>) -> DecodeResult<Self> {
                impl_x224_pdu_framing!(@decode_body src)
            }
        }
    };
    (@encode $ty:ident $(< $lt:lifetime >)?) => {
        impl $(<$lt>)? Encode for $ty $(<$lt>)? {
            fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
                let packet_length = self.size();

                ensure_size!(ctx: Self::X224_NAME, in: dst, size: packet_length);

                TpktHeader {
                    packet_length: u16::try_from(packet_length).map_err(|_| {
                        invalid_field_err(Self::X224_NAME, "packetLength", "PDU too large for a TPKT record")
                    })?,
                }
                .write(dst)?;

                TpduHeader {
                    li: u8::try_from(
                        Self::TPDU_CODE.header_fixed_part_size() + self.tpdu_header_variable_part_size() - 1,
                    )
                    .map_err(|_| invalid_field_err(Self::X224_NAME, "li", "TPDU header too large"))?,
                    code: Self::TPDU_CODE,
                }
                .write(dst)?;

                self.x224_body_encode(dst)
            }

            fn name(&self) -> &'static str {
                Self::X224_NAME
            }

            fn size(&self) -> usize {
                TpktHeader::SIZE
                    + Self::TPDU_CODE.header_fixed_part_size()
                    + self.tpdu_header_variable_part_size()
                    + self.tpdu_user_data_size()
            }
        }
    };
    (@decode_body $src:ident) => {{
        let tpkt = TpktHeader::read($src)?;

        ensure_size!(ctx: Self::X224_NAME, in: $src, size: tpkt.packet_length().saturating_sub(TpktHeader::SIZE));

        let tpdu = TpduHeader::read($src, &tpkt)?;
        tpdu.code.check_expected(Self::TPDU_CODE)?;

        if tpdu.size() < tpdu.fixed_part_size() {
            return Err(invalid_field_err(
                TpduHeader::NAME,
                "li",
                "fixed part bigger than total header size",
            ));
        }

        Self::x224_body_decode($src, &tpkt, &tpdu)
    }};
}

pub(crate) use impl_x224_pdu_framing;

/// Raw X.224 data TPDU: `02 F0 80` followed by the payload.
#[derive(Debug)]
pub struct X224Data<'a> {
    pub data: Cow<'a, [u8]>,
}

impl<'de> X224Pdu<'de> for X224Data<'de> {
    const X224_NAME: &'static str = "X.224 Data";

    const TPDU_CODE: TpduCode = TpduCode::DATA;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::X224_NAME, in: dst, size: self.data.len());
        dst.write_slice(&self.data);

        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'de>, tpkt: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self> {
        let user_data_size = user_data_size(tpkt, tpdu);

        ensure_size!(ctx: Self::X224_NAME, in: src, size: user_data_size);
        let data = src.read_slice(user_data_size);

        Ok(Self {
            data: Cow::Borrowed(data),
        })
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        0
    }

    fn tpdu_user_data_size(&self) -> usize {
        self.data.len()
    }
}

impl_x224_pdu_framing!(X224Data<'de>);

pub fn user_data_size(tpkt: &TpktHeader, tpdu: &TpduHeader) -> usize {
    tpkt.packet_length() - TpktHeader::SIZE - tpdu.size()
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    #[test]
    fn data_tpdu_roundtrip() {
        let pdu = X224Data {
            data: Cow::Borrowed(&[0x0A, 0x0B, 0x0C]),
        };

        let encoded = encode_vec(&pdu).unwrap();
        assert_eq!(encoded, [0x03, 0x00, 0x00, 0x0A, 0x02, 0xF0, 0x80, 0x0A, 0x0B, 0x0C]);

        let decoded: X224Data<'_> = decode(&encoded).unwrap();
        assert_eq!(decoded.data.as_ref(), &[0x0A, 0x0B, 0x0C]);
    }
}
