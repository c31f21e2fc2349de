use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use opalrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, not_enough_bytes_err, read_padding,
    write_padding, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

use crate::rdp::capability::{ClientConfirmActive, ServerDemandActive};
use crate::rdp::finalization::{ControlPdu, FontPdu, SynchronizePdu};
use crate::rfx::FrameAcknowledgePdu;

const PROTOCOL_VERSION: u16 = 0x10;
const PDU_TYPE_MASK: u16 = 0xF;

const SHARE_CONTROL_HEADER_SIZE: usize = 2 /* totalLength */ + 2 /* pduType */ + 2 /* pduSource */ + 4 /* shareId */;
const SHARE_DATA_HEADER_SIZE: usize = 1 /* pad1 */ + 1 /* streamId */ + 2 /* uncompressedLength */
    + 1 /* pduType2 */ + 1 /* compressedType */ + 2 /* compressedLength */;

/// Share control header; the share identifier is common to every control
/// PDU body and is carried here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareControlHeader {
    pub share_control_pdu: ShareControlPdu,
    pub pdu_source: u16,
    pub share_id: u32,
}

impl ShareControlHeader {
    const NAME: &'static str = "ShareControlHeader";

    const FIXED_PART_SIZE: usize = SHARE_CONTROL_HEADER_SIZE;
}

impl Encode for ShareControlHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let pdu_type_with_version = PROTOCOL_VERSION | self.share_control_pdu.pdu_type().as_u16();

        dst.write_u16(cast_length!(Self::NAME, "totalLength", self.size())?);
        dst.write_u16(pdu_type_with_version);
        dst.write_u16(self.pdu_source);
        dst.write_u32(self.share_id);

        self.share_control_pdu.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.share_control_pdu.size()
    }
}

impl<'de> Decode<'de> for ShareControlHeader {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let total_length = usize::from(src.read_u16());
        let pdu_type_with_version = src.read_u16();
        let pdu_source = src.read_u16();
        let share_id = src.read_u32();

        let pdu_type = ShareControlPduType::from_u16(pdu_type_with_version & PDU_TYPE_MASK)
            .ok_or_else(|| invalid_field_err!("pduType", "unknown share control PDU type"))?;
        if pdu_type_with_version & !PDU_TYPE_MASK != PROTOCOL_VERSION {
            return Err(invalid_field_err!("pduVersion", "unexpected share control version"));
        }

        let share_control_pdu = ShareControlPdu::from_type(src, pdu_type)?;

        let header = Self {
            share_control_pdu,
            pdu_source,
            share_id,
        };

        // Some servers pad data PDUs past the inner unit; swallow that.
        if pdu_type == ShareControlPduType::DataPdu {
            let header_length = header.size();
            if total_length != header_length {
                if total_length < header_length {
                    return Err(not_enough_bytes_err(Self::NAME, total_length, header_length));
                }

                let padding = total_length - header_length;
                ensure_size!(ctx: Self::NAME, in: src, size: padding);
                read_padding!(src, padding);
            }
        }

        Ok(header)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
pub enum ShareControlPduType {
    DemandActivePdu = 0x1,
    ConfirmActivePdu = 0x3,
    DeactivateAllPdu = 0x6,
    DataPdu = 0x7,
}

impl ShareControlPduType {
    fn as_u16(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareControlPdu {
    ServerDemandActive(ServerDemandActive),
    ClientConfirmActive(ClientConfirmActive),
    ServerDeactivateAll,
    Data(ShareDataHeader),
}

impl ShareControlPdu {
    const NAME: &'static str = "ShareControlPdu";

    pub fn pdu_type(&self) -> ShareControlPduType {
        match self {
            Self::ServerDemandActive(_) => ShareControlPduType::DemandActivePdu,
            Self::ClientConfirmActive(_) => ShareControlPduType::ConfirmActivePdu,
            Self::ServerDeactivateAll => ShareControlPduType::DeactivateAllPdu,
            Self::Data(_) => ShareControlPduType::DataPdu,
        }
    }

    fn from_type(src: &mut ReadCursor<'_>, pdu_type: ShareControlPduType) -> DecodeResult<Self> {
        match pdu_type {
            ShareControlPduType::DemandActivePdu => Ok(Self::ServerDemandActive(ServerDemandActive::decode(src)?)),
            ShareControlPduType::ConfirmActivePdu => Ok(Self::ClientConfirmActive(ClientConfirmActive::decode(src)?)),
            ShareControlPduType::DeactivateAllPdu => {
                // lengthSourceDescriptor + sourceDescriptor, both irrelevant
                ensure_size!(ctx: Self::NAME, in: src, size: 2);
                let length = usize::from(src.read_u16());
                ensure_size!(ctx: Self::NAME, in: src, size: length);
                read_padding!(src, length);
                Ok(Self::ServerDeactivateAll)
            }
            ShareControlPduType::DataPdu => Ok(Self::Data(ShareDataHeader::decode(src)?)),
        }
    }
}

impl Encode for ShareControlPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            Self::ServerDemandActive(pdu) => pdu.encode(dst),
            Self::ClientConfirmActive(pdu) => pdu.encode(dst),
            Self::ServerDeactivateAll => {
                ensure_size!(ctx: Self::NAME, in: dst, size: 2);
                dst.write_u16(0); // empty source descriptor
                Ok(())
            }
            Self::Data(header) => header.encode(dst),
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        match self {
            Self::ServerDemandActive(pdu) => pdu.size(),
            Self::ClientConfirmActive(pdu) => pdu.size(),
            Self::ServerDeactivateAll => 2,
            Self::Data(header) => header.size(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum StreamPriority {
    Undefined = 0,
    Low = 1,
    Medium = 2,
    High = 4,
}

impl StreamPriority {
    fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum ShareDataPduType {
    Control = 0x14,
    Synchronize = 0x1F,
    FontList = 0x27,
    FontMap = 0x28,
    SetErrorInfo = 0x2F,
    FrameAcknowledge = 0x38,
}

impl ShareDataPduType {
    fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Share data header; compression is never negotiated and is rejected on
/// both paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareDataHeader {
    pub share_data_pdu: ShareDataPdu,
    pub stream_priority: StreamPriority,
}

impl ShareDataHeader {
    const NAME: &'static str = "ShareDataHeader";

    const FIXED_PART_SIZE: usize = SHARE_DATA_HEADER_SIZE;
}

impl Encode for ShareDataHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        write_padding!(dst, 1);
        dst.write_u8(self.stream_priority.as_u8());
        dst.write_u16(cast_length!(
            Self::NAME,
            "uncompressedLength",
            self.share_data_pdu.size() + 4 /* pduType2, compressedType, compressedLength */
        )?);
        dst.write_u8(self.share_data_pdu.pdu_type().as_u8());
        dst.write_u8(0); // compressedType
        dst.write_u16(0); // compressedLength

        self.share_data_pdu.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.share_data_pdu.size()
    }
}

impl<'de> Decode<'de> for ShareDataHeader {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        read_padding!(src, 1);
        let stream_priority = StreamPriority::from_u8(src.read_u8())
            .ok_or_else(|| invalid_field_err!("streamId", "unknown stream priority"))?;
        let _uncompressed_length = src.read_u16();
        let pdu_type = ShareDataPduType::from_u8(src.read_u8())
            .ok_or_else(|| invalid_field_err!("pduType2", "unknown share data PDU type"))?;
        let compressed_type = src.read_u8();
        let _compressed_length = src.read_u16();

        if compressed_type & 0x20 != 0 {
            return Err(invalid_field_err!("compressedType", "compression is not supported"));
        }

        let share_data_pdu = ShareDataPdu::from_type(src, pdu_type)?;

        Ok(Self {
            share_data_pdu,
            stream_priority,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareDataPdu {
    Synchronize(SynchronizePdu),
    Control(ControlPdu),
    FontList(FontPdu),
    FontMap(FontPdu),
    ErrorInfo(u32),
    FrameAcknowledge(FrameAcknowledgePdu),
}

impl ShareDataPdu {
    const NAME: &'static str = "ShareDataPdu";

    pub fn pdu_type(&self) -> ShareDataPduType {
        match self {
            Self::Synchronize(_) => ShareDataPduType::Synchronize,
            Self::Control(_) => ShareDataPduType::Control,
            Self::FontList(_) => ShareDataPduType::FontList,
            Self::FontMap(_) => ShareDataPduType::FontMap,
            Self::ErrorInfo(_) => ShareDataPduType::SetErrorInfo,
            Self::FrameAcknowledge(_) => ShareDataPduType::FrameAcknowledge,
        }
    }

    fn from_type(src: &mut ReadCursor<'_>, pdu_type: ShareDataPduType) -> DecodeResult<Self> {
        match pdu_type {
            ShareDataPduType::Synchronize => Ok(Self::Synchronize(SynchronizePdu::decode(src)?)),
            ShareDataPduType::Control => Ok(Self::Control(ControlPdu::decode(src)?)),
            ShareDataPduType::FontList => Ok(Self::FontList(FontPdu::decode(src)?)),
            ShareDataPduType::FontMap => Ok(Self::FontMap(FontPdu::decode(src)?)),
            ShareDataPduType::SetErrorInfo => {
                ensure_size!(ctx: Self::NAME, in: src, size: 4);
                Ok(Self::ErrorInfo(src.read_u32()))
            }
            ShareDataPduType::FrameAcknowledge => Ok(Self::FrameAcknowledge(FrameAcknowledgePdu::decode(src)?)),
        }
    }
}

impl Encode for ShareDataPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            Self::Synchronize(pdu) => pdu.encode(dst),
            Self::Control(pdu) => pdu.encode(dst),
            Self::FontList(pdu) | Self::FontMap(pdu) => pdu.encode(dst),
            Self::ErrorInfo(code) => {
                ensure_size!(ctx: Self::NAME, in: dst, size: 4);
                dst.write_u32(*code);
                Ok(())
            }
            Self::FrameAcknowledge(pdu) => pdu.encode(dst),
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        match self {
            Self::Synchronize(pdu) => pdu.size(),
            Self::Control(pdu) => pdu.size(),
            Self::FontList(pdu) | Self::FontMap(pdu) => pdu.size(),
            Self::ErrorInfo(_) => 4,
            Self::FrameAcknowledge(pdu) => pdu.size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;
    use crate::rdp::finalization::ControlAction;

    #[test]
    fn synchronize_data_pdu_roundtrip() {
        let header = ShareControlHeader {
            share_control_pdu: ShareControlPdu::Data(ShareDataHeader {
                share_data_pdu: ShareDataPdu::Synchronize(SynchronizePdu { target_user_id: 1002 }),
                stream_priority: StreamPriority::Medium,
            }),
            pdu_source: 1004,
            share_id: 0x0001_000F,
        };

        let encoded = encode_vec(&header).unwrap();
        assert_eq!(encoded.len(), header.size());

        let decoded: ShareControlHeader = decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn control_cooperate_roundtrip() {
        let header = ShareControlHeader {
            share_control_pdu: ShareControlPdu::Data(ShareDataHeader {
                share_data_pdu: ShareDataPdu::Control(ControlPdu {
                    action: ControlAction::Cooperate,
                    grant_id: 0,
                    control_id: 0,
                }),
                stream_priority: StreamPriority::Medium,
            }),
            pdu_source: 1004,
            share_id: 0x0001_000F,
        };

        let encoded = encode_vec(&header).unwrap();
        let decoded: ShareControlHeader = decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn trailing_padding_on_data_pdu_is_swallowed() {
        let header = ShareControlHeader {
            share_control_pdu: ShareControlPdu::Data(ShareDataHeader {
                share_data_pdu: ShareDataPdu::Synchronize(SynchronizePdu { target_user_id: 1002 }),
                stream_priority: StreamPriority::Medium,
            }),
            pdu_source: 1004,
            share_id: 1,
        };

        let mut encoded = encode_vec(&header).unwrap();
        encoded.extend_from_slice(&[0x00, 0x00]);
        let total = (encoded.len()) as u16;
        encoded[..2].copy_from_slice(&total.to_le_bytes());

        let decoded: ShareControlHeader = decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn unknown_pdu_type_is_rejected() {
        let header = ShareControlHeader {
            share_control_pdu: ShareControlPdu::ServerDeactivateAll,
            pdu_source: 1002,
            share_id: 1,
        };

        let mut encoded = encode_vec(&header).unwrap();
        encoded[2] = 0x1F; // version nibble intact, bogus type
        assert!(decode::<ShareControlHeader>(&encoded).is_err());
    }
}
