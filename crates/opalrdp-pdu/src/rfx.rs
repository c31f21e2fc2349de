//! RemoteFX (MS-RDPRFX) wire blocks. Every block starts with a 2-byte
//! block type and a 4-byte total length (header included); a declared
//! length below six bytes or past the outer buffer is rejected.
//!
//! Only decoding is provided for the server-to-client stream; the one
//! encoded message is the client's frame acknowledge.

mod data;
mod header;

use opalrdp_core::{
    ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

pub use self::data::{FrameBeginPdu, FrameEndPdu, Quant, RegionPdu, RfxRectangle, Tile, TileSetPdu};
pub use self::header::{
    ChannelsPdu, CodecVersionsPdu, ContextPdu, EntropyAlgorithm, OperatingMode, RfxChannel, SyncPdu,
};

const CODEC_ID: u8 = 1;
const CHANNEL_ID_FOR_CONTEXT: u8 = 0xFF;
const CHANNEL_ID_FOR_OTHER_VALUES: u8 = 0x00;

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
pub enum BlockType {
    TileSet = 0xCAC2,
    Tile = 0xCAC3,
    Sync = 0xCCC0,
    CodecVersions = 0xCCC1,
    Channels = 0xCCC2,
    Context = 0xCCC3,
    FrameBegin = 0xCCC4,
    FrameEnd = 0xCCC5,
    Region = 0xCCC6,
    Extension = 0xCCC7,
}

impl BlockType {
    fn is_channel(self) -> bool {
        matches!(
            self,
            BlockType::Context
                | BlockType::FrameBegin
                | BlockType::FrameEnd
                | BlockType::Region
                | BlockType::Extension
                | BlockType::TileSet
        )
    }
}

/// TS_RFX_BLOCKT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub ty: u16,
    /// Total block length, this header included.
    pub data_length: usize,
}

impl BlockHeader {
    pub const NAME: &'static str = "RfxBlockHeader";

    pub const FIXED_PART_SIZE: usize = 2 /* blockType */ + 4 /* blockLen */;
}

impl<'de> Decode<'de> for BlockHeader {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let ty = src.read_u16();
        let data_length = src.read_u32() as usize;

        if data_length < Self::FIXED_PART_SIZE {
            return Err(invalid_field_err!("blockLen", "block length below the header size"));
        }

        if data_length - Self::FIXED_PART_SIZE > src.len() {
            return Err(invalid_field_err!("blockLen", "block length past the end of the buffer"));
        }

        Ok(Self { ty, data_length })
    }
}

/// TS_RFX_CODEC_CHANNELT, present on the codec-channel block family.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CodecChannelHeader {
    channel_id: u8,
}

impl CodecChannelHeader {
    const NAME: &'static str = "RfxCodecChannelHeader";

    const FIXED_PART_SIZE: usize = 1 /* codecId */ + 1 /* channelId */;
}

impl<'de> Decode<'de> for CodecChannelHeader {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let codec_id = src.read_u8();
        if codec_id != CODEC_ID {
            return Err(invalid_field_err!("codecId", "invalid codec ID"));
        }

        Ok(Self {
            channel_id: src.read_u8(),
        })
    }
}

/// One decoded RFX block.
///
/// Blocks the decoder does not act on come back as [`Block::Skipped`],
/// with the body already consumed, so a stream walker can keep going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block<'a> {
    Sync(SyncPdu),
    CodecVersions(CodecVersionsPdu),
    Channels(ChannelsPdu),
    Context(ContextPdu),
    FrameBegin(FrameBeginPdu),
    FrameEnd(FrameEndPdu),
    Region(RegionPdu),
    TileSet(TileSetPdu<'a>),
    Tile(Tile<'a>),
    Skipped(u16),
}

impl Block<'_> {
    const NAME: &'static str = "RfxBlock";
}

impl<'de> Decode<'de> for Block<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let header = BlockHeader::decode(src)?;
        let mut consumed = BlockHeader::FIXED_PART_SIZE;

        let Some(ty) = BlockType::from_u16(header.ty) else {
            // unknown block: consume the declared body and keep walking
            let body_len = header.data_length - consumed;
            ensure_size!(ctx: Self::NAME, in: src, size: body_len);
            src.advance(body_len);
            return Ok(Self::Skipped(header.ty));
        };

        if ty.is_channel() {
            let channel = CodecChannelHeader::decode(src)?;
            let expected_id = if ty == BlockType::Context {
                CHANNEL_ID_FOR_CONTEXT
            } else {
                CHANNEL_ID_FOR_OTHER_VALUES
            };
            if channel.channel_id != expected_id {
                return Err(invalid_field_err!("channelId", "invalid channel ID"));
            }
            consumed += CodecChannelHeader::FIXED_PART_SIZE;
        }

        let body_len = header
            .data_length
            .checked_sub(consumed)
            .ok_or_else(|| invalid_field_err!("blockLen", "block length below the header size"))?;
        ensure_size!(ctx: Self::NAME, in: src, size: body_len);
        let body = &mut ReadCursor::new(src.read_slice(body_len));

        match ty {
            BlockType::Sync => Ok(Self::Sync(SyncPdu::decode(body)?)),
            BlockType::CodecVersions => Ok(Self::CodecVersions(CodecVersionsPdu::decode(body)?)),
            BlockType::Channels => Ok(Self::Channels(ChannelsPdu::decode(body)?)),
            BlockType::Context => Ok(Self::Context(ContextPdu::decode(body)?)),
            BlockType::FrameBegin => Ok(Self::FrameBegin(FrameBeginPdu::decode(body)?)),
            BlockType::FrameEnd => Ok(Self::FrameEnd(FrameEndPdu::decode(body)?)),
            BlockType::Region => Ok(Self::Region(RegionPdu::decode(body)?)),
            BlockType::TileSet => Ok(Self::TileSet(TileSetPdu::decode(body)?)),
            BlockType::Tile => Ok(Self::Tile(Tile::decode(body)?)),
            BlockType::Extension => Ok(Self::Skipped(header.ty)),
        }
    }
}

/// TS_FRAME_ACKNOWLEDGE_PDU, sent by the client after each frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameAcknowledgePdu {
    pub frame_id: u32,
}

impl FrameAcknowledgePdu {
    const NAME: &'static str = "FrameAcknowledgePdu";

    const FIXED_PART_SIZE: usize = 4 /* frameId */;
}

impl Encode for FrameAcknowledgePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.frame_id);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for FrameAcknowledgePdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self {
            frame_id: src.read_u32(),
        })
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::decode;

    use super::*;

    #[test]
    fn block_length_below_header_is_rejected() {
        let encoded = [0xC0, 0xCC, 0x05, 0x00, 0x00, 0x00];
        assert!(decode::<Block<'_>>(&encoded).is_err());
    }

    #[test]
    fn block_length_past_buffer_is_rejected() {
        let encoded = [0xC0, 0xCC, 0x40, 0x00, 0x00, 0x00, 0xAA];
        assert!(decode::<Block<'_>>(&encoded).is_err());
    }

    #[test]
    fn unknown_block_is_skipped_with_its_body() {
        let encoded = [
            0x99, 0xC9, 0x08, 0x00, 0x00, 0x00, 0xAA, 0xBB, // unknown, 2-byte body
            0xC5, 0xCC, 0x08, 0x00, 0x00, 0x00, 0x01, 0x00, // frame end
        ];

        let mut cursor = ReadCursor::new(&encoded);
        let first = Block::decode(&mut cursor).unwrap();
        assert_eq!(first, Block::Skipped(0xC999));

        let second = Block::decode(&mut cursor).unwrap();
        assert!(matches!(second, Block::FrameEnd(_)));
    }

    #[test]
    fn context_block_requires_the_context_channel_id() {
        // context block with channelId 0x00 instead of 0xFF
        let encoded = [
            0xC3, 0xCC, 0x0D, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00, 0x48, 0x02,
        ];
        assert!(decode::<Block<'_>>(&encoded).is_err());
    }
}
