//! RFX header blocks: sync, codec versions, channel announcement and the
//! encoding context.

use bit_field::BitField as _;
use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use opalrdp_core::{
    ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, ReadCursor,
};

const SYNC_MAGIC: u32 = 0xCACC_ACCA;
const SYNC_VERSION: u16 = 0x0100;

const CONTEXT_ID: u8 = 0;
const TILE_SIZE: u16 = 0x0040;
const COLOR_CONVERSION_ICT: u16 = 1;
const CLW_XFORM_DWT_53_A: u16 = 1;
const SCALAR_QUANTIZATION: u16 = 1;

/// TS_RFX_SYNC: fixed magic and version, no state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPdu;

impl SyncPdu {
    const NAME: &'static str = "RfxSync";

    const FIXED_PART_SIZE: usize = 4 /* magic */ + 2 /* version */;
}

impl<'de> Decode<'de> for SyncPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let magic = src.read_u32();
        if magic != SYNC_MAGIC {
            return Err(invalid_field_err!("magic", "invalid sync magic"));
        }

        let version = src.read_u16();
        if version != SYNC_VERSION {
            return Err(invalid_field_err!("version", "invalid sync version"));
        }

        Ok(Self)
    }
}

/// TS_RFX_CODEC_VERSIONS; informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecVersionsPdu {
    pub codec_count: u8,
}

impl CodecVersionsPdu {
    const NAME: &'static str = "RfxCodecVersions";

    const FIXED_PART_SIZE: usize = 1 /* numCodecs */;

    const CODEC_VERSION_SIZE: usize = 1 /* codecId */ + 2 /* version */;
}

impl<'de> Decode<'de> for CodecVersionsPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let codec_count = src.read_u8();

        ensure_size!(ctx: Self::NAME, in: src, size: usize::from(codec_count) * Self::CODEC_VERSION_SIZE);
        src.advance(usize::from(codec_count) * Self::CODEC_VERSION_SIZE);

        Ok(Self { codec_count })
    }
}

/// One TS_RFX_CHANNELT entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfxChannel {
    pub id: u8,
    pub width: i16,
    pub height: i16,
}

impl RfxChannel {
    const SIZE: usize = 1 /* channelId */ + 2 /* width */ + 2 /* height */;
}

/// TS_RFX_CHANNELS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelsPdu(pub Vec<RfxChannel>);

impl ChannelsPdu {
    const NAME: &'static str = "RfxChannels";

    const FIXED_PART_SIZE: usize = 1 /* numChannels */;
}

impl<'de> Decode<'de> for ChannelsPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let channel_count = usize::from(src.read_u8());

        ensure_size!(ctx: Self::NAME, in: src, size: channel_count * RfxChannel::SIZE);

        let channels = (0..channel_count)
            .map(|_| RfxChannel {
                id: src.read_u8(),
                width: src.read_i16(),
                height: src.read_i16(),
            })
            .collect();

        Ok(Self(channels))
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OperatingMode: u16 {
        /// When clear the codec operates in video mode.
        const IMAGE_MODE = 0x02;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
pub enum EntropyAlgorithm {
    Rlgr1 = 0x01,
    Rlgr3 = 0x04,
}

/// TS_RFX_CONTEXT: tile size and the entropy algorithm used by every
/// subsequent tile set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPdu {
    pub flags: OperatingMode,
    pub entropy_algorithm: EntropyAlgorithm,
}

impl ContextPdu {
    const NAME: &'static str = "RfxContext";

    const FIXED_PART_SIZE: usize = 1 /* ctxId */ + 2 /* tileSize */ + 2 /* properties */;
}

impl<'de> Decode<'de> for ContextPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let id = src.read_u8();
        if id != CONTEXT_ID {
            return Err(invalid_field_err!("ctxId", "invalid context ID"));
        }

        let tile_size = src.read_u16();
        if tile_size != TILE_SIZE {
            return Err(invalid_field_err!("tileSize", "tile size other than 64x64"));
        }

        let properties = src.read_u16();
        let flags = OperatingMode::from_bits_truncate(properties.get_bits(0..3));

        if properties.get_bits(3..5) != COLOR_CONVERSION_ICT {
            return Err(invalid_field_err!("cct", "invalid color conversion transform"));
        }

        if properties.get_bits(5..9) != CLW_XFORM_DWT_53_A {
            return Err(invalid_field_err!("xft", "invalid wavelet transform"));
        }

        let entropy_algorithm = EntropyAlgorithm::from_u16(properties.get_bits(9..13))
            .ok_or_else(|| invalid_field_err!("et", "invalid entropy algorithm"))?;

        if properties.get_bits(13..15) != SCALAR_QUANTIZATION {
            return Err(invalid_field_err!("qt", "invalid quantization type"));
        }

        Ok(Self {
            flags,
            entropy_algorithm,
        })
    }
}
