//! RFX frame data blocks: frame delimiters, the dirty region, tile sets
//! and the entropy-coded tiles themselves.

use bit_field::BitField as _;

use opalrdp_core::{
    ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, ReadCursor,
};

use crate::rfx::{BlockHeader, BlockType};

const CBT_REGION: u16 = 0xCAC1;
const CBT_TILESET: u16 = 0xCAC2;
const RECTANGLE_SIZE: usize = 8;
const TILE_SIZE: u8 = 0x40;

/// TS_RFX_FRAME_BEGIN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBeginPdu {
    pub index: u32,
    pub number_of_regions: i16,
}

impl FrameBeginPdu {
    const NAME: &'static str = "RfxFrameBegin";

    const FIXED_PART_SIZE: usize = 4 /* frameIdx */ + 2 /* numRegions */;
}

impl<'de> Decode<'de> for FrameBeginPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let index = src.read_u32();
        let number_of_regions = src.read_i16();

        Ok(Self {
            index,
            number_of_regions,
        })
    }
}

/// TS_RFX_FRAME_END; empty body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEndPdu;

impl<'de> Decode<'de> for FrameEndPdu {
    fn decode(_: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        Ok(Self)
    }
}

/// TS_RFX_RECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfxRectangle {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl RfxRectangle {
    const NAME: &'static str = "RfxRectangle";

    const FIXED_PART_SIZE: usize = RECTANGLE_SIZE;
}

impl<'de> Decode<'de> for RfxRectangle {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self {
            x: src.read_u16(),
            y: src.read_u16(),
            width: src.read_u16(),
            height: src.read_u16(),
        })
    }
}

/// TS_RFX_REGION: the dirty rectangles of the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPdu {
    pub rectangles: Vec<RfxRectangle>,
}

impl RegionPdu {
    const NAME: &'static str = "RfxRegion";

    const FIXED_PART_SIZE: usize = 1 /* regionFlags */ + 2 /* numRects */;
}

impl<'de> Decode<'de> for RegionPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let _region_flags = src.read_u8();
        let number_of_rectangles = usize::from(src.read_u16());

        ensure_size!(ctx: Self::NAME, in: src, size: number_of_rectangles * RECTANGLE_SIZE);

        let rectangles = (0..number_of_rectangles)
            .map(|_| RfxRectangle::decode(src))
            .collect::<Result<Vec<_>, _>>()?;

        ensure_size!(ctx: Self::NAME, in: src, size: 4);

        let region_type = src.read_u16();
        if region_type != CBT_REGION {
            return Err(invalid_field_err!("regionType", "invalid region type"));
        }

        let _number_of_tilesets = src.read_u16();

        Ok(Self { rectangles })
    }
}

/// TS_RFX_CODEC_QUANT: ten 4-bit quantization values packed into five
/// bytes, low nibble first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quant {
    pub ll3: u8,
    pub lh3: u8,
    pub hl3: u8,
    pub hh3: u8,
    pub lh2: u8,
    pub hl2: u8,
    pub hh2: u8,
    pub lh1: u8,
    pub hl1: u8,
    pub hh1: u8,
}

impl Quant {
    const NAME: &'static str = "RfxQuant";

    pub const FIXED_PART_SIZE: usize = 5 /* 10 x 4 bits */;
}

impl Default for Quant {
    // default values used by the MS RDP server
    fn default() -> Self {
        Self {
            ll3: 6,
            lh3: 6,
            hl3: 6,
            hh3: 6,
            lh2: 7,
            hl2: 7,
            hh2: 8,
            lh1: 8,
            hl1: 8,
            hh1: 9,
        }
    }
}

impl<'de> Decode<'de> for Quant {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        #![allow(clippy::similar_names)] // ll3, lh3, ... are the domain names
        ensure_fixed_part_size!(in: src);

        let level3 = src.read_u16();
        let ll3 = level3.get_bits(0..4) as u8;
        let lh3 = level3.get_bits(4..8) as u8;
        let hl3 = level3.get_bits(8..12) as u8;
        let hh3 = level3.get_bits(12..16) as u8;

        let level2_with_lh1 = src.read_u16();
        let lh2 = level2_with_lh1.get_bits(0..4) as u8;
        let hl2 = level2_with_lh1.get_bits(4..8) as u8;
        let hh2 = level2_with_lh1.get_bits(8..12) as u8;
        let lh1 = level2_with_lh1.get_bits(12..16) as u8;

        let level1 = src.read_u8();
        let hl1 = level1.get_bits(0..4);
        let hh1 = level1.get_bits(4..8);

        Ok(Self {
            ll3,
            lh3,
            hl3,
            hh3,
            lh2,
            hl2,
            hh2,
            lh1,
            hl1,
            hh1,
        })
    }
}

/// TS_RFX_TILE: quantization indices, grid position and the three
/// entropy-coded component payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile<'a> {
    pub y_quant_index: u8,
    pub cb_quant_index: u8,
    pub cr_quant_index: u8,

    pub x: u16,
    pub y: u16,

    pub y_data: &'a [u8],
    pub cb_data: &'a [u8],
    pub cr_data: &'a [u8],
}

impl Tile<'_> {
    const NAME: &'static str = "RfxTile";

    const FIXED_PART_SIZE: usize = 3 /* quant indices */ + 2 /* xIdx */ + 2 /* yIdx */ + 3 * 2 /* component lengths */;
}

impl<'de> Decode<'de> for Tile<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        #![allow(clippy::similar_names)]
        ensure_fixed_part_size!(in: src);

        let y_quant_index = src.read_u8();
        let cb_quant_index = src.read_u8();
        let cr_quant_index = src.read_u8();

        let x = src.read_u16();
        let y = src.read_u16();

        let y_length = usize::from(src.read_u16());
        let cb_length = usize::from(src.read_u16());
        let cr_length = usize::from(src.read_u16());

        if y_length + cb_length + cr_length > src.len() {
            return Err(invalid_field_err!(
                "componentLengths",
                "component data past the end of the tile block"
            ));
        }

        let y_data = src.read_slice(y_length);
        let cb_data = src.read_slice(cb_length);
        let cr_data = src.read_slice(cr_length);

        Ok(Self {
            y_quant_index,
            cb_quant_index,
            cr_quant_index,
            x,
            y,
            y_data,
            cb_data,
            cr_data,
        })
    }
}

/// TS_RFX_TILESET.
///
/// Tiles whose block fails to parse are dropped (and counted); the
/// surviving tiles still compose into the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSetPdu<'a> {
    pub quants: Vec<Quant>,
    pub tiles: Vec<Tile<'a>>,
    pub dropped_tiles: usize,
}

impl TileSetPdu<'_> {
    const NAME: &'static str = "RfxTileSet";

    const FIXED_PART_SIZE: usize = 2 /* subtype */ + 2 /* idx */ + 2 /* flags */
        + 1 /* numQuant */ + 1 /* tileSize */ + 2 /* numTiles */ + 4 /* tilesDataSize */;
}

impl<'de> Decode<'de> for TileSetPdu<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let subtype = src.read_u16();
        if subtype != CBT_TILESET {
            return Err(invalid_field_err!("subtype", "invalid tile set subtype"));
        }

        let idx = src.read_u16();
        if idx != 0 {
            return Err(invalid_field_err!("idx", "invalid tile set index"));
        }

        // The flags duplicate the context properties; the context wins.
        let _flags = src.read_u16();

        let number_of_quants = usize::from(src.read_u8());

        let tile_size = src.read_u8();
        if tile_size != TILE_SIZE {
            return Err(invalid_field_err!("tileSize", "tile size other than 64x64"));
        }

        let number_of_tiles = usize::from(src.read_u16());
        let _tiles_data_size = src.read_u32();

        let quants = (0..number_of_quants)
            .map(|_| Quant::decode(src))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tiles = Vec::with_capacity(number_of_tiles);
        let mut dropped_tiles = 0;

        for _ in 0..number_of_tiles {
            let header = BlockHeader::decode(src)?;
            let body_len = header.data_length - BlockHeader::FIXED_PART_SIZE;

            ensure_size!(ctx: Self::NAME, in: src, size: body_len);
            let mut body = ReadCursor::new(src.read_slice(body_len));

            if header.ty != BlockType::Tile as u16 {
                dropped_tiles += 1;
                continue;
            }

            match Tile::decode(&mut body) {
                Ok(tile) => tiles.push(tile),
                Err(_) => dropped_tiles += 1,
            }
        }

        Ok(Self {
            quants,
            tiles,
            dropped_tiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::decode;

    use super::*;

    #[test]
    fn frame_begin_fields() {
        let encoded = [0x07, 0x00, 0x00, 0x00, 0x01, 0x00];
        let frame_begin: FrameBeginPdu = decode(&encoded).unwrap();

        assert_eq!(frame_begin.index, 7);
        assert_eq!(frame_begin.number_of_regions, 1);
    }

    #[test]
    fn region_rectangles() {
        let encoded = [
            0x01, // regionFlags, lrf set
            0x01, 0x00, // one rectangle
            0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0x40, 0x00, // 64x64 at origin
            0xC1, 0xCA, // regionType
            0x01, 0x00, // numTilesets
        ];

        let region: RegionPdu = decode(&encoded).unwrap();
        assert_eq!(region.rectangles.len(), 1);
        assert_eq!(region.rectangles[0].width, 64);
    }

    #[test]
    fn quant_nibble_unpacking() {
        let encoded = [0x65, 0x87, 0xA9, 0xCB, 0xED];
        let quant: Quant = decode(&encoded).unwrap();

        assert_eq!(
            quant,
            Quant {
                ll3: 5,
                lh3: 6,
                hl3: 7,
                hh3: 8,
                lh2: 9,
                hl2: 10,
                hh2: 11,
                lh1: 12,
                hl1: 13,
                hh1: 14,
            }
        );
    }

    #[test]
    fn tile_component_boundaries() {
        let encoded = [
            0x00, 0x01, 0x01, // quant indices
            0x02, 0x00, 0x03, 0x00, // grid position (2, 3)
            0x02, 0x00, 0x01, 0x00, 0x01, 0x00, // component lengths
            0xAA, 0xBB, // Y
            0xCC, // Cb
            0xDD, // Cr
        ];

        let tile: Tile<'_> = decode(&encoded).unwrap();
        assert_eq!((tile.x, tile.y), (2, 3));
        assert_eq!(tile.y_data, &[0xAA, 0xBB]);
        assert_eq!(tile.cb_data, &[0xCC]);
        assert_eq!(tile.cr_data, &[0xDD]);
    }

    #[test]
    fn tile_with_lengths_past_the_block_is_rejected() {
        let encoded = [
            0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, //
            0x10, 0x00, 0x00, 0x00, 0x00, 0x00, // Y claims 16 bytes
            0xAA,
        ];

        assert!(decode::<Tile<'_>>(&encoded).is_err());
    }

    #[test]
    fn tileset_with_one_empty_tile() {
        let encoded = [
            0xC2, 0xCA, // subtype CBT_TILESET
            0x00, 0x00, // idx
            0x51, 0x44, // flags (ignored)
            0x01, // one quant set
            0x40, // tile size
            0x01, 0x00, // one tile
            0x19, 0x00, 0x00, 0x00, // tiles data size
            0x66, 0x66, 0x77, 0x88, 0x98, // quant set
            0xC3, 0xCA, 0x13, 0x00, 0x00, 0x00, // CBT_TILE, blockLen 19
            0x00, 0x00, 0x00, // quant indices
            0x00, 0x00, 0x00, 0x00, // position
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // empty components
        ];

        let tile_set: TileSetPdu<'_> = decode(&encoded).unwrap();
        assert_eq!(tile_set.quants.len(), 1);
        assert_eq!(tile_set.tiles.len(), 1);
        assert_eq!(tile_set.dropped_tiles, 0);
        assert!(tile_set.tiles[0].y_data.is_empty());
    }

    #[test]
    fn broken_tile_is_dropped_but_siblings_survive() {
        let encoded = [
            0xC2, 0xCA, 0x00, 0x00, 0x51, 0x44, //
            0x01, 0x40, 0x02, 0x00, // two tiles
            0x26, 0x00, 0x00, 0x00, //
            0x66, 0x66, 0x77, 0x88, 0x98, // quant set
            // tile 1: truncated component lengths
            0xC3, 0xCA, 0x0D, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            // tile 2: valid, empty components
            0xC3, 0xCA, 0x13, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];

        let tile_set: TileSetPdu<'_> = decode(&encoded).unwrap();
        assert_eq!(tile_set.tiles.len(), 1);
        assert_eq!(tile_set.dropped_tiles, 1);
    }
}
