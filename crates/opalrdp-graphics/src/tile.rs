//! The per-tile decode pipeline: entropy decode, LL3 differential
//! reconstruction, dequantization, inverse DWT and color conversion.
//!
//! [`TileDecoder`] owns the coefficient and DWT scratch buffers so that
//! nothing is allocated per tile. It is not shared: decoding tiles
//! concurrently within a session requires one decoder per worker.

use opalrdp_pdu::rfx::{EntropyAlgorithm, Quant, Tile};
use thiserror::Error;

use crate::color::{self, YCbCrBuffer};
use crate::rlgr::{self, RlgrError};
use crate::{dwt, quantization, subband};

/// Tile edge length in pixels.
pub const TILE_DIMENSION: usize = 64;

/// Samples per tile component (64 x 64).
pub const TILE_SAMPLES: usize = TILE_DIMENSION * TILE_DIMENSION;

/// Bytes of RGBA output per tile.
pub const TILE_RGBA_SIZE: usize = TILE_SAMPLES * 4;

/// Offset of the LL3 sub-band inside the coefficient buffer.
const LL3_OFFSET: usize = 4032;

#[derive(Debug, Error)]
pub enum TileDecodeError {
    #[error("output buffer too small: got {got} bytes, need {needed}")]
    BufferTooSmall { got: usize, needed: usize },
    #[error("quantization index {index} out of range ({available} sets available)")]
    BadQuantIndex { index: u8, available: usize },
    #[error("{component} component entropy decode failed")]
    Entropy {
        component: &'static str,
        source: RlgrError,
    },
}

/// Reusable per-tile decoding state.
pub struct TileDecoder {
    y: Vec<i16>,
    cb: Vec<i16>,
    cr: Vec<i16>,
    dwt_temp: Vec<i16>,
}

impl Default for TileDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TileDecoder {
    pub fn new() -> Self {
        Self {
            y: vec![0; TILE_SAMPLES],
            cb: vec![0; TILE_SAMPLES],
            cr: vec![0; TILE_SAMPLES],
            dwt_temp: vec![0; TILE_SAMPLES],
        }
    }

    /// Decodes one tile into `output` (RGBA, row-major) and returns its
    /// grid position.
    ///
    /// The luma plane is RLGR1-coded, the chroma planes RLGR3-coded.
    pub fn decode(
        &mut self,
        tile: &Tile<'_>,
        quants: &[Quant],
        output: &mut [u8],
    ) -> Result<(u16, u16), TileDecodeError> {
        if output.len() < TILE_RGBA_SIZE {
            return Err(TileDecodeError::BufferTooSmall {
                got: output.len(),
                needed: TILE_RGBA_SIZE,
            });
        }

        let y_quant = lookup_quant(quants, tile.y_quant_index)?;
        let cb_quant = lookup_quant(quants, tile.cb_quant_index)?;
        let cr_quant = lookup_quant(quants, tile.cr_quant_index)?;

        decode_component(EntropyAlgorithm::Rlgr1, tile.y_data, y_quant, &mut self.y, &mut self.dwt_temp)
            .map_err(|source| TileDecodeError::Entropy { component: "Y", source })?;
        decode_component(EntropyAlgorithm::Rlgr3, tile.cb_data, cb_quant, &mut self.cb, &mut self.dwt_temp)
            .map_err(|source| TileDecodeError::Entropy { component: "Cb", source })?;
        decode_component(EntropyAlgorithm::Rlgr3, tile.cr_data, cr_quant, &mut self.cr, &mut self.dwt_temp)
            .map_err(|source| TileDecodeError::Entropy { component: "Cr", source })?;

        color::ycbcr_to_rgba(
            YCbCrBuffer {
                y: &self.y,
                cb: &self.cb,
                cr: &self.cr,
            },
            output,
        );

        Ok((tile.x, tile.y))
    }
}

fn lookup_quant(quants: &[Quant], index: u8) -> Result<&Quant, TileDecodeError> {
    quants.get(usize::from(index)).ok_or(TileDecodeError::BadQuantIndex {
        index,
        available: quants.len(),
    })
}

fn decode_component(
    mode: EntropyAlgorithm,
    data: &[u8],
    quant: &Quant,
    coefficients: &mut [i16],
    temp: &mut [i16],
) -> Result<(), RlgrError> {
    rlgr::decode(mode, data, coefficients)?;
    subband::decode(&mut coefficients[LL3_OFFSET..]);
    quantization::decode(coefficients, quant);
    dwt::decode(coefficients, temp);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_tile() -> Tile<'static> {
        Tile {
            y_quant_index: 0,
            cb_quant_index: 0,
            cr_quant_index: 0,
            x: 5,
            y: 7,
            y_data: &[],
            cb_data: &[],
            cr_data: &[],
        }
    }

    #[test]
    fn empty_components_decode_to_mid_gray() {
        let mut decoder = TileDecoder::new();
        let mut output = vec![0u8; TILE_RGBA_SIZE];

        let (x, y) = decoder
            .decode(&empty_tile(), &[Quant::default()], &mut output)
            .unwrap();

        assert_eq!((x, y), (5, 7));
        // Y = Cb = Cr = 0 maps to gray once the DC level shift is applied
        assert!(output.chunks_exact(4).all(|px| {
            (126..=130).contains(&px[0]) && px[0] == px[1] && px[1] == px[2] && px[3] == 0xFF
        }));
    }

    #[test]
    fn quant_index_out_of_range_is_rejected() {
        let mut decoder = TileDecoder::new();
        let mut output = vec![0u8; TILE_RGBA_SIZE];

        let tile = Tile {
            y_quant_index: 3,
            ..empty_tile()
        };

        let err = decoder.decode(&tile, &[Quant::default()], &mut output).unwrap_err();
        assert!(matches!(err, TileDecodeError::BadQuantIndex { index: 3, available: 1 }));
    }

    #[test]
    fn short_output_buffer_is_rejected() {
        let mut decoder = TileDecoder::new();
        let mut output = vec![0u8; TILE_RGBA_SIZE - 1];

        let err = decoder
            .decode(&empty_tile(), &[Quant::default()], &mut output)
            .unwrap_err();
        assert!(matches!(err, TileDecodeError::BufferTooSmall { .. }));
    }

    #[test]
    fn truncated_luma_payload_fails_the_tile() {
        let mut decoder = TileDecoder::new();
        let mut output = vec![0u8; TILE_RGBA_SIZE];

        let tile = Tile {
            y_data: &[0x00], // dangling unary prefix
            ..empty_tile()
        };

        let err = decoder.decode(&tile, &[Quant::default()], &mut output).unwrap_err();
        assert!(matches!(err, TileDecodeError::Entropy { component: "Y", .. }));
    }

    #[test]
    fn decoder_state_is_reusable_across_tiles() {
        let mut decoder = TileDecoder::new();
        let mut first = vec![0u8; TILE_RGBA_SIZE];
        let mut second = vec![0u8; TILE_RGBA_SIZE];

        // a tile with some luma signal, then an empty one
        let tile = Tile {
            y_data: &[0b1000_1000],
            ..empty_tile()
        };
        decoder.decode(&tile, &[Quant::default()], &mut first).unwrap();
        decoder.decode(&empty_tile(), &[Quant::default()], &mut second).unwrap();

        // the second tile must not inherit coefficients from the first
        assert!(second.chunks_exact(4).all(|px| (126..=130).contains(&px[0])));
    }
}
