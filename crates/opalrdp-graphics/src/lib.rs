//! RemoteFX tile decoding: entropy decoding, sub-band reconstruction,
//! dequantization, the inverse wavelet transform and color conversion.
//!
//! The per-tile pipeline is driven by [`tile::TileDecoder`], which owns
//! the scratch buffers. Nothing in this crate suspends or logs; errors
//! come back as values and the caller decides what a broken tile means.

pub mod bitstream;
pub mod color;
pub mod dwt;
pub mod quantization;
pub mod rlgr;
pub mod subband;
pub mod tile;

pub use self::rlgr::RlgrError;
pub use self::tile::{TileDecoder, TileDecodeError, TILE_DIMENSION, TILE_RGBA_SIZE, TILE_SAMPLES};
