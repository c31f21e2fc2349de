//! RemoteFX frame assembly.
//!
//! [`DecodingContext`] survives the whole session: it walks the block
//! stream arriving on the graphics channel, carries the display size and
//! announced entropy algorithm across frames, decodes tiles through
//! [`opalrdp_graphics::TileDecoder`] and hands each one to the
//! compositor. A tile that fails to decode is logged and skipped; its
//! siblings still compose into the frame.

use opalrdp_core::{decode_cursor, ReadCursor};
use opalrdp_graphics::{TileDecoder, TILE_RGBA_SIZE};
use opalrdp_pdu::rfx::{self, Block, EntropyAlgorithm, Quant, RfxRectangle};

use crate::{Compositor, SessionErrorExt as _, SessionResult};

pub type FrameId = u32;

#[derive(Debug)]
struct FrameInProgress {
    index: FrameId,
    rectangles: Vec<RfxRectangle>,
    decoded_tiles: usize,
}

/// Session-lifetime RemoteFX state.
pub struct DecodingContext {
    display_width: u16,
    display_height: u16,
    /// Entropy algorithm announced by the context block. The tile coder
    /// itself is fixed per component (RLGR1 luma, RLGR3 chroma); the
    /// announcement is kept for diagnostics.
    announced_entropy: Option<EntropyAlgorithm>,
    tile_decoder: TileDecoder,
    tile_output: Vec<u8>,
    frame: Option<FrameInProgress>,
}

impl Default for DecodingContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodingContext {
    pub fn new() -> Self {
        Self {
            display_width: 0,
            display_height: 0,
            announced_entropy: None,
            tile_decoder: TileDecoder::new(),
            tile_output: vec![0; TILE_RGBA_SIZE],
            frame: None,
        }
    }

    pub fn display_size(&self) -> (u16, u16) {
        (self.display_width, self.display_height)
    }

    /// Processes one graphics-channel payload, which may carry any number
    /// of blocks. Returns the indices of the frames completed by it.
    pub fn process(&mut self, input: &[u8], compositor: &mut dyn Compositor) -> SessionResult<Vec<FrameId>> {
        let mut cursor = ReadCursor::new(input);
        let mut completed = Vec::new();

        while !cursor.is_empty() {
            let block: Block<'_> = decode_cursor(&mut cursor).map_err(crate::SessionError::decode)?;

            match block {
                Block::Sync(_) => {
                    trace!("RFX sync");
                }
                Block::CodecVersions(versions) => {
                    trace!(codec_count = versions.codec_count, "RFX codec versions");
                }
                Block::Channels(channels) => {
                    if let Some(channel) = channels.0.first() {
                        self.display_width = channel.width.unsigned_abs();
                        self.display_height = channel.height.unsigned_abs();
                        debug!(
                            width = self.display_width,
                            height = self.display_height,
                            "RFX display size"
                        );
                    }
                }
                Block::Context(context) => {
                    debug!(?context, "RFX context");
                    self.announced_entropy = Some(context.entropy_algorithm);
                }
                Block::FrameBegin(frame_begin) => {
                    if self.frame.is_some() {
                        warn!("FRAME_BEGIN while a frame is already open; dropping the open frame");
                    }
                    self.frame = Some(FrameInProgress {
                        index: frame_begin.index,
                        rectangles: Vec::new(),
                        decoded_tiles: 0,
                    });
                }
                Block::Region(region) => match &mut self.frame {
                    Some(frame) => frame.rectangles = region.rectangles,
                    None => warn!("REGION outside of a frame"),
                },
                Block::TileSet(tile_set) => {
                    if tile_set.dropped_tiles > 0 {
                        warn!(dropped = tile_set.dropped_tiles, "Dropped malformed tiles");
                    }
                    self.process_tile_set(&tile_set.quants, &tile_set.tiles, compositor);
                }
                Block::Tile(tile) => {
                    // a bare tile outside a tile set has no quantization
                    // tables to refer to
                    warn!(x = tile.x, y = tile.y, "CBT_TILE outside of a tile set; skipped");
                }
                Block::FrameEnd(_) => match self.frame.take() {
                    Some(frame) => {
                        debug!(
                            frame_index = frame.index,
                            tiles = frame.decoded_tiles,
                            "Frame complete"
                        );
                        compositor.frame_complete(frame.index, &frame.rectangles);
                        completed.push(frame.index);
                    }
                    None => warn!("FRAME_END outside of a frame"),
                },
                Block::Skipped(block_type) => {
                    trace!(block_type, "Skipped RFX block");
                }
            }
        }

        Ok(completed)
    }

    fn process_tile_set(&mut self, quants: &[Quant], tiles: &[rfx::Tile<'_>], compositor: &mut dyn Compositor) {
        for tile in tiles {
            match self.tile_decoder.decode(tile, quants, &mut self.tile_output) {
                Ok((tile_x, tile_y)) => {
                    compositor.apply_tile(tile_x, tile_y, &self.tile_output);
                    if let Some(frame) = &mut self.frame {
                        frame.decoded_tiles += 1;
                    }
                }
                Err(error) => {
                    // the rest of the frame is still usable
                    warn!(x = tile.x, y = tile.y, %error, "Tile failed to decode; skipped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingCompositor {
        tiles: Vec<(u16, u16, Vec<u8>)>,
        frames: Vec<(u32, usize)>,
    }

    impl Compositor for RecordingCompositor {
        fn apply_tile(&mut self, tile_x: u16, tile_y: u16, rgba: &[u8]) {
            self.tiles.push((tile_x, tile_y, rgba.to_vec()));
        }

        fn frame_complete(&mut self, frame_index: u32, dirty_rectangles: &[RfxRectangle]) {
            self.frames.push((frame_index, dirty_rectangles.len()));
        }
    }

    fn block(block_type: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(6 + body.len());
        bytes.extend_from_slice(&block_type.to_le_bytes());
        bytes.extend_from_slice(&((6 + body.len()) as u32).to_le_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    fn channel_block(block_type: u16, channel_id: u8, body: &[u8]) -> Vec<u8> {
        let mut inner = Vec::with_capacity(2 + body.len());
        inner.push(0x01); // codecId
        inner.push(channel_id);
        inner.extend_from_slice(body);
        block(block_type, &inner)
    }

    fn header_stream() -> Vec<u8> {
        let mut stream = Vec::new();
        // SYNC
        stream.extend(block(0xCCC0, &[0xCA, 0xAC, 0xCC, 0xCA, 0x00, 0x01]));
        // CODEC_VERSIONS: one codec
        stream.extend(block(0xCCC1, &[0x01, 0x01, 0x00, 0x01]));
        // CHANNELS: one channel, 1280 x 720
        stream.extend(block(0xCCC2, &[0x01, 0x00, 0x00, 0x05, 0xD0, 0x02]));
        // CONTEXT: ctxId 0, tile size 64, ICT + DWT 5/3 + RLGR3 + scalar
        stream.extend(channel_block(0xCCC3, 0xFF, &[0x00, 0x40, 0x00, 0x28, 0x28]));
        stream
    }

    fn frame_with_one_empty_tile(frame_index: u32) -> Vec<u8> {
        let mut stream = Vec::new();

        // FRAME_BEGIN
        let mut body = frame_index.to_le_bytes().to_vec();
        body.extend_from_slice(&1u16.to_le_bytes());
        stream.extend(channel_block(0xCCC4, 0x00, &body));

        // REGION: one 64x64 rectangle at the origin
        stream.extend(channel_block(
            0xCCC6,
            0x00,
            &[
                0x01, 0x01, 0x00, //
                0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0x40, 0x00, //
                0xC1, 0xCA, 0x01, 0x00,
            ],
        ));

        // TILESET with a single empty tile at grid (2, 1)
        stream.extend(channel_block(
            0xCAC2,
            0x00,
            &[
                0xC2, 0xCA, // subtype
                0x00, 0x00, // idx
                0x51, 0x44, // flags
                0x01, // one quant
                0x40, // tile size
                0x01, 0x00, // one tile
                0x19, 0x00, 0x00, 0x00, // tiles data size
                0x66, 0x66, 0x77, 0x88, 0x98, // quant set
                0xC3, 0xCA, 0x13, 0x00, 0x00, 0x00, // CBT_TILE, blockLen 19
                0x00, 0x00, 0x00, // quant indices
                0x02, 0x00, 0x01, 0x00, // grid (2, 1)
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // empty components
            ],
        ));

        // FRAME_END
        stream.extend(channel_block(0xCCC5, 0x00, &[]));

        stream
    }

    #[test]
    fn headers_establish_the_display_size() {
        let mut context = DecodingContext::new();
        let mut compositor = RecordingCompositor::default();

        context.process(&header_stream(), &mut compositor).unwrap();

        assert_eq!(context.display_size(), (1280, 720));
        assert!(compositor.tiles.is_empty());
    }

    #[test]
    fn a_frame_produces_tiles_and_a_completion() {
        let mut context = DecodingContext::new();
        let mut compositor = RecordingCompositor::default();

        context.process(&header_stream(), &mut compositor).unwrap();
        let completed = context.process(&frame_with_one_empty_tile(7), &mut compositor).unwrap();

        assert_eq!(completed, vec![7]);
        assert_eq!(compositor.frames, vec![(7, 1)]);

        assert_eq!(compositor.tiles.len(), 1);
        let (x, y, rgba) = &compositor.tiles[0];
        assert_eq!((*x, *y), (2, 1));
        assert_eq!(rgba.len(), TILE_RGBA_SIZE);
        // an empty tile is uniform gray
        assert!(rgba.chunks_exact(4).all(|px| px == [128, 128, 128, 255]));
    }

    #[test]
    fn context_survives_across_frames() {
        let mut context = DecodingContext::new();
        let mut compositor = RecordingCompositor::default();

        context.process(&header_stream(), &mut compositor).unwrap();
        context.process(&frame_with_one_empty_tile(1), &mut compositor).unwrap();
        context.process(&frame_with_one_empty_tile(2), &mut compositor).unwrap();

        assert_eq!(compositor.frames.len(), 2);
        assert_eq!(context.display_size(), (1280, 720));
    }

    #[test]
    fn tile_with_bad_quant_index_is_skipped_not_fatal() {
        let mut context = DecodingContext::new();
        let mut compositor = RecordingCompositor::default();

        // tile referencing quant set 9 of 1
        let tile_set = channel_block(
            0xCAC2,
            0x00,
            &[
                0xC2, 0xCA, 0x00, 0x00, 0x51, 0x44, //
                0x01, 0x40, 0x01, 0x00, //
                0x19, 0x00, 0x00, 0x00, //
                0x66, 0x66, 0x77, 0x88, 0x98, //
                0xC3, 0xCA, 0x13, 0x00, 0x00, 0x00, //
                0x09, 0x00, 0x00, // bogus Y quant index
                0x00, 0x00, 0x00, 0x00, //
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            ],
        );

        let mut stream = channel_block(0xCCC4, 0x00, &[0x01, 0x00, 0x00, 0x00, 0x01, 0x00]);
        stream.extend(tile_set);
        stream.extend(channel_block(0xCCC5, 0x00, &[]));

        let completed = context.process(&stream, &mut compositor).unwrap();

        assert_eq!(completed, vec![1]);
        assert!(compositor.tiles.is_empty());
    }

    #[test]
    fn truncated_block_stream_is_an_error() {
        let mut context = DecodingContext::new();
        let mut compositor = RecordingCompositor::default();

        // SYNC block claiming more bytes than the buffer holds
        let stream = [0xC0, 0xCC, 0x20, 0x00, 0x00, 0x00, 0xCA];
        assert!(context.process(&stream, &mut compositor).is_err());
    }
}
