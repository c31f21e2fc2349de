//! End-to-end checks of the tile decode pipeline: entropy decode through
//! color conversion, driven through `TileDecoder`.

use expect_test::expect;
use opalrdp_graphics::{TileDecoder, TILE_RGBA_SIZE};
use opalrdp_pdu::rfx::{Quant, Tile};
use proptest::prelude::*;
use rstest::rstest;

fn tile_with<'a>(y_data: &'a [u8], cb_data: &'a [u8], cr_data: &'a [u8]) -> Tile<'a> {
    Tile {
        y_quant_index: 0,
        cb_quant_index: 0,
        cr_quant_index: 0,
        x: 0,
        y: 0,
        y_data,
        cb_data,
        cr_data,
    }
}

/// A quantization set that leaves every band untouched.
fn identity_quant() -> Quant {
    Quant {
        ll3: 1,
        lh3: 1,
        hl3: 1,
        hh3: 1,
        lh2: 1,
        hl2: 1,
        hh2: 1,
        lh1: 1,
        hl1: 1,
        hh1: 1,
    }
}

#[test]
fn minimal_tile_decodes_to_uniform_gray() {
    let mut decoder = TileDecoder::new();
    let mut output = vec![0u8; TILE_RGBA_SIZE];

    let position = decoder
        .decode(&tile_with(&[], &[], &[]), &[Quant::default()], &mut output)
        .unwrap();

    assert_eq!(position, (0, 0));
    assert!(output.chunks_exact(4).all(|px| px == [128, 128, 128, 255]));

    expect![["[128, 128, 128, 255]"]].assert_eq(&format!("{:?}", &output[..4]));
}

#[rstest]
#[case::default_set(Quant::default())]
#[case::identity_set(identity_quant())]
fn empty_components_are_gray_for_any_quant(#[case] quant: Quant) {
    let mut decoder = TileDecoder::new();
    let mut output = vec![0u8; TILE_RGBA_SIZE];

    decoder
        .decode(&tile_with(&[], &[], &[]), &[quant], &mut output)
        .unwrap();

    assert!(output.chunks_exact(4).all(|px| px == [128, 128, 128, 255]));
}

#[test]
fn luma_detail_coefficient_reaches_the_pixels() {
    let mut decoder = TileDecoder::new();
    let mut gray = vec![0u8; TILE_RGBA_SIZE];
    let mut detailed = vec![0u8; TILE_RGBA_SIZE];

    decoder
        .decode(&tile_with(&[], &[], &[]), &[Quant::default()], &mut gray)
        .unwrap();

    // a single HL1 coefficient of +2; the default quantization scales it
    // by 1 << 7, well above one gray level in 11.5 fixed point
    decoder
        .decode(&tile_with(&[0b1000_1000], &[], &[]), &[Quant::default()], &mut detailed)
        .unwrap();

    assert_ne!(gray, detailed);
    // the disturbance is local to the top rows; the last row stays gray
    let last_row = &detailed[TILE_RGBA_SIZE - 64 * 4..];
    assert!(last_row.chunks_exact(4).all(|px| px == [128, 128, 128, 255]));
}

proptest! {
    #[test]
    fn arbitrary_payloads_never_panic(
        y_data in proptest::collection::vec(any::<u8>(), 0..512),
        cb_data in proptest::collection::vec(any::<u8>(), 0..512),
        cr_data in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let mut decoder = TileDecoder::new();
        let mut output = vec![0u8; TILE_RGBA_SIZE];

        // success or error, never a panic; alpha stays opaque on success
        if decoder
            .decode(&tile_with(&y_data, &cb_data, &cr_data), &[Quant::default()], &mut output)
            .is_ok()
        {
            prop_assert!(output.chunks_exact(4).all(|px| px[3] == 0xFF));
        }
    }

    #[test]
    fn quant_indices_are_always_bounds_checked(index in 1u8..) {
        let mut decoder = TileDecoder::new();
        let mut output = vec![0u8; TILE_RGBA_SIZE];

        let tile = Tile {
            y_quant_index: index,
            ..tile_with(&[], &[], &[])
        };

        prop_assert!(decoder.decode(&tile, &[Quant::default()], &mut output).is_err());
    }
}
