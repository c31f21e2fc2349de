//! Sub-band dequantization: each coefficient is shifted left by its
//! sub-band's quantization value minus one; values of zero or one leave
//! the band untouched.

use opalrdp_pdu::rfx::Quant;

/// Fixed sub-band layout of the 4096-sample tile buffer, as
/// `(offset, size)` pairs in the order HL1, LH1, HH1, HL2, LH2, HH2,
/// HL3, LH3, HH3, LL3.
pub const SUBBAND_LAYOUT: [(usize, usize); 10] = [
    (0, 1024),
    (1024, 1024),
    (2048, 1024),
    (3072, 256),
    (3328, 256),
    (3584, 256),
    (3840, 64),
    (3904, 64),
    (3968, 64),
    (4032, 64),
];

/// Quantization values in sub-band layout order.
fn layout_values(quant: &Quant) -> [u8; 10] {
    [
        quant.hl1, quant.lh1, quant.hh1, quant.hl2, quant.lh2, quant.hh2, quant.hl3, quant.lh3, quant.hh3, quant.ll3,
    ]
}

pub fn decode(buffer: &mut [i16], quant: &Quant) {
    debug_assert!(buffer.len() >= 4096);

    for ((offset, size), value) in SUBBAND_LAYOUT.into_iter().zip(layout_values(quant)) {
        decode_subband(&mut buffer[offset..offset + size], value);
    }
}

fn decode_subband(buffer: &mut [i16], quant: u8) {
    if quant <= 1 {
        return;
    }

    let shift = u32::from(quant - 1);
    for value in buffer {
        *value = value.wrapping_shl(shift);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_covers_the_whole_buffer() {
        let mut end = 0;
        for (offset, size) in SUBBAND_LAYOUT {
            assert_eq!(offset, end);
            end = offset + size;
        }
        assert_eq!(end, 4096);
    }

    #[test]
    fn quant_of_zero_or_one_is_the_identity() {
        let quant = Quant {
            ll3: 1,
            lh3: 0,
            hl3: 1,
            hh3: 1,
            lh2: 0,
            hl2: 1,
            hh2: 1,
            lh1: 1,
            hl1: 0,
            hh1: 1,
        };

        let mut buffer: Vec<i16> = (0..4096).map(|i| (i % 251) as i16 - 125).collect();
        let expected = buffer.clone();

        decode(&mut buffer, &quant);

        assert_eq!(buffer, expected);
    }

    #[test]
    fn hl1_with_quant_six_shifts_by_five() {
        let mut buffer = vec![0i16; 4096];
        buffer[0] = 1; // first HL1 sample

        let quant = Quant {
            hl1: 6,
            ..Default::default()
        };
        // neutralize every other band
        let quant = Quant {
            ll3: 1,
            lh3: 1,
            hl3: 1,
            hh3: 1,
            lh2: 1,
            hl2: 1,
            hh2: 1,
            lh1: 1,
            hh1: 1,
            ..quant
        };

        decode(&mut buffer, &quant);

        assert_eq!(buffer[0], 32);
    }

    #[test]
    fn hl2_with_quant_seven_shifts_by_six() {
        let mut buffer = vec![0i16; 4096];
        buffer[3072] = 1; // first HL2 sample

        let quant = Quant {
            ll3: 1,
            lh3: 1,
            hl3: 1,
            hh3: 1,
            lh2: 1,
            hl2: 7,
            hh2: 1,
            lh1: 1,
            hl1: 1,
            hh1: 1,
        };

        decode(&mut buffer, &quant);

        assert_eq!(buffer[3072], 64);
    }
}
