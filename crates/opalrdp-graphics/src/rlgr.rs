//! Adaptive Run-Length / Golomb-Rice entropy decoding (MS-RDPRFX
//! RLGR1 and RLGR3).
//!
//! Four adaptive parameters steer the decoder: `kp` (scaled run-length
//! parameter, `k = kp >> 3`) and `krp` (scaled magnitude parameter,
//! `kr = krp >> 3`). While `k > 0` the decoder is in run mode; at
//! `k == 0` it decodes bare Golomb-Rice codes, singly (RLGR1) or as
//! value pairs (RLGR3).

use core::cmp::min;

use opalrdp_pdu::rfx::EntropyAlgorithm;
use thiserror::Error;

use crate::bitstream::BitStream;

const KP_MAX: u32 = 80;
const LS_GR: u32 = 3;
const UP_GR: u32 = 4;
const DN_GR: u32 = 6;
const UQ_GR: u32 = 3;
const DQ_GR: u32 = 3;

#[derive(Debug, Error)]
pub enum RlgrError {
    #[error("entropy payload ended before the first coefficient was decoded")]
    TruncatedStream,
    #[error("corrupted Golomb-Rice code")]
    CorruptedCode,
}

/// Decodes an entropy payload into `output`, zero-filling whatever the
/// stream does not cover.
///
/// Running dry mid-symbol after at least one coefficient is a clean
/// stop; running dry before the first one is an error.
pub fn decode(mode: EntropyAlgorithm, data: &[u8], output: &mut [i16]) -> Result<(), RlgrError> {
    output.fill(0);

    let mut bits = BitStream::new(data);

    let mut kp: u32 = 8;
    let mut k: u32 = kp >> LS_GR;
    let mut krp: u32 = 8;
    let mut kr: u32 = krp >> LS_GR;

    let mut pos = 0;
    let mut truncated = false;

    while pos < output.len() && !bits.is_exhausted() {
        if k > 0 {
            // Run mode: a unary-coded run of zeros followed by one
            // sign-and-magnitude coded value.
            let (zero_count, terminated) = bits.count_leading_zeros();

            let mut run: usize = 0;
            for _ in 0..zero_count {
                run += 1usize << k;
                kp = min(kp + UP_GR, KP_MAX);
                k = kp >> LS_GR;
            }

            if !terminated {
                truncated = true;
                break;
            }

            run += bits.read_bits(k as usize) as usize;

            pos = min(pos + run, output.len());
            if pos >= output.len() {
                break;
            }

            if bits.is_exhausted() {
                truncated = true;
                break;
            }

            let sign = bits.read_bit();

            let (ones, terminated) = bits.count_leading_ones();
            if !terminated {
                truncated = true;
                break;
            }

            if bits.remaining_bits() < kr as usize {
                truncated = true;
                break;
            }
            let low = bits.read_bits(kr as usize);
            let code = ((ones as u32) << kr) | low;

            update_magnitude_parameter(ones, &mut kr, &mut krp);
            kp = kp.saturating_sub(DN_GR);
            k = kp >> LS_GR;

            // magnitudes are offset by one; zero is impossible here
            output[pos] = if sign != 0 {
                (-((code + 1) as i32)) as i16
            } else {
                (code + 1) as i16
            };
            pos += 1;
        } else {
            // Golomb-Rice mode, no runs.
            let (ones, terminated) = bits.count_leading_ones();
            if !terminated {
                truncated = true;
                break;
            }

            if bits.remaining_bits() < kr as usize {
                truncated = true;
                break;
            }
            let low = bits.read_bits(kr as usize);
            let code = ((ones as u32) << kr) | low;

            update_magnitude_parameter(ones, &mut kr, &mut krp);

            match mode {
                EntropyAlgorithm::Rlgr1 => {
                    if code == 0 {
                        kp = min(kp + UQ_GR, KP_MAX);
                    } else {
                        kp = kp.saturating_sub(DQ_GR);
                    }
                    k = kp >> LS_GR;

                    output[pos] = unfold_magnitude(code);
                    pos += 1;
                }
                EntropyAlgorithm::Rlgr3 => {
                    let width = (32 - code.leading_zeros()) as usize;

                    if bits.remaining_bits() < width {
                        truncated = true;
                        break;
                    }
                    let val1 = bits.read_bits(width);
                    let val2 = code.checked_sub(val1).ok_or(RlgrError::CorruptedCode)?;

                    if val1 != 0 && val2 != 0 {
                        kp = kp.saturating_sub(2 * DQ_GR);
                    } else if val1 == 0 && val2 == 0 {
                        kp = min(kp + 2 * UQ_GR, KP_MAX);
                    }
                    k = kp >> LS_GR;

                    output[pos] = unfold_magnitude(val1);
                    pos += 1;

                    if pos < output.len() {
                        output[pos] = unfold_magnitude(val2);
                        pos += 1;
                    }
                }
            }
        }
    }

    if truncated && pos == 0 {
        return Err(RlgrError::TruncatedStream);
    }

    Ok(())
}

/// Sign-interleaved magnitude: odd codes are negative.
fn unfold_magnitude(code: u32) -> i16 {
    if code & 1 != 0 {
        (-(((code + 1) >> 1) as i32)) as i16
    } else {
        (code >> 1) as i16
    }
}

fn update_magnitude_parameter(ones: usize, kr: &mut u32, krp: &mut u32) {
    if ones == 0 {
        *krp = krp.saturating_sub(2);
        *kr = *krp >> LS_GR;
    } else if ones > 1 {
        *krp = min(*krp + ones as u32, KP_MAX);
        *kr = *krp >> LS_GR;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(mode: EntropyAlgorithm, data: &[u8]) -> Vec<i16> {
        let mut output = vec![0i16; 4096];
        decode(mode, data, &mut output).unwrap();
        output
    }

    #[test]
    fn empty_payload_yields_an_all_zero_buffer() {
        let output = run(EntropyAlgorithm::Rlgr1, &[]);
        assert_eq!(output.len(), 4096);
        assert!(output.iter().all(|&v| v == 0));
    }

    #[test]
    fn rlgr1_single_positive_value() {
        // run terminator, empty run remainder, sign +, GR code 1 -> +2
        let output = run(EntropyAlgorithm::Rlgr1, &[0b1000_1000]);

        assert_eq!(output[0], 2);
        assert!(output[1..].iter().all(|&v| v == 0));
    }

    #[test]
    fn rlgr1_single_negative_value() {
        // same as above with the sign bit set -> -2
        let output = run(EntropyAlgorithm::Rlgr1, &[0b1010_1000]);

        assert_eq!(output[0], -2);
        assert!(output[1..].iter().all(|&v| v == 0));
    }

    #[test]
    fn rlgr1_run_of_zeros_before_the_value() {
        // one unary run step (1 << k = 2), remainder 1 -> run of 3, then +1
        let output = run(EntropyAlgorithm::Rlgr1, &[0b0110_0000]);

        assert_eq!(&output[..5], &[0, 0, 0, 1, 0]);
        assert!(output[4..].iter().all(|&v| v == 0));
    }

    #[test]
    fn rlgr3_emits_value_pairs() {
        // run-mode symbol (+2) drops k to zero, then a paired GR code:
        // code 1, val1 = 1, val2 = 0 -> -1, 0
        let output = run(EntropyAlgorithm::Rlgr3, &[0b1000_1101]);

        assert_eq!(&output[..3], &[2, -1, 0]);
        assert!(output[3..].iter().all(|&v| v == 0));
    }

    #[test]
    fn truncated_before_any_output_is_an_error() {
        // an endless unary run with no terminator
        let mut output = vec![0i16; 4096];
        let err = decode(EntropyAlgorithm::Rlgr1, &[0x00], &mut output).unwrap_err();
        assert!(matches!(err, RlgrError::TruncatedStream));
    }

    #[test]
    fn truncation_after_output_keeps_the_remainder_zero() {
        // a complete value, then a dangling unary prefix
        let mut output = vec![0i16; 4096];
        decode(EntropyAlgorithm::Rlgr1, &[0b1000_1000, 0x00], &mut output).unwrap();

        assert_eq!(output[0], 2);
        assert!(output[1..].iter().all(|&v| v == 0));
    }

    #[test]
    fn output_never_exceeds_the_buffer() {
        // pathological all-ones payload decodes to many small values
        let data = vec![0xFF; 64];
        let mut output = vec![0i16; 4096];
        decode(EntropyAlgorithm::Rlgr3, &data, &mut output).unwrap();
        assert_eq!(output.len(), 4096);
    }
}
