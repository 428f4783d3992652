//! Test pattern generation for emulated camera frames.
//!
//! Each frame carries its absolute frame number in the first row so tests can
//! tell which buffer slot a frame really came from:
//!
//! ```text
//! row 0: [ n & 0xFF, (n >> 8) & 0xFF, (n >> 16) & 0xFF, (n >> 24) & 0xFF, gradient... ]
//! rows 1..: diagonal gradient shifted by n
//! ```
//!
//! The gradient makes orientation errors visible: rotating or mirroring the
//! frame moves the marker away from the top-left corner.

use acq_core::{Frame, FrameDims, NormalizeError};

/// Number of marker pixels holding the frame number.
pub const MARKER_PIXELS: u32 = 4;

fn max_value(bit_depth: u32) -> u64 {
    if bit_depth >= 32 {
        u64::from(u32::MAX)
    } else {
        (1u64 << bit_depth) - 1
    }
}

/// Generate a frame of `dims` and `bit_depth` for absolute frame `frame_number`.
pub fn generate_test_pattern(
    dims: FrameDims,
    bit_depth: u32,
    frame_number: u64,
) -> Result<Frame, NormalizeError> {
    let mut frame = Frame::zeroed(dims, bit_depth)?;
    let max = max_value(bit_depth);
    let pixel_bytes = frame.pixel_bytes()?;
    let width = dims.width as u64;

    for (index, pixel) in frame.data.chunks_exact_mut(pixel_bytes).enumerate() {
        let index = index as u64;
        let (x, y) = (index % width, index / width);
        let value = if y == 0 && x < u64::from(MARKER_PIXELS) {
            (frame_number >> (8 * x)) & 0xFF
        } else {
            (x + y + frame_number) % (max + 1)
        };
        pixel.copy_from_slice(&value.to_le_bytes()[..pixel_bytes]);
    }
    Ok(frame)
}

/// Recover the frame number written by [`generate_test_pattern`].
///
/// Only the low 32 bits survive, and only if the marker row is intact.
pub fn decode_frame_number(frame: &Frame) -> Option<u64> {
    if frame.width < MARKER_PIXELS {
        return None;
    }
    (0..MARKER_PIXELS).try_fold(0u64, |acc, x| {
        frame.get(x, 0).map(|v| acc | (u64::from(v) & 0xFF) << (8 * x))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_round_trip() {
        for bit_depth in [8, 12, 16, 32] {
            let frame = generate_test_pattern(FrameDims::new(16, 8), bit_depth, 0x0102_0304).unwrap();
            assert_eq!(frame.check(), Ok(frame.pixel_bytes().unwrap()));
            assert_eq!(decode_frame_number(&frame), Some(0x0102_0304));
        }
    }

    #[test]
    fn test_gradient_within_bit_depth() {
        let frame = generate_test_pattern(FrameDims::new(64, 64), 12, 4000).unwrap();
        for y in 1..64 {
            for x in 0..64 {
                assert!(frame.get(x, y).unwrap() < 4096);
            }
        }
    }

    #[test]
    fn test_narrow_frames_have_no_marker() {
        let frame = generate_test_pattern(FrameDims::new(2, 2), 8, 9).unwrap();
        assert_eq!(decode_frame_number(&frame), None);
    }
}
