//! Raw-to-canonical frame conversion.
//!
//! Sensors and video digitizers deliver frames in their own orientation,
//! often with overscan columns or rows around the active area. The canonical
//! frame is obtained by trimming a centred window from the raw frame and then
//! rotating and reflecting it.
//!
//! # Coordinate model
//!
//! Rotation is clockwise. Reflections are applied after rotation, in output
//! coordinates: `reflect_horizontal` mirrors left/right, `reflect_vertical`
//! mirrors top/bottom.
//!
//! ```text
//!   raw (trimmed)         rotation 90            rotation 270
//!   a b c                 d a                    c f
//!   d e f                 e b                    b e
//!                         f c                    a d
//! ```
//!
//! Quarter turns are processed in 8×8 output tiles so that both the source
//! reads and the destination writes stay within a few cache lines at
//! multi-megapixel frame sizes.

use crate::error::NormalizeError;
use crate::frame::{Frame, FrameDims, FrameView, FrameViewMut};
use serde::{Deserialize, Serialize};

/// Edge length of the square tiles used for quarter-turn rotation.
const TILE: u32 = 8;

/// Orientation correction applied to every frame of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameTransform {
    /// Clockwise rotation: 0, 90, 180 or 270.
    pub rotation_degrees: u16,
    pub reflect_vertical: bool,
    pub reflect_horizontal: bool,
}

impl FrameTransform {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn rotation(degrees: u16) -> Self {
        Self {
            rotation_degrees: degrees,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), NormalizeError> {
        match self.rotation_degrees {
            0 | 90 | 180 | 270 => Ok(()),
            other => Err(NormalizeError::UnsupportedRotation(other)),
        }
    }

    /// Whether the transform exchanges width and height.
    pub fn is_quarter_turn(&self) -> bool {
        matches!(self.rotation_degrees, 90 | 270)
    }

    /// Canonical dimensions of an untrimmed frame of `raw` dimensions.
    pub fn output_dims(&self, raw: FrameDims) -> FrameDims {
        if self.is_quarter_turn() {
            raw.transposed()
        } else {
            raw
        }
    }
}

/// Per-device normalizer: a fixed transform plus optional canonical size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameNormalizer {
    transform: FrameTransform,
    canonical_dims: Option<FrameDims>,
}

impl FrameNormalizer {
    pub fn new(transform: FrameTransform, canonical_dims: Option<FrameDims>) -> Self {
        Self {
            transform,
            canonical_dims,
        }
    }

    pub fn transform(&self) -> &FrameTransform {
        &self.transform
    }

    /// Canonical dimensions for a raw frame; without a configured size the
    /// whole raw frame is kept.
    pub fn canonical_dims_for(&self, raw: FrameDims) -> FrameDims {
        self.canonical_dims
            .unwrap_or_else(|| self.transform.output_dims(raw))
    }

    pub fn normalize(&self, raw: &Frame) -> Result<Frame, NormalizeError> {
        normalize(raw, self.canonical_dims_for(raw.dims()), &self.transform)
    }
}

/// Trim, rotate and reflect `raw` into a frame of exactly `canonical` size.
///
/// # Errors
///
/// `RawTooSmall` if the raw frame cannot contain the canonical frame;
/// `BufferSizeMismatch` if the raw buffer does not match its dimensions.
pub fn normalize(
    raw: &Frame,
    canonical: FrameDims,
    transform: &FrameTransform,
) -> Result<Frame, NormalizeError> {
    transform.validate()?;
    let pixel_bytes = raw.check()?;

    // Canonical size expressed in raw orientation.
    let needed = transform.output_dims(canonical);
    if raw.width < needed.width || raw.height < needed.height {
        return Err(NormalizeError::RawTooSmall {
            raw_width: raw.width,
            raw_height: raw.height,
            canonical_width: canonical.width,
            canonical_height: canonical.height,
            rotation: transform.rotation_degrees,
        });
    }

    let column_offset = (raw.width - needed.width) / 2;
    let row_offset = (raw.height - needed.height) / 2;
    let full = FrameView::new(&raw.data, raw.dims(), pixel_bytes)?;
    let src = full
        .sub_view(column_offset, row_offset, needed)
        .ok_or(NormalizeError::BufferSizeMismatch {
            expected: raw.dims().pixel_count() * pixel_bytes,
            actual: raw.data.len(),
        })?;

    let mut out = Frame::zeroed(canonical, raw.bit_depth)?;
    {
        let mut dst = FrameViewMut::new(&mut out.data, canonical, pixel_bytes)?;
        if transform.is_quarter_turn() {
            quarter_turn(&src, &mut dst, transform);
        } else {
            half_turn(&src, &mut dst, transform);
        }
    }
    Ok(out)
}

/// Rotation 0 or 180: whole rows move together.
fn half_turn(src: &FrameView<'_>, dst: &mut FrameViewMut<'_>, transform: &FrameTransform) {
    let rot180 = transform.rotation_degrees == 180;
    let flip_x = rot180 ^ transform.reflect_horizontal;
    let flip_y = rot180 ^ transform.reflect_vertical;
    let dims = dst.dims();
    let pixel_bytes = dst.pixel_bytes();

    for y in 0..dims.height {
        let sy = if flip_y { dims.height - 1 - y } else { y };
        let src_row = src.row(sy);
        let dst_row = dst.row_mut(y);
        if flip_x {
            for (d, s) in dst_row
                .chunks_exact_mut(pixel_bytes)
                .zip(src_row.chunks_exact(pixel_bytes).rev())
            {
                d.copy_from_slice(s);
            }
        } else {
            dst_row.copy_from_slice(src_row);
        }
    }
}

/// Rotation 90 or 270, tiled over the output.
fn quarter_turn(src: &FrameView<'_>, dst: &mut FrameViewMut<'_>, transform: &FrameTransform) {
    let out = dst.dims();
    let in_dims = src.dims();
    let clockwise = transform.rotation_degrees == 90;

    for tile_y in (0..out.height).step_by(TILE as usize) {
        let y_end = (tile_y + TILE).min(out.height);
        for tile_x in (0..out.width).step_by(TILE as usize) {
            let x_end = (tile_x + TILE).min(out.width);
            for y in tile_y..y_end {
                let ry = if transform.reflect_vertical { out.height - 1 - y } else { y };
                for x in tile_x..x_end {
                    let rx = if transform.reflect_horizontal { out.width - 1 - x } else { x };
                    let (sx, sy) = if clockwise {
                        (ry, in_dims.height - 1 - rx)
                    } else {
                        (in_dims.width - 1 - ry, rx)
                    };
                    dst.pixel_mut(x, y).copy_from_slice(src.pixel(sx, sy));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(width: u32, height: u32) -> Frame {
        let pixels: Vec<u16> = (0..width * height).map(|v| v as u16).collect();
        Frame::from_u16(width, height, &pixels)
    }

    fn rows(frame: &Frame) -> Vec<Vec<u32>> {
        (0..frame.height)
            .map(|y| (0..frame.width).map(|x| frame.get(x, y).unwrap()).collect())
            .collect()
    }

    #[test]
    fn test_identity_copies_frame() {
        let raw = numbered(5, 3);
        let out = normalize(&raw, raw.dims(), &FrameTransform::identity()).unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_rotation_90_is_clockwise() {
        // a b c     d a
        // d e f  -> e b
        //           f c
        let raw = numbered(3, 2);
        let out = normalize(&raw, FrameDims::new(2, 3), &FrameTransform::rotation(90)).unwrap();
        assert_eq!(rows(&out), vec![vec![3, 0], vec![4, 1], vec![5, 2]]);
    }

    #[test]
    fn test_rotation_270_and_180() {
        let raw = numbered(3, 2);
        let out = normalize(&raw, FrameDims::new(2, 3), &FrameTransform::rotation(270)).unwrap();
        assert_eq!(rows(&out), vec![vec![2, 5], vec![1, 4], vec![0, 3]]);

        let out = normalize(&raw, raw.dims(), &FrameTransform::rotation(180)).unwrap();
        assert_eq!(rows(&out), vec![vec![5, 4, 3], vec![2, 1, 0]]);
    }

    #[test]
    fn test_reflections() {
        let raw = numbered(3, 2);
        let vertical = FrameTransform {
            reflect_vertical: true,
            ..FrameTransform::default()
        };
        let out = normalize(&raw, raw.dims(), &vertical).unwrap();
        assert_eq!(rows(&out), vec![vec![3, 4, 5], vec![0, 1, 2]]);

        let horizontal = FrameTransform {
            reflect_horizontal: true,
            ..FrameTransform::default()
        };
        let out = normalize(&raw, raw.dims(), &horizontal).unwrap();
        assert_eq!(rows(&out), vec![vec![2, 1, 0], vec![5, 4, 3]]);

        // 180 undone by reflecting both axes.
        let both = FrameTransform {
            rotation_degrees: 180,
            reflect_vertical: true,
            reflect_horizontal: true,
        };
        assert_eq!(normalize(&raw, raw.dims(), &both).unwrap(), raw);
    }

    #[test]
    fn test_quarter_turn_with_reflection_matches_transpose() {
        // Rotating 90 then mirroring left/right is a transpose.
        let raw = numbered(11, 9);
        let transform = FrameTransform {
            rotation_degrees: 90,
            reflect_horizontal: true,
            reflect_vertical: false,
        };
        let out = normalize(&raw, FrameDims::new(9, 11), &transform).unwrap();
        for y in 0..11 {
            for x in 0..9 {
                assert_eq!(out.get(x, y), raw.get(y, x));
            }
        }
    }

    #[test]
    fn test_four_quarter_turns_are_identity() {
        for (size, bit_depth) in [(1u32, 8u32), (7, 16), (8, 16), (17, 32), (33, 8)] {
            let bytes = size as usize * size as usize * crate::frame::bytes_per_pixel(bit_depth).unwrap();
            let data: Vec<u8> = (0..bytes).map(|i| (i * 31 % 251) as u8).collect();
            let original = Frame::from_bytes(size, size, bit_depth, data);

            let normalizer = FrameNormalizer::new(FrameTransform::rotation(90), None);
            let mut frame = original.clone();
            for _ in 0..4 {
                frame = normalizer.normalize(&frame).unwrap();
            }
            assert_eq!(frame, original, "size={size} bit_depth={bit_depth}");
        }
    }

    #[test]
    fn test_centered_trim() {
        // 6x4 raw, 2x2 canonical: offsets (2, 1).
        let raw = numbered(6, 4);
        let out = normalize(&raw, FrameDims::new(2, 2), &FrameTransform::identity()).unwrap();
        assert_eq!(rows(&out), vec![vec![8, 9], vec![14, 15]]);

        // Same raw, rotated: needs 2 wide x 3 high of raw, offsets (2, 0).
        let out = normalize(&raw, FrameDims::new(3, 2), &FrameTransform::rotation(90)).unwrap();
        assert_eq!(out.dims(), FrameDims::new(3, 2));
        assert_eq!(rows(&out), vec![vec![14, 8, 2], vec![15, 9, 3]]);
    }

    #[test]
    fn test_raw_too_small_is_rejected() {
        let raw = numbered(4, 4);
        let err = normalize(&raw, FrameDims::new(5, 2), &FrameTransform::identity()).unwrap_err();
        assert!(matches!(err, NormalizeError::RawTooSmall { .. }));

        // Fits unrotated, not after a quarter turn.
        let raw = numbered(6, 2);
        let err = normalize(&raw, FrameDims::new(6, 2), &FrameTransform::rotation(270)).unwrap_err();
        assert!(matches!(err, NormalizeError::RawTooSmall { rotation: 270, .. }));
    }

    #[test]
    fn test_bad_inputs() {
        let raw = Frame::from_bytes(4, 4, 16, vec![0; 10]);
        assert!(matches!(
            normalize(&raw, FrameDims::new(4, 4), &FrameTransform::identity()),
            Err(NormalizeError::BufferSizeMismatch { .. })
        ));
        let raw = numbered(4, 4);
        assert_eq!(
            normalize(&raw, FrameDims::new(4, 4), &FrameTransform::rotation(45)),
            Err(NormalizeError::UnsupportedRotation(45))
        );
    }
}
