//! Frame buffers and 2-D views over them.

use crate::error::NormalizeError;
use serde::{Deserialize, Serialize};

/// Width and height of a frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameDims {
    pub width: u32,
    pub height: u32,
}

impl FrameDims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions with width and height exchanged.
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Bytes used to store one pixel of the given bit depth.
pub fn bytes_per_pixel(bit_depth: u32) -> Result<usize, NormalizeError> {
    match bit_depth {
        1..=8 => Ok(1),
        9..=16 => Ok(2),
        17..=32 => Ok(4),
        other => Err(NormalizeError::UnsupportedBitDepth(other)),
    }
}

/// Image frame with little-endian pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Bits per pixel (e.g., 8, 12, 16)
    pub bit_depth: u32,

    /// Raw pixel data, row-major without padding
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a new frame from 16-bit pixel data.
    pub fn from_u16(width: u32, height: u32, pixels: &[u16]) -> Self {
        let mut data = Vec::with_capacity(pixels.len() * 2);
        for pixel in pixels {
            data.extend_from_slice(&pixel.to_le_bytes());
        }
        Self {
            width,
            height,
            bit_depth: 16,
            data,
        }
    }

    /// Create a new frame from 8-bit pixel data.
    pub fn from_u8(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bit_depth: 8,
            data,
        }
    }

    /// Create a frame from raw bytes with explicit bit depth.
    ///
    /// The buffer length is not checked; see [`Frame::check`].
    pub fn from_bytes(width: u32, height: u32, bit_depth: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bit_depth,
            data,
        }
    }

    /// All-zero frame.
    pub fn zeroed(dims: FrameDims, bit_depth: u32) -> Result<Self, NormalizeError> {
        let len = dims.pixel_count() * bytes_per_pixel(bit_depth)?;
        Ok(Self::from_bytes(dims.width, dims.height, bit_depth, vec![0; len]))
    }

    pub fn dims(&self) -> FrameDims {
        FrameDims::new(self.width, self.height)
    }

    pub fn pixel_bytes(&self) -> Result<usize, NormalizeError> {
        bytes_per_pixel(self.bit_depth)
    }

    /// Verify that the buffer holds exactly `width × height` pixels.
    pub fn check(&self) -> Result<usize, NormalizeError> {
        let pixel_bytes = self.pixel_bytes()?;
        let expected = self.dims().pixel_count() * pixel_bytes;
        if self.data.len() != expected {
            return Err(NormalizeError::BufferSizeMismatch {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(pixel_bytes)
    }

    /// Pixel value at (x, y).
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let pixel_bytes = self.pixel_bytes().ok()?;
        let start = (y as usize * self.width as usize + x as usize) * pixel_bytes;
        let bytes = self.data.get(start..start + pixel_bytes)?;
        Some(match *bytes {
            [a] => u32::from(a),
            [a, b] => u32::from(u16::from_le_bytes([a, b])),
            [a, b, c, d] => u32::from_le_bytes([a, b, c, d]),
            _ => return None,
        })
    }

    /// Read-only 2-D view of the whole frame.
    pub fn view(&self) -> Result<FrameView<'_>, NormalizeError> {
        let pixel_bytes = self.check()?;
        FrameView::new(&self.data, self.dims(), pixel_bytes)
    }

    /// Mutable 2-D view of the whole frame.
    pub fn view_mut(&mut self) -> Result<FrameViewMut<'_>, NormalizeError> {
        let pixel_bytes = self.check()?;
        let dims = self.dims();
        FrameViewMut::new(&mut self.data, dims, pixel_bytes)
    }
}

// =============================================================================
// 2-D Views
// =============================================================================

fn required_len(dims: FrameDims, stride: usize, pixel_bytes: usize) -> usize {
    match dims.height {
        0 => 0,
        h => (h as usize - 1) * stride + dims.width as usize * pixel_bytes,
    }
}

/// Borrowed 2-D window onto pixel bytes.
///
/// `stride` is the distance in bytes between the starts of consecutive rows,
/// which lets a view describe a sub-rectangle of a larger buffer.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    data: &'a [u8],
    dims: FrameDims,
    stride: usize,
    pixel_bytes: usize,
}

impl<'a> FrameView<'a> {
    /// Tightly packed view over `data`.
    pub fn new(data: &'a [u8], dims: FrameDims, pixel_bytes: usize) -> Result<Self, NormalizeError> {
        Self::with_stride(data, dims, dims.width as usize * pixel_bytes, pixel_bytes)
    }

    pub fn with_stride(
        data: &'a [u8],
        dims: FrameDims,
        stride: usize,
        pixel_bytes: usize,
    ) -> Result<Self, NormalizeError> {
        let expected = required_len(dims, stride, pixel_bytes);
        if data.len() < expected {
            return Err(NormalizeError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            dims,
            stride,
            pixel_bytes,
        })
    }

    pub fn dims(&self) -> FrameDims {
        self.dims
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn pixel_bytes(&self) -> usize {
        self.pixel_bytes
    }

    /// Sub-rectangle at (x, y). Returns `None` if it does not fit.
    pub fn sub_view(&self, x: u32, y: u32, dims: FrameDims) -> Option<FrameView<'a>> {
        if u64::from(x) + u64::from(dims.width) > u64::from(self.dims.width)
            || u64::from(y) + u64::from(dims.height) > u64::from(self.dims.height)
        {
            return None;
        }
        let offset = y as usize * self.stride + x as usize * self.pixel_bytes;
        let data = self.data.get(offset..)?;
        FrameView::with_stride(data, dims, self.stride, self.pixel_bytes).ok()
    }

    /// Pixel bytes of row `y`.
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.dims.width as usize * self.pixel_bytes]
    }

    /// Bytes of pixel (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride + x as usize * self.pixel_bytes;
        &self.data[start..start + self.pixel_bytes]
    }
}

/// Mutable counterpart of [`FrameView`].
#[derive(Debug)]
pub struct FrameViewMut<'a> {
    data: &'a mut [u8],
    dims: FrameDims,
    stride: usize,
    pixel_bytes: usize,
}

impl<'a> FrameViewMut<'a> {
    pub fn new(
        data: &'a mut [u8],
        dims: FrameDims,
        pixel_bytes: usize,
    ) -> Result<Self, NormalizeError> {
        let stride = dims.width as usize * pixel_bytes;
        let expected = required_len(dims, stride, pixel_bytes);
        if data.len() < expected {
            return Err(NormalizeError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            dims,
            stride,
            pixel_bytes,
        })
    }

    pub fn dims(&self) -> FrameDims {
        self.dims
    }

    pub fn pixel_bytes(&self) -> usize {
        self.pixel_bytes
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        &mut self.data[start..start + self.dims.width as usize * self.pixel_bytes]
    }

    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride + x as usize * self.pixel_bytes;
        &mut self.data[start..start + self.pixel_bytes]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_u16_is_little_endian() {
        let frame = Frame::from_u16(2, 1, &[0x0102, 0xA0B0]);
        assert_eq!(frame.data, vec![0x02, 0x01, 0xB0, 0xA0]);
        assert_eq!(frame.get(1, 0), Some(0xA0B0));
        assert_eq!(frame.get(2, 0), None);
    }

    #[test]
    fn test_check_rejects_short_buffer() {
        let frame = Frame::from_bytes(4, 4, 16, vec![0; 30]);
        assert_eq!(
            frame.check(),
            Err(NormalizeError::BufferSizeMismatch {
                expected: 32,
                actual: 30
            })
        );
        let odd = Frame::from_bytes(1, 1, 40, vec![0; 8]);
        assert_eq!(odd.check(), Err(NormalizeError::UnsupportedBitDepth(40)));
    }

    #[test]
    fn test_sub_view_rows() {
        let pixels: Vec<u8> = (0..20).collect();
        let frame = Frame::from_u8(5, 4, pixels);
        let view = frame.view().unwrap();
        let sub = view.sub_view(1, 2, FrameDims::new(3, 2)).unwrap();
        assert_eq!(sub.row(0), &[11, 12, 13]);
        assert_eq!(sub.row(1), &[16, 17, 18]);
        assert_eq!(sub.pixel(2, 1), &[18]);
        assert!(view.sub_view(3, 0, FrameDims::new(3, 1)).is_none());
    }

    #[test]
    fn test_view_mut_writes_pixels() {
        let mut frame = Frame::zeroed(FrameDims::new(2, 2), 32).unwrap();
        {
            let mut view = frame.view_mut().unwrap();
            view.pixel_mut(1, 1).copy_from_slice(&7u32.to_le_bytes());
            view.row_mut(0)[0] = 9;
        }
        assert_eq!(frame.get(1, 1), Some(7));
        assert_eq!(frame.get(0, 0), Some(9));
    }
}
