//! Frames submitted to a session.

use gifstream_common::error::{GifstreamError, GifstreamResult};

/// One RGBA8 frame.
///
/// `index` is passed to the engine as-is; it is not checked against
/// previously submitted frames here.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame number, starting at 0.
    pub index: u32,
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
    /// Presentation time in seconds.
    pub timestamp: f64,
}

impl Frame {
    pub fn new(index: u32, width: u32, height: u32, pixels: Vec<u8>, timestamp: f64) -> Self {
        Self {
            index,
            width,
            height,
            pixels,
            timestamp,
        }
    }

    /// A frame filled with a single RGBA colour.
    pub fn solid(index: u32, width: u32, height: u32, rgba: [u8; 4], timestamp: f64) -> Self {
        let pixels = rgba.repeat(width as usize * height as usize);
        Self::new(index, width, height, pixels, timestamp)
    }

    /// Byte length the pixel buffer must have.
    pub fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(4)
    }

    /// Fail fast on a buffer that does not match the dimensions.
    pub fn validate(&self) -> GifstreamResult<()> {
        let expected = self.expected_len().unwrap_or(usize::MAX);
        if self.pixels.len() != expected {
            return Err(GifstreamError::FrameSize {
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_frame_has_expected_len() {
        let frame = Frame::solid(0, 3, 2, [1, 2, 3, 4], 0.0);
        assert_eq!(frame.pixels.len(), 24);
        assert!(frame.validate().is_ok());
        assert_eq!(&frame.pixels[4..8], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_mismatched_buffer_is_rejected() {
        let frame = Frame::new(0, 2, 2, vec![0; 15], 0.0);
        match frame.validate() {
            Err(GifstreamError::FrameSize { expected, actual }) => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 15);
            }
            other => panic!("expected FrameSize error, got {other:?}"),
        }
    }

    #[test]
    fn test_overflowing_dimensions_are_rejected() {
        let frame = Frame::new(0, u32::MAX, u32::MAX, vec![0; 4], 0.0);
        assert!(frame.validate().is_err());
    }
}
