//! Frames handed from sources to detectors.
//!
//! - `Frame`: an owned RGB image plus its dimensions.
//! - `PixelRect`: an integer crop rectangle in frame coordinates.
//!
//! Cropping always produces a new `Frame`; the source frame is never mutated,
//! so several sub-areas can be cut from the same capture.

use anyhow::{anyhow, Context, Result};
use image::{imageops, RgbImage};

/// Integer pixel rectangle, origin at the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One captured image.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Build a frame from packed RGB8 bytes.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame buffer has {} bytes, expected {} for {}x{} rgb",
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("invalid {}x{} rgb buffer", width, height))?;
        Ok(Self { image })
    }

    /// Decode an encoded image (PNG or JPEG).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decode frame bytes")?;
        Ok(Self {
            image: image.into_rgb8(),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Packed RGB8 pixels, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Copy out the given rectangle, clipped to the frame bounds.
    pub fn crop(&self, rect: PixelRect) -> Frame {
        let x = rect.x.min(self.width());
        let y = rect.y.min(self.height());
        let width = rect.width.min(self.width() - x);
        let height = rect.height.min(self.height() - y);
        let cropped = imageops::crop_imm(&self.image, x, y, width, height).to_image();
        Frame { image: cropped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let image = RgbImage::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 0]));
        Frame::new(image)
    }

    #[test]
    fn from_rgb_checks_length() {
        assert!(Frame::from_rgb(2, 2, vec![0; 12]).is_ok());
        let err = Frame::from_rgb(2, 2, vec![0; 11]).unwrap_err();
        assert!(err.to_string().contains("expected 12"));
    }

    #[test]
    fn crop_copies_the_rectangle() {
        let frame = gradient(10, 8);
        let cropped = frame.crop(PixelRect {
            x: 2,
            y: 3,
            width: 4,
            height: 2,
        });
        assert_eq!(cropped.width(), 4);
        assert_eq!(cropped.height(), 2);
        assert_eq!(cropped.image().get_pixel(0, 0).0, [2, 3, 0]);
        assert_eq!(frame.width(), 10);
    }

    #[test]
    fn crop_is_clipped_to_bounds() {
        let frame = gradient(10, 8);
        let cropped = frame.crop(PixelRect {
            x: 8,
            y: 6,
            width: 5,
            height: 5,
        });
        assert_eq!((cropped.width(), cropped.height()), (2, 2));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Frame::decode(b"not an image").is_err());
    }
}
