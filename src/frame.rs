//! In-memory frame representations.
//!
//! A [`Frame`] is one rectangular pixel image extracted from or destined for a
//! video stream. Two interchangeable representations are supported: a flat,
//! tightly-packed byte buffer ([`RawFrame`]) and an [`image::DynamicImage`].
//! Call sites match on the variant explicitly; there is no runtime probing.
//!
//! Frames produced by a reader are not mutated in place — resizing produces a
//! new frame.

use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};

use crate::{convert, error::FrameshiftError};

/// Color mode of a raw pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// 8-bit RGB, 3 bytes per pixel. This is the default and the wire format
    /// emitted to encode engines.
    #[default]
    Rgb,
    /// 8-bit RGBA, 4 bytes per pixel.
    Rgba,
}

impl ColorMode {
    /// Bytes occupied by one pixel in this mode.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ColorMode::Rgb => 3,
            ColorMode::Rgba => 4,
        }
    }
}

/// A flat byte buffer tagged with its dimensions and color mode.
///
/// The buffer is always tightly packed (no row padding); construction
/// validates that the length matches `width * height * bytes_per_pixel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    mode: ColorMode,
}

impl RawFrame {
    /// Create a raw frame from a tightly-packed pixel buffer.
    ///
    /// # Errors
    ///
    /// [`FrameshiftError::FrameBuffer`] if `data.len()` does not equal
    /// `width * height * mode.bytes_per_pixel()`.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        mode: ColorMode,
    ) -> Result<Self, FrameshiftError> {
        let expected = width as usize * height as usize * mode.bytes_per_pixel();
        if data.len() != expected {
            return Err(FrameshiftError::FrameBuffer {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            mode,
        })
    }

    /// Borrow the pixel bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the frame, returning its pixel bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)` pair.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Color mode of the buffer.
    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    /// Convert to an RGB buffer, dropping the alpha channel if present.
    pub fn into_rgb(self) -> RawFrame {
        match self.mode {
            ColorMode::Rgb => self,
            ColorMode::Rgba => RawFrame {
                data: convert::rgba_to_rgb(&self.data),
                width: self.width,
                height: self.height,
                mode: ColorMode::Rgb,
            },
        }
    }

    /// Convert to an RGBA buffer, adding an opaque alpha channel if absent.
    pub fn into_rgba(self) -> RawFrame {
        match self.mode {
            ColorMode::Rgba => self,
            ColorMode::Rgb => RawFrame {
                data: convert::rgb_to_rgba(&self.data),
                width: self.width,
                height: self.height,
                mode: ColorMode::Rgba,
            },
        }
    }

    /// Convert into an [`image::DynamicImage`] without copying the buffer.
    pub fn into_image(self) -> Result<DynamicImage, FrameshiftError> {
        let (width, height) = (self.width, self.height);
        let expected = self.data.len();
        match self.mode {
            ColorMode::Rgb => RgbImage::from_raw(width, height, self.data)
                .map(DynamicImage::ImageRgb8)
                .ok_or(FrameshiftError::FrameBuffer {
                    expected,
                    actual: expected,
                }),
            ColorMode::Rgba => RgbaImage::from_raw(width, height, self.data)
                .map(DynamicImage::ImageRgba8)
                .ok_or(FrameshiftError::FrameBuffer {
                    expected,
                    actual: expected,
                }),
        }
    }

    /// Build a raw frame from an image, packing it as RGBA when the image
    /// carries alpha and RGB otherwise.
    pub fn from_image(image: &DynamicImage) -> RawFrame {
        if image.color().has_alpha() {
            let rgba = image.to_rgba8();
            RawFrame {
                width: rgba.width(),
                height: rgba.height(),
                data: rgba.into_raw(),
                mode: ColorMode::Rgba,
            }
        } else {
            let rgb = image.to_rgb8();
            RawFrame {
                width: rgb.width(),
                height: rgb.height(),
                data: rgb.into_raw(),
                mode: ColorMode::Rgb,
            }
        }
    }
}

/// One video frame, in either of its two in-memory representations.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Flat byte buffer plus dimensions and color mode.
    Raw(RawFrame),
    /// Handle to an `image` crate pixel buffer.
    Image(DynamicImage),
}

impl Frame {
    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        match self {
            Frame::Raw(raw) => raw.width(),
            Frame::Image(image) => image.width(),
        }
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        match self {
            Frame::Raw(raw) => raw.height(),
            Frame::Image(image) => image.height(),
        }
    }

    /// `(width, height)` pair.
    pub fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Color mode: [`ColorMode::Rgba`] when the pixels carry alpha.
    pub fn mode(&self) -> ColorMode {
        match self {
            Frame::Raw(raw) => raw.mode(),
            Frame::Image(image) => {
                if image.color().has_alpha() {
                    ColorMode::Rgba
                } else {
                    ColorMode::Rgb
                }
            }
        }
    }

    /// Convert into the raw-buffer representation, preserving the color mode.
    pub fn into_raw(self) -> RawFrame {
        match self {
            Frame::Raw(raw) => raw,
            Frame::Image(image) => RawFrame::from_image(&image),
        }
    }

    /// Convert into the image representation.
    pub fn into_image(self) -> Result<DynamicImage, FrameshiftError> {
        match self {
            Frame::Raw(raw) => raw.into_image(),
            Frame::Image(image) => Ok(image),
        }
    }

    /// Produce a copy of this frame scaled to exactly `width x height`.
    ///
    /// Returns the frame unchanged when the size already matches. Uses
    /// Lanczos3 resampling.
    pub fn resized(self, width: u32, height: u32) -> Result<Frame, FrameshiftError> {
        if self.size() == (width, height) {
            return Ok(self);
        }
        let image = self.into_image()?;
        Ok(Frame::Image(image.resize_exact(
            width,
            height,
            FilterType::Lanczos3,
        )))
    }
}

impl From<RawFrame> for Frame {
    fn from(raw: RawFrame) -> Self {
        Frame::Raw(raw)
    }
}

impl From<DynamicImage> for Frame {
    fn from(image: DynamicImage) -> Self {
        Frame::Image(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_frame(width: u32, height: u32) -> RawFrame {
        let data = vec![7u8; width as usize * height as usize * 3];
        RawFrame::new(data, width, height, ColorMode::Rgb).unwrap()
    }

    #[test]
    fn construction_validates_buffer_length() {
        let err = RawFrame::new(vec![0u8; 10], 2, 2, ColorMode::Rgb).unwrap_err();
        assert!(matches!(
            err,
            FrameshiftError::FrameBuffer {
                expected: 12,
                actual: 10
            }
        ));
    }

    #[test]
    fn rgba_needs_four_bytes_per_pixel() {
        assert!(RawFrame::new(vec![0u8; 16], 2, 2, ColorMode::Rgba).is_ok());
        assert!(RawFrame::new(vec![0u8; 12], 2, 2, ColorMode::Rgba).is_err());
    }

    #[test]
    fn alpha_round_trip() {
        let raw = rgb_frame(2, 2);
        let rgba = raw.clone().into_rgba();
        assert_eq!(rgba.mode(), ColorMode::Rgba);
        assert_eq!(rgba.data().len(), 16);
        assert_eq!(rgba.into_rgb(), raw);
    }

    #[test]
    fn raw_to_image_and_back() {
        let raw = rgb_frame(4, 3);
        let image = raw.clone().into_image().unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));
        assert_eq!(RawFrame::from_image(&image), raw);
    }

    #[test]
    fn frame_mode_tracks_alpha() {
        let frame = Frame::from(rgb_frame(2, 2).into_rgba());
        assert_eq!(frame.mode(), ColorMode::Rgba);
        let image = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        assert_eq!(Frame::from(image).mode(), ColorMode::Rgb);
    }

    #[test]
    fn resized_same_size_is_identity() {
        let frame = Frame::from(rgb_frame(6, 4));
        let resized = frame.resized(6, 4).unwrap();
        assert!(matches!(resized, Frame::Raw(_)));
    }

    #[test]
    fn resized_changes_dimensions() {
        let frame = Frame::from(rgb_frame(8, 8));
        let resized = frame.resized(4, 2).unwrap();
        assert_eq!(resized.size(), (4, 2));
    }
}
