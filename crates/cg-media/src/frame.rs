//! Frames and detections.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::error::{MediaError, MediaResult};

/// Width every frame is normalized to before detection.
pub const FRAME_WIDTH: u32 = 640;
/// Height every frame is normalized to before detection.
pub const FRAME_HEIGHT: u32 = 480;
/// Size of one packed RGB24 frame.
pub const FRAME_BYTES: usize = (FRAME_WIDTH * FRAME_HEIGHT * 3) as usize;

/// An RGB raster at the pipeline's working resolution.
///
/// Frames are owned by the loop iteration that produced them and are moved,
/// never shared, between decode, detection and encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Build a frame from packed RGB24 bytes at the working resolution.
    pub fn from_rgb24(data: Vec<u8>) -> MediaResult<Self> {
        if data.len() != FRAME_BYTES {
            return Err(MediaError::decode_failed(format!(
                "expected {} bytes of rgb24, got {}",
                FRAME_BYTES,
                data.len()
            )));
        }
        RgbImage::from_raw(FRAME_WIDTH, FRAME_HEIGHT, data)
            .map(|image| Self { image })
            .ok_or_else(|| MediaError::decode_failed("rgb24 buffer does not match frame size"))
    }

    /// Wrap an image, resizing it to the working resolution if needed.
    pub fn from_image(image: RgbImage) -> Self {
        if image.dimensions() == (FRAME_WIDTH, FRAME_HEIGHT) {
            Self { image }
        } else {
            Self {
                image: imageops::resize(&image, FRAME_WIDTH, FRAME_HEIGHT, FilterType::Triangle),
            }
        }
    }

    /// A frame filled with one colour.
    pub fn solid(color: [u8; 3]) -> Self {
        Self {
            image: RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgb(color)),
        }
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

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Packed RGB24 pixel data.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// A region the detector believes contains one person.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Detector confidence weight (SVM margin for HOG).
    pub weight: f64,
}

impl Detection {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgb24_checks_length() {
        assert!(Frame::from_rgb24(vec![0; FRAME_BYTES]).is_ok());
        assert!(matches!(
            Frame::from_rgb24(vec![0; FRAME_BYTES - 1]),
            Err(MediaError::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_from_image_normalizes_size() {
        let frame = Frame::from_image(RgbImage::new(1280, 720));
        assert_eq!((frame.width(), frame.height()), (FRAME_WIDTH, FRAME_HEIGHT));
    }
}
