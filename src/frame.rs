//! Transient frame container.
//!
//! A `Frame` lives for exactly one loop iteration: it is read from a source,
//! handed to the detector, and dropped. Nothing in the crate stores or
//! forwards frames after inference.

use anyhow::{anyhow, Result};

/// Decoded RGB24 frame.
pub struct Frame {
    /// Packed RGB bytes, row-major, no padding.
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Position of this frame in its source (0-based).
    pub index: u64,
}

impl Frame {
    /// Wrap decoded RGB24 pixels. Fails when the buffer does not match the dimensions.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            index,
        })
    }

    /// Uniformly filled frame, used by synthetic sources and tests.
    pub fn filled(width: u32, height: u32, index: u64, value: u8) -> Result<Self> {
        let len = rgb_len(width, height)?;
        Self::from_rgb(vec![value; len], width, height, index)
    }

    /// Copy into an `image` buffer for resizing/preprocessing.
    pub fn to_rgb_image(&self) -> Result<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| anyhow!("frame buffer does not fit {}x{}", self.width, self.height))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("index", &self.index)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))
}
