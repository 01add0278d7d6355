use image::DynamicImage;

use crate::error::InvalidImageError;

pub const CHANNELS: usize = 3;

/// Scale applied to normalized samples so that a normalized threshold of
/// `8 / 256` lands exactly on the 8-bit threshold of `8`.
pub const NORMALIZED_SCALE: f64 = 256.0;

/// An immutable RGB sample grid stored in the 8-bit scale.
///
/// Every constructor validates its input, so a `PixelGrid` always holds at
/// least one pixel and exactly three channels per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    samples: Vec<f64>,
}

impl PixelGrid {
    /// Build a grid from interleaved 8-bit RGB samples.
    pub fn from_rgb8(width: u32, height: u32, samples: &[u8]) -> Result<Self, InvalidImageError> {
        Self::from_samples(width, height, CHANNELS, samples)
    }

    /// Build a grid from interleaved 8-bit samples with an explicit channel count.
    pub fn from_samples(
        width: u32,
        height: u32,
        channels: usize,
        samples: &[u8],
    ) -> Result<Self, InvalidImageError> {
        Self::validate(width, height, channels, samples.len())?;
        Ok(Self {
            width,
            height,
            samples: samples.iter().map(|&s| f64::from(s)).collect(),
        })
    }

    /// Build a grid from interleaved samples in `[0, 1]`.
    pub fn from_normalized(
        width: u32,
        height: u32,
        channels: usize,
        samples: &[f32],
    ) -> Result<Self, InvalidImageError> {
        Self::validate(width, height, channels, samples.len())?;
        Ok(Self {
            width,
            height,
            samples: samples
                .iter()
                .map(|&s| f64::from(s) * NORMALIZED_SCALE)
                .collect(),
        })
    }

    /// Build a grid from a decoded image. Only three-channel colour types are
    /// accepted; deeper samples are reduced to 8 bits.
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self, InvalidImageError> {
        let channels = usize::from(image.color().channel_count());
        if channels != CHANNELS {
            return Err(InvalidImageError::ChannelCount(channels));
        }
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::from_rgb8(width, height, rgb.as_raw())
    }

    fn validate(
        width: u32,
        height: u32,
        channels: usize,
        found: usize,
    ) -> Result<(), InvalidImageError> {
        if channels != CHANNELS {
            return Err(InvalidImageError::ChannelCount(channels));
        }
        let pixels = (width as usize).checked_mul(height as usize);
        if pixels == Some(0) {
            return Err(InvalidImageError::Empty);
        }
        // a grid too large to address can never match the buffer
        let expected = pixels
            .and_then(|pixels| pixels.checked_mul(channels))
            .unwrap_or(usize::MAX);
        if found != expected {
            return Err(InvalidImageError::SampleCount { expected, found });
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.samples.len() / CHANNELS
    }

    /// Iterate pixels as `[r, g, b]` in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = &[f64]> {
        self.samples.chunks_exact(CHANNELS)
    }

    /// Arithmetic mean of each channel across every pixel.
    pub fn channel_means(&self) -> [f64; CHANNELS] {
        let mut sums = [0.0f64; CHANNELS];
        for pixel in self.pixels() {
            for (sum, sample) in sums.iter_mut().zip(pixel) {
                *sum += sample;
            }
        }
        let count = self.pixel_count() as f64;
        sums.map(|sum| sum / count)
    }
}
