//! Quality search for the `Recompress` policy

use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};

use crate::codec::encode_image;
use crate::config::{DEFAULT_MIN_QUALITY, DEFAULT_QUALITY_STEP, DEFAULT_START_QUALITY};
use crate::error::Result;

/// Size an encoding occupies in the container (padded base64 length)
pub fn embedded_len(byte_len: usize) -> usize {
    base64::encoded_len(byte_len, true).unwrap_or(usize::MAX)
}

/// Linear quality search bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualitySearch {
    pub start: u8,
    pub floor: u8,
    pub step: u8,
}

impl Default for QualitySearch {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_QUALITY,
            floor: DEFAULT_MIN_QUALITY,
            step: DEFAULT_QUALITY_STEP,
        }
    }
}

impl QualitySearch {
    /// Walk quality down from `start` to `floor` and return the first encoding
    /// with `running_total + size <= budget`, or the floor encoding when none fits.
    /// The caller decides whether a floor result that is still over budget is fatal.
    pub fn find(
        &self,
        image: &DynamicImage,
        format: ImageFormat,
        running_total: usize,
        budget: usize,
    ) -> Result<(Vec<u8>, u8)> {
        let floor = self.floor.min(self.start);
        let step = self.step.max(1);
        let mut quality = self.start;

        loop {
            let encoded = encode_image(image, format, quality)?;
            let size = embedded_len(encoded.len());
            let fits = running_total.saturating_add(size) <= budget;
            debug!(quality, size, running_total, budget, fits, "quality attempt");

            // Only JPEG output responds to quality
            if fits || format != ImageFormat::Jpeg {
                return Ok((encoded, quality));
            }
            if quality <= floor {
                warn!(quality, size, running_total, budget, "floor quality still over budget");
                return Ok((encoded, quality));
            }
            quality = quality.saturating_sub(step).max(floor);
        }
    }
}

/// [`QualitySearch::find`] with the default 85 → 10 by 5 bounds
pub fn find_acceptable_encoding(
    image: &DynamicImage,
    format: ImageFormat,
    running_total: usize,
    budget: usize,
) -> Result<(Vec<u8>, u8)> {
    QualitySearch::default().find(image, format, running_total, budget)
}
