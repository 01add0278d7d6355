use serde::Deserialize;
use std::fmt;

use crate::common::PixelGrid;
use crate::common::pixel_grid::{CHANNELS, NORMALIZED_SCALE};
use crate::config::DiversitySettings;
use crate::error::InvalidImageError;

/// Deviation a channel must exceed, in the 8-bit scale.
pub const DEFAULT_THRESHOLD: f64 = 8.0;
/// Scores at or below this fraction are flat.
pub const DEFAULT_CUTOFF: f64 = 0.05;

/// How "different" samples are aggregated into a score.
///
/// The two rules are not numerically identical and are never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DiversityRule {
    /// Fraction of pixels with at least one channel beyond the threshold.
    #[default]
    PerPixel,
    /// Fraction of channel samples beyond the threshold in either direction.
    ChannelEvents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Too little variation, a degenerate render.
    Flat,
    Diverse,
}

impl Verdict {
    pub fn is_flat(self) -> bool {
        self == Verdict::Flat
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Flat => write!(f, "flat"),
            Verdict::Diverse => write!(f, "diverse"),
        }
    }
}

/// Result of classifying one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Diversity {
    pub score: f64,
    pub verdict: Verdict,
    /// Units that deviated: pixels, or channel samples for `ChannelEvents`.
    pub different: usize,
    /// Units inspected.
    pub total: usize,
}

impl Diversity {
    pub fn same(&self) -> usize {
        self.total - self.different
    }
}

/// Scores how much an image varies around its per-channel mean.
#[derive(Debug, Clone)]
pub struct DiversityClassifier {
    threshold: f64,
    cutoff: f64,
    rule: DiversityRule,
}

impl DiversityClassifier {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            cutoff: DEFAULT_CUTOFF,
            rule: DiversityRule::PerPixel,
        }
    }

    pub fn from_settings(settings: &DiversitySettings) -> Self {
        Self {
            threshold: settings.threshold,
            cutoff: settings.cutoff,
            rule: settings.rule,
        }
    }

    /// Threshold in the 8-bit scale.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Threshold given in the normalized `[0, 1]` scale, e.g. `8.0 / 256.0`.
    pub fn with_normalized_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold * NORMALIZED_SCALE;
        self
    }

    pub fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_rule(mut self, rule: DiversityRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn rule(&self) -> DiversityRule {
        self.rule
    }

    pub fn classify(&self, grid: &PixelGrid) -> Result<Diversity, InvalidImageError> {
        let pixels = grid.pixel_count();
        if pixels == 0 {
            return Err(InvalidImageError::Empty);
        }
        let means = grid.channel_means();

        let (different, total) = match self.rule {
            DiversityRule::PerPixel => {
                let different = grid
                    .pixels()
                    .filter(|pixel| {
                        pixel
                            .iter()
                            .zip(means)
                            .any(|(sample, mean)| self.exceeds(sample - mean))
                    })
                    .count();
                (different, pixels)
            }
            DiversityRule::ChannelEvents => {
                let mut events = 0usize;
                for pixel in grid.pixels() {
                    for (sample, mean) in pixel.iter().zip(means) {
                        let deviation = sample - mean;
                        if deviation > self.threshold {
                            events += 1;
                        }
                        if deviation < -self.threshold {
                            events += 1;
                        }
                    }
                }
                (events, pixels * CHANNELS)
            }
        };

        let score = different as f64 / total as f64;
        Ok(Diversity {
            score,
            verdict: self.verdict(score),
            different,
            total,
        })
    }

    pub fn verdict(&self, score: f64) -> Verdict {
        if score <= self.cutoff {
            Verdict::Flat
        } else {
            Verdict::Diverse
        }
    }

    fn exceeds(&self, deviation: f64) -> bool {
        deviation.abs() > self.threshold
    }
}

impl Default for DiversityClassifier {
    fn default() -> Self {
        Self::new()
    }
}
