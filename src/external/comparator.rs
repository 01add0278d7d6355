use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};

use crate::error::ComparatorError;
use crate::external::command::CommandLine;

/// Colour for pixels that differ in a written diff image.
const DIFF_HIGHLIGHT: Rgba<u8> = Rgba([241, 0, 30, 255]);

/// Counts the pixels that differ between two images.
#[async_trait]
pub trait ImageComparator: Send + Sync {
    /// Absolute-error metric: number of pixels outside the fuzz tolerance.
    /// When `diff` is given a visual diff is written there.
    async fn compare(
        &self,
        candidate: &Path,
        reference: &Path,
        diff: Option<&Path>,
    ) -> Result<u64, ComparatorError>;
}

/// Shells out to ImageMagick `compare -metric ae`.
#[derive(Debug, Clone)]
pub struct ProcessComparator {
    program: CommandLine,
    fuzz_percent: f64,
}

impl ProcessComparator {
    pub fn new(program: CommandLine) -> Self {
        Self {
            program,
            fuzz_percent: 1.0,
        }
    }

    pub fn with_fuzz_percent(mut self, fuzz_percent: f64) -> Self {
        self.fuzz_percent = fuzz_percent;
        self
    }

    pub fn command_for(
        &self,
        candidate: &Path,
        reference: &Path,
        diff: Option<&Path>,
    ) -> CommandLine {
        let command = self
            .program
            .clone()
            .arg(candidate)
            .arg(reference)
            .arg("-metric")
            .arg("ae")
            .arg("-fuzz")
            .arg(format!("{}%", self.fuzz_percent));
        match diff {
            Some(diff) => command.arg(diff),
            // compare insists on an output image
            None => command.arg("null:"),
        }
    }
}

/// Read the metric from the first token of comparator output, e.g. `0` or
/// `1234 (0.0188)`. Fractional counts round up so only an exact zero passes.
pub fn parse_metric(output: &str) -> Result<u64, ComparatorError> {
    output
        .split_whitespace()
        .next()
        .and_then(|token| token.parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0)
        .map(|value| value.ceil() as u64)
        .ok_or_else(|| ComparatorError::UnparsableMetric(output.trim().to_string()))
}

#[async_trait]
impl ImageComparator for ProcessComparator {
    async fn compare(
        &self,
        candidate: &Path,
        reference: &Path,
        diff: Option<&Path>,
    ) -> Result<u64, ComparatorError> {
        let command = self.command_for(candidate, reference, diff);
        let finished = command.run().await.map_err(|source| ComparatorError::Spawn {
            command: command.display(),
            source,
        })?;
        let output = finished.text();

        // 0 = similar, 1 = dissimilar, anything else is an error
        match finished.status.code() {
            Some(0) | Some(1) => parse_metric(&output),
            _ => Err(ComparatorError::Failed {
                command: command.display(),
                status: finished.status,
                output: output.trim().to_string(),
            }),
        }
    }
}

/// Compares decoded pixels without leaving the process.
///
/// A pixel differs when any RGBA channel moves by more than
/// `fuzz_percent` of full scale.
#[derive(Debug, Clone)]
pub struct PixelComparator {
    fuzz_percent: f64,
}

impl PixelComparator {
    pub fn new() -> Self {
        Self { fuzz_percent: 1.0 }
    }

    pub fn with_fuzz_percent(mut self, fuzz_percent: f64) -> Self {
        self.fuzz_percent = fuzz_percent;
        self
    }

    /// Count differing pixels and build the matching diff image.
    pub fn diff_images(
        &self,
        candidate: &RgbaImage,
        reference: &RgbaImage,
    ) -> Result<(u64, RgbaImage), ComparatorError> {
        if candidate.dimensions() != reference.dimensions() {
            return Err(ComparatorError::DimensionMismatch {
                left: candidate.dimensions(),
                right: reference.dimensions(),
            });
        }
        let tolerance = self.fuzz_percent / 100.0 * 255.0;
        let (width, height) = candidate.dimensions();
        let mut diff = RgbaImage::new(width, height);
        let mut differing = 0u64;

        for ((a, b), out) in candidate
            .pixels()
            .zip(reference.pixels())
            .zip(diff.pixels_mut())
        {
            let differs = a
                .0
                .iter()
                .zip(b.0.iter())
                .any(|(&x, &y)| f64::from(x.abs_diff(y)) > tolerance);
            if differs {
                differing += 1;
                *out = DIFF_HIGHLIGHT;
            } else {
                *out = faded(b);
            }
        }
        Ok((differing, diff))
    }
}

fn faded(pixel: &Rgba<u8>) -> Rgba<u8> {
    let [r, g, b, _] = pixel.0;
    let luma = (u16::from(r) * 3 + u16::from(g) * 6 + u16::from(b)) / 10;
    let light = (255 - (255 - luma) / 5) as u8;
    Rgba([light, light, light, 255])
}

fn open_rgba(path: &Path) -> Result<RgbaImage, ComparatorError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| ComparatorError::Open {
            path: path.to_path_buf(),
            source,
        })
}

impl Default for PixelComparator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageComparator for PixelComparator {
    async fn compare(
        &self,
        candidate: &Path,
        reference: &Path,
        diff: Option<&Path>,
    ) -> Result<u64, ComparatorError> {
        let comparator = self.clone();
        let candidate = candidate.to_path_buf();
        let reference = reference.to_path_buf();
        let diff: Option<PathBuf> = diff.map(Path::to_path_buf);

        tokio::task::spawn_blocking(move || {
            let (differing, image) =
                comparator.diff_images(&open_rgba(&candidate)?, &open_rgba(&reference)?)?;
            if let Some(path) = diff {
                image
                    .save(&path)
                    .map_err(|source| ComparatorError::WriteDiff { path, source })?;
            }
            Ok::<u64, ComparatorError>(differing)
        })
        .await?
    }
}
