use futures::StreamExt;
use futures::stream;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::analysis::report::format_score;
use crate::analysis::{Diversity, DiversityClassifier, DiversityLedger};
use crate::batch::{list_files, load_grid};
use crate::error::AppError;

/// Scores every image in a directory and writes the sorted reports.
pub struct StatsDriver {
    classifier: DiversityClassifier,
    concurrency: usize,
}

impl StatsDriver {
    pub fn new(classifier: DiversityClassifier) -> Self {
        Self {
            classifier,
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Classify each file in `dir`. Files that fail to decode or classify
    /// are logged and left out of the ledger.
    #[instrument(skip(self), fields(dir = %dir.display()))]
    pub async fn collect(&self, dir: &Path) -> Result<DiversityLedger, AppError> {
        let files = list_files(dir)?;
        info!("Computing per-image diversity for {} files", files.len());

        let mut results = stream::iter(files)
            .map(|path| {
                let classifier = self.classifier.clone();
                async move {
                    let name = display_name(&path);
                    let outcome =
                        tokio::task::spawn_blocking(move || classify_file(&classifier, &path))
                            .await;
                    (name, outcome)
                }
            })
            .buffer_unordered(self.concurrency);

        let mut ledger = DiversityLedger::new();
        while let Some((name, outcome)) = results.next().await {
            match outcome? {
                Ok(diversity) => {
                    println!("{} {}", name, format_score(diversity.score));
                    ledger.record(name, diversity);
                }
                Err(e) => warn!("Skipping {}: {}", name, e),
            }
        }
        Ok(ledger)
    }

    /// Collect, then write the full listing and the below-cutoff listing.
    pub async fn run(
        &self,
        dir: &Path,
        full_report: &Path,
        flat_report: &Path,
    ) -> Result<DiversityLedger, AppError> {
        let ledger = self.collect(dir).await?;
        ledger.save(full_report, flat_report, self.classifier.cutoff())?;
        Ok(ledger)
    }
}

fn classify_file(classifier: &DiversityClassifier, path: &Path) -> Result<Diversity, AppError> {
    let grid = load_grid(path)?;
    Ok(classifier.classify(&grid)?)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::testing::scratch_dir;
    use image::{Rgb, RgbImage};

    fn write_images(dir: &Path) {
        RgbImage::from_pixel(4, 4, Rgb([50, 50, 50]))
            .save(dir.join("flat.png"))
            .unwrap();

        let mut busy = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        for x in 0..4 {
            for y in 0..2 {
                busy.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        busy.save(dir.join("busy.png")).unwrap();

        // 1 of 64 pixels deviates: 0.015625
        let mut speck = RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]));
        speck.put_pixel(0, 0, Rgb([255, 0, 0]));
        speck.save(dir.join("speck.png")).unwrap();

        std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
    }

    #[tokio::test]
    async fn collects_scores_and_skips_undecodable_files() {
        let dir = scratch_dir("stats");
        write_images(&dir);

        let ledger = StatsDriver::new(DiversityClassifier::new())
            .with_concurrency(3)
            .collect(&dir)
            .await
            .unwrap();

        assert_eq!(ledger.len(), 3);
        let sorted = ledger.sorted();
        let names: Vec<&str> = sorted.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["flat.png", "speck.png", "busy.png"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn writes_full_and_flat_reports() {
        let dir = scratch_dir("stats");
        let images = dir.join("wordlist");
        std::fs::create_dir_all(&images).unwrap();
        write_images(&images);
        let full = dir.join("diversity.txt");
        let flat = dir.join("diversity_files.txt");

        StatsDriver::new(DiversityClassifier::new())
            .run(&images, &full, &flat)
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&full).unwrap(),
            "0.0 flat.png\n0.015625 speck.png\n1.0 busy.png\n"
        );
        assert_eq!(
            std::fs::read_to_string(&flat).unwrap(),
            "flat.png\nspeck.png\n"
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn missing_directory_is_an_io_error() {
        let err = StatsDriver::new(DiversityClassifier::new())
            .collect(Path::new("/nonexistent/wordlist"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Io { .. }));
    }
}
