//! Drivers that wrap the classifier and the external collaborators into the
//! command line tools.

pub mod flat_filter;
pub mod gallery;
pub mod regression;
pub mod stats;
pub mod wordlist;

use std::path::{Path, PathBuf};

use crate::common::PixelGrid;
use crate::error::AppError;

pub use gallery::GalleryDriver;
pub use regression::{CaseOutcome, RegressionCheck};
pub use stats::StatsDriver;
pub use wordlist::WordlistDriver;

/// Decode an image file into a validated pixel grid.
pub fn load_grid(path: &Path) -> Result<PixelGrid, AppError> {
    let image = image::open(path).map_err(|source| AppError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(PixelGrid::from_dynamic(&image)?)
}

/// Regular files in `dir`, sorted by file name.
pub(crate) fn list_files(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let entries = std::fs::read_dir(dir).map_err(|e| AppError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AppError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(dir).map_err(|e| AppError::io(dir, e))
}
