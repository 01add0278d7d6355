use std::path::Path;

use crate::analysis::{Diversity, DiversityClassifier};
use crate::batch::load_grid;
use crate::error::AppError;

/// Classify one image file. Returns the diversity and the status line
/// `<path> <same> <different> <1 if diverse else 0>`.
pub fn check_file(
    classifier: &DiversityClassifier,
    path: &Path,
) -> Result<(Diversity, String), AppError> {
    let grid = load_grid(path)?;
    let diversity = classifier.classify(&grid)?;
    let line = format!(
        "{} {} {} {}",
        path.display(),
        diversity.same(),
        diversity.different,
        u8::from(!diversity.verdict.is_flat())
    );
    tracing::debug!("{} scored {}", path.display(), diversity.score);
    Ok((diversity, line))
}
