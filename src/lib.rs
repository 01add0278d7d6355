pub mod analysis;
pub mod batch;
pub mod common;
pub mod config;
pub mod error;
pub mod external;

pub use analysis::{Diversity, DiversityClassifier, DiversityRule, Verdict};
pub use common::PixelGrid;
pub use config::Settings;
pub use error::{AppError, ComparatorError, GeneratorError, InvalidImageError};
