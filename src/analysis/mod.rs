pub mod diversity;
pub mod report;

pub use diversity::{Diversity, DiversityClassifier, DiversityRule, Verdict};
pub use report::{DiversityEntry, DiversityLedger};
