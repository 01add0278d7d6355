use futures::StreamExt;
use futures::stream;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::batch::{ensure_dir, list_files};
use crate::error::AppError;
use crate::external::ImageComparator;

/// Length of the prefix in front of the case number, as in `goal12.png`.
const GOAL_PREFIX_LEN: usize = 4;
const PNG_SUFFIX: &str = ".png";

/// One goal image and where its rendered counterpart and diff live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegressionCase {
    pub number: u64,
    pub goal: PathBuf,
    pub result: PathBuf,
    pub diff: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseOutcome {
    Ok,
    Fail,
}

impl fmt::Display for CaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseOutcome::Ok => write!(f, "OK"),
            CaseOutcome::Fail => write!(f, "FAIL"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaseReport {
    pub case: RegressionCase,
    pub outcome: CaseOutcome,
    /// Differing pixels, when the comparator produced a metric.
    pub metric: Option<u64>,
}

impl CaseReport {
    pub fn line(&self) -> String {
        format!(
            "{} ?= {} : {}",
            self.case.goal.display(),
            self.case.result.display(),
            self.outcome
        )
    }
}

/// Compares rendered results under `<root>/results` against the goal images
/// in `<root>/goal`, writing visual diffs to `<root>/diff`.
pub struct RegressionCheck {
    comparator: Arc<dyn ImageComparator>,
    root: PathBuf,
    concurrency: usize,
}

/// Case number for a goal file name such as `goal12.png`.
pub fn case_number(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(PNG_SUFFIX)?;
    stem.get(GOAL_PREFIX_LEN..)?.parse().ok()
}

impl RegressionCheck {
    pub fn new(comparator: Arc<dyn ImageComparator>, root: impl Into<PathBuf>) -> Self {
        Self {
            comparator,
            root: root.into(),
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Goal cases ordered by case number. Unrecognised file names are skipped.
    pub fn cases(&self) -> Result<Vec<RegressionCase>, AppError> {
        let goal_dir = self.root.join("goal");
        let mut cases = Vec::new();
        for goal in list_files(&goal_dir)? {
            let Some(name) = goal.file_name().and_then(|n| n.to_str()) else {
                warn!("Skipping goal with non UTF-8 name: {}", goal.display());
                continue;
            };
            let Some(number) = case_number(name) else {
                warn!("Skipping unrecognised goal file: {}", name);
                continue;
            };
            let diff_name = &name[GOAL_PREFIX_LEN..];
            cases.push(RegressionCase {
                number,
                result: self.root.join("results").join(format!("{number}.png")),
                diff: self.root.join("diff").join(diff_name),
                goal,
            });
        }
        cases.sort_by_key(|case| case.number);
        Ok(cases)
    }

    /// Compare every case and print one status line each, in case order.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn run(&self) -> Result<Vec<CaseReport>, AppError> {
        let cases = self.cases()?;
        ensure_dir(&self.root.join("diff"))?;
        info!("Checking {} regression cases", cases.len());

        // buffered keeps case order while comparing concurrently
        let reports: Vec<CaseReport> = stream::iter(cases)
            .map(|case| self.check_case(case))
            .buffered(self.concurrency)
            .collect()
            .await;

        for report in &reports {
            println!("{}", report.line());
        }
        let failed = reports
            .iter()
            .filter(|r| r.outcome == CaseOutcome::Fail)
            .count();
        info!("{} of {} cases failed", failed, reports.len());
        Ok(reports)
    }

    async fn check_case(&self, case: RegressionCase) -> CaseReport {
        let metric = match self
            .comparator
            .compare(&case.result, &case.goal, Some(case.diff.as_path()))
            .await
        {
            Ok(metric) => Some(metric),
            Err(e) => {
                warn!("Case {} could not be compared: {}", case.number, e);
                None
            }
        };
        let outcome = match metric {
            Some(0) => CaseOutcome::Ok,
            _ => CaseOutcome::Fail,
        };
        CaseReport {
            case,
            outcome,
            metric,
        }
    }
}

/// True when every report passed.
pub fn all_passed(reports: &[CaseReport]) -> bool {
    reports.iter().all(|r| r.outcome == CaseOutcome::Ok)
}
