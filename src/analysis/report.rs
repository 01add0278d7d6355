use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::analysis::diversity::Diversity;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct DiversityEntry {
    pub name: String,
    pub diversity: Diversity,
}

/// Collects per-image scores for batch reporting.
#[derive(Debug, Default)]
pub struct DiversityLedger {
    entries: Vec<DiversityEntry>,
}

impl DiversityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: impl Into<String>, diversity: Diversity) {
        self.entries.push(DiversityEntry {
            name: name.into(),
            diversity,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by ascending score, ties broken by name.
    pub fn sorted(&self) -> Vec<&DiversityEntry> {
        let mut sorted: Vec<&DiversityEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| {
            a.diversity
                .score
                .total_cmp(&b.diversity.score)
                .then_with(|| a.name.cmp(&b.name))
        });
        sorted
    }

    /// Names scoring strictly below `cutoff`, in ascending score order.
    pub fn below(&self, cutoff: f64) -> Vec<&str> {
        self.sorted()
            .into_iter()
            .filter(|entry| entry.diversity.score < cutoff)
            .map(|entry| entry.name.as_str())
            .collect()
    }

    /// Write one `<score> <name>` line per entry, ascending by score.
    pub fn write_full<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for entry in self.sorted() {
            writeln!(out, "{} {}", format_score(entry.diversity.score), entry.name)?;
        }
        Ok(())
    }

    /// Write the names scoring below `cutoff`, one per line.
    pub fn write_below<W: Write>(&self, cutoff: f64, out: &mut W) -> std::io::Result<()> {
        for name in self.below(cutoff) {
            writeln!(out, "{name}")?;
        }
        Ok(())
    }

    pub fn save(&self, full_path: &Path, flat_path: &Path, cutoff: f64) -> Result<(), AppError> {
        write_file(full_path, |out| self.write_full(out))?;
        write_file(flat_path, |out| self.write_below(cutoff, out))?;
        tracing::info!(
            "Wrote {} scores to {} and {} flat names to {}",
            self.len(),
            full_path.display(),
            self.below(cutoff).len(),
            flat_path.display()
        );
        Ok(())
    }
}

/// Shortest round-trip form, always with a decimal point (`0.0`, `0.0625`).
pub fn format_score(score: f64) -> String {
    format!("{score:?}")
}

fn write_file<F>(path: &Path, body: F) -> Result<(), AppError>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let file = File::create(path).map_err(|e| AppError::io(path, e))?;
    let mut out = BufWriter::new(file);
    body(&mut out)
        .and_then(|_| out.flush())
        .map_err(|e| AppError::io(path, e))
}
