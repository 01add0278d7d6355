use futures::StreamExt;
use futures::stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::batch::{ensure_dir, list_files};
use crate::config::WordlistSettings;
use crate::error::{AppError, GeneratorError};
use crate::external::{GenerateParams, Generator};

/// Renders every dictionary word through the generator.
pub struct WordlistDriver {
    generator: Arc<dyn Generator>,
    settings: WordlistSettings,
    algorithm: String,
    concurrency: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WordlistSummary {
    pub generated: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Words to render from one dictionary file, honouring the optional resume
/// point. Returns the words and how many lines were unusable.
pub fn select_words(contents: &str, start: Option<&str>) -> (Vec<String>, usize) {
    let mut words = Vec::new();
    let mut skipped = 0;
    for line in contents.lines() {
        if start.is_some_and(|start| line < start) {
            continue;
        }
        let word = line.trim();
        if word.is_empty() {
            continue;
        }
        if word.contains(['/', '\\']) || word == "." || word == ".." {
            warn!("Skipping word that is not a valid file name: {:?}", word);
            skipped += 1;
            continue;
        }
        words.push(word.to_string());
    }
    (words, skipped)
}

impl WordlistDriver {
    pub fn new(
        generator: Arc<dyn Generator>,
        settings: WordlistSettings,
        algorithm: impl Into<String>,
    ) -> Self {
        Self {
            generator,
            settings,
            algorithm: algorithm.into(),
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Walk every dictionary file, skipping lines that sort before `start`.
    #[instrument(skip(self), fields(dict = %self.settings.dict_dir.display()))]
    pub async fn run(&self, start: Option<&str>) -> Result<WordlistSummary, AppError> {
        ensure_dir(&self.settings.output_dir)?;
        let mut summary = WordlistSummary::default();

        for dictionary in list_files(&self.settings.dict_dir)? {
            let contents = match tokio::fs::read_to_string(&dictionary).await {
                Ok(contents) => contents,
                Err(e) => {
                    warn!("Skipping dictionary {}: {}", dictionary.display(), e);
                    continue;
                }
            };
            let (words, skipped) = select_words(&contents, start);
            info!("{} words from {}", words.len(), dictionary.display());
            summary.skipped += skipped;

            let mut renders = stream::iter(words)
                .map(|word| self.render(word))
                .buffer_unordered(self.concurrency);
            while let Some(rendered) = renders.next().await {
                if rendered {
                    summary.generated += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Word list finished: {} generated, {} failed, {} skipped",
            summary.generated, summary.failed, summary.skipped
        );
        Ok(summary)
    }

    async fn render(&self, word: String) -> bool {
        println!("Generating: {word}");
        let output = self.output_path(&word);
        let params = GenerateParams::new(word, self.algorithm.clone(), output)
            .with_size(self.settings.width, self.settings.height);

        match self.generator.generate(&params).await {
            Ok(_) => {
                debug!("Rendered {}", params.output.display());
                true
            }
            Err(GeneratorError::Failed {
                command,
                transcript,
                ..
            }) => {
                println!(
                    "Command:\n{}\n{}",
                    command,
                    String::from_utf8_lossy(&transcript).trim_end()
                );
                false
            }
            Err(e) => {
                error!("Failed to render {:?}: {}", params.data, e);
                false
            }
        }
    }

    fn output_path(&self, word: &str) -> PathBuf {
        output_for(&self.settings.output_dir, word)
    }
}

/// Where the render of `word` lands inside `dir`.
pub fn output_for(dir: &Path, word: &str) -> PathBuf {
    dir.join(format!("{word}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::testing::{FakeGenerator, scratch_dir};

    #[test]
    fn selects_trimmed_words_from_resume_point() {
        let contents = "apple\nbanana \n\ncherry\n";
        let (words, skipped) = select_words(contents, Some("banana"));
        assert_eq!(words, vec!["banana", "cherry"]);
        assert_eq!(skipped, 0);

        let (words, _) = select_words(contents, None);
        assert_eq!(words, vec!["apple", "banana", "cherry"]);
    }

    #[test]
    fn skips_words_that_would_escape_the_output_dir() {
        let (words, skipped) = select_words("ok\nand/or\n..\n", None);
        assert_eq!(words, vec!["ok"]);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn output_lands_in_wordlist_dir() {
        assert_eq!(
            output_for(Path::new("wordlist"), "zebra"),
            Path::new("wordlist/zebra.png")
        );
    }

    #[tokio::test]
    async fn renders_every_dictionary_word() {
        let dir = scratch_dir("wordlist");
        let dict = dir.join("dict");
        std::fs::create_dir_all(&dict).unwrap();
        std::fs::write(dict.join("a-words"), "alpha\nalso\n").unwrap();
        std::fs::write(dict.join("b-words"), "beta\nbroken\n").unwrap();

        let generator = Arc::new(FakeGenerator {
            failing: vec!["broken".to_string()],
            ..FakeGenerator::default()
        });
        let settings = WordlistSettings {
            dict_dir: dict,
            output_dir: dir.join("wordlist"),
            ..WordlistSettings::default()
        };
        let driver = WordlistDriver::new(generator.clone(), settings, "1.1").with_concurrency(4);

        let summary = driver.run(None).await.unwrap();

        assert_eq!(
            summary,
            WordlistSummary {
                generated: 3,
                failed: 1,
                skipped: 0
            }
        );
        assert!(dir.join("wordlist").join("alpha.png").exists());
        let seen = generator.seen.lock().unwrap();
        assert!(seen.iter().all(|p| p.algorithm == "1.1" && p.width == 64 && p.height == 64));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn resume_point_applies_to_every_dictionary() {
        let dir = scratch_dir("wordlist");
        let dict = dir.join("dict");
        std::fs::create_dir_all(&dict).unwrap();
        std::fs::write(dict.join("words"), "ant\nbee\ncat\n").unwrap();

        let generator = Arc::new(FakeGenerator::default());
        let settings = WordlistSettings {
            dict_dir: dict,
            output_dir: dir.join("wordlist"),
            ..WordlistSettings::default()
        };
        let summary = WordlistDriver::new(generator.clone(), settings, "1.1")
            .run(Some("bee"))
            .await
            .unwrap();

        assert_eq!(summary.generated, 2);
        let mut data: Vec<String> = generator
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.data.clone())
            .collect();
        data.sort();
        assert_eq!(data, vec!["bee", "cat"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
