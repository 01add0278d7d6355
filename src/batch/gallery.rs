use futures::StreamExt;
use futures::stream;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::batch::ensure_dir;
use crate::config::GallerySettings;
use crate::error::{AppError, GeneratorError};
use crate::external::{GenerateParams, Generator};

/// Renders numbered seeds into a gallery directory.
pub struct GalleryDriver {
    generator: Arc<dyn Generator>,
    settings: GallerySettings,
    verbose: bool,
    concurrency: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GallerySummary {
    pub rendered: Vec<String>,
    pub failed: Vec<String>,
}

/// Zero padded seed used as the generator data and the file stem.
pub fn seed_for(key: u32) -> String {
    format!("{key:04}")
}

/// Keys `1..=count`, used when none are given explicitly.
pub fn default_keys(count: u32) -> Vec<u32> {
    (1..=count).collect()
}

impl GalleryDriver {
    pub fn new(generator: Arc<dyn Generator>, settings: GallerySettings) -> Self {
        Self {
            generator,
            settings,
            verbose: false,
            concurrency: 1,
        }
    }

    /// Print every command and transcript instead of saving transcripts.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[instrument(skip(self, keys), fields(keys = keys.len()))]
    pub async fn run(&self, keys: &[u32]) -> Result<GallerySummary, AppError> {
        let output_dir = self.settings.output_dir.as_path();
        ensure_dir(output_dir)?;

        let mut renders = stream::iter(keys.iter().copied())
            .map(|key| self.render(output_dir, key))
            .buffer_unordered(self.concurrency);

        let mut summary = GallerySummary::default();
        while let Some((seed, rendered)) = renders.next().await {
            if rendered? {
                summary.rendered.push(seed);
            } else {
                summary.failed.push(seed);
            }
        }
        summary.rendered.sort();
        summary.failed.sort();
        info!(
            "Gallery finished: {} rendered, {} failed",
            summary.rendered.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Render one seed. The `AT:` line goes out before the generator starts
    /// so a stuck render can be identified. The flag is false when the
    /// generator failed; only errors writing the transcript abort the run.
    async fn render(&self, output_dir: &Path, key: u32) -> (String, Result<bool, AppError>) {
        let seed = seed_for(key);
        let params = GenerateParams::new(
            seed.clone(),
            self.settings.algorithm.clone(),
            output_dir.join(format!("{seed}.png")),
        )
        .with_size(self.settings.width, self.settings.height);

        println!("AT: {seed}");
        debug!("Rendering seed {}", seed);
        let mut report = String::new();
        let rendered = match self.generator.generate(&params).await {
            Ok(generation) if self.verbose => {
                push_command(&mut report, &generation.command, &generation.transcript);
                Ok(true)
            }
            Ok(generation) => {
                let transcript_path = output_dir.join(format!("{seed}-fmt.txt"));
                tokio::fs::write(&transcript_path, &generation.transcript)
                    .await
                    .map(|_| true)
                    .map_err(|e| AppError::io(transcript_path, e))
            }
            Err(GeneratorError::Failed {
                command,
                transcript,
                ..
            }) => {
                push_command(&mut report, &command, &transcript);
                Ok(false)
            }
            Err(e) => {
                error!("Seed {} failed: {}", seed, e);
                Ok(false)
            }
        };
        if !report.is_empty() {
            print!("{report}");
        }
        (seed, rendered)
    }
}

fn push_command(report: &mut String, command: &str, transcript: &[u8]) {
    report.push_str("Command:\n");
    report.push_str(command);
    report.push('\n');
    report.push_str(&String::from_utf8_lossy(transcript));
    if !report.ends_with('\n') {
        report.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::testing::{FakeGenerator, scratch_dir};
    use crate::external::Generation;
    use async_trait::async_trait;
    use std::io;
    use std::sync::Mutex;

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct SharedLog(Arc<Mutex<Vec<u8>>>);

    impl SharedLog {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for SharedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Records whether the seed had been announced when generation began.
    struct AnnouncementCheck {
        log: SharedLog,
        announced: Mutex<Vec<(String, bool)>>,
    }

    #[async_trait]
    impl Generator for AnnouncementCheck {
        async fn generate(&self, params: &GenerateParams) -> Result<Generation, GeneratorError> {
            let seen = self
                .log
                .text()
                .contains(&format!("Rendering seed {}", params.data));
            self.announced
                .lock()
                .unwrap()
                .push((params.data.clone(), seen));
            Err(GeneratorError::InvalidParams("render skipped"))
        }
    }

    fn settings(dir: &Path) -> GallerySettings {
        GallerySettings {
            output_dir: dir.join("gallery"),
            ..GallerySettings::default()
        }
    }

    #[test]
    fn seeds_are_zero_padded() {
        assert_eq!(seed_for(7), "0007");
        assert_eq!(seed_for(1234), "1234");
        assert_eq!(seed_for(12345), "12345");
        assert_eq!(default_keys(3), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn renders_seeds_and_saves_transcripts() {
        let dir = scratch_dir("gallery");
        let generator = Arc::new(FakeGenerator::default());
        let driver = GalleryDriver::new(generator.clone(), settings(&dir)).with_concurrency(2);

        let summary = driver.run(&[1, 2, 10]).await.unwrap();

        assert_eq!(summary.rendered, vec!["0001", "0002", "0010"]);
        assert!(summary.failed.is_empty());
        let gallery = dir.join("gallery");
        assert!(gallery.join("0010.png").exists());
        assert_eq!(
            std::fs::read_to_string(gallery.join("0002-fmt.txt")).unwrap(),
            "format for 0002\n"
        );

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|p| p.algorithm == "1-fast"));
        assert!(seen.iter().all(|p| (p.width, p.height) == (256, 128)));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn failures_are_reported_without_transcript_file() {
        let dir = scratch_dir("gallery");
        let generator = Arc::new(FakeGenerator {
            failing: vec!["0002".to_string()],
            ..FakeGenerator::default()
        });
        let driver = GalleryDriver::new(generator, settings(&dir));

        let summary = driver.run(&[1, 2]).await.unwrap();

        assert_eq!(summary.rendered, vec!["0001"]);
        assert_eq!(summary.failed, vec!["0002"]);
        assert!(!dir.join("gallery").join("0002-fmt.txt").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn verbose_mode_skips_transcript_files() {
        let dir = scratch_dir("gallery");
        let driver = GalleryDriver::new(Arc::new(FakeGenerator::default()), settings(&dir))
            .with_verbose(true);

        let summary = driver.run(&[5]).await.unwrap();

        assert_eq!(summary.rendered, vec!["0005"]);
        assert!(!dir.join("gallery").join("0005-fmt.txt").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn command_report_ends_with_newline() {
        let mut report = String::new();
        push_command(&mut report, "java -jar Vash.jar", b"no newline");
        assert_eq!(report, "Command:\njava -jar Vash.jar\nno newline\n");
    }

    #[tokio::test]
    async fn seed_is_announced_before_rendering() {
        let dir = scratch_dir("gallery");
        let log = SharedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let generator = Arc::new(AnnouncementCheck {
            log,
            announced: Mutex::new(Vec::new()),
        });
        let summary = GalleryDriver::new(generator.clone(), settings(&dir))
            .run(&[3])
            .await
            .unwrap();

        assert_eq!(summary.failed, vec!["0003"]);
        assert_eq!(
            *generator.announced.lock().unwrap(),
            vec![("0003".to_string(), true)]
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
