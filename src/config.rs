use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::analysis::DiversityRule;
use crate::analysis::diversity::{DEFAULT_CUTOFF, DEFAULT_THRESHOLD};
use crate::error::AppError;

const DEFAULT_CONFIG_FILE: &str = "vash-tools";
const ENV_PREFIX: &str = "VASH";

/// Layered settings for every tool in the crate.
///
/// Values come from the defaults below, then an optional `vash-tools.toml`
/// (or the file given on the command line), then `VASH__SECTION__KEY`
/// environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub generator: GeneratorSettings,
    pub gallery: GallerySettings,
    pub wordlist: WordlistSettings,
    pub diversity: DiversitySettings,
    pub stats: StatsSettings,
    pub check: CheckSettings,
    pub batch: BatchSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    /// Whitespace separated program and leading arguments used to launch
    /// the generator.
    pub program: String,
    /// Algorithm identifier shared by the word list tooling.
    pub algorithm: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GallerySettings {
    pub algorithm: String,
    pub width: u32,
    pub height: u32,
    pub count: u32,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WordlistSettings {
    pub dict_dir: PathBuf,
    pub output_dir: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiversitySettings {
    /// Deviation threshold in the 8-bit sample scale.
    pub threshold: f64,
    /// Scores at or below this value are flat.
    pub cutoff: f64,
    pub rule: DiversityRule,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    pub input_dir: PathBuf,
    pub full_report: PathBuf,
    pub flat_report: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ComparatorBackend {
    /// Shell out to ImageMagick's `compare`.
    Process,
    /// Compare decoded pixels in-process.
    Pixel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckSettings {
    pub root: PathBuf,
    pub fuzz_percent: f64,
    pub backend: ComparatorBackend,
    pub compare_program: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub concurrency: usize,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            program: "java -jar Vash.jar".to_string(),
            algorithm: "1.1".to_string(),
        }
    }
}

impl Default for GallerySettings {
    fn default() -> Self {
        Self {
            algorithm: "1-fast".to_string(),
            width: 256,
            height: 128,
            count: 100,
            output_dir: PathBuf::from("gallery"),
        }
    }
}

impl Default for WordlistSettings {
    fn default() -> Self {
        Self {
            // cracklib keeps its dictionaries here on most unix systems
            dict_dir: PathBuf::from("/usr/share/dict"),
            output_dir: PathBuf::from("wordlist"),
            width: 64,
            height: 64,
        }
    }
}

impl Default for DiversitySettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            cutoff: DEFAULT_CUTOFF,
            rule: DiversityRule::PerPixel,
        }
    }
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("wordlist"),
            full_report: PathBuf::from("diversity.txt"),
            flat_report: PathBuf::from("diversity_files.txt"),
        }
    }
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("test"),
            fuzz_percent: 1.0,
            backend: ComparatorBackend::Process,
            compare_program: "compare".to_string(),
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
        }
    }
}

impl Settings {
    /// Load settings from an explicit file, or from `vash-tools.*` in the
    /// working directory when present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        Self::load_with(path, Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX).separator("__")
    }

    fn load_with(path: Option<&Path>, environment: config::Environment) -> Result<Self, AppError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings: Settings = config::Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), AppError> {
        if self.generator.program.trim().is_empty() {
            return Err(AppError::Settings(
                "generator.program must name an executable".to_string(),
            ));
        }
        if !(self.diversity.threshold > 0.0) {
            return Err(AppError::Settings(
                "diversity.threshold must be greater than 0".to_string(),
            ));
        }
        if !(self.diversity.cutoff > 0.0 && self.diversity.cutoff <= 1.0) {
            return Err(AppError::Settings(
                "diversity.cutoff must be within (0, 1]".to_string(),
            ));
        }
        if self.gallery.width == 0
            || self.gallery.height == 0
            || self.wordlist.width == 0
            || self.wordlist.height == 0
        {
            return Err(AppError::Settings(
                "image dimensions must be greater than 0".to_string(),
            ));
        }
        if self.check.fuzz_percent < 0.0 || self.check.fuzz_percent > 100.0 {
            return Err(AppError::Settings(
                "check.fuzz_percent must be between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }

    /// Worker count for batch drivers, never zero.
    pub fn concurrency(&self) -> usize {
        self.batch.concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_shipped_tooling() {
        let settings = Settings::default();
        assert_eq!(settings.generator.algorithm, "1.1");
        assert_eq!(settings.gallery.algorithm, "1-fast");
        assert_eq!((settings.gallery.width, settings.gallery.height), (256, 128));
        assert_eq!((settings.wordlist.width, settings.wordlist.height), (64, 64));
        assert_eq!(settings.diversity.threshold, 8.0);
        assert_eq!(settings.diversity.cutoff, 0.05);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_cutoff() {
        let mut settings = Settings::default();
        settings.diversity.cutoff = 1.5;
        assert!(matches!(settings.validate(), Err(AppError::Settings(_))));
    }

    #[test]
    fn rejects_empty_generator_program() {
        let mut settings = Settings::default();
        settings.generator.program.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn concurrency_is_never_zero() {
        let mut settings = Settings::default();
        settings.batch.concurrency = 0;
        assert_eq!(settings.concurrency(), 1);
    }

    #[test]
    fn loads_overrides_from_file() {
        let dir = std::env::temp_dir().join(format!("vash-tools-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.toml");
        std::fs::write(
            &path,
            "[diversity]\ncutoff = 0.1\nrule = \"channel_events\"\n\n[gallery]\ncount = 7\n",
        )
        .unwrap();

        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(settings.diversity.cutoff, 0.1);
        assert_eq!(settings.diversity.rule, DiversityRule::ChannelEvents);
        assert_eq!(settings.diversity.threshold, 8.0);
        assert_eq!(settings.gallery.count, 7);
        assert_eq!(settings.gallery.algorithm, "1-fast");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn environment_overrides_file_and_defaults() {
        let environment = Settings::environment().source(Some(config::Map::from([
            (
                "VASH__GENERATOR__PROGRAM".to_string(),
                "java -jar Other.jar".to_string(),
            ),
            ("VASH__DIVERSITY__CUTOFF".to_string(), "0.2".to_string()),
            ("VASH__GALLERY__COUNT".to_string(), "12".to_string()),
        ])));

        let settings = Settings::load_with(None, environment).unwrap();
        assert_eq!(settings.generator.program, "java -jar Other.jar");
        assert_eq!(settings.diversity.cutoff, 0.2);
        assert_eq!(settings.gallery.count, 12);
        assert_eq!(settings.generator.algorithm, "1.1");
    }

    #[test]
    fn blank_generator_program_from_environment_is_rejected() {
        let environment = Settings::environment().source(Some(config::Map::from([(
            "VASH__GENERATOR__PROGRAM".to_string(),
            "   ".to_string(),
        )])));

        assert!(matches!(
            Settings::load_with(None, environment),
            Err(AppError::Settings(_))
        ));
    }
}
