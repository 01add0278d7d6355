use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;

use vash_tools::analysis::{DiversityClassifier, DiversityRule};
use vash_tools::batch::flat_filter::check_file;
use vash_tools::batch::gallery::default_keys;
use vash_tools::batch::regression::all_passed;
use vash_tools::batch::{GalleryDriver, RegressionCheck, StatsDriver, WordlistDriver};
use vash_tools::config::{ComparatorBackend, Settings};
use vash_tools::error::AppError;
use vash_tools::external::{
    CommandLine, Generator, ImageComparator, PixelComparator, ProcessComparator, ProcessGenerator,
};

#[derive(Parser)]
#[command(author, version, about = "Tooling around the Vash image generator", long_about = None)]
struct Cli {
    /// Settings file (defaults to ./vash-tools.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    log_level: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one image; exits with status 1 when it is flat
    Isflat {
        image: PathBuf,
    },
    /// Score every image in a directory and write sorted diversity reports
    Stats {
        /// Directory of images (default: wordlist)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Full `<score> <file>` listing
        #[arg(long)]
        full_report: Option<PathBuf>,
        /// Names scoring below the cutoff
        #[arg(long)]
        flat_report: Option<PathBuf>,
        #[arg(long, value_enum)]
        rule: Option<DiversityRule>,
    },
    /// Render numbered seeds into the gallery directory
    Gallery {
        /// Generator command line, e.g. "java -jar Vash.jar"
        #[arg(long = "exec")]
        exec: Option<String>,
        /// Number of seeds when no keys are given
        #[arg(long)]
        count: Option<u32>,
        /// Print every command and its output instead of saving transcripts
        #[arg(long)]
        verbose: bool,
        /// Explicit seed numbers
        keys: Vec<u32>,
    },
    /// Render every dictionary word through the generator
    Wordlist {
        /// Skip dictionary lines that sort before this word
        start: Option<String>,
        #[arg(long)]
        dict_dir: Option<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Compare rendered results against the goal images
    Check {
        /// Directory holding goal/, results/ and diff/
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long, value_enum)]
        backend: Option<ComparatorBackend>,
    },
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn generator_from(
    settings: &Settings,
    exec: Option<&str>,
) -> Result<Arc<dyn Generator>, AppError> {
    let program = CommandLine::parse(exec.unwrap_or(&settings.generator.program))
        .ok_or_else(|| AppError::Settings("generator command is empty".to_string()))?;
    Ok(Arc::new(ProcessGenerator::new(program)))
}

fn comparator_from(
    settings: &Settings,
    backend: ComparatorBackend,
) -> Result<Arc<dyn ImageComparator>, AppError> {
    let fuzz = settings.check.fuzz_percent;
    let comparator: Arc<dyn ImageComparator> = match backend {
        ComparatorBackend::Process => {
            let program = CommandLine::parse(&settings.check.compare_program).ok_or_else(|| {
                AppError::Settings("check.compare_program is empty".to_string())
            })?;
            Arc::new(ProcessComparator::new(program).with_fuzz_percent(fuzz))
        }
        ComparatorBackend::Pixel => Arc::new(PixelComparator::new().with_fuzz_percent(fuzz)),
    };
    Ok(comparator)
}

#[tokio::main]
async fn main() -> Result<ExitCode, AppError> {
    let cli = Cli::parse();
    init_logging(cli.log_level);
    let mut settings = Settings::load(cli.config.as_deref())?;
    let concurrency = settings.concurrency();

    match cli.command {
        Commands::Isflat { image } => {
            let classifier = DiversityClassifier::from_settings(&settings.diversity)
                .with_rule(DiversityRule::PerPixel);
            let (diversity, line) = check_file(&classifier, &image)?;
            println!("{line}");
            Ok(if diversity.verdict.is_flat() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Stats {
            dir,
            full_report,
            flat_report,
            rule,
        } => {
            if let Some(rule) = rule {
                settings.diversity.rule = rule;
            }
            let stats = settings.stats;
            StatsDriver::new(DiversityClassifier::from_settings(&settings.diversity))
                .with_concurrency(concurrency)
                .run(
                    &dir.unwrap_or(stats.input_dir),
                    &full_report.unwrap_or(stats.full_report),
                    &flat_report.unwrap_or(stats.flat_report),
                )
                .await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Gallery {
            exec,
            count,
            verbose,
            keys,
        } => {
            let generator = generator_from(&settings, exec.as_deref())?;
            let keys = if keys.is_empty() {
                default_keys(count.unwrap_or(settings.gallery.count))
            } else {
                keys
            };
            let summary = GalleryDriver::new(generator, settings.gallery)
                .with_verbose(verbose)
                .with_concurrency(concurrency)
                .run(&keys)
                .await?;
            Ok(if summary.failed.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Wordlist {
            start,
            dict_dir,
            out_dir,
        } => {
            let generator = generator_from(&settings, None)?;
            let mut wordlist = settings.wordlist;
            if let Some(dict_dir) = dict_dir {
                wordlist.dict_dir = dict_dir;
            }
            if let Some(out_dir) = out_dir {
                wordlist.output_dir = out_dir;
            }
            WordlistDriver::new(generator, wordlist, settings.generator.algorithm)
                .with_concurrency(concurrency)
                .run(start.as_deref())
                .await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { root, backend } => {
            let backend = backend.unwrap_or(settings.check.backend);
            let comparator = comparator_from(&settings, backend)?;
            let reports = RegressionCheck::new(comparator, root.unwrap_or(settings.check.root))
                .with_concurrency(concurrency)
                .run()
                .await?;
            Ok(if all_passed(&reports) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
