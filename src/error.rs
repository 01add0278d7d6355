use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] InvalidImageError),
    #[error("Generator Error: {0}")]
    Generator(#[from] GeneratorError),
    #[error("Comparator Error: {0}")]
    Comparator(#[from] ComparatorError),
    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid settings: {0}")]
    Settings(String),
    #[error("Failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Raised when a pixel grid cannot be classified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidImageError {
    #[error("image has no pixels")]
    Empty,
    #[error("expected 3 channels, found {0}")]
    ChannelCount(usize),
    #[error("expected {expected} samples, found {found}")]
    SampleCount { expected: usize, found: usize },
}

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("No value passed for {0}")]
    InvalidParams(&'static str),
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}")]
    Failed {
        command: String,
        status: ExitStatus,
        transcript: Vec<u8>,
    },
    #[error("Generator did not produce {path}: {source}")]
    MissingOutput {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ComparatorError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {output}")]
    Failed {
        command: String,
        status: ExitStatus,
        output: String,
    },
    #[error("Could not read a metric from comparator output: {0:?}")]
    UnparsableMetric(String),
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Image dimensions differ: {left:?} vs {right:?}")]
    DimensionMismatch { left: (u32, u32), right: (u32, u32) },
    #[error("Failed to write diff image {path}: {source}")]
    WriteDiff {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Comparison task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
