use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::GeneratorError;
use crate::external::command::CommandLine;

/// Everything the generator needs to render one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateParams {
    pub data: String,
    pub algorithm: String,
    pub width: u32,
    pub height: u32,
    pub output: PathBuf,
}

impl GenerateParams {
    pub fn new(
        data: impl Into<String>,
        algorithm: impl Into<String>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data: data.into(),
            algorithm: algorithm.into(),
            width: 128,
            height: 128,
            output: output.into(),
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    fn validate(&self) -> Result<(), GeneratorError> {
        if self.algorithm.is_empty() {
            return Err(GeneratorError::InvalidParams("algorithm"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(GeneratorError::InvalidParams("output"));
        }
        Ok(())
    }
}

/// A finished render.
#[derive(Debug, Clone)]
pub struct Generation {
    /// The command line that produced the image.
    pub command: String,
    /// Everything the generator printed.
    pub transcript: Vec<u8>,
    /// Encoded image bytes as written to `GenerateParams::output`.
    pub image: Vec<u8>,
}

/// Renders images from input data.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, params: &GenerateParams) -> Result<Generation, GeneratorError>;
}

/// Runs the external generator executable.
#[derive(Debug, Clone)]
pub struct ProcessGenerator {
    program: CommandLine,
}

impl ProcessGenerator {
    pub fn new(program: CommandLine) -> Self {
        Self { program }
    }

    pub fn command_for(&self, params: &GenerateParams) -> CommandLine {
        self.program
            .clone()
            .arg("--width")
            .arg(params.width.to_string())
            .arg("--height")
            .arg(params.height.to_string())
            .arg("--data")
            .arg(&params.data)
            .arg("--algorithm")
            .arg(&params.algorithm)
            .arg("--output")
            .arg(&params.output)
    }
}

#[async_trait]
impl Generator for ProcessGenerator {
    async fn generate(&self, params: &GenerateParams) -> Result<Generation, GeneratorError> {
        params.validate()?;
        let command = self.command_for(params);
        let display = command.display();

        let finished = command.run().await.map_err(|source| GeneratorError::Spawn {
            command: display.clone(),
            source,
        })?;
        if !finished.status.success() {
            return Err(GeneratorError::Failed {
                command: display,
                status: finished.status,
                transcript: finished.output,
            });
        }

        let image = tokio::fs::read(&params.output)
            .await
            .map_err(|source| GeneratorError::MissingOutput {
                path: params.output.clone(),
                source,
            })?;

        Ok(Generation {
            command: display,
            transcript: finished.output,
            image,
        })
    }
}
