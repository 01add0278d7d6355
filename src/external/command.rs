use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};

/// A program invocation: executable plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: OsString,
    args: Vec<OsString>,
}

/// Exit status and captured output of a finished process.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    /// Stdout followed by stderr.
    pub output: Vec<u8>,
}

impl CommandOutput {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl CommandLine {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Split a whitespace separated command string such as `java -jar Vash.jar`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).args(parts))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Space joined rendering used in logs and failure reports.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion with stdin closed, capturing stdout and stderr.
    pub async fn run(&self) -> std::io::Result<CommandOutput> {
        tracing::debug!("Running: {}", self.display());
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        let mut merged = output.stdout;
        merged.extend_from_slice(&output.stderr);
        Ok(CommandOutput {
            status: output.status,
            output: merged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whitespace_separated_program() {
        let command = CommandLine::parse("  java -jar   Vash.jar ").unwrap();
        assert_eq!(command.display(), "java -jar Vash.jar");
        assert!(CommandLine::parse("   ").is_none());
    }

    #[test]
    fn appends_arguments_in_order() {
        let command = CommandLine::new("gen").arg("--width").arg("64");
        assert_eq!(command.display(), "gen --width 64");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_then_stderr() {
        let result = CommandLine::new("sh")
            .arg("-c")
            .arg("printf out; printf err >&2; exit 3")
            .run()
            .await
            .unwrap();
        assert_eq!(result.status.code(), Some(3));
        assert_eq!(result.text(), "outerr");
    }

    #[tokio::test]
    async fn missing_program_is_an_io_error() {
        let result = CommandLine::new("vash-tools-definitely-not-installed").run().await;
        assert!(result.is_err());
    }
}
