//! Child processes (npm, git, build commands).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::{CoreError, Result};

/// Name of the npm executable on this platform.
pub fn npm_program() -> &'static str {
    if cfg!(windows) {
        "npm.cmd"
    } else {
        "npm"
    }
}

/// Captured output of a finished process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A command line to run in a directory with extra environment.
#[derive(Debug, Clone)]
pub struct Process {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl Process {
    pub fn new(program: impl Into<String>) -> Self {
        Process {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// A raw command line run through the platform shell.
    pub fn shell(command: &str) -> Self {
        if cfg!(windows) {
            Process::new("cmd").args(["/C", command])
        } else {
            Process::new("sh").args(["-c", command])
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn envs<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(vars);
        self
    }

    /// The command line as it would be typed.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run to completion capturing stdout and stderr.
    ///
    /// A non-zero exit is a [`CoreError::ProcessFailed`] carrying stderr
    /// (or stdout when stderr is empty).
    pub async fn output(&self) -> Result<ProcessOutput> {
        let output = self.output_unchecked().await?;
        if !output.success() {
            let captured = if output.stderr.trim().is_empty() {
                &output.stdout
            } else {
                &output.stderr
            };
            return Err(CoreError::ProcessFailed {
                command: self.display(),
                code: output.code,
                output: captured.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Run to completion capturing output whatever the exit status.
    /// Only a failure to start is an error.
    pub async fn output_unchecked(&self) -> Result<ProcessOutput> {
        tracing::debug!("running `{}`", self.display());
        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;
        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
        })
    }

    /// Run to completion with stdio inherited from tandem.
    pub async fn run(&self) -> Result<()> {
        tracing::debug!("running `{}`", self.display());
        let status = self
            .command()
            .status()
            .await
            .map_err(|e| self.spawn_error(e))?;
        if !status.success() {
            return Err(CoreError::ProcessFailed {
                command: self.display(),
                code: status.code(),
                output: "see output above".to_string(),
            });
        }
        Ok(())
    }

    fn spawn_error(&self, e: std::io::Error) -> CoreError {
        CoreError::ProcessFailed {
            command: self.display(),
            code: None,
            output: e.to_string(),
        }
    }
}
