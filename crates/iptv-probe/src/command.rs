//! One-shot runs of ffprobe and friends.
//!
//! Stream URLs carry account credentials, so a [`ToolCommand`] keeps the
//! real URL out of its logs and error messages.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use iptv_core::{Error, Result, StreamTarget};
use tokio::process::Command;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured output of a successful run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
struct Arg {
    value: String,
    /// Shown instead of `value` in logs and errors
    display: Option<String>,
}

/// Builder for a bounded, output-capturing tool invocation.
///
/// ```no_run
/// use iptv_core::StreamTarget;
/// use iptv_probe::ToolCommand;
/// use std::time::Duration;
///
/// # async fn example() -> iptv_core::Result<()> {
/// let target = StreamTarget::new("http://line.example/live/user/pass/1.ts");
/// let output = ToolCommand::new("ffprobe", "/usr/bin/ffprobe")
///     .args(["-v", "error", "-show_streams"])
///     .target(&target)
///     .timeout(Duration::from_secs(10))
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    tool: String,
    program: std::path::PathBuf,
    args: Vec<Arg>,
    timeout: Duration,
}

impl ToolCommand {
    /// `tool` names the program in errors; `program` is what gets spawned.
    pub fn new(tool: impl Into<String>, program: impl AsRef<Path>) -> Self {
        Self {
            tool: tool.into(),
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            display: None,
        });
        self
    }

    pub fn args(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for value in values {
            self = self.arg(value);
        }
        self
    }

    /// Append the stream URL, redacted wherever it is reported.
    pub fn target(mut self, target: &StreamTarget) -> Self {
        self.args.push(Arg {
            value: target.url().to_string(),
            display: Some(target.redacted()),
        });
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command_line(&self) -> String {
        let mut line = self.tool.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg.display.as_deref().unwrap_or(&arg.value));
        }
        line
    }

    /// Run to completion, killing the process if `timeout` passes first.
    ///
    /// A spawn failure is [`Error::Spawn`]; a timeout or non-zero exit is
    /// [`Error::Tool`] carrying the last line of stderr.
    pub async fn execute(&self) -> Result<ToolOutput> {
        tracing::debug!(tool = %self.tool, command = %self.command_line(), "running tool");

        let child = Command::new(&self.program)
            .args(self.args.iter().map(|a| a.value.as_str()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::spawn(&self.tool, e.to_string()))?;

        let started = Instant::now();
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::tool(
                    &self.tool,
                    format!("no result within {:.1}s", self.timeout.as_secs_f64()),
                )
            })?
            .map_err(|e| Error::tool(&self.tool, format!("waiting for exit: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(Error::tool(&self.tool, format!("exit {code}: {}", last.trim())));
        }

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
            elapsed: started.elapsed(),
        })
    }
}
