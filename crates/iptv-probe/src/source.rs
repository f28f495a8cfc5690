//! Frame event sources: where progress lines come from.
//!
//! An [`EventSource`] starts one attachment to a stream and hands back a
//! [`SourceStream`]: a bounded channel of timestamped output lines plus a
//! [`SourceHandle`] that owns whatever produces them. Two implementations
//! exist:
//!
//! - [`ProcessSource`] spawns ffmpeg (or any command) and forwards its
//!   stdout line by line;
//! - [`FakeEventSource`] replays a script, for tests and dry runs.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use iptv_core::config::ProbeConfig;
use iptv_core::{Error, Result, StreamTarget};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::tools::ToolRegistry;

/// Number of stderr lines kept for failure diagnostics.
const STDERR_TAIL: usize = 8;

/// How long to wait for stderr to drain after the process exits.
const STDERR_DRAIN: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// What the attachment should observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// Play the stream for a monitoring window.
    Monitor { duration: Duration },
    /// Stop as soon as the first frame has been decoded.
    FirstFrame,
}

/// Parameters for a single attachment.
#[derive(Debug, Clone)]
pub struct ProbePlan {
    pub mode: ProbeMode,
    /// Hard wall-clock bound enforced by the session.
    pub timeout: Duration,
    /// Time a terminated producer gets before it is killed.
    pub grace: Duration,
    pub stats_period: Duration,
    pub rw_timeout: Duration,
    pub channel_capacity: usize,
}

impl ProbePlan {
    /// Plan for a quality monitoring window.
    pub fn monitor(config: &ProbeConfig) -> Self {
        Self {
            mode: ProbeMode::Monitor {
                duration: config.duration(),
            },
            timeout: config.timeout(),
            grace: config.grace_period(),
            stats_period: config.stats_period(),
            rw_timeout: config.rw_timeout(),
            channel_capacity: config.channel_capacity.max(1),
        }
    }

    /// Plan for a time-to-first-frame measurement.
    pub fn first_frame(config: &ProbeConfig, timeout: Duration) -> Self {
        Self {
            mode: ProbeMode::FirstFrame,
            timeout,
            // Fine-grained reporting so the first frame is seen promptly.
            stats_period: Duration::from_millis(100).min(config.stats_period()),
            rw_timeout: config.rw_timeout().min(timeout),
            ..Self::monitor(config)
        }
    }
}

// ---------------------------------------------------------------------------
// Source contract
// ---------------------------------------------------------------------------

/// One line of producer output, stamped with its arrival time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Time since the producer was started.
    pub elapsed: Duration,
    pub text: String,
}

/// How the producer ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    pub success: bool,
    /// The producer ignored the polite request and had to be killed.
    pub forced: bool,
    /// Output arrived faster than it was consumed and reading was abandoned.
    pub overflowed: bool,
    /// Last diagnostic lines the producer wrote, if any.
    pub diagnostics: Option<String>,
}

/// A running attachment.
pub struct SourceStream {
    pub started: Instant,
    pub lines: mpsc::Receiver<RawLine>,
    pub handle: Box<dyn SourceHandle>,
}

/// Exclusive owner of a running producer.
#[async_trait]
pub trait SourceHandle: Send {
    /// The output closed: wait up to `grace` for the producer to exit on its
    /// own, then force it.
    async fn finish(&mut self, grace: Duration) -> ExitReport;

    /// Stop the producer now: polite request first, forced after `grace`.
    async fn terminate(&mut self, grace: Duration) -> ExitReport;

    /// Synchronous last-resort kill for drop paths.
    fn kill_now(&mut self);
}

/// Something that can attach to a stream and emit progress lines.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Human-readable name identifying this source.
    fn name(&self) -> &'static str;

    /// Start one attachment.
    ///
    /// An `Err` means the attachment could not be established at all (for a
    /// process: binary missing, permission denied).
    async fn start(&self, target: &StreamTarget, plan: &ProbePlan) -> Result<SourceStream>;
}

// ---------------------------------------------------------------------------
// Process-backed source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum ArgStyle {
    Ffmpeg,
    /// Fixed arguments with `{url}`, `{duration}` and `{timeout}` placeholders.
    Template(Vec<String>),
}

/// Source that spawns an external process per attachment.
#[derive(Debug, Clone)]
pub struct ProcessSource {
    program: PathBuf,
    args: ArgStyle,
}

impl ProcessSource {
    /// Drive the ffmpeg binary at `path` with progress output on stdout.
    pub fn ffmpeg(path: impl Into<PathBuf>) -> Self {
        Self {
            program: path.into(),
            args: ArgStyle::Ffmpeg,
        }
    }

    /// Use the ffmpeg found by the registry.
    pub fn from_registry(tools: &ToolRegistry) -> Result<Self> {
        Ok(Self::ffmpeg(tools.require("ffmpeg")?))
    }

    /// Run an arbitrary command that prints ffmpeg-style progress on stdout.
    pub fn custom(
        program: impl Into<PathBuf>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: ArgStyle::Template(args.into_iter().map(Into::into).collect()),
        }
    }

    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    fn build_args(&self, target: &StreamTarget, plan: &ProbePlan) -> Vec<String> {
        match &self.args {
            ArgStyle::Ffmpeg => ffmpeg_args(target.url(), plan),
            ArgStyle::Template(template) => {
                let duration = match plan.mode {
                    ProbeMode::Monitor { duration } => secs_arg(duration),
                    ProbeMode::FirstFrame => secs_arg(plan.timeout),
                };
                let timeout = secs_arg(plan.timeout);
                template
                    .iter()
                    .map(|a| {
                        a.replace("{url}", target.url())
                            .replace("{duration}", &duration)
                            .replace("{timeout}", &timeout)
                    })
                    .collect()
            }
        }
    }
}

fn secs_arg(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64())
}

/// ffmpeg invocation: decode to the null muxer, progress as `key=value`
/// blocks on stdout, errors only on stderr.
fn ffmpeg_args(url: &str, plan: &ProbePlan) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-nostdin",
        "-loglevel",
        "error",
        "-nostats",
        "-progress",
        "pipe:1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.push("-stats_period".into());
    args.push(secs_arg(plan.stats_period));
    args.push("-rw_timeout".into());
    args.push(plan.rw_timeout.as_micros().to_string());
    args.push("-i".into());
    args.push(url.to_string());

    match plan.mode {
        ProbeMode::Monitor { duration } => {
            args.push("-t".into());
            args.push(secs_arg(duration));
        }
        ProbeMode::FirstFrame => {
            args.push("-frames:v".into());
            args.push("1".into());
        }
    }

    args.extend(["-f", "null", "-"].iter().map(|s| s.to_string()));
    args
}

#[async_trait]
impl EventSource for ProcessSource {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn start(&self, target: &StreamTarget, plan: &ProbePlan) -> Result<SourceStream> {
        let tool = self.tool_name();
        let args = self.build_args(target, plan);
        // Arguments carry the credentialed URL; log the redacted target only.
        tracing::debug!(tool = %tool, stream = %target, mode = ?plan.mode, "spawning probe process");

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::spawn(tool.clone(), e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::spawn(tool.clone(), "stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::spawn(tool.clone(), "stderr was not captured"))?;

        let (tx, rx) = mpsc::channel(plan.channel_capacity.max(1));
        let overflowed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(forward_lines(stdout, tx, started, overflowed.clone()));

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL)));
        let stderr_reader = tokio::spawn(collect_tail(stderr, tail.clone()));

        Ok(SourceStream {
            started,
            lines: rx,
            handle: Box::new(ProcessHandle {
                tool,
                child,
                reader,
                stderr_reader,
                tail,
                overflowed,
            }),
        })
    }
}

/// Forward stdout lines into the bounded channel.
///
/// A full channel means the consumer fell behind; reading stops and the
/// channel closes so the session tears the process down instead of
/// buffering without bound.
async fn forward_lines<R: AsyncRead + Unpin>(
    stream: R,
    tx: mpsc::Sender<RawLine>,
    started: Instant,
    overflowed: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = RawLine {
                    elapsed: started.elapsed(),
                    text: String::from_utf8_lossy(&buf).trim_end().to_string(),
                };
                match tx.try_send(line) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        overflowed.store(true, Ordering::Relaxed);
                        tracing::warn!("probe output channel full; abandoning process output");
                        break;
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "reading probe output failed");
                break;
            }
        }
    }
}

async fn collect_tail<R: AsyncRead + Unpin>(stream: R, tail: Arc<Mutex<VecDeque<String>>>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim().to_string();
                if line.is_empty() {
                    continue;
                }
                tracing::trace!(line = %line, "probe stderr");
                let mut tail = tail.lock();
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
    }
}

/// Exclusive owner of a spawned probe process.
struct ProcessHandle {
    tool: String,
    child: Child,
    reader: JoinHandle<()>,
    stderr_reader: JoinHandle<()>,
    tail: Arc<Mutex<VecDeque<String>>>,
    overflowed: Arc<AtomicBool>,
}

impl ProcessHandle {
    async fn report(&mut self, status: Option<ExitStatus>, forced: bool) -> ExitReport {
        if !self.stderr_reader.is_finished() {
            let _ = tokio::time::timeout(STDERR_DRAIN, &mut self.stderr_reader).await;
        }
        let tail = self.tail.lock();
        let diagnostics = (!tail.is_empty()).then(|| tail.iter().cloned().collect::<Vec<_>>().join(" | "));
        ExitReport {
            code: status.and_then(|s| s.code()),
            success: status.is_some_and(|s| s.success()),
            forced,
            overflowed: self.overflowed.load(Ordering::Relaxed),
            diagnostics,
        }
    }

    #[cfg(unix)]
    fn request_stop(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::debug!(tool = %self.tool, error = %e, "SIGTERM failed");
            }
        }
    }

    #[cfg(not(unix))]
    fn request_stop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(tool = %self.tool, error = %e, "kill failed");
        }
    }

    async fn stop(&mut self, grace: Duration) -> ExitReport {
        if let Ok(Some(status)) = self.child.try_wait() {
            return self.report(Some(status), false).await;
        }

        self.request_stop();
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => self.report(Some(status), false).await,
            _ => {
                tracing::warn!(tool = %self.tool, ?grace, "probe process ignored termination; killing");
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(tool = %self.tool, error = %e, "failed to kill probe process");
                }
                let status = self.child.try_wait().ok().flatten();
                self.report(status, true).await
            }
        }
    }
}

#[async_trait]
impl SourceHandle for ProcessHandle {
    async fn finish(&mut self, grace: Duration) -> ExitReport {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => self.report(Some(status), false).await,
            _ => self.stop(grace).await,
        }
    }

    async fn terminate(&mut self, grace: Duration) -> ExitReport {
        self.stop(grace).await
    }

    fn kill_now(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::trace!(tool = %self.tool, error = %e, "start_kill on exited process");
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.reader.abort();
        self.stderr_reader.abort();
    }
}

// ---------------------------------------------------------------------------
// Scripted source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum FakeStep {
    Line { at: Duration, text: String },
    Pause(Duration),
}

/// Replays scripted output lines instead of running a process.
///
/// `at` stamps are reported verbatim as arrival times, so sample timing is
/// deterministic; [`FakeEventSource::pause`] inserts real delays where a
/// test needs the session clock to move.
#[derive(Debug, Clone)]
pub struct FakeEventSource {
    steps: Vec<FakeStep>,
    exit_code: Option<i32>,
    hang: bool,
    start_error: Option<String>,
    terminations: Arc<AtomicUsize>,
}

impl Default for FakeEventSource {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            exit_code: Some(0),
            hang: false,
            start_error: None,
            terminations: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FakeEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a raw output line stamped `at`.
    pub fn line(mut self, at: Duration, text: impl Into<String>) -> Self {
        self.steps.push(FakeStep::Line {
            at,
            text: text.into(),
        });
        self
    }

    /// Emit a complete ffmpeg `-progress` block.
    pub fn progress(self, at: Duration, frame: u64, drops: u64, stream_secs: f64, speed: f64) -> Self {
        let out_time_us = (stream_secs * 1_000_000.0).round() as i64;
        self.line(at, format!("frame={frame}"))
            .line(at, "fps=25.00")
            .line(at, format!("out_time_us={out_time_us}"))
            .line(at, format!("drop_frames={drops}"))
            .line(at, format!("speed={speed:.3}x"))
            .line(at, "progress=continue")
    }

    /// Sleep for real before the next step.
    pub fn pause(mut self, d: Duration) -> Self {
        self.steps.push(FakeStep::Pause(d));
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Keep the output open forever after the script ends.
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Fail every `start` as if the binary were missing.
    pub fn failing_to_start(mut self, message: impl Into<String>) -> Self {
        self.start_error = Some(message.into());
        self
    }

    /// How many attachments were stopped before finishing on their own.
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for FakeEventSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn start(&self, _target: &StreamTarget, plan: &ProbePlan) -> Result<SourceStream> {
        if let Some(message) = &self.start_error {
            return Err(Error::spawn("fake", message.clone()));
        }

        let (tx, rx) = mpsc::channel(plan.channel_capacity.max(1));
        let steps = self.steps.clone();
        let hang = self.hang;
        let task = tokio::spawn(async move {
            for step in steps {
                match step {
                    FakeStep::Line { at, text } => {
                        if tx.send(RawLine { elapsed: at, text }).await.is_err() {
                            return;
                        }
                    }
                    FakeStep::Pause(d) => tokio::time::sleep(d).await,
                }
            }
            if hang {
                std::future::pending::<()>().await;
            }
        });

        Ok(SourceStream {
            started: Instant::now(),
            lines: rx,
            handle: Box::new(FakeHandle {
                task,
                exit_code: self.exit_code,
                terminations: self.terminations.clone(),
            }),
        })
    }
}

struct FakeHandle {
    task: JoinHandle<()>,
    exit_code: Option<i32>,
    terminations: Arc<AtomicUsize>,
}

impl FakeHandle {
    fn stop(&mut self) -> bool {
        if self.task.is_finished() {
            return false;
        }
        self.task.abort();
        self.terminations.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[async_trait]
impl SourceHandle for FakeHandle {
    async fn finish(&mut self, grace: Duration) -> ExitReport {
        if tokio::time::timeout(grace, &mut self.task).await.is_ok() {
            return ExitReport {
                code: self.exit_code,
                success: self.exit_code == Some(0),
                ..ExitReport::default()
            };
        }
        self.terminate(grace).await
    }

    async fn terminate(&mut self, _grace: Duration) -> ExitReport {
        if self.stop() {
            ExitReport::default()
        } else {
            ExitReport {
                code: self.exit_code,
                success: self.exit_code == Some(0),
                ..ExitReport::default()
            }
        }
    }

    fn kill_now(&mut self) {
        self.stop();
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ProbePlan {
        ProbePlan::monitor(&ProbeConfig::default())
    }

    #[test]
    fn ffmpeg_monitor_args() {
        let args = ffmpeg_args("http://h/live/1.ts", &plan());
        let joined = args.join(" ");
        assert!(joined.contains("-progress pipe:1"));
        assert!(joined.contains("-stats_period 1.000"));
        assert!(joined.contains("-rw_timeout 10000000"));
        assert!(joined.contains("-i http://h/live/1.ts -t 10.000"));
        assert!(joined.ends_with("-f null -"));
    }

    #[test]
    fn ffmpeg_first_frame_args() {
        let plan = ProbePlan::first_frame(&ProbeConfig::default(), Duration::from_secs(5));
        let joined = ffmpeg_args("http://h/1", &plan).join(" ");
        assert!(joined.contains("-frames:v 1"));
        assert!(!joined.contains(" -t "));
        assert!(joined.contains("-stats_period 0.100"));
        assert!(joined.contains("-rw_timeout 5000000"));
    }

    #[test]
    fn template_placeholders() {
        let source = ProcessSource::custom("sh", ["-c", "probe {url} {duration} {timeout}"]);
        let args = source.build_args(&StreamTarget::new("http://x/1"), &plan());
        assert_eq!(args, vec!["-c", "probe http://x/1 10.000 20.000"]);
    }

    #[tokio::test]
    async fn missing_binary_is_setup_failure() {
        let source = ProcessSource::ffmpeg("/nonexistent/ffmpeg_xyz_12345");
        let err = source
            .start(&StreamTarget::new("http://x/1"), &plan())
            .await
            .err()
            .unwrap();
        assert!(err.is_setup_failure(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn fake_replays_lines_in_order() {
        let source = FakeEventSource::new()
            .line(Duration::from_secs(1), "a=1")
            .line(Duration::from_secs(2), "b=2");
        let mut stream = source
            .start(&StreamTarget::new("fake://"), &plan())
            .await
            .unwrap();
        let first = stream.lines.recv().await.unwrap();
        let second = stream.lines.recv().await.unwrap();
        assert_eq!(first.text, "a=1");
        assert_eq!(second.elapsed, Duration::from_secs(2));
        assert!(stream.lines.recv().await.is_none());
        let report = stream.handle.finish(Duration::from_secs(1)).await;
        assert!(report.success);
        assert_eq!(source.terminations(), 0);
    }

    #[tokio::test]
    async fn fake_terminate_counts() {
        let source = FakeEventSource::new().hang();
        let mut stream = source
            .start(&StreamTarget::new("fake://"), &plan())
            .await
            .unwrap();
        let report = stream.handle.terminate(Duration::from_millis(10)).await;
        assert!(!report.success);
        assert_eq!(source.terminations(), 1);
    }
}
