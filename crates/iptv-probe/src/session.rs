//! Time-bounded probe sessions.
//!
//! A [`ProbeSession`] owns one running attachment from an [`EventSource`]
//! and turns its output into a lazy sequence of [`ProbeEvent`]s. The
//! session's deadline is enforced independently of the producer's output
//! cadence, so a silent producer is still torn down on time.
//!
//! The producer is released on every exit path:
//!
//! - natural end: the output closes and the producer is reaped;
//! - timeout: the producer is asked to stop, then killed after the grace
//!   period;
//! - early close: [`ProbeSession::close`] terminates it;
//! - drop without close: the producer is killed synchronously.

use std::time::{Duration, Instant};

use iptv_core::{ProbeEvent, Result, SessionEnd, StreamTarget};
use tokio::sync::mpsc;

use crate::progress::{ParseStats, ProgressParser};
use crate::source::{EventSource, ExitReport, ProbePlan, RawLine, SourceHandle};

/// What is known about a session once it is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    /// Terminal state; `None` when the consumer closed the session before the
    /// producer finished.
    pub end: Option<SessionEnd>,
    /// Wall time from start until the session ended or was closed.
    pub duration_observed: Duration,
    pub parse: ParseStats,
}

/// A single attachment to a stream.
pub struct ProbeSession {
    target: String,
    started: Instant,
    timeout: Duration,
    deadline: tokio::time::Instant,
    grace: Duration,
    lines: mpsc::Receiver<RawLine>,
    handle: Box<dyn SourceHandle>,
    parser: ProgressParser,
    end: Option<SessionEnd>,
    ended_at: Option<Instant>,
    released: bool,
}

impl ProbeSession {
    /// Start a session.
    ///
    /// # Errors
    ///
    /// Only setup failures (the producer could not be started) are returned;
    /// everything after a successful start is reported through
    /// [`ProbeSession::end`].
    pub async fn start(
        source: &dyn EventSource,
        target: &StreamTarget,
        plan: &ProbePlan,
    ) -> Result<Self> {
        let stream = source.start(target, plan).await?;
        let elapsed = stream.started.elapsed();
        let deadline = deadline_after(plan.timeout.saturating_sub(elapsed));

        tracing::info!(
            stream = %target,
            source = source.name(),
            timeout = ?plan.timeout,
            "probe session started"
        );

        Ok(Self {
            target: target.redacted(),
            started: stream.started,
            timeout: plan.timeout,
            deadline,
            grace: plan.grace,
            lines: stream.lines,
            handle: stream.handle,
            parser: ProgressParser::new(),
            end: None,
            ended_at: None,
            released: false,
        })
    }

    /// Next event in arrival order, or `None` once the session has ended.
    pub async fn next(&mut self) -> Option<ProbeEvent> {
        while self.end.is_none() {
            match tokio::time::timeout_at(self.deadline, self.lines.recv()).await {
                Ok(Some(line)) => {
                    if let Some(event) = self.parser.feed(&line.text, line.elapsed) {
                        tracing::trace!(
                            stream = %self.target,
                            elapsed = ?event.elapsed,
                            frames = ?event.frame_count,
                            speed = ?event.speed,
                            "probe event"
                        );
                        return Some(event);
                    }
                }
                Ok(None) => self.finish_naturally().await,
                Err(_) => self.finish_timed_out().await,
            }
        }
        None
    }

    /// Terminal state, once reached.
    pub fn end(&self) -> Option<&SessionEnd> {
        self.end.as_ref()
    }

    /// Time since the producer was started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn parse_stats(&self) -> ParseStats {
        self.parser.stats()
    }

    /// Release the producer and summarise the session.
    ///
    /// Closing before the sequence ended terminates the producer; the
    /// summary then carries no terminal state.
    pub async fn close(mut self) -> SessionSummary {
        if !self.released {
            tracing::debug!(stream = %self.target, "closing probe session early");
            self.ended_at = Some(Instant::now());
            self.handle.terminate(self.grace).await;
            self.released = true;
        }
        let ended_at = self.ended_at.unwrap_or_else(Instant::now);
        SessionSummary {
            end: self.end.clone(),
            duration_observed: ended_at.saturating_duration_since(self.started),
            parse: self.parser.stats(),
        }
    }

    async fn finish_naturally(&mut self) {
        self.ended_at = Some(Instant::now());
        // `finish` may wait twice (for the exit, then after the stop
        // request), so each wait gets half of what is left before the deadline.
        let remaining = self
            .deadline
            .saturating_duration_since(tokio::time::Instant::now());
        let report = self.handle.finish(self.grace.min(remaining / 2)).await;
        self.released = true;

        let end = natural_end(&report, self.parser.stats());
        match &end {
            SessionEnd::Completed => {
                tracing::info!(stream = %self.target, "probe session completed")
            }
            other => tracing::warn!(stream = %self.target, end = %other, "probe session failed"),
        }
        self.end = Some(end);
    }

    async fn finish_timed_out(&mut self) {
        self.ended_at = Some(Instant::now());
        tracing::info!(
            stream = %self.target,
            timeout = ?self.timeout,
            "probe session timed out; terminating"
        );
        let report = self.handle.terminate(self.grace).await;
        if report.forced {
            tracing::warn!(stream = %self.target, "probe process had to be killed");
        }
        self.released = true;
        self.end = Some(timed_out_end(self.parser.stats()));
    }
}

/// Deadline `timeout` from now, or far in the future when that overflows.
fn deadline_after(timeout: Duration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A producer that only ever printed unparseable lines failed, whether or
/// not it went on to hang.
fn timed_out_end(stats: ParseStats) -> SessionEnd {
    if stats.events == 0 && stats.lines_seen > 0 {
        return SessionEnd::ProcessFailed {
            code: None,
            detail: unparsed_detail(stats.lines_seen),
        };
    }
    SessionEnd::TimedOut
}

fn unparsed_detail(lines_seen: u64) -> String {
    format!("none of {lines_seen} output lines could be parsed")
}

/// Map how the producer exited onto a terminal state.
fn natural_end(report: &ExitReport, stats: ParseStats) -> SessionEnd {
    if report.overflowed {
        return SessionEnd::ProcessFailed {
            code: report.code,
            detail: "progress output overflowed the session buffer".into(),
        };
    }
    if !report.success {
        return SessionEnd::ProcessFailed {
            code: report.code,
            detail: report
                .diagnostics
                .clone()
                .unwrap_or_else(|| "exited before completing".into()),
        };
    }
    if stats.events == 0 {
        let detail = if stats.lines_seen == 0 {
            "no progress output".to_string()
        } else {
            unparsed_detail(stats.lines_seen)
        };
        return SessionEnd::ProcessFailed {
            code: report.code,
            detail,
        };
    }
    SessionEnd::Completed
}

impl Drop for ProbeSession {
    fn drop(&mut self) {
        if !self.released {
            tracing::debug!(stream = %self.target, "probe session dropped while running; killing");
            self.handle.kill_now();
        }
    }
}

impl std::fmt::Debug for ProbeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeSession")
            .field("target", &self.target)
            .field("timeout", &self.timeout)
            .field("end", &self.end)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
