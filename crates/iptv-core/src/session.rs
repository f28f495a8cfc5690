//! Raw probe observations and session terminal states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::duration_secs_f64;

/// One progress record emitted by the probing process.
///
/// Counters are cumulative since the process started. Fields the process did
/// not report (or reported as `N/A`) are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeEvent {
    /// Wall-clock time since the session started when the record completed.
    #[serde(with = "duration_secs_f64")]
    pub elapsed: Duration,
    /// Position in the stream's own timeline.
    #[serde(with = "duration_secs_f64::option")]
    pub stream_time: Option<Duration>,
    /// Processing speed relative to real time, as reported.
    pub speed: Option<f64>,
    pub frame_count: Option<u64>,
    pub dropped_frames: Option<u64>,
    pub duplicate_frames: Option<u64>,
    pub fps: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    pub total_size: Option<u64>,
    /// The process announced this as its last record.
    pub is_final: bool,
}

impl ProbeEvent {
    /// Whether the record shows that media actually flowed.
    pub fn has_media(&self) -> bool {
        self.frame_count.is_some_and(|f| f > 0)
            || self.stream_time.is_some_and(|t| t > Duration::ZERO)
    }
}

/// How a probe session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionEnd {
    /// The process exited cleanly after producing usable output.
    Completed,
    /// The wall-clock bound was reached and the process was terminated.
    TimedOut,
    /// The process crashed, exited non-zero, or produced nothing parseable.
    ProcessFailed {
        code: Option<i32>,
        detail: String,
    },
}

impl SessionEnd {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionEnd::Completed)
    }

    /// Short machine-friendly label.
    pub fn label(&self) -> &'static str {
        match self {
            SessionEnd::Completed => "completed",
            SessionEnd::TimedOut => "timed_out",
            SessionEnd::ProcessFailed { .. } => "process_failed",
        }
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Completed => f.write_str("completed"),
            SessionEnd::TimedOut => f.write_str("timed out"),
            SessionEnd::ProcessFailed {
                code: Some(code),
                detail,
            } => write!(f, "process failed (exit {code}): {detail}"),
            SessionEnd::ProcessFailed { code: None, detail } => {
                write!(f, "process failed: {detail}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_media_requires_progress() {
        let mut ev = ProbeEvent::default();
        assert!(!ev.has_media());
        ev.frame_count = Some(0);
        assert!(!ev.has_media());
        ev.stream_time = Some(Duration::from_millis(40));
        assert!(ev.has_media());
    }

    #[test]
    fn session_end_display() {
        assert_eq!(SessionEnd::TimedOut.to_string(), "timed out");
        let failed = SessionEnd::ProcessFailed {
            code: Some(1),
            detail: "Connection refused".into(),
        };
        assert_eq!(failed.to_string(), "process failed (exit 1): Connection refused");
        assert_eq!(failed.label(), "process_failed");
    }

    #[test]
    fn session_end_serializes_tagged() {
        let json = serde_json::to_value(SessionEnd::ProcessFailed {
            code: None,
            detail: "killed".into(),
        })
        .unwrap();
        assert_eq!(json["state"], "process_failed");
        assert_eq!(json["detail"], "killed");
    }
}
