//! Quality samples and the classified result of a monitoring window.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::{duration_secs_f64, GradeThresholds};
use crate::session::SessionEnd;

/// A normalized observation derived from two consecutive probe events.
///
/// `elapsed` is strictly increasing across one session's samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySample {
    #[serde(with = "duration_secs_f64")]
    pub elapsed: Duration,
    pub speed_ratio: f64,
    pub frames_delta: u64,
    pub drops_delta: u64,
    pub is_stall: bool,
}

/// Grade derived from the stability score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilityGrade {
    Excellent,
    Good,
    Fair,
    Poor,
    Unstable,
    /// No samples were collected; the score carries no information.
    Unmeasured,
}

impl StabilityGrade {
    pub fn from_score(score: f64, thresholds: &GradeThresholds) -> Self {
        if score >= thresholds.excellent {
            StabilityGrade::Excellent
        } else if score >= thresholds.good {
            StabilityGrade::Good
        } else if score >= thresholds.fair {
            StabilityGrade::Fair
        } else if score >= thresholds.poor {
            StabilityGrade::Poor
        } else {
            StabilityGrade::Unstable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StabilityGrade::Excellent => "excellent",
            StabilityGrade::Good => "good",
            StabilityGrade::Fair => "fair",
            StabilityGrade::Poor => "poor",
            StabilityGrade::Unstable => "unstable",
            StabilityGrade::Unmeasured => "unmeasured",
        }
    }
}

impl fmt::Display for StabilityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a score deduction was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyKind {
    Buffering,
    DroppedFrames,
    SpeedInstability,
}

/// One deduction from the perfect score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    pub kind: PenaltyKind,
    pub points: f64,
    pub detail: String,
}

impl fmt::Display for Penalty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: -{:.1}", self.detail, self.points)
    }
}

/// Terminal output of a quality check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityResult {
    pub buffering_event_count: u32,
    pub dropped_frame_count: u64,
    pub frames_observed: u64,
    pub speed_variance: f64,
    /// Always within `[0, 100]`.
    pub stability_score: f64,
    pub sample_count: usize,
    /// Actual monitoring time, which is shorter than requested when the
    /// session ended early.
    #[serde(with = "duration_secs_f64")]
    pub duration_observed: Duration,
    /// Set when no samples were collected at all.
    pub insufficient_data: bool,
    pub grade: StabilityGrade,
    pub penalties: Vec<Penalty>,
    pub end: SessionEnd,
}

impl QualityResult {
    /// Attach the session's terminal state.
    pub fn with_end(mut self, end: SessionEnd) -> Self {
        self.end = end;
        self
    }

    /// The session did not run to natural completion.
    pub fn is_incomplete(&self) -> bool {
        !self.end.is_completed()
    }

    /// Score rendered for humans; never a bare `0` for a stream that was
    /// not measured.
    pub fn score_label(&self) -> String {
        if self.insufficient_data {
            "unmeasured".to_string()
        } else {
            format!("{:.1}", self.stability_score)
        }
    }

    /// `; `-joined penalty reasons or `No issues`.
    pub fn summary(&self) -> String {
        if self.insufficient_data {
            return format!("insufficient data ({})", self.end);
        }
        let mut parts: Vec<String> = self.penalties.iter().map(ToString::to_string).collect();
        if parts.is_empty() {
            parts.push("No issues".to_string());
        }
        if self.is_incomplete() {
            parts.push(format!("session {}", self.end));
        }
        parts.join("; ")
    }
}
