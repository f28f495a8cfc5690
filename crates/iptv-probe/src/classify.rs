//! Quality classification: samples to metrics and a stability score.
//!
//! The score starts at 100 and loses points for three things, each capped
//! by its own maximum:
//!
//! - buffering: a fixed amount per buffering event, where a run of
//!   consecutive stalled samples is one event;
//! - dropped frames: proportional to the percentage of frames dropped;
//! - speed instability: proportional to how far the RMS deviation of the
//!   speed ratio from 1.0 exceeds the tolerance, over samples that made
//!   frame progress.
//!
//! The final score is clamped to `[0, 100]` and rounded to one decimal.

use std::time::Duration;

use iptv_core::config::ScoringConfig;
use iptv_core::{
    Penalty, PenaltyKind, QualityResult, QualitySample, SessionEnd, StabilityGrade,
};

/// Turns a finished sample sequence into a [`QualityResult`].
#[derive(Debug, Clone, Default)]
pub struct QualityClassifier {
    config: ScoringConfig,
}

/// Speed statistics over samples with frame progress.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SpeedStats {
    mean: f64,
    variance: f64,
}

impl SpeedStats {
    fn of(samples: &[QualitySample]) -> Option<Self> {
        let speeds: Vec<f64> = samples
            .iter()
            .filter(|s| s.frames_delta > 0)
            .map(|s| s.speed_ratio)
            .collect();
        if speeds.is_empty() {
            return None;
        }
        let n = speeds.len() as f64;
        let mean = speeds.iter().sum::<f64>() / n;
        let variance = speeds.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self { mean, variance })
    }

    /// Root-mean-square deviation from real-time playback.
    fn rms_deviation(&self) -> f64 {
        (self.variance + (self.mean - 1.0).powi(2)).sqrt()
    }
}

impl QualityClassifier {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Classify a finished session's samples.
    ///
    /// The result's `end` is [`SessionEnd::Completed`]; attach the real
    /// terminal state with [`QualityResult::with_end`].
    pub fn classify(&self, samples: &[QualitySample], duration_observed: Duration) -> QualityResult {
        if samples.is_empty() {
            return QualityResult {
                buffering_event_count: 0,
                dropped_frame_count: 0,
                frames_observed: 0,
                speed_variance: 0.0,
                stability_score: 0.0,
                sample_count: 0,
                duration_observed,
                insufficient_data: true,
                grade: StabilityGrade::Unmeasured,
                penalties: Vec::new(),
                end: SessionEnd::Completed,
            };
        }

        let buffering_event_count = count_stall_runs(samples);
        let dropped_frame_count: u64 = samples.iter().map(|s| s.drops_delta).sum();
        let frames_observed: u64 = samples.iter().map(|s| s.frames_delta).sum();
        let speed = SpeedStats::of(samples);

        let mut penalties = Vec::new();
        if let Some(p) = self.buffering_penalty(buffering_event_count) {
            penalties.push(p);
        }
        if let Some(p) = self.drop_penalty(dropped_frame_count, frames_observed) {
            penalties.push(p);
        }
        if let Some(p) = speed.and_then(|s| self.speed_penalty(s)) {
            penalties.push(p);
        }

        let deducted: f64 = penalties.iter().map(|p| p.points).sum();
        let stability_score = round_tenth((100.0 - deducted).clamp(0.0, 100.0));

        QualityResult {
            buffering_event_count,
            dropped_frame_count,
            frames_observed,
            speed_variance: speed.map_or(0.0, |s| s.variance),
            stability_score,
            sample_count: samples.len(),
            duration_observed,
            insufficient_data: false,
            grade: StabilityGrade::from_score(stability_score, &self.config.grades),
            penalties,
            end: SessionEnd::Completed,
        }
    }

    fn buffering_penalty(&self, events: u32) -> Option<Penalty> {
        if events == 0 {
            return None;
        }
        let points = (f64::from(events) * self.config.buffering_penalty)
            .min(self.config.max_buffering_penalty);
        Some(Penalty {
            kind: PenaltyKind::Buffering,
            points,
            detail: format!("Rebuffering (x{events})"),
        })
    }

    fn drop_penalty(&self, dropped: u64, frames: u64) -> Option<Penalty> {
        if dropped == 0 {
            return None;
        }
        let percent = dropped as f64 / (frames + dropped) as f64 * 100.0;
        let points = (percent * self.config.drop_penalty_per_percent).min(self.config.max_drop_penalty);
        Some(Penalty {
            kind: PenaltyKind::DroppedFrames,
            points,
            detail: format!("Dropped frames ({dropped}, {percent:.1}%)"),
        })
    }

    fn speed_penalty(&self, speed: SpeedStats) -> Option<Penalty> {
        let rms = speed.rms_deviation();
        let excess = rms - self.config.speed_tolerance;
        if excess.is_nan() || excess <= 0.0 {
            return None;
        }
        let points = (excess * self.config.speed_penalty_scale).min(self.config.max_speed_penalty);
        Some(Penalty {
            kind: PenaltyKind::SpeedInstability,
            points,
            detail: format!("Unstable speed (deviation {rms:.2})"),
        })
    }
}

/// Number of maximal runs of consecutive stalled samples.
fn count_stall_runs(samples: &[QualitySample]) -> u32 {
    let mut runs = 0;
    let mut in_run = false;
    for sample in samples {
        if sample.is_stall && !in_run {
            runs += 1;
        }
        in_run = sample.is_stall;
    }
    runs
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
