//! Quality checks: one monitoring session, extracted and classified.

use std::sync::Arc;

use iptv_core::config::{ProbeConfig, ScoringConfig};
use iptv_core::{QualityResult, Result, SessionEnd, StreamTarget};

use crate::classify::QualityClassifier;
use crate::extract::{ExtractorSettings, SignalExtractor};
use crate::session::ProbeSession;
use crate::source::{EventSource, ProbePlan};

/// Runs quality checks against streams using a shared event source.
#[derive(Clone)]
pub struct QualityMonitor {
    source: Arc<dyn EventSource>,
    probe: ProbeConfig,
    classifier: QualityClassifier,
}

impl QualityMonitor {
    pub fn new(source: Arc<dyn EventSource>, probe: ProbeConfig, scoring: ScoringConfig) -> Self {
        Self {
            source,
            probe,
            classifier: QualityClassifier::new(scoring),
        }
    }

    /// Monitor `target` for the configured window and classify what was seen.
    ///
    /// Timeouts, crashes and unparseable output are reported in the result's
    /// `end`; only a setup failure is returned as `Err`.
    pub async fn check(&self, target: &StreamTarget) -> Result<QualityResult> {
        let plan = ProbePlan::monitor(&self.probe);
        let mut session = ProbeSession::start(self.source.as_ref(), target, &plan).await?;
        let mut extractor = SignalExtractor::new(ExtractorSettings::from_config(&self.probe));

        let mut samples = Vec::new();
        while let Some(event) = session.next().await {
            if let Some(sample) = extractor.push(event) {
                if sample.is_stall {
                    tracing::debug!(stream = %target, elapsed = ?sample.elapsed, "stall detected");
                }
                samples.push(sample);
            }
        }

        let summary = session.close().await;
        let end = summary.end.unwrap_or(SessionEnd::Completed);
        let result = self
            .classifier
            .classify(&samples, summary.duration_observed)
            .with_end(end);

        tracing::info!(
            stream = %target,
            score = %result.score_label(),
            grade = %result.grade,
            buffering = result.buffering_event_count,
            dropped = result.dropped_frame_count,
            samples = result.sample_count,
            end = result.end.label(),
            "quality check finished"
        );
        Ok(result)
    }
}

impl std::fmt::Debug for QualityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityMonitor")
            .field("source", &self.source.name())
            .field("probe", &self.probe)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FakeEventSource;
    use assert_matches::assert_matches;
    use iptv_core::StabilityGrade;
    use std::time::Duration;

    fn monitor(source: FakeEventSource, timeout_secs: f64) -> QualityMonitor {
        let probe = ProbeConfig {
            timeout_secs,
            grace_period_ms: 50,
            ..ProbeConfig::default()
        };
        QualityMonitor::new(Arc::new(source), probe, ScoringConfig::default())
    }

    fn steady_source(blocks: u64) -> FakeEventSource {
        (1..=blocks).fold(FakeEventSource::new(), |src, i| {
            src.progress(Duration::from_secs(i), i * 25, 0, i as f64, 1.0)
        })
    }

    #[tokio::test]
    async fn steady_stream_is_excellent() {
        let result = monitor(steady_source(11), 20.0)
            .check(&StreamTarget::new("fake://1"))
            .await
            .unwrap();
        assert_eq!(result.sample_count, 10);
        assert_eq!(result.stability_score, 100.0);
        assert_eq!(result.grade, StabilityGrade::Excellent);
        assert_eq!(result.end, SessionEnd::Completed);
    }

    #[tokio::test]
    async fn gap_in_output_counts_as_buffering() {
        let source = steady_source(4)
            .progress(Duration::from_secs(8), 125, 0, 5.0, 0.3)
            .progress(Duration::from_secs(9), 150, 0, 6.0, 1.0);
        let result = monitor(source, 20.0)
            .check(&StreamTarget::new("fake://1"))
            .await
            .unwrap();
        assert_eq!(result.buffering_event_count, 1);
        assert!(result.stability_score < 100.0);
    }

    #[tokio::test]
    async fn silent_stream_times_out_unmeasured() {
        let source = FakeEventSource::new().hang();
        let result = monitor(source.clone(), 0.2)
            .check(&StreamTarget::new("fake://1"))
            .await
            .unwrap();
        assert!(result.insufficient_data);
        assert_eq!(result.end, SessionEnd::TimedOut);
        assert_eq!(result.score_label(), "unmeasured");
        assert_eq!(source.terminations(), 1);
    }

    #[tokio::test]
    async fn crash_mid_stream_keeps_samples() {
        let source = steady_source(4).exit_code(139);
        let result = monitor(source, 20.0)
            .check(&StreamTarget::new("fake://1"))
            .await
            .unwrap();
        assert_eq!(result.sample_count, 3);
        assert!(result.is_incomplete());
        assert_matches!(result.end, SessionEnd::ProcessFailed { code: Some(139), .. });
    }

    #[tokio::test]
    async fn setup_failure_is_an_error() {
        let source = FakeEventSource::new().failing_to_start("permission denied");
        let err = monitor(source, 1.0)
            .check(&StreamTarget::new("fake://1"))
            .await
            .unwrap_err();
        assert!(err.is_setup_failure());
    }
}
