//! Time-to-first-frame measurement.

use std::sync::Arc;
use std::time::Duration;

use iptv_core::config::{ConnectionConfig, ProbeConfig};
use iptv_core::{ConnectionResult, Result, SessionEnd, StreamTarget};

use crate::session::ProbeSession;
use crate::source::{EventSource, ProbePlan};

/// Measures how long a stream takes to deliver its first frame.
#[derive(Clone)]
pub struct ConnectionAnalyzer {
    source: Arc<dyn EventSource>,
    probe: ProbeConfig,
    config: ConnectionConfig,
}

impl ConnectionAnalyzer {
    pub fn new(source: Arc<dyn EventSource>, probe: ProbeConfig, config: ConnectionConfig) -> Self {
        Self {
            source,
            probe,
            config,
        }
    }

    /// Timeout used by [`ConnectionAnalyzer::measure_default`].
    pub fn default_timeout(&self) -> Duration {
        self.config.timeout()
    }

    pub async fn measure_default(&self, target: &StreamTarget) -> Result<ConnectionResult> {
        self.measure(target, self.default_timeout()).await
    }

    /// Launch a minimal probe and time the first event that shows media.
    ///
    /// The session is closed as soon as that event arrives. No media before
    /// `timeout`, or a producer that fails first, gives a `failed` result;
    /// only a setup failure is returned as `Err`.
    pub async fn measure(&self, target: &StreamTarget, timeout: Duration) -> Result<ConnectionResult> {
        let plan = ProbePlan::first_frame(&self.probe, timeout);
        let mut session = ProbeSession::start(self.source.as_ref(), target, &plan).await?;

        let mut first_frame = None;
        while let Some(event) = session.next().await {
            if event.has_media() {
                first_frame = Some(event.elapsed);
                break;
            }
        }
        let summary = session.close().await;

        let result = match first_frame {
            Some(latency) => ConnectionResult::measured(latency, &self.config),
            None => ConnectionResult::failed(match summary.end {
                Some(SessionEnd::TimedOut) => {
                    format!("no frame within {:.1}s", timeout.as_secs_f64())
                }
                Some(SessionEnd::Completed) | None => "stream ended without a frame".to_string(),
                Some(end) => end.to_string(),
            }),
        };

        tracing::info!(
            stream = %target,
            ttff = %result.latency_label(),
            status = %result.status,
            "connection check finished"
        );
        Ok(result)
    }
}

impl std::fmt::Debug for ConnectionAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionAnalyzer")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
