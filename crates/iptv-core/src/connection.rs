//! Time-to-first-frame result and status buckets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::{duration_secs_f64, ConnectionConfig};

/// Bucketed connection latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Excellent,
    Good,
    Fair,
    Slow,
    /// Timed out or the probing process failed before the first frame.
    Failed,
}

impl ConnectionStatus {
    /// Bucket a measured time-to-first-frame.
    pub fn from_latency(latency: Duration, config: &ConnectionConfig) -> Self {
        let secs = latency.as_secs_f64();
        if secs < config.excellent_below_secs {
            ConnectionStatus::Excellent
        } else if secs < config.good_below_secs {
            ConnectionStatus::Good
        } else if secs < config.fair_below_secs {
            ConnectionStatus::Fair
        } else {
            ConnectionStatus::Slow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Excellent => "excellent",
            ConnectionStatus::Good => "good",
            ConnectionStatus::Fair => "fair",
            ConnectionStatus::Slow => "slow",
            ConnectionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a connection probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionResult {
    #[serde(with = "duration_secs_f64::option")]
    pub time_to_first_frame: Option<Duration>,
    pub status: ConnectionStatus,
    /// Why the probe failed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ConnectionResult {
    pub fn measured(latency: Duration, config: &ConnectionConfig) -> Self {
        Self {
            time_to_first_frame: Some(latency),
            status: ConnectionStatus::from_latency(latency, config),
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            time_to_first_frame: None,
            status: ConnectionStatus::Failed,
            detail: Some(detail.into()),
        }
    }

    /// Latency in seconds or `failed`.
    pub fn latency_label(&self) -> String {
        match self.time_to_first_frame {
            Some(d) => format!("{:.2}", d.as_secs_f64()),
            None => "failed".to_string(),
        }
    }
}
