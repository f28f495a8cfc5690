//! Engine configuration types.
//!
//! Every section defaults sensibly so an empty document is valid. Thresholds
//! and penalty weights are policy; the defaults are tuned for live IPTV
//! streams watched over a consumer link.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Probe session / signal extraction
// ---------------------------------------------------------------------------

/// Settings for time-bounded probe sessions and sample extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Hard wall-clock bound for a whole session.
    pub timeout_secs: f64,
    /// Requested monitoring window for quality checks.
    pub duration_secs: f64,
    /// A gap between two progress records longer than this is a stall.
    pub stall_threshold_secs: f64,
    /// How often the probing process is asked to report progress.
    pub stats_period_secs: f64,
    /// Below this speed ratio a sample without frame progress is a stall.
    pub low_speed_threshold: f64,
    /// Upper clamp applied to speed ratios.
    pub max_speed_ratio: f64,
    /// How long a terminated process gets to exit before it is killed.
    pub grace_period_ms: u64,
    /// Capacity of the line channel between the reader and the session.
    pub channel_capacity: usize,
    /// Network read/write timeout passed to the probing process.
    pub rw_timeout_secs: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20.0,
            duration_secs: 10.0,
            stall_threshold_secs: 2.0,
            stats_period_secs: 1.0,
            low_speed_threshold: 0.5,
            max_speed_ratio: 10.0,
            grace_period_ms: 2000,
            channel_capacity: 256,
            rw_timeout_secs: 10.0,
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }

    pub fn duration(&self) -> Duration {
        secs(self.duration_secs)
    }

    pub fn stall_threshold(&self) -> Duration {
        secs(self.stall_threshold_secs)
    }

    pub fn stats_period(&self) -> Duration {
        secs(self.stats_period_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn rw_timeout(&self) -> Duration {
        secs(self.rw_timeout_secs)
    }

    /// Hard errors for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        bounded("probe.timeout_secs", self.timeout_secs)?;
        bounded("probe.duration_secs", self.duration_secs)?;
        bounded("probe.rw_timeout_secs", self.rw_timeout_secs)?;
        positive("probe.stall_threshold_secs", self.stall_threshold_secs)?;
        positive("probe.stats_period_secs", self.stats_period_secs)?;
        positive("probe.max_speed_ratio", self.max_speed_ratio)?;
        if self.low_speed_threshold < 0.0 {
            return Err(Error::Config(
                "probe.low_speed_threshold must not be negative".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("probe.channel_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Non-fatal issues worth telling the user about.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.duration_secs > self.timeout_secs {
            warnings.push(format!(
                "probe.duration_secs ({}) exceeds probe.timeout_secs ({}); sessions will time out before the window completes",
                self.duration_secs, self.timeout_secs
            ));
        }
        if self.stall_threshold_secs <= self.stats_period_secs {
            warnings.push(format!(
                "probe.stall_threshold_secs ({}) is not above the stats period ({}); every sample may count as a stall",
                self.stall_threshold_secs, self.stats_period_secs
            ));
        }
        warnings
    }
}

// ---------------------------------------------------------------------------
// Connection analysis
// ---------------------------------------------------------------------------

/// Time-to-first-frame probe settings and status buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub timeout_secs: f64,
    pub excellent_below_secs: f64,
    pub good_below_secs: f64,
    pub fair_below_secs: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10.0,
            excellent_below_secs: 1.0,
            good_below_secs: 3.0,
            fair_below_secs: 6.0,
        }
    }
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        bounded("connection.timeout_secs", self.timeout_secs)?;
        positive("connection.excellent_below_secs", self.excellent_below_secs)?;
        if !(self.excellent_below_secs < self.good_below_secs
            && self.good_below_secs < self.fair_below_secs)
        {
            return Err(Error::Config(
                "connection thresholds must be strictly increasing: excellent < good < fair".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stability scoring
// ---------------------------------------------------------------------------

/// Penalty weights for the 0-100 stability score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Points deducted per coalesced buffering event.
    pub buffering_penalty: f64,
    pub max_buffering_penalty: f64,
    /// Points deducted per percent of frames dropped.
    pub drop_penalty_per_percent: f64,
    pub max_drop_penalty: f64,
    /// Allowed RMS deviation of the speed ratio from 1.0 before penalties apply.
    pub speed_tolerance: f64,
    /// Points per unit of RMS deviation beyond the tolerance.
    pub speed_penalty_scale: f64,
    pub max_speed_penalty: f64,
    #[serde(default)]
    pub grades: GradeThresholds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            buffering_penalty: 15.0,
            max_buffering_penalty: 60.0,
            drop_penalty_per_percent: 3.5,
            max_drop_penalty: 35.0,
            speed_tolerance: 0.1,
            speed_penalty_scale: 70.0,
            max_speed_penalty: 35.0,
            grades: GradeThresholds::default(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("scoring.buffering_penalty", self.buffering_penalty),
            ("scoring.max_buffering_penalty", self.max_buffering_penalty),
            ("scoring.drop_penalty_per_percent", self.drop_penalty_per_percent),
            ("scoring.max_drop_penalty", self.max_drop_penalty),
            ("scoring.speed_tolerance", self.speed_tolerance),
            ("scoring.speed_penalty_scale", self.speed_penalty_scale),
            ("scoring.max_speed_penalty", self.max_speed_penalty),
        ] {
            if value.is_nan() || value < 0.0 {
                return Err(Error::Config(format!("{name} must be a non-negative number")));
            }
        }
        self.grades.validate()
    }
}

/// Lower score bounds for each stability grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeThresholds {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub poor: f64,
}

impl Default for GradeThresholds {
    fn default() -> Self {
        Self {
            excellent: 90.0,
            good: 75.0,
            fair: 50.0,
            poor: 30.0,
        }
    }
}

impl GradeThresholds {
    pub fn validate(&self) -> Result<()> {
        if !(self.excellent > self.good && self.good > self.fair && self.fair > self.poor) {
            return Err(Error::Config(
                "grade thresholds must be strictly decreasing: excellent > good > fair > poor".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// External tools
// ---------------------------------------------------------------------------

/// Optional overrides for external tool locations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Longest accepted timeout or window, one day.
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

fn positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be a positive number, got {value}")))
    }
}

fn bounded(name: &str, value: f64) -> Result<()> {
    positive(name, value)?;
    if value > MAX_TIMEOUT_SECS {
        return Err(Error::Config(format!(
            "{name} must be at most {MAX_TIMEOUT_SECS} seconds, got {value}"
        )));
    }
    Ok(())
}

/// Serde helpers to (de)serialize `Duration` as fractional seconds.
pub mod duration_secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }

    /// Same encoding for `Option<Duration>`.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> std::result::Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => serializer.serialize_some(&d.as_secs_f64()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(
            deserializer: D,
        ) -> std::result::Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let secs = Option::<f64>::deserialize(deserializer)?;
            secs.map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
