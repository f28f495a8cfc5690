//! Signal extraction: consecutive probe events to quality samples.

use std::time::Duration;

use iptv_core::config::ProbeConfig;
use iptv_core::{ProbeEvent, QualitySample};

/// Thresholds used when deriving samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorSettings {
    /// A wall-clock gap between events longer than this is a stall.
    pub stall_threshold: Duration,
    /// Speed below this with no frame progress is a stall.
    pub low_speed_threshold: f64,
    /// Upper clamp for speed ratios.
    pub max_speed_ratio: f64,
}

impl ExtractorSettings {
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            stall_threshold: config.stall_threshold(),
            low_speed_threshold: config.low_speed_threshold,
            max_speed_ratio: config.max_speed_ratio,
        }
    }
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self::from_config(&ProbeConfig::default())
    }
}

/// Derive a sample from `event` relative to `previous`.
///
/// The first event of a session has no previous one and only seeds the
/// baseline, so it yields `None`. Counters that went backwards (a restarted
/// producer) give a zero delta.
pub fn extract(
    event: &ProbeEvent,
    previous: Option<&ProbeEvent>,
    settings: &ExtractorSettings,
) -> Option<QualitySample> {
    let previous = previous?;

    let frames_delta = counter_delta(event.frame_count, previous.frame_count);
    let drops_delta = counter_delta(event.dropped_frames, previous.dropped_frames);
    let wall_delta = event.elapsed.saturating_sub(previous.elapsed);
    let speed_ratio = speed_ratio(event, previous, wall_delta, settings.max_speed_ratio);

    let is_stall = wall_delta > settings.stall_threshold
        || (speed_ratio < settings.low_speed_threshold && frames_delta == 0);

    Some(QualitySample {
        elapsed: event.elapsed,
        speed_ratio,
        frames_delta,
        drops_delta,
        is_stall,
    })
}

fn counter_delta(current: Option<u64>, previous: Option<u64>) -> u64 {
    match (current, previous) {
        (Some(c), Some(p)) => c.saturating_sub(p),
        _ => 0,
    }
}

/// Stream time advanced per unit of wall time over the interval, falling
/// back to the producer's own figure when stream time is unusable.
fn speed_ratio(event: &ProbeEvent, previous: &ProbeEvent, wall_delta: Duration, max: f64) -> f64 {
    let measured = match (event.stream_time, previous.stream_time) {
        (Some(now), Some(before)) if now >= before && !wall_delta.is_zero() => {
            Some((now - before).as_secs_f64() / wall_delta.as_secs_f64())
        }
        _ => None,
    };
    let ratio = measured.or(event.speed).unwrap_or(0.0);
    if ratio.is_finite() {
        ratio.clamp(0.0, max)
    } else {
        0.0
    }
}

/// Stateful wrapper that remembers the previous event and keeps sample
/// timestamps strictly increasing.
#[derive(Debug, Default)]
pub struct SignalExtractor {
    settings: ExtractorSettings,
    previous: Option<ProbeEvent>,
    last_elapsed: Option<Duration>,
}

impl SignalExtractor {
    pub fn new(settings: ExtractorSettings) -> Self {
        Self {
            settings,
            previous: None,
            last_elapsed: None,
        }
    }

    /// Feed the next event in arrival order.
    pub fn push(&mut self, event: ProbeEvent) -> Option<QualitySample> {
        let sample = extract(&event, self.previous.as_ref(), &self.settings).map(|mut s| {
            if let Some(last) = self.last_elapsed {
                if s.elapsed <= last {
                    s.elapsed = last + Duration::from_micros(1);
                }
            }
            self.last_elapsed = Some(s.elapsed);
            s
        });
        self.previous = Some(event);
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(secs: f64, stream_secs: f64, frames: u64, drops: u64) -> ProbeEvent {
        ProbeEvent {
            elapsed: Duration::from_secs_f64(secs),
            stream_time: Some(Duration::from_secs_f64(stream_secs)),
            frame_count: Some(frames),
            dropped_frames: Some(drops),
            ..ProbeEvent::default()
        }
    }

    #[test]
    fn first_event_seeds_baseline() {
        let settings = ExtractorSettings::default();
        assert_eq!(extract(&event(1.0, 1.0, 25, 0), None, &settings), None);
    }

    #[test]
    fn steady_playback() {
        let settings = ExtractorSettings::default();
        let s = extract(&event(2.0, 2.0, 50, 1), Some(&event(1.0, 1.0, 25, 0)), &settings).unwrap();
        assert_eq!(s.frames_delta, 25);
        assert_eq!(s.drops_delta, 1);
        assert!((s.speed_ratio - 1.0).abs() < 1e-9);
        assert!(!s.is_stall);
    }

    #[test]
    fn long_gap_is_stall() {
        let settings = ExtractorSettings::default();
        let s = extract(&event(5.0, 2.0, 50, 0), Some(&event(1.0, 1.0, 25, 0)), &settings).unwrap();
        assert!(s.is_stall);
    }

    #[test]
    fn slow_without_frames_is_stall() {
        let settings = ExtractorSettings::default();
        let s = extract(&event(2.0, 1.2, 25, 0), Some(&event(1.0, 1.0, 25, 0)), &settings).unwrap();
        assert_eq!(s.frames_delta, 0);
        assert!(s.speed_ratio < 0.5);
        assert!(s.is_stall);
    }

    #[test]
    fn slow_with_frames_is_not_stall() {
        let settings = ExtractorSettings::default();
        let s = extract(&event(2.0, 1.2, 30, 0), Some(&event(1.0, 1.0, 25, 0)), &settings).unwrap();
        assert!(!s.is_stall);
    }

    #[test]
    fn backwards_counters_clamp_to_zero() {
        let settings = ExtractorSettings::default();
        let s = extract(&event(2.0, 0.5, 3, 0), Some(&event(1.0, 10.0, 250, 7)), &settings).unwrap();
        assert_eq!(s.frames_delta, 0);
        assert_eq!(s.drops_delta, 0);
        assert!(s.speed_ratio >= 0.0);
    }

    #[test]
    fn speed_is_clamped() {
        let settings = ExtractorSettings::default();
        let s = extract(&event(1.01, 60.0, 30, 0), Some(&event(1.0, 0.0, 0, 0)), &settings).unwrap();
        assert_eq!(s.speed_ratio, 10.0);
    }

    #[test]
    fn falls_back_to_reported_speed() {
        let settings = ExtractorSettings::default();
        let prev = ProbeEvent {
            elapsed: Duration::from_secs(1),
            frame_count: Some(10),
            ..ProbeEvent::default()
        };
        let cur = ProbeEvent {
            elapsed: Duration::from_secs(2),
            frame_count: Some(35),
            speed: Some(0.98),
            ..ProbeEvent::default()
        };
        let s = extract(&cur, Some(&prev), &settings).unwrap();
        assert_eq!(s.speed_ratio, 0.98);
    }

    #[test]
    fn extractor_keeps_elapsed_strictly_increasing() {
        let mut extractor = SignalExtractor::default();
        assert!(extractor.push(event(1.0, 1.0, 25, 0)).is_none());
        let a = extractor.push(event(2.0, 2.0, 50, 0)).unwrap();
        let b = extractor.push(event(2.0, 2.0, 50, 0)).unwrap();
        assert!(b.elapsed > a.elapsed);
    }
}
