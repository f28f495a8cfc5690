//! Parsing of ffmpeg progress output into [`ProbeEvent`]s.
//!
//! Two shapes are understood:
//!
//! - the machine-readable `-progress` format: one `key=value` per line,
//!   grouped into blocks terminated by `progress=continue` or `progress=end`;
//! - the human `-stats` line (`frame=  123 fps= 25 ... time=00:00:05.00
//!   bitrate=... speed=1.0x`), which carries a whole record on one line.
//!
//! Anything else is counted as skipped. A skipped line never ends a session;
//! the session decides what to do when nothing parses at all.

use std::time::Duration;

use iptv_core::ProbeEvent;

/// Counters describing how much of the output was usable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines_seen: u64,
    pub lines_skipped: u64,
    pub events: u64,
}

/// Incremental parser; feed it lines in arrival order.
#[derive(Debug, Default)]
pub struct ProgressParser {
    pending: ProbeEvent,
    recognised: usize,
    stats: ParseStats,
}

/// Outcome of applying one `key=value` pair.
enum Field {
    Recognised,
    Ignored,
    Invalid,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    /// Feed one output line received `elapsed` after the session started.
    ///
    /// Returns a completed event when the line closes a record.
    pub fn feed(&mut self, line: &str, elapsed: Duration) -> Option<ProbeEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        self.stats.lines_seen += 1;

        if is_stats_line(line) {
            return match parse_stats_line(line) {
                Some(mut event) => {
                    event.elapsed = elapsed;
                    self.stats.events += 1;
                    Some(event)
                }
                None => {
                    self.skip(line);
                    None
                }
            };
        }

        let Some((key, value)) = line.split_once('=') else {
            self.skip(line);
            return None;
        };
        let (key, value) = (key.trim(), value.trim());

        if key == "progress" {
            let is_final = match value {
                "end" => true,
                "continue" => false,
                _ => {
                    self.skip(line);
                    false
                }
            };
            return self.close_block(elapsed, is_final);
        }

        match apply_field(&mut self.pending, key, value) {
            Field::Recognised => self.recognised += 1,
            Field::Ignored => {}
            Field::Invalid => self.skip(line),
        }
        None
    }

    fn close_block(&mut self, elapsed: Duration, is_final: bool) -> Option<ProbeEvent> {
        let mut event = std::mem::take(&mut self.pending);
        let recognised = std::mem::take(&mut self.recognised);
        if recognised == 0 {
            tracing::trace!("dropping progress block without usable fields");
            return None;
        }
        event.elapsed = elapsed;
        event.is_final = is_final;
        self.stats.events += 1;
        Some(event)
    }

    fn skip(&mut self, line: &str) {
        self.stats.lines_skipped += 1;
        tracing::trace!(line, "skipping unparseable progress line");
    }
}

fn apply_field(event: &mut ProbeEvent, key: &str, value: &str) -> Field {
    if value.eq_ignore_ascii_case("N/A") {
        return Field::Ignored;
    }

    let parsed = match key {
        "frame" => value.parse().ok().map(|v| event.frame_count = Some(v)),
        "fps" => parse_finite(value).map(|v| event.fps = Some(v)),
        "drop_frames" => value.parse().ok().map(|v| event.dropped_frames = Some(v)),
        "dup_frames" => value.parse().ok().map(|v| event.duplicate_frames = Some(v)),
        "total_size" => value.parse().ok().map(|v| event.total_size = Some(v)),
        "speed" => parse_speed(value).map(|v| event.speed = Some(v)),
        "bitrate" => parse_bitrate(value).map(|v| event.bitrate_kbps = Some(v)),
        // ffmpeg reports microseconds under both names.
        "out_time_us" | "out_time_ms" => value.parse::<i64>().ok().map(|us| {
            event.stream_time = Some(Duration::from_micros(us.max(0) as u64));
        }),
        "out_time" => {
            if event.stream_time.is_some() {
                return Field::Ignored;
            }
            parse_clock(value).map(|t| event.stream_time = Some(t))
        }
        _ => return Field::Ignored,
    };

    match parsed {
        Some(()) => Field::Recognised,
        None => Field::Invalid,
    }
}

fn is_stats_line(line: &str) -> bool {
    line.starts_with("frame=") && line.contains(" time=")
}

/// Parse a `-stats` line; `key= value` pairs may contain padding spaces.
fn parse_stats_line(line: &str) -> Option<ProbeEvent> {
    let mut event = ProbeEvent::default();
    let mut recognised = 0;
    let mut rest = line;

    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let end = after.find(char::is_whitespace).unwrap_or(after.len());
        let value = &after[..end];
        rest = &after[end..];

        let key = match key {
            "time" => "out_time",
            "drop" => "drop_frames",
            "dup" => "dup_frames",
            other => other,
        };
        if let Field::Recognised = apply_field(&mut event, key, value) {
            recognised += 1;
        }
    }

    (recognised > 0).then_some(event)
}

fn parse_finite(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_speed(value: &str) -> Option<f64> {
    parse_finite(value.trim_end_matches('x').trim()).filter(|v| *v >= 0.0)
}

fn parse_bitrate(value: &str) -> Option<f64> {
    parse_finite(value.trim_end_matches("kbits/s").trim())
}

/// Parse `HH:MM:SS.ffffff`; negative clocks (seen before the first packet)
/// are clamped to zero.
fn parse_clock(value: &str) -> Option<Duration> {
    let negative = value.starts_with('-');
    let parts: Vec<&str> = value.trim_start_matches('-').split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;
    if negative {
        return Some(Duration::ZERO);
    }
    Duration::try_from_secs_f64(hours * 3600.0 + minutes * 60.0 + seconds).ok()
}
