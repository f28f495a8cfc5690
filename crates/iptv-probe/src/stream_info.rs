//! Stream technical info via `ffprobe`.
//!
//! Runs `ffprobe -v error -print_format json -show_streams <url>` and keeps
//! the first video and audio stream.

use std::time::Duration;

use iptv_core::{Error, Result, StreamTarget};
use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Codec, resolution and frame rate of a stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub video_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub audio_codec: Option<String>,
    pub audio_channels: Option<u32>,
}

impl StreamInfo {
    /// `WIDTHxHEIGHT`, when both are known.
    pub fn resolution(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(format!("{w}x{h}")),
            _ => None,
        }
    }

    /// Frame rate with at most two decimals, trailing zeros trimmed.
    pub fn frame_rate_label(&self) -> Option<String> {
        self.frame_rate.map(|fps| {
            let s = format!("{fps:.2}");
            s.trim_end_matches('0').trim_end_matches('.').to_string()
        })
    }
}

/// Probe `target` with ffprobe.
pub async fn probe_stream_info(
    tools: &ToolRegistry,
    target: &StreamTarget,
    timeout: Duration,
) -> Result<StreamInfo> {
    let ffprobe = tools.require("ffprobe")?;
    let output = ToolCommand::new("ffprobe", ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg("-rw_timeout")
        .arg(timeout.as_micros().to_string())
        .target(target)
        .timeout(timeout + Duration::from_secs(2))
        .execute()
        .await?;

    let info = parse_ffprobe_json(&output.stdout)?;
    tracing::debug!(stream = %target, ?info, "stream info probed");
    Ok(info)
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    channels: Option<u32>,
}

fn parse_ffprobe_json(json: &str) -> Result<StreamInfo> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let mut info = StreamInfo::default();
    for stream in output.streams {
        match stream.codec_type.as_deref() {
            Some("video") if info.video_codec.is_none() => {
                info.video_codec = stream.codec_name;
                info.width = stream.width;
                info.height = stream.height;
                info.frame_rate = stream
                    .avg_frame_rate
                    .as_deref()
                    .and_then(parse_frame_rate)
                    .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate));
            }
            Some("audio") if info.audio_codec.is_none() => {
                info.audio_codec = stream.codec_name;
                info.audio_channels = stream.channels;
            }
            _ => {}
        }
    }

    if info.video_codec.is_none() && info.audio_codec.is_none() {
        return Err(Error::Probe("ffprobe reported no audio or video streams".into()));
    }
    Ok(info)
}

/// `30000/1001` or `25`; `0/0` is unknown.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}
