//! Per-channel report rows, terminal table and CSV export.
//!
//! A value that was requested but could not be measured is written as
//! `unmeasured` or `failed`, never as `0`.

use anyhow::{Context, Result};
use iptv_core::{ConnectionResult, QualityResult};
use iptv_probe::StreamInfo;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::catalog::Channel;

/// Outcome of one optional check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Check<T> {
    /// Not requested.
    Skipped,
    Done(T),
    /// Could not run at all (missing tool, HTTP error, cancelled).
    Failed(String),
}

/// Reason recorded for checks abandoned by cancellation.
pub const CANCELLED: &str = "cancelled";

/// Terminal label for a check that could not run, derived from its reason:
/// `cancelled`, `setup_failed` (tool missing or not startable) or `failed`.
pub fn failure_label(reason: &str) -> &'static str {
    if reason == CANCELLED {
        "cancelled"
    } else if reason.starts_with("Tool not found:") || reason.starts_with("Failed to start ") {
        "setup_failed"
    } else {
        "failed"
    }
}

impl<T> Default for Check<T> {
    fn default() -> Self {
        Check::Skipped
    }
}

impl<T> Check<T> {
    pub fn from_result<E: std::fmt::Display>(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(v) => Check::Done(v),
            Err(e) => Check::Failed(e.to_string()),
        }
    }

    pub fn as_done(&self) -> Option<&T> {
        match self {
            Check::Done(v) => Some(v),
            _ => None,
        }
    }

    /// `done` rendered, `""` when skipped, `marker` when failed.
    fn render(&self, marker: &str, done: impl FnOnce(&T) -> String) -> String {
        match self {
            Check::Skipped => String::new(),
            Check::Done(v) => done(v),
            Check::Failed(_) => marker.to_string(),
        }
    }
}

/// Results of the engine checks for one stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamChecks {
    pub info: Check<StreamInfo>,
    pub connection: Check<ConnectionResult>,
    pub quality: Check<QualityResult>,
}

/// One output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelReport {
    pub id: u64,
    pub name: String,
    pub category: Option<String>,
    pub archive: bool,
    pub epg: Check<usize>,
    #[serde(flatten)]
    pub checks: StreamChecks,
}

impl ChannelReport {
    pub fn new(channel: &Channel, epg: Check<usize>, checks: StreamChecks) -> Self {
        Self {
            id: channel.stream_id,
            name: channel.name.clone(),
            category: channel.category_name.clone(),
            archive: channel.tv_archive,
            epg,
            checks,
        }
    }
}

/// Which optional column groups are present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Columns {
    pub quality: bool,
    pub connection: bool,
}

const BASE_HEADERS: &[&str] = &[
    "id",
    "name",
    "category",
    "archive",
    "epg_count",
    "codec",
    "resolution",
    "frame_rate",
];

const QUALITY_HEADERS: &[&str] = &[
    "stability_score",
    "grade",
    "buffering_events",
    "dropped_frames",
    "speed_variance",
    "samples",
    "observed_secs",
    "quality_end",
    "quality_detail",
];

const CONNECTION_HEADERS: &[&str] = &["ttff_secs", "connection_status"];

fn headers(columns: Columns) -> Vec<&'static str> {
    let mut h = BASE_HEADERS.to_vec();
    if columns.quality {
        h.extend_from_slice(QUALITY_HEADERS);
    }
    if columns.connection {
        h.extend_from_slice(CONNECTION_HEADERS);
    }
    h
}

fn base_fields(row: &ChannelReport) -> Vec<String> {
    let info = &row.checks.info;
    vec![
        row.id.to_string(),
        row.name.clone(),
        row.category.clone().unwrap_or_default(),
        if row.archive { "yes" } else { "no" }.to_string(),
        row.epg.render("unmeasured", |n| n.to_string()),
        info.render("unmeasured", |i| {
            i.video_codec.clone().unwrap_or_else(|| "none".to_string())
        }),
        info.render("unmeasured", |i| {
            i.resolution().unwrap_or_else(|| "unknown".to_string())
        }),
        info.render("unmeasured", |i| {
            i.frame_rate_label().unwrap_or_else(|| "unknown".to_string())
        }),
    ]
}

fn quality_fields(quality: &Check<QualityResult>) -> Vec<String> {
    match quality {
        Check::Done(q) => {
            let counted = |value: String| {
                if q.insufficient_data {
                    "unmeasured".to_string()
                } else {
                    value
                }
            };
            vec![
                q.score_label(),
                q.grade.to_string(),
                counted(q.buffering_event_count.to_string()),
                counted(q.dropped_frame_count.to_string()),
                counted(format!("{:.4}", q.speed_variance)),
                q.sample_count.to_string(),
                format!("{:.1}", q.duration_observed.as_secs_f64()),
                q.end.label().to_string(),
                q.summary(),
            ]
        }
        Check::Failed(reason) => {
            let mut fields = vec!["failed".to_string(); QUALITY_HEADERS.len() - 2];
            fields.push(failure_label(reason).to_string());
            fields.push(reason.clone());
            fields
        }
        Check::Skipped => vec![String::new(); QUALITY_HEADERS.len()],
    }
}

fn connection_fields(connection: &Check<ConnectionResult>) -> Vec<String> {
    match connection {
        Check::Done(c) => vec![c.latency_label(), c.status.to_string()],
        Check::Failed(_) => vec!["failed".to_string(), "failed".to_string()],
        Check::Skipped => vec![String::new(), String::new()],
    }
}

fn fields(row: &ChannelReport, columns: Columns) -> Vec<String> {
    let mut f = base_fields(row);
    if columns.quality {
        f.extend(quality_fields(&row.checks.quality));
    }
    if columns.connection {
        f.extend(connection_fields(&row.checks.connection));
    }
    f
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line(values: impl IntoIterator<Item = impl AsRef<str>>) -> String {
    values
        .into_iter()
        .map(|v| csv_field(v.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Write rows as CSV with a header line.
pub fn write_csv<W: Write>(mut out: W, rows: &[ChannelReport], columns: Columns) -> std::io::Result<()> {
    write!(out, "{}\r\n", csv_line(headers(columns)))?;
    for row in rows {
        write!(out, "{}\r\n", csv_line(fields(row, columns)))?;
    }
    out.flush()
}

pub fn save_csv(path: &Path, rows: &[ChannelReport], columns: Columns) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create CSV file: {:?}", path))?;
    write_csv(std::io::BufWriter::new(file), rows, columns)
        .with_context(|| format!("Failed to write CSV file: {:?}", path))
}

const NAME_WIDTH: usize = 32;

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let mut s: String = value.chars().take(width.saturating_sub(1)).collect();
        s.push('…');
        s
    }
}

/// Render rows as an aligned text table.
pub fn render_table(rows: &[ChannelReport], columns: Columns) -> String {
    let mut header = vec!["ID", "Name", "Category", "Archive", "EPG", "Codec", "Resolution", "FPS"];
    if columns.quality {
        header.extend(["Score", "Grade", "Buffering", "Dropped"]);
    }
    if columns.connection {
        header.extend(["TTFF", "Connection"]);
    }

    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut cells = base_fields(row);
            cells[1] = truncate(&cells[1], NAME_WIDTH);
            if columns.quality {
                cells.extend(quality_fields(&row.checks.quality).into_iter().take(4));
            }
            if columns.connection {
                cells.extend(connection_fields(&row.checks.connection));
            }
            cells
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for cells in &body {
        for (w, cell) in widths.iter_mut().zip(cells) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let format_row = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let header: Vec<String> = header.iter().map(|h| h.to_string()).collect();
    let mut out = format_row(&header);
    out.push('\n');
    out.push_str(&"-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));
    out.push('\n');
    for cells in &body {
        out.push_str(&format_row(cells));
        out.push('\n');
    }
    out
}
