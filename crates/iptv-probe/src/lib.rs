//! # iptv-probe
//!
//! Stream quality and connection analysis for live IPTV streams.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- bounded one-shot runs that
//!   keep stream credentials out of logs.
//! - **Event sources** ([`source`]) -- [`ProcessSource`] runs ffmpeg with
//!   machine-readable progress output; [`FakeEventSource`] replays a script.
//! - **Probe sessions** ([`ProbeSession`]) -- time-bounded, single-owner
//!   attachments that yield [`iptv_core::ProbeEvent`]s and always reap their
//!   producer.
//! - **Signal extraction** ([`SignalExtractor`]) and **classification**
//!   ([`QualityClassifier`]) -- events to samples to a 0-100 stability score.
//! - **Checks** ([`QualityMonitor`], [`ConnectionAnalyzer`]) -- the two
//!   end-to-end measurements, plus [`probe_stream_info`] for codec and
//!   resolution.

pub mod classify;
pub mod command;
pub mod connection;
pub mod extract;
pub mod monitor;
pub mod progress;
pub mod session;
pub mod source;
pub mod stream_info;
pub mod tools;

// ---- Re-exports for convenience ----

pub use classify::QualityClassifier;
pub use command::{ToolCommand, ToolOutput};
pub use connection::ConnectionAnalyzer;
pub use extract::{extract, ExtractorSettings, SignalExtractor};
pub use monitor::QualityMonitor;
pub use progress::{ParseStats, ProgressParser};
pub use session::{ProbeSession, SessionSummary};
pub use source::{
    EventSource, ExitReport, FakeEventSource, ProbeMode, ProbePlan, ProcessSource, RawLine,
    SourceHandle, SourceStream,
};
pub use stream_info::{probe_stream_info, StreamInfo};
pub use tools::{ToolInfo, ToolRegistry};
