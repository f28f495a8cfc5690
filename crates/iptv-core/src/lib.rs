//! iptv-core: shared types, errors, and configuration.
//!
//! This crate is the foundational dependency for the other iptv-* crates,
//! providing the stream target handle, the event/sample/result types that
//! flow through the analysis engine, a unified error type, and the engine
//! configuration sections.

pub mod config;
pub mod connection;
pub mod error;
pub mod quality;
pub mod session;
pub mod target;

// Re-export the most commonly used items at the crate root.
pub use connection::{ConnectionResult, ConnectionStatus};
pub use error::{Error, Result};
pub use quality::{Penalty, PenaltyKind, QualityResult, QualitySample, StabilityGrade};
pub use session::{ProbeEvent, SessionEnd};
pub use target::StreamTarget;
