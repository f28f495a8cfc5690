//! iptvcheck: find channels on an Xtream Codes provider and check their
//! streams for EPG coverage, codec, connection latency and playback
//! stability.

pub mod catalog;
pub mod config;
pub mod report;
pub mod runner;
