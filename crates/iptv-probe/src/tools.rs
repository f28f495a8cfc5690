//! Locating ffmpeg and ffprobe.
//!
//! [`ToolRegistry`] resolves each tool once (configured path first, then
//! `PATH`) so that later checks fail fast with [`Error::ToolNotFound`]
//! instead of spawning a missing binary per stream.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use iptv_core::config::ToolsConfig;
use iptv_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tools the engine drives: ffmpeg for playback sessions, ffprobe for
/// stream metadata.
const TOOLS: [&str; 2] = ["ffmpeg", "ffprobe"];

/// One row of the `check-tools` report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// Version banner, e.g. `ffmpeg version 6.1.1`
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    paths: HashMap<&'static str, PathBuf>,
}

impl ToolRegistry {
    /// Resolve every known tool. Missing tools are simply absent.
    pub fn discover(config: &ToolsConfig) -> Self {
        let paths = TOOLS
            .into_iter()
            .filter_map(|name| {
                let configured = match name {
                    "ffmpeg" => config.ffmpeg_path.as_deref(),
                    _ => config.ffprobe_path.as_deref(),
                };
                let path = resolve(name, configured)?;
                tracing::debug!(tool = name, path = %path.display(), "tool resolved");
                Some((name, path))
            })
            .collect();
        Self { paths }
    }

    /// Use `path` for `name` regardless of what is installed.
    pub fn with_tool(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        if let Some(known) = TOOLS.into_iter().find(|t| *t == name) {
            self.paths.insert(known, path.into());
        }
        self
    }

    pub fn require(&self, name: &str) -> Result<&Path> {
        self.paths
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| Error::tool_not_found(name))
    }

    /// Availability and version of every known tool, in a fixed order.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        TOOLS
            .into_iter()
            .map(|name| {
                let path = self.paths.get(name).cloned();
                ToolInfo {
                    name: name.to_string(),
                    available: path.is_some(),
                    version: path.as_deref().and_then(version_banner),
                    path,
                }
            })
            .collect()
    }
}

fn resolve(name: &str, configured: Option<&Path>) -> Option<PathBuf> {
    match configured {
        Some(p) if p.is_file() => return Some(p.to_path_buf()),
        Some(p) => tracing::warn!("{} not found at {}, falling back to PATH", name, p.display()),
        None => {}
    }
    match which::which(name) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::debug!(tool = name, "not on PATH: {}", e);
            None
        }
    }
}

/// First line of `<tool> -version`, trimmed before the copyright notice.
fn version_banner(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path).arg("-version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next()?;
    let banner = first.split(" Copyright").next().unwrap_or(first).trim();
    (!banner.is_empty()).then(|| banner.to_string())
}
