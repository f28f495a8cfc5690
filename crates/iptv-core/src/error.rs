//! Unified error type for iptvcheck.
//!
//! Only conditions the caller must act on travel as [`Error`]. Timeouts,
//! process crashes and malformed tool output are terminal session states and
//! are carried inside results instead (see [`crate::SessionEnd`]).

/// Unified error type covering the engine's failure modes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external tool could not be located.
    #[error("Tool not found: {tool}")]
    ToolNotFound {
        /// Name of the missing tool.
        tool: String,
    },

    /// The external process could not be started (missing binary, permission
    /// denied, exhausted resources).
    #[error("Failed to start {tool}: {message}")]
    Spawn {
        /// Name of the tool that failed to start.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A one-shot tool invocation (ffprobe, version check) failed.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Tool output could not be interpreted.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Configuration is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// The channel catalog could not be fetched or decoded.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Convenience constructor for [`Error::ToolNotFound`].
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Error::ToolNotFound { tool: tool.into() }
    }

    /// Convenience constructor for [`Error::Spawn`].
    pub fn spawn(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Spawn {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Whether this error means the check could not even be established.
    ///
    /// Setup failures are fatal for a single channel's check and are never
    /// retried; they must not abort processing of other channels.
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Error::ToolNotFound { .. } | Error::Spawn { .. })
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_not_found_display() {
        let err = Error::tool_not_found("ffmpeg");
        assert_eq!(err.to_string(), "Tool not found: ffmpeg");
        assert!(err.is_setup_failure());
    }

    #[test]
    fn spawn_display() {
        let err = Error::spawn("ffmpeg", "permission denied");
        assert_eq!(err.to_string(), "Failed to start ffmpeg: permission denied");
        assert!(err.is_setup_failure());
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffprobe", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffprobe]: exit code 1");
        assert!(!err.is_setup_failure());
    }

    #[test]
    fn probe_display() {
        let err = Error::Probe("no streams".into());
        assert_eq!(err.to_string(), "Probe error: no streams");
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert!(!err.is_setup_failure());
    }
}
