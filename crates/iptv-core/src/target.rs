//! The playable stream handle handed to the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a playable stream.
///
/// The URL usually embeds provider credentials, so [`fmt::Display`] redacts
/// the path. Use [`StreamTarget::url`] when the real value is needed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTarget {
    url: String,
    label: Option<String>,
}

impl StreamTarget {
    /// Create a target from an already resolved stream URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: None,
        }
    }

    /// Attach a human-readable label (channel name) used in logs.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The full stream URL including any credentials.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Optional label for log output.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// `scheme://host/…` with the path elided.
    pub fn redacted(&self) -> String {
        match self.url.split_once("://") {
            Some((scheme, rest)) => {
                let authority = rest.split('/').next().unwrap_or(rest);
                let host = authority.rsplit('@').next().unwrap_or(authority);
                if rest.len() > authority.len() {
                    format!("{scheme}://{host}/…")
                } else {
                    format!("{scheme}://{host}")
                }
            }
            None => "<stream>".to_string(),
        }
    }
}

impl fmt::Debug for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTarget")
            .field("url", &self.redacted())
            .field("label", &self.label)
            .finish()
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label} ({})", self.redacted()),
            None => f.write_str(&self.redacted()),
        }
    }
}
