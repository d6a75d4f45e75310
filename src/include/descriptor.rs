//! Include descriptors and document segments.

use std::time::Duration;

/// One inclusion directive extracted from the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    /// Diagnostic identifier from the `id` attribute.
    pub id: Option<String>,
    /// Primary fragment URL.
    pub src: String,
    /// Secondary fragment URL tried once when `src` fails.
    pub fallback_src: Option<String>,
    /// Inline markup used when no source could be fetched.
    pub fallback_content: Option<String>,
    /// Whether this fragment drives the aggregate status and headers.
    pub primary: bool,
    /// Per-include request timeout, replacing the configured default.
    pub timeout_override: Option<Duration>,
}

impl Include {
    /// Create a descriptor for `src` with no fallbacks.
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            id: None,
            src: src.into(),
            fallback_src: None,
            fallback_content: None,
            primary: false,
            timeout_override: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_fallback_src(mut self, url: impl Into<String>) -> Self {
        self.fallback_src = Some(url.into());
        self
    }

    pub fn with_fallback_content(mut self, content: impl Into<String>) -> Self {
        self.fallback_content = Some(content.into());
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    /// Label used in logs and stats.
    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.src)
    }
}

/// A piece of the parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal markup, reproduced byte-for-byte.
    Text(String),
    /// A directive to be replaced by fragment content.
    Include(Include),
}

impl Segment {
    pub fn as_include(&self) -> Option<&Include> {
        match self {
            Segment::Include(include) => Some(include),
            Segment::Text(_) => None,
        }
    }
}
