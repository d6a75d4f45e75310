//! Resolution result returned to the host.

use std::time::Duration;

use chrono::Utc;
use http::{HeaderMap, HeaderName, StatusCode};

use crate::fragment::cache_control::{header_value_for, CachePolicy, NO_STORE};
use crate::transclusion::stats::TransclusionStats;

/// Assembled document plus the metadata the host needs for its response.
/// Created once per call and never mutated afterward.
#[derive(Debug, Clone)]
pub struct TransclusionResult {
    pub(crate) content: String,
    pub(crate) status_code_override: Option<StatusCode>,
    pub(crate) response_headers_to_pass: HeaderMap,
    pub(crate) cache_vary_headers: Vec<HeaderName>,
    /// `None` when no fragment constrains caching; zero when any fragment
    /// must not be cached.
    pub(crate) content_max_age: Option<Duration>,
    pub(crate) has_primary_include: bool,
    pub(crate) stats: TransclusionStats,
}

impl TransclusionResult {
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }

    /// Status of the first primary fragment, if the document has one.
    pub fn status_code_override(&self) -> Option<StatusCode> {
        self.status_code_override
    }

    /// Allow-listed fragment response headers, in document order.
    pub fn response_headers_to_pass(&self) -> &HeaderMap {
        &self.response_headers_to_pass
    }

    /// Request headers that keyed the fragment cache. A host serving this
    /// content should list them in its `Vary` header.
    pub fn cache_vary_headers(&self) -> &[HeaderName] {
        &self.cache_vary_headers
    }

    pub fn content_max_age(&self) -> Option<Duration> {
        self.content_max_age
    }

    pub fn has_primary_include(&self) -> bool {
        self.has_primary_include
    }

    pub fn processed_include_count(&self) -> usize {
        self.stats.processed_includes
    }

    pub fn stats(&self) -> &TransclusionStats {
        &self.stats
    }

    /// `Cache-Control` value for the assembled page.
    ///
    /// `page_max_age_secs` is the host page's own max-age; the result never
    /// outlives it or any included fragment.
    pub fn calculate_cache_control_header_value(&self, page_max_age_secs: Option<u64>) -> String {
        let page = page_max_age_secs.map(Duration::from_secs);
        header_value_for(shortest(self.content_max_age, page))
    }

    /// `Cache-Control` value for the assembled page, taking the page lifetime
    /// from the host's own response headers.
    pub fn calculate_cache_control_header_value_by_response_headers(
        &self,
        host_response_headers: &HeaderMap,
    ) -> String {
        match CachePolicy::from_headers(host_response_headers, Utc::now()) {
            CachePolicy::NoStore => NO_STORE.to_string(),
            CachePolicy::MaxAge(page) => header_value_for(shortest(self.content_max_age, Some(page))),
            CachePolicy::Unspecified => header_value_for(self.content_max_age),
        }
    }
}

/// Intersection of two optional lifetimes, `None` meaning unconstrained.
pub(crate) fn shortest(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
