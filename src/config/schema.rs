//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use http::HeaderName;
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Transclusion engine settings.
    pub transclusion: TransclusionConfig,

    /// Sample host server settings.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Settings for the transclusion engine.
///
/// Built once and shared by `Arc` with the resolver, cache and assembler.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransclusionConfig {
    /// Resolve include directives at all. When false the markup is returned untouched.
    pub enabled: bool,

    /// Tag names recognized as include directives (case-insensitive).
    pub include_tag_names: Vec<String>,

    /// Maximum accepted markup size in bytes.
    pub max_markup_bytes: usize,

    /// Default per-fragment request timeout in milliseconds.
    pub fragment_request_timeout_ms: u64,

    /// TTL for fragments that carry no cache directive, in milliseconds.
    pub default_fragment_ttl_ms: u64,

    /// Request headers whose values become part of the cache fingerprint.
    pub cache_vary_by_request_headers: Vec<String>,

    /// Cache capacity in bytes.
    pub cache_max_size_bytes: usize,

    /// Interval of the background expiry sweep in milliseconds.
    pub cache_sweep_interval_ms: u64,

    /// Upper bound on fragment fetches running at once within one call.
    pub max_concurrent_fragment_fetches: usize,

    /// Fragment response headers promoted to the host response.
    pub response_headers_to_pass: Vec<String>,

    /// Request headers forwarded to fragment requests.
    pub fragment_request_headers_to_pass: Vec<String>,

    /// Append an HTML comment with resolution stats to the content.
    pub stats_append_to_content: bool,

    /// Body used for a fragment that failed without any fallback.
    pub error_fragment_content: String,
}

impl Default for TransclusionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_tag_names: vec!["inc".to_string(), "include".to_string()],
            max_markup_bytes: 5 * 1024 * 1024, // 5MB
            fragment_request_timeout_ms: 3_000,
            default_fragment_ttl_ms: 300_000,
            cache_vary_by_request_headers: Vec::new(),
            cache_max_size_bytes: 10 * 1024 * 1024, // 10MB
            cache_sweep_interval_ms: 60_000,
            max_concurrent_fragment_fetches: 32,
            response_headers_to_pass: vec![
                "Content-Language".to_string(),
                "Location".to_string(),
                "Refresh".to_string(),
            ],
            fragment_request_headers_to_pass: [
                "Accept-Language",
                "Correlation-ID",
                "Forwarded",
                "Referer",
                "User-Agent",
                "X-Correlation-ID",
                "X-Forwarded-For",
                "X-Forwarded-Proto",
                "X-Forwarded-Host",
                "X-Real-IP",
                "X-Request-ID",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
            stats_append_to_content: false,
            error_fragment_content: String::new(),
        }
    }
}

impl TransclusionConfig {
    pub fn fragment_request_timeout(&self) -> Duration {
        Duration::from_millis(self.fragment_request_timeout_ms)
    }

    pub fn default_fragment_ttl(&self) -> Duration {
        Duration::from_millis(self.default_fragment_ttl_ms)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.cache_sweep_interval_ms)
    }

    pub fn vary_header_names(&self) -> Vec<HeaderName> {
        header_names(&self.cache_vary_by_request_headers)
    }

    pub fn response_header_names(&self) -> Vec<HeaderName> {
        header_names(&self.response_headers_to_pass)
    }

    /// Request headers forwarded to fragment sources: the pass-through list
    /// plus every vary header, so fragments see what they are keyed on.
    pub fn forwarded_header_names(&self) -> Vec<HeaderName> {
        let mut names = header_names(&self.fragment_request_headers_to_pass);
        for name in self.vary_header_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

// Invalid names are rejected by validation; here they are skipped.
fn header_names(names: &[String]) -> Vec<HeaderName> {
    let mut parsed: Vec<HeaderName> = Vec::with_capacity(names.len());
    for name in names {
        if let Ok(name) = HeaderName::from_bytes(name.trim().as_bytes()) {
            if !parsed.contains(&name) {
                parsed.push(name);
            }
        }
    }
    parsed
}

/// Sample host server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Max-age the host page itself allows, in seconds.
    pub page_max_age_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            page_max_age_secs: 600,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
