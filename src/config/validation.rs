//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, sizes > 0)
//! - Check header and tag names are usable
//! - Check addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use http::HeaderName;

use crate::config::schema::AppConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} contains invalid header name '{name}'")]
    InvalidHeaderName { field: &'static str, name: String },

    #[error("invalid include tag name '{0}'")]
    InvalidTagName(String),

    #[error("include_tag_names must not be empty")]
    NoTagNames,

    #[error("{field} is not a valid socket address: '{value}'")]
    InvalidAddress { field: &'static str, value: String },
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let t = &config.transclusion;

    let positive = [
        ("transclusion.max_markup_bytes", t.max_markup_bytes as u64),
        ("transclusion.fragment_request_timeout_ms", t.fragment_request_timeout_ms),
        ("transclusion.default_fragment_ttl_ms", t.default_fragment_ttl_ms),
        ("transclusion.cache_max_size_bytes", t.cache_max_size_bytes as u64),
        ("transclusion.cache_sweep_interval_ms", t.cache_sweep_interval_ms),
        (
            "transclusion.max_concurrent_fragment_fetches",
            t.max_concurrent_fragment_fetches as u64,
        ),
        ("server.request_timeout_secs", config.server.request_timeout_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        }
    }

    let header_lists = [
        ("transclusion.cache_vary_by_request_headers", &t.cache_vary_by_request_headers),
        ("transclusion.response_headers_to_pass", &t.response_headers_to_pass),
        (
            "transclusion.fragment_request_headers_to_pass",
            &t.fragment_request_headers_to_pass,
        ),
    ];
    for (field, names) in header_lists {
        for name in names {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                errors.push(ValidationError::InvalidHeaderName {
                    field,
                    name: name.clone(),
                });
            }
        }
    }

    if t.include_tag_names.is_empty() {
        errors.push(ValidationError::NoTagNames);
    }
    for tag in &t.include_tag_names {
        let valid = !tag.is_empty()
            && tag.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
        if !valid {
            errors.push(ValidationError::InvalidTagName(tag.clone()));
        }
    }

    let addresses = [
        ("server.bind_address", &config.server.bind_address),
        ("observability.metrics_address", &config.observability.metrics_address),
    ];
    for (field, value) in addresses {
        if value.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                field,
                value: value.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
