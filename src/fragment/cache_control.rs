//! Cache directive interpretation.
//!
//! Turns `Cache-Control`, `Age`, `Expires` and `Date` headers into a
//! [`CachePolicy`]. Used for fragment responses and for the host page's own
//! response headers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use http::header::{AGE, CACHE_CONTROL, DATE, EXPIRES};
use http::HeaderMap;

/// `Cache-Control` value for content that must not be cached.
pub const NO_STORE: &str = "no-store";

/// How long a response may be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Must not be cached.
    NoStore,
    /// Cacheable for the given duration.
    MaxAge(Duration),
    /// No directive present.
    Unspecified,
}

impl CachePolicy {
    /// Derive the policy from response headers, relative to `now`.
    ///
    /// `s-maxage` beats `max-age` (reduced by `Age`); `Expires` is only
    /// consulted when neither is present.
    pub fn from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Self {
        let mut shared_max_age = None;
        let mut max_age = None;

        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(value) = value.to_str() else { continue };
            for directive in value.split(',') {
                let mut parts = directive.trim().splitn(2, '=');
                let name = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
                let argument = parts.next().map(|a| a.trim().trim_matches('"'));

                match name.as_str() {
                    "no-store" | "no-cache" | "private" => return CachePolicy::NoStore,
                    "s-maxage" => shared_max_age = argument.and_then(|a| a.parse::<u64>().ok()),
                    "max-age" => max_age = argument.and_then(|a| a.parse::<u64>().ok()),
                    _ => {}
                }
            }
        }

        if let Some(seconds) = shared_max_age.or(max_age) {
            let age = headers
                .get(AGE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0);
            return CachePolicy::MaxAge(Duration::from_secs(seconds.saturating_sub(age)));
        }

        if let Some(expires) = headers.get(EXPIRES) {
            // invalid dates such as "0" mean already expired
            let Some(expires) = expires.to_str().ok().and_then(parse_http_date) else {
                return CachePolicy::NoStore;
            };
            let reference = headers
                .get(DATE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_http_date)
                .unwrap_or(now);
            let remaining = (expires - reference).to_std().unwrap_or(Duration::ZERO);
            return CachePolicy::MaxAge(remaining);
        }

        CachePolicy::Unspecified
    }

    /// Cacheable lifetime, treating zero as not cacheable.
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            CachePolicy::MaxAge(ttl) if !ttl.is_zero() => Some(*ttl),
            _ => None,
        }
    }
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Render a lifetime as a `Cache-Control` value.
pub fn header_value_for(ttl: Option<Duration>) -> String {
    match ttl {
        Some(ttl) if ttl.as_secs() > 0 => format!("max-age={}", ttl.as_secs()),
        _ => NO_STORE.to_string(),
    }
}
