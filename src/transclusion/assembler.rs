//! Result assembly.
//!
//! # Responsibilities
//! - Splice resolved fragment bodies into the document in document order
//! - Derive the aggregate status, pass-through headers and cache lifetime
//! - Append the stats comment when configured
//!
//! # Aggregation Rules
//! - Status: the first primary include's fragment status, if any
//! - Headers: allow-listed names across all fragments; a later fragment
//!   replaces an earlier value unless the earlier one came from a primary
//! - Lifetime: the shortest fragment TTL; zero if any fragment is not cacheable

use std::time::Duration;

use chrono::Utc;
use http::{HeaderMap, HeaderName, StatusCode};

use crate::config::TransclusionConfig;
use crate::fragment::cache_control::CachePolicy;
use crate::fragment::ResolvedFragment;
use crate::include::Segment;
use crate::transclusion::result::{shortest, TransclusionResult};
use crate::transclusion::stats::TransclusionStats;

#[derive(Debug, Clone)]
pub struct ResultAssembler {
    response_headers: Vec<HeaderName>,
    vary_headers: Vec<HeaderName>,
    append_stats: bool,
}

impl ResultAssembler {
    pub fn from_config(config: &TransclusionConfig) -> Self {
        Self {
            response_headers: config.response_header_names(),
            vary_headers: config.vary_header_names(),
            append_stats: config.stats_append_to_content,
        }
    }

    /// Build the result. `resolved` holds one entry per include segment, in
    /// document order.
    pub fn assemble(
        &self,
        segments: Vec<Segment>,
        resolved: Vec<ResolvedFragment>,
        host_response_headers: Option<&HeaderMap>,
        elapsed: Duration,
    ) -> TransclusionResult {
        let mut content = String::new();
        let mut status_code_override: Option<StatusCode> = None;
        let mut headers = HeaderMap::new();
        let mut pinned: Vec<HeaderName> = Vec::new();
        let mut content_max_age: Option<Duration> = None;
        let mut has_primary_include = false;
        let mut stats = TransclusionStats::default();

        let mut fragments = resolved.into_iter();
        for segment in segments {
            let include = match segment {
                Segment::Text(text) => {
                    content.push_str(&text);
                    continue;
                }
                Segment::Include(include) => include,
            };
            let Some(fragment) = fragments.next() else {
                tracing::warn!(include = include.label(), "No resolution for include");
                continue;
            };

            let response = &fragment.response;
            content.push_str(&response.body);
            stats.record(&include, &fragment);

            let ttl = if response.cacheable {
                response.ttl
            } else {
                Duration::ZERO
            };
            content_max_age = shortest(content_max_age, Some(ttl));

            if include.primary {
                has_primary_include = true;
                if status_code_override.is_none() {
                    status_code_override = Some(response.status);
                }
            }
            self.merge_headers(&mut headers, &mut pinned, &response.headers, include.primary);
        }

        if let Some(host) = host_response_headers {
            match CachePolicy::from_headers(host, Utc::now()) {
                CachePolicy::NoStore => content_max_age = Some(Duration::ZERO),
                CachePolicy::MaxAge(page) => content_max_age = shortest(content_max_age, Some(page)),
                CachePolicy::Unspecified => {}
            }
        }

        stats.set_duration(elapsed);
        if self.append_stats {
            content.push_str(&stats.render_comment());
        }

        TransclusionResult {
            content,
            status_code_override,
            response_headers_to_pass: headers,
            cache_vary_headers: self.vary_headers.clone(),
            content_max_age,
            has_primary_include,
            stats,
        }
    }

    fn merge_headers(
        &self,
        merged: &mut HeaderMap,
        pinned: &mut Vec<HeaderName>,
        fragment_headers: &HeaderMap,
        primary: bool,
    ) {
        for name in &self.response_headers {
            if pinned.contains(name) {
                continue;
            }
            let mut values = fragment_headers.get_all(name).iter();
            let Some(first) = values.next() else { continue };

            merged.insert(name.clone(), first.clone());
            for value in values {
                merged.append(name.clone(), value.clone());
            }
            if primary {
                pinned.push(name.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{FragmentOutcome, FragmentResponse};
    use crate::include::Include;
    use http::header::CACHE_CONTROL;
    use http::HeaderValue;

    fn fetched(body: &str, status: u16, ttl_secs: u64, headers: &[(&'static str, &'static str)]) -> ResolvedFragment {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_static(value));
        }
        ResolvedFragment {
            response: FragmentResponse {
                status: StatusCode::from_u16(status).unwrap(),
                body: body.to_string(),
                headers: map,
                cacheable: ttl_secs > 0,
                ttl: Duration::from_secs(ttl_secs),
            },
            outcome: FragmentOutcome::Fetched,
            cache_hits: 0,
            cache_misses: 1,
            errors: Vec::new(),
            elapsed: Duration::from_millis(3),
        }
    }

    fn text(s: &str) -> Segment {
        Segment::Text(s.to_string())
    }

    fn include(include: Include) -> Segment {
        Segment::Include(include)
    }

    fn assembler() -> ResultAssembler {
        ResultAssembler::from_config(&TransclusionConfig::default())
    }

    #[test]
    fn splices_bodies_in_document_order() {
        let segments = vec![
            text("<p>A</p>"),
            include(Include::new("http://f/1")),
            text("<p>B</p>"),
            include(Include::new("http://f/2")),
        ];
        let result = assembler().assemble(
            segments,
            vec![fetched("X", 200, 300, &[]), fetched("Y", 200, 60, &[])],
            None,
            Duration::ZERO,
        );

        assert_eq!(result.content(), "<p>A</p>X<p>B</p>Y");
        assert_eq!(result.status_code_override(), None);
        assert_eq!(result.content_max_age(), Some(Duration::from_secs(60)));
        assert_eq!(result.processed_include_count(), 2);
        assert!(!result.has_primary_include());
    }

    #[test]
    fn first_primary_sets_status_and_pins_headers() {
        let segments = vec![
            include(Include::new("http://f/1").primary()),
            include(Include::new("http://f/2").primary()),
            include(Include::new("http://f/3")),
        ];
        let result = assembler().assemble(
            segments,
            vec![
                fetched("", 404, 0, &[("content-language", "de")]),
                fetched("", 500, 0, &[("content-language", "fr")]),
                fetched("", 200, 0, &[("content-language", "en"), ("location", "/x")]),
            ],
            None,
            Duration::ZERO,
        );

        assert_eq!(result.status_code_override(), Some(StatusCode::NOT_FOUND));
        assert!(result.has_primary_include());
        let headers = result.response_headers_to_pass();
        assert_eq!(headers.get("content-language").unwrap(), "de");
        assert_eq!(headers.get("location").unwrap(), "/x");
    }

    #[test]
    fn later_fragment_wins_without_primary_and_others_are_filtered() {
        let segments = vec![
            include(Include::new("http://f/1")),
            include(Include::new("http://f/2")),
        ];
        let result = assembler().assemble(
            segments,
            vec![
                fetched("", 200, 60, &[("content-language", "de"), ("set-cookie", "a=1")]),
                fetched("", 200, 60, &[("content-language", "en")]),
            ],
            None,
            Duration::ZERO,
        );

        let headers = result.response_headers_to_pass();
        assert_eq!(headers.get("content-language").unwrap(), "en");
        assert!(headers.get("set-cookie").is_none());
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn one_uncacheable_fragment_makes_page_no_store() {
        let segments = vec![
            include(Include::new("http://f/1")),
            include(Include::new("http://f/2")),
        ];
        let result = assembler().assemble(
            segments,
            vec![fetched("", 200, 300, &[]), fetched("", 200, 0, &[])],
            None,
            Duration::ZERO,
        );
        assert_eq!(result.calculate_cache_control_header_value(None), "no-store");
        assert_eq!(result.calculate_cache_control_header_value(Some(600)), "no-store");
    }

    #[test]
    fn host_response_headers_narrow_the_lifetime() {
        let mut host = HeaderMap::new();
        host.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=30"));
        let result = assembler().assemble(
            vec![include(Include::new("http://f/1"))],
            vec![fetched("", 200, 300, &[])],
            Some(&host),
            Duration::ZERO,
        );
        assert_eq!(result.content_max_age(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn stats_comment_is_appended_after_content() {
        let config = TransclusionConfig {
            stats_append_to_content: true,
            ..TransclusionConfig::default()
        };
        let result = ResultAssembler::from_config(&config).assemble(
            vec![text("<p>A</p>"), include(Include::new("http://f/1"))],
            vec![fetched("X", 200, 300, &[])],
            None,
            Duration::from_millis(12),
        );

        assert!(result.content().starts_with("<p>A</p>X\n<!-- Transclusion stats"));
        assert!(result.content().contains("Processed 1 include(s) in 12ms"));
        assert_eq!(result.stats().duration_ms, 12);
    }

    #[test]
    fn document_without_includes_is_unconstrained() {
        let result = assembler().assemble(vec![text("plain")], Vec::new(), None, Duration::ZERO);
        assert_eq!(result.content(), "plain");
        assert_eq!(result.content_max_age(), None);
        assert_eq!(result.processed_include_count(), 0);
    }
}
