//! Per-call resolution statistics.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

use crate::fragment::{FragmentOutcome, ResolvedFragment};
use crate::include::Include;

/// What happened to one include.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FragmentStat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub src: String,
    pub outcome: FragmentOutcome,
    pub status: u16,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Counts and timings for one resolution call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransclusionStats {
    pub processed_includes: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Failed fragment sources, including ones later covered by a fallback.
    pub errors: usize,
    pub duration_ms: u64,
    pub fragments: Vec<FragmentStat>,
}

impl TransclusionStats {
    pub fn record(&mut self, include: &Include, resolved: &ResolvedFragment) {
        self.processed_includes += 1;
        self.cache_hits += resolved.cache_hits;
        self.cache_misses += resolved.cache_misses;
        self.errors += resolved.errors.len();
        self.fragments.push(FragmentStat {
            id: include.id.clone(),
            src: include.src.clone(),
            outcome: resolved.outcome,
            status: resolved.response.status.as_u16(),
            elapsed_ms: millis(resolved.elapsed),
            errors: resolved.errors.iter().map(|e| e.to_string()).collect(),
        });
    }

    pub fn set_duration(&mut self, elapsed: Duration) {
        self.duration_ms = millis(elapsed);
    }

    /// Render as an HTML comment suitable for appending to the document.
    pub fn render_comment(&self) -> String {
        let mut out = String::from("\n<!-- Transclusion stats\n");
        let _ = writeln!(
            out,
            "Processed {} include(s) in {}ms",
            self.processed_includes, self.duration_ms
        );
        let _ = writeln!(
            out,
            "Cache: {} hit(s), {} miss(es); {} error(s)",
            self.cache_hits, self.cache_misses, self.errors
        );
        for fragment in &self.fragments {
            let label = match &fragment.id {
                Some(id) => format!("{id} ({})", fragment.src),
                None => fragment.src.clone(),
            };
            let outcome = serde_json::to_value(fragment.outcome)
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "Fragment {}: {}, status {}, {}ms",
                defuse(&label),
                outcome,
                fragment.status,
                fragment.elapsed_ms
            );
            for error in &fragment.errors {
                let _ = writeln!(out, "  error: {}", defuse(error));
            }
        }
        out.push_str("-->");
        out
    }
}

// "--" would end the comment early.
fn defuse(value: &str) -> String {
    let mut value = value.replace(['\r', '\n'], " ");
    while value.contains("--") {
        value = value.replace("--", "- -");
    }
    value
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fragment::FragmentResponse;

    fn resolved(outcome: FragmentOutcome, errors: Vec<FetchError>) -> ResolvedFragment {
        ResolvedFragment {
            response: FragmentResponse::inline("x"),
            outcome,
            cache_hits: usize::from(outcome == FragmentOutcome::CacheHit),
            cache_misses: usize::from(outcome != FragmentOutcome::CacheHit),
            errors,
            elapsed: Duration::from_millis(7),
        }
    }

    #[test]
    fn counts_errors_covered_by_fallbacks() {
        let mut stats = TransclusionStats::default();
        stats.record(
            &Include::new("http://f/1"),
            &resolved(FragmentOutcome::CacheHit, vec![]),
        );
        stats.record(
            &Include::new("http://f/2").with_id("teaser"),
            &resolved(
                FragmentOutcome::FallbackContent,
                vec![FetchError::Timeout(Duration::from_millis(5))],
            ),
        );

        assert_eq!(stats.processed_includes, 2);
        assert_eq!((stats.cache_hits, stats.cache_misses, stats.errors), (1, 1, 1));
        assert_eq!(stats.fragments[1].id.as_deref(), Some("teaser"));
        assert_eq!(stats.fragments[1].elapsed_ms, 7);
    }

    #[test]
    fn oversized_durations_saturate() {
        let mut stats = TransclusionStats::default();
        stats.set_duration(Duration::MAX);
        assert_eq!(stats.duration_ms, u64::MAX);
    }

    #[test]
    fn comment_cannot_be_terminated_by_values() {
        let mut stats = TransclusionStats::default();
        stats.record(
            &Include::new("http://f/a-->b").with_id("x---y"),
            &resolved(FragmentOutcome::Fetched, vec![]),
        );
        let comment = stats.render_comment();

        assert!(comment.starts_with("\n<!-- Transclusion stats\n"));
        assert!(comment.ends_with("-->"));
        assert_eq!(comment.matches("--").count(), 2);
        assert!(comment.contains("fetched, status 200"));
    }
}
