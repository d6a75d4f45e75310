//! Fragment resolution.
//!
//! # Data Flow
//! ```text
//! Include
//!     → src (Resolution::Primary)
//!         → cache hit            → done
//!         → single-flight fetch  → 2xx: cache + done
//!     → fallback src (Resolution::Fallback, tried once, never recurses)
//!     → inline fallback content  (status 200, not cached)
//!     → configured error content (status of the first failure, not cached)
//! ```
//!
//! Resolution always yields a usable [`FragmentResponse`]; fetch failures are
//! recorded on the [`ResolvedFragment`] and never returned as errors.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use http::{HeaderMap, HeaderName, StatusCode};
use serde::Serialize;
use tokio::time::{self, Instant};
use url::Url;

use crate::cache::{Fingerprint, FlightRole, FragmentCache};
use crate::cache::store::FetchResult;
use crate::config::TransclusionConfig;
use crate::error::FetchError;
use crate::fragment::client::{FragmentClient, FragmentRequest};
use crate::fragment::response::FragmentResponse;
use crate::include::Include;
use crate::lifecycle::AbortSignal;
use crate::observability::metrics;

/// Which source of an include is being loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Primary,
    Fallback,
}

/// How the content in an include's slot was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentOutcome {
    CacheHit,
    Fetched,
    /// Waited on another caller's in-flight fetch.
    Joined,
    FallbackSrc,
    FallbackContent,
    ErrorContent,
}

impl FragmentOutcome {
    pub fn is_error(self) -> bool {
        matches!(self, FragmentOutcome::ErrorContent)
    }
}

/// Resolved content for one include plus what it took to get it.
#[derive(Debug, Clone)]
pub struct ResolvedFragment {
    pub response: FragmentResponse,
    pub outcome: FragmentOutcome,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Every source failure on the way, in the order they happened.
    pub errors: Vec<FetchError>,
    pub elapsed: Duration,
}

#[derive(Default)]
struct Tally {
    cache_hits: usize,
    cache_misses: usize,
    errors: Vec<FetchError>,
}

pub struct FragmentResolver {
    config: Arc<TransclusionConfig>,
    cache: FragmentCache,
    client: Arc<dyn FragmentClient>,
    vary_headers: Vec<HeaderName>,
    forwarded_headers: Vec<HeaderName>,
}

impl FragmentResolver {
    pub fn new(
        config: Arc<TransclusionConfig>,
        cache: FragmentCache,
        client: Arc<dyn FragmentClient>,
    ) -> Self {
        let vary_headers = config.vary_header_names();
        let forwarded_headers = config.forwarded_header_names();
        Self {
            config,
            cache,
            client,
            vary_headers,
            forwarded_headers,
        }
    }

    pub fn cache(&self) -> &FragmentCache {
        &self.cache
    }

    pub async fn resolve(&self, include: &Include, request_headers: &HeaderMap) -> ResolvedFragment {
        self.resolve_until(include, request_headers, &AbortSignal::never())
            .await
    }

    /// Resolve `include`, substituting error content if `abort` fires first.
    ///
    /// Abandoning the wait drops this caller's handle on any shared fetch; the
    /// fetch itself continues while other callers still wait on it.
    pub async fn resolve_until(
        &self,
        include: &Include,
        request_headers: &HeaderMap,
        abort: &AbortSignal,
    ) -> ResolvedFragment {
        let started = Instant::now();
        let resolved = tokio::select! {
            biased;
            _ = abort.aborted() => {
                tracing::debug!(include = include.label(), "Fragment resolution aborted");
                metrics::record_fragment_error(FetchError::Aborted.kind());
                self.error_fragment(Tally {
                    errors: vec![FetchError::Aborted],
                    ..Tally::default()
                })
            }
            resolved = self.resolve_sources(include, request_headers) => resolved,
        };
        ResolvedFragment {
            elapsed: started.elapsed(),
            ..resolved
        }
    }

    async fn resolve_sources(&self, include: &Include, request_headers: &HeaderMap) -> ResolvedFragment {
        let timeout = include
            .timeout_override
            .unwrap_or_else(|| self.config.fragment_request_timeout());
        let mut tally = Tally::default();

        let sources = [
            (Resolution::Primary, Some(include.src.as_str())),
            (Resolution::Fallback, include.fallback_src.as_deref()),
        ];
        for (resolution, src) in sources {
            let Some(src) = src else { continue };
            match self
                .load(src, request_headers, timeout, resolution, &mut tally)
                .await
            {
                Ok((response, outcome)) => return settle(response, outcome, tally),
                Err(e) => {
                    tracing::warn!(
                        include = include.label(),
                        src = %src,
                        resolution = ?resolution,
                        error = %e,
                        "Fragment source failed"
                    );
                    metrics::record_fragment_error(e.kind());
                    tally.errors.push(e);
                }
            }
        }

        match &include.fallback_content {
            Some(content) => settle(
                FragmentResponse::inline(content.clone()),
                FragmentOutcome::FallbackContent,
                tally,
            ),
            None => self.error_fragment(tally),
        }
    }

    /// Load one source through the cache and the single-flight registry.
    async fn load(
        &self,
        src: &str,
        request_headers: &HeaderMap,
        timeout: Duration,
        resolution: Resolution,
        tally: &mut Tally,
    ) -> Result<(FragmentResponse, FragmentOutcome), FetchError> {
        let url = parse_fragment_url(src)?;
        let fingerprint = Fingerprint::new(url.as_str(), request_headers, &self.vary_headers);
        let fallback = resolution == Resolution::Fallback;

        if let Some(hit) = self.cache.get(&fingerprint) {
            tally.cache_hits += 1;
            metrics::record_cache_lookup("hit");
            tracing::trace!(fingerprint = %fingerprint, "Fragment cache hit");
            let outcome = if fallback {
                FragmentOutcome::FallbackSrc
            } else {
                FragmentOutcome::CacheHit
            };
            return Ok((hit, outcome));
        }
        tally.cache_misses += 1;

        let request = FragmentRequest {
            url,
            headers: self.forward_headers(request_headers),
            timeout,
        };
        let client = self.client.clone();
        let default_ttl = self.config.default_fragment_ttl();
        let (flight, role) = self
            .cache
            .fetch_once(fingerprint, move || fetch_fragment(client, request, default_ttl));

        let response = match role {
            FlightRole::Leader => {
                metrics::record_cache_lookup("miss");
                flight.await?
            }
            FlightRole::Follower => {
                metrics::record_cache_lookup("joined");
                // the shared fetch runs on the leader's timeout; this wait is bounded by ours
                match time::timeout(timeout, flight).await {
                    Ok(result) => result?,
                    Err(_) => return Err(FetchError::Timeout(timeout)),
                }
            }
        };

        let outcome = match (fallback, role) {
            (true, _) => FragmentOutcome::FallbackSrc,
            (false, FlightRole::Leader) => FragmentOutcome::Fetched,
            (false, FlightRole::Follower) => FragmentOutcome::Joined,
        };
        Ok((response, outcome))
    }

    fn forward_headers(&self, request_headers: &HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for name in &self.forwarded_headers {
            for value in request_headers.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        headers
    }

    fn error_fragment(&self, tally: Tally) -> ResolvedFragment {
        let status = tally
            .errors
            .first()
            .map(FetchError::status_code)
            .unwrap_or(StatusCode::BAD_GATEWAY);
        settle(
            FragmentResponse::error(status, self.config.error_fragment_content.clone()),
            FragmentOutcome::ErrorContent,
            tally,
        )
    }
}

fn settle(response: FragmentResponse, outcome: FragmentOutcome, tally: Tally) -> ResolvedFragment {
    ResolvedFragment {
        response,
        outcome,
        cache_hits: tally.cache_hits,
        cache_misses: tally.cache_misses,
        errors: tally.errors,
        elapsed: Duration::ZERO,
    }
}

fn parse_fragment_url(src: &str) -> Result<Url, FetchError> {
    let url = Url::parse(src.trim()).map_err(|e| FetchError::InvalidUrl(format!("{src}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(FetchError::InvalidUrl(format!(
            "{src}: unsupported scheme {scheme}"
        ))),
    }
}

/// The shared fetch run by a single-flight leader.
fn fetch_fragment(
    client: Arc<dyn FragmentClient>,
    request: FragmentRequest,
    default_ttl: Duration,
) -> BoxFuture<'static, FetchResult> {
    Box::pin(async move {
        let started = Instant::now();
        let timeout = request.timeout;
        let fetched = match time::timeout(timeout, client.fetch(request)).await {
            Ok(result) => result?,
            Err(_) => return Err(FetchError::Timeout(timeout)),
        };

        metrics::record_fragment_fetch(fetched.status.as_u16(), started.elapsed());
        if !fetched.status.is_success() {
            return Err(FetchError::Status(fetched.status.as_u16()));
        }
        Ok(FragmentResponse::from_fetched(fetched, default_ttl))
    })
}
