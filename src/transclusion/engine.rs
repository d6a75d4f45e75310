//! Transclusion engine facade.
//!
//! # Data Flow
//! ```text
//! resolve_includes(markup, request headers)
//!     → size check (SizeLimitExceeded, before parsing)
//!     → DirectiveParser::parse
//!     → FragmentResolver::resolve_until × N (bounded, order-preserving)
//!     → ResultAssembler::assemble
//!     → TransclusionResult
//! ```

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use http::HeaderMap;
use tokio::runtime::Handle;
use tokio::time::Instant;

use crate::cache::FragmentCache;
use crate::config::TransclusionConfig;
use crate::error::TransclusionError;
use crate::fragment::{FragmentClient, FragmentResolver, HttpFragmentClient, ResolvedFragment};
use crate::include::{DirectiveParser, Segment};
use crate::lifecycle::{AbortSignal, Shutdown};
use crate::observability::metrics;
use crate::transclusion::assembler::ResultAssembler;
use crate::transclusion::result::TransclusionResult;

/// Entry point for hosts. Build once and share; the fragment cache lives as
/// long as the engine.
pub struct Transcluder {
    config: Arc<TransclusionConfig>,
    parser: DirectiveParser,
    resolver: FragmentResolver,
    assembler: ResultAssembler,
    shutdown: Shutdown,
}

impl Transcluder {
    /// Create an engine fetching fragments over HTTP.
    pub fn new(config: TransclusionConfig) -> Result<Self, TransclusionError> {
        let client = HttpFragmentClient::new()?;
        Ok(Self::with_client(config, Arc::new(client)))
    }

    /// Create an engine with a custom fragment transport.
    ///
    /// When called inside a Tokio runtime the cache sweeper is started; it
    /// stops when the engine is dropped.
    pub fn with_client(config: TransclusionConfig, client: Arc<dyn FragmentClient>) -> Self {
        let config = Arc::new(config);
        let cache = FragmentCache::new(config.cache_max_size_bytes);
        let shutdown = Shutdown::new();

        if Handle::try_current().is_ok() {
            cache.spawn_sweeper(config.cache_sweep_interval(), shutdown.subscribe());
        } else {
            tracing::debug!("No runtime available, expired fragments are purged on read only");
        }

        Self {
            parser: DirectiveParser::from_config(&config),
            resolver: FragmentResolver::new(config.clone(), cache, client),
            assembler: ResultAssembler::from_config(&config),
            config,
            shutdown,
        }
    }

    pub fn config(&self) -> &TransclusionConfig {
        &self.config
    }

    pub fn cache(&self) -> &FragmentCache {
        self.resolver.cache()
    }

    /// Resolve every include in `markup`.
    ///
    /// Fails only when `markup` exceeds the configured size ceiling; every
    /// fragment failure degrades to fallback or error content.
    pub async fn resolve_includes(
        &self,
        markup: &str,
        request_headers: &HeaderMap,
    ) -> Result<TransclusionResult, TransclusionError> {
        self.resolve_includes_with_abort(markup, request_headers, &AbortSignal::never())
            .await
    }

    /// Like [`Transcluder::resolve_includes`], substituting error content for
    /// every include still pending when `abort` fires.
    pub async fn resolve_includes_with_abort(
        &self,
        markup: &str,
        request_headers: &HeaderMap,
        abort: &AbortSignal,
    ) -> Result<TransclusionResult, TransclusionError> {
        let started = Instant::now();
        let limit = self.config.max_markup_bytes;
        if markup.len() > limit {
            tracing::warn!(size = markup.len(), limit, "Markup exceeds size limit");
            metrics::record_resolution("rejected", 0, started.elapsed());
            return Err(TransclusionError::SizeLimitExceeded {
                size: markup.len(),
                limit,
            });
        }

        if !self.config.enabled {
            metrics::record_resolution("passthrough", 0, started.elapsed());
            return Ok(self.assembler.assemble(
                vec![Segment::Text(markup.to_string())],
                Vec::new(),
                None,
                started.elapsed(),
            ));
        }

        let segments = self.parser.parse(markup);
        let includes: Vec<_> = segments.iter().filter_map(Segment::as_include).collect();
        let concurrency = self.config.max_concurrent_fragment_fetches.max(1);

        let pending: Vec<_> = includes
            .iter()
            .map(|include| self.resolver.resolve_until(include, request_headers, abort))
            .collect();
        let resolved: Vec<ResolvedFragment> = stream::iter(pending)
            .buffered(concurrency)
            .collect()
            .await;

        let include_count = resolved.len();
        let result = self
            .assembler
            .assemble(segments, resolved, None, started.elapsed());

        let stats = result.stats();
        tracing::debug!(
            includes = include_count,
            cache_hits = stats.cache_hits,
            cache_misses = stats.cache_misses,
            errors = stats.errors,
            duration_ms = stats.duration_ms,
            "Includes resolved"
        );
        metrics::record_resolution("ok", include_count, started.elapsed());
        Ok(result)
    }
}

impl Drop for Transcluder {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
