//! Main resolver API
//!
//! Ties the pipeline together: security gate, cache, provider dispatch,
//! manifest expansion, re-validation and ranking, all under one overall
//! deadline and one cancellation token per call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::{LruTtlCache, ResultCache};
use crate::cdn::CdnRewriter;
use crate::client::{BoundedReader, Fetch, FetchRequest};
use crate::config::{CdnMirrors, ResolverConfig};
use crate::error::{ResolveError, Result};
use crate::forms::FormResolver;
use crate::parser::hls::expand_manifest;
use crate::providers::{Provider, ProviderContext};
use crate::race::MirrorRacer;
use crate::security::SecurityGate;
use crate::types::{CacheStats, Quality, ResolutionOutcome, ResolvedVideo, rank_videos};

/// Resolves content pages into ranked, directly playable video URLs
///
/// Cheap to share behind an `Arc`; concurrent calls for different pages
/// are independent and only share the result cache.
pub struct VideoResolver {
    ctx: ProviderContext,
    cache: Arc<dyn ResultCache>,
    mirrors: CdnMirrors,
    overall_timeout: Duration,
}

impl VideoResolver {
    /// Create a resolver with default configuration
    ///
    /// # Errors
    /// Returns error if HTTP client initialization fails
    pub fn new() -> Result<Self> {
        Self::with_config(ResolverConfig::default())
    }

    /// Create a resolver with custom configuration
    ///
    /// # Arguments
    /// * `config` - Resolver configuration, validated before use
    ///
    /// # Errors
    /// - `Config` if the configuration is invalid
    /// - `HttpError` if HTTP client initialization fails
    pub fn with_config(config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        let reader = BoundedReader::with_gate(
            config.limits.clone(),
            SecurityGate::new(&config.trusted_domains),
        )?;
        let fetcher: Arc<dyn Fetch> = Arc::new(reader);
        Self::with_fetcher(config, fetcher)
    }

    /// Create a resolver that performs all I/O through `fetcher`
    ///
    /// # Errors
    /// Returns `Config` if the configuration is invalid
    pub fn with_fetcher(config: ResolverConfig, fetcher: Arc<dyn Fetch>) -> Result<Self> {
        let cache: Arc<dyn ResultCache> =
            Arc::new(LruTtlCache::new(config.cache.capacity, config.cache.ttl()));
        Self::with_parts(config, fetcher, cache)
    }

    /// Create a resolver from explicit fetch and cache implementations
    ///
    /// # Errors
    /// Returns `Config` if the configuration is invalid
    pub fn with_parts(
        config: ResolverConfig,
        fetcher: Arc<dyn Fetch>,
        cache: Arc<dyn ResultCache>,
    ) -> Result<Self> {
        config.validate()?;

        let mirrors = CdnMirrors::new(config.cdn_mirrors.iter().map(String::as_str));
        let rewriter = CdnRewriter::new(&config.fake_cdn_pattern, mirrors.clone())?;
        let ctx = ProviderContext {
            fetcher: Arc::clone(&fetcher),
            gate: Arc::new(SecurityGate::new(&config.trusted_domains)),
            rewriter: Arc::new(rewriter),
            racer: MirrorRacer::new(config.race.clone()),
            forms: Arc::new(FormResolver::new(fetcher, &config.forms)),
        };

        Ok(Self {
            ctx,
            cache,
            mirrors,
            overall_timeout: config.overall_timeout(),
        })
    }

    /// Resolve a content page
    ///
    /// # Arguments
    /// * `page_url` - Content page URL on a trusted domain
    ///
    /// # Returns
    /// Exactly one [`ResolutionOutcome`]; never panics or errors out.
    ///
    /// # Example
    /// ```no_run
    /// # async fn example() -> vidresolve_core::Result<()> {
    /// use vidresolve_core::{ResolutionOutcome, VideoResolver};
    /// let resolver = VideoResolver::new()?;
    /// match resolver.resolve("https://farsiland.com/episodes/shoghal-s01e02/").await {
    ///     ResolutionOutcome::Success(videos) => {
    ///         for video in videos {
    ///             println!("{} {}", video.quality, video.url);
    ///         }
    ///     }
    ///     other => println!("nothing playable: {:?}", other),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn resolve(&self, page_url: &str) -> ResolutionOutcome {
        self.resolve_with_cancel(page_url, &CancellationToken::new()).await
    }

    /// Resolve a content page, aborting when `cancel` fires
    ///
    /// Cancelling releases every in-flight connection of this call and
    /// yields `NetworkError`. Nothing is cached for cancelled calls.
    pub async fn resolve_with_cancel(
        &self,
        page_url: &str,
        cancel: &CancellationToken,
    ) -> ResolutionOutcome {
        let Some(page) = self.ctx.gate.normalize_url(page_url) else {
            tracing::warn!(url = page_url, "page rejected by security gate");
            return ResolveError::SecurityRejected(format!(
                "not an HTTPS URL on a trusted domain: {}",
                page_url
            ))
            .into_outcome();
        };
        let key = page.to_string();

        if let Some(videos) = self.cache.get(&key) {
            tracing::debug!(url = %key, count = videos.len(), "cache hit");
            return ResolutionOutcome::Success(videos);
        }

        let started = Instant::now();
        let call = cancel.child_token();
        let result = tokio::select! {
            biased;
            _ = call.cancelled() => Err(ResolveError::Cancelled),
            timed = tokio::time::timeout(self.overall_timeout, self.resolve_uncached(&page, &call)) => {
                timed.unwrap_or(Err(ResolveError::Timeout(self.overall_timeout.as_secs())))
            }
        };
        // Stops anything the pipeline left behind
        call.cancel();

        let outcome = result.map_or_else(ResolveError::into_outcome, ResolutionOutcome::Success);
        if let ResolutionOutcome::Success(videos) = &outcome {
            self.cache.put(&key, videos.clone());
        }

        tracing::info!(
            url = %key,
            outcome = outcome.kind(),
            count = outcome.videos().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "resolve finished"
        );
        outcome
    }

    async fn resolve_uncached(
        &self,
        page: &Url,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResolvedVideo>> {
        let provider = Provider::route(page);
        tracing::debug!(url = %page, provider = provider.as_str(), "dispatching");

        // Mirror reloads from here on apply to the next call
        let ctx = self.ctx.pinned();
        let extraction = provider.resolve(&ctx, page, cancel).await?;
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        if extraction.is_empty() {
            return Err(if extraction.rejected > 0 {
                ResolveError::SecurityRejected(format!(
                    "all {} discovered URLs failed the security gate",
                    extraction.rejected
                ))
            } else {
                ResolveError::NotFound(format!(
                    "no playable media found by {} provider",
                    provider.as_str()
                ))
            });
        }

        let expanded = self.expand_manifests(extraction.videos, cancel).await;
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        let vetted = ctx.vet(expanded);
        if vetted.is_empty() {
            return Err(ResolveError::SecurityRejected(format!(
                "all {} expanded URLs failed the security gate",
                vetted.rejected
            )));
        }

        Ok(rank_videos(vetted.videos))
    }

    /// Replaces unknown-quality HLS manifests with their variants
    async fn expand_manifests(
        &self,
        videos: Vec<ResolvedVideo>,
        cancel: &CancellationToken,
    ) -> Vec<ResolvedVideo> {
        let expansions = join_all(videos.into_iter().map(|video| async move {
            if !video.is_manifest() || video.quality != Quality::Unknown {
                return vec![video];
            }

            let request = FetchRequest::html(&video.url);
            match self.ctx.fetcher.fetch(request, cancel).await {
                Ok(text) => {
                    let variants = expand_manifest(&text, &video.url, &video.mirror_label);
                    tracing::debug!(url = %video.url, count = variants.len(), "manifest expanded");
                    variants
                }
                Err(e) => {
                    tracing::debug!(url = %video.url, error = %e, "manifest fetch failed, keeping original");
                    vec![video]
                }
            }
        }))
        .await;

        expansions.into_iter().flatten().collect()
    }

    /// Drop every cached result
    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::info!("result cache cleared");
    }

    /// Drop the cached result for one page
    ///
    /// `http://` and `https://` forms of the same page share one entry.
    pub fn evict_cache(&self, page_url: &str) {
        if let Some(key) = self.ctx.gate.normalize(page_url) {
            self.cache.evict(&key);
            tracing::debug!(url = %key, "cache entry evicted");
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Live CDN mirror list; replacing it affects subsequent calls only
    pub fn cdn_mirrors(&self) -> &CdnMirrors {
        &self.mirrors
    }

    pub fn security_gate(&self) -> &SecurityGate {
        &self.ctx.gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::tests::CannedFetch;

    fn resolver(fetch: CannedFetch) -> VideoResolver {
        VideoResolver::with_fetcher(ResolverConfig::default(), Arc::new(fetch)).unwrap()
    }

    #[test]
    fn test_resolver_creation() {
        assert!(VideoResolver::new().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ResolverConfig {
            trusted_domains: Vec::new(),
            ..ResolverConfig::default()
        };
        assert!(matches!(
            VideoResolver::with_config(config),
            Err(ResolveError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_untrusted_page_rejected_without_fetch() {
        let outcome = resolver(CannedFetch::default())
            .resolve("https://evil.example/movies/x/")
            .await;
        assert!(matches!(
            outcome,
            ResolutionOutcome::SecurityRejected(ref message)
                if message.starts_with("Rejected by security policy")
        ));
    }

    #[tokio::test]
    async fn test_all_candidates_rejected_maps_through_error() {
        let page = "https://farsiland.com/tvshows/shoghal/";
        let html = r#"<a href="https://evil.example/shoghal.mp4">download</a>"#;
        let outcome = resolver(CannedFetch::default().with(page, html))
            .resolve(page)
            .await;
        assert!(matches!(
            outcome,
            ResolutionOutcome::SecurityRejected(ref message)
                if message.starts_with("Rejected by security policy: all")
        ));
    }

    #[tokio::test]
    async fn test_missing_page_is_no_data() {
        let outcome = resolver(CannedFetch::default())
            .resolve("https://farsiland.com/tvshows/x/")
            .await;
        assert!(matches!(
            outcome,
            ResolutionOutcome::NoDataFound(ref message) if message.starts_with("Not found")
        ));
    }

    #[tokio::test]
    async fn test_success_is_cached_under_https_key() {
        let page = "https://farsiland.com/movies/yek-shab/";
        let html = r#"<script>var f = "https://farsicdn.buzz/m/yek-shab.720p.mp4";</script>"#;
        let resolver = resolver(CannedFetch::default().with(page, html));

        let outcome = resolver.resolve("http://farsiland.com/movies/yek-shab/").await;
        assert!(outcome.is_success());
        assert_eq!(resolver.cache_stats().entry_count, 1);

        resolver.evict_cache("http://farsiland.com/movies/yek-shab/");
        assert_eq!(resolver.cache_stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_pre_cancelled_call() {
        let page = "https://farsiland.com/movies/yek-shab/";
        let resolver = resolver(CannedFetch::default().with(page, "<p></p>"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = resolver.resolve_with_cancel(page, &cancel).await;
        assert_eq!(
            outcome,
            ResolutionOutcome::NetworkError("Request cancelled".to_string())
        );
        assert_eq!(resolver.cache_stats().entry_count, 0);
    }
}
