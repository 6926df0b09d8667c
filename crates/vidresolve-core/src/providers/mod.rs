//! Provider dispatch
//!
//! A page is routed to exactly one adapter by host name before anything is
//! fetched. Every adapter funnels its candidates through
//! [`ProviderContext::vet`], which applies CDN rewriting and the security
//! gate, so no provider can surface an unchecked URL.

pub mod generic;
pub mod imvbox;
pub mod namakade;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cdn::CdnRewriter;
use crate::client::Fetch;
use crate::error::Result;
use crate::forms::FormResolver;
use crate::race::MirrorRacer;
use crate::security::SecurityGate;
use crate::types::{Quality, ResolvedVideo};

/// Adapter selected for a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// imvbox.com: HLS manifest or YouTube embed on the `/play` page
    Imvbox,
    /// namakade.com: `<video>` sources and inline episode JSON
    Namakade,
    /// Everything else: DooPlay extraction chain
    Generic,
}

impl Provider {
    /// Picks the adapter from the host of an already gate-approved URL
    pub fn route(page_url: &Url) -> Self {
        let host = page_url.host_str().unwrap_or("").to_ascii_lowercase();
        let matches = |domain: &str| {
            host == domain
                || host
                    .strip_suffix(domain)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        };

        if matches("imvbox.com") {
            Provider::Imvbox
        } else if matches("namakade.com") {
            Provider::Namakade
        } else {
            Provider::Generic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Imvbox => "imvbox",
            Provider::Namakade => "namakade",
            Provider::Generic => "generic",
        }
    }

    /// Runs the adapter for `page_url`
    ///
    /// # Errors
    /// Propagates failures to fetch or interpret the page itself; failures of
    /// individual strategies are absorbed.
    pub async fn resolve(
        &self,
        ctx: &ProviderContext,
        page_url: &Url,
        cancel: &CancellationToken,
    ) -> Result<Extraction> {
        match self {
            Provider::Imvbox => imvbox::resolve(ctx, page_url, cancel).await,
            Provider::Namakade => namakade::resolve(ctx, page_url, cancel).await,
            Provider::Generic => generic::resolve(ctx, page_url, cancel).await,
        }
    }
}

/// Gate-approved candidates plus how many were turned away
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub videos: Vec<ResolvedVideo>,
    /// Candidates discovered but rejected by the security gate
    pub rejected: usize,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    /// Appends another extraction's videos and rejection count
    pub fn merge(&mut self, other: Extraction) {
        self.videos.extend(other.videos);
        self.rejected += other.rejected;
    }
}

/// Shared dependencies handed to every adapter
#[derive(Clone)]
pub struct ProviderContext {
    pub fetcher: Arc<dyn Fetch>,
    pub gate: Arc<SecurityGate>,
    pub rewriter: Arc<CdnRewriter>,
    pub racer: MirrorRacer,
    pub forms: Arc<FormResolver>,
}

impl ProviderContext {
    /// Context for one resolution, with the CDN mirror list fixed at call start
    pub fn pinned(&self) -> Self {
        Self {
            rewriter: Arc::new(self.rewriter.pinned()),
            ..self.clone()
        }
    }

    /// Rewrites fake CDN hosts, then keeps only gate-approved candidates
    ///
    /// Approved URLs are replaced by their normalized HTTPS form.
    pub fn vet(&self, candidates: Vec<ResolvedVideo>) -> Extraction {
        let mut extraction = Extraction::default();
        for video in self.rewriter.rewrite_all(candidates) {
            match self.gate.normalize(&video.url) {
                Some(url) => extraction.videos.push(ResolvedVideo { url, ..video }),
                None => {
                    tracing::debug!(url = %video.url, "candidate rejected by security gate");
                    extraction.rejected += 1;
                }
            }
        }
        extraction
    }
}

/// Quality from the URL, falling back to a label such as `"Server 2 - 1080p"`
pub(crate) fn quality_hint(url: &str, label: Option<&str>) -> Quality {
    match Quality::from_text(url) {
        Quality::Unknown => label.map(Quality::from_text).unwrap_or(Quality::Unknown),
        quality => quality,
    }
}

/// Host of `url`, used as a fallback mirror label
pub(crate) fn host_label(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{CdnMirrors, FormConfig, RaceConfig};
    use crate::error::ResolveError;
    use crate::client::FetchRequest;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Serves canned bodies keyed by URL; anything else is a 404
    #[derive(Default)]
    pub(crate) struct CannedFetch {
        pub(crate) bodies: HashMap<String, String>,
    }

    impl CannedFetch {
        pub(crate) fn with(mut self, url: &str, body: &str) -> Self {
            self.bodies.insert(url.to_string(), body.to_string());
            self
        }
    }

    #[async_trait]
    impl Fetch for CannedFetch {
        async fn fetch(&self, request: FetchRequest, cancel: &CancellationToken) -> Result<String> {
            if cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }
            self.bodies
                .get(&request.url)
                .cloned()
                .ok_or(ResolveError::NotFound(request.url))
        }
    }

    pub(crate) fn context(fetch: CannedFetch) -> ProviderContext {
        let fetcher: Arc<dyn Fetch> = Arc::new(fetch);
        ProviderContext {
            fetcher: fetcher.clone(),
            gate: Arc::new(SecurityGate::new([
                "farsiland.com",
                "farsiplex.com",
                "namakade.com",
                "imvbox.com",
                "negahestan.com",
                "farsicdn.buzz",
                "youtube.com",
            ])),
            rewriter: Arc::new(
                CdnRewriter::new(
                    r"^media\.iranproud\d*\.net$",
                    CdnMirrors::new(["media.negahestan.com"]),
                )
                .unwrap(),
            ),
            racer: MirrorRacer::new(RaceConfig {
                endpoints: 5,
                budget_ms: 2_000,
                grace_ms: 100,
            }),
            forms: Arc::new(FormResolver::new(
                fetcher,
                &FormConfig {
                    permits: 2,
                    cooldown_ms: 1,
                },
            )),
        }
    }

    #[test]
    fn test_route_by_host() {
        let route = |u: &str| Provider::route(&Url::parse(u).unwrap());
        assert_eq!(route("https://www.imvbox.com/en/movies/x"), Provider::Imvbox);
        assert_eq!(route("https://imvbox.com/en/movies/x"), Provider::Imvbox);
        assert_eq!(route("https://namakade.com/series/x"), Provider::Namakade);
        assert_eq!(route("https://farsiland.com/movies/x/"), Provider::Generic);
        assert_eq!(route("https://notimvbox.com/x"), Provider::Generic);
    }

    #[test]
    fn test_vet_rewrites_and_rejects() {
        let ctx = context(CannedFetch::default());
        let extraction = ctx.vet(vec![
            ResolvedVideo::new("http://media.iranproud2.net/a.mp4", Quality::P720, "x"),
            ResolvedVideo::new("https://evil.example/b.mp4", Quality::P1080, "y"),
            ResolvedVideo::new("http://farsicdn.buzz/c.mp4", Quality::P480, "z"),
        ]);

        let urls: Vec<&str> = extraction.videos.iter().map(|v| v.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://media.negahestan.com/a.mp4", "https://farsicdn.buzz/c.mp4"]
        );
        assert_eq!(extraction.rejected, 1);
    }

    #[test]
    fn test_pinned_context_ignores_mirror_reload() {
        let ctx = context(CannedFetch::default());
        let pinned = ctx.pinned();
        ctx.rewriter.mirrors().replace(["cdn9.negahestan.com"]);

        let candidate = || vec![ResolvedVideo::new("https://media.iranproud.net/a.mp4", Quality::P720, "x")];
        assert_eq!(pinned.vet(candidate()).videos[0].url, "https://media.negahestan.com/a.mp4");
        assert_eq!(ctx.vet(candidate()).videos[0].url, "https://cdn9.negahestan.com/a.mp4");
    }

    #[test]
    fn test_quality_hint() {
        assert_eq!(quality_hint("https://x/a.720p.mp4", Some("1080p")), Quality::P720);
        assert_eq!(quality_hint("https://x/a.mp4", Some("Server 2 - 1080p")), Quality::P1080);
        assert_eq!(quality_hint("https://x/a.mp4", None), Quality::Unknown);
    }
}
