//! Generic extraction chain for DooPlay sites
//!
//! Strategies run in a fixed order and the first one that yields a
//! gate-approved candidate wins. Later strategies are progressively less
//! precise, ending with URLs synthesized from the page slug.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use url::Url;

use super::{Extraction, ProviderContext, host_label, quality_hint};
use crate::client::{Fetch, FetchRequest};
use crate::error::{ResolveError, Result};
use crate::forms::FormSubmission;
use crate::parser::dooplay::{
    extract_microdata, find_content_type, find_post_id, is_media_url, parse_player_options,
    parse_player_response, parse_watch_forms, player_api_url, scan_media_urls,
};
use crate::security::SecurityGate;
use crate::types::{Quality, ResolvedVideo};
use crate::url::{origin, parse_page_slug, synthesize_url};

/// Extraction strategies in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    PlayerApi,
    Microdata,
    DownloadForms,
    RawScan,
    Synthesis,
}

impl Strategy {
    pub const ORDER: [Strategy; 5] = [
        Strategy::PlayerApi,
        Strategy::Microdata,
        Strategy::DownloadForms,
        Strategy::RawScan,
        Strategy::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::PlayerApi => "player_api",
            Strategy::Microdata => "microdata",
            Strategy::DownloadForms => "download_forms",
            Strategy::RawScan => "raw_scan",
            Strategy::Synthesis => "synthesis",
        }
    }
}

/// Fetches the page and runs the strategy chain
///
/// # Errors
/// Returns the fetch error if the page itself cannot be read, or
/// `Cancelled` if `cancel` fires between strategies.
pub async fn resolve(
    ctx: &ProviderContext,
    page_url: &Url,
    cancel: &CancellationToken,
) -> Result<Extraction> {
    let html = ctx
        .fetcher
        .fetch(FetchRequest::html(page_url.as_str()), cancel)
        .await?;

    let mut rejected = 0;
    for strategy in Strategy::ORDER {
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        let candidates = match strategy {
            Strategy::PlayerApi => player_api(ctx, page_url, &html, cancel).await,
            Strategy::Microdata => microdata(&html),
            Strategy::DownloadForms => download_forms(ctx, page_url, &html, cancel).await,
            Strategy::RawScan => raw_scan(&html),
            Strategy::Synthesis => synthesis(ctx, page_url),
        };

        let found = candidates.len();
        let vetted = ctx.vet(candidates);
        tracing::debug!(
            strategy = strategy.as_str(),
            found,
            approved = vetted.videos.len(),
            rejected = vetted.rejected,
            "strategy finished"
        );

        rejected += vetted.rejected;
        if !vetted.is_empty() {
            return Ok(Extraction {
                videos: vetted.videos,
                rejected,
            });
        }
    }

    Ok(Extraction {
        videos: Vec::new(),
        rejected,
    })
}

// ---------------------------------------------------------------------------
// 1. Player API, raced across numbered endpoints
// ---------------------------------------------------------------------------

async fn player_api(
    ctx: &ProviderContext,
    page_url: &Url,
    html: &str,
    cancel: &CancellationToken,
) -> Vec<ResolvedVideo> {
    let Some(post_id) = find_post_id(html) else {
        tracing::debug!(url = %page_url, "no post id on page");
        return Vec::new();
    };
    let content_type = find_content_type(html, page_url);
    let options = parse_player_options(html);
    let endpoints = ctx.racer.config().endpoints;

    ctx.racer
        .race(endpoints, cancel, |index, token| {
            let nume = index + 1;
            let worker = PlayerWorker {
                fetcher: Arc::clone(&ctx.fetcher),
                gate: Arc::clone(&ctx.gate),
                api_url: player_api_url(page_url, &post_id, &content_type, nume),
                page_url: page_url.to_string(),
                label: options
                    .iter()
                    .find(|o| o.nume as usize == nume)
                    .map(|o| o.label.clone())
                    .filter(|l| !l.is_empty()),
                nume,
            };
            worker.run(token)
        })
        .await
}

/// Owned state of one racing player API lookup
struct PlayerWorker {
    fetcher: Arc<dyn Fetch>,
    gate: Arc<SecurityGate>,
    api_url: Option<String>,
    page_url: String,
    label: Option<String>,
    nume: usize,
}

impl PlayerWorker {
    async fn run(self, cancel: CancellationToken) -> Vec<ResolvedVideo> {
        let Some(api_url) = self.api_url.as_deref() else {
            return Vec::new();
        };

        let request = FetchRequest::json(api_url).with_referer(&self.page_url);
        let json = match self.fetcher.fetch(request, &cancel).await {
            Ok(json) => json,
            Err(e) => {
                tracing::debug!(endpoint = self.nume, error = %e, "player endpoint failed");
                return Vec::new();
            }
        };

        let target = match parse_player_response(&json) {
            Ok(Some(target)) => target,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::debug!(endpoint = self.nume, error = %e, "unusable player response");
                return Vec::new();
            }
        };

        let urls = if is_media_url(&target) {
            vec![target]
        } else {
            self.follow_embed(&target, &cancel).await
        };

        let mirror_label = self
            .label
            .clone()
            .unwrap_or_else(|| format!("Server {}", self.nume));
        urls.into_iter()
            .map(|url| {
                let quality = quality_hint(&url, self.label.as_deref());
                ResolvedVideo::new(url, quality, mirror_label.clone())
            })
            .collect()
    }

    /// Fetches a non-media embed page once and scans it for media URLs
    async fn follow_embed(&self, target: &str, cancel: &CancellationToken) -> Vec<String> {
        let Some(embed_url) = self.gate.normalize(target) else {
            tracing::debug!(endpoint = self.nume, target, "embed page not trusted");
            return Vec::new();
        };

        let request = FetchRequest::html(embed_url).with_referer(&self.page_url);
        match self.fetcher.fetch(request, cancel).await {
            Ok(body) => scan_media_urls(&body),
            Err(e) => {
                tracing::debug!(endpoint = self.nume, error = %e, "embed page failed");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Microdata
// ---------------------------------------------------------------------------

fn microdata(html: &str) -> Vec<ResolvedVideo> {
    extract_microdata(html)
        .into_iter()
        .filter(|url| is_media_url(url))
        .map(|url| {
            let label = host_label(&url);
            ResolvedVideo::new(&url, Quality::from_text(&url), label)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// 3. Download forms
// ---------------------------------------------------------------------------

async fn download_forms(
    ctx: &ProviderContext,
    page_url: &Url,
    html: &str,
    cancel: &CancellationToken,
) -> Vec<ResolvedVideo> {
    let default_action = format!("{}/play/", origin(page_url));
    let submissions: Vec<FormSubmission> = parse_watch_forms(html)
        .into_iter()
        .filter_map(|form| {
            let action = match form.action.as_deref() {
                Some(action) => page_url.join(action).ok()?.to_string(),
                None => default_action.clone(),
            };
            let Some(action) = ctx.gate.normalize(&action) else {
                tracing::debug!(action = %action, "form action not trusted");
                return None;
            };
            Some(FormSubmission {
                action,
                fields: form.fields,
                referer: page_url.to_string(),
            })
        })
        .collect();

    if submissions.is_empty() {
        return Vec::new();
    }
    ctx.forms.resolve_all(submissions, cancel).await
}

// ---------------------------------------------------------------------------
// 4. Raw scan
// ---------------------------------------------------------------------------

fn raw_scan(html: &str) -> Vec<ResolvedVideo> {
    scan_media_urls(html)
        .into_iter()
        .map(|url| {
            let label = host_label(&url);
            ResolvedVideo::new(&url, Quality::from_text(&url), label)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// 5. Synthesis
// ---------------------------------------------------------------------------

fn synthesis(ctx: &ProviderContext, page_url: &Url) -> Vec<ResolvedVideo> {
    let Some(slug) = parse_page_slug(page_url) else {
        return Vec::new();
    };

    ctx.rewriter
        .mirrors()
        .snapshot()
        .iter()
        .map(|mirror| {
            let url = synthesize_url(mirror, &slug);
            ResolvedVideo::new(&url, Quality::from_text(&url), mirror.as_str())
        })
        .collect()
}
