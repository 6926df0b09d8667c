//! Throttled form submission
//!
//! Providers that hand out final links only after a form POST get nervous
//! when hit in parallel, so submissions for one page share a small permit
//! pool and each permit is held for a cooldown after its request finishes.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::{Fetch, FetchRequest};
use crate::config::FormConfig;
use crate::parser::dooplay::extract_play_sources;
use crate::types::{Quality, ResolvedVideo, rank_videos};

/// One form POST to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSubmission {
    /// Absolute action URL
    pub action: String,
    pub fields: Vec<(String, String)>,
    /// Page the form was found on, sent as `Referer`
    pub referer: String,
}

/// Resolves form submissions with bounded concurrency and a cooldown
pub struct FormResolver {
    fetcher: Arc<dyn Fetch>,
    permits: usize,
    cooldown: Duration,
}

impl FormResolver {
    pub fn new(fetcher: Arc<dyn Fetch>, config: &FormConfig) -> Self {
        Self {
            fetcher,
            permits: config.permits.max(1),
            cooldown: config.cooldown(),
        }
    }

    /// Submits every form and merges what they return
    ///
    /// Failed submissions contribute nothing. The merged list is
    /// deduplicated by `(quality, mirror_label)` and ranked.
    pub async fn resolve_all(
        &self,
        submissions: Vec<FormSubmission>,
        cancel: &CancellationToken,
    ) -> Vec<ResolvedVideo> {
        if submissions.is_empty() {
            return Vec::new();
        }

        let permits = Semaphore::new(self.permits);
        let results = join_all(
            submissions
                .into_iter()
                .map(|submission| self.submit(submission, &permits, cancel)),
        )
        .await;

        let mut seen = Vec::new();
        let merged: Vec<ResolvedVideo> = results
            .into_iter()
            .flatten()
            .filter(|video| {
                let key = (video.quality, video.mirror_label.clone());
                if seen.contains(&key) {
                    false
                } else {
                    seen.push(key);
                    true
                }
            })
            .collect();

        rank_videos(merged)
    }

    async fn submit(
        &self,
        submission: FormSubmission,
        permits: &Semaphore,
        cancel: &CancellationToken,
    ) -> Vec<ResolvedVideo> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Vec::new(),
            permit = permits.acquire() => permit,
        };
        let Ok(_permit) = permit else {
            return Vec::new();
        };

        let request = FetchRequest::form(&submission.action, submission.fields)
            .with_referer(&submission.referer);
        let videos = match self.fetcher.fetch(request, cancel).await {
            Ok(html) => videos_from_response(&html),
            Err(e) => {
                tracing::debug!(action = %submission.action, error = %e, "form submission failed");
                Vec::new()
            }
        };
        tracing::debug!(action = %submission.action, count = videos.len(), "form submission resolved");

        // Hold the permit through the cooldown
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.cooldown) => {}
        }

        videos
    }
}

/// Anchor text labels a source when present, otherwise its host
fn videos_from_response(html: &str) -> Vec<ResolvedVideo> {
    extract_play_sources(html)
        .into_iter()
        .map(|source| {
            let quality = match source.label.as_deref().map(Quality::from_text) {
                Some(q) if q != Quality::Unknown => q,
                _ => Quality::from_text(&source.url),
            };
            let label = source.label.unwrap_or_else(|| {
                Url::parse(&source.url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_default()
            });
            ResolvedVideo::new(source.url, quality, label)
        })
        .collect()
}
