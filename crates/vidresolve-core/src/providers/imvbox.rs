//! IMVBox adapter
//!
//! Titles are played from `/{lang}/movies/{slug}/play`. Licensed titles
//! embed an HLS manifest; the rest are YouTube embeds, surfaced as the
//! canonical embed URL for the caller's player to handle.

use regex::Regex;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{Extraction, ProviderContext};
use crate::client::FetchRequest;
use crate::error::Result;
use crate::parser::dooplay::{decode_html_entities, scan_media_urls};
use crate::types::{Quality, ResolvedVideo};
use crate::url::ensure_play_path;

const LABEL: &str = "IMVBox";
const YOUTUBE_LABEL: &str = "YouTube";

pub async fn resolve(
    ctx: &ProviderContext,
    page_url: &Url,
    cancel: &CancellationToken,
) -> Result<Extraction> {
    let play_url = ensure_play_path(page_url);
    let request = FetchRequest::html(play_url.as_str()).with_referer(page_url.as_str());
    let html = ctx.fetcher.fetch(request, cancel).await?;

    let manifests: Vec<ResolvedVideo> = find_manifests(&html, &play_url)
        .into_iter()
        .map(|url| ResolvedVideo::new(url, Quality::Unknown, LABEL))
        .collect();
    let mut extraction = ctx.vet(manifests);
    if !extraction.is_empty() {
        tracing::debug!(url = %play_url, count = extraction.videos.len(), "IMVBox manifest found");
        return Ok(extraction);
    }

    if let Some(id) = find_youtube_id(&html) {
        tracing::debug!(url = %play_url, id = %id, "IMVBox falling back to YouTube embed");
        extraction.merge(ctx.vet(vec![ResolvedVideo::new(
            youtube_embed_url(&id),
            Quality::Unknown,
            YOUTUBE_LABEL,
        )]));
    }

    Ok(extraction)
}

/// `https://www.youtube.com/embed/{id}`
pub fn youtube_embed_url(id: &str) -> String {
    format!("https://www.youtube.com/embed/{}", id)
}

/// HLS manifest references in `<source>`/`<video>` tags or scripts
pub fn find_manifests(html: &str, play_url: &Url) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();

    {
        let document = Html::parse_document(html);
        if let Ok(selector) = Selector::parse("video[src], source[src]") {
            for element in document.select(&selector) {
                let Some(src) = element.value().attr("src") else {
                    continue;
                };
                let src = decode_html_entities(src.trim());
                if let Ok(url) = play_url.join(&src) {
                    let url = url.to_string();
                    if is_manifest(&url) && !urls.contains(&url) {
                        urls.push(url);
                    }
                }
            }
        }
    }

    for url in scan_media_urls(html) {
        if is_manifest(&url) && !urls.contains(&url) {
            urls.push(url);
        }
    }

    urls
}

/// 11-character id from a `youtube.com/embed/` or `youtube-nocookie.com/embed/` URL
pub fn find_youtube_id(html: &str) -> Option<String> {
    let re = Regex::new(r"youtube(?:-nocookie)?\.com/embed/([A-Za-z0-9_-]{11})(?:[^A-Za-z0-9_-]|$)").ok()?;
    let text = html.replace("\\/", "/");
    re.captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn is_manifest(url: &str) -> bool {
    url.split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_ascii_lowercase()
        .ends_with(".m3u8")
}
