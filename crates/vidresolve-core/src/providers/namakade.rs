//! Namakade adapter
//!
//! Movie pages carry a plain `<video>` element. Episode pages instead ship
//! the player data as an inline script variable,
//! `var seriesepisode_respose = {...};`, whose `video_url` array lists
//! Android and iOS renditions.

use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{Extraction, ProviderContext, quality_hint};
use crate::client::FetchRequest;
use crate::error::{ResolveError, Result};
use crate::parser::dooplay::decode_html_entities;
use crate::types::ResolvedVideo;

const EPISODE_VAR: &str = "seriesepisode_respose";

#[derive(Debug, Deserialize)]
struct EpisodeResponse {
    #[serde(default)]
    video_url: Vec<Value>,
}

pub async fn resolve(
    ctx: &ProviderContext,
    page_url: &Url,
    cancel: &CancellationToken,
) -> Result<Extraction> {
    let html = ctx
        .fetcher
        .fetch(FetchRequest::html(page_url.as_str()), cancel)
        .await?;

    let mut candidates: Vec<ResolvedVideo> = find_video_sources(&html, page_url)
        .into_iter()
        .map(|url| ResolvedVideo::new(&url, quality_hint(&url, None), "Namakade"))
        .collect();

    let episode = parse_episode_urls(&html, page_url);
    match episode {
        Ok(urls) => candidates.extend(
            urls.into_iter()
                .map(|(url, label)| ResolvedVideo::new(&url, quality_hint(&url, None), label)),
        ),
        Err(e) if candidates.is_empty() => return Err(e),
        Err(e) => tracing::debug!(url = %page_url, error = %e, "ignoring malformed episode data"),
    }

    tracing::debug!(url = %page_url, count = candidates.len(), "Namakade candidates found");
    Ok(ctx.vet(candidates))
}

/// `<video>` / `<source>` URLs, joined against the page URL
pub fn find_video_sources(html: &str, page_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("video[src], video source[src]") else {
        return Vec::new();
    };

    let mut urls: Vec<String> = Vec::new();
    for element in document.select(&selector) {
        if let Some(src) = element.value().attr("src")
            && let Ok(url) = page_url.join(&decode_html_entities(src.trim()))
        {
            let url = url.to_string();
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// URLs from the inline episode JSON, Android renditions before iOS
///
/// Returns an empty list when the page has no episode data.
///
/// # Errors
/// Returns `ParseError` if the variable is present but its JSON is malformed
pub fn parse_episode_urls(html: &str, page_url: &Url) -> Result<Vec<(String, String)>> {
    let Ok(re) = Regex::new(&format!(r"var\s+{}\s*=", EPISODE_VAR)) else {
        return Ok(Vec::new());
    };
    let Some(assignment) = re.find(html) else {
        return Ok(Vec::new());
    };
    let json_start = &html[assignment.end()..];

    // The object may contain ';' inside strings, so let serde find its end
    let mut stream = serde_json::Deserializer::from_str(json_start.trim_start())
        .into_iter::<EpisodeResponse>();
    let response = match stream.next() {
        Some(Ok(response)) => response,
        Some(Err(e)) => {
            return Err(ResolveError::ParseError(format!("{}: {}", EPISODE_VAR, e)));
        }
        None => {
            return Err(ResolveError::ParseError(format!("{} is empty", EPISODE_VAR)));
        }
    };

    let mut urls = Vec::new();
    for (key, label) in [("android", "Namakade Android"), ("ios", "Namakade iOS")] {
        for entry in &response.video_url {
            if let Some(raw) = entry.get(key).and_then(Value::as_str)
                && let Ok(url) = page_url.join(raw.trim())
            {
                let url = url.to_string();
                if !urls.iter().any(|(u, _)| u == &url) {
                    urls.push((url, label.to_string()));
                }
            }
        }
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::tests::{CannedFetch, context};

    const MOVIE: &str = "https://namakade.com/best-movies/gisoo";
    const EPISODE: &str = "https://namakade.com/series/shoghal/episode/1";

    fn url(u: &str) -> Url {
        Url::parse(u).unwrap()
    }

    #[test]
    fn test_find_video_sources() {
        let html = r#"<video id="videoTag" class="video-js"><source src="/media/gisoo.mp4" type="video/mp4"></video>"#;
        assert_eq!(
            find_video_sources(html, &url(MOVIE)),
            vec!["https://namakade.com/media/gisoo.mp4".to_string()]
        );
    }

    #[test]
    fn test_parse_episode_urls_android_first() {
        let html = r#"<script>
            var seriesepisode_respose = {"title":"Ep; 1","video_url":[{"ios":"https://media.iranproud2.net/ios/s1e1.m3u8"},{"android":"https://media.iranproud2.net/android/s1e1.mp4"}]};
            var other = 1;
        </script>"#;
        let urls = parse_episode_urls(html, &url(EPISODE)).unwrap();
        assert_eq!(
            urls,
            vec![
                (
                    "https://media.iranproud2.net/android/s1e1.mp4".to_string(),
                    "Namakade Android".to_string()
                ),
                (
                    "https://media.iranproud2.net/ios/s1e1.m3u8".to_string(),
                    "Namakade iOS".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_parse_episode_urls_absent() {
        assert_eq!(parse_episode_urls("<p></p>", &url(EPISODE)).unwrap(), vec![]);
    }

    #[test]
    fn test_parse_episode_urls_malformed() {
        let html = "<script>var seriesepisode_respose = {\"video_url\": [ broken;</script>";
        assert!(matches!(
            parse_episode_urls(html, &url(EPISODE)),
            Err(ResolveError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_movie_rewritten_to_real_cdn() {
        let html = r#"<video id="videoTag"><source src="https://media.iranproud.net/movies/gisoo.mp4"></video>"#;
        let ctx = context(CannedFetch::default().with(MOVIE, html));

        let extraction = resolve(&ctx, &url(MOVIE), &CancellationToken::new()).await.unwrap();
        assert_eq!(extraction.videos.len(), 1);
        assert_eq!(extraction.videos[0].url, "https://media.negahestan.com/movies/gisoo.mp4");
        assert_eq!(extraction.videos[0].mirror_label, "media.negahestan.com");
    }

    #[tokio::test]
    async fn test_malformed_episode_json_is_parse_error() {
        let html = "<script>var seriesepisode_respose = {oops};</script>";
        let ctx = context(CannedFetch::default().with(EPISODE, html));

        let result = resolve(&ctx, &url(EPISODE), &CancellationToken::new()).await;
        assert!(matches!(result, Err(ResolveError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_malformed_episode_json_ignored_when_video_present() {
        let html = r#"<video><source src="https://media.negahestan.com/a.mp4"></video>
            <script>var seriesepisode_respose = {oops};</script>"#;
        let ctx = context(CannedFetch::default().with(EPISODE, html));

        let extraction = resolve(&ctx, &url(EPISODE), &CancellationToken::new()).await.unwrap();
        assert_eq!(extraction.videos.len(), 1);
    }
}
