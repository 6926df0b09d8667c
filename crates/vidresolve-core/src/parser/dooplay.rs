//! DooPlay page parser
//!
//! Extracts everything the generic extraction chain needs from pages built
//! on the DooPlay WordPress theme (farsiland, farsiplex and lookalikes):
//! post ids, player options, microdata, watch/download forms, and raw media
//! references embedded in markup or scripts.

use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use url::Url;

use crate::error::{ResolveError, Result};

/// File extensions treated as directly playable media
pub const MEDIA_EXTENSIONS: [&str; 6] = ["mp4", "m3u8", "mkv", "webm", "mov", "m4v"];

/// A form whose submission may reveal media URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchForm {
    /// Raw `action` attribute, if any
    pub action: Option<String>,
    /// Hidden fields to POST, in document order
    pub fields: Vec<(String, String)>,
}

/// One `li[data-nume]` player option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerOption {
    pub nume: u32,
    pub label: String,
}

/// A media URL found in a `/play/` response, with the anchor text if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaySource {
    pub url: String,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayerResponse {
    embed_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Page metadata
// ---------------------------------------------------------------------------

/// Finds the WordPress post id of the page
///
/// Prefers the hidden `form[id^="watch-"]`, then the first `data-post`.
pub fn find_post_id(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    if let Ok(selector) = Selector::parse(r#"form[id^="watch-"]"#) {
        for form in document.select(&selector) {
            if let Some(id) = form.value().id()
                && let Some(post_id) = id.strip_prefix("watch-")
                && !post_id.is_empty()
                && post_id.chars().all(|c| c.is_ascii_digit())
            {
                return Some(post_id.to_string());
            }
        }
    }

    let selector = Selector::parse("[data-post]").ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("data-post"))
        .map(str::trim)
        .find(|post| !post.is_empty())
        .map(str::to_string)
}

/// Player API content type: `data-type` if present, otherwise from the path
pub fn find_content_type(html: &str, page_url: &Url) -> String {
    let document = Html::parse_document(html);
    if let Ok(selector) = Selector::parse("[data-post][data-type]")
        && let Some(kind) = document
            .select(&selector)
            .filter_map(|el| el.value().attr("data-type"))
            .map(str::trim)
            .find(|kind| !kind.is_empty())
    {
        return kind.to_string();
    }

    let path = page_url.path().to_ascii_lowercase();
    if path.starts_with("/movie/") || path.starts_with("/movies/") {
        "movie".to_string()
    } else {
        "tv".to_string()
    }
}

/// Collects `li[data-nume]` player options with their visible labels
pub fn parse_player_options(html: &str) -> Vec<PlayerOption> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("li[data-nume]") else {
        return Vec::new();
    };
    let title = Selector::parse(".title").ok();

    document
        .select(&selector)
        .filter_map(|el| {
            let nume = el.value().attr("data-nume")?.trim().parse::<u32>().ok()?;
            let text = title
                .as_ref()
                .and_then(|t| el.select(t).next())
                .map(|t| t.text().collect::<String>())
                .unwrap_or_else(|| el.text().collect::<String>());
            Some(PlayerOption {
                nume,
                label: collapse_whitespace(&text),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Player API
// ---------------------------------------------------------------------------

/// Builds `https://{host}/wp-json/dooplayer/v2/{post}/{type}/{n}`
pub fn player_api_url(page_url: &Url, post_id: &str, content_type: &str, nume: usize) -> Option<String> {
    let host = page_url.host_str()?;
    Some(format!(
        "https://{}/wp-json/dooplayer/v2/{}/{}/{}",
        host,
        urlencoding::encode(post_id),
        urlencoding::encode(content_type),
        nume
    ))
}

/// Extracts the embed target from a player API JSON response
///
/// Returns `Ok(None)` when the endpoint has no usable embed.
///
/// # Errors
/// Returns `ParseError` if the body is not the expected JSON object
pub fn parse_player_response(json: &str) -> Result<Option<String>> {
    let response: PlayerResponse = serde_json::from_str(json)
        .map_err(|e| ResolveError::ParseError(format!("player response: {}", e)))?;

    Ok(response
        .embed_url
        .as_deref()
        .and_then(extract_embed_target))
}

/// Interprets an `embed_url` value
///
/// Accepts a plain URL, an `<iframe src>` snippet, or a player URL carrying
/// an encoded `source=` parameter (which is decoded).
pub fn extract_embed_target(embed: &str) -> Option<String> {
    let embed = decode_html_entities(embed.trim());
    if embed.is_empty() {
        return None;
    }

    let target = if embed.contains("<iframe") {
        let fragment = Html::parse_fragment(&embed);
        let selector = Selector::parse("iframe[src]").ok()?;
        let src = fragment.select(&selector).next()?.value().attr("src")?;
        decode_html_entities(src.trim())
    } else {
        embed
    };

    if let Some(source) = decode_source_param(&target) {
        return Some(source);
    }

    absolutize_scheme(&target)
}

// ---------------------------------------------------------------------------
// Microdata & forms
// ---------------------------------------------------------------------------

/// `itemprop` content/embed URLs, decoded through `source=` when present
pub fn extract_microdata(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(
        r#"[itemprop="contentUrl"], [itemprop="contentURL"], [itemprop="embedUrl"], [itemprop="embedURL"]"#,
    ) else {
        return Vec::new();
    };

    let mut urls = Vec::new();
    for element in document.select(&selector) {
        let value = ["content", "href", "src"]
            .iter()
            .find_map(|attr| element.value().attr(attr));
        if let Some(value) = value
            && let Some(url) = extract_embed_target(value)
            && !urls.contains(&url)
        {
            urls.push(url);
        }
    }
    urls
}

/// Forms that lead to a player or download page
///
/// Matches `id` starting with `watch-` or `download`, or an `action`
/// mentioning `download` or `play`. For `watch-{post}` forms an `id` field
/// carrying the post id is added when the form lacks one.
pub fn parse_watch_forms(html: &str) -> Vec<WatchForm> {
    let document = Html::parse_document(html);
    let (Ok(form_sel), Ok(input_sel)) = (
        Selector::parse("form"),
        Selector::parse(r#"input[type="hidden"][name]"#),
    ) else {
        return Vec::new();
    };

    let mut forms = Vec::new();
    for form in document.select(&form_sel) {
        let id = form.value().id().unwrap_or("");
        let action = form.value().attr("action").map(str::trim).filter(|a| !a.is_empty());
        let action_lower = action.map(str::to_ascii_lowercase).unwrap_or_default();

        let relevant = id.starts_with("watch-")
            || id.starts_with("download")
            || action_lower.contains("download")
            || action_lower.contains("play");
        if !relevant {
            continue;
        }

        let mut fields: Vec<(String, String)> = form
            .select(&input_sel)
            .filter_map(|input| {
                let name = input.value().attr("name")?;
                let value = input.value().attr("value").unwrap_or("");
                Some((name.to_string(), value.to_string()))
            })
            .collect();

        if let Some(post_id) = id.strip_prefix("watch-")
            && !post_id.is_empty()
            && !fields.iter().any(|(name, _)| name == "id")
        {
            fields.insert(0, ("id".to_string(), post_id.to_string()));
        }

        forms.push(WatchForm {
            action: action.map(str::to_string),
            fields,
        });
    }
    forms
}

/// Media references in a form submission response
///
/// Looks at iframe `source=` parameters and media anchors first, then
/// falls back to a raw scan of the response.
pub fn extract_play_sources(html: &str) -> Vec<PlaySource> {
    let mut sources: Vec<PlaySource> = Vec::new();

    {
        let document = Html::parse_document(html);

        if let Ok(selector) = Selector::parse("iframe[src]") {
            for iframe in document.select(&selector) {
                if let Some(src) = iframe.value().attr("src")
                    && let Some(url) = decode_source_param(&decode_html_entities(src))
                {
                    push_source(&mut sources, url, None);
                }
            }
        }

        if let Ok(selector) = Selector::parse("a[href]") {
            for anchor in document.select(&selector) {
                let Some(href) = anchor.value().attr("href") else {
                    continue;
                };
                let href = decode_html_entities(href.trim());
                if let Some(url) = absolutize_scheme(&href)
                    && is_media_url(&url)
                {
                    let text = collapse_whitespace(&anchor.text().collect::<String>());
                    push_source(&mut sources, url, (!text.is_empty()).then_some(text));
                }
            }
        }
    }

    if sources.is_empty() {
        for url in scan_media_urls(html) {
            push_source(&mut sources, url, None);
        }
    }

    sources
}

fn push_source(sources: &mut Vec<PlaySource>, url: String, label: Option<String>) {
    if !sources.iter().any(|s| s.url == url) {
        sources.push(PlaySource { url, label });
    }
}

// ---------------------------------------------------------------------------
// Raw scanning
// ---------------------------------------------------------------------------

/// Scans raw text for absolute media URLs and `source=` parameters
///
/// JSON-escaped slashes and HTML entities are normalized first, so URLs
/// inside inline scripts are found as well.
pub fn scan_media_urls(text: &str) -> Vec<String> {
    let text = decode_html_entities(&text.replace("\\/", "/"));
    let mut urls: Vec<String> = Vec::new();

    // Whole URL tokens; the media extension must end the path, not a segment
    if let Ok(re) = Regex::new(r#"https?://[^\s"'<>\\]+"#) {
        for m in re.find_iter(&text) {
            let url = m.as_str().trim_end_matches(['.', ',', ';', ':', ')', ']', '}']);
            if is_media_url(url) && !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
    }

    if let Ok(re) = Regex::new(r#"[?&]source=([^&'"\s<>]+)"#) {
        for caps in re.captures_iter(&text) {
            if let Some(m) = caps.get(1)
                && let Some(url) = decode_source_value(m.as_str())
                && is_media_url(&url)
                && !urls.contains(&url)
            {
                urls.push(url);
            }
        }
    }

    urls
}

/// Decodes the `source=` query parameter of a player URL
pub fn decode_source_param(url: &str) -> Option<String> {
    let Ok(re) = Regex::new(r#"[?&]source=([^&'"\s<>]+)"#) else {
        return None;
    };
    let value = re.captures(url)?.get(1)?.as_str();
    decode_source_value(value)
}

fn decode_source_value(value: &str) -> Option<String> {
    let mut decoded = urlencoding::decode(value).ok()?.into_owned();
    // Some players double-encode the target
    if decoded.contains("%3A%2F%2F") || decoded.contains("%3a%2f%2f") {
        decoded = urlencoding::decode(&decoded).ok()?.into_owned();
    }
    absolutize_scheme(decoded.trim())
}

/// Whether the URL path ends in a media extension
pub fn is_media_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    MEDIA_EXTENSIONS
        .iter()
        .any(|ext| path.strip_suffix(ext).is_some_and(|rest| rest.ends_with('.')))
}

/// Decodes common HTML entities in URLs
pub fn decode_html_entities(url: &str) -> String {
    url.replace("&amp;", "&")
        .replace("&#038;", "&")
        .replace("&#38;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Keeps absolute http(s) URLs, upgrading protocol-relative `//host/...`
fn absolutize_scheme(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    let lower = url.to_ascii_lowercase();
    (lower.starts_with("http://") || lower.starts_with("https://")).then(|| url.to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPISODE_PAGE: &str = r#"
    <html><body>
      <ul id="playeroptionsul">
        <li class="dooplay_player_option" data-type="tv" data-post="13881" data-nume="1">
          <span class="title">Server 1 - 480p</span>
        </li>
        <li class="dooplay_player_option" data-type="tv" data-post="13881" data-nume="2">
          <span class="title">Server 2 - 1080p</span>
        </li>
      </ul>
      <form id="watch-13881" action="https://farsiplex.com/play/" method="post">
        <input type="hidden" name="watch_episode_nonce" value="abc123">
        <input type="hidden" name="_wp_http_referer" value="/episode/shoghal-s01e02/">
        <button type="submit">Watch</button>
      </form>
    </body></html>
    "#;

    // -----------------------------------------------------------------------
    // Page metadata
    // -----------------------------------------------------------------------

    #[test]
    fn test_find_post_id_from_form() {
        assert_eq!(find_post_id(EPISODE_PAGE), Some("13881".to_string()));
    }

    #[test]
    fn test_find_post_id_from_data_post() {
        let html = r#"<div id="player" data-post="777"></div>"#;
        assert_eq!(find_post_id(html), Some("777".to_string()));
        assert_eq!(find_post_id("<p>nothing</p>"), None);
    }

    #[test]
    fn test_find_content_type() {
        let page = Url::parse("https://farsiplex.com/episode/shoghal-s01e02/").unwrap();
        assert_eq!(find_content_type(EPISODE_PAGE, &page), "tv");

        let movie = Url::parse("https://farsiland.com/movies/yek-shab/").unwrap();
        assert_eq!(find_content_type("<p></p>", &movie), "movie");
        assert_eq!(find_content_type("<p></p>", &page), "tv");
    }

    #[test]
    fn test_parse_player_options() {
        let options = parse_player_options(EPISODE_PAGE);
        assert_eq!(
            options,
            vec![
                PlayerOption { nume: 1, label: "Server 1 - 480p".to_string() },
                PlayerOption { nume: 2, label: "Server 2 - 1080p".to_string() },
            ]
        );
    }

    #[test]
    fn test_player_api_url() {
        let page = Url::parse("https://farsiplex.com/episode/x/").unwrap();
        assert_eq!(
            player_api_url(&page, "13881", "tv", 3).as_deref(),
            Some("https://farsiplex.com/wp-json/dooplayer/v2/13881/tv/3")
        );
    }

    // -----------------------------------------------------------------------
    // Player API responses
    // -----------------------------------------------------------------------

    #[test]
    fn test_player_response_plain_url() {
        let json = r#"{"embed_url":"https:\/\/farsicdn.buzz\/v\/ep2.mp4","type":"iframe"}"#;
        assert_eq!(
            parse_player_response(json).unwrap().as_deref(),
            Some("https://farsicdn.buzz/v/ep2.mp4")
        );
    }

    #[test]
    fn test_player_response_iframe_with_source() {
        let json = r#"{"embed_url":"<iframe src=\"https://farsiplex.com/jwplayer/?source=https%3A%2F%2Fmedia.negahestan.com%2Fa.1080p.mp4&id=1\"></iframe>","type":"iframe"}"#;
        assert_eq!(
            parse_player_response(json).unwrap().as_deref(),
            Some("https://media.negahestan.com/a.1080p.mp4")
        );
    }

    #[test]
    fn test_player_response_empty_and_malformed() {
        assert_eq!(parse_player_response(r#"{"embed_url":null}"#).unwrap(), None);
        assert_eq!(parse_player_response(r#"{"embed_url":""}"#).unwrap(), None);
        assert!(matches!(
            parse_player_response("<html>"),
            Err(ResolveError::ParseError(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Microdata & forms
    // -----------------------------------------------------------------------

    #[test]
    fn test_extract_microdata() {
        let html = r#"
          <meta itemprop="contentUrl" content="https://farsicdn.buzz/m/a.mp4">
          <link itemprop="embedURL" href="https://farsiland.com/player/?source=https%3A%2F%2Ffarsicdn.buzz%2Fm%2Fb.m3u8">
          <meta itemprop="name" content="ignored">
        "#;
        assert_eq!(
            extract_microdata(html),
            vec![
                "https://farsicdn.buzz/m/a.mp4".to_string(),
                "https://farsicdn.buzz/m/b.m3u8".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_watch_forms() {
        let forms = parse_watch_forms(EPISODE_PAGE);
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].action.as_deref(), Some("https://farsiplex.com/play/"));
        assert_eq!(
            forms[0].fields,
            vec![
                ("id".to_string(), "13881".to_string()),
                ("watch_episode_nonce".to_string(), "abc123".to_string()),
                ("_wp_http_referer".to_string(), "/episode/shoghal-s01e02/".to_string()),
            ]
        );
    }

    #[test]
    fn test_unrelated_forms_ignored() {
        let html = r#"<form id="searchform" action="/"><input type="hidden" name="s" value=""></form>"#;
        assert!(parse_watch_forms(html).is_empty());
    }

    #[test]
    fn test_extract_play_sources() {
        let html = r#"
          <iframe src="https://farsiplex.com/jwplayer/?source=https%3A%2F%2Ffarsicdn.buzz%2Fs%2Fep.720p.mp4&amp;type=mp4"></iframe>
          <a href="https://farsicdn.buzz/s/ep.480p.mp4">Download 480p</a>
          <a href="https://farsiplex.com/">Home</a>
        "#;
        let sources = extract_play_sources(html);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].url, "https://farsicdn.buzz/s/ep.720p.mp4");
        assert_eq!(sources[0].label, None);
        assert_eq!(sources[1].label.as_deref(), Some("Download 480p"));
    }

    // -----------------------------------------------------------------------
    // Raw scanning
    // -----------------------------------------------------------------------

    #[test]
    fn test_scan_media_urls_in_script() {
        let html = r#"<script>var cfg = {"file":"https:\/\/farsicdn.buzz\/v\/ep.mp4?token=a&amp;e=1","poster":"https:\/\/x\/p.jpg"};</script>"#;
        assert_eq!(scan_media_urls(html), vec!["https://farsicdn.buzz/v/ep.mp4?token=a&e=1".to_string()]);
    }

    #[test]
    fn test_scan_ignores_non_media_and_lookalike_extensions() {
        let text = "https://farsiland.com/a.mp4x https://farsiland.com/page.html";
        assert!(scan_media_urls(text).is_empty());
    }

    #[test]
    fn test_scan_keeps_manifest_behind_mp4_segment() {
        let text = r#"var f = "https://farsicdn.buzz/hls/ep2.mp4/index.m3u8";"#;
        assert_eq!(
            scan_media_urls(text),
            vec!["https://farsicdn.buzz/hls/ep2.mp4/index.m3u8".to_string()]
        );
    }

    #[test]
    fn test_scan_trims_trailing_punctuation() {
        let text = "see https://farsicdn.buzz/v/ep.mp4, or https://farsicdn.buzz/v/ep.m3u8.";
        assert_eq!(
            scan_media_urls(text),
            vec![
                "https://farsicdn.buzz/v/ep.mp4".to_string(),
                "https://farsicdn.buzz/v/ep.m3u8".to_string()
            ]
        );
    }

    #[test]
    fn test_extract_play_sources_falls_back_to_scan() {
        let html = r#"<script>player.load("https:\/\/farsicdn.buzz\/v\/ep.720p.mp4")</script>"#;
        let sources = extract_play_sources(html);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].url, "https://farsicdn.buzz/v/ep.720p.mp4");
        assert_eq!(sources[0].label, None);
    }

    #[test]
    fn test_scan_source_params() {
        let text = r#"<a href="/jw/?source=https%3A%2F%2Ffarsicdn.buzz%2Fa.m3u8">x</a>"#;
        assert_eq!(scan_media_urls(text), vec!["https://farsicdn.buzz/a.m3u8".to_string()]);
    }

    #[test]
    fn test_is_media_url() {
        assert!(is_media_url("https://x/a.MP4?t=1"));
        assert!(is_media_url("https://x/master.m3u8#t"));
        assert!(!is_media_url("https://x/mp4"));
        assert!(!is_media_url("https://x/a.mp4/page"));
    }

    #[test]
    fn test_protocol_relative_embed() {
        assert_eq!(
            extract_embed_target("//farsicdn.buzz/a.mp4").as_deref(),
            Some("https://farsicdn.buzz/a.mp4")
        );
        assert_eq!(extract_embed_target("javascript:void(0)"), None);
    }
}
