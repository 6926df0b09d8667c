//! URL helper functions
//!
//! Parses content page slugs and synthesizes candidate CDN URLs from them.

use regex::Regex;
use url::Url;

/// What a content page path says about the title it shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSlug {
    /// A movie page (`/movie/{slug}` or `/movies/{slug}`)
    Movie { slug: String },
    /// An episode page with an explicit season and episode number
    Episode { show: String, season: u32, episode: u32 },
}

/// Extracts the title information from a content page URL
///
/// Episode slugs must carry both numbers, as `{show}-s{S}e{E}` or
/// `{show}-season-{S}-episode-{E}`. Slugs such as `{show}-ep02` return
/// `None`.
///
/// # Example
/// ```
/// use vidresolve_core::url::{parse_page_slug, PageSlug};
/// let url = url::Url::parse("https://farsiland.com/episodes/shoghal-s01e02/").unwrap();
/// assert_eq!(
///     parse_page_slug(&url),
///     Some(PageSlug::Episode { show: "shoghal".to_string(), season: 1, episode: 2 })
/// );
/// ```
pub fn parse_page_slug(page_url: &Url) -> Option<PageSlug> {
    let segments: Vec<&str> = page_url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .collect();
    let last = segments.last()?.to_ascii_lowercase();

    let patterns = [
        r"^(?P<show>[a-z0-9][a-z0-9-]*?)-s(?P<season>\d{1,3})e(?P<episode>\d{1,4})$",
        r"^(?P<show>[a-z0-9][a-z0-9-]*?)-season-(?P<season>\d{1,3})-episode-(?P<episode>\d{1,4})$",
    ];
    for pattern in patterns {
        if let Ok(re) = Regex::new(pattern)
            && let Some(caps) = re.captures(&last)
            && let Some(show) = caps.name("show")
            && let Some(season) = caps.name("season").and_then(|m| m.as_str().parse().ok())
            && let Some(episode) = caps.name("episode").and_then(|m| m.as_str().parse().ok())
        {
            return Some(PageSlug::Episode {
                show: show.as_str().to_string(),
                season,
                episode,
            });
        }
    }

    let is_movie_path = segments.len() >= 2
        && matches!(segments[segments.len() - 2].to_ascii_lowercase().as_str(), "movie" | "movies");
    if is_movie_path && !last.is_empty() {
        return Some(PageSlug::Movie { slug: last });
    }

    None
}

/// Builds the candidate URL for `slug` on one CDN mirror
///
/// # Returns
/// * Movies: `https://{mirror}/movies/{slug}/{slug}.mp4`
/// * Episodes: `https://{mirror}/series/{show}/S{SS}/{show}.S{SS}E{EE}.mp4`
pub fn synthesize_url(mirror: &str, slug: &PageSlug) -> String {
    match slug {
        PageSlug::Movie { slug } => format!("https://{}/movies/{}/{}.mp4", mirror, slug, slug),
        PageSlug::Episode {
            show,
            season,
            episode,
        } => format!(
            "https://{}/series/{}/S{:02}/{}.S{:02}E{:02}.mp4",
            mirror, show, season, show, season, episode
        ),
    }
}

/// Appends `/play` to a page path unless it already ends with it
pub fn ensure_play_path(page_url: &Url) -> Url {
    let mut url = page_url.clone();
    let path = url.path().trim_end_matches('/').to_string();
    if !path.ends_with("/play") {
        url.set_path(&format!("{}/play", path));
    }
    url
}

/// The `https://host` origin of a page
pub fn origin(page_url: &Url) -> String {
    page_url.origin().ascii_serialization()
}
