//! Core data types for the video resolver
//!
//! Contains the quality tiers, resolved video records, the caller-facing
//! outcome enum and the ranking rule shared by every pipeline stage.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Quality tier of a playable candidate
///
/// Ordered so that `P1080 > P720 > P480 > P360 > Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl Quality {
    /// The tier that ends a mirror race immediately
    pub const TOP: Quality = Quality::P1080;

    /// Classifies a vertical pixel resolution (e.g. `720` from `1280x720`)
    pub fn from_height(height: u32) -> Self {
        match height {
            0 => Quality::Unknown,
            h if h >= 1080 => Quality::P1080,
            h if h >= 720 => Quality::P720,
            h if h >= 480 => Quality::P480,
            _ => Quality::P360,
        }
    }

    /// Classifies an HLS `BANDWIDTH` value in bits per second
    pub fn from_bandwidth(bits_per_second: u64) -> Self {
        match bits_per_second {
            0 => Quality::Unknown,
            b if b >= 4_000_000 => Quality::P1080,
            b if b >= 2_000_000 => Quality::P720,
            b if b >= 1_000_000 => Quality::P480,
            _ => Quality::P360,
        }
    }

    /// Detects a quality hint in free text such as a URL or a player label
    ///
    /// Numeric markers must stand alone (`movie.1080p.mp4`, `/720/`), so ids
    /// like `/1210803/` are not mistaken for a resolution.
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        let tiers = [
            (r"(?:^|\D)(?:2160|1440|1080)(?:\D|$)|(?:^|[^a-z])fhd(?:[^a-z]|$)", Quality::P1080),
            (r"(?:^|\D)720(?:\D|$)|(?:^|[^a-z])hd(?:[^a-z]|$)", Quality::P720),
            (r"(?:^|\D)480(?:\D|$)", Quality::P480),
            (r"(?:^|\D)360(?:\D|$)", Quality::P360),
        ];

        for (pattern, quality) in tiers {
            if let Ok(re) = Regex::new(pattern)
                && re.is_match(&lower)
            {
                return quality;
            }
        }
        Quality::Unknown
    }

    /// Short label, e.g. `"1080p"`
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::P360 => "360p",
            Quality::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directly playable media URL discovered for a page
///
/// Equality and hashing consider only `url`, so the same media reference
/// found through two mirrors collapses into one entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedVideo {
    /// Absolute HTTPS media URL (mp4, m3u8, ...)
    pub url: String,

    /// Quality tier used for ranking
    pub quality: Quality,

    /// Human-readable source label (e.g. "Server 2", "media.negahestan.com")
    pub mirror_label: String,
}

impl ResolvedVideo {
    pub fn new(url: impl Into<String>, quality: Quality, mirror_label: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            quality,
            mirror_label: mirror_label.into(),
        }
    }

    /// Whether the URL points at an HLS manifest
    pub fn is_manifest(&self) -> bool {
        let path = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        path.to_lowercase().ends_with(".m3u8")
    }
}

impl PartialEq for ResolvedVideo {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for ResolvedVideo {}

impl Hash for ResolvedVideo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// Result of a single `resolve()` call
///
/// Exactly one variant is produced per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// Ranked, deduplicated playable URLs (never empty)
    Success(Vec<ResolvedVideo>),
    /// The page was fetched but contained no playable reference
    NoDataFound(String),
    /// Connection, timeout, cancellation or oversized response
    NetworkError(String),
    /// A fetched document did not have an interpretable structure
    ParseError(String),
    /// The input or every discovered candidate failed the HTTPS/trust gate
    SecurityRejected(String),
}

impl ResolutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ResolutionOutcome::Success(_))
    }

    /// Variant name as serialized, e.g. `"no_data_found"`
    pub fn kind(&self) -> &'static str {
        match self {
            ResolutionOutcome::Success(_) => "success",
            ResolutionOutcome::NoDataFound(_) => "no_data_found",
            ResolutionOutcome::NetworkError(_) => "network_error",
            ResolutionOutcome::ParseError(_) => "parse_error",
            ResolutionOutcome::SecurityRejected(_) => "security_rejected",
        }
    }

    /// The resolved videos, empty for failure variants
    pub fn videos(&self) -> &[ResolvedVideo] {
        match self {
            ResolutionOutcome::Success(videos) => videos,
            _ => &[],
        }
    }
}

/// Snapshot of the result cache for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of live (non-expired) entries
    pub entry_count: usize,
    /// Sum of resolved URLs across live entries
    pub total_url_count: usize,
    /// Mean age of live entries in seconds
    pub average_age_seconds: f64,
}

/// Deduplicates by URL (first occurrence wins) and sorts by quality descending
///
/// The sort is stable, so candidates of the same tier keep discovery order.
pub fn rank_videos(videos: Vec<ResolvedVideo>) -> Vec<ResolvedVideo> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<ResolvedVideo> = videos
        .into_iter()
        .filter(|video| seen.insert(video.url.clone()))
        .collect();
    ranked.sort_by(|a, b| b.quality.cmp(&a.quality));
    ranked
}
