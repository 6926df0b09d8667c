//! HLS master playlist parser
//!
//! Turns an adaptive-stream master manifest into one candidate per quality
//! variant so callers can pick a rendition directly.

use url::Url;

use crate::types::{Quality, ResolvedVideo};

/// One `#EXT-X-STREAM-INF` entry of a master manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestVariant {
    /// Absolute variant playlist URL
    pub url: String,
    /// Height from `RESOLUTION=WxH`, if present
    pub height: Option<u32>,
    /// Peak `BANDWIDTH` in bits per second, if present
    pub bandwidth: Option<u64>,
}

impl ManifestVariant {
    /// Quality from the resolution height, falling back to bandwidth
    pub fn quality(&self) -> Quality {
        match (self.height, self.bandwidth) {
            (Some(height), _) if height > 0 => Quality::from_height(height),
            (_, Some(bandwidth)) => Quality::from_bandwidth(bandwidth),
            _ => Quality::Unknown,
        }
    }
}

/// Parses variant streams from a master manifest
///
/// The URI of each variant is the next non-blank, non-comment line after
/// its `#EXT-X-STREAM-INF` tag, resolved against `base_url`. Variants whose
/// URI cannot be resolved are skipped. Media playlists yield nothing.
pub fn parse_manifest(text: &str, base_url: &Url) -> Vec<ManifestVariant> {
    let mut variants = Vec::new();
    let mut pending: Option<(Option<u32>, Option<u64>)> = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }

        if let Some(attributes) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            let attrs = parse_attributes(attributes);
            let height = attr(&attrs, "RESOLUTION").and_then(parse_height);
            let bandwidth = attr(&attrs, "BANDWIDTH").and_then(|b| b.parse::<u64>().ok());
            pending = Some((height, bandwidth));
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        if let Some((height, bandwidth)) = pending.take() {
            match base_url.join(line) {
                Ok(url) => variants.push(ManifestVariant {
                    url: url.into(),
                    height,
                    bandwidth,
                }),
                Err(e) => tracing::debug!(uri = line, error = %e, "skipping unresolvable variant"),
            }
        }
    }

    variants
}

/// Expands a master manifest into ranked-ready candidates
///
/// Returns one entry per variant labelled `"{label} {quality}"`. A manifest
/// without variants yields a single `Unknown` entry for `manifest_url`
/// itself, labelled `"{label} (auto)"`.
pub fn expand_manifest(text: &str, manifest_url: &str, label: &str) -> Vec<ResolvedVideo> {
    let auto = || vec![ResolvedVideo::new(manifest_url, Quality::Unknown, format!("{} (auto)", label))];

    let Ok(base) = Url::parse(manifest_url) else {
        return auto();
    };

    let variants = parse_manifest(text, &base);
    if variants.is_empty() {
        return auto();
    }

    variants
        .into_iter()
        .map(|variant| {
            let quality = variant.quality();
            ResolvedVideo::new(variant.url, quality, format!("{} {}", label, quality))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Attribute list helpers
// ---------------------------------------------------------------------------

/// Splits `KEY=VALUE,KEY="a,b"` respecting quoted values
fn parse_attributes(list: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in list.chars().chain(std::iter::once(',')) {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                if let Some((key, value)) = current.split_once('=') {
                    attrs.push((
                        key.trim().to_ascii_uppercase(),
                        value.trim().trim_matches('"').to_string(),
                    ));
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    attrs
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// `1280x720` -> `720`
fn parse_height(resolution: &str) -> Option<u32> {
    let (_, height) = resolution.split_once(['x', 'X'])?;
    height.trim().parse().ok()
}
