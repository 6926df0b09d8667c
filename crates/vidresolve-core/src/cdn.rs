//! CDN host rewriting
//!
//! Some providers publish media URLs on obfuscated hostnames that never
//! serve content. The rewriter swaps such a host for each configured real
//! mirror, keeping path and query intact.

use regex::Regex;
use url::Url;

use crate::config::CdnMirrors;
use crate::error::{ResolveError, Result};
use crate::types::ResolvedVideo;

/// Substitutes real CDN mirrors for obfuscated media hosts
#[derive(Debug, Clone)]
pub struct CdnRewriter {
    fake_host: Regex,
    mirrors: CdnMirrors,
}

impl CdnRewriter {
    /// # Errors
    /// Returns `Config` if `fake_host_pattern` is not a valid regex
    pub fn new(fake_host_pattern: &str, mirrors: CdnMirrors) -> Result<Self> {
        let fake_host = Regex::new(fake_host_pattern)
            .map_err(|e| ResolveError::Config(format!("fake_cdn_pattern: {}", e)))?;
        Ok(Self { fake_host, mirrors })
    }

    pub fn mirrors(&self) -> &CdnMirrors {
        &self.mirrors
    }

    /// Copy of this rewriter bound to the mirror list as it is right now
    pub fn pinned(&self) -> Self {
        Self {
            fake_host: self.fake_host.clone(),
            mirrors: self.mirrors.detached(),
        }
    }

    /// Whether `host` is one of the obfuscated hostnames
    pub fn is_fake_host(&self, host: &str) -> bool {
        self.fake_host.is_match(&host.to_ascii_lowercase())
    }

    /// Expands one candidate into one candidate per real mirror
    ///
    /// Candidates on other hosts, unparsable URLs, and fake hosts with an
    /// empty mirror list are returned unchanged.
    pub fn rewrite(&self, video: ResolvedVideo) -> Vec<ResolvedVideo> {
        let Ok(parsed) = Url::parse(&video.url) else {
            return vec![video];
        };
        let Some(host) = parsed.host_str() else {
            return vec![video];
        };
        if !self.is_fake_host(host) {
            return vec![video];
        }

        let mirrors = self.mirrors.snapshot();
        if mirrors.is_empty() {
            return vec![video];
        }

        let mut rewritten = Vec::with_capacity(mirrors.len());
        for mirror in mirrors.iter() {
            let mut url = parsed.clone();
            if url.set_scheme("https").is_err() || url.set_host(Some(mirror)).is_err() {
                tracing::warn!(mirror = %mirror, "skipping unusable CDN mirror");
                continue;
            }
            let _ = url.set_port(None);
            rewritten.push(ResolvedVideo::new(url, video.quality, mirror.as_str()));
        }

        tracing::debug!(host, count = rewritten.len(), "rewrote obfuscated CDN host");
        if rewritten.is_empty() {
            vec![video]
        } else {
            rewritten
        }
    }

    /// Applies [`rewrite`](Self::rewrite) to every candidate
    pub fn rewrite_all(&self, videos: Vec<ResolvedVideo>) -> Vec<ResolvedVideo> {
        videos.into_iter().flat_map(|v| self.rewrite(v)).collect()
    }
}
