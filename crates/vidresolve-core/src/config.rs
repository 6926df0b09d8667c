//! Resolver configuration
//!
//! Plain structs with sensible defaults, loadable from TOML. Only the CDN
//! mirror list is reloadable at runtime (see [`CdnMirrors`]).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, Result};

/// Browser-like User-Agent sent with every request
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Top-level configuration for [`VideoResolver`](crate::VideoResolver)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Domains (and their subdomains) allowed past the security gate
    pub trusted_domains: Vec<String>,
    /// Real CDN hostnames substituted for obfuscated ones
    pub cdn_mirrors: Vec<String>,
    /// Regex matching obfuscated CDN hostnames
    pub fake_cdn_pattern: String,
    /// Byte ceilings and request timeout
    pub limits: FetchLimits,
    /// Mirror racing parameters
    pub race: RaceConfig,
    /// Form submission throttling
    pub forms: FormConfig,
    /// Result cache sizing
    pub cache: CacheConfig,
    /// Deadline for one whole `resolve()` call (default: 30)
    pub overall_timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            trusted_domains: [
                "farsiland.com",
                "farsiplex.com",
                "namakade.com",
                "imvbox.com",
                "negahestan.com",
                "iranproud.net",
                "iranproud2.net",
                "farsicdn.buzz",
                "youtube.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            cdn_mirrors: vec!["media.negahestan.com".to_string()],
            fake_cdn_pattern: r"^media\.iranproud\d*\.net$".to_string(),
            limits: FetchLimits::default(),
            race: RaceConfig::default(),
            forms: FormConfig::default(),
            cache: CacheConfig::default(),
            overall_timeout_secs: 30,
        }
    }
}

impl ResolverConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ResolveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, or return defaults when the file does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ResolveError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Rejects values that would make the pipeline unusable
    pub fn validate(&self) -> Result<()> {
        if self.trusted_domains.is_empty() {
            return Err(ResolveError::Config("trusted_domains is empty".to_string()));
        }
        if self.cache.capacity == 0 {
            return Err(ResolveError::Config("cache.capacity must be > 0".to_string()));
        }
        if self.forms.permits == 0 {
            return Err(ResolveError::Config("forms.permits must be > 0".to_string()));
        }
        if self.race.endpoints == 0 {
            return Err(ResolveError::Config("race.endpoints must be > 0".to_string()));
        }
        if self.limits.html_max_bytes == 0 || self.limits.json_max_bytes == 0 {
            return Err(ResolveError::Config("byte ceilings must be > 0".to_string()));
        }
        regex::Regex::new(&self.fake_cdn_pattern)
            .map_err(|e| ResolveError::Config(format!("fake_cdn_pattern: {}", e)))?;
        Ok(())
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }
}

/// Byte ceilings per body kind and the per-request timeout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchLimits {
    /// Ceiling for HTML pages and manifests (default: 4 MiB)
    pub html_max_bytes: usize,
    /// Ceiling for JSON API payloads (default: 10 MiB)
    pub json_max_bytes: usize,
    /// Transport timeout per request in seconds (default: 15)
    pub request_timeout_secs: u64,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            html_max_bytes: 4 * 1024 * 1024,
            json_max_bytes: 10 * 1024 * 1024,
            request_timeout_secs: 15,
        }
    }
}

/// Parameters of the mirror race
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    /// Number of numbered candidate endpoints (default: 5)
    pub endpoints: usize,
    /// Overall budget in milliseconds (default: 8000)
    pub budget_ms: u64,
    /// Extra wait for a better result after the first hit (default: 500)
    pub grace_ms: u64,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            endpoints: 5,
            budget_ms: 8_000,
            grace_ms: 500,
        }
    }
}

impl RaceConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Throttling of download-form submissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    /// Concurrent submissions (default: 2)
    pub permits: usize,
    /// Delay after each submission before its permit is released (default: 200)
    pub cooldown_ms: u64,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            permits: 2,
            cooldown_ms: 200,
        }
    }
}

impl FormConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Result cache sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached pages (default: 100)
    pub capacity: usize,
    /// Entry lifetime in seconds (default: 300)
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Hot-reloadable list of real CDN hostnames
///
/// Cloning shares the underlying list. Each resolution works on a
/// [`detached`](Self::detached) copy taken when it starts, so a reload never
/// changes the list mid-call.
#[derive(Debug, Clone)]
pub struct CdnMirrors {
    inner: Arc<RwLock<Arc<[String]>>>,
}

impl Default for CdnMirrors {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::from(Vec::new()))),
        }
    }
}

#[derive(Deserialize)]
struct MirrorFile {
    cdn_mirrors: Vec<String>,
}

impl CdnMirrors {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mirrors = Self::default();
        mirrors.replace(hosts);
        mirrors
    }

    /// Current list; unaffected by later reloads
    pub fn snapshot(&self) -> Arc<[String]> {
        self.inner.read().clone()
    }

    /// Independent copy of the current list; later reloads do not reach it
    pub fn detached(&self) -> Self {
        Self {
            inner: Arc::new(RwLock::new(self.snapshot())),
        }
    }

    /// Swap in a new list of hostnames (blank entries are dropped)
    pub fn replace<I, S>(&self, hosts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let hosts: Arc<[String]> = hosts
            .into_iter()
            .map(|h| {
                let h: String = h.into();
                h.trim().to_ascii_lowercase()
            })
            .filter(|h| !h.is_empty())
            .collect();
        tracing::info!(count = hosts.len(), "CDN mirror list updated");
        *self.inner.write() = hosts;
    }

    /// Reload from a TOML document containing `cdn_mirrors = [...]`
    pub fn reload_from_toml(&self, contents: &str) -> Result<()> {
        let file: MirrorFile =
            toml::from_str(contents).map_err(|e| ResolveError::Config(e.to_string()))?;
        self.replace(file.cdn_mirrors);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResolverConfig::default();
        assert_eq!(config.limits.html_max_bytes, 4 * 1024 * 1024);
        assert_eq!(config.limits.json_max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.race.endpoints, 5);
        assert_eq!(config.race.budget(), Duration::from_secs(8));
        assert_eq!(config.race.grace(), Duration::from_millis(500));
        assert_eq!(config.forms.permits, 2);
        assert_eq!(config.forms.cooldown(), Duration::from_millis(200));
        assert_eq!(config.cache.capacity, 100);
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ResolverConfig::from_toml_str(
            r#"
            cdn_mirrors = ["cdn1.negahestan.com", "cdn2.negahestan.com"]

            [race]
            grace_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.cdn_mirrors.len(), 2);
        assert_eq!(config.race.grace_ms, 250);
        assert_eq!(config.race.endpoints, 5);
        assert_eq!(config.cache.capacity, 100);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = ResolverConfig::from_toml_str("[cache]\ncapacity = 0\n");
        assert!(matches!(result, Err(ResolveError::Config(_))));

        let result = ResolverConfig::from_toml_str("fake_cdn_pattern = \"(\"\n");
        assert!(matches!(result, Err(ResolveError::Config(_))));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = ResolverConfig::load("/nonexistent/vidresolve.toml").unwrap();
        assert_eq!(config, ResolverConfig::default());
    }

    #[test]
    fn test_cdn_mirrors_snapshot_isolated_from_reload() {
        let mirrors = CdnMirrors::new(["media.negahestan.com"]);
        let before = mirrors.snapshot();

        mirrors.replace(["cdn1.negahestan.com", " ", "CDN2.negahestan.com"]);

        assert_eq!(&*before, &["media.negahestan.com".to_string()]);
        assert_eq!(
            &*mirrors.snapshot(),
            &["cdn1.negahestan.com".to_string(), "cdn2.negahestan.com".to_string()]
        );
    }

    #[test]
    fn test_cdn_mirrors_detached_ignores_reload() {
        let live = CdnMirrors::new(["media.negahestan.com"]);
        let pinned = live.detached();
        live.replace(["cdn9.negahestan.com"]);
        assert_eq!(&*pinned.snapshot(), &["media.negahestan.com".to_string()]);
        assert_eq!(&*live.snapshot(), &["cdn9.negahestan.com".to_string()]);
    }

    #[test]
    fn test_cdn_mirrors_reload_from_toml() {
        let mirrors = CdnMirrors::default();
        mirrors
            .reload_from_toml("cdn_mirrors = [\"a.negahestan.com\"]")
            .unwrap();
        assert_eq!(mirrors.snapshot().len(), 1);
        assert!(mirrors.reload_from_toml("nonsense = ").is_err());
    }

    #[test]
    fn test_cdn_mirrors_clone_shares_list() {
        let mirrors = CdnMirrors::new(["a.negahestan.com"]);
        let handle = mirrors.clone();
        handle.replace(["b.negahestan.com"]);
        assert_eq!(&*mirrors.snapshot(), &["b.negahestan.com".to_string()]);
    }
}
