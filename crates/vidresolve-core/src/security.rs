//! HTTPS / trusted-domain gate
//!
//! Every page URL and every discovered media URL passes through
//! [`SecurityGate::normalize`] before it is fetched or surfaced.

use url::Url;

/// Validates and normalizes URLs against a fixed allow-list of domains
#[derive(Debug, Clone)]
pub struct SecurityGate {
    trusted_domains: Vec<String>,
}

impl SecurityGate {
    /// Create a gate trusting the given domains and their subdomains
    ///
    /// Domains are compared case-insensitively; a leading `.` or `www.` is ignored.
    pub fn new<I, S>(trusted_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let trusted_domains = trusted_domains
            .into_iter()
            .map(|d| {
                let d = d.as_ref().trim().trim_start_matches('.').to_ascii_lowercase();
                d.strip_prefix("www.").map(str::to_string).unwrap_or(d)
            })
            .filter(|d| !d.is_empty())
            .collect();
        Self { trusted_domains }
    }

    /// Returns the HTTPS form of `url` if it is allowed, `None` otherwise
    ///
    /// Rejects non-http(s) schemes, userinfo, and hosts outside the allow-list.
    /// `http://` is upgraded to `https://`.
    ///
    /// # Example
    /// ```
    /// use vidresolve_core::SecurityGate;
    /// let gate = SecurityGate::new(["farsiland.com"]);
    /// assert_eq!(
    ///     gate.normalize("http://farsiland.com/movies/yek-shab/").as_deref(),
    ///     Some("https://farsiland.com/movies/yek-shab/")
    /// );
    /// assert_eq!(gate.normalize("https://evil.example/x"), None);
    /// ```
    pub fn normalize(&self, url: &str) -> Option<String> {
        self.normalize_url(url).map(String::from)
    }

    /// Same as [`normalize`](Self::normalize) but returns the parsed URL
    pub fn normalize_url(&self, url: &str) -> Option<Url> {
        let mut parsed = Url::parse(url.trim()).ok()?;

        match parsed.scheme() {
            "https" => {}
            "http" => {
                parsed.set_scheme("https").ok()?;
                if parsed.port() == Some(80) {
                    parsed.set_port(None).ok()?;
                }
            }
            _ => return None,
        }

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return None;
        }

        let host = parsed.host_str()?.to_ascii_lowercase();
        if !self.is_trusted_host(&host) {
            return None;
        }
        // Fully qualified form names the same page
        let bare = host.trim_end_matches('.');
        if bare.len() != host.len() {
            parsed.set_host(Some(bare)).ok()?;
        }

        Some(parsed)
    }

    /// Whether `url` would pass the gate
    pub fn is_trusted(&self, url: &str) -> bool {
        self.normalize_url(url).is_some()
    }

    /// Whether `host` equals or is a subdomain of a trusted domain
    pub fn is_trusted_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.');
        self.trusted_domains.iter().any(|domain| {
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// The normalized allow-list
    pub fn trusted_domains(&self) -> &[String] {
        &self.trusted_domains
    }
}
