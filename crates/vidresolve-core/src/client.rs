//! Bounded, cancellable HTTP reader
//!
//! Every byte fetched by the resolver flows through the [`Fetch`] adapter.
//! [`BoundedReader`] is the reqwest-backed implementation: it streams the
//! body chunk by chunk, enforces a hard byte ceiling regardless of what
//! `Content-Length` claims, and checks the cancellation token between
//! chunks so a cancelled resolution releases its connection immediately.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{FetchLimits, USER_AGENT};
use crate::error::{ResolveError, Result};
use crate::security::SecurityGate;

/// Which byte ceiling applies to a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// HTML pages, embed pages and HLS manifests
    Html,
    /// JSON API payloads
    Json,
}

/// HTTP method plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchMethod {
    Get,
    /// `application/x-www-form-urlencoded` POST
    PostForm(Vec<(String, String)>),
}

/// A single request handed to the [`Fetch`] adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: FetchMethod,
    pub referer: Option<String>,
    pub body_kind: BodyKind,
}

impl FetchRequest {
    /// GET an HTML document
    pub fn html(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: FetchMethod::Get,
            referer: None,
            body_kind: BodyKind::Html,
        }
    }

    /// GET a JSON document
    pub fn json(url: impl Into<String>) -> Self {
        Self {
            body_kind: BodyKind::Json,
            ..Self::html(url)
        }
    }

    /// POST form fields, expecting an HTML response
    pub fn form(url: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            method: FetchMethod::PostForm(fields),
            ..Self::html(url)
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

/// Adapter between the resolver and its HTTP client
///
/// Implementations must honour `cancel` while waiting on the network, not
/// only at entry, and must never buffer more than the applicable ceiling.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest, cancel: &CancellationToken) -> Result<String>;
}

/// reqwest-backed [`Fetch`] implementation with byte ceilings
pub struct BoundedReader {
    client: reqwest::Client,
    limits: FetchLimits,
}

impl BoundedReader {
    /// Create a reader with default limits
    pub fn new() -> Result<Self> {
        Self::with_limits(FetchLimits::default())
    }

    /// Create a reader with custom limits
    ///
    /// Redirects may go to any host; use [`with_gate`](Self::with_gate) to
    /// keep them on trusted domains.
    pub fn with_limits(limits: FetchLimits) -> Result<Self> {
        Self::build_client(limits, None)
    }

    /// Create a reader that only follows redirects to hosts `gate` trusts
    ///
    /// A redirect anywhere else fails the request before it is sent.
    pub fn with_gate(limits: FetchLimits, gate: SecurityGate) -> Result<Self> {
        Self::build_client(limits, Some(gate))
    }

    fn build_client(limits: FetchLimits, gate: Option<SecurityGate>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(limits.request_timeout_secs))
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::custom(move |attempt| {
                // Never follow an https -> http downgrade
                let downgrade = attempt.url().scheme() != "https"
                    && attempt
                        .previous()
                        .last()
                        .is_some_and(|prev| prev.scheme() == "https");
                let untrusted = gate.as_ref().is_some_and(|gate| {
                    !attempt
                        .url()
                        .host_str()
                        .is_some_and(|host| gate.is_trusted_host(&host.to_ascii_lowercase()))
                });
                if untrusted {
                    tracing::warn!(url = %attempt.url(), "redirect to untrusted host refused");
                    attempt.error("redirect to untrusted host")
                } else if downgrade {
                    attempt.stop()
                } else if attempt.previous().len() >= 5 {
                    attempt.error("too many redirects")
                } else {
                    attempt.follow()
                }
            }))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT_LANGUAGE,
                    reqwest::header::HeaderValue::from_static("en-US,en;q=0.9,fa;q=0.8"),
                );
                headers
            })
            .build()
            .map_err(ResolveError::HttpError)?;

        Ok(Self { client, limits })
    }

    /// Ceiling applied to a body kind
    pub fn limit_for(&self, kind: BodyKind) -> usize {
        match kind {
            BodyKind::Html => self.limits.html_max_bytes,
            BodyKind::Json => self.limits.json_max_bytes,
        }
    }

    fn build(&self, request: &FetchRequest) -> reqwest::RequestBuilder {
        let builder = match &request.method {
            FetchMethod::Get => self.client.get(&request.url),
            FetchMethod::PostForm(fields) => self.client.post(&request.url).form(fields),
        };
        let builder = match request.body_kind {
            BodyKind::Json => builder.header(reqwest::header::ACCEPT, "application/json"),
            BodyKind::Html => builder,
        };
        match &request.referer {
            Some(referer) => builder.header(reqwest::header::REFERER, referer),
            None => builder,
        }
    }

    /// Read the body chunk by chunk up to `limit` bytes
    async fn read_bounded(
        mut response: reqwest::Response,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(ResolveError::BodyTooLarge { limit });
        }

        let initial = response
            .content_length()
            .map(|len| len as usize)
            .unwrap_or(0)
            .min(limit);
        let mut body = Vec::with_capacity(initial);

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
                chunk = response.chunk() => chunk.map_err(ResolveError::HttpError)?,
            };

            let Some(chunk) = chunk else {
                break;
            };
            if body.len() + chunk.len() > limit {
                return Err(ResolveError::BodyTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

#[async_trait]
impl Fetch for BoundedReader {
    async fn fetch(&self, request: FetchRequest, cancel: &CancellationToken) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        let limit = self.limit_for(request.body_kind);
        tracing::debug!(url = %request.url, limit, "fetching");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
            response = self.build(&request).send() => response.map_err(ResolveError::HttpError)?,
        };

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ResolveError::RateLimited);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ResolveError::NotFound(request.url));
        }
        if !status.is_success() {
            return Err(ResolveError::HttpStatus {
                status: status.as_u16(),
                url: request.url,
            });
        }

        let body = Self::read_bounded(response, limit, cancel).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
