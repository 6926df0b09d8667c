//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use vidresolve_core::{Fetch, FetchRequest, ResolveError, ResolverConfig, Result, VideoResolver};

#[derive(Clone)]
struct Canned {
    body: String,
    delay: Duration,
}

/// In-memory [`Fetch`] serving canned bodies with optional delays
///
/// Unknown URLs answer `NotFound`. Delays honour the cancellation token the
/// same way the real reader does.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Canned>>,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: &str) {
        self.serve_after(url, body, Duration::ZERO);
    }

    pub fn serve_after(&self, url: &str, body: &str, delay: Duration) {
        self.routes.lock().insert(
            url.to_string(),
            Canned {
                body: body.to_string(),
                delay,
            },
        );
    }

    /// Number of fetches made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl Fetch for MockFetcher {
    async fn fetch(&self, request: FetchRequest, cancel: &CancellationToken) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push(request.url.clone());

        let canned = self.routes.lock().get(&request.url).cloned();
        let Some(canned) = canned else {
            return Err(ResolveError::NotFound(request.url));
        };

        if !canned.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
                _ = tokio::time::sleep(canned.delay) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        Ok(canned.body)
    }
}

/// Resolver over `fetcher` with default configuration
pub fn resolver(fetcher: &Arc<MockFetcher>) -> VideoResolver {
    resolver_with(ResolverConfig::default(), fetcher)
}

pub fn resolver_with(config: ResolverConfig, fetcher: &Arc<MockFetcher>) -> VideoResolver {
    let fetch: Arc<dyn Fetch> = fetcher.clone();
    VideoResolver::with_fetcher(config, fetch).expect("valid test config")
}
