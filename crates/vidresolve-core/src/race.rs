//! Mirror racing
//!
//! Queries several numbered endpoints concurrently and returns as soon as
//! the answer is good enough: immediately on a top-quality hit, after a
//! short grace window once anything playable arrived, or when the budget
//! runs out. Losing workers are cancelled and joined before returning.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RaceConfig;
use crate::types::{Quality, ResolvedVideo, rank_videos};

/// Result of one racing worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceCandidate {
    /// Zero-based endpoint index the worker was started with
    pub endpoint_index: usize,
    pub result: Vec<ResolvedVideo>,
}

/// Posts exactly one [`RaceCandidate`] per worker
///
/// If the worker panics or is aborted before calling [`deliver`](Self::deliver),
/// dropping the guard posts an empty candidate instead.
struct DeliveryGuard {
    endpoint_index: usize,
    tx: Option<mpsc::UnboundedSender<RaceCandidate>>,
}

impl DeliveryGuard {
    fn new(endpoint_index: usize, tx: mpsc::UnboundedSender<RaceCandidate>) -> Self {
        Self {
            endpoint_index,
            tx: Some(tx),
        }
    }

    fn deliver(mut self, result: Vec<ResolvedVideo>) {
        self.send(result);
    }

    fn send(&mut self, result: Vec<ResolvedVideo>) {
        if let Some(tx) = self.tx.take() {
            // Receiver is gone once the aggregator has returned
            let _ = tx.send(RaceCandidate {
                endpoint_index: self.endpoint_index,
                result,
            });
        }
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        self.send(Vec::new());
    }
}

/// Races numbered endpoints under a time budget
#[derive(Debug, Clone, Default)]
pub struct MirrorRacer {
    config: RaceConfig,
}

impl MirrorRacer {
    pub fn new(config: RaceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RaceConfig {
        &self.config
    }

    /// Runs `worker` once per endpoint index `0..endpoints` and aggregates
    ///
    /// Each worker gets a child of `cancel`, which is cancelled when the race
    /// ends. Workers are spawned, so their futures must be `Send + 'static`.
    ///
    /// # Returns
    /// The union of results received before the race ended, deduplicated
    /// by URL and ranked. Empty if nothing arrived in time.
    pub async fn race<F, Fut>(
        &self,
        endpoints: usize,
        cancel: &CancellationToken,
        worker: F,
    ) -> Vec<ResolvedVideo>
    where
        F: Fn(usize, CancellationToken) -> Fut,
        Fut: Future<Output = Vec<ResolvedVideo>> + Send + 'static,
    {
        if endpoints == 0 || cancel.is_cancelled() {
            return Vec::new();
        }

        let race_token = cancel.child_token();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();

        for index in 0..endpoints {
            let guard = DeliveryGuard::new(index, tx.clone());
            let task = worker(index, race_token.child_token());
            workers.spawn(async move {
                let result = task.await;
                guard.deliver(result);
            });
        }
        drop(tx);

        let budget_deadline = Instant::now() + self.config.budget();
        let mut grace_deadline: Option<Instant> = None;
        let mut reported = 0usize;
        let mut collected = Vec::new();

        loop {
            let deadline = grace_deadline.map_or(budget_deadline, |g| g.min(budget_deadline));

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(reported, "race cancelled by caller");
                    break;
                }
                message = rx.recv() => {
                    let Some(candidate) = message else {
                        break;
                    };
                    reported += 1;

                    if !candidate.result.is_empty() {
                        let top = candidate.result.iter().any(|v| v.quality >= Quality::TOP);
                        tracing::debug!(
                            endpoint = candidate.endpoint_index,
                            count = candidate.result.len(),
                            top,
                            "race candidate received"
                        );
                        collected.extend(candidate.result);
                        if top {
                            break;
                        }
                        if grace_deadline.is_none() {
                            grace_deadline = Some(Instant::now() + self.config.grace());
                        }
                    }

                    if reported == endpoints {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::debug!(reported, grace = grace_deadline.is_some(), "race deadline reached");
                    break;
                }
            }
        }

        race_token.cancel();
        workers.abort_all();
        while workers.join_next().await.is_some() {}

        rank_videos(collected)
    }
}
