//! Blockhash anchor provider: supplies a recent, non-stale validity token
//! for every transaction.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use tokio::time::sleep;

use crate::providers::{Commitment, NodeClient, NodeError};

/// Protocol-level anchor lifetime (~150 slots).
pub const ANCHOR_EXPIRY: Duration = Duration::from_secs(60);

/// Window during which a repeated node value triggers a re-query.
const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(1);

/// Delay between re-queries while waiting for a new value.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Bound on re-queries per `fresh_anchor` call.
const DEFAULT_MAX_RETRIES: usize = 5;

/// Bounded-lifetime transaction validity token.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BlockhashAnchor {
    /// Blockhash bytes.
    pub value: [u8; 32],
    /// When the value was observed from the node.
    pub observed_at: Instant,
}

impl BlockhashAnchor {
    /// Returns true when the anchor has outlived the protocol expiry.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.observed_at) >= ANCHOR_EXPIRY
    }
}

/// Last value handed out, used to detect repeats within the freshness
/// window.
#[derive(Debug, Clone, Copy)]
struct IssueRecord {
    /// Issued blockhash bytes.
    value: [u8; 32],
    /// When the value was issued.
    issued_at: Instant,
}

/// Supplies fresh blockhash anchors, re-querying when the node repeats a
/// value issued less than the freshness window ago.
pub struct BlockhashProvider {
    /// Node queried for anchors.
    node: Arc<dyn NodeClient>,
    /// Last issued value, cleared by [`BlockhashProvider::invalidate`].
    last_issued: Mutex<Option<IssueRecord>>,
    /// Repeat-detection window.
    freshness_window: Duration,
    /// Delay between re-queries.
    retry_delay: Duration,
    /// Re-query bound per call.
    max_retries: usize,
}

impl BlockhashProvider {
    /// Creates a provider with default freshness tuning.
    #[must_use]
    pub fn new(node: Arc<dyn NodeClient>) -> Self {
        Self {
            node,
            last_issued: Mutex::new(None),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Sets the repeat-detection window.
    #[must_use]
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Sets the delay between re-queries.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Returns a fresh anchor at the strongest commitment.
    ///
    /// When the node returns the value issued less than the freshness
    /// window ago, the query is retried a bounded number of times; the most
    /// recently observed value is returned either way, so this never blocks
    /// indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError`] when every query fails; the caller treats this
    /// as retryable.
    pub async fn fresh_anchor(&self) -> Result<BlockhashAnchor, NodeError> {
        let mut attempt = 0_usize;
        loop {
            let value = self.node.latest_blockhash(Commitment::Finalized).await?;
            let now = Instant::now();
            let repeated_recently = self
                .last_issued
                .lock()
                .ok()
                .and_then(|last| *last)
                .is_some_and(|record| {
                    record.value == value
                        && now.saturating_duration_since(record.issued_at) < self.freshness_window
                });

            if repeated_recently && attempt < self.max_retries {
                attempt = attempt.saturating_add(1);
                tracing::debug!(attempt, "node repeated recent blockhash, re-querying");
                sleep(self.retry_delay).await;
                continue;
            }

            if let Ok(mut last) = self.last_issued.lock() {
                *last = Some(IssueRecord {
                    value,
                    issued_at: now,
                });
            }
            return Ok(BlockhashAnchor {
                value,
                observed_at: now,
            });
        }
    }

    /// Forgets the last issued value so the next call fetches fresh.
    ///
    /// Called by the submitter after a stale-anchor failure.
    pub fn invalidate(&self) {
        if let Ok(mut last) = self.last_issued.lock() {
            *last = None;
        }
    }
}
