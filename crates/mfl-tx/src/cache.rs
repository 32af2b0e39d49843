//! Duplicate-submission cache keyed by intent digest.
//!
//! One lock guards both the completed entries and the in-flight
//! reservations, so the decision to broadcast and the reservation that
//! suppresses a concurrent duplicate happen atomically.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use solana_signature::Signature;
use thiserror::Error;

use crate::intent::IntentDigest;

/// Default lifetime of a completed entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Cache-level errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Internal lock was poisoned.
    #[error("transaction cache lock poisoned: {message}")]
    Poisoned {
        /// Poisoning details.
        message: String,
    },
}

/// One completed submission.
#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    /// Signature of the broadcast transaction.
    signature: Signature,
    /// When the entry was recorded.
    inserted_at: Instant,
}

/// Shared cache state.
#[derive(Debug, Default)]
struct CacheInner {
    /// Completed submissions by digest.
    entries: HashMap<IntentDigest, CacheEntry>,
    /// Digests with a submission currently in flight.
    pending: HashSet<IntentDigest>,
}

/// Outcome of an atomic check-and-reserve.
pub enum CacheDecision {
    /// A live entry exists; reuse its signature, do not broadcast.
    Hit(Signature),
    /// No live entry; the caller holds the reservation and must broadcast.
    Reserved(ReservationGuard),
    /// Another submission of the same digest is in flight.
    InFlight,
}

/// Deduplicates identical submissions within a TTL window.
pub struct TransactionCache {
    /// Entries and reservations under one lock.
    inner: Arc<Mutex<CacheInner>>,
    /// Entry lifetime.
    ttl: Duration,
}

impl TransactionCache {
    /// Creates a cache with the given entry TTL (minimum one millisecond).
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner::default())),
            ttl: ttl.max(Duration::from_millis(1)),
        }
    }

    /// Atomically checks for a live entry and reserves the digest when none
    /// exists.
    ///
    /// Expired entries are purged on access.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Poisoned`] when the internal lock is poisoned.
    pub fn begin(&self, digest: IntentDigest, now: Instant) -> Result<CacheDecision, CacheError> {
        let mut inner = self.inner.lock().map_err(|poisoned| CacheError::Poisoned {
            message: poisoned.to_string(),
        })?;
        let ttl = self.ttl;
        inner
            .entries
            .retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < ttl);

        if let Some(entry) = inner.entries.get(&digest) {
            return Ok(CacheDecision::Hit(entry.signature));
        }
        if !inner.pending.insert(digest) {
            return Ok(CacheDecision::InFlight);
        }
        Ok(CacheDecision::Reserved(ReservationGuard {
            inner: Arc::clone(&self.inner),
            digest,
            completed: false,
        }))
    }

    /// Removes the entry for a digest, if any.
    ///
    /// Used when a recorded transaction turns out to have failed on chain,
    /// so a later identical submission is not served a dead signature.
    pub fn evict(&self, digest: IntentDigest) {
        if let Ok(mut inner) = self.inner.lock() {
            let _ = inner.entries.remove(&digest);
        }
    }

    /// Returns the live signature for a digest, when present.
    #[must_use]
    pub fn lookup(&self, digest: IntentDigest, now: Instant) -> Option<Signature> {
        let inner = self.inner.lock().ok()?;
        inner.entries.get(&digest).and_then(|entry| {
            (now.saturating_duration_since(entry.inserted_at) < self.ttl).then_some(entry.signature)
        })
    }
}

impl Default for TransactionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

/// Holds the in-flight reservation for one digest.
///
/// Dropping the guard without completing releases the reservation, so a
/// failed attempt does not wedge the digest.
pub struct ReservationGuard {
    /// Shared cache state.
    inner: Arc<Mutex<CacheInner>>,
    /// Reserved digest.
    digest: IntentDigest,
    /// Set once the entry is recorded.
    completed: bool,
}

impl ReservationGuard {
    /// Records the broadcast signature and releases the reservation.
    ///
    /// Called immediately after a successful broadcast, before confirmation
    /// finishes, so overlapping calls during confirmation short-circuit.
    pub fn complete(mut self, signature: Signature, now: Instant) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.insert(
                self.digest,
                CacheEntry {
                    signature,
                    inserted_at: now,
                },
            );
            let _ = inner.pending.remove(&self.digest);
        }
        self.completed = true;
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Ok(mut inner) = self.inner.lock() {
            let _ = inner.pending.remove(&self.digest);
        }
    }
}
