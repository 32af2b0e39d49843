//! Submitter types, error taxonomy, and structured classification.

use std::{fmt, time::Duration};

use thiserror::Error;

use crate::providers::{Commitment, NodeError};

/// Stage of the current submission, published on the stage stream.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SubmitStage {
    /// No submission in progress.
    Idle,
    /// Estimating fees and assembling the message.
    Building,
    /// Waiting for the wallet to sign.
    Signing,
    /// Broadcasting to the node.
    Broadcasting,
    /// Waiting for cluster confirmation.
    Confirming,
    /// Transaction confirmed.
    Confirmed,
    /// Submission failed terminally.
    Failed,
}

/// Cause recorded for a retryable failure, surfaced when retries run out.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetryCause {
    /// Network error or timeout.
    NetworkTimeout,
    /// Anchor expired before the transaction landed.
    StaleAnchor,
    /// Node or oracle rate limiting.
    RateLimited,
    /// Unclassified failure.
    Unknown,
}

impl fmt::Display for RetryCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NetworkTimeout => "network timeout",
            Self::StaleAnchor => "expired blockhash",
            Self::RateLimited => "rate limited",
            Self::Unknown => "unknown failure",
        };
        f.write_str(text)
    }
}

/// Submission-level errors surfaced to callers.
///
/// Retryable node failures are absorbed by the submitter's internal loop
/// and only appear here, classified, once every attempt is exhausted.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// User declined the signing prompt; nothing was broadcast.
    #[error("transaction cancelled: the signing request was rejected")]
    UserRejected,
    /// Fee payer cannot cover the transaction.
    #[error("insufficient funds to complete the transaction")]
    InsufficientFunds,
    /// Malformed or unknown account referenced by the transaction.
    #[error("transaction references an invalid account: {message}")]
    InvalidAccount {
        /// Human-readable description.
        message: String,
    },
    /// An identical submission is already in flight.
    #[error("a submission for this action is already in progress")]
    InFlight,
    /// Cluster reported the transaction as already processed, but its
    /// signature could not be located in the fee payer's history.
    #[error("transaction was already processed but could not be verified; check your wallet")]
    AlreadyProcessed,
    /// Transaction landed on chain but failed during execution.
    #[error("transaction failed on chain: {message}")]
    TransactionFailed {
        /// Stringified on-chain error.
        message: String,
    },
    /// Wallet failed for a non-rejection reason.
    #[error("wallet failure: {message}")]
    Wallet {
        /// Human-readable description.
        message: String,
    },
    /// Every attempt failed with a retryable cause.
    #[error("transaction failed after {attempts} attempts ({last}); please try again")]
    RetriesExhausted {
        /// Attempts performed.
        attempts: usize,
        /// Last retryable cause observed.
        last: RetryCause,
    },
    /// Internal synchronization failure.
    #[error("internal synchronization failure: {message}")]
    Internal {
        /// Failure details.
        message: String,
    },
}

/// What the submitter does with one classified node failure.
#[derive(Debug)]
pub enum Disposition {
    /// Surface immediately without retrying.
    Terminal(SubmitError),
    /// Absorb and retry with backoff.
    Retry(RetryCause),
    /// Search the fee payer's history instead of retrying blindly.
    RecoverFromHistory,
}

impl Disposition {
    /// Returns true when the failure should be retried with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retry(_))
    }
}

/// Maps a structured node error onto a submitter disposition.
#[must_use]
pub fn classify_node_error(error: &NodeError) -> Disposition {
    match error {
        NodeError::Timeout { .. } | NodeError::Transport { .. } => {
            Disposition::Retry(RetryCause::NetworkTimeout)
        }
        NodeError::RateLimited { .. } => Disposition::Retry(RetryCause::RateLimited),
        NodeError::BlockhashNotFound => Disposition::Retry(RetryCause::StaleAnchor),
        NodeError::AlreadyProcessed => Disposition::RecoverFromHistory,
        NodeError::InsufficientFunds => Disposition::Terminal(SubmitError::InsufficientFunds),
        NodeError::InvalidAccount { message } => {
            Disposition::Terminal(SubmitError::InvalidAccount {
                message: message.clone(),
            })
        }
        NodeError::Config { message } => Disposition::Terminal(SubmitError::Internal {
            message: message.clone(),
        }),
        NodeError::TransactionFailed { .. } | NodeError::Rpc { .. } => {
            Disposition::Retry(RetryCause::Unknown)
        }
    }
}

/// Submitter tuning.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SubmitConfig {
    /// Total broadcast attempts per call.
    pub max_attempts: usize,
    /// Per-attempt confirmation bound.
    pub confirm_timeout: Duration,
    /// Backoff base, doubled per attempt.
    pub backoff_base: Duration,
    /// Backoff base used after rate limiting.
    pub rate_limited_backoff_base: Duration,
    /// Compute unit limit set on every transaction.
    pub compute_unit_limit: u32,
    /// Commitment level confirmations wait for.
    pub commitment: Commitment,
    /// Records scanned during already-processed recovery.
    pub history_scan_limit: usize,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            confirm_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_millis(500),
            rate_limited_backoff_base: Duration::from_secs(2),
            compute_unit_limit: 200_000,
            commitment: Commitment::Confirmed,
            history_scan_limit: 20,
        }
    }
}

impl SubmitConfig {
    /// Returns the delay before the next attempt (exponential, base
    /// doubling per completed attempt).
    #[must_use]
    pub fn backoff_delay(&self, completed_attempts: usize, cause: RetryCause) -> Duration {
        let base = if matches!(cause, RetryCause::RateLimited) {
            self.rate_limited_backoff_base
        } else {
            self.backoff_base
        };
        let exponent = u32::try_from(completed_attempts.saturating_sub(1))
            .unwrap_or(0)
            .min(10);
        base.saturating_mul(1_u32 << exponent)
    }
}
