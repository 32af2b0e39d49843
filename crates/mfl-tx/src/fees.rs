//! Priority-fee estimation with tiered fallback: external oracle, then
//! node-derived percentiles, then a static default table.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use solana_pubkey::Pubkey;
use tokio::time::timeout;

use crate::providers::{FeeOracle, FeeOracleRequest, NodeClient, PrioritizationFeeSample};

/// Bound applied to every network call in the estimation chain.
const ESTIMATE_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Priority tier requested by callers.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PriorityLevel {
    /// No priority fee.
    None,
    /// 25th percentile of recent fees.
    Low,
    /// Median of recent fees.
    Medium,
    /// 75th percentile of recent fees.
    High,
    /// 90th percentile of recent fees.
    VeryHigh,
    /// Maximum observed fee.
    UnsafeMax,
}

/// Caller urgency for display-oriented estimates.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Urgency {
    /// Inclusion can wait.
    Low,
    /// Normal inclusion.
    Medium,
    /// Include as fast as practical.
    High,
}

impl Urgency {
    /// Maps urgency onto a priority tier.
    #[must_use]
    pub const fn priority_level(self) -> PriorityLevel {
        match self {
            Self::Low => PriorityLevel::Low,
            Self::Medium => PriorityLevel::Medium,
            Self::High => PriorityLevel::VeryHigh,
        }
    }
}

/// Fee-per-compute-unit values per priority tier, micro-lamports.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeLevelTable {
    /// No-priority tier.
    pub none: u64,
    /// Low tier.
    pub low: u64,
    /// Medium tier.
    pub medium: u64,
    /// High tier.
    pub high: u64,
    /// Very-high tier.
    pub very_high: u64,
    /// Maximum tier.
    pub unsafe_max: u64,
}

impl FeeLevelTable {
    /// Hard-coded table used when both network tiers fail.
    #[must_use]
    pub const fn fallback() -> Self {
        Self {
            none: 0,
            low: 1_000,
            medium: 5_000,
            high: 10_000,
            very_high: 50_000,
            unsafe_max: 100_000,
        }
    }

    /// Returns the fee for one tier.
    #[must_use]
    pub const fn get(&self, level: PriorityLevel) -> u64 {
        match level {
            PriorityLevel::None => self.none,
            PriorityLevel::Low => self.low,
            PriorityLevel::Medium => self.medium,
            PriorityLevel::High => self.high,
            PriorityLevel::VeryHigh => self.very_high,
            PriorityLevel::UnsafeMax => self.unsafe_max,
        }
    }

    /// Returns a table with values clamped to be monotonically
    /// non-decreasing from `none` to `unsafe_max`.
    #[must_use]
    pub const fn normalized(self) -> Self {
        let none = self.none;
        let low = if self.low < none { none } else { self.low };
        let medium = if self.medium < low { low } else { self.medium };
        let high = if self.high < medium { medium } else { self.high };
        let very_high = if self.very_high < high {
            high
        } else {
            self.very_high
        };
        let unsafe_max = if self.unsafe_max < very_high {
            very_high
        } else {
            self.unsafe_max
        };
        Self {
            none,
            low,
            medium,
            high,
            very_high,
            unsafe_max,
        }
    }
}

/// Priority-fee estimate for one request.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FeeEstimate {
    /// Fee for the requested tier, micro-lamports per compute unit.
    pub estimate: u64,
    /// Full per-tier table.
    pub levels: FeeLevelTable,
}

impl FeeEstimate {
    /// Builds an estimate for a tier from a level table.
    #[must_use]
    pub const fn from_table(levels: FeeLevelTable, level: PriorityLevel) -> Self {
        let levels = levels.normalized();
        Self {
            estimate: levels.get(level),
            levels,
        }
    }
}

/// Formats a micro-lamport fee for display.
#[must_use]
pub fn format_priority_fee(micro_lamports: u64) -> String {
    let sol = micro_lamports as f64 / 1e15;
    if sol < 0.000_001 {
        format!("{micro_lamports} micro-lamports")
    } else {
        format!("{sol:.6} SOL")
    }
}

/// Priority-fee estimator with three-tier fallback.
///
/// Never fails: every failure in one tier moves the chain to the next, and
/// the last tier is a constant table.
pub struct FeeEstimator {
    /// Optional third-party oracle, tried first.
    oracle: Option<Arc<dyn FeeOracle>>,
    /// Node used for the percentile fallback tier.
    node: Arc<dyn NodeClient>,
    /// Per-call network bound.
    call_timeout: Duration,
}

impl FeeEstimator {
    /// Creates an estimator with no oracle configured.
    #[must_use]
    pub fn new(node: Arc<dyn NodeClient>) -> Self {
        Self {
            oracle: None,
            node,
            call_timeout: ESTIMATE_CALL_TIMEOUT,
        }
    }

    /// Sets the oracle capability.
    #[must_use]
    pub fn with_oracle(mut self, oracle: Arc<dyn FeeOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Sets the per-call network bound.
    #[must_use]
    pub const fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Estimates the priority fee for the accounts a transaction will touch.
    pub async fn estimate(&self, accounts: &[Pubkey], level: PriorityLevel) -> FeeEstimate {
        self.estimate_request(&FeeOracleRequest::Accounts(accounts.to_vec()), level)
            .await
    }

    /// Estimates the priority fee from a serialized transaction.
    pub async fn estimate_for_transaction(
        &self,
        tx_bytes: &[u8],
        level: PriorityLevel,
    ) -> FeeEstimate {
        self.estimate_request(
            &FeeOracleRequest::SerializedTransaction(tx_bytes.to_vec()),
            level,
        )
        .await
    }

    /// Returns a single display-oriented fee for an urgency bucket.
    pub async fn recommended(&self, urgency: Urgency) -> u64 {
        self.estimate(&[], urgency.priority_level()).await.estimate
    }

    /// Runs the fallback chain for one request.
    async fn estimate_request(
        &self,
        request: &FeeOracleRequest,
        level: PriorityLevel,
    ) -> FeeEstimate {
        if let Some(oracle) = &self.oracle {
            match timeout(self.call_timeout, oracle.estimate_fee(request, level)).await {
                Ok(Ok(estimate)) => {
                    tracing::debug!(
                        tier = "oracle",
                        estimate = estimate.estimate,
                        "priority fee served"
                    );
                    return FeeEstimate {
                        estimate: estimate.estimate,
                        levels: estimate.levels.normalized(),
                    };
                }
                Ok(Err(error)) => {
                    tracing::warn!(%error, "fee oracle failed, trying node percentiles");
                }
                Err(_elapsed) => {
                    tracing::warn!("fee oracle timed out, trying node percentiles");
                }
            }
        }

        let accounts = match request {
            FeeOracleRequest::Accounts(accounts) => accounts.as_slice(),
            FeeOracleRequest::SerializedTransaction(_) => &[],
        };
        match timeout(self.call_timeout, self.node.recent_prioritization_fees(accounts)).await {
            Ok(Ok(samples)) => {
                if let Some(levels) = table_from_samples(&samples) {
                    tracing::debug!(
                        tier = "node_percentiles",
                        samples = samples.len(),
                        "priority fee served"
                    );
                    return FeeEstimate::from_table(levels, level);
                }
                tracing::debug!("no non-zero prioritization-fee samples, using default table");
            }
            Ok(Err(error)) => {
                tracing::warn!(%error, "prioritization-fee query failed, using default table");
            }
            Err(_elapsed) => {
                tracing::warn!("prioritization-fee query timed out, using default table");
            }
        }

        tracing::debug!(tier = "static_default", "priority fee served");
        FeeEstimate::from_table(FeeLevelTable::fallback(), level)
    }
}

/// Builds a percentile table from non-zero samples; `None` when no non-zero
/// samples exist.
fn table_from_samples(samples: &[PrioritizationFeeSample]) -> Option<FeeLevelTable> {
    let mut fees: Vec<u64> = samples
        .iter()
        .map(|sample| sample.prioritization_fee)
        .filter(|fee| *fee > 0)
        .collect();
    if fees.is_empty() {
        return None;
    }
    fees.sort_unstable();
    Some(FeeLevelTable {
        none: 0,
        low: percentile(&fees, 25),
        medium: percentile(&fees, 50),
        high: percentile(&fees, 75),
        very_high: percentile(&fees, 90),
        unsafe_max: fees.last().copied().unwrap_or(0),
    })
}

/// Returns the value at the given percentile of a sorted slice.
fn percentile(sorted: &[u64], percentile: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let index = percentile
        .saturating_mul(sorted.len())
        .div_ceil(100)
        .saturating_sub(1);
    sorted.get(index.min(sorted.len() - 1)).copied().unwrap_or(0)
}
