#![forbid(unsafe_code)]

//! Transaction-reliability layer for platform deposits, withdrawals, and
//! league-entry payments: fee estimation with tiered fallback, blockhash
//! freshness, duplicate-submission suppression, submit/confirm retry
//! orchestration, and session-local balance tracking.

/// Blockhash anchor provider with freshness window.
pub mod anchor;
/// Duplicate-submission cache keyed by intent digest.
pub mod cache;
/// Priority-fee estimation with tiered fallback.
pub mod fees;
/// Transaction intent, canonical digest, and message assembly.
pub mod intent;
/// Session-local balance ledger.
pub mod ledger;
/// HTTP fee-oracle adapter.
pub mod oracle;
/// Capability traits consumed from the surrounding application.
pub mod providers;
/// JSON-RPC node client adapter.
pub mod rpc;
/// Transaction submitter and retry orchestration.
pub mod submit;

pub use anchor::{BlockhashAnchor, BlockhashProvider};
pub use cache::{CacheDecision, TransactionCache};
pub use fees::{FeeEstimate, FeeEstimator, FeeLevelTable, PriorityLevel, Urgency};
pub use intent::{BalanceEffect, IntentDigest, TransactionIntent};
pub use ledger::{BalanceLedger, LedgerError};
pub use oracle::HttpFeeOracle;
pub use providers::{
    Commitment, FeeOracle, FeeOracleRequest, LocalKeypairWallet, NodeClient, NodeError,
    OracleError, PrioritizationFeeSample, SignatureRecord, WalletError, WalletSigner,
};
pub use rpc::JsonRpcNodeClient;
pub use submit::{RetryCause, SubmitConfig, SubmitError, SubmitStage, TransactionSubmitter};
