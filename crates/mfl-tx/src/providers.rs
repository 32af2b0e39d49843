//! Capability traits consumed from the surrounding application: node RPC
//! access, wallet signing, and the optional third-party fee oracle.

use async_trait::async_trait;
use solana_keypair::Keypair;
use solana_message::VersionedMessage;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use thiserror::Error;

use crate::fees::{FeeEstimate, PriorityLevel};

/// Commitment level requested from the node.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Commitment {
    /// Transaction processed by the node's current fork.
    Processed,
    /// Transaction confirmed by a supermajority of the cluster.
    Confirmed,
    /// Transaction finalized and rooted.
    Finalized,
}

impl Commitment {
    /// Returns the wire-format commitment string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

/// Node-level errors with structured classification.
///
/// The JSON-RPC adapter performs the single translation from wire
/// codes/messages into these variants; everything above this boundary
/// matches on variants, never on error text.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum NodeError {
    /// Invalid client configuration.
    #[error("node client configuration invalid: {message}")]
    Config {
        /// Human-readable description.
        message: String,
    },
    /// Request exceeded its time budget.
    #[error("node request timed out: {message}")]
    Timeout {
        /// Human-readable description.
        message: String,
    },
    /// Node or endpoint rejected the request due to rate limiting.
    #[error("node rate limited the request: {message}")]
    RateLimited {
        /// Human-readable description.
        message: String,
    },
    /// Referenced blockhash is unknown or expired.
    #[error("blockhash not found or expired")]
    BlockhashNotFound,
    /// Identical transaction was already processed by the cluster.
    #[error("transaction has already been processed")]
    AlreadyProcessed,
    /// Fee payer cannot cover the transaction.
    #[error("insufficient funds for transaction")]
    InsufficientFunds,
    /// Malformed or unknown account referenced by the transaction.
    #[error("invalid account: {message}")]
    InvalidAccount {
        /// Human-readable description.
        message: String,
    },
    /// Transaction landed but failed during execution.
    #[error("transaction failed on chain: {message}")]
    TransactionFailed {
        /// Stringified on-chain error.
        message: String,
    },
    /// Structured RPC error not covered by a dedicated variant.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable message.
        message: String,
    },
    /// Transport-level failure (connection, TLS, malformed body).
    #[error("node transport failure: {message}")]
    Transport {
        /// Human-readable description.
        message: String,
    },
}

/// One signature record from the fee payer's recent history.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SignatureRecord {
    /// Transaction signature.
    pub signature: Signature,
    /// Slot the transaction was processed in.
    pub slot: u64,
    /// Block time when known.
    pub block_time: Option<i64>,
    /// Stringified execution error when the transaction failed.
    pub err: Option<String>,
}

/// One per-slot prioritization-fee sample from the node.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PrioritizationFeeSample {
    /// Slot the sample was taken in.
    pub slot: u64,
    /// Smallest fee paid for inclusion, micro-lamports per compute unit.
    pub prioritization_fee: u64,
}

/// Read/submit access to a blockchain node.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Returns the latest blockhash at the requested commitment.
    async fn latest_blockhash(&self, commitment: Commitment) -> Result<[u8; 32], NodeError>;

    /// Broadcasts serialized transaction bytes and returns the signature.
    async fn send_transaction(&self, tx_bytes: &[u8]) -> Result<Signature, NodeError>;

    /// Waits until the signature reaches the requested commitment.
    ///
    /// Implementations may poll without an internal bound; callers apply
    /// their own timeout.
    async fn confirm_transaction(
        &self,
        signature: &Signature,
        commitment: Commitment,
    ) -> Result<(), NodeError>;

    /// Returns up to `limit` recent signatures involving `address`, newest
    /// first.
    async fn signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureRecord>, NodeError>;

    /// Returns recent per-slot prioritization-fee samples for the accounts.
    async fn recent_prioritization_fees(
        &self,
        accounts: &[Pubkey],
    ) -> Result<Vec<PrioritizationFeeSample>, NodeError>;
}

/// Wallet-level errors.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum WalletError {
    /// User declined the signing prompt.
    #[error("user rejected the signing request")]
    Rejected,
    /// Signing failed for a non-rejection reason.
    #[error("failed to sign transaction: {message}")]
    Signing {
        /// Human-readable description.
        message: String,
    },
}

/// Signing capability provided by an external wallet.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Returns the wallet's fee-payer identity.
    fn pubkey(&self) -> Pubkey;

    /// Signs a versioned message, possibly after prompting the user.
    async fn sign_transaction(
        &self,
        message: VersionedMessage,
    ) -> Result<VersionedTransaction, WalletError>;
}

/// Fee-oracle errors.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum OracleError {
    /// Oracle reports the estimation method as unsupported.
    #[error("fee estimation method unavailable: {message}")]
    MethodUnavailable {
        /// Human-readable description.
        message: String,
    },
    /// Oracle rejected the request due to rate limiting.
    #[error("fee oracle rate limited the request: {message}")]
    RateLimited {
        /// Human-readable description.
        message: String,
    },
    /// Oracle response could not be interpreted.
    #[error("malformed fee oracle response: {message}")]
    Malformed {
        /// Human-readable description.
        message: String,
    },
    /// Transport-level failure.
    #[error("fee oracle transport failure: {message}")]
    Transport {
        /// Human-readable description.
        message: String,
    },
}

/// Estimation request accepted by the oracle capability.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FeeOracleRequest {
    /// Estimate from the accounts the transaction will touch.
    Accounts(Vec<Pubkey>),
    /// Estimate from a serialized transaction.
    SerializedTransaction(Vec<u8>),
}

/// Third-party priority-fee estimation capability.
#[async_trait]
pub trait FeeOracle: Send + Sync {
    /// Returns a fee estimate for the request at the given level.
    async fn estimate_fee(
        &self,
        request: &FeeOracleRequest,
        level: PriorityLevel,
    ) -> Result<FeeEstimate, OracleError>;
}

/// Wallet adapter backed by a local keypair, used by server-side callers
/// and tests.
pub struct LocalKeypairWallet {
    /// Signing keypair.
    keypair: Keypair,
}

impl LocalKeypairWallet {
    /// Creates a wallet adapter around a keypair.
    #[must_use]
    pub const fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

#[async_trait]
impl WalletSigner for LocalKeypairWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(
        &self,
        message: VersionedMessage,
    ) -> Result<VersionedTransaction, WalletError> {
        VersionedTransaction::try_new(message, &[&self.keypair]).map_err(|source| {
            WalletError::Signing {
                message: source.to_string(),
            }
        })
    }
}
