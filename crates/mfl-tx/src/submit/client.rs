//! Submitter implementation: one retry loop driving build, sign,
//! broadcast, and confirm, with structured classification between
//! attempts.

use std::{sync::Arc, time::Instant};

use solana_pubkey::Pubkey;
use solana_signature::Signature;
use tokio::{
    sync::watch,
    time::{sleep, timeout},
};

use crate::{
    anchor::BlockhashProvider,
    cache::{CacheDecision, ReservationGuard, TransactionCache},
    fees::{FeeEstimator, PriorityLevel},
    intent::{BalanceEffect, IntentDigest, TransactionIntent},
    ledger::BalanceLedger,
    providers::{NodeClient, NodeError, WalletError, WalletSigner},
    submit::types::{
        Disposition, RetryCause, SubmitConfig, SubmitError, SubmitStage, classify_node_error,
    },
};

/// Outcome of one broadcast attempt.
enum AttemptOutcome {
    /// Transaction confirmed under this signature.
    Confirmed(Signature),
    /// Attempt failed retryably.
    Retry(RetryCause),
    /// Attempt failed terminally.
    Terminal(SubmitError),
}

impl AttemptOutcome {
    /// Lifts a classification into an attempt outcome.
    fn from_disposition(disposition: Disposition) -> Self {
        match disposition {
            Disposition::Terminal(error) => Self::Terminal(error),
            Disposition::Retry(cause) => Self::Retry(cause),
            // Recovery is handled at the broadcast and confirm sites; a
            // stray occurrence degrades to a bounded retry.
            Disposition::RecoverFromHistory => Self::Retry(RetryCause::Unknown),
        }
    }
}

/// Submits transaction intents: estimates fees, anchors a fresh
/// blockhash, signs through the wallet capability, broadcasts, and waits
/// for confirmation, retrying retryable failures with exponential
/// backoff.
///
/// Identical intents within the cache TTL are served the original
/// signature without a second broadcast.
pub struct TransactionSubmitter {
    /// Node used for broadcast and confirmation.
    node: Arc<dyn NodeClient>,
    /// Wallet signing capability.
    wallet: Arc<dyn WalletSigner>,
    /// Priority-fee estimator.
    fees: FeeEstimator,
    /// Blockhash anchor provider.
    anchors: BlockhashProvider,
    /// Duplicate-submission cache.
    cache: Arc<TransactionCache>,
    /// Session balance ledger, updated after confirmation.
    ledger: Arc<BalanceLedger>,
    /// Retry and confirmation tuning.
    config: SubmitConfig,
    /// Stage publisher for UI consumers.
    stage_tx: watch::Sender<SubmitStage>,
}

impl TransactionSubmitter {
    /// Creates a submitter with default tuning.
    #[must_use]
    pub fn new(
        node: Arc<dyn NodeClient>,
        wallet: Arc<dyn WalletSigner>,
        fees: FeeEstimator,
        anchors: BlockhashProvider,
        cache: Arc<TransactionCache>,
        ledger: Arc<BalanceLedger>,
    ) -> Self {
        let (stage_tx, _stage_rx) = watch::channel(SubmitStage::Idle);
        Self {
            node,
            wallet,
            fees,
            anchors,
            cache,
            ledger,
            config: SubmitConfig::default(),
            stage_tx,
        }
    }

    /// Replaces the submitter tuning.
    #[must_use]
    pub fn with_config(mut self, config: SubmitConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns a receiver observing the current submission stage.
    #[must_use]
    pub fn stage_updates(&self) -> watch::Receiver<SubmitStage> {
        self.stage_tx.subscribe()
    }

    /// Returns the session balance ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<BalanceLedger> {
        &self.ledger
    }

    /// Submits an intent and returns the confirmed signature.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::InFlight`] when an identical submission is
    /// already running, a terminal classification when the failure cannot
    /// be retried, or [`SubmitError::RetriesExhausted`] once every attempt
    /// has failed retryably.
    pub async fn submit(
        &self,
        intent: TransactionIntent,
        level: PriorityLevel,
    ) -> Result<Signature, SubmitError> {
        let digest = intent.digest();
        let decision =
            self.cache
                .begin(digest, Instant::now())
                .map_err(|error| SubmitError::Internal {
                    message: error.to_string(),
                })?;
        let mut reservation = match decision {
            CacheDecision::Hit(signature) => {
                tracing::debug!(%digest, %signature, "duplicate submission served from cache");
                return Ok(signature);
            }
            CacheDecision::InFlight => return Err(SubmitError::InFlight),
            CacheDecision::Reserved(guard) => Some(guard),
        };

        self.set_stage(SubmitStage::Building);
        let fee = self.fees.estimate(&intent.account_keys(), level).await;
        tracing::debug!(%digest, fee = fee.estimate, "assembling transaction");

        let mut last_cause = RetryCause::Unknown;
        let mut broadcast = None;
        for attempt in 1..=self.config.max_attempts {
            match self
                .attempt(&intent, digest, fee.estimate, &mut reservation, &mut broadcast)
                .await
            {
                AttemptOutcome::Confirmed(signature) => {
                    self.apply_balance_effect(&intent, &signature);
                    self.set_stage(SubmitStage::Confirmed);
                    tracing::debug!(%digest, %signature, attempt, "transaction confirmed");
                    return Ok(signature);
                }
                AttemptOutcome::Terminal(error) => {
                    self.set_stage(SubmitStage::Failed);
                    return Err(error);
                }
                AttemptOutcome::Retry(cause) => {
                    last_cause = cause;
                    if matches!(cause, RetryCause::StaleAnchor) {
                        self.anchors.invalidate();
                    }
                    if attempt < self.config.max_attempts {
                        let delay = self.config.backoff_delay(attempt, cause);
                        tracing::warn!(
                            %digest,
                            attempt,
                            cause = %cause,
                            delay = ?delay,
                            "attempt failed, backing off before retry"
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        self.set_stage(SubmitStage::Failed);
        Err(SubmitError::RetriesExhausted {
            attempts: self.config.max_attempts,
            last: last_cause,
        })
    }

    /// Runs one build-sign-broadcast-confirm attempt.
    async fn attempt(
        &self,
        intent: &TransactionIntent,
        digest: IntentDigest,
        fee: u64,
        reservation: &mut Option<ReservationGuard>,
        broadcast: &mut Option<Signature>,
    ) -> AttemptOutcome {
        // Once a transaction for this digest has been broadcast it stays the
        // only live one; later attempts re-await its confirmation instead of
        // signing and broadcasting a second transaction.
        if let Some(sent) = *broadcast {
            return self.await_confirmation(digest, sent).await;
        }

        let anchor = match self.anchors.fresh_anchor().await {
            Ok(anchor) => anchor,
            Err(error) => return AttemptOutcome::from_disposition(classify_node_error(&error)),
        };
        let message = intent.to_message(anchor.value, self.config.compute_unit_limit, fee);

        self.set_stage(SubmitStage::Signing);
        let signed = match self.wallet.sign_transaction(message).await {
            Ok(signed) => signed,
            Err(WalletError::Rejected) => {
                return AttemptOutcome::Terminal(SubmitError::UserRejected);
            }
            Err(WalletError::Signing { message }) => {
                return AttemptOutcome::Terminal(SubmitError::Wallet { message });
            }
        };
        let Some(signature) = signed.signatures.first().copied() else {
            return AttemptOutcome::Terminal(SubmitError::Wallet {
                message: "signed transaction carries no signature".to_owned(),
            });
        };
        let tx_bytes = match bincode::serialize(&signed) {
            Ok(bytes) => bytes,
            Err(error) => {
                return AttemptOutcome::Terminal(SubmitError::Internal {
                    message: format!("transaction serialization failed: {error}"),
                });
            }
        };

        self.set_stage(SubmitStage::Broadcasting);
        let sent = match self.node.send_transaction(&tx_bytes).await {
            Ok(sent) => sent,
            Err(error) => {
                return match classify_node_error(&error) {
                    Disposition::RecoverFromHistory => {
                        self.recover_processed(intent.payer(), signature, reservation)
                            .await
                    }
                    other => AttemptOutcome::from_disposition(other),
                };
            }
        };

        // Record the signature before waiting on confirmation so that
        // overlapping duplicates short-circuit immediately.
        if let Some(guard) = reservation.take() {
            guard.complete(sent, Instant::now());
        }
        *broadcast = Some(sent);

        self.await_confirmation(digest, sent).await
    }

    /// Waits for a broadcast signature to reach the configured commitment.
    async fn await_confirmation(&self, digest: IntentDigest, sent: Signature) -> AttemptOutcome {
        self.set_stage(SubmitStage::Confirming);
        match timeout(
            self.config.confirm_timeout,
            self.node.confirm_transaction(&sent, self.config.commitment),
        )
        .await
        {
            Ok(Ok(())) => AttemptOutcome::Confirmed(sent),
            Ok(Err(NodeError::TransactionFailed { message })) => {
                // The transaction landed and failed; drop the cache entry so
                // a later identical submission is not served a dead
                // signature.
                self.cache.evict(digest);
                AttemptOutcome::Terminal(SubmitError::TransactionFailed { message })
            }
            Ok(Err(error)) => match classify_node_error(&error) {
                // Already-processed during confirmation means the
                // transaction landed.
                Disposition::RecoverFromHistory => AttemptOutcome::Confirmed(sent),
                other => AttemptOutcome::from_disposition(other),
            },
            Err(_elapsed) => {
                tracing::warn!(signature = %sent, "confirmation timed out, will re-poll");
                AttemptOutcome::Retry(RetryCause::NetworkTimeout)
            }
        }
    }

    /// Searches the fee payer's recent history for a transaction the node
    /// reported as already processed.
    ///
    /// The signature of the signed transaction is known before broadcast,
    /// so a successful record with that exact signature proves the earlier
    /// broadcast landed.
    async fn recover_processed(
        &self,
        payer: Pubkey,
        expected: Signature,
        reservation: &mut Option<ReservationGuard>,
    ) -> AttemptOutcome {
        tracing::debug!(signature = %expected, "broadcast reported already processed, checking history");
        let records = match self
            .node
            .signatures_for_address(&payer, self.config.history_scan_limit)
            .await
        {
            Ok(records) => records,
            Err(error) => return AttemptOutcome::from_disposition(classify_node_error(&error)),
        };

        let landed = records
            .iter()
            .any(|record| record.signature == expected && record.err.is_none());
        if landed {
            if let Some(guard) = reservation.take() {
                guard.complete(expected, Instant::now());
            }
            AttemptOutcome::Confirmed(expected)
        } else {
            AttemptOutcome::Terminal(SubmitError::AlreadyProcessed)
        }
    }

    /// Applies the intent's ledger effect exactly once, after confirmation.
    ///
    /// A ledger failure at this point cannot undo the on-chain transfer, so
    /// it is logged as an inconsistency rather than failing the call.
    fn apply_balance_effect(&self, intent: &TransactionIntent, signature: &Signature) {
        let Some(effect) = intent.balance_effect() else {
            return;
        };
        let result = match effect {
            BalanceEffect::Credit { user, lamports } => self.ledger.credit(user, lamports),
            BalanceEffect::Debit { user, lamports } => self.ledger.debit(user, lamports),
        };
        if let Err(error) = result {
            tracing::warn!(
                %signature,
                %error,
                "ledger update failed after confirmed transaction; session balance is inconsistent"
            );
        }
    }

    /// Publishes the current stage.
    fn set_stage(&self, stage: SubmitStage) {
        let _ = self.stage_tx.send_replace(stage);
    }
}
