//! Submitter tests against scripted node and wallet fakes.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use async_trait::async_trait;
use solana_keypair::Keypair;
use solana_message::VersionedMessage;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_system_interface::instruction as system_instruction;
use solana_transaction::versioned::VersionedTransaction;
use tokio::time::sleep;

use crate::{
    anchor::BlockhashProvider,
    cache::TransactionCache,
    fees::{FeeEstimator, PriorityLevel},
    intent::{BalanceEffect, TransactionIntent},
    ledger::BalanceLedger,
    providers::{
        Commitment, NodeClient, NodeError, PrioritizationFeeSample, SignatureRecord, WalletError,
        WalletSigner,
    },
    submit::{RetryCause, SubmitConfig, SubmitError, SubmitStage, TransactionSubmitter},
};

/// Node fake driven by per-call scripts, falling back to a default.
struct ScriptedNode {
    /// Number of blockhash queries, also used to derive distinct values.
    blockhash_calls: StdMutex<u64>,
    /// Number of broadcast calls.
    send_calls: StdMutex<u64>,
    /// Scripted broadcast results; `Ok(())` echoes the signed signature.
    send_script: StdMutex<VecDeque<Result<(), NodeError>>>,
    /// Broadcast result once the script is exhausted.
    send_default: Result<(), NodeError>,
    /// Scripted confirmation results.
    confirm_script: StdMutex<VecDeque<Result<(), NodeError>>>,
    /// Number of confirmation calls.
    confirm_calls: StdMutex<u64>,
    /// Leave this many leading confirmation calls unresolved, forcing the
    /// caller's timeout.
    confirm_hangs: u64,
    /// Bytes of the most recently broadcast transaction.
    last_sent: StdMutex<Option<Vec<u8>>>,
    /// Serve address history from the last broadcast transaction.
    history_from_last_sent: bool,
}

impl ScriptedNode {
    fn new() -> Self {
        Self {
            blockhash_calls: StdMutex::new(0),
            send_calls: StdMutex::new(0),
            send_script: StdMutex::new(VecDeque::new()),
            send_default: Ok(()),
            confirm_script: StdMutex::new(VecDeque::new()),
            confirm_calls: StdMutex::new(0),
            confirm_hangs: 0,
            last_sent: StdMutex::new(None),
            history_from_last_sent: false,
        }
    }

    fn with_send_script(self, script: Vec<Result<(), NodeError>>) -> Self {
        if let Ok(mut queue) = self.send_script.lock() {
            queue.extend(script);
        }
        self
    }

    fn send_calls(&self) -> u64 {
        self.send_calls.lock().map(|calls| *calls).unwrap_or_default()
    }

    /// Signature of the most recently broadcast transaction.
    fn last_signature(&self) -> Option<Signature> {
        let bytes = self.last_sent.lock().ok()?.clone()?;
        let tx: VersionedTransaction = bincode::deserialize(&bytes).ok()?;
        tx.signatures.first().copied()
    }
}

#[async_trait]
impl NodeClient for ScriptedNode {
    async fn latest_blockhash(&self, _commitment: Commitment) -> Result<[u8; 32], NodeError> {
        let mut counter = 0_u64;
        if let Ok(mut calls) = self.blockhash_calls.lock() {
            *calls = calls.saturating_add(1);
            counter = *calls;
        }
        // Distinct value per call so freshness re-queries never trigger.
        let mut value = [0_u8; 32];
        value[..8].copy_from_slice(&counter.to_le_bytes());
        Ok(value)
    }

    async fn send_transaction(&self, tx_bytes: &[u8]) -> Result<Signature, NodeError> {
        if let Ok(mut calls) = self.send_calls.lock() {
            *calls = calls.saturating_add(1);
        }
        if let Ok(mut last) = self.last_sent.lock() {
            *last = Some(tx_bytes.to_vec());
        }
        let scripted = self
            .send_script
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| self.send_default.clone());
        scripted?;
        let tx: VersionedTransaction =
            bincode::deserialize(tx_bytes).map_err(|error| NodeError::Transport {
                message: error.to_string(),
            })?;
        tx.signatures
            .first()
            .copied()
            .ok_or_else(|| NodeError::Transport {
                message: "broadcast transaction carries no signature".to_owned(),
            })
    }

    async fn confirm_transaction(
        &self,
        _signature: &Signature,
        _commitment: Commitment,
    ) -> Result<(), NodeError> {
        let call = self
            .confirm_calls
            .lock()
            .map(|mut calls| {
                let current = *calls;
                *calls = calls.saturating_add(1);
                current
            })
            .unwrap_or_default();
        if call < self.confirm_hangs {
            sleep(Duration::from_secs(3_600)).await;
        }
        self.confirm_script
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or(Ok(()))
    }

    async fn signatures_for_address(
        &self,
        _address: &Pubkey,
        _limit: usize,
    ) -> Result<Vec<SignatureRecord>, NodeError> {
        if !self.history_from_last_sent {
            return Ok(Vec::new());
        }
        Ok(self
            .last_signature()
            .map(|signature| SignatureRecord {
                signature,
                slot: 1,
                block_time: None,
                err: None,
            })
            .into_iter()
            .collect())
    }

    async fn recent_prioritization_fees(
        &self,
        _accounts: &[Pubkey],
    ) -> Result<Vec<PrioritizationFeeSample>, NodeError> {
        Ok(Vec::new())
    }
}

/// Wallet fake around a local keypair with rejection and delay knobs.
struct TestWallet {
    /// Signing keypair.
    keypair: Keypair,
    /// Reject every signing request.
    reject: bool,
    /// Delay before each signing completes.
    sign_delay: Duration,
    /// Number of signing requests.
    sign_calls: StdMutex<u64>,
}

impl TestWallet {
    fn new() -> Self {
        Self {
            keypair: Keypair::new(),
            reject: false,
            sign_delay: Duration::ZERO,
            sign_calls: StdMutex::new(0),
        }
    }

    fn sign_calls(&self) -> u64 {
        self.sign_calls.lock().map(|calls| *calls).unwrap_or_default()
    }
}

#[async_trait]
impl WalletSigner for TestWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(
        &self,
        message: VersionedMessage,
    ) -> Result<VersionedTransaction, WalletError> {
        if let Ok(mut calls) = self.sign_calls.lock() {
            *calls = calls.saturating_add(1);
        }
        if !self.sign_delay.is_zero() {
            sleep(self.sign_delay).await;
        }
        if self.reject {
            return Err(WalletError::Rejected);
        }
        VersionedTransaction::try_new(message, &[&self.keypair]).map_err(|source| {
            WalletError::Signing {
                message: source.to_string(),
            }
        })
    }
}

/// Tight backoff so retry tests finish quickly.
fn fast_config() -> SubmitConfig {
    SubmitConfig {
        backoff_base: Duration::from_millis(1),
        rate_limited_backoff_base: Duration::from_millis(1),
        ..SubmitConfig::default()
    }
}

fn submitter(
    node: Arc<ScriptedNode>,
    wallet: Arc<TestWallet>,
    cache_ttl: Duration,
    config: SubmitConfig,
) -> TransactionSubmitter {
    let fees = FeeEstimator::new(node.clone());
    let anchors = BlockhashProvider::new(node.clone()).with_retry_delay(Duration::from_millis(1));
    TransactionSubmitter::new(
        node,
        wallet,
        fees,
        anchors,
        Arc::new(TransactionCache::new(cache_ttl)),
        Arc::new(BalanceLedger::new()),
    )
    .with_config(config)
}

fn transfer_intent(wallet: &TestWallet, recipient: Pubkey, lamports: u64) -> TransactionIntent {
    let payer = wallet.keypair.pubkey();
    TransactionIntent::new(payer)
        .add_instruction(system_instruction::transfer(&payer, &recipient, lamports))
}

#[tokio::test]
async fn confirmed_submission_applies_ledger_effect_once() {
    let node = Arc::new(ScriptedNode::new());
    let wallet = Arc::new(TestWallet::new());
    let sub = submitter(
        node.clone(),
        wallet.clone(),
        Duration::from_secs(30),
        fast_config(),
    );
    let user = wallet.keypair.pubkey();
    let intent = transfer_intent(&wallet, Pubkey::new_unique(), 1_000).with_balance_effect(
        BalanceEffect::Credit {
            user,
            lamports: 1_000,
        },
    );

    let stages = sub.stage_updates();
    let result = sub.submit(intent, PriorityLevel::Medium).await;
    assert!(result.is_ok());
    assert_eq!(node.send_calls(), 1);
    assert_eq!(sub.ledger().balance_of(&user).ok(), Some(1_000));
    assert_eq!(*stages.borrow(), SubmitStage::Confirmed);
}

#[tokio::test]
async fn duplicate_within_ttl_reuses_the_original_signature() {
    let node = Arc::new(ScriptedNode::new());
    let wallet = Arc::new(TestWallet::new());
    let sub = submitter(
        node.clone(),
        wallet.clone(),
        Duration::from_secs(30),
        fast_config(),
    );
    let intent = transfer_intent(&wallet, Pubkey::new_unique(), 500);

    let first = sub.submit(intent.clone(), PriorityLevel::Medium).await;
    let second = sub.submit(intent, PriorityLevel::Medium).await;
    assert!(first.is_ok());
    assert!(second.is_ok());
    if let (Ok(first), Ok(second)) = (first, second) {
        assert_eq!(first, second);
    }
    assert_eq!(node.send_calls(), 1);
    assert_eq!(wallet.sign_calls(), 1);
}

#[tokio::test]
async fn expired_cache_entry_is_rebroadcast() {
    let node = Arc::new(ScriptedNode::new());
    let wallet = Arc::new(TestWallet::new());
    let sub = submitter(
        node.clone(),
        wallet.clone(),
        Duration::from_millis(20),
        fast_config(),
    );
    let intent = transfer_intent(&wallet, Pubkey::new_unique(), 500);

    let first = sub.submit(intent.clone(), PriorityLevel::Medium).await;
    assert!(first.is_ok());
    sleep(Duration::from_millis(40)).await;

    let second = sub.submit(intent, PriorityLevel::Medium).await;
    assert!(second.is_ok());
    assert_eq!(node.send_calls(), 2);
}

#[tokio::test]
async fn retry_budget_is_bounded_and_reports_the_last_cause() {
    let mut node = ScriptedNode::new();
    node.send_default = Err(NodeError::Timeout {
        message: "deadline exceeded".to_owned(),
    });
    let node = Arc::new(node);
    let wallet = Arc::new(TestWallet::new());
    let sub = submitter(
        node.clone(),
        wallet.clone(),
        Duration::from_secs(30),
        fast_config(),
    );
    let intent = transfer_intent(&wallet, Pubkey::new_unique(), 500);

    let result = sub.submit(intent, PriorityLevel::Medium).await;
    assert!(matches!(
        result,
        Err(SubmitError::RetriesExhausted {
            attempts: 5,
            last: RetryCause::NetworkTimeout,
        })
    ));
    assert_eq!(node.send_calls(), 5);
}

#[tokio::test]
async fn user_rejection_broadcasts_nothing() {
    let node = Arc::new(ScriptedNode::new());
    let mut wallet = TestWallet::new();
    wallet.reject = true;
    let wallet = Arc::new(wallet);
    let sub = submitter(
        node.clone(),
        wallet.clone(),
        Duration::from_secs(30),
        fast_config(),
    );
    let intent = transfer_intent(&wallet, Pubkey::new_unique(), 500);

    let result = sub.submit(intent, PriorityLevel::Medium).await;
    assert!(matches!(result, Err(SubmitError::UserRejected)));
    assert_eq!(node.send_calls(), 0);
    assert_eq!(wallet.sign_calls(), 1);
}

#[tokio::test]
async fn already_processed_is_recovered_from_payer_history() {
    let mut node = ScriptedNode::new();
    node.history_from_last_sent = true;
    let node = Arc::new(node.with_send_script(vec![Err(NodeError::AlreadyProcessed)]));
    let wallet = Arc::new(TestWallet::new());
    let sub = submitter(
        node.clone(),
        wallet.clone(),
        Duration::from_secs(30),
        fast_config(),
    );
    let intent = transfer_intent(&wallet, Pubkey::new_unique(), 500);

    let result = sub.submit(intent, PriorityLevel::Medium).await;
    assert!(result.is_ok());
    if let Ok(signature) = result {
        assert_eq!(node.last_signature(), Some(signature));
    }
    assert_eq!(node.send_calls(), 1);
}

#[tokio::test]
async fn already_processed_without_history_match_is_terminal() {
    let node = Arc::new(
        ScriptedNode::new().with_send_script(vec![Err(NodeError::AlreadyProcessed)]),
    );
    let wallet = Arc::new(TestWallet::new());
    let sub = submitter(
        node.clone(),
        wallet.clone(),
        Duration::from_secs(30),
        fast_config(),
    );
    let intent = transfer_intent(&wallet, Pubkey::new_unique(), 500);

    let result = sub.submit(intent, PriorityLevel::Medium).await;
    assert!(matches!(result, Err(SubmitError::AlreadyProcessed)));
    assert_eq!(node.send_calls(), 1);
}

#[tokio::test]
async fn stale_blockhash_is_refreshed_and_retried() {
    let node = Arc::new(
        ScriptedNode::new().with_send_script(vec![Err(NodeError::BlockhashNotFound)]),
    );
    let wallet = Arc::new(TestWallet::new());
    let sub = submitter(
        node.clone(),
        wallet.clone(),
        Duration::from_secs(30),
        fast_config(),
    );
    let intent = transfer_intent(&wallet, Pubkey::new_unique(), 500);

    let result = sub.submit(intent, PriorityLevel::Medium).await;
    assert!(result.is_ok());
    assert_eq!(node.send_calls(), 2);
}

#[tokio::test]
async fn insufficient_funds_is_terminal_after_one_broadcast() {
    let node = Arc::new(
        ScriptedNode::new().with_send_script(vec![Err(NodeError::InsufficientFunds)]),
    );
    let wallet = Arc::new(TestWallet::new());
    let sub = submitter(
        node.clone(),
        wallet.clone(),
        Duration::from_secs(30),
        fast_config(),
    );
    let user = wallet.keypair.pubkey();
    let intent = transfer_intent(&wallet, Pubkey::new_unique(), 500).with_balance_effect(
        BalanceEffect::Credit {
            user,
            lamports: 500,
        },
    );

    let result = sub.submit(intent, PriorityLevel::Medium).await;
    assert!(matches!(result, Err(SubmitError::InsufficientFunds)));
    assert_eq!(node.send_calls(), 1);
    assert_eq!(sub.ledger().balance_of(&user).ok(), Some(0));
}

#[tokio::test]
async fn concurrent_duplicate_is_rejected_as_in_flight() {
    let node = Arc::new(ScriptedNode::new());
    let mut wallet = TestWallet::new();
    wallet.sign_delay = Duration::from_millis(100);
    let wallet = Arc::new(wallet);
    let sub = Arc::new(submitter(
        node.clone(),
        wallet.clone(),
        Duration::from_secs(30),
        fast_config(),
    ));
    let intent = transfer_intent(&wallet, Pubkey::new_unique(), 500);

    let background = {
        let sub = Arc::clone(&sub);
        let intent = intent.clone();
        tokio::spawn(async move { sub.submit(intent, PriorityLevel::Medium).await })
    };
    sleep(Duration::from_millis(20)).await;

    let overlapping = sub.submit(intent, PriorityLevel::Medium).await;
    assert!(matches!(overlapping, Err(SubmitError::InFlight)));

    let first = background.await;
    assert!(matches!(first, Ok(Ok(_))));
    assert_eq!(node.send_calls(), 1);
}

#[tokio::test]
async fn confirmation_timeout_reawaits_the_same_signature() {
    let mut node = ScriptedNode::new();
    node.confirm_hangs = 1;
    let node = Arc::new(node);
    let wallet = Arc::new(TestWallet::new());
    let config = SubmitConfig {
        confirm_timeout: Duration::from_millis(20),
        ..fast_config()
    };
    let sub = submitter(node.clone(), wallet.clone(), Duration::from_secs(30), config);
    let intent = transfer_intent(&wallet, Pubkey::new_unique(), 500);

    let result = sub.submit(intent.clone(), PriorityLevel::Medium).await;
    assert!(result.is_ok());

    // Exactly one transaction was ever signed and broadcast; the retry
    // after the timeout polled the original signature again.
    assert_eq!(node.send_calls(), 1);
    assert_eq!(wallet.sign_calls(), 1);
    if let Ok(signature) = result {
        assert_eq!(node.last_signature(), Some(signature));

        let duplicate = sub.submit(intent, PriorityLevel::Medium).await;
        assert_eq!(duplicate.ok(), Some(signature));
    }
    assert_eq!(node.send_calls(), 1);
}

#[tokio::test]
async fn failed_on_chain_transaction_is_terminal_and_evicted() {
    let mut node = ScriptedNode::new();
    if let Ok(mut queue) = node.confirm_script.lock() {
        queue.push_back(Err(NodeError::TransactionFailed {
            message: "custom program error: 0x1".to_owned(),
        }));
    }
    let node = Arc::new(node);
    let wallet = Arc::new(TestWallet::new());
    let sub = submitter(
        node.clone(),
        wallet.clone(),
        Duration::from_secs(30),
        fast_config(),
    );
    let intent = transfer_intent(&wallet, Pubkey::new_unique(), 500);

    let first = sub.submit(intent.clone(), PriorityLevel::Medium).await;
    assert!(matches!(first, Err(SubmitError::TransactionFailed { .. })));
    assert_eq!(node.send_calls(), 1);

    // The dead signature was evicted, so the identical intent gets a fresh
    // broadcast rather than the failed one from cache.
    let second = sub.submit(intent, PriorityLevel::Medium).await;
    assert!(second.is_ok());
    assert_eq!(node.send_calls(), 2);
}

#[tokio::test]
async fn debit_beyond_session_balance_does_not_fail_a_confirmed_call() {
    let node = Arc::new(ScriptedNode::new());
    let wallet = Arc::new(TestWallet::new());
    let sub = submitter(
        node.clone(),
        wallet.clone(),
        Duration::from_secs(30),
        fast_config(),
    );
    let user = wallet.keypair.pubkey();
    let intent = transfer_intent(&wallet, Pubkey::new_unique(), 500).with_balance_effect(
        BalanceEffect::Debit {
            user,
            lamports: 500,
        },
    );

    let result = sub.submit(intent, PriorityLevel::Medium).await;
    assert!(result.is_ok());
    assert_eq!(sub.ledger().balance_of(&user).ok(), Some(0));
}
