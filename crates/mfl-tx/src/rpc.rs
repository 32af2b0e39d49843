//! JSON-RPC node client adapter.
//!
//! This is the single boundary where wire-level codes and messages are
//! translated into structured [`NodeError`] variants.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use serde::Deserialize;
use solana_hash::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use tokio::time::sleep;

use crate::providers::{
    Commitment, NodeClient, NodeError, PrioritizationFeeSample, SignatureRecord,
};

/// Per-request HTTP bound.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between confirmation polls.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// JSON-RPC node client over HTTP.
#[derive(Debug, Clone)]
pub struct JsonRpcNodeClient {
    /// HTTP client used for RPC calls.
    client: reqwest::Client,
    /// Target JSON-RPC endpoint URL.
    rpc_url: String,
    /// Skip preflight simulation when broadcasting.
    skip_preflight: bool,
}

impl JsonRpcNodeClient {
    /// Creates a node client.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Config`] when HTTP client creation fails.
    pub fn new(rpc_url: impl Into<String>) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| NodeError::Config {
                message: error.to_string(),
            })?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            skip_preflight: true,
        })
    }

    /// Sets whether broadcasts skip preflight simulation.
    #[must_use]
    pub const fn with_skip_preflight(mut self, skip_preflight: bool) -> Self {
        self.skip_preflight = skip_preflight;
        self
    }

    /// Performs one JSON-RPC call and returns the `result` payload.
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, NodeError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(NodeError::RateLimited {
                message: format!("http 429 from {method}"),
            });
        }
        let response = response
            .error_for_status()
            .map_err(map_transport_error)?;

        let parsed: JsonRpcResponse = response.json().await.map_err(map_transport_error)?;

        if let Some(error) = parsed.error {
            return Err(classify_rpc_error(error.code, &error.message));
        }
        parsed.result.ok_or_else(|| NodeError::Transport {
            message: format!("{method} returned neither result nor error"),
        })
    }
}

/// JSON-RPC envelope.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    /// Result value for successful calls.
    result: Option<serde_json::Value>,
    /// Error payload for failed calls.
    error: Option<JsonRpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    /// JSON-RPC error code.
    code: i64,
    /// Human-readable message.
    message: String,
}

/// Maps a reqwest failure onto transport or timeout variants.
fn map_transport_error(error: reqwest::Error) -> NodeError {
    if error.is_timeout() {
        NodeError::Timeout {
            message: error.to_string(),
        }
    } else {
        NodeError::Transport {
            message: error.to_string(),
        }
    }
}

/// Translates a JSON-RPC error into a structured variant.
///
/// The node reports several conditions only through free-form messages;
/// matching on them here keeps the rest of the crate free of text
/// inspection.
fn classify_rpc_error(code: i64, message: &str) -> NodeError {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("already been processed") {
        return NodeError::AlreadyProcessed;
    }
    if lowered.contains("blockhash not found") || lowered.contains("blockhash expired") {
        return NodeError::BlockhashNotFound;
    }
    if lowered.contains("insufficient funds") || lowered.contains("insufficient lamports") {
        return NodeError::InsufficientFunds;
    }
    if lowered.contains("invalid account") || lowered.contains("accountnotfound") {
        return NodeError::InvalidAccount {
            message: message.to_owned(),
        };
    }
    if lowered.contains("too many requests") || lowered.contains("rate limit") {
        return NodeError::RateLimited {
            message: message.to_owned(),
        };
    }
    NodeError::Rpc {
        code,
        message: message.to_owned(),
    }
}

/// Returns a rank for confirmation-status comparison.
fn commitment_rank(status: &str) -> u8 {
    match status {
        "processed" => 1,
        "confirmed" => 2,
        "finalized" => 3,
        _ => 0,
    }
}

#[async_trait]
impl NodeClient for JsonRpcNodeClient {
    async fn latest_blockhash(&self, commitment: Commitment) -> Result<[u8; 32], NodeError> {
        let result = self
            .call(
                "getLatestBlockhash",
                serde_json::json!([{ "commitment": commitment.as_str() }]),
            )
            .await?;
        let blockhash = result
            .pointer("/value/blockhash")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| NodeError::Transport {
                message: "getLatestBlockhash response missing blockhash".to_owned(),
            })?;
        let hash: Hash = blockhash.parse().map_err(|_| NodeError::Transport {
            message: format!("unparseable blockhash: {blockhash}"),
        })?;
        Ok(hash.to_bytes())
    }

    async fn send_transaction(&self, tx_bytes: &[u8]) -> Result<Signature, NodeError> {
        let encoded_tx = BASE64_STANDARD.encode(tx_bytes);
        let result = self
            .call(
                "sendTransaction",
                serde_json::json!([
                    encoded_tx,
                    {
                        "encoding": "base64",
                        "skipPreflight": self.skip_preflight,
                    }
                ]),
            )
            .await?;
        let signature = result.as_str().ok_or_else(|| NodeError::Transport {
            message: "sendTransaction returned a non-string result".to_owned(),
        })?;
        signature.parse().map_err(|_| NodeError::Transport {
            message: format!("unparseable signature: {signature}"),
        })
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        commitment: Commitment,
    ) -> Result<(), NodeError> {
        let wanted = commitment_rank(commitment.as_str());
        loop {
            let result = self
                .call(
                    "getSignatureStatuses",
                    serde_json::json!([
                        [signature.to_string()],
                        { "searchTransactionHistory": true }
                    ]),
                )
                .await?;
            let status = result.pointer("/value/0");
            if let Some(status) = status
                && !status.is_null()
            {
                if let Some(err) = status.get("err")
                    && !err.is_null()
                {
                    return Err(NodeError::TransactionFailed {
                        message: err.to_string(),
                    });
                }
                let reached = status
                    .pointer("/confirmationStatus")
                    .and_then(serde_json::Value::as_str)
                    .map_or(0, commitment_rank);
                if reached >= wanted {
                    return Ok(());
                }
            }
            sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }

    async fn signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureRecord>, NodeError> {
        let result = self
            .call(
                "getSignaturesForAddress",
                serde_json::json!([address.to_string(), { "limit": limit }]),
            )
            .await?;
        let rows = result.as_array().ok_or_else(|| NodeError::Transport {
            message: "getSignaturesForAddress returned a non-array result".to_owned(),
        })?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let signature_str = row
                .get("signature")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| NodeError::Transport {
                    message: "signature record missing signature field".to_owned(),
                })?;
            let signature = signature_str.parse().map_err(|_| NodeError::Transport {
                message: format!("unparseable signature: {signature_str}"),
            })?;
            let err = row.get("err").filter(|err| !err.is_null());
            records.push(SignatureRecord {
                signature,
                slot: row
                    .get("slot")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0),
                block_time: row.get("blockTime").and_then(serde_json::Value::as_i64),
                err: err.map(ToString::to_string),
            });
        }
        Ok(records)
    }

    async fn recent_prioritization_fees(
        &self,
        accounts: &[Pubkey],
    ) -> Result<Vec<PrioritizationFeeSample>, NodeError> {
        let addresses: Vec<String> = accounts.iter().map(ToString::to_string).collect();
        let result = self
            .call("getRecentPrioritizationFees", serde_json::json!([addresses]))
            .await?;
        let rows = result.as_array().ok_or_else(|| NodeError::Transport {
            message: "getRecentPrioritizationFees returned a non-array result".to_owned(),
        })?;

        Ok(rows
            .iter()
            .map(|row| PrioritizationFeeSample {
                slot: row
                    .get("slot")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0),
                prioritization_fee: row
                    .get("prioritizationFee")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0),
            })
            .collect())
    }
}
