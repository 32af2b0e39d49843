//! HTTP fee-oracle adapter for `getPriorityFeeEstimate`-style endpoints.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use serde::{Deserialize, Serialize};

use crate::{
    fees::{FeeEstimate, FeeLevelTable, PriorityLevel},
    providers::{FeeOracle, FeeOracleRequest, OracleError},
};

/// Per-request HTTP bound.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Third-party fee oracle speaking JSON-RPC over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeeOracle {
    /// HTTP client used for oracle calls.
    client: reqwest::Client,
    /// Target oracle endpoint URL.
    rpc_url: String,
}

impl HttpFeeOracle {
    /// Creates an oracle client.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Transport`] when HTTP client creation fails.
    pub fn new(rpc_url: impl Into<String>) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| OracleError::Transport {
                message: error.to_string(),
            })?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
        })
    }
}

/// Oracle request options.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EstimateOptions {
    /// Requested priority tier.
    priority_level: PriorityLevel,
    /// Request the full per-tier table.
    include_all_priority_fee_levels: bool,
    /// Encoding of the serialized transaction, when provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_encoding: Option<&'static str>,
}

/// Oracle request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EstimateParams {
    /// Account keys the transaction will touch.
    #[serde(skip_serializing_if = "Option::is_none")]
    account_keys: Option<Vec<String>>,
    /// Base64-encoded serialized transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    /// Request options.
    options: EstimateOptions,
}

/// Oracle result payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResult {
    /// Estimate for the requested tier.
    priority_fee_estimate: f64,
    /// Full per-tier table when requested.
    priority_fee_levels: Option<RawLevels>,
}

/// Oracle per-tier table with float values.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLevels {
    /// No-priority tier.
    none: f64,
    /// Low tier.
    low: f64,
    /// Medium tier.
    medium: f64,
    /// High tier.
    high: f64,
    /// Very-high tier.
    very_high: f64,
    /// Maximum tier.
    unsafe_max: f64,
}

/// JSON-RPC envelope.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    /// Result value for successful calls.
    result: Option<EstimateResult>,
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

/// Converts a float micro-lamport value to an integer fee.
fn to_fee(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

/// Translates a JSON-RPC oracle error into a structured variant.
fn classify_oracle_error(code: i64, message: &str) -> OracleError {
    let lowered = message.to_ascii_lowercase();
    if code == -32601 || lowered.contains("is not available") || lowered.contains("method not found")
    {
        return OracleError::MethodUnavailable {
            message: message.to_owned(),
        };
    }
    if code == -32600 && lowered.contains("invalid request parameters") {
        return OracleError::MethodUnavailable {
            message: message.to_owned(),
        };
    }
    if lowered.contains("rate limit") {
        return OracleError::RateLimited {
            message: message.to_owned(),
        };
    }
    OracleError::Malformed {
        message: format!("oracle error {code}: {message}"),
    }
}

#[async_trait]
impl FeeOracle for HttpFeeOracle {
    async fn estimate_fee(
        &self,
        request: &FeeOracleRequest,
        level: PriorityLevel,
    ) -> Result<FeeEstimate, OracleError> {
        let (account_keys, transaction, transaction_encoding) = match request {
            FeeOracleRequest::Accounts(accounts) => (
                Some(accounts.iter().map(ToString::to_string).collect()),
                None,
                None,
            ),
            FeeOracleRequest::SerializedTransaction(bytes) => {
                (None, Some(BASE64_STANDARD.encode(bytes)), Some("base64"))
            }
        };
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getPriorityFeeEstimate",
            "params": [EstimateParams {
                account_keys,
                transaction,
                options: EstimateOptions {
                    priority_level: level,
                    include_all_priority_fee_levels: true,
                    transaction_encoding,
                },
            }],
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    OracleError::Transport {
                        message: format!("oracle request timed out: {error}"),
                    }
                } else {
                    OracleError::Transport {
                        message: error.to_string(),
                    }
                }
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::RateLimited {
                message: "http 429 from fee oracle".to_owned(),
            });
        }
        let response = response
            .error_for_status()
            .map_err(|error| OracleError::Transport {
                message: error.to_string(),
            })?;

        let parsed: JsonRpcResponse =
            response.json().await.map_err(|error| OracleError::Malformed {
                message: error.to_string(),
            })?;

        if let Some(error) = parsed.error {
            return Err(classify_oracle_error(error.code, &error.message));
        }
        let result = parsed.result.ok_or_else(|| OracleError::Malformed {
            message: "oracle returned neither result nor error".to_owned(),
        })?;

        let levels = result.priority_fee_levels.map_or_else(
            FeeLevelTable::fallback,
            |levels| FeeLevelTable {
                none: to_fee(levels.none),
                low: to_fee(levels.low),
                medium: to_fee(levels.medium),
                high: to_fee(levels.high),
                very_high: to_fee(levels.very_high),
                unsafe_max: to_fee(levels.unsafe_max),
            },
        );
        Ok(FeeEstimate {
            estimate: to_fee(result.priority_fee_estimate),
            levels: levels.normalized(),
        })
    }
}
