//! Jupiter Client
//!
//! Handles Jupiter DEX aggregator integration:
//! - Quote fetching with route optimization
//! - Swap transaction building (fee routing, priority fees)
//! - Status/message translation into `SwapError`
//! - Retry of transient HTTP failures, independent of the RPC node pool

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AggregatorConfig;
use crate::errors::{classify_aggregator_error, SwapError};
use crate::utils::helpers::retry_with_backoff;

/// Jupiter quote response. Every field is optional on the wire; the quote
/// service decides what is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub input_mint: Option<String>,
    pub in_amount: Option<String>,
    pub output_mint: Option<String>,
    pub out_amount: Option<String>,
    pub other_amount_threshold: Option<String>,
    pub swap_mode: Option<String>,
    pub slippage_bps: Option<u16>,
    pub price_impact_pct: Option<String>,
    pub platform_fee: Option<PlatformFee>,
    pub route_plan: Option<Vec<RoutePlan>>,
    /// Full response body
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl QuoteResponse {
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut response: QuoteResponse = serde_json::from_value(value.clone())?;
        response.raw = value;
        Ok(response)
    }
}

/// Route plan segment
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlan {
    pub swap_info: SwapInfo,
    pub percent: u8,
}

/// Swap info
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInfo {
    pub amm_key: String,
    pub label: Option<String>,
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: String,
    pub out_amount: String,
    pub fee_amount: Option<String>,
    pub fee_mint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformFee {
    pub amount: Option<String>,
    pub fee_bps: Option<u16>,
}

/// Parameters for a quote request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub slippage_bps: u16,
    pub platform_fee_bps: Option<u16>,
    pub only_direct_routes: bool,
    pub restrict_intermediate_tokens: bool,
}

/// Query string sent to `/quote`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteQuery<'a> {
    input_mint: &'a str,
    output_mint: &'a str,
    amount: u64,
    slippage_bps: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    platform_fee_bps: Option<u16>,
    only_direct_routes: bool,
    restrict_intermediate_tokens: bool,
}

/// Priority fee directive for the swap transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityFee {
    pub level: String,
    pub max_lamports: u64,
}

/// Parameters for building a swap transaction
#[derive(Debug, Clone, PartialEq)]
pub struct SwapBuildRequest {
    pub quote: serde_json::Value,
    pub user: Pubkey,
    pub wrap_and_unwrap_sol: bool,
    pub dynamic_compute_unit_limit: bool,
    pub priority_fee: PriorityFee,
    pub fee_account: Option<Pubkey>,
    /// Fee rate the quote was priced with
    pub fee_bps: Option<u16>,
}

/// Swap request body for `/swap`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest<'a> {
    quote_response: &'a serde_json::Value,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
    dynamic_compute_unit_limit: bool,
    prioritization_fee_lamports: PrioritizationFee,
    #[serde(skip_serializing_if = "Option::is_none")]
    fee_account: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrioritizationFee {
    priority_level_with_max_lamports: PriorityLevelWithMaxLamports,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PriorityLevelWithMaxLamports {
    priority_level: String,
    max_lamports: u64,
}

/// Swap response from Jupiter API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
    last_valid_block_height: Option<u64>,
}

/// Unsigned swap transaction returned by the aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapTransaction {
    /// bincode-encoded `VersionedTransaction`
    pub transaction: Vec<u8>,
    pub last_valid_block_height: Option<u64>,
}

/// Quote and swap-build provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Aggregator: Send + Sync {
    async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, SwapError>;

    async fn build_swap_transaction(
        &self,
        request: &SwapBuildRequest,
    ) -> Result<SwapTransaction, SwapError>;
}

/// Jupiter HTTP client
pub struct JupiterClient {
    /// HTTP client
    client: Client,
    /// Jupiter API URL
    api_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl JupiterClient {
    /// Create a new Jupiter client
    pub fn new(config: &AggregatorConfig) -> Result<Self, SwapError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SwapError::Validation(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            timeout,
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    async fn get_quote_once(&self, request: &QuoteRequest) -> Result<QuoteResponse, SwapError> {
        let url = format!("{}/quote", self.api_url);
        let query = QuoteQuery {
            input_mint: &request.input_mint,
            output_mint: &request.output_mint,
            amount: request.amount,
            slippage_bps: request.slippage_bps,
            platform_fee_bps: request.platform_fee_bps,
            only_direct_routes: request.only_direct_routes,
            restrict_intermediate_tokens: request.restrict_intermediate_tokens,
        };

        debug!(
            input = %request.input_mint,
            output = %request.output_mint,
            amount = request.amount,
            "Fetching Jupiter quote"
        );

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| self.map_request_error(e, "quote request"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_aggregator_error(status.as_u16(), &body));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.map_request_error(e, "quote response"))?;

        let quote = QuoteResponse::from_value(value)
            .map_err(|e| SwapError::RouteNotFound(format!("malformed quote response: {}", e)))?;

        info!(
            "Jupiter quote: {} -> {}, price_impact: {}%",
            quote.in_amount.as_deref().unwrap_or("?"),
            quote.out_amount.as_deref().unwrap_or("?"),
            quote.price_impact_pct.as_deref().unwrap_or("?")
        );

        Ok(quote)
    }

    async fn build_swap_once(
        &self,
        request: &SwapBuildRequest,
    ) -> Result<SwapTransaction, SwapError> {
        let url = format!("{}/swap", self.api_url);

        let body = SwapRequest {
            quote_response: &request.quote,
            user_public_key: request.user.to_string(),
            wrap_and_unwrap_sol: request.wrap_and_unwrap_sol,
            dynamic_compute_unit_limit: request.dynamic_compute_unit_limit,
            prioritization_fee_lamports: PrioritizationFee {
                priority_level_with_max_lamports: PriorityLevelWithMaxLamports {
                    priority_level: request.priority_fee.level.clone(),
                    max_lamports: request.priority_fee.max_lamports,
                },
            },
            fee_account: request.fee_account.map(|a| a.to_string()),
        };

        debug!(user = %request.user, fee_account = ?request.fee_account, "Fetching Jupiter swap transaction");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_request_error(e, "swap request"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_aggregator_error(status.as_u16(), &body));
        }

        let swap_response: SwapResponse = response
            .json()
            .await
            .map_err(|e| SwapError::TransactionBuild(format!("failed to parse swap response: {}", e)))?;

        let transaction = base64::engine::general_purpose::STANDARD
            .decode(&swap_response.swap_transaction)
            .map_err(|e| SwapError::TransactionBuild(format!("failed to decode swap transaction: {}", e)))?;

        Ok(SwapTransaction {
            transaction,
            last_valid_block_height: swap_response.last_valid_block_height,
        })
    }

    fn map_request_error(&self, err: reqwest::Error, operation: &str) -> SwapError {
        if err.is_timeout() {
            return SwapError::Timeout {
                operation: format!("aggregator {}", operation),
                timeout_ms: self.timeout.as_millis() as u64,
            };
        }
        if err.is_decode() {
            return SwapError::RouteNotFound(format!("malformed {}: {}", operation, err));
        }
        SwapError::AggregatorUnavailable {
            status: err.status().map(|s| s.as_u16()).unwrap_or_default(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl Aggregator for JupiterClient {
    async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, SwapError> {
        retry_with_backoff(
            || self.get_quote_once(request),
            self.max_retries,
            self.retry_delay_ms,
            |e: &SwapError| {
                let retry = e.is_retryable();
                if retry {
                    warn!("Jupiter quote failed, retrying: {}", e);
                }
                retry
            },
        )
        .await
    }

    async fn build_swap_transaction(
        &self,
        request: &SwapBuildRequest,
    ) -> Result<SwapTransaction, SwapError> {
        retry_with_backoff(
            || self.build_swap_once(request),
            self.max_retries,
            self.retry_delay_ms,
            |e: &SwapError| e.is_retryable(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_response_parse() {
        let json = serde_json::json!({
            "inputMint": "So11111111111111111111111111111111111111112",
            "inAmount": "1000000000",
            "outputMint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
            "outAmount": "150000000",
            "otherAmountThreshold": "149250000",
            "swapMode": "ExactIn",
            "slippageBps": 50,
            "priceImpactPct": "0.01",
            "platformFee": { "amount": "1500", "feeBps": 10 },
            "routePlan": []
        });

        let quote = QuoteResponse::from_value(json).unwrap();
        assert_eq!(quote.in_amount.as_deref(), Some("1000000000"));
        assert_eq!(quote.slippage_bps, Some(50));
        assert_eq!(quote.platform_fee.and_then(|f| f.fee_bps), Some(10));
        assert_eq!(quote.raw["swapMode"], "ExactIn");
    }

    #[test]
    fn test_partial_quote_response_parses() {
        let quote = QuoteResponse::from_value(serde_json::json!({ "inAmount": "5" })).unwrap();
        assert!(quote.route_plan.is_none());
        assert!(quote.output_mint.is_none());
    }

    #[test]
    fn test_quote_query_serialization() {
        let query = QuoteQuery {
            input_mint: "A",
            output_mint: "B",
            amount: 1_000_000,
            slippage_bps: 50,
            platform_fee_bps: None,
            only_direct_routes: false,
            restrict_intermediate_tokens: true,
        };
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["inputMint"], "A");
        assert_eq!(value["slippageBps"], 50);
        assert!(value.get("platformFeeBps").is_none());
    }

    #[test]
    fn test_swap_request_serialization() {
        let quote = serde_json::json!({ "inAmount": "1" });
        let request = SwapRequest {
            quote_response: &quote,
            user_public_key: Pubkey::new_unique().to_string(),
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
            prioritization_fee_lamports: PrioritizationFee {
                priority_level_with_max_lamports: PriorityLevelWithMaxLamports {
                    priority_level: "veryHigh".to_string(),
                    max_lamports: 1_000_000,
                },
            },
            fee_account: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["wrapAndUnwrapSol"], true);
        assert_eq!(value["dynamicComputeUnitLimit"], true);
        assert_eq!(
            value["prioritizationFeeLamports"]["priorityLevelWithMaxLamports"]["maxLamports"],
            1_000_000
        );
        assert!(value.get("feeAccount").is_none());
    }

    #[test]
    fn test_client_creation() {
        let client = JupiterClient::new(&AggregatorConfig::default()).unwrap();
        assert_eq!(client.api_url, "https://quote-api.jup.ag/v6");
    }
}
