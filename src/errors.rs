//! Swap Pipeline Errors
//!
//! Typed error taxonomy shared by the quote service, node pool and
//! execution orchestrator, plus the single place where aggregator
//! failures are translated into it:
//! - Structured `errorCode` values first
//! - HTTP status second
//! - Message substring matching as a last resort

use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by the swap pipeline
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapError {
    /// Bad caller input, raised before any network call
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Aggregator returned no usable route
    #[error("No route found: {0}")]
    RouteNotFound(String),

    #[error("Insufficient liquidity: {0}. Try a smaller amount")]
    Liquidity(String),

    #[error("Slippage tolerance exceeded: {0}. Increase slippage or retry")]
    SlippageExceeded(String),

    #[error("Unsupported token: {0}")]
    UnsupportedAsset(String),

    #[error("Amount out of bounds: {0}")]
    AmountBounds(String),

    #[error("Timeout after {timeout_ms}ms during {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Rate limited by {source_name}: {message}")]
    RateLimit { source_name: String, message: String },

    /// Ledger RPC endpoint unreachable or unhealthy
    #[error("RPC unavailable (endpoint: {endpoint}): {message}")]
    RpcUnavailable { endpoint: String, message: String },

    #[error("Insufficient SOL balance: have {available} lamports, need {required} lamports")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Failed to build transaction: {0}")]
    TransactionBuild(String),

    #[error("Failed to broadcast transaction: {0}")]
    Broadcast(String),

    /// Aggregator rejected the request with a 4xx we could not classify
    #[error("Aggregator rejected request ({status}): {message}")]
    AggregatorRejected { status: u16, message: String },

    /// Aggregator returned a 5xx or a gateway timeout
    #[error("Aggregator unavailable ({status}): {message}")]
    AggregatorUnavailable { status: u16, message: String },
}

impl SwapError {
    /// Transient errors that may succeed on another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SwapError::Timeout { .. }
                | SwapError::RpcUnavailable { .. }
                | SwapError::AggregatorUnavailable { .. }
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SwapError::RateLimit { .. })
    }

    /// Stable label for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            SwapError::Validation(_) => "validation",
            SwapError::RouteNotFound(_) => "route_not_found",
            SwapError::Liquidity(_) => "liquidity",
            SwapError::SlippageExceeded(_) => "slippage_exceeded",
            SwapError::UnsupportedAsset(_) => "unsupported_asset",
            SwapError::AmountBounds(_) => "amount_bounds",
            SwapError::Timeout { .. } => "timeout",
            SwapError::RateLimit { .. } => "rate_limit",
            SwapError::RpcUnavailable { .. } => "rpc_unavailable",
            SwapError::InsufficientBalance { .. } => "insufficient_balance",
            SwapError::TransactionBuild(_) => "transaction_build",
            SwapError::Broadcast(_) => "broadcast",
            SwapError::AggregatorRejected { .. } => "aggregator_rejected",
            SwapError::AggregatorUnavailable { .. } => "aggregator_unavailable",
        }
    }

    /// Human-readable advice for the user
    pub fn suggestion(&self) -> &'static str {
        match self {
            SwapError::Validation(_) => "Check the token addresses and enter an amount greater than zero.",
            SwapError::RouteNotFound(_) => "No route exists for this pair right now. Try a different token pair.",
            SwapError::Liquidity(_) => "Not enough liquidity for this size. Try a smaller amount.",
            SwapError::SlippageExceeded(_) => "The price moved too much. Increase slippage tolerance or try again.",
            SwapError::UnsupportedAsset(_) => "This token is not tradable through the aggregator.",
            SwapError::AmountBounds(_) => "The amount is outside the allowed range. Adjust the amount.",
            SwapError::Timeout { .. } => "The request timed out. Try again in a moment.",
            SwapError::RateLimit { .. } => "Too many requests. Wait a few seconds before retrying.",
            SwapError::RpcUnavailable { .. } => "The network is congested or unreachable. Try again shortly.",
            SwapError::InsufficientBalance { .. } => "Add SOL to your wallet to cover network fees.",
            SwapError::TransactionBuild(_) => "The swap transaction could not be prepared. Request a new quote.",
            SwapError::Broadcast(_) => "The transaction was not accepted. Request a new quote and retry.",
            SwapError::AggregatorRejected { .. } => "The quote request was rejected. Check the swap parameters.",
            SwapError::AggregatorUnavailable { .. } => "The quote service is unavailable. Try again shortly.",
        }
    }
}

/// Error body returned by the aggregator
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregatorErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Translate a non-success aggregator response into a `SwapError`
pub fn classify_aggregator_error(status: u16, body: &str) -> SwapError {
    let parsed: AggregatorErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error
        .or(parsed.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    if let Some(code) = parsed.error_code.as_deref() {
        if let Some(err) = classify_error_code(code, &message) {
            return err;
        }
    }

    match status {
        429 => {
            return SwapError::RateLimit {
                source_name: "aggregator".to_string(),
                message,
            }
        }
        408 | 504 => {
            return SwapError::AggregatorUnavailable {
                status,
                message: format!("gateway timeout: {}", message),
            }
        }
        _ => {}
    }

    if let Some(err) = classify_message(&message) {
        return err;
    }

    if status >= 500 {
        SwapError::AggregatorUnavailable { status, message }
    } else {
        SwapError::AggregatorRejected { status, message }
    }
}

fn classify_error_code(code: &str, message: &str) -> Option<SwapError> {
    let message = message.to_string();
    match code {
        "COULD_NOT_FIND_ANY_ROUTE" | "NO_ROUTES_FOUND" | "CIRCULAR_ARBITRAGE_IS_DISABLED" => {
            Some(SwapError::RouteNotFound(message))
        }
        "ROUTE_PLAN_DOES_NOT_CONSUME_ALL_THE_AMOUNT" | "INSUFFICIENT_LIQUIDITY" => {
            Some(SwapError::Liquidity(message))
        }
        "TOKEN_NOT_TRADABLE" | "NOT_SUPPORTED" | "INVALID_MINT" | "MARKET_NOT_FOUND" => {
            Some(SwapError::UnsupportedAsset(message))
        }
        "AMOUNT_TOO_SMALL" | "AMOUNT_TOO_LARGE" => Some(SwapError::AmountBounds(message)),
        "SLIPPAGE_TOLERANCE_EXCEEDED" => Some(SwapError::SlippageExceeded(message)),
        _ => None,
    }
}

fn classify_message(message: &str) -> Option<SwapError> {
    let msg = message.to_lowercase();
    let owned = message.to_string();

    if msg.contains("liquidity") {
        return Some(SwapError::Liquidity(owned));
    }
    if msg.contains("slippage") {
        return Some(SwapError::SlippageExceeded(owned));
    }
    if msg.contains("not tradable")
        || msg.contains("unsupported")
        || msg.contains("not supported")
        || msg.contains("invalid mint")
    {
        return Some(SwapError::UnsupportedAsset(owned));
    }
    if msg.contains("amount")
        && (msg.contains("too small")
            || msg.contains("too large")
            || msg.contains("minimum")
            || msg.contains("maximum")
            || msg.contains("exceeds"))
    {
        return Some(SwapError::AmountBounds(owned));
    }
    if msg.contains("no route") || msg.contains("could not find any route") {
        return Some(SwapError::RouteNotFound(owned));
    }
    None
}
