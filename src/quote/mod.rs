//! Quote Module
//!
//! Validated swap quotes and everything needed to serve them quickly:
//! - Short-lived TTL cache with batch eviction
//! - Quote service fronting the aggregator
//! - Request sequencing so stale responses can be discarded

pub mod cache;
pub mod sequence;
pub mod service;

pub use cache::{QuoteCache, QuoteKey};
pub use sequence::{QuoteSequencer, QuoteTicket};
pub use service::{QuoteService, SequencedQuote};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::str::FromStr;

use crate::config::FeesConfig;
use crate::errors::SwapError;
use crate::execution::jupiter::QuoteResponse;

/// One hop of a route plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteHop {
    pub amm_key: String,
    pub label: Option<String>,
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    pub percent: u8,
}

/// A validated quote. `route_plan` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    /// Minimum output after slippage
    pub other_amount_threshold: u64,
    pub slippage_bps: u16,
    pub price_impact_pct: Option<Decimal>,
    pub platform_fee_bps: Option<u16>,
    pub route_plan: Vec<RouteHop>,
    /// Aggregator payload, sent back verbatim when building the swap
    pub raw: serde_json::Value,
}

impl Quote {
    /// Validate an aggregator response
    pub fn from_response(response: QuoteResponse) -> Result<Self, SwapError> {
        let input_mint = required(response.input_mint, "inputMint")?;
        let output_mint = required(response.output_mint, "outputMint")?;
        let in_amount = parse_amount(response.in_amount, "inAmount")?;
        let out_amount = parse_amount(response.out_amount, "outAmount")?;
        let other_amount_threshold = match response.other_amount_threshold {
            Some(value) => parse_amount(Some(value), "otherAmountThreshold")?,
            None => out_amount,
        };

        let route_plan = response.route_plan.unwrap_or_default();
        if route_plan.is_empty() {
            return Err(SwapError::RouteNotFound(format!(
                "empty route plan for {} -> {}",
                input_mint, output_mint
            )));
        }

        let route_plan = route_plan
            .into_iter()
            .map(|step| {
                let info = step.swap_info;
                Ok(RouteHop {
                    amm_key: info.amm_key,
                    label: info.label,
                    input_mint: info.input_mint,
                    output_mint: info.output_mint,
                    in_amount: parse_amount(Some(info.in_amount), "routePlan.inAmount")?,
                    out_amount: parse_amount(Some(info.out_amount), "routePlan.outAmount")?,
                    percent: step.percent,
                })
            })
            .collect::<Result<Vec<_>, SwapError>>()?;

        let price_impact_pct = response
            .price_impact_pct
            .as_deref()
            .and_then(|p| Decimal::from_str(p).ok());

        Ok(Self {
            input_mint,
            output_mint,
            in_amount,
            out_amount,
            other_amount_threshold,
            slippage_bps: response.slippage_bps.unwrap_or_default(),
            price_impact_pct,
            platform_fee_bps: response.platform_fee.and_then(|f| f.fee_bps),
            route_plan,
            raw: response.raw,
        })
    }

    /// Human-readable route, e.g. "Raydium -> Orca"
    pub fn route_summary(&self) -> String {
        self.route_plan
            .iter()
            .map(|hop| hop.label.clone().unwrap_or_else(|| hop.amm_key.clone()))
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, SwapError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SwapError::RouteNotFound(format!("quote response missing {}", field)))
}

fn parse_amount(value: Option<String>, field: &str) -> Result<u64, SwapError> {
    let raw = required(value, field)?;
    raw.parse::<u64>()
        .map_err(|_| SwapError::RouteNotFound(format!("quote response has invalid {}: {}", field, raw)))
}

/// Static platform-fee routing table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeRouting {
    fee_bps: u16,
    accounts: HashMap<String, Pubkey>,
}

impl FeeRouting {
    pub fn new(fee_bps: u16, accounts: HashMap<String, Pubkey>) -> Self {
        Self { fee_bps, accounts }
    }

    pub fn from_config(config: &FeesConfig) -> Result<Self> {
        let accounts = config
            .accounts
            .iter()
            .map(|(mint, account)| {
                let account = Pubkey::from_str(account)
                    .with_context(|| format!("Invalid fee account for mint {}: {}", mint, account))?;
                Ok((mint.clone(), account))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self::new(config.fee_bps, accounts))
    }

    pub fn fee_bps(&self) -> u16 {
        self.fee_bps
    }

    /// Fee collection account for an input mint
    pub fn account_for(&self, input_mint: &str) -> Option<Pubkey> {
        self.accounts.get(input_mint).copied()
    }
}
