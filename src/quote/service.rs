//! Quote Service
//!
//! Validates quote requests, serves them from the TTL cache when possible
//! and otherwise asks the aggregator. Only quotes with a usable route plan
//! are cached or returned.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::cache::{QuoteCache, QuoteKey};
use super::sequence::{QuoteSequencer, QuoteTicket};
use super::{FeeRouting, Quote};
use crate::errors::SwapError;
use crate::execution::jupiter::{Aggregator, QuoteRequest};
use crate::telemetry::metrics;

/// Maximum slippage tolerance, 100%
pub const MAX_SLIPPAGE_BPS: u16 = 10_000;

/// Quote result tagged with the ticket of the request that produced it
#[derive(Debug)]
pub struct SequencedQuote {
    pub ticket: QuoteTicket,
    pub result: Result<Quote, SwapError>,
}

pub struct QuoteService {
    aggregator: Arc<dyn Aggregator>,
    cache: Arc<QuoteCache>,
    ttl: Duration,
    sequencer: QuoteSequencer,
    only_direct_routes: bool,
    restrict_intermediate_tokens: bool,
}

impl QuoteService {
    pub fn new(aggregator: Arc<dyn Aggregator>, cache: Arc<QuoteCache>, ttl: Duration) -> Self {
        Self {
            aggregator,
            cache,
            ttl,
            sequencer: QuoteSequencer::new(),
            only_direct_routes: false,
            restrict_intermediate_tokens: true,
        }
    }

    pub fn with_route_options(
        mut self,
        only_direct_routes: bool,
        restrict_intermediate_tokens: bool,
    ) -> Self {
        self.only_direct_routes = only_direct_routes;
        self.restrict_intermediate_tokens = restrict_intermediate_tokens;
        self
    }

    pub fn cache(&self) -> &Arc<QuoteCache> {
        &self.cache
    }

    /// Fetch a validated quote, from cache when a live entry exists.
    ///
    /// `fee` only affects the aggregator request; it is not part of the
    /// cache key.
    pub async fn fetch_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
        fee: Option<&FeeRouting>,
    ) -> Result<Quote, SwapError> {
        let result = self
            .resolve_quote(input_mint, output_mint, amount, slippage_bps, fee)
            .await;

        if let Err(e) = &result {
            metrics::record_quote_error(e.kind());
            warn!(
                input = %input_mint,
                output = %output_mint,
                amount,
                kind = e.kind(),
                error = %e,
                "Quote failed"
            );
        }
        result
    }

    /// Like `fetch_quote`, tagging the result with a fresh ticket that
    /// supersedes every earlier one
    pub async fn fetch_quote_sequenced(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
        fee: Option<&FeeRouting>,
    ) -> SequencedQuote {
        let ticket = self.sequencer.issue();
        let result = self
            .fetch_quote(input_mint, output_mint, amount, slippage_bps, fee)
            .await;

        if !self.sequencer.is_current(ticket) {
            debug!(ticket = ticket.value(), "Quote superseded by a newer request");
        }
        SequencedQuote { ticket, result }
    }

    /// Whether `ticket` belongs to the most recent request
    pub fn is_current(&self, ticket: QuoteTicket) -> bool {
        self.sequencer.is_current(ticket)
    }

    async fn resolve_quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
        fee: Option<&FeeRouting>,
    ) -> Result<Quote, SwapError> {
        validate_request(input_mint, output_mint, amount, slippage_bps)?;

        let key = QuoteKey::new(input_mint, output_mint, amount, slippage_bps);
        if let Some(quote) = self.cache.get(&key) {
            metrics::record_quote_request(true);
            debug!(input = %input_mint, output = %output_mint, amount, "Quote cache hit");
            return Ok(quote);
        }
        metrics::record_quote_request(false);

        let request = QuoteRequest {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            amount,
            slippage_bps,
            platform_fee_bps: fee
                .filter(|f| f.account_for(input_mint).is_some())
                .map(|f| f.fee_bps())
                .filter(|bps| *bps > 0),
            only_direct_routes: self.only_direct_routes,
            restrict_intermediate_tokens: self.restrict_intermediate_tokens,
        };

        let start = Instant::now();
        let response = self.aggregator.get_quote(&request).await?;
        metrics::record_quote_latency(start.elapsed().as_secs_f64() * 1000.0);

        let quote = Quote::from_response(response)?;
        self.cache.set(key, quote.clone(), self.ttl);

        info!(
            input = %input_mint,
            output = %output_mint,
            in_amount = quote.in_amount,
            out_amount = quote.out_amount,
            route = %quote.route_summary(),
            "Quote received"
        );
        Ok(quote)
    }
}

fn validate_request(
    input_mint: &str,
    output_mint: &str,
    amount: u64,
    slippage_bps: u16,
) -> Result<(), SwapError> {
    if amount == 0 {
        return Err(SwapError::Validation("amount must be greater than zero".to_string()));
    }
    if input_mint.trim().is_empty() {
        return Err(SwapError::Validation("input mint is required".to_string()));
    }
    if output_mint.trim().is_empty() {
        return Err(SwapError::Validation("output mint is required".to_string()));
    }
    if slippage_bps > MAX_SLIPPAGE_BPS {
        return Err(SwapError::Validation(format!(
            "slippage {} bps exceeds maximum of {} bps",
            slippage_bps, MAX_SLIPPAGE_BPS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::classify_aggregator_error;
    use crate::execution::jupiter::{MockAggregator, QuoteResponse};
    use crate::test_utils::quote_json;
    use solana_sdk::pubkey::Pubkey;
    use std::collections::HashMap;

    const SOL: &str = "So11111111111111111111111111111111111111112";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn service(aggregator: MockAggregator) -> QuoteService {
        QuoteService::new(
            Arc::new(aggregator),
            Arc::new(QuoteCache::new(100)),
            Duration::from_secs(10),
        )
    }

    fn ok_response(request: &QuoteRequest) -> Result<QuoteResponse, SwapError> {
        Ok(QuoteResponse::from_value(quote_json(
            &request.input_mint,
            &request.output_mint,
            request.amount,
        ))
        .unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_skips_aggregator() {
        let mut aggregator = MockAggregator::new();
        aggregator
            .expect_get_quote()
            .times(1)
            .returning(|req| ok_response(req));
        let service = service(aggregator);

        let first = service.fetch_quote(SOL, USDC, 1_000_000, 50, None).await.unwrap();
        let second = service.fetch_quote(SOL, USDC, 1_000_000, 50, None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.out_amount, 500_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_refetches() {
        let mut aggregator = MockAggregator::new();
        aggregator
            .expect_get_quote()
            .times(2)
            .returning(|req| ok_response(req));
        let service = service(aggregator);

        service.fetch_quote(SOL, USDC, 1_000_000, 50, None).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        service.fetch_quote(SOL, USDC, 1_000_000, 50, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_validation_happens_before_network() {
        let mut aggregator = MockAggregator::new();
        aggregator.expect_get_quote().times(0);
        let service = service(aggregator);

        for (input, output, amount, slippage) in [
            (SOL, USDC, 0, 50),
            ("", USDC, 1, 50),
            (SOL, "  ", 1, 50),
            (SOL, USDC, 1, 10_001),
        ] {
            let err = service
                .fetch_quote(input, output, amount, slippage, None)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "validation");
        }
    }

    #[tokio::test]
    async fn test_empty_route_plan_not_cached() {
        let mut aggregator = MockAggregator::new();
        aggregator.expect_get_quote().times(2).returning(|req| {
            let mut body = quote_json(&req.input_mint, &req.output_mint, req.amount);
            body["routePlan"] = serde_json::json!([]);
            Ok(QuoteResponse::from_value(body).unwrap())
        });
        let service = service(aggregator);

        for _ in 0..2 {
            let err = service.fetch_quote(SOL, USDC, 1_000, 50, None).await.unwrap_err();
            assert!(matches!(err, SwapError::RouteNotFound(_)));
        }
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_liquidity_error_carries_suggestion() {
        let mut aggregator = MockAggregator::new();
        aggregator.expect_get_quote().returning(|_| {
            Err(classify_aggregator_error(
                400,
                r#"{"error":"Insufficient liquidity to fill the order"}"#,
            ))
        });
        let service = service(aggregator);

        let err = service
            .fetch_quote(SOL, USDC, 900_000_000_000, 50, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::Liquidity(_)));
        assert!(err.suggestion().contains("smaller amount"));
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_fee_rate_forwarded_to_aggregator() {
        let mut aggregator = MockAggregator::new();
        aggregator
            .expect_get_quote()
            .withf(|req| req.platform_fee_bps == Some(20) && req.restrict_intermediate_tokens)
            .times(1)
            .returning(|req| ok_response(req));
        let service = service(aggregator);
        let fees = FeeRouting::new(20, HashMap::from([(SOL.to_string(), Pubkey::new_unique())]));

        service
            .fetch_quote(SOL, USDC, 5_000, 100, Some(&fees))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_zero_fee_rate_not_sent() {
        let mut aggregator = MockAggregator::new();
        aggregator
            .expect_get_quote()
            .withf(|req| req.platform_fee_bps.is_none())
            .returning(|req| ok_response(req));
        let service = service(aggregator);
        let fees = FeeRouting::new(0, HashMap::from([(SOL.to_string(), Pubkey::new_unique())]));

        assert!(service.fetch_quote(SOL, USDC, 5_000, 100, Some(&fees)).await.is_ok());
    }

    #[tokio::test]
    async fn test_fee_rate_not_sent_without_fee_account() {
        let mut aggregator = MockAggregator::new();
        aggregator
            .expect_get_quote()
            .withf(|req| req.input_mint == USDC && req.platform_fee_bps.is_none())
            .times(1)
            .returning(|req| ok_response(req));
        let service = service(aggregator);
        let fees = FeeRouting::new(20, HashMap::from([(SOL.to_string(), Pubkey::new_unique())]));

        let quote = service
            .fetch_quote(USDC, SOL, 5_000, 100, Some(&fees))
            .await
            .unwrap();
        assert_eq!(quote.in_amount, 5_000);
    }

    #[tokio::test]
    async fn test_sequenced_quotes_supersede_older_tickets() {
        let mut aggregator = MockAggregator::new();
        aggregator.expect_get_quote().returning(|req| ok_response(req));
        let service = service(aggregator);

        let older = service.fetch_quote_sequenced(SOL, USDC, 1_000, 50, None).await;
        let newer = service.fetch_quote_sequenced(SOL, USDC, 2_000, 50, None).await;

        assert!(older.result.is_ok());
        assert!(!service.is_current(older.ticket));
        assert!(service.is_current(newer.ticket));
    }
}
