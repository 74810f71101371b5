//! Execution Module
//!
//! Provides the swap execution infrastructure:
//! - Jupiter client for quotes and swap transactions
//! - Transaction builder (destination account setup + swap)
//! - Submitter with failover-aware broadcast and confirmation
//! - Executor running a plan end to end
//!
//! `SwapPipeline` wires these together with the quote service.

pub mod executor;
pub mod jupiter;
pub mod submitter;
pub mod tx_builder;

pub use executor::{SwapExecutor, SwapReceipt};
pub use jupiter::{Aggregator, JupiterClient};
pub use submitter::{SubmissionResult, TransactionSubmitter};
pub use tx_builder::{TransactionBuilder, TransactionPlan};

use anyhow::Result;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::SwapError;
use crate::network::event_bus::{self, Event};
use crate::network::NodePool;
use crate::quote::{FeeRouting, Quote, QuoteCache, QuoteService};

/// Quote-and-execute pipeline
pub struct SwapPipeline {
    pool: Arc<NodePool>,
    quotes: QuoteService,
    builder: TransactionBuilder,
    executor: SwapExecutor,
    fees: Option<FeeRouting>,
    events: Option<broadcast::Sender<Event>>,
}

impl SwapPipeline {
    /// Create the pipeline against live endpoints
    pub fn new(config: &AppConfig, events: broadcast::Sender<Event>) -> Result<Self> {
        let pool = Arc::new(NodePool::new(&config.rpc)?.with_event_bus(events.clone()));
        let aggregator: Arc<dyn Aggregator> = Arc::new(JupiterClient::new(&config.aggregator)?);
        let fees = config
            .fees
            .as_ref()
            .map(FeeRouting::from_config)
            .transpose()?;

        Ok(Self::with_components(config, pool, aggregator, fees, Some(events)))
    }

    /// Create the pipeline from pre-built parts
    pub fn with_components(
        config: &AppConfig,
        pool: Arc<NodePool>,
        aggregator: Arc<dyn Aggregator>,
        fees: Option<FeeRouting>,
        events: Option<broadcast::Sender<Event>>,
    ) -> Self {
        let cache = Arc::new(QuoteCache::new(config.cache.capacity));
        let quotes = QuoteService::new(
            aggregator.clone(),
            cache,
            Duration::from_millis(config.cache.ttl_ms),
        )
        .with_route_options(
            config.aggregator.only_direct_routes,
            config.aggregator.restrict_intermediate_tokens,
        );

        let builder =
            TransactionBuilder::new(pool.clone(), aggregator, fees.clone(), &config.execution);
        let mut executor = SwapExecutor::new(pool.clone(), &config.execution);
        if let Some(sender) = &events {
            executor = executor.with_event_bus(sender.clone());
        }

        info!(
            fee_routing = fees.is_some(),
            cache_capacity = config.cache.capacity,
            "Swap pipeline initialized"
        );

        Self {
            pool,
            quotes,
            builder,
            executor,
            fees,
            events,
        }
    }

    pub fn pool(&self) -> &Arc<NodePool> {
        &self.pool
    }

    pub fn quotes(&self) -> &QuoteService {
        &self.quotes
    }

    pub async fn quote(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, SwapError> {
        self.quotes
            .fetch_quote(input_mint, output_mint, amount, slippage_bps, self.fees.as_ref())
            .await
    }

    /// Quote and build without submitting anything
    pub async fn prepare(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
        user: &Pubkey,
    ) -> Result<TransactionPlan, SwapError> {
        let quote = self.quote(input_mint, output_mint, amount, slippage_bps).await?;
        self.builder.build(&quote, user).await
    }

    /// Quote, build and execute a swap paid for by `signer`
    pub async fn swap(
        &self,
        input_mint: &str,
        output_mint: &str,
        amount: u64,
        slippage_bps: u16,
        signer: &Keypair,
    ) -> Result<SwapReceipt, SwapError> {
        let plan = match self
            .prepare(input_mint, output_mint, amount, slippage_bps, &signer.pubkey())
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                if let Some(sender) = &self.events {
                    event_bus::publish(
                        sender,
                        Event::SwapFailed {
                            attempt_id: Uuid::new_v4(),
                            kind: e.kind(),
                            message: e.to_string(),
                        },
                    );
                }
                return Err(e);
            }
        };

        self.executor.execute(&plan, signer).await
    }
}
