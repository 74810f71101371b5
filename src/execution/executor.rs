//! Swap Executor
//!
//! Runs a `TransactionPlan` to completion:
//! 1. Verify the signer can pay the estimated network fees
//! 2. Sign and confirm the setup transaction, if any (best effort)
//! 3. Sign, submit and confirm the swap
//! 4. Publish the outcome on the event bus

use solana_sdk::{
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use super::submitter::TransactionSubmitter;
use super::tx_builder::{TransactionPlan, ATA_RENT_LAMPORTS};
use crate::config::ExecutionConfig;
use crate::errors::SwapError;
use crate::network::event_bus::{self, Event, SwapRecord};
use crate::network::NodePool;
use crate::telemetry::metrics;

/// Outcome of a confirmed swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReceipt {
    pub attempt_id: Uuid,
    pub signature: Signature,
    pub setup_signature: Option<Signature>,
    pub slot: Option<u64>,
    pub retries: u32,
    pub elapsed_ms: u64,
}

pub struct SwapExecutor {
    pool: Arc<NodePool>,
    submitter: TransactionSubmitter,
    base_fee_lamports: u64,
    max_priority_fee_lamports: u64,
    events: Option<broadcast::Sender<Event>>,
}

impl SwapExecutor {
    pub fn new(pool: Arc<NodePool>, config: &ExecutionConfig) -> Self {
        Self {
            submitter: TransactionSubmitter::new(pool.clone(), config),
            pool,
            base_fee_lamports: config.base_fee_lamports,
            max_priority_fee_lamports: config.max_priority_fee_lamports,
            events: None,
        }
    }

    pub fn with_event_bus(mut self, sender: broadcast::Sender<Event>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Lamports the signer needs to cover every transaction in the plan
    pub fn estimate_fees(&self, plan: &TransactionPlan) -> u64 {
        let swap_signatures = plan.swap.message.header().num_required_signatures.max(1) as u64;
        let mut total = self.base_fee_lamports * swap_signatures + self.max_priority_fee_lamports;

        if let Some(setup) = &plan.setup {
            let setup_signatures = setup.message.header.num_required_signatures.max(1) as u64;
            total += self.base_fee_lamports * setup_signatures + ATA_RENT_LAMPORTS;
        }
        total
    }

    /// Execute the plan with `signer` as fee payer
    pub async fn execute(
        &self,
        plan: &TransactionPlan,
        signer: &Keypair,
    ) -> Result<SwapReceipt, SwapError> {
        let attempt_id = Uuid::new_v4();
        let start = Instant::now();

        match self.run(attempt_id, plan, signer, start).await {
            Ok(receipt) => {
                metrics::record_swap_success(receipt.elapsed_ms as f64);
                info!(
                    attempt_id = %attempt_id,
                    signature = %receipt.signature,
                    elapsed_ms = receipt.elapsed_ms,
                    "Swap confirmed"
                );
                self.publish(Event::SwapExecuted(swap_record(&receipt, plan)));
                Ok(receipt)
            }
            Err(e) => {
                metrics::record_swap_failure(e.kind());
                warn!(attempt_id = %attempt_id, kind = e.kind(), error = %e, "Swap failed");
                self.publish(Event::SwapFailed {
                    attempt_id,
                    kind: e.kind(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        attempt_id: Uuid,
        plan: &TransactionPlan,
        signer: &Keypair,
        start: Instant,
    ) -> Result<SwapReceipt, SwapError> {
        let payer = signer.pubkey();
        let required = self.estimate_fees(plan);
        let available = self
            .pool
            .execute_with_fallback(
                |conn| async move { conn.client().get_balance(&payer).await },
                self.pool.settings().max_retries,
            )
            .await?;

        if available < required {
            return Err(SwapError::InsufficientBalance { required, available });
        }

        let setup_signature = match &plan.setup {
            Some(setup) => match self.submit_setup(setup, signer).await {
                Ok(signature) => Some(signature),
                Err(e) => {
                    // The swap can still succeed if the account appeared meanwhile
                    metrics::record_setup_failure();
                    warn!(attempt_id = %attempt_id, error = %e, "Setup transaction failed, continuing with swap");
                    None
                }
            },
            None => None,
        };

        let mut message = plan.swap.message.clone();
        message.set_recent_blockhash(self.latest_blockhash().await?);
        let swap = VersionedTransaction::try_new(message, &[signer])
            .map_err(|e| SwapError::TransactionBuild(format!("failed to sign swap: {}", e)))?;

        let result = self.submitter.submit_and_confirm(&swap).await?;

        Ok(SwapReceipt {
            attempt_id,
            signature: result.signature,
            setup_signature,
            slot: result.slot,
            retries: result.retries,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn submit_setup(
        &self,
        setup: &solana_sdk::transaction::Transaction,
        signer: &Keypair,
    ) -> Result<Signature, SwapError> {
        let blockhash = self.latest_blockhash().await?;
        let mut transaction = setup.clone();
        transaction
            .try_sign(&[signer], blockhash)
            .map_err(|e| SwapError::TransactionBuild(format!("failed to sign setup: {}", e)))?;

        let result = self
            .submitter
            .submit_and_confirm(&VersionedTransaction::from(transaction))
            .await?;
        info!(signature = %result.signature, "Destination token account created");
        Ok(result.signature)
    }

    async fn latest_blockhash(&self) -> Result<solana_sdk::hash::Hash, SwapError> {
        self.pool
            .execute_with_fallback(
                |conn| async move { conn.client().get_latest_blockhash().await },
                self.pool.settings().max_retries,
            )
            .await
    }

    fn publish(&self, event: Event) {
        if let Some(sender) = &self.events {
            event_bus::publish(sender, event);
        }
    }
}

fn swap_record(receipt: &SwapReceipt, plan: &TransactionPlan) -> SwapRecord {
    SwapRecord {
        attempt_id: receipt.attempt_id,
        signature: receipt.signature.to_string(),
        input_mint: plan.quote.input_mint.clone(),
        output_mint: plan.quote.output_mint.clone(),
        in_amount: plan.quote.in_amount,
        out_amount: plan.quote.out_amount,
        fee_bps: plan.fee_bps,
        fee_account: plan.fee_account.map(|a| a.to_string()),
        route: plan.quote.route_summary(),
        timestamp: chrono::Utc::now().timestamp(),
    }
}
