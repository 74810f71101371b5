//! Transaction Submitter
//!
//! Handles transaction submission with:
//! - Endpoint failover and exponential backoff through the node pool
//! - Signature re-check before any re-send, so a transaction that already
//!   landed is never broadcast twice
//! - Confirmation polling with a hard deadline

use solana_sdk::{
    instruction::InstructionError,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::ExecutionConfig;
use crate::errors::SwapError;
use crate::network::NodePool;

/// Aggregator program error raised when the output falls below the minimum
const SLIPPAGE_TOLERANCE_EXCEEDED: u32 = 0x1771;

/// Submission result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    /// Transaction signature
    pub signature: Signature,
    /// Slot observed at confirmation
    pub slot: Option<u64>,
    /// Number of re-sends needed
    pub retries: u32,
    /// Time to confirmation in milliseconds
    pub confirmation_time_ms: u64,
}

/// Transaction submitter
pub struct TransactionSubmitter {
    pool: Arc<NodePool>,
    max_retries: u32,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl TransactionSubmitter {
    pub fn new(pool: Arc<NodePool>, config: &ExecutionConfig) -> Self {
        Self {
            pool,
            max_retries: config.max_retries,
            confirm_timeout: Duration::from_millis(config.confirm_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    /// Broadcast a signed transaction and wait until it is confirmed
    pub async fn submit_and_confirm(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<SubmissionResult, SwapError> {
        let start = Instant::now();
        let (signature, retries) = self.submit(transaction).await?;
        info!(signature = %signature, retries, "Transaction submitted");

        let slot = self.wait_for_confirmation(&signature).await?;
        let elapsed = start.elapsed().as_millis() as u64;
        info!(
            signature = %signature,
            slot = ?slot,
            elapsed_ms = elapsed,
            "Transaction confirmed"
        );

        Ok(SubmissionResult {
            signature,
            slot,
            retries,
            confirmation_time_ms: elapsed,
        })
    }

    /// Send through the pool. A re-send first asks the new endpoint whether
    /// the signature already landed.
    async fn submit(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<(Signature, u32), SwapError> {
        let signature = *transaction
            .signatures
            .first()
            .ok_or_else(|| SwapError::TransactionBuild("transaction is not signed".to_string()))?;

        let mut attempts = 0u32;
        let sent = self
            .pool
            .execute_with_fallback(
                |conn| {
                    let resend = attempts > 0;
                    attempts += 1;
                    async move {
                        if resend {
                            if let Some(status) = conn.client().get_signature_status(&signature).await? {
                                debug!(signature = %signature, "Signature already known, not re-sending");
                                return status.map(|_| signature).map_err(map_transaction_error);
                            }
                        }
                        conn.client().send_transaction(transaction).await
                    }
                },
                self.max_retries,
            )
            .await?;

        Ok((sent, attempts.saturating_sub(1)))
    }

    /// Poll the signature status until confirmed, failed, or timed out
    async fn wait_for_confirmation(&self, signature: &Signature) -> Result<Option<u64>, SwapError> {
        let signature = *signature;
        let deadline = Instant::now() + self.confirm_timeout;

        loop {
            let status = self
                .pool
                .execute_with_fallback(
                    |conn| async move { conn.client().get_signature_status(&signature).await },
                    0,
                )
                .await;

            match status {
                Ok(Some(Ok(()))) => return Ok(self.current_slot().await),
                Ok(Some(Err(e))) => return Err(map_transaction_error(e)),
                Ok(None) => {}
                Err(e) => warn!(signature = %signature, error = %e, "Error checking status"),
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(SwapError::Timeout {
                    operation: format!("confirmation of {}", signature),
                    timeout_ms: self.confirm_timeout.as_millis() as u64,
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn current_slot(&self) -> Option<u64> {
        self.pool
            .execute_with_fallback(|conn| async move { conn.client().get_slot().await }, 0)
            .await
            .ok()
    }
}

/// On-chain failure of a landed transaction
pub fn map_transaction_error(err: TransactionError) -> SwapError {
    match err {
        TransactionError::InstructionError(_, InstructionError::Custom(SLIPPAGE_TOLERANCE_EXCEEDED)) => {
            SwapError::SlippageExceeded(format!("transaction failed: {}", err))
        }
        other => SwapError::Broadcast(format!("transaction failed: {}", other)),
    }
}
