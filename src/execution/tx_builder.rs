//! Transaction Builder
//!
//! Turns a validated quote into an unsigned `TransactionPlan`:
//! - Optional idempotent ATA creation for the output token
//! - Fee account resolution from the static fee routing table
//! - Aggregator-built swap transaction with priority fee directive

use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::Instruction,
    message::Message,
    pubkey,
    pubkey::Pubkey,
    transaction::{Transaction, VersionedTransaction},
};
use spl_associated_token_account::{
    get_associated_token_address_with_program_id,
    instruction::create_associated_token_account_idempotent,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ExecutionConfig;
use crate::errors::SwapError;
use crate::execution::jupiter::{Aggregator, PriorityFee, SwapBuildRequest};
use crate::network::NodePool;
use crate::quote::{FeeRouting, Quote};

pub const TOKEN_2022_PROGRAM_ID: Pubkey = pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// Rent-exempt minimum for a token account
pub const ATA_RENT_LAMPORTS: u64 = 2_039_280;

/// Everything needed to execute one swap. Transactions are unsigned.
#[derive(Debug, Clone)]
pub struct TransactionPlan {
    /// Creates the destination token account; must confirm before `swap`
    pub setup: Option<Transaction>,
    pub swap: VersionedTransaction,
    pub recent_blockhash: Hash,
    pub last_valid_block_height: Option<u64>,
    pub fee_account: Option<Pubkey>,
    pub fee_bps: Option<u16>,
    pub quote: Quote,
}

/// Transaction builder
pub struct TransactionBuilder {
    pool: Arc<NodePool>,
    aggregator: Arc<dyn Aggregator>,
    fees: Option<FeeRouting>,
    priority_fee: PriorityFee,
    setup_compute_units: u32,
    setup_compute_unit_price: u64,
}

impl TransactionBuilder {
    pub fn new(
        pool: Arc<NodePool>,
        aggregator: Arc<dyn Aggregator>,
        fees: Option<FeeRouting>,
        config: &ExecutionConfig,
    ) -> Self {
        Self {
            pool,
            aggregator,
            fees,
            priority_fee: PriorityFee {
                level: config.priority_level.clone(),
                max_lamports: config.max_priority_fee_lamports,
            },
            setup_compute_units: config.setup_compute_units,
            setup_compute_unit_price: config.setup_compute_unit_price,
        }
    }

    /// Compute budget instructions for the setup transaction
    pub fn build_priority_fee_ix(&self) -> Vec<Instruction> {
        vec![
            ComputeBudgetInstruction::set_compute_unit_limit(self.setup_compute_units),
            ComputeBudgetInstruction::set_compute_unit_price(self.setup_compute_unit_price),
        ]
    }

    /// Build the unsigned plan for swapping `quote` on behalf of `user`
    pub async fn build(&self, quote: &Quote, user: &Pubkey) -> Result<TransactionPlan, SwapError> {
        let output_mint = Pubkey::from_str(&quote.output_mint).map_err(|_| {
            SwapError::UnsupportedAsset(format!("invalid output mint: {}", quote.output_mint))
        })?;

        let setup = if output_mint == spl_token::native_mint::id() {
            // The aggregator wraps and unwraps SOL itself
            None
        } else {
            let token_program = self.token_program_for(&output_mint).await?;
            self.build_setup(user, &output_mint, &token_program).await?
        };

        let fee_account = self
            .fees
            .as_ref()
            .and_then(|fees| fees.account_for(&quote.input_mint));
        let fee_bps = fee_account.and(self.fees.as_ref().map(|f| f.fee_bps()));

        let request = SwapBuildRequest {
            quote: quote.raw.clone(),
            user: *user,
            wrap_and_unwrap_sol: true,
            dynamic_compute_unit_limit: true,
            priority_fee: self.priority_fee.clone(),
            fee_account,
            fee_bps,
        };

        let built = self.aggregator.build_swap_transaction(&request).await?;
        let swap: VersionedTransaction = bincode::deserialize(&built.transaction).map_err(|e| {
            SwapError::TransactionBuild(format!("failed to decode swap transaction: {}", e))
        })?;
        if swap.signatures.is_empty() {
            return Err(SwapError::TransactionBuild(
                "swap transaction requires no signer".to_string(),
            ));
        }

        let recent_blockhash = self
            .pool
            .execute_with_fallback(
                |conn| async move { conn.client().get_latest_blockhash().await },
                self.pool.settings().max_retries,
            )
            .await?;

        info!(
            user = %user,
            output_mint = %output_mint,
            needs_setup = setup.is_some(),
            fee_account = ?fee_account,
            "Swap transaction plan built"
        );

        Ok(TransactionPlan {
            setup,
            swap,
            recent_blockhash,
            last_valid_block_height: built.last_valid_block_height,
            fee_account,
            fee_bps,
            quote: quote.clone(),
        })
    }

    /// Owning token program of a mint. Unknown mints are unsupported.
    async fn token_program_for(&self, mint: &Pubkey) -> Result<Pubkey, SwapError> {
        let mint = *mint;
        let account = self
            .pool
            .execute_with_fallback(
                |conn| async move { conn.client().get_account(&mint).await },
                self.pool.settings().max_retries,
            )
            .await?
            .ok_or_else(|| SwapError::UnsupportedAsset(format!("mint {} not found", mint)))?;

        if account.owner == spl_token::id() || account.owner == TOKEN_2022_PROGRAM_ID {
            Ok(account.owner)
        } else {
            Err(SwapError::UnsupportedAsset(format!(
                "mint {} is not owned by a token program",
                mint
            )))
        }
    }

    /// Idempotent ATA creation, only when the account is missing
    async fn build_setup(
        &self,
        user: &Pubkey,
        mint: &Pubkey,
        token_program: &Pubkey,
    ) -> Result<Option<Transaction>, SwapError> {
        let ata = get_associated_token_address_with_program_id(user, mint, token_program);
        let existing = self
            .pool
            .execute_with_fallback(
                |conn| async move { conn.client().get_account(&ata).await },
                self.pool.settings().max_retries,
            )
            .await?;

        if existing.is_some() {
            debug!(ata = %ata, "Destination token account exists");
            return Ok(None);
        }

        debug!(ata = %ata, mint = %mint, "Destination token account missing, adding setup");
        let mut instructions = self.build_priority_fee_ix();
        instructions.push(create_associated_token_account_idempotent(
            user,
            user,
            mint,
            token_program,
        ));

        let message = Message::new(&instructions, Some(user));
        Ok(Some(Transaction::new_unsigned(message)))
    }
}
