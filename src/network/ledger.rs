//! Ledger RPC access
//!
//! The `LedgerRpc` trait is the narrow set of Solana JSON-RPC calls the
//! pipeline needs. `SolanaRpc` implements it over the nonblocking
//! `RpcClient`, translating client errors into `SwapError`.

use async_trait::async_trait;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::RpcError;
use solana_sdk::{
    account::Account,
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};
use std::time::Duration;

use crate::errors::SwapError;

/// Node-unhealthy JSON-RPC error code
const NODE_UNHEALTHY: i64 = -32005;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Cheap liveness call
    async fn get_slot(&self) -> Result<u64, SwapError>;

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, SwapError>;

    /// `None` when the account does not exist
    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>, SwapError>;

    async fn get_latest_blockhash(&self) -> Result<Hash, SwapError>;

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, SwapError>;

    /// `None` while the signature is unknown to the node
    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, SwapError>;
}

/// `LedgerRpc` over a Solana JSON-RPC endpoint
pub struct SolanaRpc {
    client: RpcClient,
    endpoint: String,
    timeout: Duration,
    commitment: CommitmentConfig,
}

impl SolanaRpc {
    pub fn new(name: &str, url: &str, timeout: Duration) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            client: RpcClient::new_with_timeout_and_commitment(url.to_string(), timeout, commitment),
            endpoint: name.to_string(),
            timeout,
            commitment,
        }
    }

    fn map_err(&self, err: ClientError) -> SwapError {
        map_client_error(&self.endpoint, self.timeout, err)
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpc {
    async fn get_slot(&self) -> Result<u64, SwapError> {
        self.client.get_slot().await.map_err(|e| self.map_err(e))
    }

    async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, SwapError> {
        self.client.get_balance(pubkey).await.map_err(|e| self.map_err(e))
    }

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>, SwapError> {
        self.client
            .get_account_with_commitment(pubkey, self.commitment)
            .await
            .map(|response| response.value)
            .map_err(|e| self.map_err(e))
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, SwapError> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, SwapError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            max_retries: Some(0),
            ..Default::default()
        };
        self.client
            .send_transaction_with_config(transaction, config)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, SwapError> {
        self.client
            .get_signature_status_with_commitment(signature, self.commitment)
            .await
            .map_err(|e| self.map_err(e))
    }
}

/// Translate a Solana client error into the pipeline taxonomy
pub fn map_client_error(endpoint: &str, timeout: Duration, err: ClientError) -> SwapError {
    let message = err.to_string();
    match err.kind() {
        ClientErrorKind::Reqwest(e) if e.is_timeout() => SwapError::Timeout {
            operation: format!("rpc call to {}", endpoint),
            timeout_ms: timeout.as_millis() as u64,
        },
        ClientErrorKind::Reqwest(e) if e.status().map(|s| s.as_u16()) == Some(429) => {
            SwapError::RateLimit {
                source_name: endpoint.to_string(),
                message,
            }
        }
        ClientErrorKind::Reqwest(_) | ClientErrorKind::Io(_) => SwapError::RpcUnavailable {
            endpoint: endpoint.to_string(),
            message,
        },
        ClientErrorKind::RpcError(RpcError::RpcResponseError { code, message: rpc_message, .. }) => {
            classify_rpc_message(endpoint, Some(*code), rpc_message)
        }
        ClientErrorKind::RpcError(RpcError::RpcRequestError(rpc_message)) => {
            classify_rpc_message(endpoint, None, rpc_message)
        }
        ClientErrorKind::TransactionError(e) => SwapError::Broadcast(e.to_string()),
        ClientErrorKind::SigningError(e) => SwapError::TransactionBuild(e.to_string()),
        _ => SwapError::RpcUnavailable {
            endpoint: endpoint.to_string(),
            message,
        },
    }
}

fn classify_rpc_message(endpoint: &str, code: Option<i64>, message: &str) -> SwapError {
    let msg = message.to_lowercase();

    if msg.contains("too many requests") || msg.contains("rate limit") || msg.contains("429") {
        return SwapError::RateLimit {
            source_name: endpoint.to_string(),
            message: message.to_string(),
        };
    }
    if code == Some(NODE_UNHEALTHY) || msg.contains("node is behind") || msg.contains("unhealthy") {
        return SwapError::RpcUnavailable {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        };
    }
    if msg.contains("slippage") || msg.contains("0x1771") {
        return SwapError::SlippageExceeded(message.to_string());
    }
    if msg.contains("insufficient funds") || msg.contains("insufficient lamports") {
        return SwapError::Broadcast(format!("insufficient funds: {}", message));
    }
    SwapError::Broadcast(message.to_string())
}
