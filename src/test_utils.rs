//! Test Utilities Module
//!
//! Deterministic fakes for the ledger and helpers for building quotes and
//! unsigned transactions without any network access.

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    account::Account,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::SwapError;
use crate::network::node_pool::{Endpoint, PoolSettings};
use crate::network::LedgerRpc;
use crate::quote::{Quote, RouteHop};

/// A call observed by a `FakeLedger`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    Probe(String),
    Balance(String),
    Account(String, Pubkey),
    Blockhash(String),
    Send(String, Signature),
    Status(String, Signature, bool),
}

pub type CallLog = Arc<Mutex<Vec<LedgerCall>>>;

/// Scriptable in-memory ledger endpoint
pub struct FakeLedger {
    name: String,
    log: CallLog,
    probe_delay: Mutex<Duration>,
    probe_fails: AtomicBool,
    probe_calls: AtomicU32,
    balance: AtomicU64,
    accounts: Mutex<HashMap<Pubkey, Account>>,
    send_errors: Mutex<VecDeque<SwapError>>,
    confirm_sends: AtomicBool,
    statuses: Mutex<HashMap<Signature, Result<(), TransactionError>>>,
    blockhash: Hash,
}

impl FakeLedger {
    pub fn new(name: &str) -> Self {
        Self::with_log(name, Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_log(name: &str, log: CallLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            probe_delay: Mutex::new(Duration::ZERO),
            probe_fails: AtomicBool::new(false),
            probe_calls: AtomicU32::new(0),
            balance: AtomicU64::new(10_000_000_000),
            accounts: Mutex::new(HashMap::new()),
            send_errors: Mutex::new(VecDeque::new()),
            confirm_sends: AtomicBool::new(true),
            statuses: Mutex::new(HashMap::new()),
            blockhash: Hash::new_unique(),
        }
    }

    pub fn set_probe_fails(&self, fails: bool) {
        self.probe_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock() = delay;
    }

    pub fn probe_calls(&self) -> u32 {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn set_balance(&self, lamports: u64) {
        self.balance.store(lamports, Ordering::SeqCst);
    }

    pub fn insert_account(&self, pubkey: Pubkey, owner: Pubkey) {
        let account = Account {
            lamports: 2_039_280,
            data: vec![0; 82],
            owner,
            executable: false,
            rent_epoch: 0,
        };
        self.accounts.lock().insert(pubkey, account);
    }

    /// Queue an error for the next `send_transaction`
    pub fn fail_next_send(&self, err: SwapError) {
        self.send_errors.lock().push_back(err);
    }

    /// Accepted transactions stay unconfirmed when false
    pub fn set_confirm_sends(&self, confirm: bool) {
        self.confirm_sends.store(confirm, Ordering::SeqCst);
    }

    pub fn set_status(&self, signature: Signature, status: Result<(), TransactionError>) {
        self.statuses.lock().insert(signature, status);
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.log.lock().clone()
    }

    pub fn sent(&self) -> Vec<Signature> {
        self.log
            .lock()
            .iter()
            .filter_map(|call| match call {
                LedgerCall::Send(name, sig) if *name == self.name => Some(*sig),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: LedgerCall) {
        self.log.lock().push(call);
    }
}

#[async_trait]
impl LedgerRpc for FakeLedger {
    async fn get_slot(&self) -> Result<u64, SwapError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.record(LedgerCall::Probe(self.name.clone()));

        let delay = *self.probe_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.probe_fails.load(Ordering::SeqCst) {
            return Err(SwapError::RpcUnavailable {
                endpoint: self.name.clone(),
                message: "connection refused".to_string(),
            });
        }
        Ok(250_000_000)
    }

    async fn get_balance(&self, _pubkey: &Pubkey) -> Result<u64, SwapError> {
        self.record(LedgerCall::Balance(self.name.clone()));
        Ok(self.balance.load(Ordering::SeqCst))
    }

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>, SwapError> {
        self.record(LedgerCall::Account(self.name.clone(), *pubkey));
        Ok(self.accounts.lock().get(pubkey).cloned())
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, SwapError> {
        self.record(LedgerCall::Blockhash(self.name.clone()));
        Ok(self.blockhash)
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, SwapError> {
        let signature = transaction.signatures[0];
        if let Some(err) = self.send_errors.lock().pop_front() {
            return Err(err);
        }
        self.record(LedgerCall::Send(self.name.clone(), signature));
        if self.confirm_sends.load(Ordering::SeqCst) {
            self.statuses.lock().entry(signature).or_insert(Ok(()));
        }
        Ok(signature)
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, SwapError> {
        let status = self.statuses.lock().get(signature).cloned();
        self.record(LedgerCall::Status(
            self.name.clone(),
            *signature,
            matches!(status, Some(Ok(()))),
        ));
        Ok(status)
    }
}

pub fn endpoint(name: &str, priority: u32) -> Endpoint {
    Endpoint {
        name: name.to_string(),
        url: format!("https://{}.example.com", name),
        priority,
        timeout: Duration::from_secs(10),
    }
}

pub fn test_settings() -> PoolSettings {
    PoolSettings {
        probe_timeout: Duration::from_millis(500),
        cooldown: Duration::from_secs(30),
        health_cache: Duration::ZERO,
        max_retries: 3,
        retry_base_delay: Duration::from_millis(100),
    }
}

pub fn sample_quote(input_mint: &str, output_mint: &str, amount: u64) -> Quote {
    Quote {
        input_mint: input_mint.to_string(),
        output_mint: output_mint.to_string(),
        in_amount: amount,
        out_amount: amount / 2,
        other_amount_threshold: amount / 2 - amount / 400,
        slippage_bps: 50,
        price_impact_pct: None,
        platform_fee_bps: None,
        route_plan: vec![RouteHop {
            amm_key: "58oQChx4yWmvKdwLLZzBi4ChoCc2fqCUWBkwMihLYQo2".to_string(),
            label: Some("Raydium".to_string()),
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            in_amount: amount,
            out_amount: amount / 2,
            percent: 100,
        }],
        raw: serde_json::json!({ "inAmount": amount.to_string() }),
    }
}

/// JSON body of a valid aggregator quote
pub fn quote_json(input_mint: &str, output_mint: &str, amount: u64) -> serde_json::Value {
    serde_json::json!({
        "inputMint": input_mint,
        "inAmount": amount.to_string(),
        "outputMint": output_mint,
        "outAmount": (amount / 2).to_string(),
        "otherAmountThreshold": (amount / 2 - amount / 400).to_string(),
        "swapMode": "ExactIn",
        "slippageBps": 50,
        "priceImpactPct": "0.001",
        "routePlan": [{
            "swapInfo": {
                "ammKey": "58oQChx4yWmvKdwLLZzBi4ChoCc2fqCUWBkwMihLYQo2",
                "label": "Raydium",
                "inputMint": input_mint,
                "outputMint": output_mint,
                "inAmount": amount.to_string(),
                "outAmount": (amount / 2).to_string(),
                "feeAmount": "25",
                "feeMint": input_mint
            },
            "percent": 100
        }]
    })
}

/// Unsigned single-signer transaction standing in for an aggregator swap
pub fn unsigned_swap_transaction(payer: &Pubkey) -> VersionedTransaction {
    let instruction = Instruction::new_with_bytes(
        Pubkey::new_unique(),
        &[1, 2, 3],
        vec![AccountMeta::new(*payer, true)],
    );
    let message = Message::new(&[instruction], Some(payer));
    VersionedTransaction {
        signatures: vec![Signature::default(); message.header.num_required_signatures as usize],
        message: VersionedMessage::Legacy(message),
    }
}

pub fn swap_transaction_bytes(payer: &Pubkey) -> Vec<u8> {
    bincode::serialize(&unsigned_swap_transaction(payer)).unwrap()
}
