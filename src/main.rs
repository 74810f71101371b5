//! SOL Swap Router
//!
//! Command line front end for the swap pipeline:
//! - `quote`  fetch a (cached) aggregator quote
//! - `swap`   quote, build and execute a swap, or only build with `--dry-run`
//! - `health` probe every configured RPC endpoint

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::signer::Signer;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::{signal, time};
use tracing::{error, info, warn};

use sol_swap_router::config::AppConfig;
use sol_swap_router::network::event_bus::spawn_event_handler;
use sol_swap_router::network::{Event, EventBus};
use sol_swap_router::telemetry::{init_logging, init_metrics};
use sol_swap_router::utils::helpers::load_keypair_from_env_or_file;
use sol_swap_router::{SwapError, SwapPipeline};

/// Environment variable that overrides the wallet keypair file
const KEYPAIR_ENV: &str = "SWAP_ROUTER_KEYPAIR";

/// How long shutdown waits for queued bookkeeping events
const BOOKKEEPING_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// SOL Swap Router - resilient Jupiter swaps over a failover RPC pool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Override log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a quote
    Quote(TradeArgs),
    /// Quote, build and execute a swap
    Swap {
        #[command(flatten)]
        trade: TradeArgs,

        /// Build the transactions without submitting them
        #[arg(long)]
        dry_run: bool,
    },
    /// Probe every configured RPC endpoint
    Health,
}

#[derive(clap::Args, Debug)]
struct TradeArgs {
    /// Mint of the token to sell
    #[arg(long)]
    input_mint: String,

    /// Mint of the token to buy
    #[arg(long)]
    output_mint: String,

    /// Amount to sell, in the input token's base units
    #[arg(long)]
    amount: u64,

    /// Slippage tolerance in basis points
    #[arg(long, default_value_t = 50)]
    slippage_bps: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.telemetry.log_level = level;
    }

    let _log_guard = init_logging(&config.telemetry)?;
    info!("Starting SOL Swap Router v{}", env!("CARGO_PKG_VERSION"));

    if config.telemetry.enable_metrics {
        init_metrics(config.telemetry.metrics_port)?;
    }

    let bus = EventBus::default();
    let bookkeeping = spawn_bookkeeping(&bus);
    let pipeline = SwapPipeline::new(&config, bus.sender())?;

    // Dropping the command future on ctrl-c cancels any in-flight request
    let outcome = tokio::select! {
        result = run(cli.command, &pipeline, &config) => result,
        signal = signal::ctrl_c() => {
            signal.context("Error listening for shutdown signal")?;
            warn!("Shutdown signal received, abandoning request");
            Ok(())
        }
    };

    // Closing every sender lets the bookkeeping task drain pending records and exit
    drop(pipeline);
    drop(bus);
    if time::timeout(BOOKKEEPING_DRAIN_TIMEOUT, bookkeeping).await.is_err() {
        warn!("Bookkeeping did not finish before shutdown");
    }
    info!("SOL Swap Router stopped");
    outcome
}

async fn run(command: Command, pipeline: &SwapPipeline, config: &AppConfig) -> Result<()> {
    match command {
        Command::Quote(trade) => {
            let quote = pipeline
                .quote(&trade.input_mint, &trade.output_mint, trade.amount, trade.slippage_bps)
                .await
                .map_err(report)?;

            println!("Route:          {}", quote.route_summary());
            println!("In amount:      {}", quote.in_amount);
            println!("Out amount:     {}", quote.out_amount);
            println!("Minimum out:    {}", quote.other_amount_threshold);
            if let Some(impact) = quote.price_impact_pct {
                println!("Price impact:   {}%", impact);
            }
        }
        Command::Swap { trade, dry_run } => {
            let keypair_path = Path::new(&config.wallet.keypair_path);
            let signer = load_keypair_from_env_or_file(KEYPAIR_ENV, keypair_path)
                .context("Failed to load wallet keypair")?;

            if dry_run {
                let plan = pipeline
                    .prepare(
                        &trade.input_mint,
                        &trade.output_mint,
                        trade.amount,
                        trade.slippage_bps,
                        &signer.pubkey(),
                    )
                    .await
                    .map_err(report)?;

                println!("Route:          {}", plan.quote.route_summary());
                println!("Out amount:     {}", plan.quote.out_amount);
                println!("Needs setup:    {}", plan.setup.is_some());
                let fee_account = plan
                    .fee_account
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "none".to_string());
                println!("Fee account:    {}", fee_account);
                println!("Blockhash:      {}", plan.recent_blockhash);
                return Ok(());
            }

            let receipt = pipeline
                .swap(
                    &trade.input_mint,
                    &trade.output_mint,
                    trade.amount,
                    trade.slippage_bps,
                    &signer,
                )
                .await
                .map_err(report)?;

            if let Some(setup) = receipt.setup_signature {
                println!("Setup:          {}", setup);
            }
            println!("Signature:      {}", receipt.signature);
            let slot = receipt
                .slot
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("Slot:           {}", slot);
            println!("Elapsed:        {} ms", receipt.elapsed_ms);
        }
        Command::Health => {
            for report in pipeline.pool().probe_all().await {
                match (report.slot, &report.error) {
                    (Some(slot), _) => println!(
                        "{:<12} ok    slot {} ({} ms) {}",
                        report.name, slot, report.latency_ms, report.url
                    ),
                    (None, error) => println!(
                        "{:<12} DOWN  {} {}",
                        report.name,
                        error.as_deref().unwrap_or("unknown error"),
                        report.url
                    ),
                }
            }
        }
    }
    Ok(())
}

/// Log a pipeline error with its suggestion
fn report(err: SwapError) -> anyhow::Error {
    error!(kind = err.kind(), "{}", err);
    eprintln!("Error: {}", err);
    eprintln!("Suggestion: {}", err.suggestion());
    err.into()
}

fn spawn_bookkeeping(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    spawn_event_handler(bus, "bookkeeping", |event| async move {
        match event {
            Event::SwapExecuted(record) => match serde_json::to_string(&record) {
                Ok(json) => info!(target: "bookkeeping", record = %json, "Swap recorded"),
                Err(e) => {
                    warn!(target: "bookkeeping", error = %e, "Failed to serialize swap record")
                }
            },
            Event::SwapFailed { attempt_id, kind, message } => {
                info!(
                    target: "bookkeeping",
                    attempt_id = %attempt_id,
                    kind,
                    message = %message,
                    "Swap failed"
                );
            }
            Event::EndpointCooledDown { endpoint, reason } => {
                warn!(endpoint = %endpoint, reason = %reason, "Endpoint cooling down");
            }
            Event::CooldownsReset { fallback_endpoint } => {
                warn!(fallback = %fallback_endpoint, "All endpoints failed, cooldowns reset");
            }
        }
    })
}
