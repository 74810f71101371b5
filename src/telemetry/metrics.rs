//! Prometheus metrics export

use anyhow::Result;
use metrics::{counter, gauge, histogram, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

pub fn init_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_metrics();
    info!("Prometheus metrics server started on {}", addr);
    Ok(())
}

fn register_metrics() {
    // Quote metrics
    describe_counter!("swap_router_quote_requests_total", "Quote requests received");
    describe_counter!("swap_router_quote_cache_hits", "Quotes served from cache");
    describe_counter!("swap_router_quote_cache_misses", "Quotes fetched from the aggregator");
    describe_counter!("swap_router_quote_errors_total", "Quote failures by error kind");
    describe_histogram!("swap_router_quote_latency_ms", "Aggregator quote latency");

    // Node pool metrics
    describe_counter!("swap_router_probe_failures_total", "Failed endpoint liveness probes");
    describe_histogram!("swap_router_probe_latency_ms", "Endpoint liveness probe latency");
    describe_counter!("swap_router_cooldowns_total", "Endpoints placed into cooldown");
    describe_counter!("swap_router_cooldown_resets_total", "Times every endpoint was cooling down");
    describe_gauge!("swap_router_endpoints_cooling", "Endpoints currently cooling down");

    // Execution metrics
    describe_counter!("swap_router_swaps_total", "Swap attempts");
    describe_counter!("swap_router_swaps_success", "Confirmed swaps");
    describe_counter!("swap_router_swaps_failed", "Failed swaps by error kind");
    describe_counter!("swap_router_setup_failures_total", "Failed token account setup transactions");
    describe_histogram!("swap_router_execution_latency_ms", "Swap execution latency");
}

pub fn record_quote_request(cache_hit: bool) {
    counter!("swap_router_quote_requests_total").increment(1);
    if cache_hit {
        counter!("swap_router_quote_cache_hits").increment(1);
    } else {
        counter!("swap_router_quote_cache_misses").increment(1);
    }
}

pub fn record_quote_error(kind: &'static str) {
    counter!("swap_router_quote_errors_total", "kind" => kind).increment(1);
}

pub fn record_quote_latency(latency_ms: f64) {
    histogram!("swap_router_quote_latency_ms").record(latency_ms);
}

pub fn record_probe(endpoint: &str, ok: bool, latency_ms: f64) {
    histogram!("swap_router_probe_latency_ms", "endpoint" => endpoint.to_string()).record(latency_ms);
    if !ok {
        counter!("swap_router_probe_failures_total", "endpoint" => endpoint.to_string()).increment(1);
    }
}

pub fn record_cooldown(endpoint: &str, cooling: usize) {
    counter!("swap_router_cooldowns_total", "endpoint" => endpoint.to_string()).increment(1);
    gauge!("swap_router_endpoints_cooling").set(cooling as f64);
}

pub fn record_cooldown_reset() {
    counter!("swap_router_cooldown_resets_total").increment(1);
    gauge!("swap_router_endpoints_cooling").set(0.0);
}

pub fn record_swap_success(latency_ms: f64) {
    counter!("swap_router_swaps_total").increment(1);
    counter!("swap_router_swaps_success").increment(1);
    histogram!("swap_router_execution_latency_ms").record(latency_ms);
}

pub fn record_swap_failure(kind: &'static str) {
    counter!("swap_router_swaps_total").increment(1);
    counter!("swap_router_swaps_failed", "kind" => kind).increment(1);
}

pub fn record_setup_failure() {
    counter!("swap_router_setup_failures_total").increment(1);
}
