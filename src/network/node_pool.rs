//! Ledger Node Pool
//!
//! Prioritized set of Solana RPC endpoints with liveness probing and
//! failure cooldown:
//! - `get_connection` walks endpoints by priority, skipping those cooling
//!   down, and returns the first one that answers a bounded `getSlot` probe
//! - A failed or timed-out probe starts a cooldown for that endpoint
//! - When nothing answers, all cooldowns are cleared and the
//!   highest-priority endpoint is returned anyway
//! - `execute_with_fallback` re-resolves a connection after each transient
//!   failure, backing off exponentially between attempts

use anyhow::Result;
use dashmap::DashMap;
use futures::future::join_all;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{EndpointConfig, RpcConfig};
use crate::errors::SwapError;
use crate::network::event_bus::{self, Event};
use crate::network::ledger::{LedgerRpc, SolanaRpc};
use crate::telemetry::metrics;
use crate::utils::backoff_delay;

/// A configured RPC endpoint. Lower `priority` is preferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
    pub priority: u32,
    pub timeout: Duration,
}

impl Endpoint {
    pub fn from_config(config: &EndpointConfig) -> Self {
        Self {
            name: config.name.clone(),
            url: config.url.clone(),
            priority: config.priority,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointHealth {
    Healthy,
    CoolingDown,
}

/// Snapshot of one endpoint's state
#[derive(Debug, Clone)]
pub struct EndpointStatus {
    pub name: String,
    pub url: String,
    pub priority: u32,
    pub health: EndpointHealth,
    /// Time left before the endpoint is eligible again
    pub cooldown_remaining: Option<Duration>,
}

/// Result of a one-off probe of every endpoint
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub name: String,
    pub url: String,
    pub priority: u32,
    pub slot: Option<u64>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl ProbeReport {
    pub fn is_healthy(&self) -> bool {
        self.slot.is_some()
    }
}

/// A resolved endpoint and its client
#[derive(Clone)]
pub struct Connection {
    endpoint: Arc<Endpoint>,
    client: Arc<dyn LedgerRpc>,
}

impl Connection {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn name(&self) -> &str {
        &self.endpoint.name
    }

    pub fn client(&self) -> &dyn LedgerRpc {
        self.client.as_ref()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.endpoint.name)
            .field("url", &self.endpoint.url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub probe_timeout: Duration,
    pub cooldown: Duration,
    /// Zero disables the health cache
    pub health_cache: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl From<&RpcConfig> for PoolSettings {
    fn from(config: &RpcConfig) -> Self {
        Self {
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            cooldown: Duration::from_millis(config.cooldown_ms),
            health_cache: Duration::from_millis(config.health_cache_ms),
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }
}

struct Node {
    endpoint: Arc<Endpoint>,
    client: Arc<dyn LedgerRpc>,
}

impl Node {
    fn connection(&self) -> Connection {
        Connection {
            endpoint: self.endpoint.clone(),
            client: self.client.clone(),
        }
    }
}

/// Node pool with health-checked failover
pub struct NodePool {
    /// Sorted by priority, never empty
    nodes: Vec<Node>,
    /// Endpoint url -> time of last failure
    cooldowns: DashMap<String, Instant>,
    /// Endpoint url -> time of last successful probe
    last_healthy: DashMap<String, Instant>,
    settings: PoolSettings,
    events: Option<broadcast::Sender<Event>>,
}

impl NodePool {
    /// Create a pool of JSON-RPC clients from configuration
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let nodes = config
            .endpoints
            .iter()
            .map(|ep| {
                let endpoint = Endpoint::from_config(ep);
                let client: Arc<dyn LedgerRpc> =
                    Arc::new(SolanaRpc::new(&endpoint.name, &endpoint.url, endpoint.timeout));
                (endpoint, client)
            })
            .collect();

        Self::with_clients(nodes, PoolSettings::from(config))
    }

    /// Create a pool over pre-built clients
    pub fn with_clients(
        nodes: Vec<(Endpoint, Arc<dyn LedgerRpc>)>,
        settings: PoolSettings,
    ) -> Result<Self> {
        anyhow::ensure!(!nodes.is_empty(), "node pool requires at least one endpoint");

        let mut nodes: Vec<Node> = nodes
            .into_iter()
            .map(|(endpoint, client)| Node {
                endpoint: Arc::new(endpoint),
                client,
            })
            .collect();
        nodes.sort_by_key(|node| node.endpoint.priority);

        info!(
            endpoints = nodes.len(),
            primary = %nodes[0].endpoint.name,
            "Node pool initialized"
        );

        Ok(Self {
            nodes,
            cooldowns: DashMap::new(),
            last_healthy: DashMap::new(),
            settings,
            events: None,
        })
    }

    /// Publish cooldown events on the given bus
    pub fn with_event_bus(mut self, sender: broadcast::Sender<Event>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Resolve a live connection. Never fails: when every endpoint is down
    /// the cooldown table is cleared and the preferred endpoint returned.
    pub async fn get_connection(&self) -> Connection {
        for node in &self.nodes {
            if self.is_cooling_down(&node.endpoint, Instant::now()) {
                debug!(endpoint = %node.endpoint.name, "Endpoint cooling down, skipping");
                continue;
            }
            if self.recently_healthy(&node.endpoint) {
                return node.connection();
            }
            if self.probe(node).await {
                return node.connection();
            }
        }

        self.reset_cooldowns();
        self.nodes[0].connection()
    }

    /// Run `operation` against a live endpoint, moving to another endpoint
    /// after each transient failure
    pub async fn execute_with_fallback<T, F, Fut>(
        &self,
        mut operation: F,
        max_retries: u32,
    ) -> Result<T, SwapError>
    where
        F: FnMut(Connection) -> Fut,
        Fut: Future<Output = Result<T, SwapError>>,
    {
        let mut attempt = 0;

        loop {
            let connection = self.get_connection().await;
            match operation(connection.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    self.mark_failed(connection.endpoint(), &e.to_string());
                    if attempt >= max_retries {
                        warn!(
                            endpoint = %connection.name(),
                            attempts = attempt + 1,
                            error = %e,
                            "Retries exhausted"
                        );
                        return Err(e);
                    }

                    let delay = backoff_delay(self.settings.retry_base_delay, attempt);
                    warn!(
                        endpoint = %connection.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient RPC failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Put an endpoint into cooldown starting now
    pub fn mark_failed(&self, endpoint: &Endpoint, reason: &str) {
        self.cooldowns.insert(endpoint.url.clone(), Instant::now());
        self.last_healthy.remove(&endpoint.url);

        warn!(
            endpoint = %endpoint.name,
            cooldown_ms = self.settings.cooldown.as_millis() as u64,
            reason,
            "Endpoint entered cooldown"
        );
        metrics::record_cooldown(&endpoint.name, self.cooling_count());
        self.publish(Event::EndpointCooledDown {
            endpoint: endpoint.name.clone(),
            reason: reason.to_string(),
        });
    }

    /// Number of endpoints whose cooldown has not yet expired
    pub fn cooling_count(&self) -> usize {
        let now = Instant::now();
        self.nodes
            .iter()
            .filter(|node| self.is_cooling_down(&node.endpoint, now))
            .count()
    }

    pub fn endpoint_statuses(&self) -> Vec<EndpointStatus> {
        let now = Instant::now();
        self.nodes
            .iter()
            .map(|node| {
                let remaining = self.cooldown_remaining(&node.endpoint, now);
                EndpointStatus {
                    name: node.endpoint.name.clone(),
                    url: node.endpoint.url.clone(),
                    priority: node.endpoint.priority,
                    health: if remaining.is_some() {
                        EndpointHealth::CoolingDown
                    } else {
                        EndpointHealth::Healthy
                    },
                    cooldown_remaining: remaining,
                }
            })
            .collect()
    }

    /// Probe every endpoint concurrently without touching cooldown state
    pub async fn probe_all(&self) -> Vec<ProbeReport> {
        let probes = self.nodes.iter().map(|node| async move {
            let timeout = self.probe_timeout_for(&node.endpoint);
            let start = Instant::now();
            let result = tokio::time::timeout(timeout, node.client.get_slot()).await;
            let latency_ms = start.elapsed().as_millis() as u64;

            let (slot, error) = match result {
                Ok(Ok(slot)) => (Some(slot), None),
                Ok(Err(e)) => (None, Some(e.to_string())),
                Err(_) => (None, Some(format!("probe timed out after {}ms", timeout.as_millis()))),
            };

            ProbeReport {
                name: node.endpoint.name.clone(),
                url: node.endpoint.url.clone(),
                priority: node.endpoint.priority,
                slot,
                latency_ms,
                error,
            }
        });

        join_all(probes).await
    }

    fn probe_timeout_for(&self, endpoint: &Endpoint) -> Duration {
        self.settings.probe_timeout.min(endpoint.timeout)
    }

    async fn probe(&self, node: &Node) -> bool {
        let timeout = self.probe_timeout_for(&node.endpoint);
        let start = Instant::now();
        let result = tokio::time::timeout(timeout, node.client.get_slot()).await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(Ok(slot)) => {
                metrics::record_probe(&node.endpoint.name, true, latency_ms);
                debug!(endpoint = %node.endpoint.name, slot, latency_ms, "Endpoint healthy");
                if !self.settings.health_cache.is_zero() {
                    self.last_healthy.insert(node.endpoint.url.clone(), Instant::now());
                }
                true
            }
            Ok(Err(e)) => {
                metrics::record_probe(&node.endpoint.name, false, latency_ms);
                self.mark_failed(&node.endpoint, &e.to_string());
                false
            }
            Err(_) => {
                metrics::record_probe(&node.endpoint.name, false, latency_ms);
                let reason = format!("probe timed out after {}ms", timeout.as_millis());
                self.mark_failed(&node.endpoint, &reason);
                false
            }
        }
    }

    fn cooldown_remaining(&self, endpoint: &Endpoint, now: Instant) -> Option<Duration> {
        let failed_at = *self.cooldowns.get(&endpoint.url)?;
        let eligible_at = failed_at + self.settings.cooldown;
        (now < eligible_at).then(|| eligible_at - now)
    }

    fn is_cooling_down(&self, endpoint: &Endpoint, now: Instant) -> bool {
        self.cooldown_remaining(endpoint, now).is_some()
    }

    fn recently_healthy(&self, endpoint: &Endpoint) -> bool {
        if self.settings.health_cache.is_zero() {
            return false;
        }
        self.last_healthy
            .get(&endpoint.url)
            .map(|at| at.elapsed() < self.settings.health_cache)
            .unwrap_or(false)
    }

    fn reset_cooldowns(&self) {
        let fallback = &self.nodes[0].endpoint.name;
        warn!(
            fallback = %fallback,
            "No endpoint answered, clearing cooldowns"
        );
        self.cooldowns.clear();
        self.last_healthy.clear();
        metrics::record_cooldown_reset();
        self.publish(Event::CooldownsReset {
            fallback_endpoint: fallback.clone(),
        });
    }

    fn publish(&self, event: Event) {
        if let Some(sender) = &self.events {
            event_bus::publish(sender, event);
        }
    }
}
