//! Event Bus for Internal Communication
//!
//! Provides a broadcast-based event system for decoupled communication
//! between the pipeline and its consumers, particularly the bookkeeping
//! logger that records executed swaps. Publishing never waits on a
//! subscriber.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Bookkeeping record for a confirmed swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub attempt_id: Uuid,
    pub signature: String,
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    pub fee_bps: Option<u16>,
    pub fee_account: Option<String>,
    pub route: String,
    pub timestamp: i64,
}

/// Event types that can be broadcast through the system
#[derive(Debug, Clone)]
pub enum Event {
    // Execution events
    SwapExecuted(SwapRecord),
    SwapFailed {
        attempt_id: Uuid,
        kind: &'static str,
        message: String,
    },

    // Node pool events
    EndpointCooledDown {
        endpoint: String,
        reason: String,
    },
    CooldownsReset {
        fallback_endpoint: String,
    },
}

/// Event bus for broadcasting events to multiple subscribers
pub struct EventBus {
    /// Broadcast sender
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Get a sender for publishing events
    pub fn sender(&self) -> broadcast::Sender<Event> {
        self.sender.clone()
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an event
    pub fn publish(&self, event: Event) {
        publish(&self.sender, event);
    }

    /// Get number of active receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Fire-and-forget publish on a raw sender
pub fn publish(sender: &broadcast::Sender<Event>, event: Event) {
    match sender.send(event) {
        Ok(count) => {
            debug!("Event sent to {} receivers", count);
        }
        Err(_) => {
            // No receivers - this is fine during startup/shutdown
            debug!("No event receivers");
        }
    }
}

/// Event processor that handles events from the bus
pub struct EventProcessor {
    /// Event receiver
    receiver: broadcast::Receiver<Event>,
    /// Name for logging
    name: String,
}

impl EventProcessor {
    /// Create a new event processor
    pub fn new(bus: &EventBus, name: &str) -> Self {
        Self {
            receiver: bus.subscribe(),
            name: name.to_string(),
        }
    }

    /// Wait for the next event
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(
                        "Event processor '{}' lagged by {} messages",
                        self.name, count
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for processor '{}'", self.name);
                    return None;
                }
            }
        }
    }
}

/// Helper to create typed event handlers
pub fn spawn_event_handler<F, Fut>(
    bus: &EventBus,
    name: &str,
    mut handler: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnMut(Event) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let mut processor = EventProcessor::new(bus, name);
    let name = name.to_string();

    tokio::spawn(async move {
        debug!("Event handler '{}' started", name);
        while let Some(event) = processor.next().await {
            handler(event).await;
        }
        debug!("Event handler '{}' stopped", name);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn record() -> SwapRecord {
        SwapRecord {
            attempt_id: Uuid::new_v4(),
            signature: "sig".to_string(),
            input_mint: "A".to_string(),
            output_mint: "B".to_string(),
            in_amount: 10,
            out_amount: 20,
            fee_bps: None,
            fee_account: None,
            route: "Raydium".to_string(),
            timestamp: 12345,
        }
    }

    #[tokio::test]
    async fn test_event_bus_pubsub() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.publish(Event::SwapExecuted(record()));

        match receiver.recv().await.unwrap() {
            Event::SwapExecuted(r) => assert_eq!(r.timestamp, 12345),
            _ => panic!("Wrong event type"),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(Event::CooldownsReset {
            fallback_endpoint: "primary".to_string(),
        });

        assert!(matches!(rx1.recv().await.unwrap(), Event::CooldownsReset { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), Event::CooldownsReset { .. }));
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(Event::SwapExecuted(record()));
        assert_eq!(bus.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_event_handler_receives_events() {
        let bus = EventBus::new(10);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = spawn_event_handler(&bus, "test", move |event| {
            let tx = tx.clone();
            async move {
                if let Event::SwapExecuted(record) = event {
                    let _ = tx.send(record.signature);
                }
            }
        });

        bus.publish(Event::SwapExecuted(record()));
        assert_eq!(rx.recv().await.as_deref(), Some("sig"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_handler_drains_backlog_once_senders_drop() {
        let bus = EventBus::new(10);
        let sender = bus.sender();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let handle = spawn_event_handler(&bus, "drain", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        publish(&sender, Event::SwapExecuted(record()));
        publish(&sender, Event::SwapExecuted(record()));
        drop(sender);
        drop(bus);

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("handler should stop once the bus closes")
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_swap_record_serializes() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["route"], "Raydium");
        assert_eq!(json["in_amount"], 10);
    }
}
