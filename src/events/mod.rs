use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging (but otherwise swallowing) delivery failure.
    /// Used after commit so a full event channel can never fail a write.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!("Dropped event {:?}: {}", event, e);
        }
    }
}

/// Convenience constructor returning a connected sender/receiver pair.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Ledger events
    ComponentsReceived {
        ledger_entry_id: Uuid,
        component_id: Uuid,
        lot_id: Option<Uuid>,
        quantity: Decimal,
    },
    InventoryAdjusted {
        ledger_entry_id: Uuid,
        component_id: Uuid,
        quantity_change: Decimal,
    },
    InventoryTransferred {
        ledger_entry_id: Uuid,
        component_id: Uuid,
        from_location_id: Uuid,
        to_location_id: Uuid,
        quantity: Decimal,
    },
    OutboundShipmentRecorded {
        ledger_entry_id: Uuid,
        sku_id: Uuid,
        quantity: Decimal,
    },
    LedgerEntryReversed {
        original_entry_id: Uuid,
        reversal_entry_id: Uuid,
    },

    // Build events
    BuildCompleted {
        ledger_entry_id: Uuid,
        sku_id: Uuid,
        units_built: i64,
        output_quantity: i64,
        total_bom_cost: Decimal,
    },
    ComponentShortageDetected {
        component_id: Uuid,
        required: Decimal,
        available: Decimal,
        shortage: Decimal,
    },
    DefectThresholdExceeded {
        ledger_entry_id: Uuid,
        sku_id: Uuid,
        defect_count: i32,
        affected_units: Option<i32>,
    },

    // BOM events
    BomVersionCreated {
        bom_version_id: Uuid,
        sku_id: Uuid,
    },
    BomVersionActivated {
        bom_version_id: Uuid,
        sku_id: Uuid,
        deactivated_version_id: Option<Uuid>,
    },
    BomVersionCloned {
        source_version_id: Uuid,
        new_version_id: Uuid,
    },

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Drains the event channel, fanning each event out to every registered
/// handler. Handler failures are logged and do not stop the loop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        let dispatches = handlers
            .iter()
            .map(|handler| {
                let event = event.clone();
                async move { handler.handle_event(event).await }
            })
            .collect::<Vec<_>>();

        for result in join_all(dispatches).await {
            if let Err(e) = result {
                error!("Event handler failed: {}", e);
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (sender, rx) = channel(1);
        drop(rx);
        // Must not panic or error out
        sender
            .send_or_log(Event::with_data("after shutdown".to_string()))
            .await;
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sender, mut rx) = channel(8);
        sender
            .send(Event::with_data("first".to_string()))
            .await
            .unwrap();
        sender
            .send(Event::with_data("second".to_string()))
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            Event::Generic { message, .. } => assert_eq!(message, "first"),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            Event::Generic { message, .. } => assert_eq!(message, "second"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
