use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
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

    /// Creates a sender together with the receiving end of a bounded channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping domain event");
        }
    }
}

/// Domain events emitted after successful writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Stock batch lifecycle
    BatchReceived {
        stock_batch_id: Uuid,
        batch_code: String,
        supplier_id: Uuid,
        quantity: Decimal,
        unit: String,
    },
    BatchConsumed {
        stock_batch_id: Uuid,
        quantity: Decimal,
        unit: String,
        remaining: Decimal,
        reference_id: Option<Uuid>,
    },
    BatchDepleted(Uuid),
    BatchQuarantined {
        stock_batch_id: Uuid,
        recall_id: Option<Uuid>,
    },
    BatchReleased(Uuid),
    BatchDestroyed(Uuid),
    BatchReturned(Uuid),
    BatchExpired {
        stock_batch_id: Uuid,
        use_by_date: NaiveDate,
    },

    // Production and distribution
    ProductionOutputRecorded {
        production_batch_id: Uuid,
        stock_batch_id: Uuid,
        quantity: Decimal,
        unit: String,
    },
    DispatchRecorded {
        dispatch_id: Uuid,
        stock_batch_id: Uuid,
        customer_id: Uuid,
    },

    // Recall workflow
    RecallCreated {
        recall_id: Uuid,
        recall_code: String,
        severity: String,
    },
    RecallStatusChanged {
        recall_id: Uuid,
        old_status: String,
        new_status: String,
    },
    AffectedBatchRegistered {
        recall_id: Uuid,
        stock_batch_id: Uuid,
        quarantined: bool,
    },
    QuarantineDiscrepancy {
        recall_id: Uuid,
        stock_batch_id: Uuid,
        batch_status: String,
    },
    AffectedBatchRemoved {
        recall_id: Uuid,
        stock_batch_id: Uuid,
    },
    RecallNotificationRecorded {
        recall_id: Uuid,
        notification_id: Uuid,
        customer_name: String,
    },
    RegulatorNotified {
        recall_id: Uuid,
        regulator: String,
        reference: Option<String>,
        notified_at: DateTime<Utc>,
    },
}

impl Event {
    /// Short name used for logging and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            Event::BatchReceived { .. } => "batch_received",
            Event::BatchConsumed { .. } => "batch_consumed",
            Event::BatchDepleted(_) => "batch_depleted",
            Event::BatchQuarantined { .. } => "batch_quarantined",
            Event::BatchReleased(_) => "batch_released",
            Event::BatchDestroyed(_) => "batch_destroyed",
            Event::BatchReturned(_) => "batch_returned",
            Event::BatchExpired { .. } => "batch_expired",
            Event::ProductionOutputRecorded { .. } => "production_output_recorded",
            Event::DispatchRecorded { .. } => "dispatch_recorded",
            Event::RecallCreated { .. } => "recall_created",
            Event::RecallStatusChanged { .. } => "recall_status_changed",
            Event::AffectedBatchRegistered { .. } => "affected_batch_registered",
            Event::QuarantineDiscrepancy { .. } => "quarantine_discrepancy",
            Event::AffectedBatchRemoved { .. } => "affected_batch_removed",
            Event::RecallNotificationRecorded { .. } => "recall_notification_recorded",
            Event::RegulatorNotified { .. } => "regulator_notified",
        }
    }
}

// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Drains the channel, logging each event and forwarding it to an optional handler.
pub async fn process_events(
    mut rx: mpsc::Receiver<Event>,
    handler: Option<std::sync::Arc<dyn EventHandler>>,
) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::QuarantineDiscrepancy {
                recall_id,
                stock_batch_id,
                batch_status,
            } => {
                warn!(
                    recall_id = %recall_id,
                    stock_batch_id = %stock_batch_id,
                    batch_status = %batch_status,
                    "Affected batch could not be quarantined"
                );
            }
            Event::BatchDepleted(id) => {
                info!(stock_batch_id = %id, "Stock batch depleted");
            }
            Event::RecallStatusChanged {
                recall_id,
                old_status,
                new_status,
            } => {
                info!(
                    recall_id = %recall_id,
                    "Recall moved from {} to {}",
                    old_status, new_status
                );
            }
            other => {
                info!(event = other.name(), "Received event: {:?}", other);
            }
        }

        if let Some(handler) = &handler {
            let name = event.name();
            if let Err(e) = handler.handle_event(event).await {
                error!(event = name, error = %e, "Event handler failed");
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Mutex<Vec<&'static str>>);

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle_event(&self, event: Event) -> Result<(), String> {
            self.0.lock().unwrap().push(event.name());
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);
        sender.send_or_log(Event::BatchDepleted(Uuid::new_v4())).await;
        assert!(sender.send(Event::BatchReleased(Uuid::new_v4())).await.is_err());
    }

    #[tokio::test]
    async fn process_events_forwards_to_handler() {
        let (sender, rx) = EventSender::channel(8);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let handler: Arc<dyn EventHandler> = recorder.clone();
        let handle = tokio::spawn(process_events(rx, Some(handler)));

        sender.send(Event::BatchDestroyed(Uuid::new_v4())).await.unwrap();
        sender
            .send(Event::QuarantineDiscrepancy {
                recall_id: Uuid::new_v4(),
                stock_batch_id: Uuid::new_v4(),
                batch_status: "depleted".into(),
            })
            .await
            .unwrap();
        drop(sender);
        handle.await.unwrap();

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen, vec!["batch_destroyed", "quarantine_discrepancy"]);
    }
}
