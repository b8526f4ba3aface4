use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::ReviewStatus;
use crate::notifications::{ReviewNotification, ReviewNotifier};

pub mod outbox;

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
}

/// Domain events emitted by the warranty workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    WarrantyRegistered(Uuid),
    WarrantyApproved {
        registration_id: Uuid,
        customer_email: String,
    },
    WarrantyDeclined {
        registration_id: Uuid,
        customer_email: String,
        reason: Option<String>,
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

/// Processes incoming events. Review outcomes fan out to the customer
/// notifier when one is configured; a notification failure is logged and
/// dropped, it never affects the workflow that emitted the event.
pub async fn process_events(
    mut rx: mpsc::Receiver<Event>,
    notifier: Option<Arc<dyn ReviewNotifier>>,
) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!("Received event: {:?}", event);

        match event {
            Event::WarrantyRegistered(registration_id) => {
                info!("Warranty registration submitted: {}", registration_id);
            }
            Event::WarrantyApproved {
                registration_id,
                customer_email,
            } => {
                notify_review_outcome(
                    notifier.as_deref(),
                    ReviewNotification {
                        registration_id,
                        new_status: ReviewStatus::Approved,
                        customer_email,
                        reason: None,
                    },
                )
                .await;
            }
            Event::WarrantyDeclined {
                registration_id,
                customer_email,
                reason,
            } => {
                notify_review_outcome(
                    notifier.as_deref(),
                    ReviewNotification {
                        registration_id,
                        new_status: ReviewStatus::Declined,
                        customer_email,
                        reason,
                    },
                )
                .await;
            }
            Event::Generic { message, .. } => {
                info!("Generic event: {}", message);
            }
        }
    }

    warn!("Event processing loop has ended");
}

async fn notify_review_outcome(notifier: Option<&dyn ReviewNotifier>, note: ReviewNotification) {
    let Some(notifier) = notifier else {
        info!(
            "No notifier configured; skipping customer notification for {}",
            note.registration_id
        );
        return;
    };

    if let Err(e) = notifier.notify(&note).await {
        warn!(
            "Failed to notify customer for registration {}: {}",
            note.registration_id, e
        );
    }
}
