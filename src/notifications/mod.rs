use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use slog::{info, Logger};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::ReviewStatus;

/// Customer-facing message produced when a registration is approved or
/// declined.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReviewNotification {
    pub registration_id: Uuid,
    pub new_status: ReviewStatus,
    pub customer_email: String,
    pub reason: Option<String>,
}

/// Wire format queued for the mail worker.
#[derive(Debug, Serialize, Deserialize, Clone)]
struct QueuedNotification {
    id: Uuid,
    registration_id: Uuid,
    new_status: ReviewStatus,
    customer_email: String,
    message: String,
    created_at: DateTime<Utc>,
}

/// Notification service errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Delivery seam for review outcome notifications. Callers treat delivery as
/// best-effort; implementations must not assume a retry.
#[async_trait]
pub trait ReviewNotifier: Send + Sync {
    async fn notify(&self, notification: &ReviewNotification) -> Result<(), NotificationError>;
}

/// Redis-backed notifier: pushes review outcomes onto a queue consumed by the
/// mail worker.
#[derive(Clone)]
pub struct RedisReviewNotifier {
    redis: Arc<Client>,
    logger: Logger,
}

const QUEUE_KEY: &str = "warranty:notifications:review";

impl RedisReviewNotifier {
    pub fn new(redis_url: &str, logger: Logger) -> Result<Self, NotificationError> {
        let redis = Client::open(redis_url).map_err(NotificationError::Redis)?;
        Ok(Self {
            redis: Arc::new(redis),
            logger,
        })
    }

    fn render_message(notification: &ReviewNotification) -> String {
        match notification.new_status {
            ReviewStatus::Approved => {
                "Your warranty registration has been approved. Your coverage is now active."
                    .to_string()
            }
            ReviewStatus::Declined => match &notification.reason {
                Some(reason) => format!(
                    "Your warranty registration was declined: {}. Please contact your dealer.",
                    reason
                ),
                None => "Your warranty registration was declined. Please contact your dealer."
                    .to_string(),
            },
            ReviewStatus::PendingReview => {
                "Your warranty registration has been received and is awaiting review.".to_string()
            }
        }
    }
}

#[async_trait]
impl ReviewNotifier for RedisReviewNotifier {
    #[instrument(skip(self, notification), fields(registration_id = %notification.registration_id))]
    async fn notify(&self, notification: &ReviewNotification) -> Result<(), NotificationError> {
        let queued = QueuedNotification {
            id: Uuid::new_v4(),
            registration_id: notification.registration_id,
            new_status: notification.new_status,
            customer_email: notification.customer_email.clone(),
            message: Self::render_message(notification),
            created_at: Utc::now(),
        };

        let mut conn = self.redis.get_async_connection().await?;
        let json = serde_json::to_string(&queued)?;
        let _: i64 = conn.rpush(QUEUE_KEY, json).await?;

        info!(self.logger, "Review notification queued";
            "registration_id" => %queued.registration_id,
            "status" => queued.new_status.as_str(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approved_message_mentions_active_coverage() {
        let note = ReviewNotification {
            registration_id: Uuid::new_v4(),
            new_status: ReviewStatus::Approved,
            customer_email: "rider@example.com".into(),
            reason: None,
        };
        let message = RedisReviewNotifier::render_message(&note);
        assert!(message.contains("approved"));
        assert!(message.contains("active"));
    }

    #[test]
    fn declined_message_includes_reason_when_present() {
        let note = ReviewNotification {
            registration_id: Uuid::new_v4(),
            new_status: ReviewStatus::Declined,
            customer_email: "rider@example.com".into(),
            reason: Some("Invoice does not match the VIN".into()),
        };
        let message = RedisReviewNotifier::render_message(&note);
        assert!(message.contains("Invoice does not match the VIN"));

        let bare = ReviewNotification {
            reason: None,
            ..note
        };
        let message = RedisReviewNotifier::render_message(&bare);
        assert!(message.contains("declined"));
    }
}
