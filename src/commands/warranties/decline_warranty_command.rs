use crate::commands::Command;
use crate::{
    db::DbPool,
    entities::warranty_registration::{self, Entity as WarrantyRegistration, ReviewStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use async_trait::async_trait;
use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use sea_orm::{ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref WARRANTY_DECLINES: IntCounter = IntCounter::new(
        "warranty_declines_total",
        "Total number of warranty registrations declined"
    )
    .expect("metric can be created");
    static ref WARRANTY_DECLINE_FAILURES: IntCounter = IntCounter::new(
        "warranty_decline_failures_total",
        "Total number of failed warranty declines"
    )
    .expect("metric can be created");
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct DeclineWarrantyCommand {
    pub registration_id: Uuid,
    #[validate(length(min = 1, message = "Reviewer cannot be empty"))]
    pub reviewed_by: String,
    /// Shown to the customer in the decline notification.
    pub reason: Option<String>,
}

#[async_trait]
impl Command for DeclineWarrantyCommand {
    type Result = warranty_registration::Model;

    #[instrument(skip(self, db_pool, event_sender))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate().map_err(|e| {
            WARRANTY_DECLINE_FAILURES.inc();
            ServiceError::ValidationError(format!("Invalid input: {}", e))
        })?;

        let db = db_pool.as_ref();

        // Same guarded transition as approval: pending records only.
        let update = WarrantyRegistration::update_many()
            .col_expr(
                warranty_registration::Column::ReviewStatus,
                sea_orm::sea_query::Expr::value(ReviewStatus::Declined.as_str()),
            )
            .col_expr(
                warranty_registration::Column::DeclineReason,
                sea_orm::sea_query::Expr::value(self.reason.clone()),
            )
            .col_expr(
                warranty_registration::Column::ReviewedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .col_expr(
                warranty_registration::Column::ReviewedBy,
                sea_orm::sea_query::Expr::value(self.reviewed_by.clone()),
            )
            .filter(warranty_registration::Column::Id.eq(self.registration_id))
            .filter(
                warranty_registration::Column::ReviewStatus
                    .eq(ReviewStatus::PendingReview.as_str()),
            )
            .exec(db)
            .await
            .map_err(|e| {
                WARRANTY_DECLINE_FAILURES.inc();
                error!("Failed to decline warranty registration: {}", e);
                ServiceError::DatabaseError(e)
            })?;

        let record = WarrantyRegistration::find_by_id(self.registration_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                WARRANTY_DECLINE_FAILURES.inc();
                ServiceError::NotFound(format!(
                    "Warranty registration {} not found",
                    self.registration_id
                ))
            })?;

        if update.rows_affected == 0 {
            WARRANTY_DECLINE_FAILURES.inc();
            return Err(ServiceError::InvalidState(format!(
                "Warranty registration {} has already been reviewed ({})",
                self.registration_id,
                record.review_state().label()
            )));
        }

        // On Postgres the outbox worker dispatches this event exactly once;
        // direct emission covers backends without an outbox.
        if db.get_database_backend() != DbBackend::Postgres {
            let event = Event::WarrantyDeclined {
                registration_id: record.id,
                customer_email: record.customer_email.clone(),
                reason: self.reason.clone(),
            };
            if let Err(e) = event_sender.send(event).await {
                warn!(
                    registration_id = %record.id,
                    "Failed to send warranty declined event: {}",
                    e
                );
            }
        }

        info!(
            registration_id = %record.id,
            reviewed_by = %self.reviewed_by,
            "Warranty registration declined"
        );

        WARRANTY_DECLINES.inc();

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reviewer_is_required() {
        let cmd = DeclineWarrantyCommand {
            registration_id: Uuid::new_v4(),
            reviewed_by: "".to_string(),
            reason: Some("Invoice does not match the VIN".to_string()),
        };
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn reason_is_optional() {
        let cmd = DeclineWarrantyCommand {
            registration_id: Uuid::new_v4(),
            reviewed_by: "ops@voltride.example".to_string(),
            reason: None,
        };
        assert!(cmd.validate().is_ok());
    }
}
