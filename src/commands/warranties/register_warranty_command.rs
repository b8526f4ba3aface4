use crate::commands::Command;
use crate::{
    db::DbPool,
    entities::warranty_registration::{
        self, normalize_email, normalize_vin, Entity as WarrantyRegistration, ReviewStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use lazy_static::lazy_static;
use once_cell::sync::Lazy;
use prometheus::IntCounter;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref WARRANTY_REGISTRATIONS: IntCounter = IntCounter::new(
        "warranty_registrations_total",
        "Total number of warranty registrations submitted"
    )
    .expect("metric can be created");
    static ref WARRANTY_REGISTRATION_FAILURES: IntCounter = IntCounter::new(
        "warranty_registration_failures_total",
        "Total number of failed warranty registrations"
    )
    .expect("metric can be created");
}

// Normalized VINs only: uppercase alphanumeric, 5 to 17 characters.
static VIN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{5,17}$").expect("VIN pattern compiles"));

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterWarrantyCommand {
    #[validate(email(message = "Customer email must be a valid address"))]
    pub customer_email: String,
    #[validate(length(min = 1, message = "Customer name cannot be empty"))]
    pub customer_name: String,
    pub phone: Option<String>,
    pub vehicle_model_id: Uuid,
    #[validate(length(min = 1, message = "Vehicle model name cannot be empty"))]
    pub vehicle_model_name: String,
    #[validate(length(min = 1, message = "VIN cannot be empty"))]
    pub vin: String,
    pub purchase_date: NaiveDate,
    #[validate(range(min = 1, max = 3, message = "Warranty period must be 1 to 3 years"))]
    pub period_years: u8,
    #[validate(length(min = 1, message = "Dealer name cannot be empty"))]
    pub dealer_name: String,
    pub invoice_ref: Option<String>,
    pub signature_ref: Option<String>,

    /// Duplicate-VIN policy, taken from application config by the service.
    #[serde(skip, default = "default_policy_flag")]
    pub allow_duplicate_vin: bool,
    #[serde(skip, default = "default_policy_flag")]
    pub allow_resubmit_after_decline: bool,
}

fn default_policy_flag() -> bool {
    true
}

impl RegisterWarrantyCommand {
    fn validate_domain(&self, vin: &str) -> Result<(), ServiceError> {
        if !VIN_PATTERN.is_match(vin) {
            return Err(ServiceError::ValidationError(format!(
                "VIN '{}' is not a valid frame number",
                vin
            )));
        }

        let today = Utc::now().date_naive();
        if self.purchase_date > today {
            return Err(ServiceError::ValidationError(
                "Purchase date cannot be in the future".to_string(),
            ));
        }

        Ok(())
    }

    async fn check_duplicate_vin(&self, db: &DbPool, vin: &str) -> Result<(), ServiceError> {
        if self.allow_duplicate_vin {
            return Ok(());
        }

        let existing = WarrantyRegistration::find()
            .filter(warranty_registration::Column::Vin.eq(vin))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let blocking = existing.iter().any(|record| {
            record.review_state() != ReviewStatus::Declined || !self.allow_resubmit_after_decline
        });

        if blocking {
            return Err(ServiceError::ValidationError(format!(
                "VIN {} already has a warranty registration",
                vin
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Command for RegisterWarrantyCommand {
    type Result = warranty_registration::Model;

    #[instrument(skip(self, db_pool, event_sender))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate().map_err(|e| {
            WARRANTY_REGISTRATION_FAILURES.inc();
            let msg = format!("Invalid input: {}", e);
            error!("{}", msg);
            ServiceError::ValidationError(msg)
        })?;

        let vin = normalize_vin(&self.vin);
        let email = normalize_email(&self.customer_email);

        self.validate_domain(&vin).map_err(|e| {
            WARRANTY_REGISTRATION_FAILURES.inc();
            e
        })?;

        let db = db_pool.as_ref();
        self.check_duplicate_vin(db, &vin).await.map_err(|e| {
            WARRANTY_REGISTRATION_FAILURES.inc();
            e
        })?;

        let registration = warranty_registration::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_email: Set(email),
            customer_name: Set(self.customer_name.trim().to_string()),
            phone: Set(self.phone.clone()),
            vehicle_model_id: Set(self.vehicle_model_id),
            vehicle_model_name: Set(self.vehicle_model_name.clone()),
            vin: Set(vin),
            purchase_date: Set(self.purchase_date),
            period_years: Set(i16::from(self.period_years)),
            dealer_name: Set(self.dealer_name.trim().to_string()),
            invoice_ref: Set(self.invoice_ref.clone()),
            signature_ref: Set(self.signature_ref.clone()),
            review_status: Set(ReviewStatus::PendingReview.as_str().to_string()),
            decline_reason: Set(None),
            created_at: Set(Utc::now()),
            reviewed_at: Set(None),
            reviewed_by: Set(None),
        };

        let result = registration.insert(db).await.map_err(|e| {
            WARRANTY_REGISTRATION_FAILURES.inc();
            let msg = format!("Failed to register warranty: {}", e);
            error!("{}", msg);
            ServiceError::DatabaseError(e)
        })?;

        // On Postgres the outbox worker dispatches this event exactly once;
        // direct emission covers backends without an outbox. Delivery is
        // best-effort either way, the registration is already durable.
        if db.get_database_backend() != DbBackend::Postgres {
            if let Err(e) = event_sender.send(Event::WarrantyRegistered(result.id)).await {
                warn!(
                    registration_id = %result.id,
                    "Failed to send warranty registered event: {}",
                    e
                );
            }
        }

        info!(
            registration_id = %result.id,
            vin = %result.vin,
            dealer = %result.dealer_name,
            "Warranty registration submitted for review"
        );

        WARRANTY_REGISTRATIONS.inc();

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_command() -> RegisterWarrantyCommand {
        RegisterWarrantyCommand {
            customer_email: "rider@example.com".to_string(),
            customer_name: "Test Rider".to_string(),
            phone: Some("+31 6 1234 5678".to_string()),
            vehicle_model_id: Uuid::new_v4(),
            vehicle_model_name: "Volt S1".to_string(),
            vin: "vr5s1a2b3c4d5e6f7".to_string(),
            purchase_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            period_years: 2,
            dealer_name: "City Wheels".to_string(),
            invoice_ref: Some("INV-2024-0042".to_string()),
            signature_ref: None,
            allow_duplicate_vin: true,
            allow_resubmit_after_decline: true,
        }
    }

    #[test]
    fn valid_command_passes_validation() {
        assert!(valid_command().validate().is_ok());
    }

    #[test]
    fn invalid_email_is_rejected() {
        let mut cmd = valid_command();
        cmd.customer_email = "not-an-email".to_string();
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn period_outside_range_is_rejected() {
        let mut cmd = valid_command();
        cmd.period_years = 0;
        assert!(cmd.validate().is_err());

        cmd.period_years = 4;
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn malformed_vin_fails_domain_validation() {
        let cmd = valid_command();
        assert!(cmd.validate_domain("AB1").is_err());
        assert!(cmd.validate_domain("HAS SPACES IN IT").is_err());
        assert!(cmd.validate_domain("VR5S1A2B3C4D5E6F7").is_ok());
    }

    #[test]
    fn future_purchase_date_fails_domain_validation() {
        let mut cmd = valid_command();
        cmd.purchase_date = Utc::now().date_naive() + chrono::Duration::days(10);
        assert!(cmd.validate_domain("VR5S1A2B3C4D5E6F7").is_err());
    }
}
