use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{entity::prelude::*, ActiveValue::Set};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Workflow state of a warranty registration, independent of time.
///
/// `PendingReview` is the only non-terminal state; a record that has been
/// approved or declined is never reviewed again.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    PendingReview,
    Approved,
    Declined,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::PendingReview => "pending_review",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Declined => "declined",
        }
    }

    /// Human-readable form used as the display label for unapproved records.
    pub fn label(&self) -> &'static str {
        match self {
            ReviewStatus::PendingReview => "Pending Review",
            ReviewStatus::Approved => "Approved",
            ReviewStatus::Declined => "Declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReviewStatus::PendingReview)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "warranty_registrations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_email: String,
    pub customer_name: String,
    pub phone: Option<String>,
    pub vehicle_model_id: Uuid,
    pub vehicle_model_name: String,
    pub vin: String,
    pub purchase_date: NaiveDate,
    pub period_years: i16,
    pub dealer_name: String,
    pub invoice_ref: Option<String>,
    pub signature_ref: Option<String>,
    pub review_status: String,
    pub decline_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
}

impl Model {
    /// Parses the stored review status string into the typed state.
    ///
    /// An unrecognized value means the row predates this schema or was
    /// written outside the service; treat it as pending so it surfaces in
    /// the review queue rather than leaking to public lookups.
    pub fn review_state(&self) -> ReviewStatus {
        self.review_status
            .parse()
            .unwrap_or(ReviewStatus::PendingReview)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            active_model.created_at = Set(Utc::now());
        }

        Ok(active_model)
    }
}

/// Uppercases a VIN for storage and lookup. VIN matching is
/// case-insensitive by normalizing at every write and query site.
pub fn normalize_vin(vin: &str) -> String {
    vin.trim().to_ascii_uppercase()
}

/// Lowercases a customer email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_status_round_trips_through_storage_strings() {
        for status in [
            ReviewStatus::PendingReview,
            ReviewStatus::Approved,
            ReviewStatus::Declined,
        ] {
            let parsed: ReviewStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!ReviewStatus::PendingReview.is_terminal());
        assert!(ReviewStatus::Approved.is_terminal());
        assert!(ReviewStatus::Declined.is_terminal());
    }

    #[test]
    fn vin_normalization_is_case_insensitive() {
        assert_eq!(normalize_vin("abc123xy"), "ABC123XY");
        assert_eq!(normalize_vin(" abc123xy "), "ABC123XY");
        assert_eq!(normalize_vin("ABC123XY"), normalize_vin("abc123xy"));
    }

    #[test]
    fn email_normalization_lowercases() {
        assert_eq!(normalize_email("Rider@Example.COM"), "rider@example.com");
    }

    #[test]
    fn unknown_review_status_falls_back_to_pending() {
        let model = Model {
            id: Uuid::new_v4(),
            customer_email: "rider@example.com".into(),
            customer_name: "Test Rider".into(),
            phone: None,
            vehicle_model_id: Uuid::new_v4(),
            vehicle_model_name: "Volt S1".into(),
            vin: "VIN00001".into(),
            purchase_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            period_years: 2,
            dealer_name: "City Wheels".into(),
            invoice_ref: None,
            signature_ref: None,
            review_status: "garbage".into(),
            decline_reason: None,
            created_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
        };
        assert_eq!(model.review_state(), ReviewStatus::PendingReview);
    }
}
