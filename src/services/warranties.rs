use crate::{
    commands::warranties::{ApproveWarrantyCommand, DeclineWarrantyCommand, RegisterWarrantyCommand},
    commands::Command,
    db::DbPool,
    entities::warranty_registration::{
        self, normalize_email, normalize_vin, Entity as WarrantyRegistration, ReviewStatus,
    },
    errors::ServiceError,
    events::EventSender,
};
use redis::Client as RedisClient;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use slog::{info, Logger};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Service for the warranty registration lifecycle: intake, review, lookup.
#[derive(Clone)]
pub struct WarrantyService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    #[allow(dead_code)]
    redis_client: Arc<RedisClient>,
    logger: Logger,
    allow_duplicate_vin: bool,
    allow_resubmit_after_decline: bool,
}

impl WarrantyService {
    /// Creates a new warranty service instance
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        redis_client: Arc<RedisClient>,
        logger: Logger,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            redis_client,
            logger,
            allow_duplicate_vin: true,
            allow_resubmit_after_decline: true,
        }
    }

    /// Overrides the duplicate-VIN intake policy from application config.
    pub fn with_vin_policy(mut self, allow_duplicate: bool, allow_resubmit: bool) -> Self {
        self.allow_duplicate_vin = allow_duplicate;
        self.allow_resubmit_after_decline = allow_resubmit;
        self
    }

    /// Submits a new warranty registration; it starts in pending review.
    #[instrument(skip(self, command))]
    pub async fn register_warranty(
        &self,
        mut command: RegisterWarrantyCommand,
    ) -> Result<warranty_registration::Model, ServiceError> {
        command.allow_duplicate_vin = self.allow_duplicate_vin;
        command.allow_resubmit_after_decline = self.allow_resubmit_after_decline;
        let result = command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await?;

        let payload = serde_json::json!({ "registration_id": result.id.to_string() });
        let _ = crate::events::outbox::enqueue(
            &*self.db_pool,
            "warranty_registration",
            Some(result.id),
            "WarrantyRegistered",
            &payload,
        )
        .await;

        info!(self.logger, "Warranty registration submitted";
            "registration_id" => %result.id,
            "vin" => &result.vin,
        );
        Ok(result)
    }

    /// Approves a pending registration.
    #[instrument(skip(self))]
    pub async fn approve_warranty(
        &self,
        command: ApproveWarrantyCommand,
    ) -> Result<warranty_registration::Model, ServiceError> {
        let result = command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await?;

        let payload = serde_json::json!({
            "registration_id": result.id.to_string(),
            "customer_email": result.customer_email,
        });
        let _ = crate::events::outbox::enqueue(
            &*self.db_pool,
            "warranty_registration",
            Some(result.id),
            "WarrantyApproved",
            &payload,
        )
        .await;

        info!(self.logger, "Warranty registration approved";
            "registration_id" => %result.id,
        );
        Ok(result)
    }

    /// Declines a pending registration.
    #[instrument(skip(self))]
    pub async fn decline_warranty(
        &self,
        command: DeclineWarrantyCommand,
    ) -> Result<warranty_registration::Model, ServiceError> {
        let reason = command.reason.clone();
        let result = command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await?;

        let payload = serde_json::json!({
            "registration_id": result.id.to_string(),
            "customer_email": result.customer_email,
            "reason": reason,
        });
        let _ = crate::events::outbox::enqueue(
            &*self.db_pool,
            "warranty_registration",
            Some(result.id),
            "WarrantyDeclined",
            &payload,
        )
        .await;

        info!(self.logger, "Warranty registration declined";
            "registration_id" => %result.id,
        );
        Ok(result)
    }

    /// Gets a registration by ID
    #[instrument(skip(self))]
    pub async fn get_warranty(
        &self,
        registration_id: &Uuid,
    ) -> Result<Option<warranty_registration::Model>, ServiceError> {
        let db = self.db_pool.as_ref();
        let record = WarrantyRegistration::find_by_id(*registration_id)
            .one(db)
            .await?;
        Ok(record)
    }

    /// Lists registrations, newest first, optionally filtered by review
    /// status. Returns the page and the total row count.
    #[instrument(skip(self))]
    pub async fn list_warranties(
        &self,
        page: u64,
        limit: u64,
        status: Option<ReviewStatus>,
    ) -> Result<(Vec<warranty_registration::Model>, u64), ServiceError> {
        let db = self.db_pool.as_ref();
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let mut query = WarrantyRegistration::find()
            .order_by_desc(warranty_registration::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(warranty_registration::Column::ReviewStatus.eq(status.as_str()));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator.num_items().await?;
        let records = paginator.fetch_page(page - 1).await?;
        Ok((records, total))
    }

    /// All registrations submitted by one dealer, newest first.
    #[instrument(skip(self))]
    pub async fn list_by_dealer_name(
        &self,
        dealer_name: &str,
    ) -> Result<Vec<warranty_registration::Model>, ServiceError> {
        let db = self.db_pool.as_ref();
        let records = WarrantyRegistration::find()
            .filter(warranty_registration::Column::DealerName.eq(dealer_name))
            .order_by_desc(warranty_registration::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(records)
    }

    /// Registrations for a VIN. The stored VIN is normalized, so the lookup
    /// is case-insensitive by construction.
    #[instrument(skip(self))]
    pub async fn list_by_vin(
        &self,
        vin: &str,
    ) -> Result<Vec<warranty_registration::Model>, ServiceError> {
        let db = self.db_pool.as_ref();
        let records = WarrantyRegistration::find()
            .filter(warranty_registration::Column::Vin.eq(normalize_vin(vin)))
            .order_by_desc(warranty_registration::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(records)
    }

    /// Registrations for a customer email, matched case-insensitively.
    #[instrument(skip(self))]
    pub async fn list_by_customer_email(
        &self,
        email: &str,
    ) -> Result<Vec<warranty_registration::Model>, ServiceError> {
        let db = self.db_pool.as_ref();
        let records = WarrantyRegistration::find()
            .filter(warranty_registration::Column::CustomerEmail.eq(normalize_email(email)))
            .order_by_desc(warranty_registration::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(records)
    }
}
