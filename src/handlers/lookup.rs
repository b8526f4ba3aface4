//! Public warranty lookup, no authentication. Customers check coverage by
//! frame number or the email used at registration. Only approved records
//! are visible here; pending and declined submissions stay private.

use crate::{
    coverage::{self, CoverageStatus},
    entities::warranty_registration::{self, ReviewStatus},
    errors::ServiceError,
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
#[schema(example = json!({
    "id": "aa0e8400-e29b-41d4-a716-446655440000",
    "vehicle_model_name": "Volt S1",
    "vin": "VR5S1A2B3C4D5E6F7",
    "purchase_date": "2023-01-01",
    "period_years": 2,
    "expiry_date": "2025-01-01",
    "is_expired": false,
    "days_remaining": 220,
    "status": "Active"
}))]
pub struct WarrantyLookupEntry {
    pub id: Uuid,
    pub vehicle_model_name: String,
    pub vin: String,
    pub purchase_date: NaiveDate,
    pub period_years: i16,
    /// Last calendar day of coverage, ISO-8601
    pub expiry_date: NaiveDate,
    pub is_expired: bool,
    pub days_remaining: u32,
    /// `"Active"` or `"Expired"`
    pub status: String,
}

impl WarrantyLookupEntry {
    fn from_model(model: warranty_registration::Model, now: DateTime<Utc>) -> Self {
        let period_years = u8::try_from(model.period_years).unwrap_or(1);
        let is_expired =
            coverage::core_status(model.purchase_date, period_years, now) == CoverageStatus::Expired;

        Self {
            id: model.id,
            vehicle_model_name: model.vehicle_model_name,
            vin: model.vin,
            purchase_date: model.purchase_date,
            period_years: model.period_years,
            expiry_date: coverage::coverage_end(model.purchase_date, period_years),
            is_expired,
            days_remaining: coverage::days_remaining(model.purchase_date, period_years, now),
            status: if is_expired { "Expired" } else { "Active" }.to_string(),
        }
    }
}

fn approved_only(
    records: Vec<warranty_registration::Model>,
    now: DateTime<Utc>,
    not_found: String,
) -> Result<Vec<WarrantyLookupEntry>, ServiceError> {
    let entries: Vec<WarrantyLookupEntry> = records
        .into_iter()
        .filter(|record| record.review_state() == ReviewStatus::Approved)
        .map(|record| WarrantyLookupEntry::from_model(record, now))
        .collect();

    if entries.is_empty() {
        // Never an empty 200; absence and non-approval look the same.
        return Err(ServiceError::NotFound(not_found));
    }
    Ok(entries)
}

#[utoipa::path(
    get,
    path = "/api/v1/warranty-lookup/vin/{vin}",
    params(
        ("vin" = String, Path, description = "Frame number, matched case-insensitively")
    ),
    responses(
        (status = 200, description = "Approved warranties for the VIN", body = ApiResponse<Vec<WarrantyLookupEntry>>),
        (status = 404, description = "No approved warranty for the VIN", body = crate::errors::ErrorResponse)
    ),
    tag = "warranty-lookup"
)]
pub async fn lookup_by_vin(
    State(state): State<AppState>,
    Path(vin): Path<String>,
) -> ApiResult<Vec<WarrantyLookupEntry>> {
    let records = state.warranty_service().list_by_vin(&vin).await?;
    let entries = approved_only(
        records,
        Utc::now(),
        format!("No approved warranty found for VIN {}", vin),
    )?;
    Ok(Json(ApiResponse::success(entries)))
}

#[utoipa::path(
    get,
    path = "/api/v1/warranty-lookup/email/{email}",
    params(
        ("email" = String, Path, description = "Customer email, matched case-insensitively")
    ),
    responses(
        (status = 200, description = "Approved warranties for the email", body = ApiResponse<Vec<WarrantyLookupEntry>>),
        (status = 404, description = "No approved warranty for the email", body = crate::errors::ErrorResponse)
    ),
    tag = "warranty-lookup"
)]
pub async fn lookup_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<Vec<WarrantyLookupEntry>> {
    let records = state.warranty_service().list_by_customer_email(&email).await?;
    let entries = approved_only(
        records,
        Utc::now(),
        "No approved warranty found for that email".to_string(),
    )?;
    Ok(Json(ApiResponse::success(entries)))
}
