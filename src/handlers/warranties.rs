use crate::{
    auth::AuthUser,
    commands::warranties::{
        ApproveWarrantyCommand, DeclineWarrantyCommand, RegisterWarrantyCommand,
    },
    coverage::{self, DisplayStatus},
    entities::warranty_registration::{self, ReviewStatus},
    errors::ServiceError,
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Extension, Path, Query, State},
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Default, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WarrantyListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Review-status filter: `pending_review`, `approved` or `declined`.
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[schema(example = json!({
    "id": "aa0e8400-e29b-41d4-a716-446655440000",
    "customer_email": "rider@example.com",
    "customer_name": "Sam Rider",
    "vehicle_model_name": "Volt S1",
    "vin": "VR5S1A2B3C4D5E6F7",
    "purchase_date": "2023-01-01",
    "period_years": 2,
    "dealer_name": "City Wheels",
    "review_status": "approved",
    "coverage_end": "2025-01-01",
    "display_status": {
        "core": "Active",
        "days_remaining": 220,
        "percent_remaining": 30,
        "label": "Active"
    }
}))]
pub struct WarrantyDetail {
    /// Registration UUID
    pub id: Uuid,
    pub customer_email: String,
    pub customer_name: String,
    pub phone: Option<String>,
    pub vehicle_model_id: Uuid,
    pub vehicle_model_name: String,
    /// Frame number, stored uppercase
    pub vin: String,
    pub purchase_date: NaiveDate,
    pub period_years: i16,
    pub dealer_name: String,
    pub invoice_ref: Option<String>,
    pub signature_ref: Option<String>,
    pub review_status: ReviewStatus,
    pub decline_reason: Option<String>,
    /// Last calendar day of coverage
    pub coverage_end: NaiveDate,
    /// Time-based status, computed at response time and never stored
    pub display_status: DisplayStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
}

impl WarrantyDetail {
    pub fn from_model(model: warranty_registration::Model, now: DateTime<Utc>) -> Self {
        let period_years = u8::try_from(model.period_years).unwrap_or(1);
        let review_status = model.review_state();
        let display_status =
            coverage::display_status(model.purchase_date, period_years, review_status, now);

        Self {
            id: model.id,
            customer_email: model.customer_email,
            customer_name: model.customer_name,
            phone: model.phone,
            vehicle_model_id: model.vehicle_model_id,
            vehicle_model_name: model.vehicle_model_name,
            vin: model.vin,
            purchase_date: model.purchase_date,
            period_years: model.period_years,
            dealer_name: model.dealer_name,
            invoice_ref: model.invoice_ref,
            signature_ref: model.signature_ref,
            review_status,
            decline_reason: model.decline_reason,
            coverage_end: coverage::coverage_end(model.purchase_date, period_years),
            display_status,
            created_at: model.created_at,
            reviewed_at: model.reviewed_at,
            reviewed_by: model.reviewed_by,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "customer_email": "rider@example.com",
    "customer_name": "Sam Rider",
    "phone": "+31 6 1234 5678",
    "vehicle_model_id": "550e8400-e29b-41d4-a716-446655440000",
    "vehicle_model_name": "Volt S1",
    "vin": "VR5S1A2B3C4D5E6F7",
    "purchase_date": "2024-03-01",
    "period_years": 2,
    "dealer_name": "City Wheels",
    "invoice_ref": "INV-2024-0042"
}))]
pub struct RegisterWarrantyRequest {
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(min = 1))]
    pub customer_name: String,
    pub phone: Option<String>,
    pub vehicle_model_id: Uuid,
    #[validate(length(min = 1))]
    pub vehicle_model_name: String,
    #[validate(length(min = 1))]
    pub vin: String,
    pub purchase_date: NaiveDate,
    #[validate(range(min = 1, max = 3))]
    pub period_years: u8,
    #[validate(length(min = 1))]
    pub dealer_name: String,
    pub invoice_ref: Option<String>,
    pub signature_ref: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "id": "aa0e8400-e29b-41d4-a716-446655440000",
    "review_status": "Approved",
    "notes": "Invoice and signature verified"
}))]
pub struct ReviewWarrantyRequest {
    /// Registration UUID under review
    pub id: Uuid,
    /// Decision: `"Approved"` or `"Declined"`, nothing else
    #[validate(length(min = 1))]
    pub review_status: String,
    /// Free-text reviewer notes; shown to the customer on decline
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewOutcome {
    pub record: WarrantyDetail,
    pub message: String,
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct DeclineWarrantyRequest {
    /// Shown to the customer in the decline notification
    pub reason: Option<String>,
}

fn reviewer_identity(user: &AuthUser) -> String {
    user.email
        .clone()
        .unwrap_or_else(|| user.user_id.clone())
}

fn parse_status_filter(raw: &str) -> Result<ReviewStatus, ServiceError> {
    raw.parse().map_err(|_| {
        ServiceError::ValidationError(format!(
            "Unknown review status filter '{}'; expected pending_review, approved or declined",
            raw
        ))
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/warranties",
    params(WarrantyListQuery),
    responses(
        (status = 200, description = "Warranty registrations listed", body = ApiResponse<PaginatedResponse<WarrantyDetail>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    tag = "warranties"
)]
pub async fn list_warranties(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<WarrantyListQuery>,
) -> ApiResult<PaginatedResponse<WarrantyDetail>> {
    if !user.is_admin() {
        return Err(ServiceError::Forbidden(
            "Only administrators can list all warranty registrations".to_string(),
        ));
    }

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let status = query
        .status
        .as_deref()
        .map(parse_status_filter)
        .transpose()?;

    let (records, total) = state
        .warranty_service()
        .list_warranties(page, limit, status)
        .await?;

    let now = Utc::now();
    let items: Vec<WarrantyDetail> = records
        .into_iter()
        .map(|record| WarrantyDetail::from_model(record, now))
        .collect();
    let total_pages = (total + limit - 1) / limit;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/warranties/{id}",
    params(
        ("id" = Uuid, Path, description = "Registration ID")
    ),
    responses(
        (status = 200, description = "Warranty registration fetched", body = ApiResponse<WarrantyDetail>),
        (status = 403, description = "Caller may not read registrations", body = crate::errors::ErrorResponse),
        (status = 404, description = "Registration not found", body = crate::errors::ErrorResponse)
    ),
    tag = "warranties"
)]
pub async fn get_warranty(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<WarrantyDetail> {
    // Registrations carry customer contact data; only the review and intake
    // roles may read them by id.
    if !(user.is_admin() || user.is_dealer()) {
        return Err(ServiceError::Forbidden(
            "Only administrators and dealers can view registrations".to_string(),
        ));
    }

    let record = state
        .warranty_service()
        .get_warranty(&id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Warranty registration {} not found", id))
        })?;

    // Dealers only see their own submissions.
    if user.is_dealer() && user.dealer_name.as_deref() != Some(record.dealer_name.as_str()) {
        return Err(ServiceError::Forbidden(
            "Registration belongs to another dealer".to_string(),
        ));
    }

    Ok(Json(ApiResponse::success(WarrantyDetail::from_model(
        record,
        Utc::now(),
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/warranties/dealer",
    responses(
        (status = 200, description = "Registrations submitted by the calling dealer", body = ApiResponse<Vec<WarrantyDetail>>),
        (status = 403, description = "Token carries no dealer name", body = crate::errors::ErrorResponse)
    ),
    tag = "warranties"
)]
pub async fn list_dealer_warranties(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<WarrantyDetail>> {
    let dealer_name = user.dealer_name.clone().ok_or_else(|| {
        ServiceError::Forbidden("Token does not identify a dealer".to_string())
    })?;

    let records = state
        .warranty_service()
        .list_by_dealer_name(&dealer_name)
        .await?;

    let now = Utc::now();
    Ok(Json(ApiResponse::success(
        records
            .into_iter()
            .map(|record| WarrantyDetail::from_model(record, now))
            .collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/warranties",
    request_body = RegisterWarrantyRequest,
    responses(
        (status = 200, description = "Registration submitted for review", body = ApiResponse<WarrantyDetail>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "warranties"
)]
pub async fn register_warranty(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<RegisterWarrantyRequest>,
) -> ApiResult<WarrantyDetail> {
    if !(user.is_dealer() || user.is_admin()) {
        return Err(ServiceError::Forbidden(
            "Only dealers and administrators can submit registrations".to_string(),
        ));
    }

    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    // A dealer token pins the submission to its own dealer name.
    let dealer_name = match (user.is_dealer(), user.dealer_name.clone()) {
        (true, Some(name)) => name,
        _ => payload.dealer_name.clone(),
    };

    let command = RegisterWarrantyCommand {
        customer_email: payload.customer_email.clone(),
        customer_name: payload.customer_name.clone(),
        phone: payload.phone.clone(),
        vehicle_model_id: payload.vehicle_model_id,
        vehicle_model_name: payload.vehicle_model_name.clone(),
        vin: payload.vin.clone(),
        purchase_date: payload.purchase_date,
        period_years: payload.period_years,
        dealer_name,
        invoice_ref: payload.invoice_ref.clone(),
        signature_ref: payload.signature_ref.clone(),
        allow_duplicate_vin: true,
        allow_resubmit_after_decline: true,
    };

    let created = state.warranty_service().register_warranty(command).await?;
    Ok(Json(ApiResponse::success(WarrantyDetail::from_model(
        created,
        Utc::now(),
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/warranties/review",
    request_body = ReviewWarrantyRequest,
    responses(
        (status = 200, description = "Review decision applied", body = ApiResponse<ReviewOutcome>),
        (status = 400, description = "Unknown review decision", body = crate::errors::ErrorResponse),
        (status = 404, description = "Registration not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Registration already reviewed", body = crate::errors::ErrorResponse)
    ),
    tag = "warranties"
)]
pub async fn review_warranty(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ReviewWarrantyRequest>,
) -> ApiResult<ReviewOutcome> {
    if !user.is_admin() {
        return Err(ServiceError::Forbidden(
            "Only administrators can review registrations".to_string(),
        ));
    }

    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let reviewed_by = reviewer_identity(&user);
    let (record, message) = match payload.review_status.as_str() {
        "Approved" => {
            let record = state
                .warranty_service()
                .approve_warranty(ApproveWarrantyCommand {
                    registration_id: payload.id,
                    reviewed_by,
                })
                .await?;
            let message = format!(
                "Warranty registration for VIN {} approved; coverage runs until {}",
                record.vin,
                coverage::coverage_end(
                    record.purchase_date,
                    u8::try_from(record.period_years).unwrap_or(1)
                )
            );
            (record, message)
        }
        "Declined" => {
            let record = state
                .warranty_service()
                .decline_warranty(DeclineWarrantyCommand {
                    registration_id: payload.id,
                    reviewed_by,
                    reason: payload.notes.clone(),
                })
                .await?;
            let message = format!("Warranty registration for VIN {} declined", record.vin);
            (record, message)
        }
        other => {
            return Err(ServiceError::ValidationError(format!(
                "Review status must be \"Approved\" or \"Declined\", got \"{}\"",
                other
            )));
        }
    };

    Ok(Json(ApiResponse::success(ReviewOutcome {
        record: WarrantyDetail::from_model(record, Utc::now()),
        message,
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/warranties/{id}/approve",
    params(
        ("id" = Uuid, Path, description = "Registration ID")
    ),
    responses(
        (status = 200, description = "Registration approved", body = ApiResponse<WarrantyDetail>),
        (status = 404, description = "Registration not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Registration already reviewed", body = crate::errors::ErrorResponse)
    ),
    tag = "warranties"
)]
pub async fn approve_warranty(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<WarrantyDetail> {
    if !user.is_admin() {
        return Err(ServiceError::Forbidden(
            "Only administrators can review registrations".to_string(),
        ));
    }

    let record = state
        .warranty_service()
        .approve_warranty(ApproveWarrantyCommand {
            registration_id: id,
            reviewed_by: reviewer_identity(&user),
        })
        .await?;

    Ok(Json(ApiResponse::success(WarrantyDetail::from_model(
        record,
        Utc::now(),
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/warranties/{id}/decline",
    request_body = DeclineWarrantyRequest,
    params(
        ("id" = Uuid, Path, description = "Registration ID")
    ),
    responses(
        (status = 200, description = "Registration declined", body = ApiResponse<WarrantyDetail>),
        (status = 404, description = "Registration not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Registration already reviewed", body = crate::errors::ErrorResponse)
    ),
    tag = "warranties"
)]
pub async fn decline_warranty(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeclineWarrantyRequest>,
) -> ApiResult<WarrantyDetail> {
    if !user.is_admin() {
        return Err(ServiceError::Forbidden(
            "Only administrators can review registrations".to_string(),
        ));
    }

    let record = state
        .warranty_service()
        .decline_warranty(DeclineWarrantyCommand {
            registration_id: id,
            reviewed_by: reviewer_identity(&user),
            reason: payload.reason.clone(),
        })
        .await?;

    Ok(Json(ApiResponse::success(WarrantyDetail::from_model(
        record,
        Utc::now(),
    ))))
}
