use axum::{response::Json, routing::get, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "VoltRide Warranty API",
        version = "1.0.0",
        description = r#"
# VoltRide Warranty API

Backend for the warranty lifecycle of VoltRide electric scooters: dealer
warranty registrations, the admin review workflow, time-based coverage
status, and public coverage lookup for customers.

## Authentication

Dealer and admin endpoints require a Bearer JWT in the Authorization
header. The public lookup endpoints are unauthenticated.

```
Authorization: Bearer <your-jwt-token>
```

## Review workflow

A registration starts in `pending_review`. An administrator approves or
declines it exactly once; both outcomes are terminal. Coverage status
(Active / Expiring Soon / Expired) is computed from the purchase date and
warranty period at response time and never stored.
        "#,
        contact(
            name = "VoltRide Engineering",
            email = "engineering@voltride.example"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "warranties", description = "Registration intake and review workflow"),
        (name = "warranty-lookup", description = "Public coverage lookup")
    ),
    paths(
        crate::handlers::warranties::list_warranties,
        crate::handlers::warranties::get_warranty,
        crate::handlers::warranties::list_dealer_warranties,
        crate::handlers::warranties::register_warranty,
        crate::handlers::warranties::review_warranty,
        crate::handlers::warranties::approve_warranty,
        crate::handlers::warranties::decline_warranty,
        crate::handlers::lookup::lookup_by_vin,
        crate::handlers::lookup::lookup_by_email,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::handlers::warranties::WarrantyDetail,
            crate::handlers::warranties::WarrantyListQuery,
            crate::handlers::warranties::RegisterWarrantyRequest,
            crate::handlers::warranties::ReviewWarrantyRequest,
            crate::handlers::warranties::ReviewOutcome,
            crate::handlers::warranties::DeclineWarrantyRequest,
            crate::handlers::lookup::WarrantyLookupEntry,
            crate::coverage::CoverageStatus,
            crate::coverage::DisplayStatus,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI document at `/api-docs/openapi.json`.
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_warranty_path() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.contains("/api/v1/warranties")));
        assert!(paths
            .iter()
            .any(|p| p.contains("/api/v1/warranty-lookup/vin")));
        assert!(paths
            .iter()
            .any(|p| p.contains("/api/v1/warranty-lookup/email")));
    }
}
