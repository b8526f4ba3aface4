//! Integration tests for the warranty registration and review workflow.
//!
//! Tests cover:
//! - Dealer registration intake and validation
//! - Admin review decisions (approve, decline, terminal-state enforcement)
//! - Public coverage lookup by VIN and email
//! - Role gating on each surface

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{body, http::Method, response::Response};
use common::TestApp;
use serde_json::{json, Value};
use tokio::{
    sync::mpsc,
    time::{timeout, Duration},
};
use voltride_warranty_api::{
    entities::ReviewStatus,
    notifications::{NotificationError, ReviewNotification, ReviewNotifier},
};

/// Notifier that forwards every dispatch onto a channel for assertions.
struct ChannelNotifier {
    tx: mpsc::UnboundedSender<ReviewNotification>,
}

#[async_trait]
impl ReviewNotifier for ChannelNotifier {
    async fn notify(&self, notification: &ReviewNotification) -> Result<(), NotificationError> {
        let _ = self.tx.send(notification.clone());
        Ok(())
    }
}

async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

fn registration_payload(vin: &str, email: &str) -> Value {
    json!({
        "customer_email": email,
        "customer_name": "Sam Rider",
        "phone": "+31 6 1234 5678",
        "vehicle_model_id": "550e8400-e29b-41d4-a716-446655440000",
        "vehicle_model_name": "Volt S1",
        "vin": vin,
        "purchase_date": "2023-01-01",
        "period_years": 2,
        "dealer_name": common::TEST_DEALER_NAME,
        "invoice_ref": "INV-2023-0001"
    })
}

async fn register(app: &TestApp, vin: &str, email: &str) -> String {
    let response = app
        .request_as_dealer(
            Method::POST,
            "/api/v1/warranties",
            Some(registration_payload(vin, email)),
        )
        .await;
    assert_eq!(response.status(), 200);

    let body = response_json(response).await;
    assert_eq!(body["data"]["review_status"], "pending_review");
    body["data"]["id"].as_str().expect("registration id").to_string()
}

// ==================== Registration Tests ====================

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn register_stores_normalized_vin_and_email() {
    let app = TestApp::new().await;

    let response = app
        .request_as_dealer(
            Method::POST,
            "/api/v1/warranties",
            Some(registration_payload("vr5s1a2b3c4d5e6f7", "Rider@Example.COM")),
        )
        .await;
    assert_eq!(response.status(), 200);

    let body = response_json(response).await;
    assert_eq!(body["data"]["vin"], "VR5S1A2B3C4D5E6F7");
    assert_eq!(body["data"]["customer_email"], "rider@example.com");
    assert_eq!(body["data"]["coverage_end"], "2025-01-01");
}

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn register_rejects_bad_period_and_vin() {
    let app = TestApp::new().await;

    let mut payload = registration_payload("VR5S1A2B3C4D5E6F7", "rider@example.com");
    payload["period_years"] = json!(4);
    let response = app
        .request_as_dealer(Method::POST, "/api/v1/warranties", Some(payload))
        .await;
    assert_eq!(response.status(), 400);

    let response = app
        .request_as_dealer(
            Method::POST,
            "/api/v1/warranties",
            Some(registration_payload("BAD VIN!", "rider@example.com")),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn register_requires_dealer_or_admin() {
    let app = TestApp::new().await;
    let payload = registration_payload("VR5S1A2B3C4D5E6F7", "rider@example.com");

    let response = app
        .request(Method::POST, "/api/v1/warranties", Some(payload.clone()), None)
        .await;
    assert_eq!(response.status(), 401);

    let response = app
        .request(
            Method::POST,
            "/api/v1/warranties",
            Some(payload),
            Some(app.customer_token()),
        )
        .await;
    assert_eq!(response.status(), 403);
}

// ==================== Review Workflow Tests ====================

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn approve_then_public_lookup_flow() {
    let app = TestApp::new().await;
    let id = register(&app, "VR5S1A2B3C4D5E6F7", "rider@example.com").await;

    let response = app
        .request_as_admin(
            Method::POST,
            "/api/v1/warranties/review",
            Some(json!({
                "id": id,
                "review_status": "Approved",
                "notes": "Invoice and signature verified"
            })),
        )
        .await;
    assert_eq!(response.status(), 200);

    let body = response_json(response).await;
    assert_eq!(body["data"]["record"]["review_status"], "approved");
    assert_eq!(
        body["data"]["record"]["reviewed_by"],
        "ops@voltride.example"
    );
    assert!(body["data"]["message"]
        .as_str()
        .unwrap()
        .contains("approved"));

    // Public lookup sees the approved record, with a case-changed VIN.
    let response = app
        .request(
            Method::GET,
            "/api/v1/warranty-lookup/vin/vr5s1a2b3c4d5e6f7",
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    let entry = &body["data"][0];
    assert_eq!(entry["expiry_date"], "2025-01-01");
    assert_eq!(entry["is_expired"], true);
    assert_eq!(entry["status"], "Expired");
    assert_eq!(entry["days_remaining"], 0);

    // Email lookup, case-insensitive as well.
    let response = app
        .request(
            Method::GET,
            "/api/v1/warranty-lookup/email/Rider@Example.COM",
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn decline_is_terminal() {
    let app = TestApp::new().await;
    let id = register(&app, "VR5S1B2C3D4E5F6G7", "decline@example.com").await;

    let response = app
        .request_as_admin(
            Method::POST,
            "/api/v1/warranties/review",
            Some(json!({
                "id": id,
                "review_status": "Declined",
                "notes": "documents illegible"
            })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["record"]["review_status"], "declined");
    assert_eq!(body["data"]["record"]["decline_reason"], "documents illegible");

    // A second transition on the same record loses with a conflict.
    let response = app
        .request_as_admin(
            Method::POST,
            &format!("/api/v1/warranties/{}/approve", id),
            None,
        )
        .await;
    assert_eq!(response.status(), 409);

    // Declined records never surface in the public lookup.
    let response = app
        .request(
            Method::GET,
            "/api/v1/warranty-lookup/vin/VR5S1B2C3D4E5F6G7",
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn review_rejects_unknown_decision() {
    let app = TestApp::new().await;
    let id = register(&app, "VR5S1C2D3E4F5G6H7", "contract@example.com").await;

    let response = app
        .request_as_admin(
            Method::POST,
            "/api/v1/warranties/review",
            Some(json!({
                "id": id,
                "review_status": "Rejected"
            })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn review_is_admin_only() {
    let app = TestApp::new().await;
    let id = register(&app, "VR5S1D2E3F4G5H6I7", "gating@example.com").await;

    let response = app
        .request_as_dealer(
            Method::POST,
            "/api/v1/warranties/review",
            Some(json!({
                "id": id,
                "review_status": "Approved"
            })),
        )
        .await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn review_missing_record_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request_as_admin(
            Method::POST,
            "/api/v1/warranties/00000000-0000-0000-0000-000000000000/approve",
            None,
        )
        .await;
    assert_eq!(response.status(), 404);
}

// ==================== Listing and Lookup Tests ====================

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn admin_list_filters_by_review_status() {
    let app = TestApp::new().await;
    let pending = register(&app, "VR5S1E2F3G4H5I6J7", "one@example.com").await;
    let approved = register(&app, "VR5S1F2G3H4I5J6K7", "two@example.com").await;

    let response = app
        .request_as_admin(
            Method::POST,
            &format!("/api/v1/warranties/{}/approve", approved),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);

    let response = app
        .request_as_admin(
            Method::GET,
            "/api/v1/warranties?status=pending_review",
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], pending.as_str());

    // Dealer tokens cannot list everything.
    let response = app
        .request_as_dealer(Method::GET, "/api/v1/warranties", None)
        .await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn dealer_sees_only_own_registrations() {
    let app = TestApp::new().await;
    let id = register(&app, "VR5S1G2H3I4J5K6L7", "dealer@example.com").await;

    let response = app
        .request_as_dealer(Method::GET, "/api/v1/warranties/dealer", None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    let items = body["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], id.as_str());
    assert_eq!(items[0]["dealer_name"], common::TEST_DEALER_NAME);
}

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn warranty_detail_is_hidden_from_customer_tokens() {
    let app = TestApp::new().await;
    let id = register(&app, "VR5S1I2J3K4L5M6N7", "private@example.com").await;
    let uri = format!("/api/v1/warranties/{}", id);

    let response = app
        .request(Method::GET, &uri, None, Some(app.customer_token()))
        .await;
    assert_eq!(response.status(), 403);

    // The intake and review roles keep their read access.
    let response = app.request_as_dealer(Method::GET, &uri, None).await;
    assert_eq!(response.status(), 200);
    let response = app.request_as_admin(Method::GET, &uri, None).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn review_sends_exactly_one_customer_notification() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let app = TestApp::with_notifier(Some(Arc::new(ChannelNotifier { tx }))).await;
    let id = register(&app, "VR5S1J2K3L4M5N6O7", "notify@example.com").await;

    let response = app
        .request_as_admin(
            Method::POST,
            &format!("/api/v1/warranties/{}/approve", id),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);

    let note = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("notification dispatched")
        .expect("notifier channel open");
    assert_eq!(note.registration_id.to_string(), id);
    assert_eq!(note.new_status, ReviewStatus::Approved);
    assert_eq!(note.customer_email, "notify@example.com");

    // One transition, one notification.
    assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
}

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn decline_notification_carries_the_reason() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let app = TestApp::with_notifier(Some(Arc::new(ChannelNotifier { tx }))).await;
    let id = register(&app, "VR5S1L2M3N4O5P6Q7", "reason@example.com").await;

    let response = app
        .request_as_admin(
            Method::POST,
            "/api/v1/warranties/review",
            Some(json!({
                "id": id,
                "review_status": "Declined",
                "notes": "documents illegible"
            })),
        )
        .await;
    assert_eq!(response.status(), 200);

    let note = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("notification dispatched")
        .expect("notifier channel open");
    assert_eq!(note.new_status, ReviewStatus::Declined);
    assert_eq!(note.reason.as_deref(), Some("documents illegible"));
    assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
}

#[tokio::test]
#[ignore = "requires SQLite and Redis integration environment"]
async fn pending_record_is_invisible_to_public_lookup() {
    let app = TestApp::new().await;
    let _id = register(&app, "VR5S1H2I3J4K5L6M7", "hidden@example.com").await;

    let response = app
        .request(
            Method::GET,
            "/api/v1/warranty-lookup/vin/VR5S1H2I3J4K5L6M7",
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), 404);

    let response = app
        .request(
            Method::GET,
            "/api/v1/warranty-lookup/email/hidden@example.com",
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), 404);
}
