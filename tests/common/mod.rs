use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    middleware, Router,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;
use voltride_warranty_api::{
    auth::{AuthVerifier, ROLE_ADMIN, ROLE_CUSTOMER, ROLE_DEALER},
    config::AppConfig,
    db, events,
    handlers::AppServices,
    logging,
    notifications::ReviewNotifier,
    AppState,
};

pub const TEST_DEALER_NAME: &str = "City Wheels";

/// Helper harness for spinning up an application state backed by a file
/// SQLite database. Each instance gets its own database file so tests can
/// run in parallel.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    admin_token: String,
    dealer_token: String,
    customer_token: String,
    db_file: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_notifier(None).await
    }

    /// Same as `new`, but wires a review notifier into the event loop so
    /// tests can observe customer notification dispatch.
    pub async fn with_notifier(notifier: Option<Arc<dyn ReviewNotifier>>) -> Self {
        let db_file = format!("voltride_test_{}.db", Uuid::new_v4().simple());
        let _ = std::fs::remove_file(&db_file);

        let cfg = AppConfig {
            database_url: format!("sqlite://{db_file}?mode=rwc"),
            redis_url: "redis://127.0.0.1:6379".into(),
            jwt_secret:
                "an_extremely_long_and_random_test_secret_value_0123456789_abcdefghijklmnop".into(),
            jwt_expiration: 3600,
            host: "127.0.0.1".into(),
            port: 18_080,
            environment: "test".into(),
            log_level: "info".into(),
            log_json: false,
            auto_migrate: true,
            cors_allowed_origins: None,
            cors_allow_any_origin: true,
            db_max_connections: 1,
            db_min_connections: 1,
            db_connect_timeout_secs: 30,
            db_idle_timeout_secs: 600,
            db_acquire_timeout_secs: 8,
            event_channel_capacity: 256,
            auth_issuer: "voltride-warranty-api".into(),
            auth_audience: "voltride-auth".into(),
            allow_duplicate_vin: true,
            allow_resubmit_after_decline: true,
        };

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
        let event_sender = events::EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx, notifier));

        let redis_client = Arc::new(
            redis::Client::open(cfg.redis_url.clone()).expect("invalid redis url for tests"),
        );

        let verifier = Arc::new(AuthVerifier::from_app_config(&cfg));
        let admin_token = verifier
            .issue_token(
                "admin-user",
                Some("Ops Admin".to_string()),
                Some("ops@voltride.example".to_string()),
                ROLE_ADMIN,
                None,
            )
            .expect("mint admin token");
        let dealer_token = verifier
            .issue_token(
                "dealer-user",
                Some("Dealer Desk".to_string()),
                Some("desk@citywheels.example".to_string()),
                ROLE_DEALER,
                Some(TEST_DEALER_NAME.to_string()),
            )
            .expect("mint dealer token");
        let customer_token = verifier
            .issue_token(
                "customer-user",
                Some("Sam Rider".to_string()),
                Some("rider@example.com".to_string()),
                ROLE_CUSTOMER,
                None,
            )
            .expect("mint customer token");

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            redis_client.clone(),
            logging::discard_logger(),
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: cfg.clone(),
            event_sender,
            services,
            redis: redis_client,
        };

        let api_router =
            voltride_warranty_api::api_v1_routes().layer(middleware::from_fn_with_state(
                verifier.clone(),
                |axum::extract::State(verifier): axum::extract::State<Arc<AuthVerifier>>,
                 mut req: Request<Body>,
                 next: axum::middleware::Next| async move {
                    req.extensions_mut().insert(verifier);
                    next.run(req).await
                },
            ));

        let router = Router::new()
            .nest("/api/v1", api_router)
            .with_state(state.clone());

        Self {
            router,
            state,
            admin_token,
            dealer_token,
            customer_token,
            db_file,
            _event_task: event_task,
        }
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    pub fn dealer_token(&self) -> &str {
        &self.dealer_token
    }

    #[allow(dead_code)]
    pub fn customer_token(&self) -> &str {
        &self.customer_token
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for admin JSON requests.
    pub async fn request_as_admin(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.admin_token()))
            .await
    }

    /// Convenience helper for dealer JSON requests.
    pub async fn request_as_dealer(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.dealer_token()))
            .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
        let _ = std::fs::remove_file(&self.db_file);
    }
}
