use std::{net::SocketAddr, sync::Arc};

use axum::response::IntoResponse;
use http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
};
use tracing::{error, info, warn};

use voltride_warranty_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init Redis client (construction only; connection checked in health)
    let redis_client = Arc::new(redis::Client::open(cfg.redis_url.clone())?);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = api::events::EventSender::new(event_tx);

    // Review-outcome notifier over the Redis queue; the service degrades to
    // log-only when the queue client cannot be constructed.
    let base_logger = api::logging::setup_logger(api::logging::LoggerConfig::default());
    let notifier: Option<Arc<dyn api::notifications::ReviewNotifier>> =
        match api::notifications::RedisReviewNotifier::new(
            &cfg.redis_url,
            base_logger.new(slog::o!("component" => "review_notifier")),
        ) {
            Ok(notifier) => Some(Arc::new(notifier)),
            Err(err) => {
                warn!("Review notifier disabled: {}", err);
                None
            }
        };

    tokio::spawn(api::events::process_events(event_rx, notifier));

    // Start outbox worker (best-effort, no-op on non-Postgres backends)
    api::events::outbox::start_worker(db_arc.clone(), event_sender.clone()).await;

    // Token verification shared with the auth middleware
    let auth_verifier = Arc::new(api::auth::AuthVerifier::from_app_config(&cfg));

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::new(
        db_arc.clone(),
        Arc::new(event_sender.clone()),
        redis_client.clone(),
        base_logger,
        &cfg,
    );

    let app_state = api::AppState {
        db: db_arc.clone(),
        config: cfg.clone(),
        event_sender,
        services,
        redis: redis_client.clone(),
    };

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    } else {
        error!("Missing CORS configuration detected; set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
        return Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true".into());
    };

    // Build router: root + metrics + full v1 API + OpenAPI document
    let app = axum::Router::<api::AppState>::new()
        .route(
            "/",
            axum::routing::get(|| async { "voltride-warranty-api up" }),
        )
        .route(
            "/metrics",
            axum::routing::get(|| async move {
                match api::metrics::metrics_handler().await {
                    Ok(body) => (http::StatusCode::OK, body),
                    Err(_) => (
                        http::StatusCode::INTERNAL_SERVER_ERROR,
                        String::from("metrics error"),
                    ),
                }
            }),
        )
        .route(
            "/metrics/json",
            axum::routing::get(|| async move {
                match api::metrics::metrics_json_handler().await {
                    Ok(doc) => (http::StatusCode::OK, axum::Json(doc)).into_response(),
                    Err(_) => (
                        http::StatusCode::INTERNAL_SERVER_ERROR,
                        String::from("metrics error"),
                    )
                        .into_response(),
                }
            }),
        )
        .nest("/api/v1", api::api_v1_routes())
        .merge(api::openapi::openapi_routes())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(api::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        // Inject the token verifier into request extensions for auth middleware
        .layer(axum::middleware::from_fn_with_state(
            auth_verifier.clone(),
            |axum::extract::State(verifier): axum::extract::State<Arc<api::auth::AuthVerifier>>,
             mut req: axum::http::Request<axum::body::Body>,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(verifier);
                next.run(req).await
            },
        ))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            api::tracing::request_id_middleware,
        ))
        .with_state(app_state);

    // Bind and serve
    let addr = SocketAddr::new(cfg.host.parse()?, cfg.port);
    info!("voltride-warranty-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
