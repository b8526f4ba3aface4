pub mod lookup;
pub mod warranties;

use crate::db::DbPool;
use crate::events::EventSender;
use slog::Logger;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub warranties: Arc<crate::services::warranties::WarrantyService>,
}

impl AppServices {
    /// Builds the service container used by the HTTP layer.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        redis_client: Arc<redis::Client>,
        base_logger: Logger,
        config: &crate::config::AppConfig,
    ) -> Self {
        let warranties_logger = base_logger.new(slog::o!("component" => "warranty_service"));
        let warranties = Arc::new(
            crate::services::warranties::WarrantyService::new(
                db_pool,
                event_sender,
                redis_client,
                warranties_logger,
            )
            .with_vin_policy(
                config.allow_duplicate_vin,
                config.allow_resubmit_after_decline,
            ),
        );

        Self { warranties }
    }
}
