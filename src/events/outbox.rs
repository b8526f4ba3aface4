use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, QueryResult, Statement};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Enqueue a domain event into the outbox table. Use inside the same
/// transaction as your write so the event survives a crash between the
/// commit and the dispatch.
pub async fn enqueue(
    db: &impl ConnectionTrait,
    aggregate_type: &str,
    aggregate_id: Option<Uuid>,
    event_type: &str,
    payload: &Value,
) -> Result<(), ServiceError> {
    if db.get_database_backend() != DbBackend::Postgres {
        debug!(
            "outbox enqueue skipped for non-Postgres backend (aggregate_type={}, event_type={})",
            aggregate_type, event_type
        );
        return Ok(());
    }

    let id = Uuid::new_v4();
    let sql = r#"INSERT INTO outbox_events
        (id, aggregate_type, aggregate_id, event_type, payload, status, attempts, created_at)
        VALUES ($1, $2, $3, $4, $5::jsonb, 'pending', 0, NOW())"#;
    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        sql,
        vec![
            id.into(),
            aggregate_type.into(),
            aggregate_id.map(|v| v.into()).unwrap_or(Value::Null.into()),
            event_type.into(),
            payload.clone().into(),
        ],
    );
    db.execute(stmt).await.map_err(ServiceError::DatabaseError)?;
    info!(
        "enqueued outbox event {} type={} agg={}",
        id, event_type, aggregate_type
    );
    Ok(())
}

/// Background worker to poll and dispatch outbox events via the in-process
/// EventSender. A no-op on non-Postgres backends, where commands emit events
/// directly.
pub async fn start_worker(db: Arc<DatabaseConnection>, sender: EventSender) {
    if db.get_database_backend() != DbBackend::Postgres {
        info!(
            "Outbox worker disabled for {:?} backend; relying on direct event emission",
            db.get_database_backend()
        );
        return;
    }

    tokio::spawn(async move {
        loop {
            if let Err(e) = drain_once(&db, &sender, 50).await {
                error!("outbox worker error: {}", e);
            }
            sleep(Duration::from_millis(500)).await;
        }
    });
}

async fn drain_once(
    db: &DatabaseConnection,
    sender: &EventSender,
    batch_size: i64,
) -> Result<(), ServiceError> {
    const MAX_ATTEMPTS: i32 = 8;
    const BASE_BACKOFF_SECS: u64 = 2; // exponential backoff base

    // Claim a batch and mark it processing (advisory lock-like behavior)
    let sql_claim = r#"
        WITH cte AS (
            SELECT id FROM outbox_events
            WHERE status = 'pending' AND available_at <= NOW()
            ORDER BY created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT $1
        )
        UPDATE outbox_events o
        SET status = 'processing', updated_at = NOW(), attempts = o.attempts + 1
        FROM cte
        WHERE o.id = cte.id
        RETURNING o.id, o.event_type, o.payload
    "#;
    let stmt =
        Statement::from_sql_and_values(DbBackend::Postgres, sql_claim, vec![batch_size.into()]);
    let rows: Vec<QueryResult> = db
        .query_all(stmt)
        .await
        .map_err(ServiceError::DatabaseError)?;

    for row in rows {
        let id: Uuid = row.try_get("", "id").unwrap_or_default();
        let et: String = row.try_get("", "event_type").unwrap_or_default();
        let payload: Value = row.try_get("", "payload").unwrap_or(Value::Null);

        let evt = map_to_event(&et, &payload).unwrap_or_else(|| Event::with_data(et.clone()));

        let dispatch_ok = sender.send(evt).await.is_ok();
        if dispatch_ok {
            let sql_update = r#"UPDATE outbox_events SET status = 'delivered', processed_at = NOW(), updated_at = NOW(), error_message = NULL WHERE id = $1"#;
            let stmt_upd =
                Statement::from_sql_and_values(DbBackend::Postgres, sql_update, vec![id.into()]);
            if let Err(e) = db.execute(stmt_upd).await {
                warn!("failed updating outbox {}: {}", id, e);
            }
        } else {
            // Schedule a retry with exponential backoff and jitter, or park
            // the row as failed once it runs out of attempts.
            let sql_attempts = r#"SELECT attempts FROM outbox_events WHERE id = $1"#;
            let row = db
                .query_one(Statement::from_sql_and_values(
                    DbBackend::Postgres,
                    sql_attempts,
                    vec![id.into()],
                ))
                .await
                .map_err(ServiceError::DatabaseError)?;
            let attempts: i32 = row
                .and_then(|r| r.try_get("", "attempts").ok())
                .unwrap_or(1);
            if attempts < MAX_ATTEMPTS {
                let backoff = BASE_BACKOFF_SECS.saturating_pow(attempts as u32);
                let now_ms = chrono::Utc::now().timestamp_millis() as u64;
                let jitter = now_ms % 1000; // ms
                let sql_retry = r#"UPDATE outbox_events SET status = 'pending', available_at = NOW() + make_interval(secs := $2::int) + ($3::int * interval '1 millisecond'), updated_at = NOW(), error_message = 'send failed' WHERE id = $1"#;
                let stmt_retry = Statement::from_sql_and_values(
                    DbBackend::Postgres,
                    sql_retry,
                    vec![id.into(), (backoff as i64).into(), (jitter as i64).into()],
                );
                if let Err(e) = db.execute(stmt_retry).await {
                    warn!("failed scheduling retry for outbox {}: {}", id, e);
                }
            } else {
                let sql_fail = r#"UPDATE outbox_events SET status = 'failed', updated_at = NOW(), error_message = 'max attempts exceeded' WHERE id = $1"#;
                let stmt_fail =
                    Statement::from_sql_and_values(DbBackend::Postgres, sql_fail, vec![id.into()]);
                if let Err(e) = db.execute(stmt_fail).await {
                    warn!("failed marking outbox {} failed: {}", id, e);
                }
            }
        }
    }
    Ok(())
}

fn map_to_event(event_type: &str, payload: &Value) -> Option<Event> {
    fn uuid_field(payload: &Value, key: &str) -> Option<Uuid> {
        payload
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    match event_type {
        "WarrantyRegistered" => {
            uuid_field(payload, "registration_id").map(Event::WarrantyRegistered)
        }
        "WarrantyApproved" => {
            let registration_id = uuid_field(payload, "registration_id")?;
            let customer_email = payload
                .get("customer_email")
                .and_then(|v| v.as_str())?
                .to_string();
            Some(Event::WarrantyApproved {
                registration_id,
                customer_email,
            })
        }
        "WarrantyDeclined" => {
            let registration_id = uuid_field(payload, "registration_id")?;
            let customer_email = payload
                .get("customer_email")
                .and_then(|v| v.as_str())?
                .to_string();
            let reason = payload
                .get("reason")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            Some(Event::WarrantyDeclined {
                registration_id,
                customer_email,
                reason,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_warranty_registered_event() {
        let registration_id = Uuid::new_v4();
        let payload = serde_json::json!({
            "registration_id": registration_id.to_string(),
        });

        let event = map_to_event("WarrantyRegistered", &payload).expect("event not mapped");
        match event {
            Event::WarrantyRegistered(mapped) => assert_eq!(mapped, registration_id),
            other => unreachable!("expected WarrantyRegistered but got {:?}", other),
        }
    }

    #[test]
    fn maps_warranty_approved_event() {
        let registration_id = Uuid::new_v4();
        let payload = serde_json::json!({
            "registration_id": registration_id.to_string(),
            "customer_email": "rider@example.com",
        });

        let event = map_to_event("WarrantyApproved", &payload).expect("event not mapped");
        match event {
            Event::WarrantyApproved {
                registration_id: mapped,
                customer_email,
            } => {
                assert_eq!(mapped, registration_id);
                assert_eq!(customer_email, "rider@example.com");
            }
            other => unreachable!("expected WarrantyApproved but got {:?}", other),
        }
    }

    #[test]
    fn maps_warranty_declined_event_with_reason() {
        let registration_id = Uuid::new_v4();
        let payload = serde_json::json!({
            "registration_id": registration_id.to_string(),
            "customer_email": "rider@example.com",
            "reason": "Invoice does not match the VIN",
        });

        let event = map_to_event("WarrantyDeclined", &payload).expect("event not mapped");
        match event {
            Event::WarrantyDeclined {
                registration_id: mapped,
                customer_email,
                reason,
            } => {
                assert_eq!(mapped, registration_id);
                assert_eq!(customer_email, "rider@example.com");
                assert_eq!(reason.as_deref(), Some("Invoice does not match the VIN"));
            }
            other => unreachable!("expected WarrantyDeclined but got {:?}", other),
        }
    }

    #[test]
    fn unknown_event_types_are_ignored() {
        let payload = serde_json::json!({ "id": "123" });
        assert!(map_to_event("SomethingElse", &payload).is_none());
    }
}
