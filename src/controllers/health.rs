use axum::Extension;
use chrono::Utc;
use loco_rs::prelude::*;
use serde_json::json;

use crate::services::factory::SharedServices;

pub fn routes() -> Routes {
    Routes::new().add("/health", get(health))
}

/// Composed health of the durable store, the cache and the breaker fleet.
/// Always answers 200; the verdict lives in the status field.
async fn health(Extension(services): Extension<SharedServices>) -> Result<Json<serde_json::Value>> {
    let snapshot = services.health_snapshot().await;
    format::json(json!({
        "status": snapshot.status,
        "services": snapshot.services,
        "timestamp": Utc::now(),
    }))
}
