use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Query;
use axum::response::Response;
use axum::Extension;
use chrono::Utc;
use futures::StreamExt;
use loco_rs::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::services::broadcast::{filter_matches, parse_pair_filter};
use crate::services::factory::SharedServices;

pub fn routes() -> Routes {
    Routes::new()
        .prefix("ws")
        .add("/rates", get(rates_stream))
        .add("/stats", get(stats))
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    /// Comma-separated pairs, e.g. `USD/EUR,GBP/USD`. Absent means all.
    pub pairs: Option<String>,
}

/// WebSocket endpoint for real-time rate updates.
async fn rates_stream(
    Extension(services): Extension<SharedServices>,
    Query(params): Query<StreamParams>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let subscribed_pairs = parse_pair_filter(params.pairs.as_deref());
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, services, subscribed_pairs)))
}

async fn handle_socket(mut socket: WebSocket, services: SharedServices, subscribed_pairs: HashSet<String>) {
    let connection_id = services.hub.register(subscribed_pairs.clone()).await;

    let subscribed_list = if subscribed_pairs.is_empty() {
        json!("all")
    } else {
        let mut pairs: Vec<&String> = subscribed_pairs.iter().collect();
        pairs.sort();
        json!(pairs)
    };
    let welcome = json!({
        "type": "connection_established",
        "message": "Connected to real-time rate updates",
        "subscribed_pairs": subscribed_list,
        "timestamp": Utc::now(),
    });
    if socket.send(Message::Text(welcome.to_string())).await.is_err() {
        services.hub.deregister(connection_id).await;
        return;
    }

    let mut updates = match services.cache.subscribe_to_rates().await {
        Ok(updates) => updates,
        Err(err) => {
            error!(connection_id, error = %err, "failed to subscribe to rate broadcasts");
            services.hub.deregister(connection_id).await;
            return;
        }
    };

    loop {
        tokio::select! {
            update = updates.next() => {
                let Some(update) = update else {
                    // broadcast channel torn down
                    break;
                };
                if !filter_matches(&subscribed_pairs, &update.pair) {
                    continue;
                }

                let mut frame = match serde_json::to_value(&update) {
                    Ok(frame) => frame,
                    Err(err) => {
                        error!(connection_id, error = %err, "failed to encode rate update");
                        continue;
                    }
                };
                if let Some(obj) = frame.as_object_mut() {
                    obj.insert("type".to_string(), json!("rate_update"));
                }

                if socket.send(Message::Text(frame.to_string())).await.is_err() {
                    info!(connection_id, "client dropped during send");
                    break;
                }
                debug!(connection_id, pair = %update.pair, "forwarded rate update");
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Inbound frames are ignored; the stream is one-way.
                    Some(Ok(_)) => continue,
                }
            }
        }
    }

    services.hub.deregister(connection_id).await;
}

/// Snapshot of active WebSocket connections; stale reads are acceptable.
async fn stats(Extension(services): Extension<SharedServices>) -> Result<Json<serde_json::Value>> {
    let stats = services.hub.stats().await;
    format::json(json!({
        "timestamp": Utc::now(),
        "total_connections": stats.total_connections,
        "connections_by_subscription": {
            "all_pairs": stats.all_pairs,
            "filtered": stats.filtered,
        },
    }))
}
