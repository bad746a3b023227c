use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

/// Snapshot of the live WebSocket population.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastStats {
    pub total_connections: usize,
    pub all_pairs: usize,
    pub filtered: usize,
}

/// Registry of live WebSocket connections and their subscription filters.
///
/// An empty filter means "all pairs". Registration and deregistration are
/// short critical sections; each connection forwards its own messages, so
/// no broadcast-wide lock is held while sending.
#[derive(Default)]
pub struct BroadcastHub {
    connections: RwLock<HashMap<u64, HashSet<String>>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, subscribed_pairs: HashSet<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.write().await;
        connections.insert(id, subscribed_pairs);
        info!(
            connection_id = id,
            total_connections = connections.len(),
            "websocket connection established"
        );
        id
    }

    pub async fn deregister(&self, id: u64) {
        let mut connections = self.connections.write().await;
        if connections.remove(&id).is_some() {
            info!(
                connection_id = id,
                remaining_connections = connections.len(),
                "websocket connection closed"
            );
        }
    }

    pub async fn stats(&self) -> BroadcastStats {
        let connections = self.connections.read().await;
        let all_pairs = connections.values().filter(|pairs| pairs.is_empty()).count();
        BroadcastStats {
            total_connections: connections.len(),
            all_pairs,
            filtered: connections.len() - all_pairs,
        }
    }
}

/// Parse the `pairs` query parameter (`USD/EUR,GBP/USD`) into a filter set.
pub fn parse_pair_filter(raw: Option<&str>) -> HashSet<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(|pair| pair.trim().to_uppercase())
            .filter(|pair| !pair.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// An empty filter subscribes to everything.
pub fn filter_matches(subscribed_pairs: &HashSet<String>, pair: &str) -> bool {
    subscribed_pairs.is_empty() || subscribed_pairs.contains(pair)
}
