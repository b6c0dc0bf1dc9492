//! Which chat message shows the pay link for a purchase, so it can be removed once paid.
//! Losing an entry only leaves a stale message behind.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedMessage {
    pub chat_id: i64,
    pub message_id: i32,
}

#[derive(Debug)]
struct Entry {
    message: CachedMessage,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct MessageCache {
    ttl: Duration,
    entries: RwLock<HashMap<i64, Entry>>,
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl MessageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set(&self, purchase_id: i64, message: CachedMessage) {
        let expires_at = Instant::now() + self.ttl;
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.expires_at > Instant::now());
        entries.insert(purchase_id, Entry { message, expires_at });
    }

    pub async fn get(&self, purchase_id: i64) -> Option<CachedMessage> {
        let entries = self.entries.read().await;
        entries
            .get(&purchase_id)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.message)
    }

    /// Removes and returns the entry, if it has not expired.
    pub async fn take(&self, purchase_id: i64) -> Option<CachedMessage> {
        let entry = self.entries.write().await.remove(&purchase_id)?;
        (entry.expires_at > Instant::now()).then_some(entry.message)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
