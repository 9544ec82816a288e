use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mutation not yet confirmed applied for one user. Lives in that user's
/// durable queue until acked or abandoned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub event: String,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl SyncQueueItem {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
            next_retry_at: None,
        }
    }
}

/// Result of a delta computation: queue items newer than the watermark.
/// Reading a delta never mutates the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDelta {
    pub last_sync: Option<DateTime<Utc>>,
    pub records: Vec<SyncQueueItem>,
}
