use crate::models::SyncQueueItem;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::error::Result;
use uuid::Uuid;

/// Snapshot TTL: a day's sheet is effectively immutable once the day has
/// passed, so a generous TTL is safe.
pub const SNAPSHOT_TTL_SECS: u64 = 24 * 60 * 60;

/// Queue TTL: a client offline for longer than this reconciles through a
/// full resync instead of queue replay.
pub const QUEUE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Port for the fast ephemeral store behind snapshots, per-user sync
/// queues and watermarks. Queue mutations are single atomic operations
/// (append, range, delete) so two sessions of the same user never lose
/// updates to a read-modify-write race.
#[async_trait]
pub trait SyncCache: Send + Sync {
    /// Round-trip probe of the backend, for readiness reporting.
    async fn check_ready(&self) -> Result<()>;

    async fn put_snapshot(
        &self,
        day: NaiveDate,
        class_id: Uuid,
        data: &serde_json::Value,
    ) -> Result<()>;

    async fn get_snapshot(&self, day: NaiveDate, class_id: Uuid)
        -> Result<Option<serde_json::Value>>;

    /// Appends to the tail of the user's queue.
    async fn enqueue(&self, user_id: Uuid, item: &SyncQueueItem) -> Result<()>;

    /// Returns the queue in FIFO order without removing anything. Removal
    /// is a separate `clear_queue` so a crash between read and ack cannot
    /// silently lose items.
    async fn queue_items(&self, user_id: Uuid) -> Result<Vec<SyncQueueItem>>;

    async fn clear_queue(&self, user_id: Uuid) -> Result<()>;

    async fn set_watermark(&self, user_id: Uuid, ts: DateTime<Utc>) -> Result<()>;

    async fn watermark(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>>;
}

pub(crate) fn snapshot_key(day: NaiveDate, class_id: Uuid) -> String {
    format!("attendance:{day}:{class_id}")
}

pub(crate) fn queue_key(user_id: Uuid) -> String {
    format!("sync:queue:{user_id}")
}

pub(crate) fn watermark_key(user_id: Uuid) -> String {
    format!("sync:last:{user_id}")
}
