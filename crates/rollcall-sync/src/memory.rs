use crate::cache::{snapshot_key, SyncCache};
use crate::models::SyncQueueItem;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::error::Result;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-memory cache used by tests and single-process deployments. Shares
/// the port contract with `RedisCache`: append/range/delete are atomic
/// under the single mutex.
#[derive(Default)]
pub struct MemoryCache {
    inner: Mutex<State>,
}

#[derive(Default)]
struct State {
    snapshots: HashMap<String, serde_json::Value>,
    queues: HashMap<Uuid, Vec<SyncQueueItem>>,
    watermarks: HashMap<Uuid, DateTime<Utc>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncCache for MemoryCache {
    async fn check_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn put_snapshot(
        &self,
        day: NaiveDate,
        class_id: Uuid,
        data: &serde_json::Value,
    ) -> Result<()> {
        let mut state = self.inner.lock().await;
        state.snapshots.insert(snapshot_key(day, class_id), data.clone());
        Ok(())
    }

    async fn get_snapshot(
        &self,
        day: NaiveDate,
        class_id: Uuid,
    ) -> Result<Option<serde_json::Value>> {
        let state = self.inner.lock().await;
        Ok(state.snapshots.get(&snapshot_key(day, class_id)).cloned())
    }

    async fn enqueue(&self, user_id: Uuid, item: &SyncQueueItem) -> Result<()> {
        let mut state = self.inner.lock().await;
        state.queues.entry(user_id).or_default().push(item.clone());
        Ok(())
    }

    async fn queue_items(&self, user_id: Uuid) -> Result<Vec<SyncQueueItem>> {
        let state = self.inner.lock().await;
        Ok(state.queues.get(&user_id).cloned().unwrap_or_default())
    }

    async fn clear_queue(&self, user_id: Uuid) -> Result<()> {
        let mut state = self.inner.lock().await;
        state.queues.remove(&user_id);
        Ok(())
    }

    async fn set_watermark(&self, user_id: Uuid, ts: DateTime<Utc>) -> Result<()> {
        let mut state = self.inner.lock().await;
        state.watermarks.insert(user_id, ts);
        Ok(())
    }

    async fn watermark(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let state = self.inner.lock().await;
        Ok(state.watermarks.get(&user_id).copied())
    }
}
