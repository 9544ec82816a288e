use crate::cache::SyncCache;
use crate::models::{SyncDelta, SyncQueueItem};
use chrono::{Duration as ChronoDuration, Utc};
use rollcall_core::error::{Error, Result};
use rollcall_core::metrics;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const MAX_RETRY_ATTEMPTS: u32 = 5;
pub const INITIAL_RETRY_DELAY_MS: u64 = 1_000;
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Exponential backoff with a ceiling: 1s, 2s, 4s, 8s, 16s, then capped
/// at 30s.
pub fn retry_delay(retry_count: u32) -> Duration {
    let factor = 1u64 << retry_count.min(31);
    let delay = INITIAL_RETRY_DELAY_MS
        .saturating_mul(factor)
        .min(MAX_RETRY_DELAY_MS);
    Duration::from_millis(delay)
}

/// Decides what to queue, what to replay and how to retry. Owns no state
/// of its own; everything durable lives behind the cache port.
#[derive(Clone)]
pub struct SyncCoordinator {
    cache: Arc<dyn SyncCache>,
}

impl SyncCoordinator {
    pub fn new(cache: Arc<dyn SyncCache>) -> Self {
        Self { cache }
    }

    /// Wraps a mutation that could not be confirmed applied and appends it
    /// to the user's durable queue.
    pub async fn queue_for_sync(
        &self,
        user_id: Uuid,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let item = SyncQueueItem::new(event, payload);
        self.cache.enqueue(user_id, &item).await?;
        metrics::inc_sync_queued();
        tracing::debug!(user = %user_id, event, "mutation queued for sync");
        Ok(())
    }

    /// Queue items strictly newer than the watermark. Pure read: the queue
    /// is untouched until the caller confirms delivery via
    /// `mark_sync_complete`.
    pub async fn compute_delta(&self, user_id: Uuid) -> Result<SyncDelta> {
        let watermark = self.cache.watermark(user_id).await?;
        let items = self.cache.queue_items(user_id).await?;

        let records = match watermark {
            Some(watermark) => items
                .into_iter()
                .filter(|item| item.enqueued_at > watermark)
                .collect(),
            None => items,
        };

        Ok(SyncDelta {
            last_sync: watermark,
            records,
        })
    }

    /// Re-enqueues a failed delivery with backoff, or abandons it once the
    /// retry ceiling is hit. Abandonment is an error, not a silent drop.
    pub async fn schedule_retry(&self, user_id: Uuid, item: SyncQueueItem) -> Result<()> {
        if item.retry_count >= MAX_RETRY_ATTEMPTS {
            metrics::inc_sync_abandoned();
            tracing::warn!(
                user = %user_id,
                event = item.event,
                retries = item.retry_count,
                "sync item abandoned"
            );
            return Err(Error::Abandoned {
                event: item.event,
                payload: item.payload.to_string(),
                retries: item.retry_count,
            });
        }

        let delay = retry_delay(item.retry_count);
        // Re-stamped as a fresh enqueue: the watermark may have advanced
        // past the original timestamp, and a retry entry must stay ahead
        // of it to be picked up by the next delta.
        let retried = SyncQueueItem {
            retry_count: item.retry_count + 1,
            enqueued_at: Utc::now(),
            next_retry_at: Some(
                Utc::now() + ChronoDuration::milliseconds(delay.as_millis() as i64),
            ),
            ..item
        };
        self.cache.enqueue(user_id, &retried).await
    }

    /// Clears the queue and advances the watermark. Called only after the
    /// caller confirmed every delta record was delivered; advancing first
    /// would silently drop un-acked mutations.
    pub async fn mark_sync_complete(&self, user_id: Uuid) -> Result<()> {
        self.cache.clear_queue(user_id).await?;
        self.cache.set_watermark(user_id, Utc::now()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCache;
    use serde_json::json;

    fn coordinator() -> SyncCoordinator {
        SyncCoordinator::new(Arc::new(MemoryCache::new()))
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let delays: Vec<u64> = (0..5).map(|n| retry_delay(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000]);
        assert_eq!(retry_delay(5).as_millis(), 30_000);
        assert_eq!(retry_delay(12).as_millis(), 30_000);
        assert_eq!(retry_delay(63).as_millis(), 30_000);
    }

    #[tokio::test]
    async fn delta_leaves_queue_intact_until_completion() {
        let sync = coordinator();
        let user = Uuid::new_v4();
        for i in 0..3 {
            sync.queue_for_sync(user, "mark_attendance", json!({ "i": i }))
                .await
                .unwrap();
        }

        let delta = sync.compute_delta(user).await.unwrap();
        assert_eq!(delta.records.len(), 3);
        assert!(delta.last_sync.is_none());

        // A crash here must redeliver all three on the next sync.
        let replay = sync.compute_delta(user).await.unwrap();
        assert_eq!(replay.records.len(), 3);

        sync.mark_sync_complete(user).await.unwrap();
        let after = sync.compute_delta(user).await.unwrap();
        assert!(after.records.is_empty());
        assert!(after.last_sync.is_some());
    }

    #[tokio::test]
    async fn delta_filters_items_behind_the_watermark() {
        let cache = Arc::new(MemoryCache::new());
        let sync = SyncCoordinator::new(cache.clone());
        let user = Uuid::new_v4();

        let old = SyncQueueItem {
            enqueued_at: Utc::now() - ChronoDuration::hours(2),
            ..SyncQueueItem::new("mark_attendance", json!({ "age": "old" }))
        };
        cache.enqueue(user, &old).await.unwrap();
        cache
            .set_watermark(user, Utc::now() - ChronoDuration::hours(1))
            .await
            .unwrap();
        sync.queue_for_sync(user, "mark_attendance", json!({ "age": "new" }))
            .await
            .unwrap();

        let delta = sync.compute_delta(user).await.unwrap();
        assert_eq!(delta.records.len(), 1);
        assert_eq!(delta.records[0].payload["age"], "new");
    }

    #[tokio::test]
    async fn retry_increments_count_and_sets_next_attempt() {
        let cache = Arc::new(MemoryCache::new());
        let sync = SyncCoordinator::new(cache.clone());
        let user = Uuid::new_v4();

        // The original enqueue is older than the current watermark.
        cache
            .set_watermark(user, Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();
        let item = SyncQueueItem {
            enqueued_at: Utc::now() - ChronoDuration::hours(1),
            ..SyncQueueItem::new("mark_attendance", json!({}))
        };
        sync.schedule_retry(user, item).await.unwrap();

        let queued = cache.queue_items(user).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].retry_count, 1);
        assert!(queued[0].next_retry_at.is_some());

        // The retry entry stays visible to the next delta.
        let delta = sync.compute_delta(user).await.unwrap();
        assert_eq!(delta.records.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_abandon_with_error() {
        let cache = Arc::new(MemoryCache::new());
        let sync = SyncCoordinator::new(cache.clone());
        let user = Uuid::new_v4();

        let item = SyncQueueItem {
            retry_count: MAX_RETRY_ATTEMPTS,
            ..SyncQueueItem::new("mark_attendance", json!({ "student": "s1" }))
        };
        let err = sync.schedule_retry(user, item).await.unwrap_err();
        assert!(matches!(err, Error::Abandoned { retries: 5, .. }));

        // Abandoned items are not re-enqueued.
        assert!(cache.queue_items(user).await.unwrap().is_empty());
    }
}
