use crate::cache::{
    queue_key, snapshot_key, watermark_key, SyncCache, QUEUE_TTL_SECS, SNAPSHOT_TTL_SECS,
};
use crate::models::SyncQueueItem;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rollcall_core::error::{Error, Result};
use uuid::Uuid;

/// Redis-backed cache. The connection manager is connected at startup and
/// injected; it reconnects internally, and every command round-trips, so
/// callers must treat failures as degraded-but-non-fatal where the spec
/// allows it.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SyncCache for RedisCache {
    async fn check_ready(&self) -> Result<()> {
        rollcall_core::cache::check_ready(&self.conn)
            .await
            .map_err(|err| Error::Transient(err.to_string()))
    }

    async fn put_snapshot(
        &self,
        day: NaiveDate,
        class_id: Uuid,
        data: &serde_json::Value,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(data)?;
        let _: () = conn
            .set_ex(snapshot_key(day, class_id), body, SNAPSHOT_TTL_SECS)
            .await?;
        Ok(())
    }

    async fn get_snapshot(
        &self,
        day: NaiveDate,
        class_id: Uuid,
    ) -> Result<Option<serde_json::Value>> {
        let mut conn = self.conn.clone();
        let body: Option<String> = conn.get(snapshot_key(day, class_id)).await?;
        match body {
            Some(body) => {
                let value = serde_json::from_str(&body)
                    .map_err(|err| Error::Transient(format!("corrupt snapshot: {err}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn enqueue(&self, user_id: Uuid, item: &SyncQueueItem) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = queue_key(user_id);
        let body = serde_json::to_string(item)?;
        // RPUSH is a single atomic append; concurrent sessions of the same
        // user cannot lose each other's items.
        let _: () = conn.rpush(&key, body).await?;
        let _: () = conn.expire(&key, QUEUE_TTL_SECS as i64).await?;
        Ok(())
    }

    async fn queue_items(&self, user_id: Uuid) -> Result<Vec<SyncQueueItem>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(queue_key(user_id), 0, -1).await?;
        let mut items = Vec::with_capacity(raw.len());
        for body in raw {
            let item = serde_json::from_str(&body)
                .map_err(|err| Error::Transient(format!("corrupt queue item: {err}")))?;
            items.push(item);
        }
        Ok(items)
    }

    async fn clear_queue(&self, user_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(queue_key(user_id)).await?;
        Ok(())
    }

    async fn set_watermark(&self, user_id: Uuid, ts: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(watermark_key(user_id), ts.to_rfc3339()).await?;
        Ok(())
    }

    async fn watermark(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(watermark_key(user_id)).await?;
        match raw {
            Some(raw) => {
                let ts = DateTime::parse_from_rfc3339(&raw)
                    .map_err(|err| Error::Transient(format!("corrupt watermark: {err}")))?;
                Ok(Some(ts.with_timezone(&Utc)))
            }
            None => Ok(None),
        }
    }
}
