//! Offline-sync substrate: the cache port with its Redis and in-memory
//! implementations, and the coordinator that decides what to queue, what
//! to replay and how to retry.

pub mod cache;
pub mod coordinator;
pub mod memory;
pub mod models;
pub mod redis_cache;

pub use cache::SyncCache;
pub use coordinator::{retry_delay, SyncCoordinator};
pub use memory::MemoryCache;
pub use models::{SyncDelta, SyncQueueItem};
pub use redis_cache::RedisCache;
