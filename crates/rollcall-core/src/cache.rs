use anyhow::Result;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::Client;
use std::time::Duration;

/// Connects the Redis cache backend once at startup. The manager is cloned
/// into each caller; there is no lazy connect-on-first-use.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(2)
        .set_connection_timeout(Duration::from_millis(500));

    let client = Client::open(redis_url)?;
    let manager = client.get_connection_manager_with_config(config).await?;
    Ok(manager)
}

pub async fn check_ready(manager: &ConnectionManager) -> Result<()> {
    let mut conn = manager.clone();
    redis::cmd("PING").query_async::<String>(&mut conn).await?;
    Ok(())
}
