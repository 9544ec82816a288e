use anyhow::Result;
use sqlx::{migrate::Migrator, postgres::PgPoolOptions, Pool, Postgres};
use std::time::Duration;

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn connect(database_url: &str) -> Result<Pool<Postgres>> {
    // Acquire timeout keeps connection handling bounded; an unresponsive
    // store must fail the request instead of starving the caller.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn migrate(pool: &Pool<Postgres>) -> Result<()> {
    MIGRATOR.run(pool).await?;
    Ok(())
}

pub async fn check_ready(pool: &Pool<Postgres>) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
