use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Binds and serves until ctrl-c. Graceful shutdown waits for open
/// connections to finish, and websocket sessions never finish on their
/// own, so the shutdown signal is handed to `on_shutdown` — the caller
/// must use it to tell long-lived sessions to close, or the drain would
/// hang indefinitely.
pub async fn serve<F>(addr: SocketAddr, router: Router, on_shutdown: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        on_shutdown();
    })
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown requested, draining sessions");
    }
}
