//! `roompurged serve` - internal API, purge consumer and missed-purge sweep.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;

use roompurge_core::bus::MessageBus;

use crate::http::router::build_router;
use crate::state::AppState;

/// How long in-flight purge publications get once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run until `shutdown_signal` resolves, then drain in order: HTTP
/// requests, detached publications, consumer and sweep.
pub async fn serve<B, F>(state: AppState<B>, listen: &str, shutdown_signal: F) -> Result<()>
where
    B: MessageBus + Clone + 'static,
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    let addr = listener.local_addr()?;

    let consumer = Arc::clone(&state.purge_consumer);
    let bus = Arc::clone(&state.bus);
    let topic = state.purge_topic();
    let durable = state.purge_durable();
    let token = state.shutdown.clone();
    let consumer_handle =
        tokio::spawn(async move { consumer.subscribe_and_run(&*bus, &topic, &durable, token).await });

    let sweep_handle = state.sweeper().map(|(sweeper, interval)| {
        tracing::info!(?interval, "missed-purge sweep enabled");
        tokio::spawn(sweeper.run(interval, state.shutdown.clone()))
    });

    println!(
        "  {} roompurged listening on {}",
        style("⚡").bold(),
        style(format!("http://{addr}")).cyan()
    );
    println!("  Purge topic: {}", style(state.purge_topic()).dim());
    println!("  Press Ctrl+C to stop");

    tracing::info!(%addr, server_name = %state.config.server_name, "internal API started");

    let router = build_router(state.clone());
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("internal API server failed")?;

    state.tasks.shutdown(SHUTDOWN_GRACE).await;
    state.shutdown.cancel();

    match consumer_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "purge consumer failed to start"),
        Err(e) => tracing::error!(error = %e, "purge consumer task panicked"),
    }
    if let Some(handle) = sweep_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "purge sweep task panicked");
        }
    }

    tracing::info!("server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roompurge_core::bus::memory::InMemoryBus;
    use roompurge_infra::sqlite::pool::{DatabasePool, database_url};
    use roompurge_types::config::ServiceConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn serve_stops_background_work_on_signal() {
        let dir = TempDir::new().unwrap();
        let pool = DatabasePool::new(&database_url(dir.path())).await.unwrap();
        let mut config = ServiceConfig::default();
        config.bus.in_memory = true;
        config.roomserver.sweep_interval_secs = 1;

        let bus = InMemoryBus::new();
        let state = AppState::new(dir.path().to_path_buf(), config, pool, bus.clone());
        let token = state.shutdown.clone();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve(state, "127.0.0.1:0", async move {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("serve did not stop")
            .unwrap()
            .unwrap();
        assert!(token.is_cancelled());
    }
}
