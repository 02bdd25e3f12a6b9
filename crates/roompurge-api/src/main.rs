//! roompurged: room forget and purge coordination service.

mod cli;
mod http;
mod state;

use anyhow::Result;
use clap::Parser;

use roompurge_core::bus::MessageBus;
use roompurge_core::bus::memory::InMemoryBus;
use roompurge_infra::config::{load_service_config, resolve_data_dir};
use roompurge_infra::sqlite::bus::SqliteMessageBus;
use roompurge_infra::sqlite::pool::{DatabasePool, database_url};

use crate::cli::{Cli, Commands};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = resolve_data_dir();
    tokio::fs::create_dir_all(&data_dir).await?;
    let config = load_service_config(&data_dir).await;

    let directive = cli::verbosity_directive(cli.quiet, cli.verbose)
        .map(str::to_string)
        .unwrap_or_else(|| config.logging.level.clone());
    roompurge_observe::tracing_setup::init_tracing(&directive, config.logging.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli, data_dir, config).await;

    roompurge_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(
    cli: Cli,
    data_dir: std::path::PathBuf,
    config: roompurge_types::config::ServiceConfig,
) -> Result<()> {
    let json = cli.json;

    // Forget goes through a running server and needs no local state.
    if let Commands::Forget { user, room } = &cli.command {
        return cli::forget::forget(&config, user, room, json).await;
    }

    let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;

    if config.bus.in_memory {
        let bus = InMemoryBus::with_timing(config.bus.ack_wait(), config.bus.redelivery_delay());
        let state = AppState::new(data_dir, config, db_pool, bus.clone());
        let result = dispatch(cli.command, state, json).await;
        bus.close();
        result
    } else {
        let bus = SqliteMessageBus::new(db_pool.clone(), &config.bus);
        let state = AppState::new(data_dir, config, db_pool, bus.clone());
        let result = dispatch(cli.command, state, json).await;
        bus.close();
        result
    }
}

async fn dispatch<B>(command: Commands, state: AppState<B>, json: bool) -> Result<()>
where
    B: MessageBus + Clone + 'static,
{
    match command {
        Commands::Serve { listen } => {
            let listen = listen.unwrap_or_else(|| state.config.internal_api.listen.clone());
            cli::serve::serve(state, &listen, shutdown_signal()).await
        }
        Commands::Purge { room } => cli::purge::purge(&state, &room, json).await,
        Commands::Status => cli::status::status(&state, json).await,
        Commands::Forget { .. } => unreachable!("forget is dispatched before opening the database"),
    }
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
