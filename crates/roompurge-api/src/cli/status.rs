//! `roompurged status` - rooms awaiting a purge and consumer backlog.

use anyhow::Result;
use console::style;

use roompurge_core::bus::MessageBus;
use roompurge_core::repository::membership::MembershipRepository;
use roompurge_infra::sqlite::bus::SqliteMessageBus;

use crate::state::AppState;

/// Number of pending rooms listed in styled output.
const LISTED_ROOMS: u32 = 20;

pub async fn status<B>(state: &AppState<B>, json: bool) -> Result<()>
where
    B: MessageBus + Clone + 'static,
{
    let pending = state.memberships.rooms_pending_purge(LISTED_ROOMS).await?;

    // Bus statistics only exist for the persistent bus.
    let bus_stats = if state.config.bus.in_memory {
        None
    } else {
        let bus = SqliteMessageBus::new(state.db_pool.clone(), &state.config.bus);
        let durable = state.purge_durable();
        let backlog = bus.backlog(&state.purge_topic(), &durable).await?;
        let unacked = bus.pending_count(&durable).await?;
        Some((backlog, unacked))
    };

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "server_name": state.config.server_name,
            "rooms_pending_purge": pending,
            "bus": match bus_stats {
                Some((backlog, unacked)) => serde_json::json!({
                    "in_memory": false,
                    "topic": state.purge_topic(),
                    "durable": state.purge_durable(),
                    "backlog": backlog,
                    "unacked": unacked,
                }),
                None => serde_json::json!({ "in_memory": true }),
            },
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} roompurged v{} ({})",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION"),
        state.config.server_name
    );
    println!();

    println!("  {}", style("── Purge ──").dim());
    if pending.is_empty() {
        println!("  Pending rooms: {}", style(0).green());
    } else {
        println!("  Pending rooms: {}", style(pending.len()).yellow().bold());
        for room_id in &pending {
            println!("    {}", style(room_id).cyan());
        }
    }
    println!();

    println!("  {}", style("── Bus ──").dim());
    match bus_stats {
        Some((backlog, unacked)) => {
            println!("  Topic:   {}", state.purge_topic());
            println!("  Backlog: {}", style(backlog).bold());
            println!("  Unacked: {}", style(unacked).bold());
        }
        None => println!("  {}", style("in-memory (not persisted)").yellow()),
    }
    println!();

    println!("  {}", style("── Storage ──").dim());
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!();

    Ok(())
}
