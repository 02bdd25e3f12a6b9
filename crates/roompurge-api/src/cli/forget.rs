//! `roompurged forget` - forget a room through a running server's internal API.

use anyhow::{Context, Result};
use console::style;

use roompurge_infra::rpc::RoomserverClient;
use roompurge_types::config::ServiceConfig;
use roompurge_types::id::{RoomId, UserId};
use roompurge_types::membership::PerformForgetRequest;

pub async fn forget(config: &ServiceConfig, user: &str, room: &str, json: bool) -> Result<()> {
    let request = PerformForgetRequest {
        user_id: UserId::parse(user).context("invalid --user")?,
        room_id: RoomId::parse(room).context("invalid --room")?,
    };
    let client = RoomserverClient::new(&config.internal_api)?;

    match client.perform_forget(&request).await {
        Ok(_) => {
            if json {
                let out = serde_json::json!({
                    "ok": true,
                    "user_id": request.user_id,
                    "room_id": request.room_id,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!(
                    "  {} {} forgot {}",
                    style("✓").green().bold(),
                    request.user_id,
                    style(&request.room_id).cyan()
                );
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let out = serde_json::json!({
                    "ok": false,
                    "error": e.to_string(),
                    "remote": e.remote(),
                    "temporary": e.temporary(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if e.temporary() {
                eprintln!("  {} the call may be retried", style("!").yellow().bold());
            }
            Err(e.into())
        }
    }
}
