//! `roompurged purge` - publish a room-scoped purge directly.

use anyhow::{Context, Result, bail};
use console::style;

use roompurge_core::bus::MessageBus;
use roompurge_types::id::RoomId;

use crate::state::AppState;

pub async fn purge<B>(state: &AppState<B>, room: &str, json: bool) -> Result<()>
where
    B: MessageBus + Clone + 'static,
{
    let room_id = RoomId::parse(room).context("invalid --room")?;

    // A one-shot process on the in-memory bus has no consumer, yet the
    // publication would still be recorded and hide the room from the sweep.
    if state.config.bus.in_memory {
        bail!("purge needs the durable bus; bus.in_memory is set in config.toml");
    }

    let message_id = state.forget_service.purge_room_now(&room_id).await?;

    if json {
        let out = serde_json::json!({
            "room_id": room_id,
            "message_id": message_id,
            "topic": state.purge_topic(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "  {} purge of {} published (message {})",
            style("✓").green().bold(),
            style(&room_id).cyan(),
            message_id
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roompurge_core::bus::memory::InMemoryBus;
    use roompurge_core::repository::membership::MembershipRepository;
    use roompurge_infra::sqlite::bus::SqliteMessageBus;
    use roompurge_infra::sqlite::pool::{DatabasePool, database_url};
    use roompurge_types::config::ServiceConfig;
    use roompurge_types::id::UserId;
    use roompurge_types::membership::MembershipState;
    use tempfile::TempDir;

    fn room() -> RoomId {
        RoomId::parse("!r:localhost").unwrap()
    }

    async fn forgotten_room<B>(state: &AppState<B>)
    where
        B: MessageBus + Clone + 'static,
    {
        let alice = UserId::parse("@alice:localhost").unwrap();
        state
            .memberships
            .record_membership(&alice, &room(), MembershipState::Left, true)
            .await
            .unwrap();
        state.memberships.forget(&alice, &room()).await.unwrap();
        assert_eq!(
            state.memberships.rooms_pending_purge(10).await.unwrap(),
            vec![room()]
        );
    }

    #[tokio::test]
    async fn purge_on_in_memory_bus_is_refused_and_room_stays_pending() {
        let dir = TempDir::new().unwrap();
        let pool = DatabasePool::new(&database_url(dir.path())).await.unwrap();
        let mut config = ServiceConfig::default();
        config.bus.in_memory = true;
        let bus = InMemoryBus::new();
        let state = AppState::new(dir.path().to_path_buf(), config, pool, bus.clone());
        forgotten_room(&state).await;

        assert!(purge(&state, "!r:localhost", true).await.is_err());

        assert!(bus.messages(&state.purge_topic()).is_empty());
        assert_eq!(
            state.memberships.rooms_pending_purge(10).await.unwrap(),
            vec![room()]
        );
    }

    #[tokio::test]
    async fn purge_on_durable_bus_publishes_and_clears_pending() {
        let dir = TempDir::new().unwrap();
        let pool = DatabasePool::new(&database_url(dir.path())).await.unwrap();
        let config = ServiceConfig::default();
        let bus = SqliteMessageBus::new(pool.clone(), &config.bus);
        let state = AppState::new(dir.path().to_path_buf(), config, pool, bus.clone());
        forgotten_room(&state).await;

        purge(&state, "!r:localhost", true).await.unwrap();

        assert!(state.memberships.rooms_pending_purge(10).await.unwrap().is_empty());
        assert_eq!(
            bus.backlog(&state.purge_topic(), &state.purge_durable())
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn purge_rejects_invalid_room_id() {
        let dir = TempDir::new().unwrap();
        let pool = DatabasePool::new(&database_url(dir.path())).await.unwrap();
        let config = ServiceConfig::default();
        let bus = SqliteMessageBus::new(pool.clone(), &config.bus);
        let state = AppState::new(dir.path().to_path_buf(), config, pool, bus);

        assert!(purge(&state, "r-without-sigil", true).await.is_err());
    }
}
