//! Service configuration types.
//!
//! `ServiceConfig` represents the top-level `config.toml`. Every field has a
//! default so an empty or missing file yields a working single-process setup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::id::ServerName;

/// Top-level configuration, loaded from `{data_dir}/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Users on this server are "local" for the purposes of the member check.
    #[serde(default = "default_server_name")]
    pub server_name: ServerName,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub roomserver: RoomserverConfig,

    #[serde(default)]
    pub internal_api: InternalApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_server_name() -> ServerName {
    ServerName::new("localhost")
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            bus: BusConfig::default(),
            roomserver: RoomserverConfig::default(),
            internal_api: InternalApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Durable message bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Keep the bus in process memory instead of the SQLite log. Messages
    /// do not survive a restart.
    pub in_memory: bool,
    /// Prefix applied to topic and durable consumer names.
    pub topic_prefix: String,
    /// How long a delivered message may stay unacknowledged before redelivery.
    pub ack_wait_secs: u64,
    /// Delay before a negatively-acknowledged message is redelivered.
    pub redelivery_delay_ms: u64,
    /// Poll interval of the SQLite bus when no message is ready.
    pub poll_interval_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            in_memory: false,
            topic_prefix: "roompurge.".to_string(),
            ack_wait_secs: 30,
            redelivery_delay_ms: 2_000,
            poll_interval_ms: 250,
        }
    }
}

impl BusConfig {
    /// Fully-qualified topic name, e.g. `roompurge.RoomPurge`.
    pub fn topic_for(&self, name: &str) -> String {
        format!("{}{}", self.topic_prefix, name)
    }

    /// Fully-qualified durable consumer name, e.g. `roompurge.UserAPIRoomPurgeConsumer`.
    pub fn durable(&self, name: &str) -> String {
        format!("{}{}", self.topic_prefix, name)
    }

    pub fn ack_wait(&self) -> Duration {
        Duration::from_secs(self.ack_wait_secs)
    }

    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_millis(self.redelivery_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Forget coordinator behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomserverConfig {
    /// Publish a room-scoped purge once no local user remains joined.
    pub purge_on_last_member: bool,
    /// Also publish a user-scoped cleanup message for every forget.
    pub user_scoped_cleanup: bool,
    /// Interval of the missed-purge sweep. Zero disables the sweep.
    pub sweep_interval_secs: u64,
}

impl Default for RoomserverConfig {
    fn default() -> Self {
        Self {
            purge_on_last_member: true,
            user_scoped_cleanup: false,
            sweep_interval_secs: 300,
        }
    }
}

impl RoomserverConfig {
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// Internal HTTP API (server side and client side).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InternalApiConfig {
    /// Address the internal API listens on.
    pub listen: String,
    /// Base URL clients use to reach a sibling service.
    pub base_url: String,
    /// Per-call deadline.
    pub timeout_secs: u64,
}

impl Default for InternalApiConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7771".to_string(),
            base_url: "http://127.0.0.1:7771".to_string(),
            timeout_secs: 30,
        }
    }
}

impl InternalApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Bridge spans to OpenTelemetry (stdout exporter).
    pub otel: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            otel: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_config_default_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.server_name.as_str(), "localhost");
        assert!(config.roomserver.purge_on_last_member);
        assert!(!config.roomserver.user_scoped_cleanup);
        assert!(!config.bus.in_memory);
        assert_eq!(config.internal_api.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_service_config_deserialize_with_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.bus.topic_prefix, "roompurge.");
        assert_eq!(config.bus.topic_for("RoomPurge"), "roompurge.RoomPurge");
        assert_eq!(
            config.bus.durable("UserAPIRoomPurgeConsumer"),
            "roompurge.UserAPIRoomPurgeConsumer"
        );
        assert_eq!(config.roomserver.sweep_interval(), Some(Duration::from_secs(300)));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_service_config_deserialize_with_values() {
        let toml_str = r#"
server_name = "example.org"

[bus]
in_memory = true
topic_prefix = "test."

[roomserver]
user_scoped_cleanup = true
sweep_interval_secs = 0

[internal_api]
base_url = "http://roomserver:7771"
"#;
        let config: ServiceConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server_name.as_str(), "example.org");
        assert!(config.bus.in_memory);
        assert_eq!(config.bus.topic_for("RoomPurge"), "test.RoomPurge");
        assert_eq!(config.bus.ack_wait_secs, 30);
        assert!(config.roomserver.user_scoped_cleanup);
        assert!(config.roomserver.purge_on_last_member);
        assert_eq!(config.roomserver.sweep_interval(), None);
        assert_eq!(config.internal_api.base_url, "http://roomserver:7771");
        assert_eq!(config.internal_api.listen, "127.0.0.1:7771");
    }
}
