use serde::Deserialize;
use std::time::Duration;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the listener binds to. Port `0` asks the OS for a free port.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Configuration settings for the broker.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    /// Root directory of the durable log.
    pub data_dir: String,
    pub max_connections: usize,
    /// How long a session waits for a delivery ack before requeueing.
    pub ack_timeout_ms: u64,
    /// How long `stop()` lets sessions finish an ack wait.
    pub shutdown_grace_ms: u64,
    pub max_frame_bytes: usize,
}

impl BrokerSettings {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub data_dir: Option<String>,
    pub max_connections: Option<usize>,
    pub ack_timeout_ms: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
    pub max_frame_bytes: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            broker: BrokerSettings {
                data_dir: "popqueue_data".to_string(),
                max_connections: 1000,
                ack_timeout_ms: 30_000,
                shutdown_grace_ms: 5_000,
                max_frame_bytes: 1024 * 1024,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server;
        let broker = self.broker;
        let logging = self.logging;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
            },
            broker: BrokerSettings {
                data_dir: broker
                    .as_ref()
                    .and_then(|b| b.data_dir.clone())
                    .unwrap_or(default.broker.data_dir),
                max_connections: broker
                    .as_ref()
                    .and_then(|b| b.max_connections)
                    .unwrap_or(default.broker.max_connections),
                ack_timeout_ms: broker
                    .as_ref()
                    .and_then(|b| b.ack_timeout_ms)
                    .unwrap_or(default.broker.ack_timeout_ms),
                shutdown_grace_ms: broker
                    .as_ref()
                    .and_then(|b| b.shutdown_grace_ms)
                    .unwrap_or(default.broker.shutdown_grace_ms),
                max_frame_bytes: broker
                    .as_ref()
                    .and_then(|b| b.max_frame_bytes)
                    .unwrap_or(default.broker.max_frame_bytes),
            },
            logging: LoggingSettings {
                level: logging
                    .as_ref()
                    .and_then(|l| l.level.clone())
                    .unwrap_or(default.logging.level),
            },
        }
    }
}
