//! Configuration for lobby-daemon

use lobby_runtime::{JanitorConfig, PartyConfig, QueueConfig, RuntimeConfig, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Party and invite lifecycle
    #[serde(default)]
    pub party: PartyConfig,

    /// Queue channels and split policy
    #[serde(default)]
    pub queue: QueueConfig,

    /// Ephemeral split sessions
    #[serde(default)]
    pub session: SessionConfig,

    /// Background sweeps
    #[serde(default)]
    pub janitor: JanitorConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `parties.json` and `linked_accounts.json`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the file if given, then
    /// `LOBBY_`-prefixed environment variables (`LOBBY_QUEUE__QUORUM=4`)
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("LOBBY")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("queue.channels")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// The runtime sections
    pub fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig {
            party: self.party.clone(),
            queue: self.queue.clone(),
            session: self.session.clone(),
            janitor: self.janitor.clone(),
        }
    }
}
