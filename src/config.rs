use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
use crate::types::Result;

/// Environment variable naming a configuration file
pub const CONFIG_FILE_ENV: &str = "FLEET_PROVISIONING_CONFIG";

/// Prefix of environment overrides, e.g. `FLEETPROV__MQTT__KEEP_ALIVE_SECS`
pub const ENV_PREFIX: &str = "FLEETPROV";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// MQTT client tuning
    #[serde(default)]
    pub mqtt: MqttConfig,
    /// Provisioning flow settings
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MQTT client tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Keep-alive interval (seconds)
    pub keep_alive_secs: u64,
    /// How long to wait for CONNACK (seconds)
    pub connect_timeout_secs: u64,
    /// How long to wait for SUBACK/PUBACK (seconds)
    pub operation_timeout_secs: u64,
    /// Pause before polling again after a dropped connection (seconds)
    pub reconnect_delay_secs: u64,
    /// Largest packet accepted or sent (bytes)
    pub max_packet_size: usize,
    /// Capacity of the client request channel
    pub request_channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            keep_alive_secs: 30,
            connect_timeout_secs: 10,
            operation_timeout_secs: 5,
            reconnect_delay_secs: 1,
            max_packet_size: 128 * 1024,
            request_channel_capacity: 10,
        }
    }
}

/// Provisioning flow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// How long to wait for an accepted/rejected response (seconds)
    pub response_timeout_secs: u64,
    /// Directory for the issued key and certificate
    pub output_dir: PathBuf,
    /// Topic of the message published after reconnecting
    pub test_topic: String,
    /// Payload of that message
    pub test_message: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: 10,
            output_dir: PathBuf::from("."),
            test_topic: "topic/test".to_string(),
            test_message: "Test Message".to_string(),
        }
    }
}

impl ProvisioningConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Emit JSON lines instead of text
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
        }
    }
}

/// Where and as whom to connect, taken from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Broker host name
    pub host: String,
    /// Broker port
    pub port: u16,
    /// MQTT client id
    pub client_id: String,
}

impl Config {
    /// Load configuration from defaults, a file and the environment.
    ///
    /// The file is `path` when given, else the one named by
    /// `FLEET_PROVISIONING_CONFIG`, else an optional `config/default`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        use config::{Config as ConfigBuilder, Environment, File};
        use std::env;

        let mut builder = ConfigBuilder::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        } else if let Ok(config_path) = env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(File::with_name(&config_path));
        } else {
            builder = builder.add_source(File::with_name("config/default").required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the client cannot run with
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("mqtt.connect_timeout_secs", self.mqtt.connect_timeout_secs),
            ("mqtt.operation_timeout_secs", self.mqtt.operation_timeout_secs),
            ("provisioning.response_timeout_secs", self.provisioning.response_timeout_secs),
            ("mqtt.request_channel_capacity", self.mqtt.request_channel_capacity as u64),
        ];

        for (name, value) in checks {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }

        if self.mqtt.keep_alive_secs < 5 {
            return Err(Error::Config("mqtt.keep_alive_secs must be at least 5".to_string()));
        }

        if self.provisioning.test_topic.is_empty() {
            return Err(Error::Config("provisioning.test_topic cannot be empty".to_string()));
        }

        Ok(())
    }
}
