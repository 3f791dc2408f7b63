use std::{fs, path::Path, sync::Arc};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    AddressFilter, AddressRuleConfig, DeliveryError, FileStorageConsumer, HandlerFactory,
    MemoryConsumer, MessageConsumer, DEFAULT_DATA_DEFERRED_SIZE,
};

/// Top-level configuration file.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub dispatch: DispatchConfig,
}

/// Dispatcher configuration, consumers are kept in file order.
#[derive(Debug, Deserialize)]
pub struct DispatchConfig {
    /// Size (in bytes) after which the protocol engine spools `DATA` to disk.
    #[serde(default = "default_deferred_size")]
    pub deferred_size: usize,

    #[serde(default)]
    pub consumers: Vec<ConsumerConfig>,
}

/// Configuration for a named consumer.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    pub name: String,

    #[serde(flatten)]
    pub kind: ConsumerKind,

    /// Recipients this consumer accepts, any recipient when empty.
    #[serde(default)]
    pub accept: Vec<AddressRuleConfig>,

    /// Largest body (in bytes) the consumer takes, unlimited when absent.
    pub max_size: Option<u64>,
}

/// The backend of a consumer.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ConsumerKind {
    /// File-based storage consumer.
    #[serde(rename = "file_storage")]
    FileStorage {
        #[serde(default = "default_mailbox_path")]
        path: String,
        #[serde(default = "default_true")]
        metadata: bool,
    },

    /// In-memory consumer.
    #[serde(rename = "memory")]
    Memory,
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O error occurred reading the file.
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A parse error occurred deserializing TOML.
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// No consumer is configured.
    #[error("No consumers configured")]
    NoConsumers,

    /// A consumer could not be built.
    #[error("Consumer '{name}' failed: {source}")]
    Consumer {
        name: String,
        #[source]
        source: DeliveryError,
    },
}

/// Loads configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Builds a consumer from its configuration.
pub fn build_consumer(config: &ConsumerConfig) -> Result<Arc<dyn MessageConsumer>, ConfigError> {
    let filter = AddressFilter::from(config.accept.as_slice());
    let consumer: Arc<dyn MessageConsumer> = match &config.kind {
        ConsumerKind::FileStorage { path, metadata } => {
            fs::create_dir_all(path).map_err(|e| ConfigError::Consumer {
                name: config.name.clone(),
                source: e.into(),
            })?;
            Arc::new(
                FileStorageConsumer::new(&config.name, path.into(), filter, *metadata)
                    .with_max_size(config.max_size),
            )
        }
        ConsumerKind::Memory => Arc::new(
            MemoryConsumer::with_filter(&config.name, filter).with_max_size(config.max_size),
        ),
    };
    Ok(consumer)
}

/// Builds a [`HandlerFactory`] with the configured consumers, in order.
pub fn build_factory(config: &DispatchConfig) -> Result<HandlerFactory, ConfigError> {
    if config.consumers.is_empty() {
        return Err(ConfigError::NoConsumers);
    }
    let consumers = config
        .consumers
        .iter()
        .map(build_consumer)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HandlerFactory::with_deferred_size(
        consumers,
        config.deferred_size,
    ))
}

fn default_deferred_size() -> usize {
    DEFAULT_DATA_DEFERRED_SIZE
}

fn default_mailbox_path() -> String {
    "mailbox".to_string()
}

fn default_true() -> bool {
    true
}
