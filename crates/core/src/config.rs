use std::{path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::chain::{DEFAULT_CHAIN_ID, Network};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one sub-directory per token
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// RPC endpoint used when none is given on the command line
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Chain id every descriptor must declare and the endpoint must serve
    #[serde(default = "default_chain_id")]
    pub expected_chain_id: u64,

    /// Whether descriptors are reconciled against on-chain state
    #[serde(default = "default_true")]
    pub onchain: bool,

    /// Whether a logo.svg or logo.png must sit next to every descriptor
    #[serde(default = "default_true")]
    pub require_logo: bool,

    /// Number of tokens validated at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Timeout applied to every single RPC request
    #[serde(default = "default_request_timeout", with = "humantime_duration")]
    pub request_timeout: Duration,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per on-chain property, first attempt included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles for every further attempt
    #[serde(default = "default_initial_backoff", with = "humantime_duration")]
    pub initial_backoff: Duration,

    /// Upper bound for a single backoff delay
    #[serde(default = "default_max_backoff", with = "humantime_duration")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            rpc_url: None,
            expected_chain_id: default_chain_id(),
            onchain: true,
            require_logo: true,
            concurrency: default_concurrency(),
            request_timeout: default_request_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, figment::Error> {
        let config: Config = Figment::new()
            .merge(Yaml::file("toklist.yaml"))
            .merge(Env::prefixed("TOKLIST_").split("__"))
            .extract()?;

        Ok(config)
    }

    pub fn network(&self) -> Network {
        Network::from_id(self.expected_chain_id)
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("mainnet")
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    1
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(5)
}

/// (De)serializes durations as humantime strings such as `500ms` or `10s`.
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize as _, Deserializer, Serializer, de};

    pub(super) fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }
}
