//! Configuration system for the relaynet CLI.

use relaynet_backend::{BackendConfig, BackendKeys};
use relaynet_core::SdkVersion;
use relaynet_crypto::signatures::SigningKey;
use relaynet_crypto::x25519::PrivateKey;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

/// relaynet configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend tuning
    #[serde(default)]
    pub backend: BackendSection,
    /// Backend key material
    #[serde(default)]
    pub keys: KeysConfig,
    /// Durable directory source
    #[serde(default)]
    pub directory: DirectoryConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSection {
    /// Relay liveness TTL in seconds
    #[serde(default = "default_relay_ttl")]
    pub relay_ttl_secs: u64,
    /// Server entry TTL in seconds
    #[serde(default = "default_server_ttl")]
    pub server_ttl_secs: u64,
    /// Session entry TTL in seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// Per-call store deadline in seconds
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
    /// Oldest accepted SDK, `major.minor.patch`
    #[serde(default = "default_sdk_version_min")]
    pub sdk_version_min: String,
    /// Jitter ceiling for the cost matrix, milliseconds
    #[serde(default = "default_max_jitter")]
    pub max_jitter: f32,
    /// Packet loss ceiling for the cost matrix, percent
    #[serde(default = "default_max_packet_loss")]
    pub max_packet_loss: f32,
}

/// Backend key material, hex encoded
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KeysConfig {
    /// X25519 private key relays seal their init token to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_private_key: Option<String>,
    /// Ed25519 private key signing server and session responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,
}

/// Durable directory source
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirectoryConfig {
    /// JSON seed with datacenters, relays and buyers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_relay_ttl() -> u64 {
    30
}

fn default_server_ttl() -> u64 {
    30
}

fn default_session_ttl() -> u64 {
    60
}

fn default_store_timeout() -> u64 {
    3
}

fn default_sdk_version_min() -> String {
    "4.0.0".to_string()
}

fn default_max_jitter() -> f32 {
    10.0
}

fn default_max_packet_loss() -> f32 {
    0.1
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            relay_ttl_secs: default_relay_ttl(),
            server_ttl_secs: default_server_ttl(),
            session_ttl_secs: default_session_ttl(),
            store_timeout_secs: default_store_timeout(),
            sdk_version_min: default_sdk_version_min(),
            max_jitter: default_max_jitter(),
            max_packet_loss: default_max_packet_loss(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn decode_key(name: &str, value: &str) -> anyhow::Result<Zeroizing<[u8; 32]>> {
    let bytes = Zeroizing::new(
        hex::decode(value.trim()).map_err(|e| anyhow::anyhow!("{name} is not valid hex: {e}"))?,
    );
    let mut key = Zeroizing::new([0u8; 32]);
    if bytes.len() != key.len() {
        anyhow::bail!("{name} must be 32 bytes, got {}", bytes.len());
    }
    key.copy_from_slice(&bytes);
    Ok(key)
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("relaynet/config.toml")
    }

    /// Load config from `path`, or the default path, falling back to defaults
    /// when the default file does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed, or an
    /// explicitly given file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Backend tuning as the library type
    ///
    /// # Errors
    ///
    /// Returns an error if the SDK version does not parse.
    pub fn backend_config(&self) -> anyhow::Result<BackendConfig> {
        let section = &self.backend;
        let sdk_version_min: SdkVersion = section
            .sdk_version_min
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid sdk_version_min: {e}"))?;
        Ok(BackendConfig {
            relay_ttl: Duration::from_secs(section.relay_ttl_secs),
            server_ttl: Duration::from_secs(section.server_ttl_secs),
            session_ttl: Duration::from_secs(section.session_ttl_secs),
            store_timeout: Duration::from_secs(section.store_timeout_secs),
            sdk_version_min,
            max_jitter: section.max_jitter,
            max_packet_loss: section.max_packet_loss,
        })
    }

    /// Configured backend keys, or `None` if either key is missing
    ///
    /// # Errors
    ///
    /// Returns an error if a configured key is not 32 hex-encoded bytes.
    pub fn backend_keys(&self) -> anyhow::Result<Option<BackendKeys>> {
        let (Some(relay), Some(signing)) = (&self.keys.relay_private_key, &self.keys.signing_key)
        else {
            return Ok(None);
        };
        let relay = decode_key("relay_private_key", relay)?;
        let signing = decode_key("signing_key", signing)?;
        Ok(Some(BackendKeys::new(
            PrivateKey::from_bytes(*relay),
            SigningKey::from_bytes(&signing),
        )))
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        let backend = self.backend_config()?;

        if backend.relay_ttl.is_zero()
            || backend.server_ttl.is_zero()
            || backend.session_ttl.is_zero()
        {
            anyhow::bail!("TTLs must be at least one second");
        }

        if backend.store_timeout.is_zero() || backend.store_timeout >= backend.relay_ttl {
            anyhow::bail!("store_timeout_secs must be between 1 and relay_ttl_secs");
        }

        if !(backend.max_jitter >= 0.0 && backend.max_packet_loss >= 0.0) {
            anyhow::bail!("max_jitter and max_packet_loss must not be negative");
        }

        if self.keys.relay_private_key.is_some() != self.keys.signing_key.is_some() {
            anyhow::bail!("relay_private_key and signing_key must be set together");
        }
        self.backend_keys()?;

        if let Some(seed) = &self.directory.seed_file {
            if !seed.exists() {
                anyhow::bail!("seed file not found: {}", seed.display());
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }
}
