use crate::dynamic_update::DEFAULT_BATCH_SIZE;
use crate::error::ConfigError;
use crate::record::constants::DEFAULT_TTL;
use crate::zone::transfer::{DEFAULT_LARGE_ZONE_THRESHOLD, DEFAULT_TRANSFER_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest TTL allowed by RFC 2181
const MAX_TTL: u32 = 2_147_483_647;

/// External tools the engine drives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub nsupdate: String,
    pub rndc: String,
    pub dig: String,
    pub named_checkzone: String,
    pub tsig_keygen: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            nsupdate: "nsupdate".to_string(),
            rndc: "rndc".to_string(),
            dig: "dig".to_string(),
            named_checkzone: "named-checkzone".to_string(),
            tsig_keygen: "tsig-keygen".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Server receiving dynamic updates and serving transfers
    pub server_host: String,
    pub server_port: u16,

    /// TSIG key file used for updates and transfers
    pub key_file: PathBuf,

    /// Key granted `allow-update` on zones created by the engine
    pub key_name: Option<String>,

    /// Zone definitions file (named.conf style)
    pub named_conf: PathBuf,

    /// Directory relative zone file references resolve against
    pub zone_dir: PathBuf,

    /// Directory holding generated TSIG key files
    pub key_dir: PathBuf,

    /// Control channel configuration file (`rndc -c`)
    pub rndc_config: Option<PathBuf>,

    pub tools: ToolPaths,

    /// Records per update transaction
    pub batch_size: usize,

    /// TTL for records and zones that do not specify one
    pub default_ttl: u32,

    /// Transfer timeout in seconds
    pub transfer_timeout_secs: u64,

    /// Record count above which incremental transfers are recommended
    pub large_zone_threshold: usize,

    /// Run the zone checker over new zone files before registering them
    pub check_zones: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 53,
            key_file: PathBuf::from("/etc/bind/keys/ddns.key"),
            key_name: None,
            named_conf: PathBuf::from("/etc/bind/named.conf.local"),
            zone_dir: PathBuf::from("/var/lib/bind"),
            key_dir: PathBuf::from("/etc/bind/keys"),
            rndc_config: None,
            tools: ToolPaths::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            default_ttl: DEFAULT_TTL,
            transfer_timeout_secs: DEFAULT_TRANSFER_TIMEOUT.as_secs(),
            large_zone_threshold: DEFAULT_LARGE_ZONE_THRESHOLD,
            check_zones: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Load configuration from a TOML file; missing keys take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::ParseError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// File (when given), then environment overrides, then validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `BIFROST_*` environment variables
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars<F>(mut self, var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("BIFROST_SERVER_HOST") {
            self.server_host = host;
        }

        if let Some(port) = var("BIFROST_SERVER_PORT") {
            self.server_port = port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }

        if let Some(path) = var("BIFROST_KEY_FILE") {
            self.key_file = PathBuf::from(path);
        }

        if let Some(name) = var("BIFROST_KEY_NAME") {
            self.key_name = Some(name).filter(|n| !n.is_empty());
        }

        if let Some(path) = var("BIFROST_NAMED_CONF") {
            self.named_conf = PathBuf::from(path);
        }

        if let Some(path) = var("BIFROST_ZONE_DIR") {
            self.zone_dir = PathBuf::from(path);
        }

        if let Some(path) = var("BIFROST_KEY_DIR") {
            self.key_dir = PathBuf::from(path);
        }

        if let Some(path) = var("BIFROST_RNDC_CONFIG") {
            self.rndc_config = Some(PathBuf::from(path));
        }

        if let Some(path) = var("BIFROST_NSUPDATE") {
            self.tools.nsupdate = path;
        }
        if let Some(path) = var("BIFROST_RNDC") {
            self.tools.rndc = path;
        }
        if let Some(path) = var("BIFROST_DIG") {
            self.tools.dig = path;
        }
        if let Some(path) = var("BIFROST_NAMED_CHECKZONE") {
            self.tools.named_checkzone = path;
        }
        if let Some(path) = var("BIFROST_TSIG_KEYGEN") {
            self.tools.tsig_keygen = path;
        }

        if let Some(size) = var("BIFROST_BATCH_SIZE") {
            self.batch_size = size
                .parse()
                .map_err(|_| ConfigError::InvalidBatchSize(size.clone()))?;
        }

        if let Some(ttl) = var("BIFROST_DEFAULT_TTL") {
            self.default_ttl = ttl.parse().map_err(|_| ConfigError::InvalidTtl(ttl.clone()))?;
        }

        if let Some(timeout) = var("BIFROST_TRANSFER_TIMEOUT") {
            self.transfer_timeout_secs = timeout
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(timeout.clone()))?;
        }

        if let Some(threshold) = var("BIFROST_LARGE_ZONE_THRESHOLD") {
            self.large_zone_threshold = threshold.parse().map_err(|_| {
                ConfigError::ParseError(format!("Invalid large zone threshold: {}", threshold))
            })?;
        }

        if let Some(check) = var("BIFROST_CHECK_ZONES") {
            self.check_zones = parse_bool(&check, self.check_zones);
        }

        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_host.trim().is_empty() || self.server_host.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidServerAddress(format!(
                "'{}' is not a host name or address",
                self.server_host
            )));
        }

        if self.server_port == 0 {
            return Err(ConfigError::InvalidPort("Port must be greater than 0".to_string()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(
                "Batch size must be between 1 and 1000".to_string(),
            ));
        }

        if self.transfer_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(
                "Timeout must be greater than 0".to_string(),
            ));
        }
        if self.transfer_timeout_secs > 3600 {
            return Err(ConfigError::InvalidTimeout(
                "Timeout too large (max 3600 seconds)".to_string(),
            ));
        }

        if self.default_ttl > MAX_TTL {
            return Err(ConfigError::InvalidTtl(format!(
                "TTL too large (max {})",
                MAX_TTL
            )));
        }

        Ok(())
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    /// Leading arguments for every control channel command
    pub fn rndc_args(&self) -> Vec<String> {
        match &self.rndc_config {
            Some(path) => vec!["-c".to_string(), path.display().to_string()],
            None => Vec::new(),
        }
    }
}

/// Parse boolean from string (supports various formats)
fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
