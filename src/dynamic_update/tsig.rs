//! TSIG keys for authenticating dynamic updates and transfers
//!
//! Keys are generated by the server's key generator and stored one per file
//! as `key` stanzas the server can include directly.

use crate::error::{BifrostError, Result};
use crate::record::validation::is_valid_domain_name;
use crate::record::ValidationError;
use crate::server::CommandRunner;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// TSIG algorithm types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TsigAlgorithm {
    #[serde(rename = "hmac-md5")]
    HmacMd5,
    #[serde(rename = "hmac-sha1")]
    HmacSha1,
    #[serde(rename = "hmac-sha224")]
    HmacSha224,
    #[default]
    #[serde(rename = "hmac-sha256")]
    HmacSha256,
    #[serde(rename = "hmac-sha384")]
    HmacSha384,
    #[serde(rename = "hmac-sha512")]
    HmacSha512,
}

impl TsigAlgorithm {
    /// Get the algorithm name as used in DNS
    pub fn name(&self) -> &'static str {
        match self {
            TsigAlgorithm::HmacMd5 => "hmac-md5",
            TsigAlgorithm::HmacSha1 => "hmac-sha1",
            TsigAlgorithm::HmacSha224 => "hmac-sha224",
            TsigAlgorithm::HmacSha256 => "hmac-sha256",
            TsigAlgorithm::HmacSha384 => "hmac-sha384",
            TsigAlgorithm::HmacSha512 => "hmac-sha512",
        }
    }

    /// Parse algorithm from name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().trim_end_matches('.').to_lowercase().as_str() {
            "hmac-md5" | "hmac-md5.sig-alg.reg.int" => Some(TsigAlgorithm::HmacMd5),
            "hmac-sha1" => Some(TsigAlgorithm::HmacSha1),
            "hmac-sha224" => Some(TsigAlgorithm::HmacSha224),
            "hmac-sha256" => Some(TsigAlgorithm::HmacSha256),
            "hmac-sha384" => Some(TsigAlgorithm::HmacSha384),
            "hmac-sha512" => Some(TsigAlgorithm::HmacSha512),
            _ => None,
        }
    }
}

impl fmt::Display for TsigAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// TSIG key
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TsigKey {
    pub name: String,
    pub algorithm: TsigAlgorithm,
    /// Shared secret (base64 encoded)
    #[serde(skip_serializing)]
    pub secret: String,
    pub created: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl fmt::Debug for TsigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TsigKey")
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .field("secret", &"<redacted>")
            .field("created", &self.created)
            .field("last_used", &self.last_used)
            .finish()
    }
}

impl TsigKey {
    /// Create a key, checking the secret is valid base64
    pub fn new(name: &str, algorithm: TsigAlgorithm, secret: &str) -> Result<Self> {
        validate_secret(secret)
            .map_err(|e| BifrostError::invalid_record(name, "TSIG", e))?;
        Ok(Self {
            name: name.trim_end_matches('.').to_lowercase(),
            algorithm,
            secret: secret.to_string(),
            created: Utc::now(),
            last_used: None,
        })
    }

    /// Key stanza as written to the key file
    pub fn to_stanza(&self) -> String {
        format!(
            "// created {}\nkey \"{}\" {{\n    algorithm {};\n    secret \"{}\";\n}};\n",
            self.created.to_rfc3339(),
            self.name,
            self.algorithm,
            self.secret
        )
    }

    /// Parse a key file holding one `key` stanza
    pub fn from_stanza(text: &str) -> Result<Self> {
        let mut name = None;
        let mut algorithm = None;
        let mut secret = None;
        let mut created = None;

        for line in text.lines() {
            let line = line.trim();
            if let Some(stamp) = line.strip_prefix("// created ") {
                created = DateTime::parse_from_rfc3339(stamp.trim())
                    .ok()
                    .map(|t| t.with_timezone(&Utc));
            } else if line.starts_with("key ") {
                name = line.split('"').nth(1).map(str::to_string);
            } else if let Some(rest) = line.strip_prefix("algorithm ") {
                algorithm = TsigAlgorithm::from_name(rest.trim_end_matches(';'));
            } else if line.starts_with("secret ") {
                secret = line.split('"').nth(1).map(str::to_string);
            }
        }

        let malformed = |what: &str| BifrostError::Configuration(format!("key file has no {}", what));
        let name = name.ok_or_else(|| malformed("key name"))?;
        let algorithm = algorithm.ok_or_else(|| malformed("supported algorithm"))?;
        let secret = secret.ok_or_else(|| malformed("secret"))?;

        let mut key = TsigKey::new(&name, algorithm, &secret)?;
        if let Some(created) = created {
            key.created = created;
        }
        Ok(key)
    }
}

/// Pull the secret out of key generator output
pub fn extract_secret(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("secret "))
        .and_then(|line| line.split('"').nth(1))
        .map(str::to_string)
}

fn validate_secret(secret: &str) -> std::result::Result<(), ValidationError> {
    if secret.is_empty() {
        return Err(ValidationError::new("secret", "secret is empty"));
    }
    BASE64
        .decode(secret)
        .map(|_| ())
        .map_err(|e| ValidationError::new("secret", format!("secret is not valid base64: {}", e)))
}

/// Key files in a directory, plus in-memory last-used tracking
pub struct TsigKeyStore {
    runner: Arc<dyn CommandRunner>,
    program: String,
    key_dir: PathBuf,
    external: HashMap<PathBuf, String>,
    usage: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl TsigKeyStore {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>, key_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            program: program.into(),
            key_dir: key_dir.into(),
            external: HashMap::new(),
            usage: RwLock::new(HashMap::new()),
        }
    }

    /// Track usage of key `name` kept in a file outside the key directory
    pub fn with_key_file(mut self, path: impl Into<PathBuf>, name: &str) -> Self {
        self.external
            .insert(path.into(), name.trim_end_matches('.').to_lowercase());
        self
    }

    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    /// Path of the file holding key `name`
    pub fn key_path(&self, name: &str) -> PathBuf {
        self.key_dir
            .join(format!("{}.key", name.trim_end_matches('.').to_lowercase()))
    }

    /// Generate a key with the key generator and store it
    pub async fn generate(&self, name: &str, algorithm: TsigAlgorithm) -> Result<TsigKey> {
        if !is_valid_domain_name(name) {
            return Err(BifrostError::invalid_record(
                name,
                "TSIG",
                ValidationError::new("name", "key name must be a valid domain name"),
            ));
        }

        let path = self.key_path(name);
        if tokio::fs::try_exists(&path).await? {
            return Err(BifrostError::AlreadyExists(format!("key {}", name)));
        }

        let args = vec![
            "-a".to_string(),
            algorithm.name().to_string(),
            name.to_string(),
        ];
        let output = self
            .runner
            .run(&self.program, &args, None)
            .await
            .map_err(|e| BifrostError::Transaction(format!("failed to run {}: {}", self.program, e)))?;
        if !output.success() {
            return Err(BifrostError::Transaction(output.diagnostic()));
        }

        let secret = extract_secret(&output.stdout).ok_or_else(|| {
            BifrostError::Transaction("key generator output has no secret".to_string())
        })?;
        let key = TsigKey::new(name, algorithm, &secret)?;

        tokio::fs::create_dir_all(&self.key_dir).await?;
        tokio::fs::write(&path, key.to_stanza()).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        info!("Generated {} key {} at {}", algorithm, key.name, path.display());
        Ok(key)
    }

    /// All stored keys, sorted by name
    pub async fn list(&self) -> Result<Vec<TsigKey>> {
        let mut entries = match tokio::fs::read_dir(&self.key_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("key") {
                continue;
            }
            let text = tokio::fs::read_to_string(&path).await?;
            match TsigKey::from_stanza(&text) {
                Ok(key) => keys.push(self.with_usage(key)),
                Err(e) => warn!("Skipping key file {}: {}", path.display(), e),
            }
        }

        keys.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(keys)
    }

    pub async fn get(&self, name: &str) -> Result<TsigKey> {
        let path = self.key_path(name);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BifrostError::NotFound(format!("key {}", name)));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self.with_usage(TsigKey::from_stanza(&text)?))
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.key_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.usage.write().remove(&name.trim_end_matches('.').to_lowercase());
                info!("Deleted key {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BifrostError::NotFound(format!("key {}", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record that key `name` was just used
    pub fn mark_used(&self, name: &str) {
        let name = name.trim_end_matches('.').to_lowercase();
        debug!("Key {} used", name);
        self.usage.write().insert(name, Utc::now());
    }

    /// Name of the key held in `path`, if the store knows the file
    pub fn key_name_for(&self, path: &Path) -> Option<String> {
        if let Some(name) = self.external.get(path) {
            return Some(name.clone());
        }
        if path.parent() != Some(self.key_dir.as_path())
            || path.extension().and_then(|e| e.to_str()) != Some("key")
        {
            return None;
        }
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
    }

    /// Record a use of whichever key `path` holds
    pub fn mark_file_used(&self, path: &Path) {
        match self.key_name_for(path) {
            Some(name) => self.mark_used(&name),
            None => debug!("Key file {} is not tracked", path.display()),
        }
    }

    fn with_usage(&self, mut key: TsigKey) -> TsigKey {
        key.last_used = self.usage.read().get(&key.name).copied();
        key
    }
}
