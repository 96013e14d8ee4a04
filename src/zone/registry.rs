//! Zone definition registry backed by a named.conf-style file
//!
//! Each zone is one stanza of the form
//!
//! ```text
//! zone "example.com" {
//!     type master;
//!     file "/var/lib/bind/db.example.com";
//! };
//! ```
//!
//! Read-modify-write of the definitions file is serialized within this
//! process only. Other writers of the same file are not coordinated with.

use super::{Zone, ZoneType, extract_soa, same_name};
use crate::error::{BifrostError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Access to the server's zone definitions and zone files
#[async_trait]
pub trait ZoneRegistry: Send + Sync {
    /// All zones currently defined, with serials read from their zone files
    async fn list_zones(&self) -> Result<Vec<Zone>>;

    /// Append a zone definition; fails if the zone is already defined
    async fn add_zone_entry(
        &self,
        name: &str,
        zone_type: ZoneType,
        file_ref: Option<&str>,
    ) -> Result<()>;

    /// Remove a zone definition, returning the removed entry
    async fn remove_zone_entry(&self, name: &str) -> Result<Zone>;

    async fn read_zone_file(&self, file_ref: &str) -> Result<String>;

    /// Write a zone file, returning the resolved path
    async fn write_zone_file(&self, file_ref: &str, contents: &str) -> Result<PathBuf>;

    async fn delete_zone_file(&self, file_ref: &str) -> Result<()>;

    /// Resolve a file reference to a filesystem path
    fn zone_file_path(&self, file_ref: &str) -> PathBuf;
}

/// Registry over a single named.conf-style definitions file
pub struct NamedConfRegistry {
    conf_path: PathBuf,
    zone_dir: PathBuf,
    update_key: Option<String>,
    lock: Mutex<()>,
}

impl NamedConfRegistry {
    pub fn new(conf_path: impl Into<PathBuf>, zone_dir: impl Into<PathBuf>) -> Self {
        Self {
            conf_path: conf_path.into(),
            zone_dir: zone_dir.into(),
            update_key: None,
            lock: Mutex::new(()),
        }
    }

    /// Grant dynamic updates to this TSIG key on newly added master zones
    pub fn with_update_key(mut self, key_name: impl Into<String>) -> Self {
        self.update_key = Some(key_name.into());
        self
    }

    pub fn conf_path(&self) -> &Path {
        &self.conf_path
    }

    /// A missing definitions file is an empty registry
    async fn read_conf(&self) -> Result<String> {
        match tokio::fs::read_to_string(&self.conf_path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Definitions file {} not found", self.conf_path.display());
                Ok(String::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn render_stanza(&self, name: &str, zone_type: ZoneType, file_ref: Option<&str>) -> String {
        let mut stanza = format!("zone \"{}\" {{\n    type {};\n", name, zone_type.as_str());
        if let Some(file) = file_ref {
            stanza.push_str(&format!("    file \"{}\";\n", file));
        }
        if let (ZoneType::Master, Some(key)) = (zone_type, &self.update_key) {
            stanza.push_str(&format!("    allow-update {{ key \"{}\"; }};\n", key));
        }
        stanza.push_str("};\n");
        stanza
    }
}

#[async_trait]
impl ZoneRegistry for NamedConfRegistry {
    async fn list_zones(&self) -> Result<Vec<Zone>> {
        let text = self.read_conf().await?;
        let mut zones = Vec::new();

        for stanza in parse_stanzas(&text)? {
            let mut zone = Zone::new(stanza.name, stanza.zone_type, stanza.file_ref);
            if let Some(file_ref) = &zone.file_ref {
                let path = self.zone_file_path(file_ref);
                match tokio::fs::read_to_string(&path).await {
                    Ok(contents) => zone.serial = extract_soa(&contents).map(|soa| soa.serial),
                    Err(e) => debug!("Zone file {} unreadable: {}", path.display(), e),
                }
            }
            zones.push(zone);
        }

        Ok(zones)
    }

    async fn add_zone_entry(
        &self,
        name: &str,
        zone_type: ZoneType,
        file_ref: Option<&str>,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut text = self.read_conf().await?;
        if parse_stanzas(&text)?.iter().any(|s| same_name(&s.name, name)) {
            return Err(BifrostError::AlreadyExists(format!("zone {}", name)));
        }

        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&self.render_stanza(name, zone_type, file_ref));
        tokio::fs::write(&self.conf_path, text).await?;

        info!("Added {} zone {} to {}", zone_type, name, self.conf_path.display());
        Ok(())
    }

    async fn remove_zone_entry(&self, name: &str) -> Result<Zone> {
        let _guard = self.lock.lock().await;

        let text = self.read_conf().await?;
        let stanza = parse_stanzas(&text)?
            .into_iter()
            .find(|s| same_name(&s.name, name))
            .ok_or_else(|| BifrostError::NotFound(format!("zone {}", name)))?;

        // Take the line break after the stanza with it
        let mut end = stanza.end;
        if text[end..].starts_with("\r\n") {
            end += 2;
        } else if text[end..].starts_with('\n') {
            end += 1;
        }

        let mut updated = String::with_capacity(text.len());
        updated.push_str(&text[..stanza.start]);
        updated.push_str(&text[end..]);
        tokio::fs::write(&self.conf_path, updated).await?;

        info!("Removed zone {} from {}", stanza.name, self.conf_path.display());
        Ok(Zone::new(stanza.name, stanza.zone_type, stanza.file_ref))
    }

    async fn read_zone_file(&self, file_ref: &str) -> Result<String> {
        let path = self.zone_file_path(file_ref);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BifrostError::NotFound(
                format!("zone file {}", path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_zone_file(&self, file_ref: &str, contents: &str) -> Result<PathBuf> {
        let path = self.zone_file_path(file_ref);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents).await?;
        debug!("Wrote zone file {}", path.display());
        Ok(path)
    }

    async fn delete_zone_file(&self, file_ref: &str) -> Result<()> {
        let path = self.zone_file_path(file_ref);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Zone file {} already gone", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn zone_file_path(&self, file_ref: &str) -> PathBuf {
        let path = Path::new(file_ref);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.zone_dir.join(path)
        }
    }
}

/// A zone stanza and its byte span in the definitions file
#[derive(Debug, Clone, PartialEq, Eq)]
struct Stanza {
    name: String,
    zone_type: ZoneType,
    file_ref: Option<String>,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Open,
    Close,
    Semi,
}

/// Split a named.conf-style file into tokens with their starting offsets
///
/// `//`, `#` and `/* */` comments are dropped.
fn tokenize(text: &str) -> Result<Vec<(Token, usize, usize)>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b if b.is_ascii_whitespace() => i += 1,
            b'#' => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let close = text[i + 2..].find("*/").ok_or_else(|| {
                    BifrostError::Configuration("unterminated comment in zone definitions".to_string())
                })?;
                i += close + 4;
            }
            b'{' => {
                tokens.push((Token::Open, i, i + 1));
                i += 1;
            }
            b'}' => {
                tokens.push((Token::Close, i, i + 1));
                i += 1;
            }
            b';' => {
                tokens.push((Token::Semi, i, i + 1));
                i += 1;
            }
            b'"' => {
                let close = text[i + 1..].find('"').ok_or_else(|| {
                    BifrostError::Configuration("unterminated string in zone definitions".to_string())
                })?;
                let end = i + 1 + close;
                tokens.push((Token::Quoted(text[i + 1..end].to_string()), i, end + 1));
                i = end + 1;
            }
            _ => {
                let start = i;
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && !matches!(bytes[i], b'{' | b'}' | b';' | b'"')
                {
                    i += 1;
                }
                tokens.push((Token::Word(text[start..i].to_string()), start, i));
            }
        }
    }

    Ok(tokens)
}

fn skip_line(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
    }
    i
}

/// Find every top-level `zone` stanza
fn parse_stanzas(text: &str) -> Result<Vec<Stanza>> {
    let tokens = tokenize(text)?;
    let mut stanzas = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < tokens.len() {
        let (token, start, _) = &tokens[i];
        match token {
            Token::Word(word) if depth == 0 && word.eq_ignore_ascii_case("zone") => {
                let name = match tokens.get(i + 1) {
                    Some((Token::Quoted(name), _, _)) | Some((Token::Word(name), _, _)) => name.clone(),
                    _ => {
                        i += 1;
                        continue;
                    }
                };
                // Optional class between the name and the body
                let mut j = i + 2;
                if matches!(tokens.get(j), Some((Token::Word(_), _, _))) {
                    j += 1;
                }
                if !matches!(tokens.get(j), Some((Token::Open, _, _))) {
                    i += 1;
                    continue;
                }

                let (body, end, next) = read_body(&tokens, j, &name)?;
                match body.zone_type {
                    Some(zone_type) => stanzas.push(Stanza {
                        name,
                        zone_type,
                        file_ref: body.file_ref,
                        start: *start,
                        end,
                    }),
                    None => debug!("Skipping zone {} with unmanaged type", name),
                }
                i = next;
            }
            Token::Open => {
                depth += 1;
                i += 1;
            }
            Token::Close => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            _ => i += 1,
        }
    }

    Ok(stanzas)
}

#[derive(Default)]
struct StanzaBody {
    zone_type: Option<ZoneType>,
    file_ref: Option<String>,
}

/// Read a zone body starting at its opening brace
///
/// Returns the body, the end offset of the stanza (after the closing `;`
/// when present) and the index of the next token.
fn read_body(
    tokens: &[(Token, usize, usize)],
    open: usize,
    name: &str,
) -> Result<(StanzaBody, usize, usize)> {
    let mut body = StanzaBody::default();
    let mut depth = 0usize;
    let mut i = open;

    while i < tokens.len() {
        let (token, _, end) = &tokens[i];
        match token {
            Token::Open => depth += 1,
            Token::Close => {
                depth -= 1;
                if depth == 0 {
                    let mut end = *end;
                    let mut next = i + 1;
                    if let Some((Token::Semi, _, semi_end)) = tokens.get(next) {
                        end = *semi_end;
                        next += 1;
                    }
                    return Ok((body, end, next));
                }
            }
            Token::Word(word) if depth == 1 => match (word.to_lowercase().as_str(), tokens.get(i + 1)) {
                ("type", Some((Token::Word(value), _, _))) => body.zone_type = ZoneType::parse(value),
                ("file", Some((Token::Quoted(value), _, _))) => body.file_ref = Some(value.clone()),
                _ => {}
            },
            _ => {}
        }
        i += 1;
    }

    Err(BifrostError::Configuration(format!(
        "unclosed definition for zone {}",
        name
    )))
}
