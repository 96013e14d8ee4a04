pub mod generator;
pub mod parser;
pub mod registry;
pub mod serial;
pub mod transfer;

pub use generator::generate;
pub use parser::{ZoneParser, extract_soa, parse};
pub use registry::{NamedConfRegistry, ZoneRegistry};
pub use transfer::{
    TransferOptions, TransferOrchestrator, TransferResult, TransferType, TransferValidation,
};

use crate::record::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Zone constants
pub mod constants {
    pub use crate::record::constants::DEFAULT_TTL;

    /// Maximum zone file size (10MB)
    pub const MAX_ZONE_FILE_SIZE: usize = 10 * 1024 * 1024;
}

/// How the server holds a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    Master,
    Slave,
    Forward,
}

impl ZoneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneType::Master => "master",
            ZoneType::Slave => "slave",
            ZoneType::Forward => "forward",
        }
    }

    /// Parse from string, accepting both old and new terminology
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "master" | "primary" => Some(ZoneType::Master),
            "slave" | "secondary" => Some(ZoneType::Slave),
            "forward" => Some(ZoneType::Forward),
            _ => None,
        }
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A zone known to the server's zone-definition registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    /// Zone name as written in the registry
    pub name: String,
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
    /// Zone file reference; forward zones have none
    pub file_ref: Option<String>,
    /// Serial from the zone file's SOA, when the file could be read
    pub serial: Option<u32>,
}

impl Zone {
    pub fn new(name: impl Into<String>, zone_type: ZoneType, file_ref: Option<String>) -> Self {
        Self {
            name: name.into(),
            zone_type,
            file_ref,
            serial: None,
        }
    }

    /// DNS names compare case-insensitively, ignoring the root dot
    pub fn is_named(&self, name: &str) -> bool {
        same_name(&self.name, name)
    }
}

/// Start of Authority fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Soa {
    pub mname: String,
    pub rname: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl FromStr for Soa {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::record::validation::validate_soa(s)?;
        let fields: Vec<&str> = s.split_whitespace().collect();
        // validate_soa guarantees seven fields with numeric tail
        let number = |i: usize| fields[i].parse::<u32>().unwrap_or_default();
        Ok(Soa {
            mname: fields[0].to_string(),
            rname: fields[1].to_string(),
            serial: number(2),
            refresh: number(3),
            retry: number(4),
            expire: number(5),
            minimum: number(6),
        })
    }
}

impl fmt::Display for Soa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.mname,
            self.rname,
            self.serial,
            self.refresh,
            self.retry,
            self.expire,
            self.minimum
        )
    }
}

/// Compare two domain names case-insensitively, ignoring a trailing dot
pub fn same_name(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}

/// Zone origin with exactly one trailing dot
pub fn fqdn(origin: &str) -> String {
    format!("{}.", origin.trim_end_matches('.'))
}

/// Expand an owner or target name to an absolute name under `origin`
pub fn absolute_name(name: &str, origin: &str) -> String {
    let name = name.trim();
    if name == "@" || name.is_empty() {
        fqdn(origin)
    } else if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.{}", name, fqdn(origin))
    }
}

/// Express an absolute name relative to `origin` (`@` for the apex)
///
/// Names outside the zone are returned absolute, with a trailing dot.
pub fn relative_name(name: &str, origin: &str) -> String {
    let bare = name.trim().trim_end_matches('.');
    let origin = origin.trim_end_matches('.');

    if origin.is_empty() {
        return fqdn(bare);
    }
    if bare.eq_ignore_ascii_case(origin) {
        return "@".to_string();
    }

    if let Some(split) = bare.len().checked_sub(origin.len() + 1) {
        // Presentation names may carry non-ASCII text; never cut a character
        if split > 0 && bare.is_char_boundary(split) {
            let (prefix, suffix) = bare.split_at(split);
            if suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(origin) {
                return prefix.to_string();
            }
        }
    }

    fqdn(bare)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_type_aliases() {
        assert_eq!(ZoneType::parse("primary"), Some(ZoneType::Master));
        assert_eq!(ZoneType::parse("SLAVE"), Some(ZoneType::Slave));
        assert_eq!(ZoneType::parse("secondary"), Some(ZoneType::Slave));
        assert_eq!(ZoneType::parse("forward"), Some(ZoneType::Forward));
        assert_eq!(ZoneType::parse("hint"), None);
    }

    #[test]
    fn test_name_helpers() {
        assert_eq!(absolute_name("@", "example.com"), "example.com.");
        assert_eq!(absolute_name("www", "example.com."), "www.example.com.");
        assert_eq!(absolute_name("mail.other.net.", "example.com"), "mail.other.net.");

        assert_eq!(relative_name("example.com.", "example.com"), "@");
        assert_eq!(relative_name("WWW.Example.COM.", "example.com"), "WWW");
        assert_eq!(relative_name("a.b.example.com", "example.com."), "a.b");
        assert_eq!(relative_name("notexample.com.", "example.com"), "notexample.com.");
        assert_eq!(relative_name("mail.other.net.", "example.com"), "mail.other.net.");

        assert!(same_name("Example.com.", "example.com"));
    }

    #[test]
    fn test_relative_name_non_ascii() {
        assert_eq!(relative_name("é.bcde.", "a.com"), "é.bcde.");
        assert_eq!(relative_name("ü.a.com.", "a.com"), "ü");
        assert_eq!(relative_name("é", "a.com"), "é.");
    }

    #[test]
    fn test_soa_parse_and_display() {
        let text = "ns1.example.com. admin.example.com. 2024010101 3600 900 604800 86400";
        let soa: Soa = text.parse().unwrap();
        assert_eq!(soa.serial, 2024010101);
        assert_eq!(soa.minimum, 86400);
        assert_eq!(soa.to_string(), text);

        assert!("ns1.example.com. admin.example.com. 1 2 3".parse::<Soa>().is_err());
    }
}
