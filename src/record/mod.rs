//! Resource record model and the type-aware record codec
//!
//! Records are kept in the textual form used by zone files and by the
//! dynamic update channel. `validation` holds the per-type rules and
//! `codec` converts between structured fields and wire values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod codec;
pub mod validation;

pub use codec::{format, parse};
pub use validation::{ValidationError, validate, validate_record};

/// Record constants
pub mod constants {
    /// Default TTL applied when a record does not carry one (1 hour)
    pub const DEFAULT_TTL: u32 = 3600;

    /// Maximum length of a domain name in presentation form
    pub const MAX_DOMAIN_LENGTH: usize = 253;

    /// Maximum length of a single label
    pub const MAX_LABEL_LENGTH: usize = 63;

    /// Maximum length of a TXT value
    pub const MAX_TXT_LENGTH: usize = 255;
}

/// Types that may appear in zone files or transfers but are not managed here
const PASSTHROUGH_TYPES: &[&str] = &[
    "AFSDB",
    "CDNSKEY",
    "CDS",
    "CERT",
    "DNAME",
    "DNSKEY",
    "DS",
    "HINFO",
    "HTTPS",
    "LOC",
    "NAPTR",
    "NSEC",
    "NSEC3",
    "NSEC3PARAM",
    "OPENPGPKEY",
    "RP",
    "RRSIG",
    "SMIMEA",
    "SPF",
    "SSHFP",
    "SVCB",
    "TLSA",
    "URI",
    "ZONEMD",
];

/// DNS record type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    MX,
    SRV,
    TXT,
    NS,
    PTR,
    CAA,
    SOA,
    /// A known type this engine carries through but never writes
    Other(String),
}

impl RecordType {
    /// Presentation mnemonic (e.g. "AAAA")
    pub fn as_str(&self) -> &str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::MX => "MX",
            RecordType::SRV => "SRV",
            RecordType::TXT => "TXT",
            RecordType::NS => "NS",
            RecordType::PTR => "PTR",
            RecordType::CAA => "CAA",
            RecordType::SOA => "SOA",
            RecordType::Other(name) => name,
        }
    }

    /// Whether records of this type can be validated and written by the engine
    pub fn is_managed(&self) -> bool {
        !matches!(self, RecordType::Other(_))
    }

    /// Whether the record value is a domain name
    pub fn has_domain_target(&self) -> bool {
        matches!(
            self,
            RecordType::CNAME | RecordType::NS | RecordType::PTR | RecordType::MX | RecordType::SRV
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        let rtype = match upper.as_str() {
            "A" => RecordType::A,
            "AAAA" => RecordType::AAAA,
            "CNAME" => RecordType::CNAME,
            "MX" => RecordType::MX,
            "SRV" => RecordType::SRV,
            "TXT" => RecordType::TXT,
            "NS" => RecordType::NS,
            "PTR" => RecordType::PTR,
            "CAA" => RecordType::CAA,
            "SOA" => RecordType::SOA,
            other if PASSTHROUGH_TYPES.contains(&other) => RecordType::Other(upper.clone()),
            // RFC 3597 generic type syntax
            other
                if other.len() > 4
                    && other.starts_with("TYPE")
                    && other[4..].parse::<u16>().is_ok() =>
            {
                RecordType::Other(upper.clone())
            }
            _ => {
                return Err(ValidationError::new(
                    "type",
                    format!("unsupported record type {}", s.trim()),
                ));
            }
        };
        Ok(rtype)
    }
}

impl TryFrom<String> for RecordType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordType> for String {
    fn from(rtype: RecordType) -> Self {
        rtype.as_str().to_string()
    }
}

/// Value and type-specific fields of a record
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordData {
    /// Address, target name or text, without type-specific prefixes
    pub value: String,
    /// MX preference or SRV priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    /// SRV weight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    /// SRV port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
}

impl RecordData {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }
}

fn default_ttl() -> u32 {
    constants::DEFAULT_TTL
}

/// A single resource record within a zone
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    /// Owner name: `@`, relative to the zone origin, or absolute with a trailing dot
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: RecordType,
    #[serde(flatten)]
    pub data: RecordData,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl Record {
    /// Create a record with no type-specific fields
    pub fn new(name: impl Into<String>, rtype: RecordType, value: impl Into<String>, ttl: u32) -> Self {
        Self {
            name: name.into(),
            rtype,
            data: RecordData::new(value),
            ttl,
        }
    }

    /// Create an MX record
    pub fn mx(name: impl Into<String>, priority: u32, exchange: impl Into<String>, ttl: u32) -> Self {
        Self::new(name, RecordType::MX, exchange, ttl).with_priority(priority)
    }

    /// Create an SRV record
    pub fn srv(
        name: impl Into<String>,
        priority: u32,
        weight: u32,
        port: u32,
        target: impl Into<String>,
        ttl: u32,
    ) -> Self {
        let mut record = Self::new(name, RecordType::SRV, target, ttl);
        record.data.priority = Some(priority);
        record.data.weight = Some(weight);
        record.data.port = Some(port);
        record
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.data.priority = Some(priority);
        self
    }

    pub fn value(&self) -> &str {
        &self.data.value
    }

    /// Whether the owner is the zone apex
    pub fn is_apex(&self) -> bool {
        let name = self.name.trim();
        name == "@" || name.is_empty()
    }

    /// Update/delete identity within a zone
    pub fn key(&self) -> (String, RecordType) {
        (self.name.to_lowercase(), self.rtype.clone())
    }

    /// Value in the form written to zone files and update scripts
    pub fn wire_value(&self) -> Result<String, ValidationError> {
        codec::format(&self.rtype, &self.data)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.rtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_parsing() {
        assert_eq!("a".parse::<RecordType>().unwrap(), RecordType::A);
        assert_eq!("AAAA".parse::<RecordType>().unwrap(), RecordType::AAAA);
        assert_eq!(
            "dnskey".parse::<RecordType>().unwrap(),
            RecordType::Other("DNSKEY".to_string())
        );
        assert_eq!(
            "TYPE65534".parse::<RecordType>().unwrap(),
            RecordType::Other("TYPE65534".to_string())
        );
        assert!("BOGUS".parse::<RecordType>().is_err());
        assert!("3600".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_record_serde_shape() {
        let record = Record::srv("_sip._tcp", 10, 5, 5060, "sip.example.com.", 300);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "SRV");
        assert_eq!(json["priority"], 10);
        assert_eq!(json["port"], 5060);

        let parsed: Record =
            serde_json::from_str(r#"{"name":"www","type":"A","value":"192.0.2.1"}"#).unwrap();
        assert_eq!(parsed.ttl, constants::DEFAULT_TTL);
        assert_eq!(parsed.data.priority, None);
    }

    #[test]
    fn test_key_is_case_insensitive() {
        let a = Record::new("WWW", RecordType::A, "192.0.2.1", 300);
        let b = Record::new("www", RecordType::A, "192.0.2.2", 300);
        assert_eq!(a.key(), b.key());
    }
}
