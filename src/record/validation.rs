//! Per-type record validation
//!
//! Every rule here is a hard invariant: a record that fails validation is
//! never handed to the update channel.

use super::constants::{MAX_DOMAIN_LENGTH, MAX_LABEL_LENGTH, MAX_TXT_LENGTH};
use super::{Record, RecordType, codec};
use std::net::Ipv6Addr;
use thiserror::Error;

/// A validation failure naming the offending field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

type Result<T> = std::result::Result<T, ValidationError>;

const CAA_TAGS: &[&str] = &["issue", "issuewild", "iodef"];
const SPF_TERMINATORS: &[&str] = &["~all", "+all", "-all"];

/// Validate a record value together with its type-specific fields
pub fn validate(
    rtype: &RecordType,
    value: &str,
    priority: Option<u32>,
    weight: Option<u32>,
    port: Option<u32>,
) -> Result<()> {
    // Update scripts are line oriented
    reject_control_characters(value, "value")?;

    match rtype {
        RecordType::A => validate_ipv4(value),
        RecordType::AAAA => validate_ipv6(value),
        RecordType::CNAME | RecordType::NS | RecordType::PTR => check_target(value, "value"),
        RecordType::MX => {
            check_u16_field("priority", priority, 0, "MX")?;
            check_target(value, "value")
        }
        RecordType::SRV => {
            check_u16_field("priority", priority, 0, "SRV")?;
            check_u16_field("weight", weight, 0, "SRV")?;
            check_u16_field("port", port, 1, "SRV")?;
            check_target(value, "value")
        }
        RecordType::TXT => validate_txt(&codec::unquote_txt(value)),
        RecordType::CAA => validate_caa(value),
        RecordType::SOA => validate_soa(value),
        RecordType::Other(name) => Err(ValidationError::new(
            "type",
            format!("record type {} cannot be managed", name),
        )),
    }
}

/// Validate a complete record: owner name, apex rules and value
pub fn validate_record(record: &Record) -> Result<()> {
    // Apex CNAMEs are illegal whatever the target
    if record.rtype == RecordType::CNAME && record.is_apex() {
        return Err(ValidationError::new(
            "name",
            "CNAME records are not permitted at the zone apex",
        ));
    }

    validate_owner_name(&record.name)?;

    validate(
        &record.rtype,
        &record.data.value,
        record.data.priority,
        record.data.weight,
        record.data.port,
    )
}

/// Validate a domain name (hostname grammar, trailing dot allowed)
pub fn validate_domain_name(name: &str) -> Result<()> {
    check_domain(name, "value")
}

pub fn is_valid_domain_name(name: &str) -> bool {
    check_domain(name, "value").is_ok()
}

/// Validate an owner name; service labels (`_sip`) and wildcards are allowed
pub fn validate_owner_name(name: &str) -> Result<()> {
    reject_control_characters(name, "name")?;
    let name = name.trim();
    if name == "@" {
        return Ok(());
    }

    let stripped = name.strip_suffix('.').unwrap_or(name);
    if stripped.is_empty() {
        return Err(ValidationError::new("name", "name must not be empty"));
    }
    if stripped.len() > MAX_DOMAIN_LENGTH {
        return Err(ValidationError::new(
            "name",
            format!("name exceeds {} characters", MAX_DOMAIN_LENGTH),
        ));
    }

    for label in stripped.split('.') {
        if label.is_empty() {
            return Err(ValidationError::new("name", "name contains an empty label"));
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(ValidationError::new(
                "name",
                format!("label '{}' exceeds {} characters", label, MAX_LABEL_LENGTH),
            ));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '*')
        {
            return Err(ValidationError::new(
                "name",
                format!("label '{}' contains invalid characters", label),
            ));
        }
    }

    Ok(())
}

/// Validate an IPv4 address usable as an A record
pub fn validate_ipv4(value: &str) -> Result<()> {
    let parts: Vec<&str> = value.split('.').collect();
    if parts.len() != 4 {
        return Err(ValidationError::new(
            "value",
            format!("'{}' is not a dotted-quad IPv4 address", value),
        ));
    }

    let mut octets = [0u16; 4];
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() || part.len() > 3 || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::new(
                "value",
                format!("invalid octet '{}' in {}", part, value),
            ));
        }
        // At most three digits, so this cannot overflow
        let octet: u16 = part.parse().unwrap_or(u16::MAX);
        if octet > 255 {
            return Err(ValidationError::new(
                "value",
                format!("octet {} out of range in {}", octet, value),
            ));
        }
        octets[i] = octet;
    }

    match octets[0] {
        0 => Err(ValidationError::new("value", "first octet 0 is reserved")),
        127 => Err(ValidationError::new("value", "loopback addresses are not allowed")),
        n if n >= 224 => Err(ValidationError::new(
            "value",
            "multicast and reserved addresses are not allowed",
        )),
        _ => Ok(()),
    }
}

/// Validate an IPv6 address, including zone-id and embedded IPv4 forms
pub fn validate_ipv6(value: &str) -> Result<()> {
    let (address, zone_id) = match value.split_once('%') {
        Some((address, zone_id)) => (address, Some(zone_id)),
        None => (value, None),
    };

    if let Some(zone_id) = zone_id {
        if zone_id.is_empty()
            || !zone_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(ValidationError::new(
                "value",
                format!("invalid zone id in {}", value),
            ));
        }
    }

    address.parse::<Ipv6Addr>().map(|_| ()).map_err(|_| {
        ValidationError::new("value", format!("'{}' is not a valid IPv6 address", value))
    })
}

/// Validate TXT content (already unquoted)
pub fn validate_txt(text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(ValidationError::new("value", "TXT value must not be empty"));
    }
    reject_control_characters(text, "value")?;
    let length = text.chars().count();
    if length > MAX_TXT_LENGTH {
        return Err(ValidationError::new(
            "value",
            format!(
                "TXT value is {} characters, maximum is {}",
                length, MAX_TXT_LENGTH
            ),
        ));
    }

    if text.starts_with("v=spf1") {
        let trimmed = text.trim_end();
        if !SPF_TERMINATORS.iter().any(|t| trimmed.ends_with(t)) {
            return Err(ValidationError::new(
                "value",
                "SPF record must end with ~all, +all or -all",
            ));
        }
    }

    if text.starts_with("v=DKIM1") && !(text.contains("k=") && text.contains("p=")) {
        return Err(ValidationError::new(
            "value",
            "DKIM record must contain both k= and p= tags",
        ));
    }

    Ok(())
}

/// Validate CAA presentation form: `<flags> <tag> "<value>"`
pub fn validate_caa(value: &str) -> Result<()> {
    let (flags, rest) = next_token(value)
        .ok_or_else(|| ValidationError::new("value", "CAA record requires flags, tag and value"))?;
    let (tag, rest) = next_token(rest)
        .ok_or_else(|| ValidationError::new("value", "CAA record requires a tag and value"))?;
    let quoted = rest.trim();

    let flags: u32 = flags
        .parse()
        .map_err(|_| ValidationError::new("flags", format!("'{}' is not a number", flags)))?;
    if flags > 255 {
        return Err(ValidationError::new(
            "flags",
            format!("flags {} out of range 0-255", flags),
        ));
    }

    if !CAA_TAGS.contains(&tag) {
        return Err(ValidationError::new(
            "tag",
            format!("tag '{}' must be one of issue, issuewild, iodef", tag),
        ));
    }

    if quoted.len() < 2 || !quoted.starts_with('"') || !quoted.ends_with('"') {
        return Err(ValidationError::new("value", "CAA value must be quoted"));
    }
    let inner = &quoted[1..quoted.len() - 1];
    reject_control_characters(inner, "value")?;

    if tag == "iodef" && !(looks_like_email(inner) || looks_like_url(inner)) {
        return Err(ValidationError::new(
            "value",
            format!("iodef value '{}' must be an email address or URL", inner),
        ));
    }

    Ok(())
}

/// Validate SOA rdata: mname rname serial refresh retry expire minimum
pub fn validate_soa(value: &str) -> Result<()> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() != 7 {
        return Err(ValidationError::new(
            "value",
            format!("SOA record requires 7 fields, got {}", fields.len()),
        ));
    }

    check_domain(fields[0], "mname")?;
    // The first label of rname is the mailbox, so '@' stands for a dot
    check_domain(&fields[1].replace('@', "."), "rname")?;

    let numeric = ["serial", "refresh", "retry", "expire", "minimum"];
    for (field, raw) in numeric.iter().zip(&fields[2..]) {
        raw.parse::<u32>().map_err(|_| {
            ValidationError::new(*field, format!("'{}' is not an unsigned 32-bit value", raw))
        })?;
    }

    Ok(())
}

/// Reject newlines, NULs and other control characters
pub fn reject_control_characters(value: &str, field: &str) -> Result<()> {
    match value.chars().find(|c| c.is_control()) {
        Some(c) => Err(ValidationError::new(
            field,
            format!("control character {:?} is not allowed", c),
        )),
        None => Ok(()),
    }
}

fn check_target(value: &str, field: &str) -> Result<()> {
    // `@` names the zone apex, as in zone files
    if value.trim() == "@" {
        return Ok(());
    }
    check_domain(value.trim(), field)
}

fn check_domain(name: &str, field: &str) -> Result<()> {
    let stripped = name.strip_suffix('.').unwrap_or(name);

    if stripped.is_empty() {
        return Err(ValidationError::new(field, "domain name must not be empty"));
    }
    if stripped.len() > MAX_DOMAIN_LENGTH {
        return Err(ValidationError::new(
            field,
            format!("domain name exceeds {} characters", MAX_DOMAIN_LENGTH),
        ));
    }

    for label in stripped.split('.') {
        if label.is_empty() {
            return Err(ValidationError::new(
                field,
                format!("'{}' contains an empty label", name),
            ));
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(ValidationError::new(
                field,
                format!("label '{}' exceeds {} characters", label, MAX_LABEL_LENGTH),
            ));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ValidationError::new(
                field,
                format!("label '{}' contains invalid characters", label),
            ));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(ValidationError::new(
                field,
                format!("label '{}' must not start or end with a hyphen", label),
            ));
        }
    }

    Ok(())
}

fn check_u16_field(field: &str, value: Option<u32>, min: u32, rtype: &str) -> Result<()> {
    let value = value.ok_or_else(|| {
        ValidationError::new(field, format!("{} is required for {} records", field, rtype))
    })?;
    if value < min || value > u16::MAX as u32 {
        return Err(ValidationError::new(
            field,
            format!("{} must be between {} and 65535", field, min),
        ));
    }
    Ok(())
}

fn next_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(idx) => Some((&s[..idx], &s[idx..])),
        None => Some((s, "")),
    }
}

fn looks_like_email(value: &str) -> bool {
    let address = value.strip_prefix("mailto:").unwrap_or(value);
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !local.contains(char::is_whitespace)
                && domain.contains('.')
                && is_valid_domain_name(domain)
        }
        None => false,
    }
}

fn looks_like_url(value: &str) -> bool {
    let rest = match value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
    {
        Some(rest) => rest,
        None => return false,
    };
    let host = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = host.rsplit_once(':').map_or(host, |(h, _)| h);
    !host.is_empty() && !host.contains(char::is_whitespace)
}
