//! Conversion between structured record fields and wire values
//!
//! The wire value is the rdata as it appears in a zone file or an update
//! script: `10 mail.example.com.` for MX, `10 5 443 svc.example.com.` for
//! SRV, a quoted string for TXT, and the bare value for everything else.

use super::constants::MAX_TXT_LENGTH;
use super::{RecordData, RecordType, ValidationError};
use std::fmt::Write;

type Result<T> = std::result::Result<T, ValidationError>;

/// Render structured fields into a wire value
pub fn format(rtype: &RecordType, data: &RecordData) -> Result<String> {
    match rtype {
        RecordType::MX => {
            let priority = required(data.priority, "priority", rtype)?;
            Ok(format!("{} {}", priority, data.value.trim()))
        }
        RecordType::SRV => {
            let priority = required(data.priority, "priority", rtype)?;
            let weight = required(data.weight, "weight", rtype)?;
            let port = required(data.port, "port", rtype)?;
            Ok(format!(
                "{} {} {} {}",
                priority,
                weight,
                port,
                data.value.trim()
            ))
        }
        RecordType::TXT => Ok(quote_txt(&txt_bytes(&data.value))),
        _ => Ok(data.value.trim().to_string()),
    }
}

/// Split a wire value into structured fields
pub fn parse(rtype: &RecordType, wire: &str) -> Result<RecordData> {
    match rtype {
        RecordType::MX => {
            let parts: Vec<&str> = wire.split_whitespace().collect();
            if parts.len() != 2 {
                return Err(ValidationError::new(
                    "value",
                    format!("MX record requires 2 fields, got {}", parts.len()),
                ));
            }
            Ok(RecordData {
                value: parts[1].to_string(),
                priority: Some(parse_number(parts[0], "priority")?),
                ..Default::default()
            })
        }
        RecordType::SRV => {
            let parts: Vec<&str> = wire.split_whitespace().collect();
            if parts.len() != 4 {
                return Err(ValidationError::new(
                    "value",
                    format!("SRV record requires 4 fields, got {}", parts.len()),
                ));
            }
            Ok(RecordData {
                value: parts[3].to_string(),
                priority: Some(parse_number(parts[0], "priority")?),
                weight: Some(parse_number(parts[1], "weight")?),
                port: Some(parse_number(parts[2], "port")?),
            })
        }
        RecordType::TXT => Ok(parse_txt(wire)),
        _ => Ok(RecordData::new(wire.trim())),
    }
}

/// Quote TXT content, splitting it into 255-byte strings when needed
///
/// Bytes outside printable ASCII are written as `\DDD` escapes, so the
/// result is always a single line.
pub fn quote_txt(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "\"\"".to_string();
    }

    bytes
        .chunks(MAX_TXT_LENGTH)
        .map(|chunk| {
            let mut quoted = String::with_capacity(chunk.len() + 2);
            quoted.push('"');
            for &b in chunk {
                match b {
                    b'"' | b'\\' => {
                        quoted.push('\\');
                        quoted.push(char::from(b));
                    }
                    0x20..=0x7e => quoted.push(char::from(b)),
                    _ => {
                        let _ = write!(quoted, "\\{:03}", b);
                    }
                }
            }
            quoted.push('"');
            quoted
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Raw bytes of one or more quoted character-strings
///
/// Unquoted input is taken as-is, trimmed. Adjacent strings are concatenated
/// and `\"`, `\\` and `\DDD` escapes are resolved.
pub fn txt_bytes(wire: &str) -> Vec<u8> {
    let wire = wire.trim();
    if !wire.starts_with('"') {
        return wire.as_bytes().to_vec();
    }

    let mut bytes = Vec::with_capacity(wire.len());
    let mut chars = wire.chars().peekable();
    let mut in_quotes = false;
    let mut buf = [0u8; 4];

    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                let digits: String = std::iter::from_fn(|| chars.next_if(|d| d.is_ascii_digit()))
                    .take(3)
                    .collect();
                if digits.len() == 3 {
                    if let Ok(byte) = digits.parse::<u8>() {
                        bytes.push(byte);
                        continue;
                    }
                }
                if digits.is_empty() {
                    if let Some(escaped) = chars.next() {
                        bytes.extend_from_slice(escaped.encode_utf8(&mut buf).as_bytes());
                    }
                } else {
                    bytes.extend_from_slice(digits.as_bytes());
                }
            }
            c if in_quotes => bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes()),
            // Whitespace between strings
            _ => {}
        }
    }

    bytes
}

/// TXT content as text; invalid UTF-8 is replaced
pub fn unquote_txt(wire: &str) -> String {
    String::from_utf8_lossy(&txt_bytes(wire)).into_owned()
}

/// Structured TXT value for a wire value
///
/// Content that is not UTF-8 stays in quoted wire form, which `format`
/// re-emits byte for byte.
fn parse_txt(wire: &str) -> RecordData {
    match String::from_utf8(txt_bytes(wire)) {
        Ok(text) => RecordData::new(text),
        Err(_) => RecordData::new(wire.trim()),
    }
}

fn required(value: Option<u32>, field: &str, rtype: &RecordType) -> Result<u32> {
    value.ok_or_else(|| {
        ValidationError::new(field, format!("{} is required for {} records", field, rtype))
    })
}

fn parse_number(raw: &str, field: &str) -> Result<u32> {
    raw.parse()
        .map_err(|_| ValidationError::new(field, format!("'{}' is not a number", raw)))
}
