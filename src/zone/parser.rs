use super::{Soa, constants, relative_name, same_name};
use crate::error::{BifrostError, Result};
use crate::record::{Record, RecordType, codec};
use std::fs;
use std::path::Path;
use tracing::{debug, trace, warn};

/// RFC 1035 zone file parser producing manageable records
///
/// SOA records are zone-level and are skipped; `extract_soa` reads them.
pub struct ZoneParser {
    /// Origin the resulting record names are relative to
    zone_origin: String,
    /// Current origin for relative names
    current_origin: String,
    /// Current default TTL
    current_ttl: u32,
    /// Owner of the previous record, inherited by indented lines
    last_name: Option<String>,
    /// Line number for error reporting
    line_number: usize,
}

/// Parse zone file text into records relative to `zone_origin`
pub fn parse(contents: &str, zone_origin: &str) -> Result<Vec<Record>> {
    ZoneParser::new(zone_origin).parse(contents)
}

impl ZoneParser {
    /// Create a new zone parser
    pub fn new(zone_origin: &str) -> Self {
        let origin = zone_origin.trim_end_matches('.').to_string();
        Self {
            zone_origin: origin.clone(),
            current_origin: origin,
            current_ttl: constants::DEFAULT_TTL,
            last_name: None,
            line_number: 0,
        }
    }

    /// Parse a zone file from path
    pub fn parse_file<P: AsRef<Path>>(&mut self, path: P) -> Result<Vec<Record>> {
        let contents = fs::read_to_string(path.as_ref())?;

        if contents.len() > constants::MAX_ZONE_FILE_SIZE {
            return Err(BifrostError::ZoneParse(format!(
                "{} exceeds the maximum zone file size",
                path.as_ref().display()
            )));
        }

        self.parse(&contents)
    }

    /// Parse zone file contents
    pub fn parse(&mut self, contents: &str) -> Result<Vec<Record>> {
        let mut records = Vec::new();

        for (line_number, line) in logical_lines(contents)? {
            self.line_number = line_number;
            trace!("Parsing line {}: {}", line_number, line);

            if line.trim_start().starts_with('$') {
                self.parse_directive(&line)?;
                continue;
            }

            if let Some(record) = self.parse_record(&line)? {
                records.push(record);
            }
        }

        debug!(
            "Parsed {} records for zone {}",
            records.len(),
            self.zone_origin
        );

        Ok(records)
    }

    /// Parse a directive line
    fn parse_directive(&mut self, line: &str) -> Result<()> {
        let parts = tokenize(line);
        let Some(directive) = parts.first() else {
            return Ok(());
        };

        match directive.to_uppercase().as_str() {
            "$ORIGIN" => {
                let origin = parts.get(1).ok_or_else(|| {
                    self.error("$ORIGIN requires domain name".to_string())
                })?;
                let origin = origin.trim_end_matches('.').to_string();
                if self.zone_origin.is_empty() {
                    self.zone_origin = origin.clone();
                }
                debug!("Set origin to: {}", origin);
                self.current_origin = origin;
            }
            "$TTL" => {
                let value = parts
                    .get(1)
                    .ok_or_else(|| self.error("$TTL requires value".to_string()))?;
                let ttl = parse_ttl(value)
                    .ok_or_else(|| self.error(format!("Invalid TTL value: {}", value)))?;
                debug!("Set default TTL to: {}", ttl);
                self.current_ttl = ttl;
            }
            other => {
                debug!("Ignoring directive {} on line {}", other, self.line_number);
            }
        }

        Ok(())
    }

    /// Parse a resource record line; `None` when the line is skipped
    fn parse_record(&mut self, line: &str) -> Result<Option<Record>> {
        let mut parts = tokenize(line);
        if parts.is_empty() {
            return Ok(None);
        }

        // A line starting with whitespace repeats the previous owner
        if line.starts_with(' ') || line.starts_with('\t') {
            match &self.last_name {
                Some(name) => parts.insert(0, name.clone()),
                None => {
                    warn!("Line {}: record without owner name, skipping", self.line_number);
                    return Ok(None);
                }
            }
        }

        if parts.len() < 4 {
            trace!("Line {}: too few fields, skipping", self.line_number);
            return Ok(None);
        }

        let name = parts[0].clone();
        if !name.is_ascii() {
            return Err(self.error(format!(
                "owner name '{}' must be ASCII; use its punycode form",
                name
            )));
        }
        self.last_name = Some(name.clone());

        let mut idx = 1;
        let mut ttl = None;
        let mut rtype = None;

        // Optional TTL and class precede the type, in either order
        while idx < parts.len() && rtype.is_none() {
            let field = &parts[idx];
            idx += 1;

            if ttl.is_none() {
                if let Some(value) = parse_ttl(field) {
                    ttl = Some(value);
                    continue;
                }
            }
            if is_class(field) {
                continue;
            }

            let parsed = field
                .parse::<RecordType>()
                .map_err(|e| self.error(e.to_string()))?;
            rtype = Some(parsed);
        }

        let rtype = rtype.ok_or_else(|| self.error("Missing record type".to_string()))?;
        if rtype == RecordType::SOA {
            trace!("Line {}: skipping SOA record", self.line_number);
            return Ok(None);
        }

        if idx >= parts.len() {
            return Err(self.error("Missing RDATA".to_string()));
        }
        let rdata = parts[idx..].join(" ");
        let data = codec::parse(&rtype, &rdata).map_err(|e| self.error(e.to_string()))?;

        Ok(Some(Record {
            name: self.owner_name(&name),
            rtype,
            data,
            ttl: ttl.unwrap_or(self.current_ttl),
        }))
    }

    /// Re-express an owner name relative to the zone origin
    fn owner_name(&self, name: &str) -> String {
        if same_name(&self.current_origin, &self.zone_origin) || name.ends_with('.') {
            return name.to_string();
        }
        let absolute = if name == "@" {
            format!("{}.", self.current_origin)
        } else {
            format!("{}.{}.", name, self.current_origin)
        };
        relative_name(&absolute, &self.zone_origin)
    }

    fn error(&self, message: String) -> BifrostError {
        BifrostError::ZoneParse(format!("Line {}: {}", self.line_number, message))
    }
}

impl Default for ZoneParser {
    fn default() -> Self {
        Self::new("")
    }
}

/// Find the zone's SOA record in zone file text
pub fn extract_soa(contents: &str) -> Option<Soa> {
    let lines = logical_lines(contents).ok()?;
    lines.iter().find_map(|(_, line)| {
        let parts = tokenize(line);
        let pos = parts.iter().position(|p| p.eq_ignore_ascii_case("SOA"))?;
        let fields = parts.get(pos + 1..pos + 8)?;
        // Timers may carry unit suffixes
        let mut normalized = fields[..2].to_vec();
        for field in &fields[2..] {
            normalized.push(parse_ttl(field)?.to_string());
        }
        normalized.join(" ").parse().ok()
    })
}

/// Parse TTL value (supports suffixes like 1h, 30m, etc.)
pub fn parse_ttl(s: &str) -> Option<u32> {
    let s = s.to_lowercase();
    if s.is_empty() || !s.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let multiplier = match s.chars().last() {
        Some('s') => 1,
        Some('m') => 60,
        Some('h') => 3600,
        Some('d') => 86400,
        Some('w') => 604800,
        Some(c) if c.is_ascii_digit() => {
            return s.parse().ok();
        }
        _ => return None,
    };

    s[..s.len() - 1]
        .parse::<u32>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
}

fn is_class(field: &str) -> bool {
    matches!(
        field.to_uppercase().as_str(),
        "IN" | "CH" | "CS" | "HS"
    )
}

/// Strip comments and join parenthesised continuations
///
/// Returns `(first line number, text)` pairs. Leading whitespace of the first
/// physical line is kept so owner inheritance still works.
fn logical_lines(contents: &str) -> Result<Vec<(usize, String)>> {
    let mut lines = Vec::new();
    let mut buffer = String::new();
    let mut depth = 0usize;
    let mut start_line = 0;

    for (index, raw) in contents.lines().enumerate() {
        let line_number = index + 1;
        let line = strip_comment(raw);

        if depth == 0 {
            if line.trim().is_empty() {
                continue;
            }
            start_line = line_number;
        } else {
            buffer.push(' ');
        }

        let mut in_quotes = false;
        let mut escaped = false;
        for c in line.chars() {
            if escaped {
                escaped = false;
                buffer.push(c);
                continue;
            }
            match c {
                '\\' if in_quotes => {
                    escaped = true;
                    buffer.push(c);
                }
                '"' => {
                    in_quotes = !in_quotes;
                    buffer.push(c);
                }
                '(' if !in_quotes => {
                    depth += 1;
                    buffer.push(' ');
                }
                ')' if !in_quotes => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        BifrostError::ZoneParse(format!(
                            "Line {}: unbalanced closing parenthesis",
                            line_number
                        ))
                    })?;
                    buffer.push(' ');
                }
                _ => buffer.push(c),
            }
        }

        if depth == 0 {
            lines.push((start_line, buffer.trim_end().to_string()));
            buffer.clear();
        }
    }

    if depth > 0 {
        return Err(BifrostError::ZoneParse(format!(
            "Unclosed parentheses starting at line {}",
            start_line
        )));
    }

    Ok(lines)
}

/// Remove a `;` comment that is not inside a quoted string
pub(crate) fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Split a line on whitespace, keeping quoted strings (and their quotes) intact
pub(crate) fn tokenize(line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in line.chars() {
        if escaped {
            escaped = false;
            current.push(c);
            continue;
        }
        match c {
            '\\' if in_quotes => {
                escaped = true;
                current.push(c);
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}
