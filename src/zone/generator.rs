//! Zone file rendering
//!
//! Records are grouped by type in a fixed preferred order, then any other
//! types in the order they were first seen. Within a group the input order
//! is preserved.

use super::{constants, fqdn};
use crate::record::{Record, RecordType};
use chrono::Utc;
use std::fmt::Write;
use tracing::warn;

const PREFERRED_ORDER: &[RecordType] = &[
    RecordType::NS,
    RecordType::A,
    RecordType::AAAA,
    RecordType::CNAME,
    RecordType::MX,
    RecordType::TXT,
    RecordType::SRV,
    RecordType::PTR,
    RecordType::CAA,
];

const MIN_NAME_WIDTH: usize = 24;
const TTL_WIDTH: usize = 8;
const TYPE_WIDTH: usize = 6;

/// Render records as zone file text for `zone_name`
pub fn generate(zone_name: &str, records: &[Record]) -> String {
    let mut out = String::new();
    let origin = fqdn(zone_name);

    let _ = writeln!(out, "; Zone file for {}", zone_name.trim_end_matches('.'));
    let _ = writeln!(
        out,
        "; Generated {} ({} records)",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        records.len()
    );
    let _ = writeln!(out, ";");
    let _ = writeln!(out, "$TTL {}", constants::DEFAULT_TTL);
    let _ = writeln!(out, "$ORIGIN {}", origin);

    let name_width = records
        .iter()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0)
        .max(MIN_NAME_WIDTH);

    for (rtype, group) in group_by_type(records) {
        let _ = writeln!(out);
        let _ = writeln!(out, "; {} records", rtype);

        for record in group {
            let value = match record.wire_value() {
                Ok(value) => value,
                Err(e) => {
                    warn!("Skipping {} while rendering {}: {}", record, zone_name, e);
                    continue;
                }
            };
            let _ = writeln!(
                out,
                "{:<name_width$} {:<TTL_WIDTH$} IN {:<TYPE_WIDTH$} {}",
                record.name,
                record.ttl,
                record.rtype.as_str(),
                value,
            );
        }
    }

    out
}

fn group_by_type(records: &[Record]) -> Vec<(RecordType, Vec<&Record>)> {
    let mut groups: Vec<(RecordType, Vec<&Record>)> = PREFERRED_ORDER
        .iter()
        .map(|rtype| (rtype.clone(), Vec::new()))
        .collect();

    for record in records {
        match groups.iter_mut().find(|(rtype, _)| *rtype == record.rtype) {
            Some((_, group)) => group.push(record),
            None => groups.push((record.rtype.clone(), vec![record])),
        }
    }

    groups.retain(|(_, group)| !group.is_empty());
    groups
}
