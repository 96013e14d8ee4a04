//! Zone transfers (AXFR/IXFR) pulled from a peer through the query tool
//!
//! The query tool prints the transfer in zone file presentation format. The
//! stream opens and closes with the zone's SOA; the closing copy is framing
//! and is dropped. Incremental transfers drop every SOA, since there they
//! delimit difference sequences rather than describe the zone.

use super::parser::{parse_ttl, strip_comment, tokenize};
use super::{Soa, relative_name, same_name};
use crate::dynamic_update::TsigKeyStore;
use crate::error::{BifrostError, Result};
use crate::record::{Record, RecordData, RecordType, codec};
use crate::server::{CommandOutput, CommandRunner};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Default transfer timeout
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Record count above which incremental transfers are recommended
pub const DEFAULT_LARGE_ZONE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferType {
    #[serde(rename = "AXFR")]
    Axfr,
    #[serde(rename = "IXFR")]
    Ixfr,
}

impl TransferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::Axfr => "AXFR",
            TransferType::Ixfr => "IXFR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "AXFR" => Some(TransferType::Axfr),
            "IXFR" => Some(TransferType::Ixfr),
            _ => None,
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-transfer settings
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// TSIG key file for the transfer
    pub key_file: Option<PathBuf>,
    pub timeout: Duration,
    pub port: Option<u16>,
    /// Serial the caller already holds; required for IXFR
    pub serial: Option<u32>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            key_file: None,
            timeout: DEFAULT_TRANSFER_TIMEOUT,
            port: None,
            serial: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub transfer_type: TransferType,
    pub records: Vec<Record>,
    pub record_count: usize,
    /// Serial of the first SOA in the stream
    pub serial: Option<u32>,
}

/// Pre-flight assessment of a transfer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferValidation {
    pub valid: bool,
    pub record_count: usize,
    pub has_soa: bool,
    pub has_ns: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub recommend_incremental: bool,
}

/// Runs and interprets zone transfers
pub struct TransferOrchestrator {
    runner: Arc<dyn CommandRunner>,
    program: String,
    large_zone_threshold: usize,
    keys: Option<Arc<TsigKeyStore>>,
}

impl TransferOrchestrator {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
            large_zone_threshold: DEFAULT_LARGE_ZONE_THRESHOLD,
            keys: None,
        }
    }

    /// Mark transfer keys used in `keys` after each successful transfer
    pub fn with_key_store(mut self, keys: Arc<TsigKeyStore>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_large_zone_threshold(mut self, threshold: usize) -> Self {
        self.large_zone_threshold = threshold;
        self
    }

    /// Transfer `zone` from `peer`
    pub async fn transfer(
        &self,
        zone: &str,
        transfer_type: TransferType,
        peer: &str,
        options: &TransferOptions,
    ) -> Result<TransferResult> {
        let query = match transfer_type {
            TransferType::Axfr => "AXFR".to_string(),
            TransferType::Ixfr => {
                let serial = options.serial.ok_or_else(|| {
                    BifrostError::Configuration("IXFR requires the current serial".to_string())
                })?;
                format!("IXFR={}", serial)
            }
        };
        let args = self.build_args(zone, &query, peer, options, &[]);
        info!("Starting {} of {} from {}", transfer_type, zone, peer);

        let output = self.query(&args, options).await?;
        let result = parse_transfer(&output.stdout, zone, transfer_type, options.timeout)?;

        if !output.success() && result.records.is_empty() && result.serial.is_none() {
            return Err(BifrostError::Transaction(output.diagnostic()));
        }
        self.mark_key_used(options);

        info!(
            "{} of {} complete: {} records",
            transfer_type, zone, result.record_count
        );
        Ok(result)
    }

    /// Ask `peer` for the zone's SOA as it is serving it now
    pub async fn current_soa(&self, zone: &str, peer: &str, options: &TransferOptions) -> Result<Soa> {
        let args = self.build_args(zone, "SOA", peer, options, &["+noall", "+answer"]);
        let output = self.query(&args, options).await?;

        let answer = parse_transfer(&output.stdout, zone, TransferType::Axfr, options.timeout)?;
        let Some(record) = answer.records.into_iter().find(|r| r.rtype == RecordType::SOA) else {
            if !output.success() {
                return Err(BifrostError::Transaction(output.diagnostic()));
            }
            return Err(BifrostError::NotFound(format!("SOA of zone {} at {}", zone, peer)));
        };
        self.mark_key_used(options);

        let soa = record
            .value()
            .parse::<Soa>()
            .map_err(|e| BifrostError::invalid_record(&record.name, &record.rtype, e))?;
        debug!("Zone {} at {} is at serial {}", zone, peer, soa.serial);
        Ok(soa)
    }

    /// Transfer the zone and report whether it looks complete
    pub async fn validate(
        &self,
        zone: &str,
        peer: &str,
        transfer_type: TransferType,
        options: &TransferOptions,
    ) -> Result<TransferValidation> {
        let result = self.transfer(zone, transfer_type, peer, options).await?;
        Ok(self.assess(zone, &result))
    }

    /// Judge a completed transfer
    pub fn assess(&self, zone: &str, result: &TransferResult) -> TransferValidation {
        let mut validation = TransferValidation {
            record_count: result.record_count,
            has_soa: result.serial.is_some(),
            has_ns: result
                .records
                .iter()
                .any(|r| r.rtype == RecordType::NS && r.is_apex()),
            ..Default::default()
        };

        if result.record_count == 0 {
            validation
                .warnings
                .push("transfer returned no records (possibly empty zone)".to_string());
        }
        if !validation.has_soa {
            validation.errors.push(format!("zone {} has no SOA record", zone));
        }
        if !validation.has_ns {
            validation.errors.push(format!("zone {} has no NS records", zone));
        }
        if result.record_count > self.large_zone_threshold {
            validation.recommend_incremental = true;
            validation.warnings.push(format!(
                "zone has {} records (over {}); prefer incremental transfers",
                result.record_count, self.large_zone_threshold
            ));
        }

        validation.valid = validation.errors.is_empty();
        validation
    }

    async fn query(&self, args: &[String], options: &TransferOptions) -> Result<CommandOutput> {
        tokio::time::timeout(options.timeout, self.runner.run(&self.program, args, None))
            .await
            .map_err(|_| BifrostError::Timeout(options.timeout))?
            .map_err(|e| BifrostError::Transaction(format!("failed to run {}: {}", self.program, e)))
    }

    fn mark_key_used(&self, options: &TransferOptions) {
        if let (Some(keys), Some(key_file)) = (&self.keys, &options.key_file) {
            keys.mark_file_used(key_file);
        }
    }

    fn build_args(
        &self,
        zone: &str,
        query: &str,
        peer: &str,
        options: &TransferOptions,
        flags: &[&str],
    ) -> Vec<String> {
        let mut args = vec![format!("@{}", peer)];

        if let Some(port) = options.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(key_file) = &options.key_file {
            args.push("-k".to_string());
            args.push(key_file.display().to_string());
        }

        args.push(zone.to_string());
        args.push(query.to_string());
        args.extend(flags.iter().map(|flag| flag.to_string()));

        args.push(format!("+time={}", options.timeout.as_secs().max(1)));
        args.push("+tries=1".to_string());
        args
    }
}

/// Interpret the query tool's transfer output
pub fn parse_transfer(
    output: &str,
    zone: &str,
    transfer_type: TransferType,
    timeout: Duration,
) -> Result<TransferResult> {
    let mut records = Vec::new();
    let mut serial = None;
    let mut soa_seen = false;

    for line in output.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with(';') {
            let lower = trimmed.to_lowercase();
            if lower.contains("transfer failed") {
                return Err(BifrostError::Transaction(trimmed.trim_start_matches(';').trim().to_string()));
            }
            if lower.contains("timed out") || lower.contains("no servers could be reached") {
                return Err(BifrostError::Timeout(timeout));
            }
            continue;
        }

        let content = strip_comment(trimmed);
        if content.trim().is_empty() {
            continue;
        }

        let parts = tokenize(content);
        if parts.len() < 5 {
            trace!("Ignoring transfer output line: {}", trimmed);
            continue;
        }

        let Some(ttl) = parse_ttl(&parts[1]) else {
            debug!("Ignoring transfer output line without TTL: {}", trimmed);
            continue;
        };
        let rtype = match parts[3].parse::<RecordType>() {
            Ok(rtype) => rtype,
            Err(e) => {
                warn!("Skipping transfer record: {}", e);
                continue;
            }
        };
        let rdata = parts[4..].join(" ");

        let data = if rtype == RecordType::SOA {
            let first = !soa_seen;
            soa_seen = true;
            if first && same_name(&parts[0], zone) {
                serial = rdata.parse::<Soa>().ok().map(|soa| soa.serial);
            }
            if transfer_type == TransferType::Ixfr || !first {
                continue;
            }
            RecordData::new(rdata)
        } else {
            match codec::parse(&rtype, &rdata) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Skipping malformed {} record {}: {}", rtype, parts[0], e);
                    continue;
                }
            }
        };

        records.push(Record {
            name: relative_name(&parts[0], zone),
            rtype,
            data,
            ttl,
        });
    }

    Ok(TransferResult {
        transfer_type,
        record_count: records.len(),
        records,
        serial,
    })
}
