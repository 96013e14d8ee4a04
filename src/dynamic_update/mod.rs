//! Dynamic updates through the server's update tool
//!
//! Records are validated one by one, then sent in sequential batches, one
//! update transaction per batch. A failed transaction fails every record it
//! carried; records rejected by validation never reach the server.
//!
//! `upsert` and `bulk_update` replace the whole RRset at the record's name
//! and type. Use `add` to append one value to a multi-value RRset and
//! `delete_value` to remove one.

use crate::error::{BifrostError, Result};
use crate::record::validation::{reject_control_characters, validate_domain_name, validate_owner_name};
use crate::record::{Record, RecordType, ValidationError, validate_record};
use crate::server::{CommandOutput, CommandRunner};
use crate::zone::{Soa, absolute_name, fqdn, same_name};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod operations;
pub mod tsig;

pub use operations::{UpdateOperation, UpdateScript};
pub use tsig::{TsigAlgorithm, TsigKey, TsigKeyStore};

/// Records per update transaction
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// A record that did not make it into the zone, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRecord {
    pub record: Record,
    pub reason: String,
}

/// Outcome of a bulk operation
///
/// Every submitted record lands in exactly one of `successful_records` and
/// `failed_records`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub success_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
    pub successful_records: Vec<Record>,
    pub failed_records: Vec<FailedRecord>,
}

impl BatchResult {
    fn record_success(&mut self, record: Record) {
        self.success_count += 1;
        self.successful_records.push(record);
    }

    fn record_failure(&mut self, record: Record, reason: String) {
        self.failed_count += 1;
        self.errors.push(format!("{}: {}", record, reason));
        self.failed_records.push(FailedRecord { record, reason });
    }

    /// Number of records submitted
    pub fn total(&self) -> usize {
        self.success_count + self.failed_count
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_count == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BulkMode {
    Create,
    Update,
    Delete,
}

impl BulkMode {
    fn as_str(&self) -> &'static str {
        match self {
            BulkMode::Create => "create",
            BulkMode::Update => "update",
            BulkMode::Delete => "delete",
        }
    }

    fn operations(&self, record: &Record, zone: &str) -> Result<Vec<UpdateOperation>> {
        let invalid = |e| BifrostError::invalid_record(&record.name, &record.rtype, e);
        Ok(match self {
            BulkMode::Create => vec![UpdateOperation::add(record, zone).map_err(invalid)?],
            BulkMode::Update => vec![
                UpdateOperation::delete_rrset(&record.name, &record.rtype, zone),
                UpdateOperation::add(record, zone).map_err(invalid)?,
            ],
            BulkMode::Delete => vec![UpdateOperation::delete_rrset(
                &record.name,
                &record.rtype,
                zone,
            )],
        })
    }
}

/// Sends record changes to the server in batched update transactions
pub struct UpdateBatcher {
    runner: Arc<dyn CommandRunner>,
    program: String,
    server: String,
    port: u16,
    key_file: PathBuf,
    batch_size: usize,
    keys: Option<Arc<TsigKeyStore>>,
}

impl UpdateBatcher {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: impl Into<String>,
        server: impl Into<String>,
        port: u16,
        key_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            server: server.into(),
            port,
            key_file: key_file.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            keys: None,
        }
    }

    /// Mark the update key used in `keys` after every accepted transaction
    pub fn with_key_store(mut self, keys: Arc<TsigKeyStore>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn key_file(&self) -> &Path {
        &self.key_file
    }

    /// Fail unless the update credential is in place
    pub async fn ensure_configured(&self) -> Result<()> {
        match tokio::fs::try_exists(&self.key_file).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(BifrostError::Configuration(format!(
                "key file {} does not exist",
                self.key_file.display()
            ))),
            Err(e) => Err(BifrostError::Configuration(format!(
                "key file {} is not accessible: {}",
                self.key_file.display(),
                e
            ))),
        }
    }

    /// Replace the RRset at the record's name and type with this one record
    pub async fn upsert(&self, zone: &str, record: &Record) -> Result<()> {
        self.single(zone, record, BulkMode::Update).await
    }

    /// Add one record to its RRset
    pub async fn add(&self, zone: &str, record: &Record) -> Result<()> {
        self.single(zone, record, BulkMode::Create).await
    }

    /// Delete the RRset at `name`/`rtype`
    pub async fn delete(&self, zone: &str, name: &str, rtype: &RecordType) -> Result<()> {
        self.ensure_configured().await?;
        check_zone(zone)?;
        validate_owner_name(name).map_err(|e| BifrostError::invalid_record(name, rtype, e))?;
        let mut script = UpdateScript::new(&self.server, self.port, zone);
        script.push(UpdateOperation::delete_rrset(name, rtype, zone));
        self.send(&script).await?;
        info!("Deleted {} {} from zone {}", name, rtype, zone);
        Ok(())
    }

    /// Delete a single record, leaving the rest of its RRset
    pub async fn delete_value(&self, zone: &str, record: &Record) -> Result<()> {
        self.ensure_configured().await?;
        check_zone(zone)?;
        validate_owner_name(&record.name)
            .and_then(|()| reject_control_characters(&record.data.value, "value"))
            .map_err(|e| BifrostError::invalid_record(&record.name, &record.rtype, e))?;
        let operation = UpdateOperation::delete_rr(record, zone)
            .map_err(|e| BifrostError::invalid_record(&record.name, &record.rtype, e))?;
        let mut script = UpdateScript::new(&self.server, self.port, zone);
        script.push(operation);
        self.send(&script).await?;
        info!("Deleted {} {} value from zone {}", record.name, record.rtype, zone);
        Ok(())
    }

    /// Write a new SOA for the zone
    pub async fn replace_soa(&self, zone: &str, soa: &Soa, ttl: u32) -> Result<()> {
        self.ensure_configured().await?;
        check_zone(zone)?;
        let mut script = UpdateScript::new(&self.server, self.port, zone);
        script.push(UpdateOperation::Add {
            name: fqdn(zone),
            ttl,
            rtype: RecordType::SOA,
            rdata: soa.to_string(),
        });
        self.send(&script).await?;
        info!("Zone {} SOA now at serial {}", zone, soa.serial);
        Ok(())
    }

    pub async fn bulk_create(&self, zone: &str, records: &[Record]) -> Result<BatchResult> {
        self.bulk(zone, records, BulkMode::Create).await
    }

    pub async fn bulk_update(&self, zone: &str, records: &[Record]) -> Result<BatchResult> {
        self.bulk(zone, records, BulkMode::Update).await
    }

    pub async fn bulk_delete(&self, zone: &str, records: &[Record]) -> Result<BatchResult> {
        self.bulk(zone, records, BulkMode::Delete).await
    }

    async fn single(&self, zone: &str, record: &Record, mode: BulkMode) -> Result<()> {
        self.ensure_configured().await?;
        check_zone(zone)?;
        validate_in_zone(record, zone)
            .map_err(|e| BifrostError::invalid_record(&record.name, &record.rtype, e))?;

        let mut script = UpdateScript::new(&self.server, self.port, zone);
        script.extend(mode.operations(record, zone)?);
        self.send(&script).await?;

        info!("Zone {}: {} {} ({})", zone, mode.as_str(), record, record.value());
        Ok(())
    }

    async fn bulk(&self, zone: &str, records: &[Record], mode: BulkMode) -> Result<BatchResult> {
        self.ensure_configured().await?;
        check_zone(zone)?;

        let mut result = BatchResult::default();
        let batches = records.len().div_ceil(self.batch_size);

        for (index, chunk) in records.chunks(self.batch_size).enumerate() {
            let mut script = UpdateScript::new(&self.server, self.port, zone);
            let mut sent = Vec::with_capacity(chunk.len());

            for record in chunk {
                // Deletes carry no value, but the name still lands in the script
                let checked = match mode {
                    BulkMode::Delete => validate_owner_name(&record.name),
                    _ => validate_in_zone(record, zone),
                };
                if let Err(e) = checked {
                    result.record_failure(record.clone(), e.to_string());
                    continue;
                }
                match mode.operations(record, zone) {
                    Ok(operations) => {
                        script.extend(operations);
                        sent.push(record.clone());
                    }
                    Err(e) => result.record_failure(record.clone(), reason(&e)),
                }
            }

            if sent.is_empty() {
                debug!("Batch {}/{} for zone {}: nothing to send", index + 1, batches, zone);
                continue;
            }

            match self.send(&script).await {
                Ok(()) => {
                    debug!(
                        "Batch {}/{} for zone {}: {} records applied",
                        index + 1,
                        batches,
                        zone,
                        sent.len()
                    );
                    for record in sent {
                        result.record_success(record);
                    }
                }
                Err(e) => {
                    let message = reason(&e);
                    warn!(
                        "Batch {}/{} for zone {} failed: {}",
                        index + 1,
                        batches,
                        zone,
                        message
                    );
                    for record in sent {
                        result.record_failure(record, message.clone());
                    }
                }
            }
        }

        info!(
            "Bulk {} on zone {}: {} succeeded, {} failed",
            mode.as_str(),
            zone,
            result.success_count,
            result.failed_count
        );
        Ok(result)
    }

    async fn send(&self, script: &UpdateScript) -> Result<()> {
        let args = vec!["-k".to_string(), self.key_file.display().to_string()];
        debug!("Sending update with {} operations", script.len());

        let output = self
            .runner
            .run(&self.program, &args, Some(&script.render()))
            .await
            .map_err(|e| BifrostError::Transaction(format!("failed to run {}: {}", self.program, e)))?;

        check_response(&output)?;

        if let Some(keys) = &self.keys {
            keys.mark_file_used(&self.key_file);
        }
        Ok(())
    }
}

/// Record validation plus the rules that need the zone origin
fn validate_in_zone(record: &Record, zone: &str) -> std::result::Result<(), ValidationError> {
    if record.rtype == RecordType::CNAME
        && same_name(&absolute_name(record.name.trim(), zone), zone)
    {
        return Err(ValidationError::new(
            "name",
            "CNAME records are not permitted at the zone apex",
        ));
    }
    validate_record(record)
}

fn check_zone(zone: &str) -> Result<()> {
    validate_domain_name(zone).map_err(|e| BifrostError::Validation {
        record: format!("zone {}", zone),
        source: ValidationError::new("zone", e.reason),
    })
}

/// Interpret the update tool's result
///
/// A transaction succeeded only if the tool exited zero and reported neither
/// an update failure nor a non-NOERROR status.
pub fn check_response(output: &CommandOutput) -> Result<()> {
    if !output.success() {
        return Err(BifrostError::Transaction(output.diagnostic()));
    }

    for line in output.stdout.lines().chain(output.stderr.lines()) {
        let lower = line.to_lowercase();
        if lower.contains("update failed") {
            return Err(BifrostError::Transaction(line.trim().to_string()));
        }
        if let Some(position) = lower.find("status:") {
            let status = line[position + "status:".len()..]
                .split(',')
                .next()
                .unwrap_or_default()
                .trim();
            if !status.eq_ignore_ascii_case("NOERROR") {
                return Err(BifrostError::Transaction(line.trim().to_string()));
            }
        }
    }

    Ok(())
}

/// Message carried into a failed record's reason
fn reason(error: &BifrostError) -> String {
    match error {
        BifrostError::Transaction(message) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_response() {
        assert!(check_response(&CommandOutput::ok("")).is_ok());

        let refused = CommandOutput {
            status: Some(2),
            stdout: String::new(),
            stderr: "update failed: REFUSED\n".to_string(),
        };
        match check_response(&refused) {
            Err(BifrostError::Transaction(msg)) => assert_eq!(msg, "update failed: REFUSED"),
            other => panic!("unexpected {:?}", other),
        }

        let notauth = CommandOutput::ok(";; ->>HEADER<<- opcode: UPDATE, status: NOTAUTH, id: 4242\n");
        assert!(matches!(check_response(&notauth), Err(BifrostError::Transaction(_))));

        let noerror = CommandOutput::ok(";; ->>HEADER<<- opcode: UPDATE, status: NOERROR, id: 4242\n");
        assert!(check_response(&noerror).is_ok());
    }

    #[test]
    fn test_apex_cname_in_any_spelling() {
        let zone = "example.com";
        for name in ["@", "", "example.com.", "EXAMPLE.COM.", " example.com. "] {
            let record = Record::new(name, RecordType::CNAME, "www.example.net.", 300);
            let err = validate_in_zone(&record, zone).unwrap_err();
            assert_eq!(err.field, "name", "{:?}", name);
        }

        let record = Record::new("www.example.com.", RecordType::CNAME, "example.net.", 300);
        assert!(validate_in_zone(&record, zone).is_ok());
        // Relative, so this is example.com.example.com.
        let record = Record::new("example.com", RecordType::CNAME, "example.net.", 300);
        assert!(validate_in_zone(&record, zone).is_ok());
        let record = Record::new("example.com.", RecordType::A, "192.0.2.1", 300);
        assert!(validate_in_zone(&record, zone).is_ok());
    }

    #[test]
    fn test_batch_result_accounting() {
        let mut result = BatchResult::default();
        result.record_success(Record::new("a", RecordType::A, "192.0.2.1", 300));
        result.record_failure(
            Record::new("b", RecordType::A, "0.0.0.1", 300),
            "value: first octet 0 is reserved".to_string(),
        );

        assert_eq!(result.total(), 2);
        assert!(!result.all_succeeded());
        assert_eq!(result.errors, vec!["b A: value: first octet 0 is reserved"]);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["successCount"], 1);
        assert_eq!(json["failedRecords"][0]["reason"], "value: first octet 0 is reserved");
        assert_eq!(json["failedRecords"][0]["record"]["type"], "A");
    }
}
