//! Zone and record management facade
//!
//! `ZoneManager` owns one of each collaborator and checks that a zone is
//! defined before touching its records.

use crate::config::EngineConfig;
use crate::dynamic_update::{BatchResult, TsigKeyStore, UpdateBatcher};
use crate::error::{BifrostError, Result};
use crate::record::validation::{validate_domain_name, validate_ipv4, validate_soa};
use crate::record::{Record, RecordType};
use crate::server::{CommandRunner, ServerControl, ServerStatus, ZoneChecker};
use crate::zone::registry::{NamedConfRegistry, ZoneRegistry};
use crate::zone::transfer::{TransferOptions, TransferOrchestrator, TransferType};
use crate::zone::{
    Soa, Zone, ZoneType, absolute_name, fqdn, generate, parse, relative_name, serial,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Parameters for a new master zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSpec {
    pub name: String,
    /// Primary name server (SOA mname and apex NS)
    pub primary_ns: String,
    /// Responsible mailbox, as `admin@example.com` or `admin.example.com.`
    pub admin_email: String,
    /// Glue address for a primary name server inside the zone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ns_address: Option<String>,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default = "default_refresh")]
    pub refresh: u32,
    #[serde(default = "default_retry")]
    pub retry: u32,
    #[serde(default = "default_expire")]
    pub expire: u32,
    #[serde(default = "default_minimum")]
    pub minimum: u32,
}

fn default_refresh() -> u32 {
    3600
}

fn default_retry() -> u32 {
    900
}

fn default_expire() -> u32 {
    604800
}

fn default_minimum() -> u32 {
    86400
}

impl ZoneSpec {
    pub fn new(
        name: impl Into<String>,
        primary_ns: impl Into<String>,
        admin_email: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            primary_ns: primary_ns.into(),
            admin_email: admin_email.into(),
            ns_address: None,
            ttl: None,
            refresh: default_refresh(),
            retry: default_retry(),
            expire: default_expire(),
            minimum: default_minimum(),
        }
    }

    pub fn with_ns_address(mut self, address: impl Into<String>) -> Self {
        self.ns_address = Some(address.into());
        self
    }
}

/// Fields to change in a zone's SOA; the serial always advances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoaUpdate {
    pub primary_ns: Option<String>,
    pub admin_email: Option<String>,
    pub refresh: Option<u32>,
    pub retry: Option<u32>,
    pub expire: Option<u32>,
    pub minimum: Option<u32>,
}

pub struct ZoneManager {
    config: EngineConfig,
    registry: Arc<dyn ZoneRegistry>,
    batcher: UpdateBatcher,
    transfers: TransferOrchestrator,
    keys: Arc<TsigKeyStore>,
    control: ServerControl,
    checker: ZoneChecker,
}

impl ZoneManager {
    /// Wire every collaborator from configuration
    pub fn new(config: EngineConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let mut registry = NamedConfRegistry::new(&config.named_conf, &config.zone_dir);
        if let Some(key_name) = &config.key_name {
            registry = registry.with_update_key(key_name);
        }
        Self::with_registry(config, runner, Arc::new(registry))
    }

    pub fn with_registry(
        config: EngineConfig,
        runner: Arc<dyn CommandRunner>,
        registry: Arc<dyn ZoneRegistry>,
    ) -> Self {
        let mut keys = TsigKeyStore::new(runner.clone(), &config.tools.tsig_keygen, &config.key_dir);
        if let Some(key_name) = &config.key_name {
            keys = keys.with_key_file(&config.key_file, key_name);
        }
        let keys = Arc::new(keys);

        let batcher = UpdateBatcher::new(
            runner.clone(),
            &config.tools.nsupdate,
            &config.server_host,
            config.server_port,
            &config.key_file,
        )
        .with_batch_size(config.batch_size)
        .with_key_store(keys.clone());
        let transfers = TransferOrchestrator::new(runner.clone(), &config.tools.dig)
            .with_large_zone_threshold(config.large_zone_threshold)
            .with_key_store(keys.clone());
        let control = ServerControl::new(runner.clone(), &config.tools.rndc, config.rndc_args());
        let checker = ZoneChecker::new(runner, &config.tools.named_checkzone);

        Self {
            config,
            registry,
            batcher,
            transfers,
            keys,
            control,
            checker,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn batcher(&self) -> &UpdateBatcher {
        &self.batcher
    }

    pub fn transfers(&self) -> &TransferOrchestrator {
        &self.transfers
    }

    /// TSIG keys, with last-used times from this manager's operations
    pub fn keys(&self) -> &TsigKeyStore {
        &self.keys
    }

    /// Transfer settings for queries against the managed server
    fn server_options(&self) -> TransferOptions {
        TransferOptions {
            key_file: Some(self.config.key_file.clone()),
            timeout: self.config.transfer_timeout(),
            port: Some(self.config.server_port),
            serial: None,
        }
    }

    pub async fn list_zones(&self) -> Result<Vec<Zone>> {
        self.registry.list_zones().await
    }

    pub async fn get_zone(&self, name: &str) -> Result<Zone> {
        self.registry
            .list_zones()
            .await?
            .into_iter()
            .find(|zone| zone.is_named(name))
            .ok_or_else(|| BifrostError::NotFound(format!("zone {}", name)))
    }

    /// Create a master zone: skeleton file, checker, definition, reconfigure
    pub async fn create_zone(&self, spec: &ZoneSpec) -> Result<Zone> {
        let name = spec.name.trim().trim_end_matches('.').to_string();
        validate_domain_name(&name).map_err(|e| BifrostError::invalid_record(&name, "zone", e))?;

        if self.list_zones().await?.iter().any(|zone| zone.is_named(&name)) {
            return Err(BifrostError::AlreadyExists(format!("zone {}", name)));
        }

        let soa = Soa {
            mname: absolute_name(&spec.primary_ns, &name),
            rname: mailbox_name(&spec.admin_email),
            serial: serial::generate_serial(),
            refresh: spec.refresh,
            retry: spec.retry,
            expire: spec.expire,
            minimum: spec.minimum,
        };
        validate_soa(&soa.to_string()).map_err(|e| BifrostError::invalid_record("@", "SOA", e))?;
        if let Some(address) = &spec.ns_address {
            validate_ipv4(address)
                .map_err(|e| BifrostError::invalid_record(&spec.primary_ns, "A", e))?;
        }

        let file_ref = format!("db.{}", name);
        let ttl = spec.ttl.unwrap_or(self.config.default_ttl);
        let contents = zone_skeleton(&name, &soa, spec.ns_address.as_deref(), ttl);
        let path = self.registry.write_zone_file(&file_ref, &contents).await?;

        if self.config.check_zones {
            if let Err(e) = self.checker.check(&name, &path).await {
                warn!("New zone {} failed checks, removing {}", name, path.display());
                self.registry.delete_zone_file(&file_ref).await?;
                return Err(e);
            }
        }

        if let Err(e) = self
            .registry
            .add_zone_entry(&name, ZoneType::Master, Some(&file_ref))
            .await
        {
            self.registry.delete_zone_file(&file_ref).await?;
            return Err(e);
        }

        self.control.reconfigure().await?;
        info!("Created zone {} with serial {}", name, soa.serial);

        let mut zone = Zone::new(name, ZoneType::Master, Some(file_ref));
        zone.serial = Some(soa.serial);
        Ok(zone)
    }

    /// Remove the definition and file of a zone, then reconfigure
    pub async fn delete_zone(&self, name: &str) -> Result<Zone> {
        let zone = self.registry.remove_zone_entry(name).await?;
        if let Some(file_ref) = &zone.file_ref {
            self.registry.delete_zone_file(file_ref).await?;
        }
        self.control.reconfigure().await?;
        info!("Deleted zone {}", zone.name);
        Ok(zone)
    }

    /// Records served for `zone`, without the zone-level SOA and apex NS
    pub async fn list_records(&self, zone: &str) -> Result<Vec<Record>> {
        let zone = self.get_zone(zone).await?;
        let result = self
            .transfers
            .transfer(
                &zone.name,
                TransferType::Axfr,
                &self.config.server_host,
                &self.server_options(),
            )
            .await?;
        Ok(manageable(result.records))
    }

    /// Zone file text for the zone's records
    pub async fn export_zone(&self, zone: &str) -> Result<String> {
        let records = self.list_records(zone).await?;
        Ok(generate(zone, &records))
    }

    /// Parse zone file text and create its records in `zone`
    pub async fn import_zone(&self, zone: &str, contents: &str) -> Result<BatchResult> {
        let zone = self.get_zone(zone).await?;
        let records = parse(contents, &zone.name)?;
        info!("Importing {} records into zone {}", records.len(), zone.name);
        self.batcher.bulk_create(&zone.name, &records).await
    }

    /// Copy the records of `source` on `peer` into the existing zone `target`
    pub async fn clone_zone(
        &self,
        source: &str,
        peer: &str,
        target: &str,
        key_file: Option<PathBuf>,
    ) -> Result<BatchResult> {
        let target = self.get_zone(target).await?;
        let options = TransferOptions {
            key_file,
            timeout: self.config.transfer_timeout(),
            ..Default::default()
        };
        let result = self
            .transfers
            .transfer(source, TransferType::Axfr, peer, &options)
            .await?;

        // Owner names come back relative to the source, so they carry over as-is
        let records = manageable(result.records);

        info!(
            "Cloning {} records from {}@{} into {}",
            records.len(),
            source,
            peer,
            target.name
        );
        self.batcher.bulk_create(&target.name, &records).await
    }

    /// Apply `update` to the zone's SOA with an advanced serial
    ///
    /// The serial is advanced from the one the server is serving, which runs
    /// ahead of the zone file once dynamic updates have been applied.
    pub async fn update_soa(&self, zone: &str, update: &SoaUpdate) -> Result<Soa> {
        let zone = self.get_zone(zone).await?;
        let current = self
            .transfers
            .current_soa(&zone.name, &self.config.server_host, &self.server_options())
            .await?;

        let mut soa = current.clone();
        if let Some(primary_ns) = &update.primary_ns {
            soa.mname = absolute_name(primary_ns, &zone.name);
        }
        if let Some(email) = &update.admin_email {
            soa.rname = mailbox_name(email);
        }
        soa.refresh = update.refresh.unwrap_or(soa.refresh);
        soa.retry = update.retry.unwrap_or(soa.retry);
        soa.expire = update.expire.unwrap_or(soa.expire);
        soa.minimum = update.minimum.unwrap_or(soa.minimum);
        soa.serial = serial::next_serial(current.serial);

        validate_soa(&soa.to_string()).map_err(|e| BifrostError::invalid_record("@", "SOA", e))?;
        self.batcher
            .replace_soa(&zone.name, &soa, self.config.default_ttl)
            .await?;

        info!(
            "Zone {} serial {} -> {}",
            zone.name, current.serial, soa.serial
        );
        Ok(soa)
    }

    pub async fn upsert_record(&self, zone: &str, record: &Record) -> Result<()> {
        let zone = self.get_zone(zone).await?;
        self.batcher.upsert(&zone.name, record).await
    }

    pub async fn add_record(&self, zone: &str, record: &Record) -> Result<()> {
        let zone = self.get_zone(zone).await?;
        self.batcher.add(&zone.name, record).await
    }

    pub async fn delete_record(&self, zone: &str, name: &str, rtype: &RecordType) -> Result<()> {
        let zone = self.get_zone(zone).await?;
        self.batcher.delete(&zone.name, name, rtype).await
    }

    pub async fn delete_record_value(&self, zone: &str, record: &Record) -> Result<()> {
        let zone = self.get_zone(zone).await?;
        self.batcher.delete_value(&zone.name, record).await
    }

    pub async fn bulk_create(&self, zone: &str, records: &[Record]) -> Result<BatchResult> {
        let zone = self.get_zone(zone).await?;
        self.batcher.bulk_create(&zone.name, records).await
    }

    pub async fn bulk_update(&self, zone: &str, records: &[Record]) -> Result<BatchResult> {
        let zone = self.get_zone(zone).await?;
        self.batcher.bulk_update(&zone.name, records).await
    }

    pub async fn bulk_delete(&self, zone: &str, records: &[Record]) -> Result<BatchResult> {
        let zone = self.get_zone(zone).await?;
        self.batcher.bulk_delete(&zone.name, records).await
    }

    pub async fn reload_zone(&self, zone: &str) -> Result<()> {
        let zone = self.get_zone(zone).await?;
        self.control.reload_zone(&zone.name).await
    }

    pub async fn reconfigure(&self) -> Result<()> {
        self.control.reconfigure().await.inspect_err(|e| {
            error!("Server reconfiguration failed: {}", e);
        })
    }

    pub async fn server_status(&self) -> Result<ServerStatus> {
        self.control.status().await
    }
}

/// Drop the zone-level SOA and apex NS records
fn manageable(records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .filter(|r| r.rtype != RecordType::SOA && !(r.rtype == RecordType::NS && r.is_apex()))
        .collect()
}

/// SOA mailbox name for `admin@example.com` or an already dotted name
fn mailbox_name(email: &str) -> String {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => fqdn(&format!("{}.{}", local, domain)),
        None => fqdn(email),
    }
}

/// Initial zone file: SOA, apex NS and optional glue
fn zone_skeleton(zone: &str, soa: &Soa, ns_address: Option<&str>, ttl: u32) -> String {
    let mut text = format!(
        "$TTL {}\n$ORIGIN {}\n@\tIN\tSOA\t{}\n@\tIN\tNS\t{}\n",
        ttl,
        fqdn(zone),
        soa,
        soa.mname
    );

    if let Some(address) = ns_address {
        let ns = relative_name(&soa.mname, zone);
        if ns.ends_with('.') {
            warn!("Name server {} is outside zone {}, skipping glue", soa.mname, zone);
        } else {
            text.push_str(&format!("{}\tIN\tA\t{}\n", ns, address));
        }
    }

    text
}
