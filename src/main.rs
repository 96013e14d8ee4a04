use bifrost::dynamic_update::TsigAlgorithm;
use bifrost::record::{RecordData, validate_record};
use bifrost::server::ProcessRunner;
use bifrost::zone::transfer::{TransferOptions, TransferType};
use bifrost::{EngineConfig, Record, RecordType, SoaUpdate, ZoneManager, ZoneSpec};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Zone and record management for a BIND-style authoritative server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file; BIFROST_* variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List defined zones
    Zones,

    /// Create a master zone
    CreateZone {
        name: String,
        /// Primary name server
        #[arg(long)]
        ns: String,
        /// Responsible mailbox
        #[arg(long)]
        email: String,
        /// Glue address for an in-zone name server
        #[arg(long)]
        ns_address: Option<String>,
        #[arg(long)]
        ttl: Option<u32>,
    },

    /// Delete a zone definition and its file
    DeleteZone { name: String },

    /// List the records of a zone
    Records { zone: String },

    /// Print a zone as zone file text
    Export { zone: String },

    /// Create records from a zone file
    Import { zone: String, file: PathBuf },

    /// Transfer a zone from a peer
    Transfer {
        zone: String,
        peer: String,
        #[arg(short = 't', long, value_enum, default_value = "axfr")]
        transfer_type: TransferKind,
        /// Serial already held (IXFR)
        #[arg(long)]
        serial: Option<u32>,
        #[arg(short, long)]
        key_file: Option<PathBuf>,
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check whether a zone can be transferred completely
    ValidateTransfer {
        zone: String,
        peer: String,
        #[arg(short, long)]
        key_file: Option<PathBuf>,
    },

    /// Validate a record without sending it
    CheckRecord {
        #[command(flatten)]
        record: RecordArgs,
    },

    /// Replace the RRset at a record's name and type with that record
    Upsert {
        zone: String,
        #[command(flatten)]
        record: RecordArgs,
    },

    /// Add a record to its RRset
    Add {
        zone: String,
        #[command(flatten)]
        record: RecordArgs,
    },

    /// Delete an RRset, or one record of it with --value
    DeleteRecord {
        zone: String,
        name: String,
        #[arg(value_name = "TYPE")]
        rtype: String,
        /// Delete only the record with this value
        #[arg(long)]
        value: Option<String>,
        #[arg(long)]
        priority: Option<u32>,
    },

    /// Create, replace or delete records listed in a JSON file
    Bulk {
        zone: String,
        #[arg(value_enum)]
        mode: BulkKind,
        /// JSON array of records
        file: PathBuf,
    },

    /// Advance a zone's serial, optionally changing SOA timers
    BumpSerial {
        zone: String,
        #[arg(long)]
        refresh: Option<u32>,
        #[arg(long)]
        retry: Option<u32>,
        #[arg(long)]
        expire: Option<u32>,
        #[arg(long)]
        minimum: Option<u32>,
    },

    /// Show server status
    Status,

    /// Reload one zone, or the whole configuration without a zone
    Reload { zone: Option<String> },

    /// Generate a TSIG key
    Keygen {
        name: String,
        #[arg(short, long, default_value = "hmac-sha256")]
        algorithm: String,
    },
}

/// A record given on the command line
#[derive(clap::Args, Debug)]
struct RecordArgs {
    name: String,
    #[arg(value_name = "TYPE")]
    rtype: String,
    value: String,
    #[arg(long)]
    ttl: Option<u32>,
    #[arg(long)]
    priority: Option<u32>,
    #[arg(long)]
    weight: Option<u32>,
    #[arg(long)]
    port: Option<u32>,
}

impl RecordArgs {
    fn into_record(self, default_ttl: u32) -> Result<Record, Box<dyn std::error::Error>> {
        Ok(Record {
            name: self.name,
            rtype: self.rtype.parse::<RecordType>()?,
            data: RecordData {
                value: self.value,
                priority: self.priority,
                weight: self.weight,
                port: self.port,
            },
            ttl: self.ttl.unwrap_or(default_ttl),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BulkKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TransferKind {
    Axfr,
    Ixfr,
}

impl From<TransferKind> for TransferType {
    fn from(kind: TransferKind) -> Self {
        match kind {
            TransferKind::Axfr => TransferType::Axfr,
            TransferKind::Ixfr => TransferType::Ixfr,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load(args.config.as_deref())?;
    let runner = Arc::new(ProcessRunner::new());
    let manager = ZoneManager::new(config.clone(), runner);

    match args.command {
        Command::Zones => print_json(&manager.list_zones().await?)?,
        Command::CreateZone {
            name,
            ns,
            email,
            ns_address,
            ttl,
        } => {
            let mut spec = ZoneSpec::new(name, ns, email);
            spec.ns_address = ns_address;
            spec.ttl = ttl;
            print_json(&manager.create_zone(&spec).await?)?;
        }
        Command::DeleteZone { name } => print_json(&manager.delete_zone(&name).await?)?,
        Command::Records { zone } => print_json(&manager.list_records(&zone).await?)?,
        Command::Export { zone } => print!("{}", manager.export_zone(&zone).await?),
        Command::Import { zone, file } => {
            let contents = tokio::fs::read_to_string(&file).await?;
            print_json(&manager.import_zone(&zone, &contents).await?)?;
        }
        Command::Transfer {
            zone,
            peer,
            transfer_type,
            serial,
            key_file,
            port,
        } => {
            let options = TransferOptions {
                key_file,
                timeout: config.transfer_timeout(),
                port,
                serial,
            };
            let result = manager
                .transfers()
                .transfer(&zone, transfer_type.into(), &peer, &options)
                .await?;
            print_json(&result)?;
        }
        Command::ValidateTransfer {
            zone,
            peer,
            key_file,
        } => {
            let options = TransferOptions {
                key_file,
                timeout: config.transfer_timeout(),
                ..Default::default()
            };
            let validation = manager
                .transfers()
                .validate(&zone, &peer, TransferType::Axfr, &options)
                .await?;
            print_json(&validation)?;
        }
        Command::CheckRecord { record } => {
            let record = record.into_record(config.default_ttl)?;
            validate_record(&record)?;
            println!("{} {} is valid", record, record.wire_value()?);
        }
        Command::Upsert { zone, record } => {
            let record = record.into_record(config.default_ttl)?;
            manager.upsert_record(&zone, &record).await?;
            println!("{} {} set in {}", record, record.wire_value()?, zone);
        }
        Command::Add { zone, record } => {
            let record = record.into_record(config.default_ttl)?;
            manager.add_record(&zone, &record).await?;
            println!("{} {} added to {}", record, record.wire_value()?, zone);
        }
        Command::DeleteRecord {
            zone,
            name,
            rtype,
            value,
            priority,
        } => {
            let rtype = rtype.parse::<RecordType>()?;
            match value {
                Some(value) => {
                    let mut record = Record::new(name, rtype, value, config.default_ttl);
                    record.data.priority = priority;
                    manager.delete_record_value(&zone, &record).await?;
                }
                None => manager.delete_record(&zone, &name, &rtype).await?,
            }
        }
        Command::Bulk { zone, mode, file } => {
            let contents = tokio::fs::read_to_string(&file).await?;
            let records: Vec<Record> = serde_json::from_str(&contents)?;
            let result = match mode {
                BulkKind::Create => manager.bulk_create(&zone, &records).await?,
                BulkKind::Update => manager.bulk_update(&zone, &records).await?,
                BulkKind::Delete => manager.bulk_delete(&zone, &records).await?,
            };
            print_json(&result)?;
        }
        Command::BumpSerial {
            zone,
            refresh,
            retry,
            expire,
            minimum,
        } => {
            let update = SoaUpdate {
                refresh,
                retry,
                expire,
                minimum,
                ..Default::default()
            };
            print_json(&manager.update_soa(&zone, &update).await?)?;
        }
        Command::Status => print_json(&manager.server_status().await?)?,
        Command::Reload { zone } => match zone {
            Some(zone) => manager.reload_zone(&zone).await?,
            None => manager.reconfigure().await?,
        },
        Command::Keygen { name, algorithm } => {
            let algorithm = TsigAlgorithm::from_name(&algorithm)
                .ok_or_else(|| format!("unsupported TSIG algorithm {}", algorithm))?;
            let key = manager.keys().generate(&name, algorithm).await?;
            println!("{}", manager.keys().key_path(&key.name).display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Args::parse()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
