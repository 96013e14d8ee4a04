//! Update operations and the update script they are sent in

use crate::record::{Record, RecordType, ValidationError};
use crate::zone::{absolute_name, fqdn};
use std::fmt::Write;

/// Update operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOperation {
    /// Add to an RRset
    Add {
        name: String,
        ttl: u32,
        rtype: RecordType,
        rdata: String,
    },
    /// Delete an RRset
    DeleteRRset { name: String, rtype: RecordType },
    /// Delete specific RR
    DeleteRR {
        name: String,
        rtype: RecordType,
        rdata: String,
    },
}

impl UpdateOperation {
    /// Add `record` to its RRset in `zone`
    pub fn add(record: &Record, zone: &str) -> Result<Self, ValidationError> {
        Ok(UpdateOperation::Add {
            name: absolute_name(&record.name, zone),
            ttl: record.ttl,
            rtype: record.rtype.clone(),
            rdata: qualified_rdata(record, zone)?,
        })
    }

    /// Remove every record at `name`/`rtype` in `zone`
    pub fn delete_rrset(name: &str, rtype: &RecordType, zone: &str) -> Self {
        UpdateOperation::DeleteRRset {
            name: absolute_name(name, zone),
            rtype: rtype.clone(),
        }
    }

    /// Remove exactly `record` from its RRset in `zone`
    pub fn delete_rr(record: &Record, zone: &str) -> Result<Self, ValidationError> {
        Ok(UpdateOperation::DeleteRR {
            name: absolute_name(&record.name, zone),
            rtype: record.rtype.clone(),
            rdata: qualified_rdata(record, zone)?,
        })
    }

    /// Script line for this operation
    pub fn render(&self) -> String {
        match self {
            UpdateOperation::Add {
                name,
                ttl,
                rtype,
                rdata,
            } => format!("update add {} {} {} {}", name, ttl, rtype, rdata),
            UpdateOperation::DeleteRRset { name, rtype } => {
                format!("update delete {} {}", name, rtype)
            }
            UpdateOperation::DeleteRR { name, rtype, rdata } => {
                format!("update delete {} {} {}", name, rtype, rdata)
            }
        }
    }
}

/// One update transaction: everything between `server` and `send`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateScript {
    server: String,
    port: u16,
    zone: String,
    operations: Vec<UpdateOperation>,
}

impl UpdateScript {
    pub fn new(server: impl Into<String>, port: u16, zone: &str) -> Self {
        Self {
            server: server.into(),
            port,
            zone: fqdn(zone),
            operations: Vec::new(),
        }
    }

    pub fn push(&mut self, operation: UpdateOperation) {
        self.operations.push(operation);
    }

    pub fn extend(&mut self, operations: impl IntoIterator<Item = UpdateOperation>) {
        self.operations.extend(operations);
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Render the script fed to the update tool on stdin
    pub fn render(&self) -> String {
        let mut script = String::new();
        // Writing to a String cannot fail
        let _ = writeln!(script, "server {} {}", self.server, self.port);
        let _ = writeln!(script, "zone {}", self.zone);
        for operation in &self.operations {
            let _ = writeln!(script, "{}", operation.render());
        }
        script.push_str("send\n");
        script
    }
}

/// Wire value with any relative target name made absolute under `zone`
fn qualified_rdata(record: &Record, zone: &str) -> Result<String, ValidationError> {
    if !record.rtype.has_domain_target() {
        return record.wire_value();
    }
    let mut qualified = record.clone();
    qualified.data.value = absolute_name(&record.data.value, zone);
    qualified.wire_value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_operations() {
        let record = Record::new("www", RecordType::A, "192.0.2.1", 300);
        let add = UpdateOperation::add(&record, "example.com").unwrap();
        assert_eq!(add.render(), "update add www.example.com. 300 A 192.0.2.1");

        let delete = UpdateOperation::delete_rrset("@", &RecordType::MX, "example.com.");
        assert_eq!(delete.render(), "update delete example.com. MX");

        let mx = Record::mx("@", 10, "mail", 3600);
        let delete_rr = UpdateOperation::delete_rr(&mx, "example.com").unwrap();
        assert_eq!(
            delete_rr.render(),
            "update delete example.com. MX 10 mail.example.com."
        );
    }

    #[test]
    fn test_targets_are_qualified() {
        let cname = Record::new("www", RecordType::CNAME, "@", 3600);
        let add = UpdateOperation::add(&cname, "example.com").unwrap();
        assert_eq!(add.render(), "update add www.example.com. 3600 CNAME example.com.");

        let srv = Record::srv("_sip._tcp", 10, 5, 5060, "sip.example.net.", 3600);
        let add = UpdateOperation::add(&srv, "example.com").unwrap();
        assert_eq!(
            add.render(),
            "update add _sip._tcp.example.com. 3600 SRV 10 5 5060 sip.example.net."
        );

        // TXT values are not names
        let txt = Record::new("@", RecordType::TXT, "hello world", 3600);
        let add = UpdateOperation::add(&txt, "example.com").unwrap();
        assert_eq!(add.render(), "update add example.com. 3600 TXT \"hello world\"");
    }

    #[test]
    fn test_render_script() {
        let mut script = UpdateScript::new("127.0.0.1", 53, "example.com");
        script.push(UpdateOperation::delete_rrset("www", &RecordType::A, "example.com"));
        script.push(
            UpdateOperation::add(
                &Record::new("www", RecordType::A, "192.0.2.1", 3600),
                "example.com",
            )
            .unwrap(),
        );

        assert_eq!(script.len(), 2);
        assert_eq!(
            script.render(),
            "server 127.0.0.1 53\n\
             zone example.com.\n\
             update delete www.example.com. A\n\
             update add www.example.com. 3600 A 192.0.2.1\n\
             send\n"
        );
    }
}
