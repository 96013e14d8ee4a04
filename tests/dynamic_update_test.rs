mod common;

use bifrost::BifrostError;
use bifrost::dynamic_update::{TsigKeyStore, UpdateBatcher};
use bifrost::record::{Record, RecordType};
use bifrost::server::CommandOutput;
use common::MockRunner;
use std::sync::Arc;
use tempfile::TempDir;

fn batcher(runner: Arc<MockRunner>, dir: &TempDir) -> UpdateBatcher {
    let config = common::test_config(dir.path());
    UpdateBatcher::new(runner, "nsupdate", "127.0.0.1", 53, config.key_file)
}

fn a_record(i: usize) -> Record {
    Record::new(format!("host{}", i), RecordType::A, format!("192.0.2.{}", i + 1), 3600)
}

#[tokio::test]
async fn test_bulk_create_accounting() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    let batcher = batcher(runner.clone(), &dir);

    let mut records: Vec<Record> = (0..23).map(a_record).collect();
    records[3] = Record::new("bad", RecordType::A, "127.0.0.1", 3600);
    records[17] = Record::new("@", RecordType::CNAME, "www.example.com.", 3600);

    let result = batcher.bulk_create("example.com", &records).await.unwrap();

    assert_eq!(result.success_count + result.failed_count, records.len());
    assert_eq!(result.failed_count, 2);
    assert_eq!(result.success_count, 21);
    assert_eq!(result.successful_records.len(), 21);
    assert_eq!(result.failed_records.len(), 2);
    assert_eq!(result.errors.len(), 2);

    // 23 records in batches of 10
    let calls = runner.invocations_of("nsupdate");
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].args, vec!["-k".to_string(), dir.path().join("ddns.key").display().to_string()]);

    let first = calls[0].stdin.as_deref().unwrap();
    assert!(first.starts_with("server 127.0.0.1 53\nzone example.com.\n"));
    assert!(first.ends_with("send\n"));
    assert_eq!(first.matches("update add").count(), 9);
    assert!(!first.contains("bad.example.com."));
    assert!(first.contains("update add host0.example.com. 3600 A 192.0.2.1\n"));
}

#[tokio::test]
async fn test_failed_transaction_fails_whole_batch() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    runner.push("nsupdate", CommandOutput::ok(""));
    runner.push("nsupdate", CommandOutput::failed(2, "update failed: REFUSED\n"));

    let batcher = batcher(runner.clone(), &dir).with_batch_size(4);
    let mut records: Vec<Record> = (0..10).map(a_record).collect();
    records[5] = Record::new("bad", RecordType::A, "0.0.0.0", 3600);

    let result = batcher.bulk_create("example.com", &records).await.unwrap();

    assert_eq!(result.total(), 10);
    // Batch 2 carried records 4, 6 and 7; record 5 failed validation
    assert_eq!(result.failed_count, 4);
    assert_eq!(result.success_count, 6);

    let refused: Vec<_> = result
        .failed_records
        .iter()
        .filter(|f| f.reason == "update failed: REFUSED")
        .map(|f| f.record.name.clone())
        .collect();
    assert_eq!(refused, vec!["host4", "host6", "host7"]);

    let invalid = result
        .failed_records
        .iter()
        .find(|f| f.record.name == "bad")
        .unwrap();
    assert!(invalid.reason.starts_with("value:"));

    assert!(result.successful_records.iter().any(|r| r.name == "host9"));
}

#[tokio::test]
async fn test_spawn_error_fails_batch() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    runner.push_spawn_error("nsupdate", "No such file or directory");

    let batcher = batcher(runner.clone(), &dir);
    let records: Vec<Record> = (0..3).map(a_record).collect();
    let result = batcher.bulk_create("example.com", &records).await.unwrap();

    assert_eq!(result.failed_count, 3);
    assert!(result.failed_records[0].reason.contains("No such file or directory"));
}

#[tokio::test]
async fn test_missing_key_file_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    let batcher = UpdateBatcher::new(
        runner.clone(),
        "nsupdate",
        "127.0.0.1",
        53,
        dir.path().join("missing.key"),
    );

    let result = batcher.bulk_create("example.com", &[a_record(1)]).await;
    assert!(matches!(result, Err(BifrostError::Configuration(_))));

    let result = batcher.upsert("example.com", &a_record(1)).await;
    assert!(matches!(result, Err(BifrostError::Configuration(_))));

    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn test_upsert_replaces_rrset() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    let batcher = batcher(runner.clone(), &dir);

    let record = Record::mx("@", 10, "mail", 3600);
    batcher.upsert("example.com", &record).await.unwrap();

    let calls = runner.invocations_of("nsupdate");
    assert_eq!(
        calls[0].stdin.as_deref().unwrap(),
        "server 127.0.0.1 53\n\
         zone example.com.\n\
         update delete example.com. MX\n\
         update add example.com. 3600 MX 10 mail.example.com.\n\
         send\n"
    );
}

#[tokio::test]
async fn test_single_operations() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    let batcher = batcher(runner.clone(), &dir);

    batcher
        .add("example.com", &Record::new("www", RecordType::A, "192.0.2.10", 300))
        .await
        .unwrap();
    batcher
        .delete_value("example.com", &Record::new("www", RecordType::A, "192.0.2.9", 300))
        .await
        .unwrap();
    batcher
        .delete("example.com", "old", &RecordType::TXT)
        .await
        .unwrap();

    let scripts: Vec<String> = runner
        .invocations_of("nsupdate")
        .into_iter()
        .filter_map(|i| i.stdin)
        .collect();
    assert!(scripts[0].contains("update add www.example.com. 300 A 192.0.2.10\n"));
    assert!(!scripts[0].contains("update delete"));
    assert!(scripts[1].contains("update delete www.example.com. A 192.0.2.9\n"));
    assert!(scripts[2].contains("update delete old.example.com. TXT\n"));
}

#[tokio::test]
async fn test_invalid_single_record_names_record() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    let batcher = batcher(runner.clone(), &dir);

    let err = batcher
        .upsert("example.com", &Record::new("@", RecordType::CNAME, "target.example.com.", 3600))
        .await
        .unwrap_err();

    match err {
        BifrostError::Validation { record, source } => {
            assert_eq!(record, "@ CNAME");
            assert_eq!(source.field, "name");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn test_single_transaction_error_is_verbatim() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    runner.push("nsupdate", CommandOutput::failed(2, "update failed: NOTAUTH(BADKEY)\n"));
    let batcher = batcher(runner.clone(), &dir);

    let err = batcher.add("example.com", &a_record(1)).await.unwrap_err();
    assert!(matches!(err, BifrostError::Transaction(msg) if msg == "update failed: NOTAUTH(BADKEY)"));
}

#[tokio::test]
async fn test_bulk_update_and_delete() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    let batcher = batcher(runner.clone(), &dir);

    let records = vec![
        Record::new("www", RecordType::A, "192.0.2.1", 3600),
        Record::new("api", RecordType::A, "192.0.2.2", 3600),
    ];
    let result = batcher.bulk_update("example.com", &records).await.unwrap();
    assert_eq!(result.success_count, 2);

    // Deletes check the owner name only
    let doomed = vec![
        Record::new("www", RecordType::A, "not an address", 3600),
        Record::new("@", RecordType::CNAME, "", 3600),
    ];
    let result = batcher.bulk_delete("example.com", &doomed).await.unwrap();
    assert_eq!(result.success_count, 2);
    assert_eq!(result.failed_count, 0);

    let scripts: Vec<String> = runner
        .invocations_of("nsupdate")
        .into_iter()
        .filter_map(|i| i.stdin)
        .collect();
    assert_eq!(scripts.len(), 2);
    assert_eq!(scripts[0].matches("update delete").count(), 2);
    assert_eq!(scripts[0].matches("update add").count(), 2);
    assert!(scripts[1].contains("update delete www.example.com. A\n"));
    assert!(scripts[1].contains("update delete example.com. CNAME\n"));
    assert!(!scripts[1].contains("update add"));
}

#[tokio::test]
async fn test_empty_input() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    let batcher = batcher(runner.clone(), &dir);

    let result = batcher.bulk_create("example.com", &[]).await.unwrap();
    assert_eq!(result.total(), 0);
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn test_delete_names_cannot_smuggle_commands() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    let batcher = batcher(runner.clone(), &dir);

    let doomed = vec![
        Record::new("www\nupdate delete example.com. NS", RecordType::A, "", 3600),
        Record::new("api", RecordType::A, "", 3600),
    ];
    let result = batcher.bulk_delete("example.com", &doomed).await.unwrap();
    assert_eq!(result.failed_count, 1);
    assert_eq!(result.success_count, 1);
    assert!(result.failed_records[0].reason.starts_with("name:"));

    let err = batcher
        .delete("example.com", "old\nsend", &RecordType::TXT)
        .await
        .unwrap_err();
    assert!(matches!(err, BifrostError::Validation { ref source, .. } if source.field == "name"));

    let err = batcher
        .delete_value(
            "example.com",
            &Record::new("www", RecordType::TXT, "x\"\nupdate add evil.example.com. 60 A 192.0.2.66\n\"", 300),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BifrostError::Validation { ref source, .. } if source.field == "value"));

    let err = batcher
        .delete("example.com\nupdate delete", "www", &RecordType::A)
        .await
        .unwrap_err();
    assert!(matches!(err, BifrostError::Validation { ref source, .. } if source.field == "zone"));

    let scripts: Vec<String> = runner
        .invocations_of("nsupdate")
        .into_iter()
        .filter_map(|i| i.stdin)
        .collect();
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].lines().count(), 4);
    assert!(!scripts[0].contains("NS"));
}

#[tokio::test]
async fn test_txt_with_newline_never_sent() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    let batcher = batcher(runner.clone(), &dir);

    let record = Record::new(
        "www",
        RecordType::TXT,
        "hello\nupdate delete example.com. NS",
        300,
    );
    let err = batcher.upsert("example.com", &record).await.unwrap_err();
    assert!(matches!(err, BifrostError::Validation { ref source, .. } if source.field == "value"));

    let result = batcher.bulk_create("example.com", &[record]).await.unwrap();
    assert_eq!(result.failed_count, 1);
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn test_absolute_apex_cname_rejected() {
    let dir = TempDir::new().unwrap();
    let runner = MockRunner::new();
    let batcher = batcher(runner.clone(), &dir);

    let apex = Record::new("example.com.", RecordType::CNAME, "target.example.net.", 3600);
    let err = batcher.upsert("example.com", &apex).await.unwrap_err();
    assert!(matches!(err, BifrostError::Validation { ref source, .. } if source.field == "name"));

    let records = vec![
        Record::new("EXAMPLE.COM.", RecordType::CNAME, "target.example.net.", 3600),
        Record::new("www.example.com.", RecordType::CNAME, "target.example.net.", 3600),
    ];
    let result = batcher.bulk_create("example.com", &records).await.unwrap();
    assert_eq!(result.failed_count, 1);
    assert_eq!(result.success_count, 1);
    assert_eq!(result.failed_records[0].record.name, "EXAMPLE.COM.");

    let scripts: Vec<String> = runner
        .invocations_of("nsupdate")
        .into_iter()
        .filter_map(|i| i.stdin)
        .collect();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains("update add www.example.com. 3600 CNAME target.example.net.\n"));
}

#[tokio::test]
async fn test_accepted_transaction_marks_key_used() {
    let dir = TempDir::new().unwrap();
    let key_dir = dir.path().join("keys");
    common::store_key(&key_dir, "ddns-key");

    let runner = MockRunner::new();
    runner.push("nsupdate", CommandOutput::failed(2, "update failed: REFUSED\n"));
    let store = Arc::new(
        TsigKeyStore::new(runner.clone(), "tsig-keygen", &key_dir)
            .with_key_file(dir.path().join("ddns.key"), "ddns-key"),
    );
    let batcher = batcher(runner.clone(), &dir).with_key_store(store.clone());

    assert!(batcher.add("example.com", &a_record(1)).await.is_err());
    assert!(store.get("ddns-key").await.unwrap().last_used.is_none());

    batcher.add("example.com", &a_record(1)).await.unwrap();
    assert!(store.get("ddns-key").await.unwrap().last_used.is_some());
}
