//! Common test utilities for the Bifrost integration tests

#![allow(dead_code)] // These functions are used by various test files

use async_trait::async_trait;
use bifrost::EngineConfig;
use bifrost::server::{CommandOutput, CommandRunner};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Test TSIG secret
pub const TEST_SECRET: &str = "2lbBTtsg0ybmdBrtbc5o4oJ8MaZ6fcYiP28B/GrNpEk=";

/// One call made through the mock runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

enum Reply {
    Output(CommandOutput),
    SpawnError(String),
    Delayed(Duration, CommandOutput),
}

/// Command runner answering from per-program queues
///
/// Programs with an empty queue succeed with no output.
#[derive(Default)]
pub struct MockRunner {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl MockRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the next output for `program`
    pub fn push(&self, program: &str, output: CommandOutput) {
        self.queue(program, Reply::Output(output));
    }

    /// Queue a failure to start `program`
    pub fn push_spawn_error(&self, program: &str, message: &str) {
        self.queue(program, Reply::SpawnError(message.to_string()));
    }

    /// Queue an output delivered after `delay`
    pub fn push_delayed(&self, program: &str, delay: Duration, output: CommandOutput) {
        self.queue(program, Reply::Delayed(delay, output));
    }

    fn queue(&self, program: &str, reply: Reply) {
        self.replies
            .lock()
            .entry(program.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    pub fn invocations_of(&self, program: &str) -> Vec<Invocation> {
        self.invocations
            .lock()
            .iter()
            .filter(|i| i.program == program)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> std::io::Result<CommandOutput> {
        self.invocations.lock().push(Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            stdin: stdin.map(str::to_string),
        });

        let reply = self
            .replies
            .lock()
            .get_mut(program)
            .and_then(|queue| queue.pop_front());

        match reply {
            None => Ok(CommandOutput::ok("")),
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::SpawnError(message)) => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                message,
            )),
            Some(Reply::Delayed(delay, output)) => {
                tokio::time::sleep(delay).await;
                Ok(output)
            }
        }
    }
}

/// Configuration rooted in `dir`, with an existing key file
pub fn test_config(dir: &Path) -> EngineConfig {
    let key_file = dir.join("ddns.key");
    std::fs::write(
        &key_file,
        format!(
            "key \"ddns-key\" {{\n    algorithm hmac-sha256;\n    secret \"{}\";\n}};\n",
            TEST_SECRET
        ),
    )
    .unwrap();

    EngineConfig {
        server_host: "127.0.0.1".to_string(),
        server_port: 53,
        key_file,
        key_name: Some("ddns-key".to_string()),
        named_conf: dir.join("named.conf.local"),
        zone_dir: dir.join("zones"),
        key_dir: dir.join("keys"),
        ..Default::default()
    }
}

/// Write key `name` into `key_dir` the way the key store lays it out
pub fn store_key(key_dir: &Path, name: &str) {
    std::fs::create_dir_all(key_dir).unwrap();
    std::fs::write(
        key_dir.join(format!("{}.key", name)),
        format!(
            "key \"{}\" {{\n    algorithm hmac-sha256;\n    secret \"{}\";\n}};\n",
            name, TEST_SECRET
        ),
    )
    .unwrap();
}

/// Minimal SOA-bearing zone file
pub fn zone_file(zone: &str, serial: u32) -> String {
    format!(
        "$TTL 3600\n$ORIGIN {zone}.\n@\tIN\tSOA\tns1.{zone}. admin.{zone}. {serial} 3600 900 604800 86400\n@\tIN\tNS\tns1.{zone}.\n"
    )
}

/// Query tool output for an AXFR of `zone`
pub fn axfr_output(zone: &str, serial: u32, body: &[&str]) -> String {
    let soa = format!(
        "{zone}.\t3600\tIN\tSOA\tns1.{zone}. admin.{zone}. {serial} 3600 900 604800 86400"
    );
    let mut output = format!("; <<>> DiG 9.18.24 <<>> {zone} AXFR\n;; global options: +cmd\n{soa}\n");
    output.push_str(&format!("{zone}.\t3600\tIN\tNS\tns1.{zone}.\n"));
    for line in body {
        output.push_str(line);
        output.push('\n');
    }
    output.push_str(&soa);
    output.push_str("\n;; Query time: 2 msec\n");
    output
}
