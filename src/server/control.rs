//! Control channel (`rndc`) for the authoritative server

use super::command::CommandRunner;
use crate::error::{BifrostError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Server state as reported by the control channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub running: bool,
    pub version: Option<String>,
    pub config_time: Option<String>,
    pub boot_time: Option<String>,
    /// Diagnostic from the control channel when the server is not running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ServerStatus {
    /// Parse `rndc status` output
    pub fn parse(output: &str) -> Self {
        let mut status = ServerStatus::default();

        for line in output.lines() {
            let line = line.trim();
            if line.eq_ignore_ascii_case("server is up and running") {
                status.running = true;
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().to_string();
            match key.trim().to_lowercase().as_str() {
                "version" => status.version = Some(value),
                "boot time" => status.boot_time = Some(value),
                "last configured" => status.config_time = Some(value),
                _ => {}
            }
        }

        status
    }
}

/// Issues control commands to the server
pub struct ServerControl {
    runner: Arc<dyn CommandRunner>,
    program: String,
    base_args: Vec<String>,
}

impl ServerControl {
    /// `base_args` precede every command (e.g. `-c /etc/bind/rndc.conf`)
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self {
            runner,
            program: program.into(),
            base_args,
        }
    }

    /// Reload configuration and pick up new or removed zones
    pub async fn reconfigure(&self) -> Result<()> {
        self.rndc(&["reconfig"]).await?;
        info!("Server configuration reloaded");
        Ok(())
    }

    /// Reload a single zone from its file
    pub async fn reload_zone(&self, zone: &str) -> Result<()> {
        self.rndc(&["reload", zone]).await?;
        info!("Zone {} reloaded", zone);
        Ok(())
    }

    /// Query server status; a server that does not answer reports `running: false`
    pub async fn status(&self) -> Result<ServerStatus> {
        let args = self.args(&["status"]);
        let output = self
            .runner
            .run(&self.program, &args, None)
            .await
            .map_err(|e| BifrostError::Transaction(format!("failed to run {}: {}", self.program, e)))?;

        if !output.success() {
            warn!("Server status query failed: {}", output.diagnostic());
            return Ok(ServerStatus {
                detail: Some(output.diagnostic()),
                ..Default::default()
            });
        }

        Ok(ServerStatus::parse(&output.stdout))
    }

    async fn rndc(&self, command: &[&str]) -> Result<String> {
        let args = self.args(command);
        let output = self
            .runner
            .run(&self.program, &args, None)
            .await
            .map_err(|e| BifrostError::Transaction(format!("failed to run {}: {}", self.program, e)))?;

        if !output.success() {
            return Err(BifrostError::Transaction(output.diagnostic()));
        }
        Ok(output.stdout)
    }

    fn args(&self, command: &[&str]) -> Vec<String> {
        self.base_args
            .iter()
            .cloned()
            .chain(command.iter().map(|s| s.to_string()))
            .collect()
    }
}
