use super::command::CommandRunner;
use crate::error::{BifrostError, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Runs the server's zone validity checker over a zone file
pub struct ZoneChecker {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl ZoneChecker {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// Check `path` as the contents of `zone`; the diagnostic text is returned verbatim
    pub async fn check(&self, zone: &str, path: &Path) -> Result<()> {
        let args = vec![zone.to_string(), path.display().to_string()];
        let output = self
            .runner
            .run(&self.program, &args, None)
            .await
            .map_err(|e| BifrostError::Transaction(format!("failed to run {}: {}", self.program, e)))?;

        if output.success() {
            debug!("Zone {} passed checks", zone);
            Ok(())
        } else {
            Err(BifrostError::ZoneCheck(output.diagnostic()))
        }
    }
}
