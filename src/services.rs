//! Restarting the managed system services.

use log::{error, info};
use std::process::Stdio;
use tokio::process::Command;

use crate::outcome::StepOutcome;

pub const DHCP_SERVICE: &str = "dnsmasq";
pub const PROXY_SERVICE: &str = "3proxy";

/// Thin wrapper around the host service manager's command-line tool.
#[derive(Debug, Clone)]
pub struct ServiceManager {
    program: String,
}

impl Default for ServiceManager {
    fn default() -> Self {
        ServiceManager::new("systemctl")
    }
}

impl ServiceManager {
    pub fn new(program: impl Into<String>) -> Self {
        ServiceManager {
            program: program.into(),
        }
    }

    /// Runs `<program> restart <unit>` and reports whether it exited with status 0.
    ///
    /// # Command Executed
    /// ```bash
    /// systemctl restart <unit>
    /// ```
    pub async fn restart(&self, unit: &str) -> StepOutcome {
        let output = Command::new(&self.program)
            .args(["restart", unit])
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                info!("{} service started/restarted successfully", unit);
                StepOutcome::Succeeded
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                error!("{} service start restart error: {}", unit, stderr.trim());
                StepOutcome::failed(format!("{} exited with {}", self.program, output.status))
            }
            Err(e) => {
                error!("{} service start restart error: {}", unit, e);
                StepOutcome::failed(format!("failed to execute {}: {}", self.program, e))
            }
        }
    }
}
