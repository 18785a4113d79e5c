use std::fmt;

/// Result of one provisioning step that is allowed to fail without aborting the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed { reason: String },
}

impl StepOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        StepOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded)
    }
}

/// The steps run after the WAN address is known, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    RemoveWifiConnections,
    CreateAccessPoint,
    ConfigureDhcp,
    ConfigureProxy,
    RestartDhcp,
    RestartProxy,
}

impl Step {
    /// Failing to write a config file ends the run regardless of policy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Step::ConfigureDhcp | Step::ConfigureProxy)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::RemoveWifiConnections => "remove-wifi-connections",
            Step::CreateAccessPoint => "create-access-point",
            Step::ConfigureDhcp => "configure-dhcp",
            Step::ConfigureProxy => "configure-proxy",
            Step::RestartDhcp => "restart-dhcp",
            Step::RestartProxy => "restart-proxy",
        };
        f.write_str(name)
    }
}

/// What to do when a non-fatal step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure and run the remaining steps.
    ///
    /// This keeps configuring and restarting DHCP and the proxy even when the
    /// access point could not be created.
    #[default]
    Continue,
    /// Stop at the first failed step.
    FailFast,
}
