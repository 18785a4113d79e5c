//! The provisioning sequence that runs once the WAN address is known.
//!
//! Steps execute strictly in order:
//!
//! 1. Remove saved profiles bound to the WiFi interface
//! 2. Create the access-point profile
//! 3. Write the dnsmasq configuration
//! 4. Write the 3proxy configuration
//! 5. Restart dnsmasq
//! 6. Restart 3proxy
//!
//! Each step yields a [`StepOutcome`]. Under [`FailurePolicy::Continue`] a
//! failed daemon or restart step is logged and the sequence moves on; under
//! [`FailurePolicy::FailFast`] the first failure stops it. A config file that
//! cannot be written always stops it.
//!
//! [`run_resident`] wraps the whole service lifetime: wait for the WAN
//! address, provision, then stay idle until cancelled.

use anyhow::Result;
use log::{error, info, warn};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::HotspotError;
use crate::hotspot::{create_access_point, remove_wifi_connections};
use crate::nm::NetworkManager;
use crate::outcome::{FailurePolicy, Step, StepOutcome};
use crate::render::{OutputPaths, configure_dhcp, configure_proxy};
use crate::services::{DHCP_SERVICE, PROXY_SERVICE, ServiceManager};
use crate::wan::{WaitPolicy, wait_for_wan_ip};

/// How often the idle loop wakes after provisioning.
pub const IDLE_INTERVAL: Duration = Duration::from_secs(15);

/// Outcome of every step that ran, in execution order.
#[derive(Debug, Default, Clone)]
pub struct ProvisionReport {
    pub steps: Vec<(Step, StepOutcome)>,
}

impl ProvisionReport {
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    pub fn all_succeeded(&self) -> bool {
        self.steps.iter().all(|(_, o)| o.is_success())
    }

    pub fn failed_steps(&self) -> Vec<Step> {
        self.steps
            .iter()
            .filter(|(_, o)| !o.is_success())
            .map(|(s, _)| *s)
            .collect()
    }
}

pub struct Provisioner<'a, N: NetworkManager> {
    nm: &'a N,
    config: &'a Config,
    paths: OutputPaths,
    services: ServiceManager,
    policy: FailurePolicy,
}

impl<'a, N: NetworkManager> Provisioner<'a, N> {
    pub fn new(nm: &'a N, config: &'a Config) -> Self {
        Provisioner {
            nm,
            config,
            paths: OutputPaths::default(),
            services: ServiceManager::default(),
            policy: FailurePolicy::default(),
        }
    }

    pub fn paths(mut self, paths: OutputPaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn services(mut self, services: ServiceManager) -> Self {
        self.services = services;
        self
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs every step against `wan_ip`.
    ///
    /// # Returns
    /// - `Ok(report)` when the sequence ran to the end, possibly with failed steps
    /// - `Err(HotspotError::StepFailed)` when a step failure stopped the sequence
    pub async fn run(&self, wan_ip: Ipv4Addr) -> Result<ProvisionReport> {
        let mut report = ProvisionReport::default();

        let outcome = remove_wifi_connections(self.nm, &self.config.interface.wifi).await;
        self.record(&mut report, Step::RemoveWifiConnections, outcome)?;

        let outcome = create_access_point(self.nm, self.config).await;
        if !outcome.is_success() && self.policy == FailurePolicy::Continue {
            warn!("Continuing without an access point; DHCP and proxy will serve no clients");
        }
        self.record(&mut report, Step::CreateAccessPoint, outcome)?;

        let outcome = into_outcome(configure_dhcp(&self.config.hotspot, &self.paths.dnsmasq));
        self.record(&mut report, Step::ConfigureDhcp, outcome)?;

        let outcome = into_outcome(configure_proxy(
            wan_ip,
            &self.config.proxy,
            &self.paths.proxy,
        ));
        self.record(&mut report, Step::ConfigureProxy, outcome)?;

        let outcome = self.services.restart(DHCP_SERVICE).await;
        self.record(&mut report, Step::RestartDhcp, outcome)?;

        let outcome = self.services.restart(PROXY_SERVICE).await;
        self.record(&mut report, Step::RestartProxy, outcome)?;

        Ok(report)
    }

    fn record(&self, report: &mut ProvisionReport, step: Step, outcome: StepOutcome) -> Result<()> {
        let stop = match &outcome {
            StepOutcome::Succeeded => None,
            StepOutcome::Failed { reason } => {
                error!("Step {} failed: {}", step, reason);
                (step.is_fatal() || self.policy == FailurePolicy::FailFast).then(|| reason.clone())
            }
        };

        report.steps.push((step, outcome));

        match stop {
            Some(reason) => Err(HotspotError::StepFailed {
                step: step.to_string(),
                reason,
            }
            .into()),
            None => Ok(()),
        }
    }
}

/// Settings for [`run_resident`].
#[derive(Debug, Clone)]
pub struct ResidentOptions {
    pub wait: WaitPolicy,
    pub policy: FailurePolicy,
    pub paths: OutputPaths,
    pub services: ServiceManager,
    pub idle_interval: Duration,
}

impl Default for ResidentOptions {
    fn default() -> Self {
        ResidentOptions {
            wait: WaitPolicy::default(),
            policy: FailurePolicy::default(),
            paths: OutputPaths::default(),
            services: ServiceManager::default(),
            idle_interval: IDLE_INTERVAL,
        }
    }
}

/// Waits for the WAN address, provisions the hotspot and then idles until `cancel` fires.
///
/// # Returns
/// - `Ok(())` once cancelled, whether during the wait or while idle
/// - `Err(HotspotError::WanTimeout)` if the wait is bounded and runs out
/// - `Err(HotspotError::StepFailed)` if provisioning stopped early
pub async fn run_resident<N: NetworkManager>(
    nm: &N,
    config: &Config,
    options: ResidentOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let wan_ip = match wait_for_wan_ip(nm, &config.interface.wan, &options.wait, cancel).await {
        Ok(ip) => ip,
        Err(e) if matches!(e.downcast_ref::<HotspotError>(), Some(HotspotError::Cancelled)) => {
            info!("Cancelled while waiting for the WAN address");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    Provisioner::new(nm, config)
        .paths(options.paths)
        .services(options.services)
        .policy(options.policy)
        .run(wan_ip)
        .await?;

    info!("Provisioning finished, staying resident");
    idle(options.idle_interval, cancel).await;
    Ok(())
}

/// Stays resident until shutdown so the service manager sees the unit as running.
async fn idle(interval: Duration, cancel: &CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(interval) => {}
        }
    }
}

fn into_outcome(result: Result<()>) -> StepOutcome {
    match result {
        Ok(()) => StepOutcome::Succeeded,
        Err(e) => StepOutcome::failed(format!("{:#}", e)),
    }
}
