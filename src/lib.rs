//! Raspberry Pi WiFi hotspot provisioning.
//!
//! This library turns a Pi with a wired (or otherwise upstream) WAN interface
//! and a WiFi interface into an access point whose clients get addresses from
//! dnsmasq and reach the internet only through a 3proxy allow-list.
//!
//! # Modules
//!
//! - [`config`] - Loading the ini configuration file
//! - [`nm`] - Typed requests against the NetworkManager daemon
//! - [`dbus`] - NetworkManager over the system D-Bus
//! - [`wan`] - Waiting for the WAN interface to get an address
//! - [`hotspot`] - Removing stale WiFi profiles and creating the access point
//! - [`render`] - dnsmasq and 3proxy configuration files
//! - [`services`] - Restarting system services
//! - [`provision`] - The ordered provisioning sequence and resident loop
//! - [`outcome`] - Step outcomes and failure policy
//! - [`error`] - Custom error types for the library
//!
//! # Example Usage
//!
//! ```no_run
//! use pi_hotspot::{Config, DbusNetworkManager, Provisioner, WaitPolicy, wait_for_wan_ip};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load("pihotspot.conf".as_ref())?;
//! let nm = DbusNetworkManager::new();
//!
//! let wan_ip = wait_for_wan_ip(
//!     &nm,
//!     &config.interface.wan,
//!     &WaitPolicy::default(),
//!     &CancellationToken::new(),
//! )
//! .await?;
//!
//! let report = Provisioner::new(&nm, &config).run(wan_ip).await?;
//! println!("failed steps: {:?}", report.failed_steps());
//! # Ok(())
//! # }
//! ```

/// Loading and validating the ini configuration file.
pub mod config;

/// D-Bus client for NetworkManager built on `zbus`.
pub mod dbus;

/// Error module defining custom error types for the library.
/// Uses `thiserror` for ergonomic error handling.
pub mod error;

/// Removing stale WiFi profiles and creating the access-point profile.
pub mod hotspot;

/// Typed requests against the NetworkManager daemon, behind a mockable trait.
pub mod nm;

/// Step outcomes and the failure policy.
pub mod outcome;

/// The ordered provisioning sequence and the resident service loop.
pub mod provision;

/// Rendering dnsmasq and 3proxy configuration files with `tera`.
pub mod render;

/// Restarting system services through the service manager.
pub mod services;

/// Waiting for the WAN interface to get an address.
pub mod wan;

pub use config::Config;
pub use dbus::DbusNetworkManager;
pub use error::HotspotError;
pub use nm::{AccessPointProfile, NetworkManager};
pub use outcome::{FailurePolicy, Step, StepOutcome};
pub use provision::{ProvisionReport, Provisioner, ResidentOptions, run_resident};
pub use render::OutputPaths;
pub use services::ServiceManager;
pub use wan::{WaitPolicy, fetch_wan_ip, wait_for_wan_ip};
