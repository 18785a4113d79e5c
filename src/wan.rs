//! WAN address discovery.
//!
//! The proxy egresses from the WAN interface's address, so nothing else can
//! be configured until NetworkManager reports one. [`fetch_wan_ip`] performs a
//! single lookup; [`wait_for_wan_ip`] repeats it at a fixed interval.
//!
//! # Lookup Chain
//!
//! 1. List the devices managed by the daemon
//! 2. Find the device whose interface name equals the configured WAN interface
//! 3. Resolve its active connection, then that connection's IPv4 configuration
//! 4. Take the first entry of `AddressData`
//!
//! # Liveness
//!
//! With the default [`WaitPolicy`] the wait is unbounded: if the WAN interface
//! never comes up, startup blocks until the process is cancelled. Set
//! [`WaitPolicy::timeout`] to bound it.

use anyhow::{Context, Result};
use log::{error, info};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use crate::error::HotspotError;
use crate::nm::NetworkManager;

/// Interval between lookups when no address is available yet.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Controls how long [`wait_for_wan_ip`] keeps polling.
#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub retry_interval: Duration,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        WaitPolicy {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            timeout: None,
        }
    }
}

/// Queries the daemon once for the first IPv4 address of `wan_interface`.
///
/// # Returns
/// - `Ok(addr)` when the interface has an active connection with an address
/// - `Err(HotspotError::InterfaceNotFound)` if no managed device has that name
/// - `Err(HotspotError::NoActiveConnection)` / `Err(HotspotError::NoAddress)`
///   while the interface is still coming up
/// - any daemon communication error
pub async fn fetch_wan_ip<N: NetworkManager>(nm: &N, wan_interface: &str) -> Result<Ipv4Addr> {
    info!("Trying to fetch WAN IP");

    let devices = nm.list_devices().await?;

    for device in devices {
        let props = nm.device_properties(&device).await?;
        if props.interface != wan_interface {
            continue;
        }

        let active = props
            .active_connection
            .ok_or_else(|| HotspotError::NoActiveConnection(wan_interface.to_string()))?;
        let ip4_config = nm
            .active_connection_properties(&active)
            .await?
            .ip4_config
            .ok_or_else(|| HotspotError::NoAddress(wan_interface.to_string()))?;
        let first = nm
            .ip4_config_properties(&ip4_config)
            .await?
            .addresses
            .into_iter()
            .next()
            .ok_or_else(|| HotspotError::NoAddress(wan_interface.to_string()))?;

        let address: Ipv4Addr = first
            .address
            .parse()
            .with_context(|| format!("Daemon reported a malformed address: {}", first.address))?;

        info!("WAN IP fetched for {} - {}", wan_interface, address);
        return Ok(address);
    }

    Err(HotspotError::InterfaceNotFound(wan_interface.to_string()).into())
}

/// Polls [`fetch_wan_ip`] until it yields an address.
///
/// Every failed lookup is logged and treated as "not available yet". Between
/// attempts the task sleeps for `policy.retry_interval`, waking early if
/// `cancel` fires.
///
/// # Returns
/// - `Ok(addr)` from the first successful lookup
/// - `Err(HotspotError::Cancelled)` if `cancel` fires first
/// - `Err(HotspotError::WanTimeout)` once `policy.timeout` has elapsed
pub async fn wait_for_wan_ip<N: NetworkManager>(
    nm: &N,
    wan_interface: &str,
    policy: &WaitPolicy,
    cancel: &CancellationToken,
) -> Result<Ipv4Addr> {
    let deadline = policy.timeout.map(|t| Instant::now() + t);

    loop {
        if cancel.is_cancelled() {
            return Err(HotspotError::Cancelled.into());
        }

        match fetch_wan_ip(nm, wan_interface).await {
            Ok(address) => return Ok(address),
            Err(e) => {
                error!("Trying to fetch WAN IP error");
                error!("{:#}", e);
            }
        }

        if let Some(deadline) = deadline {
            if Instant::now() + policy.retry_interval > deadline {
                let secs = policy.timeout.map(|t| t.as_secs()).unwrap_or_default();
                return Err(HotspotError::WanTimeout(secs).into());
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(HotspotError::Cancelled.into()),
            _ = sleep(policy.retry_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nm::{
        ActiveConnectionProperties, AddressData, DeviceProperties, Ip4ConfigProperties,
        MockNetworkManager,
    };
    use anyhow::anyhow;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ETH0: &str = "/org/freedesktop/NetworkManager/Devices/2";
    const WLAN0: &str = "/org/freedesktop/NetworkManager/Devices/3";
    const ACTIVE: &str = "/org/freedesktop/NetworkManager/ActiveConnection/1";
    const IP4: &str = "/org/freedesktop/NetworkManager/IP4Config/5";

    fn instant_policy() -> WaitPolicy {
        WaitPolicy {
            retry_interval: Duration::ZERO,
            timeout: None,
        }
    }

    /// Wires up a daemon where eth0 is connected and owns `address`.
    fn expect_connected_wan(nm: &mut MockNetworkManager, address: &'static str) {
        nm.expect_device_properties().returning(|device| {
            let props = if device == ETH0 {
                DeviceProperties {
                    interface: "eth0".to_string(),
                    active_connection: Some(ACTIVE.to_string()),
                }
            } else {
                DeviceProperties {
                    interface: "wlan0".to_string(),
                    active_connection: None,
                }
            };
            Box::pin(async move { Ok(props) })
        });
        nm.expect_active_connection_properties().returning(|_| {
            Box::pin(async {
                Ok(ActiveConnectionProperties {
                    ip4_config: Some(IP4.to_string()),
                })
            })
        });
        nm.expect_ip4_config_properties().returning(move |_| {
            Box::pin(async move {
                Ok(Ip4ConfigProperties {
                    addresses: vec![
                        AddressData {
                            address: address.to_string(),
                            prefix: 24,
                        },
                        AddressData {
                            address: "10.0.0.99".to_string(),
                            prefix: 8,
                        },
                    ],
                })
            })
        });
    }

    #[tokio::test]
    async fn fetch_returns_first_address_of_wan_device() {
        let mut nm = MockNetworkManager::new();
        nm.expect_list_devices()
            .times(1)
            .returning(|| Box::pin(async { Ok(vec![WLAN0.to_string(), ETH0.to_string()]) }));
        expect_connected_wan(&mut nm, "203.0.113.7");

        let ip = fetch_wan_ip(&nm, "eth0").await.unwrap();
        assert_eq!(ip, Ipv4Addr::new(203, 0, 113, 7));
    }

    #[tokio::test]
    async fn fetch_fails_for_unknown_interface() {
        let mut nm = MockNetworkManager::new();
        nm.expect_list_devices()
            .returning(|| Box::pin(async { Ok(vec![ETH0.to_string()]) }));
        expect_connected_wan(&mut nm, "203.0.113.7");

        let err = fetch_wan_ip(&nm, "usb0").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HotspotError>(),
            Some(HotspotError::InterfaceNotFound(name)) if name == "usb0"
        ));
    }

    #[tokio::test]
    async fn fetch_fails_without_active_connection() {
        let mut nm = MockNetworkManager::new();
        nm.expect_list_devices()
            .returning(|| Box::pin(async { Ok(vec![ETH0.to_string()]) }));
        nm.expect_device_properties().returning(|_| {
            Box::pin(async {
                Ok(DeviceProperties {
                    interface: "eth0".to_string(),
                    active_connection: None,
                })
            })
        });
        nm.expect_active_connection_properties().never();

        let err = fetch_wan_ip(&nm, "eth0").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HotspotError>(),
            Some(HotspotError::NoActiveConnection(_))
        ));
    }

    #[tokio::test]
    async fn wait_retries_until_address_appears() {
        const FAILURES: usize = 3;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut nm = MockNetworkManager::new();
        nm.expect_list_devices()
            .times(FAILURES + 1)
            .returning(move || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    if attempt < FAILURES {
                        Err(anyhow!("NetworkManager is not running"))
                    } else {
                        Ok(vec![ETH0.to_string()])
                    }
                })
            });
        expect_connected_wan(&mut nm, "203.0.113.7");

        let ip = wait_for_wan_ip(&nm, "eth0", &instant_policy(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ip, Ipv4Addr::new(203, 0, 113, 7));
        assert_eq!(calls.load(Ordering::SeqCst), FAILURES + 1);
    }

    #[tokio::test]
    async fn wait_stops_when_cancelled() {
        let mut nm = MockNetworkManager::new();
        nm.expect_list_devices()
            .returning(|| Box::pin(async { Err(anyhow!("no daemon")) }));

        let cancel = CancellationToken::new();
        let policy = WaitPolicy {
            retry_interval: Duration::from_secs(3600),
            timeout: None,
        };

        let trigger = cancel.clone();
        let (result, _) = tokio::join!(wait_for_wan_ip(&nm, "eth0", &policy, &cancel), async {
            trigger.cancel();
        });

        assert!(matches!(
            result.unwrap_err().downcast_ref::<HotspotError>(),
            Some(HotspotError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn wait_gives_up_after_timeout() {
        let mut nm = MockNetworkManager::new();
        nm.expect_list_devices()
            .returning(|| Box::pin(async { Err(anyhow!("no daemon")) }));

        let policy = WaitPolicy {
            retry_interval: Duration::from_millis(5),
            timeout: Some(Duration::from_millis(20)),
        };

        let err = wait_for_wan_ip(&nm, "eth0", &policy, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HotspotError>(),
            Some(HotspotError::WanTimeout(_))
        ));
    }
}
