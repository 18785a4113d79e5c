//! Access-point connection profile management.
//!
//! Clears every saved profile bound to the WiFi interface, then registers a
//! fresh WPA-PSK access-point profile for it. Both operations report a
//! [`StepOutcome`] instead of failing the run; the caller decides whether
//! to continue.

use log::{error, info};

use crate::config::Config;
use crate::nm::{AccessPointProfile, NetworkManager};
use crate::outcome::StepOutcome;

/// Deletes every connection profile whose `interface-name` is `wifi_interface`.
///
/// Profiles bound to other interfaces, or to none, are left alone. A failure
/// on one profile does not stop the others from being deleted.
pub async fn remove_wifi_connections<N: NetworkManager>(
    nm: &N,
    wifi_interface: &str,
) -> StepOutcome {
    info!("Trying to remove existing WIFI connections");

    let connections = match nm.list_connections().await {
        Ok(c) => c,
        Err(e) => {
            error!("Removing existing WIFI connections error");
            error!("{:#}", e);
            return StepOutcome::failed(format!("{:#}", e));
        }
    };

    let mut failures = Vec::new();

    for connection in connections {
        let settings = match nm.connection_settings(&connection).await {
            Ok(s) => s,
            Err(e) => {
                error!("Reading settings of {} failed: {:#}", connection, e);
                failures.push(format!("{}: {:#}", connection, e));
                continue;
            }
        };

        if settings.interface_name.as_deref() != Some(wifi_interface) {
            continue;
        }

        match nm.delete_connection(&connection).await {
            Ok(()) => info!("Deleted existing WIFI connection - {}", settings.id),
            Err(e) => {
                error!("Deleting WIFI connection {} failed: {:#}", settings.id, e);
                failures.push(format!("{}: {:#}", settings.id, e));
            }
        }
    }

    if failures.is_empty() {
        StepOutcome::Succeeded
    } else {
        StepOutcome::failed(failures.join("; "))
    }
}

/// Registers the hotspot profile described by `config` with the daemon.
pub async fn create_access_point<N: NetworkManager>(nm: &N, config: &Config) -> StepOutcome {
    let profile = AccessPointProfile::from_config(config);
    info!(
        "Creating hotspot connection: {} - {}",
        profile.id, profile.uuid
    );

    match nm.add_connection(&profile).await {
        Ok(path) => {
            info!("Created access point connection {}", path);
            StepOutcome::Succeeded
        }
        Err(e) => {
            error!("Hotspot connection creation failed");
            error!("{:#}", e);
            StepOutcome::failed(format!("{:#}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nm::{ConnectionSettings, Ipv4Method, KeyManagement, MockNetworkManager, WifiMode};
    use anyhow::anyhow;
    use std::net::Ipv4Addr;

    const CONFIG: &str = "\
[interface]
wan = eth0
wifi = wlan0
[hotspot]
ip = 192.168.50.1
prefix = 24
ssid = pi-ap
password = supersecret
dhcpstart = 192.168.50.100
dhcpend = 192.168.50.200
[proxy]
port = 3128
alloweddomains = *.example.com
";

    fn settings_for(path: &str) -> ConnectionSettings {
        let (id, iface) = match path {
            "/Settings/1" => ("old-hotspot", Some("wlan0")),
            "/Settings/2" => ("wired", Some("eth0")),
            "/Settings/3" => ("guest", Some("wlan0")),
            _ => ("vpn", None),
        };
        ConnectionSettings {
            id: id.to_string(),
            uuid: format!("uuid-{}", id),
            interface_name: iface.map(String::from),
        }
    }

    fn expect_three_profiles(nm: &mut MockNetworkManager) {
        nm.expect_list_connections().returning(|| {
            Box::pin(async {
                Ok(vec![
                    "/Settings/1".to_string(),
                    "/Settings/2".to_string(),
                    "/Settings/3".to_string(),
                ])
            })
        });
        nm.expect_connection_settings().returning(|path| {
            let settings = settings_for(path);
            Box::pin(async move { Ok(settings) })
        });
    }

    #[tokio::test]
    async fn deletes_only_profiles_bound_to_wifi_interface() {
        let mut nm = MockNetworkManager::new();
        expect_three_profiles(&mut nm);
        nm.expect_delete_connection()
            .withf(|path| path == "/Settings/1" || path == "/Settings/3")
            .times(2)
            .returning(|_| Box::pin(async { Ok(()) }));

        let outcome = remove_wifi_connections(&nm, "wlan0").await;
        assert_eq!(outcome, StepOutcome::Succeeded);
    }

    #[tokio::test]
    async fn skips_profiles_without_interface() {
        let mut nm = MockNetworkManager::new();
        nm.expect_list_connections()
            .returning(|| Box::pin(async { Ok(vec!["/Settings/9".to_string()]) }));
        nm.expect_connection_settings().returning(|path| {
            let settings = settings_for(path);
            Box::pin(async move { Ok(settings) })
        });
        nm.expect_delete_connection().never();

        assert!(remove_wifi_connections(&nm, "wlan0").await.is_success());
    }

    #[tokio::test]
    async fn delete_failure_is_reported_but_others_proceed() {
        let mut nm = MockNetworkManager::new();
        expect_three_profiles(&mut nm);
        nm.expect_delete_connection()
            .times(2)
            .returning(|path| {
                let result = if path == "/Settings/1" {
                    Err(anyhow!("permission denied"))
                } else {
                    Ok(())
                };
                Box::pin(async move { result })
            });

        match remove_wifi_connections(&nm, "wlan0").await {
            StepOutcome::Failed { reason } => {
                assert!(reason.contains("old-hotspot"));
                assert!(reason.contains("permission denied"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn listing_failure_is_swallowed_into_outcome() {
        let mut nm = MockNetworkManager::new();
        nm.expect_list_connections()
            .returning(|| Box::pin(async { Err(anyhow!("daemon unreachable")) }));
        nm.expect_delete_connection().never();

        assert!(!remove_wifi_connections(&nm, "wlan0").await.is_success());
    }

    #[tokio::test]
    async fn submits_wpa_psk_access_point_profile() {
        let config = Config::parse(CONFIG).unwrap();

        let mut nm = MockNetworkManager::new();
        nm.expect_add_connection()
            .withf(|profile| {
                profile.mode == WifiMode::AccessPoint
                    && profile.key_mgmt == KeyManagement::WpaPsk
                    && profile.ssid == "pi-ap"
                    && profile.id == "pi-ap"
                    && profile.psk == "supersecret"
                    && profile.interface_name == "wlan0"
                    && profile.autoconnect
                    && !profile.ipv6_enabled
                    && profile.ipv4
                        == Ipv4Method::Manual {
                            address: Ipv4Addr::new(192, 168, 50, 1),
                            prefix: 24,
                        }
                    && uuid::Uuid::parse_str(&profile.uuid).is_ok()
            })
            .times(1)
            .returning(|_| {
                Box::pin(async { Ok("/org/freedesktop/NetworkManager/Settings/7".to_string()) })
            });

        assert!(create_access_point(&nm, &config).await.is_success());
    }

    #[tokio::test]
    async fn creation_failure_becomes_failed_outcome() {
        let config = Config::parse(CONFIG).unwrap();

        let mut nm = MockNetworkManager::new();
        nm.expect_add_connection()
            .returning(|_| Box::pin(async { Err(anyhow!("802-11-wireless: invalid mode")) }));

        match create_access_point(&nm, &config).await {
            StepOutcome::Failed { reason } => assert!(reason.contains("invalid mode")),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn each_profile_gets_a_fresh_uuid() {
        let config = Config::parse(CONFIG).unwrap();
        let a = AccessPointProfile::from_config(&config);
        let b = AccessPointProfile::from_config(&config);
        assert_ne!(a.uuid, b.uuid);
    }
}
