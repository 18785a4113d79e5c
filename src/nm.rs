//! Typed view of the NetworkManager daemon.
//!
//! The daemon exposes devices, connection profiles, active connections, and
//! IPv4 configurations as loosely-typed property maps on D-Bus object paths.
//! [`NetworkManager`] narrows that surface to the handful of requests the
//! provisioning workflow issues, each with an explicit response type, so the
//! workflow can run against the real bus ([`crate::dbus::DbusNetworkManager`])
//! or a mock in tests.

use anyhow::Result;
#[cfg(test)]
use mockall::automock;
use std::net::Ipv4Addr;
use trait_variant::make;

use crate::config::Config;

/// Properties of a managed device (`org.freedesktop.NetworkManager.Device`).
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProperties {
    /// Kernel interface name (e.g., "eth0").
    pub interface: String,
    /// Object path of the active connection, `None` when the device is idle.
    pub active_connection: Option<String>,
}

/// Properties of an active connection (`org.freedesktop.NetworkManager.Connection.Active`).
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveConnectionProperties {
    /// Object path of the IPv4 configuration, `None` until one is assigned.
    pub ip4_config: Option<String>,
}

/// One entry of the IPv4 configuration's `AddressData` property.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressData {
    pub address: String,
    pub prefix: u32,
}

/// Properties of an IPv4 configuration (`org.freedesktop.NetworkManager.IP4Config`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ip4ConfigProperties {
    pub addresses: Vec<AddressData>,
}

/// The subset of a saved connection profile's settings the workflow inspects.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionSettings {
    pub id: String,
    pub uuid: String,
    /// `connection.interface-name`; profiles not bound to an interface have none.
    pub interface_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiMode {
    AccessPoint,
}

impl WifiMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WifiMode::AccessPoint => "ap",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyManagement {
    WpaPsk,
}

impl KeyManagement {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyManagement::WpaPsk => "wpa-psk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ipv4Method {
    Manual { address: Ipv4Addr, prefix: u8 },
}

/// A WiFi access-point connection profile ready to be submitted with `AddConnection`.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPointProfile {
    pub id: String,
    pub uuid: String,
    pub interface_name: String,
    pub ssid: String,
    pub mode: WifiMode,
    pub key_mgmt: KeyManagement,
    pub psk: String,
    pub autoconnect: bool,
    pub ipv4: Ipv4Method,
    pub ipv6_enabled: bool,
}

impl AccessPointProfile {
    /// Builds the hotspot profile for the configured WiFi interface.
    ///
    /// The profile is named after the SSID and receives a fresh v4 UUID on
    /// every call.
    pub fn from_config(config: &Config) -> Self {
        AccessPointProfile {
            id: config.hotspot.ssid.clone(),
            uuid: uuid::Uuid::new_v4().to_string(),
            interface_name: config.interface.wifi.clone(),
            ssid: config.hotspot.ssid.clone(),
            mode: WifiMode::AccessPoint,
            key_mgmt: KeyManagement::WpaPsk,
            psk: config.hotspot.password.clone(),
            autoconnect: true,
            ipv4: Ipv4Method::Manual {
                address: config.hotspot.ip,
                prefix: config.hotspot.prefix,
            },
            ipv6_enabled: false,
        }
    }
}

/// Requests the provisioning workflow issues against the network-management daemon.
///
/// Object paths are passed around as plain strings.
#[make(Send)]
#[cfg_attr(test, automock)]
pub trait NetworkManager {
    /// `org.freedesktop.NetworkManager.GetDevices`
    async fn list_devices(&self) -> Result<Vec<String>>;

    async fn device_properties(&self, device: &str) -> Result<DeviceProperties>;

    async fn active_connection_properties(&self, active: &str)
    -> Result<ActiveConnectionProperties>;

    async fn ip4_config_properties(&self, ip4_config: &str) -> Result<Ip4ConfigProperties>;

    /// `org.freedesktop.NetworkManager.Settings.ListConnections`
    async fn list_connections(&self) -> Result<Vec<String>>;

    async fn connection_settings(&self, connection: &str) -> Result<ConnectionSettings>;

    async fn delete_connection(&self, connection: &str) -> Result<()>;

    /// Submits a new profile, returning the object path of the created connection.
    async fn add_connection(&self, profile: &AccessPointProfile) -> Result<String>;
}
