//! NetworkManager over the system D-Bus.
//!
//! Implements [`NetworkManager`] with `zbus` proxies. Property caching is
//! disabled on every proxy so repeated polls observe the daemon's current
//! state rather than a snapshot taken when the proxy was built.
//!
//! The bus connection is opened on first use and kept once it succeeds. At
//! boot the system bus may not be up yet; a failed attempt surfaces as an
//! ordinary request error, and the next request tries again.

use anyhow::{Context, Result};
use std::collections::HashMap;
use tokio::sync::OnceCell;
use zbus::proxy::CacheProperties;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};
use zbus::{Connection, proxy};

use crate::nm::{
    AccessPointProfile, ActiveConnectionProperties, AddressData, ConnectionSettings,
    DeviceProperties, Ip4ConfigProperties, Ipv4Method, NetworkManager,
};

/// Well-known bus name of the NetworkManager daemon.
pub const NM_SERVICE: &str = "org.freedesktop.NetworkManager";

/// The daemon reports unset object-path properties as `/`.
const NULL_PATH: &str = "/";

#[proxy(
    interface = "org.freedesktop.NetworkManager",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager",
    gen_blocking = false
)]
trait Manager {
    fn get_devices(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Device",
    default_service = "org.freedesktop.NetworkManager",
    gen_blocking = false
)]
trait Device {
    #[zbus(property)]
    fn interface(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn active_connection(&self) -> zbus::Result<OwnedObjectPath>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Connection.Active",
    default_service = "org.freedesktop.NetworkManager",
    gen_blocking = false
)]
trait ActiveConnection {
    #[zbus(property, name = "Ip4Config")]
    fn ip4_config(&self) -> zbus::Result<OwnedObjectPath>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.IP4Config",
    default_service = "org.freedesktop.NetworkManager",
    gen_blocking = false
)]
trait Ip4Config {
    #[zbus(property)]
    fn address_data(&self) -> zbus::Result<Vec<HashMap<String, OwnedValue>>>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager/Settings",
    gen_blocking = false
)]
trait Settings {
    fn list_connections(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    fn add_connection(
        &self,
        connection: HashMap<&str, HashMap<&str, Value<'_>>>,
    ) -> zbus::Result<OwnedObjectPath>;
}

#[proxy(
    interface = "org.freedesktop.NetworkManager.Settings.Connection",
    default_service = "org.freedesktop.NetworkManager",
    gen_blocking = false
)]
trait SettingsConnection {
    fn get_settings(&self) -> zbus::Result<HashMap<String, HashMap<String, OwnedValue>>>;

    fn delete(&self) -> zbus::Result<()>;
}

/// [`NetworkManager`] backed by a lazily opened system bus connection.
#[derive(Default)]
pub struct DbusNetworkManager {
    connection: OnceCell<Connection>,
}

impl DbusNetworkManager {
    pub fn new() -> Self {
        DbusNetworkManager::default()
    }

    /// Returns the shared connection, connecting to the system bus if no
    /// attempt has succeeded yet.
    async fn connection(&self) -> Result<&Connection> {
        connect_once(&self.connection, || async {
            Connection::system()
                .await
                .context("Failed to connect to the system D-Bus")
        })
        .await
    }
}

/// Fills `cell` from `connect` unless an earlier call already succeeded.
/// A failed attempt leaves the cell empty.
async fn connect_once<'a, T, F, Fut>(cell: &'a OnceCell<T>, connect: F) -> Result<&'a T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    cell.get_or_try_init(connect).await
}

fn optional_path(path: OwnedObjectPath) -> Option<String> {
    let path = path.as_str();
    if path == NULL_PATH {
        None
    } else {
        Some(path.to_string())
    }
}

impl NetworkManager for DbusNetworkManager {
    async fn list_devices(&self) -> Result<Vec<String>> {
        let manager = ManagerProxy::builder(self.connection().await?)
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        let devices = manager
            .get_devices()
            .await
            .context("Failed to call GetDevices")?;

        Ok(devices.iter().map(|p| p.as_str().to_string()).collect())
    }

    async fn device_properties(&self, device: &str) -> Result<DeviceProperties> {
        let proxy = DeviceProxy::builder(self.connection().await?)
            .path(device)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        let interface = proxy
            .interface()
            .await
            .with_context(|| format!("Failed to read Interface of {}", device))?;
        let active_connection = proxy
            .active_connection()
            .await
            .with_context(|| format!("Failed to read ActiveConnection of {}", device))?;

        Ok(DeviceProperties {
            interface,
            active_connection: optional_path(active_connection),
        })
    }

    async fn active_connection_properties(
        &self,
        active: &str,
    ) -> Result<ActiveConnectionProperties> {
        let proxy = ActiveConnectionProxy::builder(self.connection().await?)
            .path(active)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        let ip4_config = proxy
            .ip4_config()
            .await
            .with_context(|| format!("Failed to read Ip4Config of {}", active))?;

        Ok(ActiveConnectionProperties {
            ip4_config: optional_path(ip4_config),
        })
    }

    async fn ip4_config_properties(&self, ip4_config: &str) -> Result<Ip4ConfigProperties> {
        let proxy = Ip4ConfigProxy::builder(self.connection().await?)
            .path(ip4_config)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        let address_data = proxy
            .address_data()
            .await
            .with_context(|| format!("Failed to read AddressData of {}", ip4_config))?;

        // Entries missing either field are skipped rather than failing the poll
        let addresses = address_data
            .iter()
            .filter_map(|entry| {
                let address = entry.get("address")?.downcast_ref::<&str>().ok()?;
                let prefix = entry.get("prefix")?.downcast_ref::<u32>().ok()?;
                Some(AddressData {
                    address: address.to_string(),
                    prefix,
                })
            })
            .collect();

        Ok(Ip4ConfigProperties { addresses })
    }

    async fn list_connections(&self) -> Result<Vec<String>> {
        let settings = SettingsProxy::builder(self.connection().await?)
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        let connections = settings
            .list_connections()
            .await
            .context("Failed to call ListConnections")?;

        Ok(connections.iter().map(|p| p.as_str().to_string()).collect())
    }

    async fn connection_settings(&self, connection: &str) -> Result<ConnectionSettings> {
        let proxy = SettingsConnectionProxy::builder(self.connection().await?)
            .path(connection)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        let settings = proxy
            .get_settings()
            .await
            .with_context(|| format!("Failed to call GetSettings on {}", connection))?;

        Ok(parse_connection_settings(&settings))
    }

    async fn delete_connection(&self, connection: &str) -> Result<()> {
        let proxy = SettingsConnectionProxy::builder(self.connection().await?)
            .path(connection)?
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        proxy
            .delete()
            .await
            .with_context(|| format!("Failed to delete connection {}", connection))
    }

    async fn add_connection(&self, profile: &AccessPointProfile) -> Result<String> {
        let settings = SettingsProxy::builder(self.connection().await?)
            .cache_properties(CacheProperties::No)
            .build()
            .await?;

        let path = settings
            .add_connection(profile_settings(profile))
            .await
            .with_context(|| format!("Failed to add connection '{}'", profile.id))?;

        Ok(path.as_str().to_string())
    }
}

/// Extracts the identity fields from a `GetSettings` reply.
fn parse_connection_settings(
    settings: &HashMap<String, HashMap<String, OwnedValue>>,
) -> ConnectionSettings {
    let Some(connection) = settings.get("connection") else {
        return ConnectionSettings::default();
    };

    let string_field = |key: &str| -> Option<String> {
        connection
            .get(key)
            .and_then(|v| v.downcast_ref::<&str>().ok())
            .map(String::from)
    };

    ConnectionSettings {
        id: string_field("id").unwrap_or_default(),
        uuid: string_field("uuid").unwrap_or_default(),
        interface_name: string_field("interface-name"),
    }
}

/// Builds the nested `a{sa{sv}}` settings dictionary for `AddConnection`.
fn profile_settings(profile: &AccessPointProfile) -> HashMap<&'static str, HashMap<&'static str, Value<'static>>> {
    let wireless = HashMap::from([
        ("ssid", Value::from(profile.ssid.as_bytes().to_vec())),
        ("mode", Value::from(profile.mode.as_str())),
    ]);

    let security = HashMap::from([
        ("key-mgmt", Value::from(profile.key_mgmt.as_str())),
        ("psk", Value::from(profile.psk.clone())),
    ]);

    let connection = HashMap::from([
        ("type", Value::from("802-11-wireless")),
        ("interface-name", Value::from(profile.interface_name.clone())),
        ("uuid", Value::from(profile.uuid.clone())),
        ("id", Value::from(profile.id.clone())),
        ("autoconnect", Value::from(profile.autoconnect)),
    ]);

    let Ipv4Method::Manual { address, prefix } = &profile.ipv4;
    let address_entry: HashMap<String, Value<'static>> = HashMap::from([
        ("address".to_string(), Value::from(address.to_string())),
        ("prefix".to_string(), Value::from(u32::from(*prefix))),
    ]);
    let ipv4 = HashMap::from([
        ("method", Value::from("manual")),
        ("address-data", Value::from(vec![address_entry])),
        ("dns", Value::from(Vec::<u32>::new())),
    ]);

    let ipv6_method = if profile.ipv6_enabled { "auto" } else { "ignore" };
    let ipv6 = HashMap::from([("method", Value::from(ipv6_method))]);

    HashMap::from([
        ("802-11-wireless", wireless),
        ("802-11-wireless-security", security),
        ("connection", connection),
        ("ipv4", ipv4),
        ("ipv6", ipv6),
    ])
}
