use anyhow::Result;
use ini::{Ini, ParseOption, Properties};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

use crate::error::HotspotError;

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "pihotspot.conf";

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub interface: InterfaceConfig,
    pub hotspot: HotspotConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceConfig {
    /// Uplink interface whose address the proxy egresses from (e.g. "eth0").
    pub wan: String,
    /// Interface that will carry the access point (e.g. "wlan0").
    pub wifi: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HotspotConfig {
    pub ip: Ipv4Addr,
    pub prefix: u8,
    pub ssid: String,
    #[serde(serialize_with = "mask_password")]
    pub password: String,
    pub dhcp_start: Ipv4Addr,
    pub dhcp_end: Ipv4Addr,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyConfig {
    pub port: u16,
    pub allowed_domains: Vec<String>,
}

impl Config {
    /// Loads and validates the configuration file.
    ///
    /// Any unreadable file, missing section, missing key, or malformed value
    /// is reported as a [`HotspotError`] naming the offending entry.
    pub fn load(path: &Path) -> Result<Self> {
        let ini = Ini::load_from_file_opt(path, literal_values()).map_err(|e| HotspotError::ConfigRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_ini(&ini)
    }

    /// Parses configuration from in-memory text.
    pub fn parse(content: &str) -> Result<Self> {
        let ini = Ini::load_from_str_opt(content, literal_values()).map_err(|e| HotspotError::ConfigRead {
            path: "<memory>".to_string(),
            reason: e.to_string(),
        })?;

        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self> {
        let interface = Section::new(ini, "interface")?;
        let hotspot = Section::new(ini, "hotspot")?;
        let proxy = Section::new(ini, "proxy")?;

        let prefix: u8 = hotspot.parse("prefix")?;
        if prefix > 32 {
            return Err(hotspot.invalid("prefix", "prefix length must be between 0 and 32").into());
        }

        let allowed_domains: Vec<String> = proxy
            .get("alloweddomains")?
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from)
            .collect();
        if allowed_domains.is_empty() {
            return Err(proxy.invalid("alloweddomains", "at least one domain is required").into());
        }

        Ok(Config {
            interface: InterfaceConfig {
                wan: interface.get("wan")?.to_string(),
                wifi: interface.get("wifi")?.to_string(),
            },
            hotspot: HotspotConfig {
                ip: hotspot.parse("ip")?,
                prefix,
                ssid: hotspot.get("ssid")?.to_string(),
                password: hotspot.get("password")?.to_string(),
                dhcp_start: hotspot.parse("dhcpstart")?,
                dhcp_end: hotspot.parse("dhcpend")?,
            },
            proxy: ProxyConfig {
                port: proxy.parse("port")?,
                allowed_domains,
            },
        })
    }

    /// Prints the configuration in a human-readable layout, masking the passphrase.
    pub fn display(&self, path: &Path) {
        println!("Config file: {}", path.display());
        println!();
        println!("[interface]");
        println!("  wan:            {}", self.interface.wan);
        println!("  wifi:           {}", self.interface.wifi);
        println!("[hotspot]");
        println!("  ip:             {}/{}", self.hotspot.ip, self.hotspot.prefix);
        println!("  ssid:           {}", self.hotspot.ssid);
        println!("  password:       {}", masked(&self.hotspot.password));
        println!(
            "  dhcp range:     {} - {}",
            self.hotspot.dhcp_start, self.hotspot.dhcp_end
        );
        println!("[proxy]");
        println!("  port:           {}", self.proxy.port);
        println!("  allowed:        {}", self.proxy.allowed_domains.join(", "));
    }
}

/// Values are taken verbatim: no escape sequences, no quote stripping.
/// Passphrases in particular must reach NetworkManager exactly as written.
fn literal_values() -> ParseOption {
    ParseOption {
        enabled_escape: false,
        enabled_quote: false,
        ..Default::default()
    }
}

fn masked(password: &str) -> String {
    "*".repeat(password.len().min(12))
}

fn mask_password<S: serde::Serializer>(password: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&masked(password))
}

/// A required section of the ini file, with typed key lookups.
struct Section<'a> {
    name: &'static str,
    properties: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(ini: &'a Ini, name: &'static str) -> Result<Self, HotspotError> {
        let properties = ini
            .section(Some(name))
            .ok_or_else(|| HotspotError::MissingSection(name.to_string()))?;
        Ok(Section { name, properties })
    }

    fn get(&self, key: &str) -> Result<&'a str, HotspotError> {
        self.properties
            .get(key)
            .map(str::trim)
            .ok_or_else(|| HotspotError::MissingKey {
                section: self.name.to_string(),
                key: key.to_string(),
            })
    }

    fn parse<T>(&self, key: &str) -> Result<T, HotspotError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)?
            .parse()
            .map_err(|e: T::Err| self.invalid(key, &e.to_string()))
    }

    fn invalid(&self, key: &str, reason: &str) -> HotspotError {
        HotspotError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "\
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
alloweddomains = *.example.com, .debian.org
";

    fn error_of(content: &str) -> HotspotError {
        Config::parse(content)
            .unwrap_err()
            .downcast::<HotspotError>()
            .unwrap()
    }

    #[test]
    fn parses_all_sections() {
        let cfg = Config::parse(VALID).unwrap();
        assert_eq!(cfg.interface.wan, "eth0");
        assert_eq!(cfg.interface.wifi, "wlan0");
        assert_eq!(cfg.hotspot.ip, Ipv4Addr::new(192, 168, 50, 1));
        assert_eq!(cfg.hotspot.prefix, 24);
        assert_eq!(cfg.hotspot.ssid, "pi-ap");
        assert_eq!(cfg.hotspot.dhcp_end, Ipv4Addr::new(192, 168, 50, 200));
        assert_eq!(cfg.proxy.port, 3128);
        assert_eq!(cfg.proxy.allowed_domains, vec!["*.example.com", ".debian.org"]);
    }

    #[test]
    fn passphrase_and_ssid_are_kept_verbatim() {
        let content = VALID
            .replace("password = supersecret", r"password = ab\cd\nef")
            .replace("ssid = pi-ap", "ssid = \"quoted pass\"");
        let cfg = Config::parse(&content).unwrap();

        assert_eq!(cfg.hotspot.password, r"ab\cd\nef");
        assert_eq!(cfg.hotspot.ssid, "\"quoted pass\"");
    }

    #[test]
    fn comment_characters_inside_values_survive() {
        let content = VALID.replace("password = supersecret", "password = abc#123;xyz");
        let cfg = Config::parse(&content).unwrap();
        assert_eq!(cfg.hotspot.password, "abc#123;xyz");
    }

    #[test]
    fn loading_from_file_keeps_quotes_and_backslashes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pihotspot.conf");
        std::fs::write(&path, VALID.replace("password = supersecret", r#"password = "a\b""#))
            .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.hotspot.password, r#""a\b""#);
    }

    #[test]
    fn missing_section_is_reported() {
        let content = VALID.replace("[proxy]", "[other]");
        assert!(matches!(error_of(&content), HotspotError::MissingSection(s) if s == "proxy"));
    }

    #[test]
    fn missing_key_names_section_and_key() {
        let content = VALID.replace("ssid = pi-ap\n", "");
        match error_of(&content) {
            HotspotError::MissingKey { section, key } => {
                assert_eq!(section, "hotspot");
                assert_eq!(key, "ssid");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_out_of_range_prefix() {
        let content = VALID.replace("prefix = 24", "prefix = 33");
        assert!(matches!(error_of(&content), HotspotError::InvalidValue { key, .. } if key == "prefix"));
    }

    #[test]
    fn rejects_bad_port() {
        let content = VALID.replace("port = 3128", "port = proxy");
        assert!(matches!(error_of(&content), HotspotError::InvalidValue { key, .. } if key == "port"));
    }

    #[test]
    fn rejects_empty_domain_list() {
        let content = VALID.replace("*.example.com, .debian.org", " , ");
        assert!(matches!(
            error_of(&content),
            HotspotError::InvalidValue { key, .. } if key == "alloweddomains"
        ));
    }

    #[test]
    fn json_output_masks_password() {
        let cfg = Config::parse(VALID).unwrap();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("supersecret"));
        assert!(json.contains("\"password\":\"***********\""));
    }
}
