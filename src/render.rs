//! Configuration files for the DHCP server (dnsmasq) and the allow-list proxy (3proxy).
//!
//! Both files are rendered from templates compiled into the binary and
//! written over whatever is at the target path.

use anyhow::{Context as _, Result};
use lazy_static::lazy_static;
use log::info;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

use crate::config::{HotspotConfig, ProxyConfig};
use crate::error::HotspotError;

pub const DNSMASQ_CONF_PATH: &str = "/etc/dnsmasq.conf";
pub const PROXY_CONF_PATH: &str = "/etc/3proxy/3proxy.cfg";

const DNSMASQ_TEMPLATE: &str = "dnsmasq.conf";
const PROXY_TEMPLATE: &str = "3proxy.cfg";

const DHCP_LEASE: &str = "1h";
const NAMESERVERS: [&str; 2] = ["8.8.8.8", "8.8.4.4"];

lazy_static! {
    pub static ref TEMPLATES: Tera = {
        let mut tera = Tera::default();
        if let Err(e) = tera.add_raw_templates(vec![
            (DNSMASQ_TEMPLATE, include_str!("../templates/dnsmasq.conf.tera")),
            (PROXY_TEMPLATE, include_str!("../templates/3proxy.cfg.tera")),
        ]) {
            eprintln!("Template parsing error: {}", e);
            std::process::exit(1);
        }
        tera.autoescape_on(vec![]);
        tera
    };
}

/// Where the rendered files are written.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub dnsmasq: PathBuf,
    pub proxy: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        OutputPaths {
            dnsmasq: PathBuf::from(DNSMASQ_CONF_PATH),
            proxy: PathBuf::from(PROXY_CONF_PATH),
        }
    }
}

impl OutputPaths {
    /// Both files placed in `dir` under their usual file names.
    pub fn in_dir(dir: &Path) -> Self {
        OutputPaths {
            dnsmasq: dir.join("dnsmasq.conf"),
            proxy: dir.join("3proxy.cfg"),
        }
    }
}

/// Renders the dnsmasq configuration for the hotspot's DHCP range.
pub fn render_dhcp_config(hotspot: &HotspotConfig) -> Result<String> {
    let mut context = Context::new();
    context.insert("dhcp_start", &hotspot.dhcp_start.to_string());
    context.insert("dhcp_end", &hotspot.dhcp_end.to_string());
    context.insert("lease", DHCP_LEASE);

    TEMPLATES
        .render(DNSMASQ_TEMPLATE, &context)
        .map_err(|e| HotspotError::Render(DNSMASQ_TEMPLATE.to_string(), e.to_string()).into())
}

/// Renders the 3proxy configuration.
///
/// Requests to the allowed domains are permitted and everything else is
/// denied; outgoing traffic leaves from `wan_ip`.
pub fn render_proxy_config(wan_ip: Ipv4Addr, proxy: &ProxyConfig) -> Result<String> {
    let mut context = Context::new();
    context.insert("wan_ip", &wan_ip.to_string());
    context.insert("port", &proxy.port);
    context.insert("allowed_domains", &proxy.allowed_domains);
    context.insert("nameservers", &NAMESERVERS);

    TEMPLATES
        .render(PROXY_TEMPLATE, &context)
        .map_err(|e| HotspotError::Render(PROXY_TEMPLATE.to_string(), e.to_string()).into())
}

/// Writes `content` to `path`, replacing any existing file.
pub fn write_config(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Renders and writes the dnsmasq configuration.
pub fn configure_dhcp(hotspot: &HotspotConfig, path: &Path) -> Result<()> {
    let content = render_dhcp_config(hotspot)?;
    write_config(path, &content)
}

/// Renders and writes the 3proxy configuration.
pub fn configure_proxy(wan_ip: Ipv4Addr, proxy: &ProxyConfig, path: &Path) -> Result<()> {
    let content = render_proxy_config(wan_ip, proxy)?;
    write_config(path, &content)
}
