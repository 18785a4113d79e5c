use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env, Target};
use log::{error, info};
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use pi_hotspot::{
    Config, DbusNetworkManager, FailurePolicy, OutputPaths, ServiceManager, WaitPolicy,
    config::DEFAULT_CONFIG_PATH,
    provision::{self, ResidentOptions},
    render::{self, DNSMASQ_CONF_PATH, PROXY_CONF_PATH},
    wan,
};

#[derive(Parser)]
#[command(name = "pi-hotspot")]
#[command(about = "Provision a WiFi access point with DHCP and an allow-list proxy")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the WAN address, set up the hotspot, then stay resident
    Run {
        /// Seconds between WAN address lookups
        #[arg(long, default_value = "2")]
        retry_interval: u64,

        /// Give up waiting for the WAN address after this many seconds (default: wait forever)
        #[arg(long)]
        wan_timeout: Option<u64>,

        /// Stop at the first failed step instead of continuing
        #[arg(long)]
        fail_fast: bool,

        /// Where to write the dnsmasq configuration
        #[arg(long, default_value = DNSMASQ_CONF_PATH)]
        dnsmasq_conf: PathBuf,

        /// Where to write the 3proxy configuration
        #[arg(long, default_value = PROXY_CONF_PATH)]
        proxy_conf: PathBuf,

        /// Service manager used to restart dnsmasq and 3proxy
        #[arg(long, default_value = "systemctl")]
        systemctl: String,
    },

    /// Query the WAN interface address once
    WanIp,

    /// Render the dnsmasq and 3proxy files into a directory
    Render {
        /// WAN address the proxy should egress from
        #[arg(long)]
        wan_ip: Ipv4Addr,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Show the parsed configuration
    ShowConfig {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            retry_interval,
            wan_timeout,
            fail_fast,
            dnsmasq_conf,
            proxy_conf,
            systemctl,
        } => {
            let options = ResidentOptions {
                wait: WaitPolicy {
                    retry_interval: Duration::from_secs(retry_interval),
                    timeout: wan_timeout.map(Duration::from_secs),
                },
                policy: if fail_fast {
                    FailurePolicy::FailFast
                } else {
                    FailurePolicy::Continue
                },
                paths: OutputPaths {
                    dnsmasq: dnsmasq_conf,
                    proxy: proxy_conf,
                },
                services: ServiceManager::new(systemctl),
                ..ResidentOptions::default()
            };
            cmd_run(&cli.config, options).await
        }
        Commands::WanIp => cmd_wan_ip(&cli.config).await,
        Commands::Render { wan_ip, out_dir } => cmd_render(&cli.config, wan_ip, &out_dir),
        Commands::ShowConfig { json } => cmd_show_config(&cli.config, json),
    }
}

/// Logs to stdout as `<timestamp> --  <target>::<LEVEL> -- <message>`.
fn init_logging() {
    log_panics::init();

    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|f, record| {
            writeln!(
                f,
                "{} --  {}::{} -- {}",
                f.timestamp(),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .target(Target::Stdout)
        .init();
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).inspect_err(|e| {
        error!("Error while reading configurations file");
        error!("{:#}", e);
    })
}

/// Cancelled on SIGINT or SIGTERM.
fn shutdown_token() -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        info!("Shutdown signal received");
        trigger.cancel();
    });

    Ok(token)
}

async fn cmd_run(config_path: &Path, options: ResidentOptions) -> Result<()> {
    info!("pi-hotspot {} starting", env!("CARGO_PKG_VERSION"));
    info!("Using configuration file {}", config_path.display());

    let config = load_config(config_path)?;
    let cancel = shutdown_token()?;
    let nm = DbusNetworkManager::new();

    provision::run_resident(&nm, &config, options, &cancel).await
}

async fn cmd_wan_ip(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let nm = DbusNetworkManager::new();

    let ip = wan::fetch_wan_ip(&nm, &config.interface.wan).await?;
    println!("{}", ip);

    Ok(())
}

fn cmd_render(config_path: &Path, wan_ip: Ipv4Addr, out_dir: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let paths = OutputPaths::in_dir(out_dir);

    render::configure_dhcp(&config.hotspot, &paths.dnsmasq)?;
    render::configure_proxy(wan_ip, &config.proxy, &paths.proxy)?;

    println!("Saved to {}", paths.dnsmasq.display());
    println!("Saved to {}", paths.proxy.display());

    Ok(())
}

fn cmd_show_config(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;

    if json {
        let content =
            serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
        println!("{}", content);
    } else {
        config.display(config_path);
    }

    Ok(())
}
