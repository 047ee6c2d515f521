//! fOS Timezone Guard
//!
//! Command-line entry point: loads the proxy configuration and shared
//! state, then runs one of the timezone subsystem's operations.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use fos_network::{HttpClient, HttpClientConfig};
use fos_proxy::{pac_script, ConnectivitySupervisor, ProxyConfig};
use fos_timezone::bridge::effective_zone;
use fos_timezone::script::default_page_script;
use fos_timezone::{
    DetectionMode, GateState, PageHost, PageRegistry, PageRenderGate, SharedState, SpoofState,
    TabSlot, TimezoneDetector,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use url::Url;

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Where blocked pages are sent while detection is pending
const INTERSTITIAL_URL: &str = "fos://tzguard/interstitial.html";

/// fos-tzguard - keep page time consistent with the proxy exit
#[derive(Parser, Debug)]
#[command(name = "fos-tzguard")]
#[command(version, about, long_about = None)]
struct Args {
    /// Proxy configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shared state file (JSON)
    #[arg(long)]
    state: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one detection cycle and print the zone
    Detect {
        /// Keep the stored zone while detecting
        #[arg(long)]
        keep_previous: bool,
    },
    /// Check connectivity with durable backoff and detect once reachable
    Supervise,
    /// Print the render decision for a page URL
    Gate {
        /// Page URL about to load
        url: String,
    },
    /// Print the PAC script for the configured proxy
    Pac,
    /// Print the page payload for the current zone
    Script,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(args.config.as_ref())?;
    config.validate().context("invalid proxy configuration")?;

    let state_path = match args.state {
        Some(path) => path,
        None => SharedState::default_path()?,
    };
    let state = Arc::new(
        SharedState::open(&state_path)
            .with_context(|| format!("failed to open state at {}", state_path.display()))?,
    );
    state.set_settings(config.settings())?;
    debug!("State at {}", state_path.display());

    match args.command {
        Command::Detect { keep_previous } => {
            let mode = if keep_previous {
                DetectionMode::KeepPrevious
            } else {
                DetectionMode::Invalidate
            };
            let detector = build_detector(&config, state).await?;
            let result = detector.detect(mode).await?;
            println!("{} ({})", result.timezone_id, result.source_provider_id);
        }
        Command::Supervise => supervise(&config, state).await?,
        Command::Gate { url } => gate(&state, &url)?,
        Command::Pac => {
            let endpoint = config
                .endpoint()?
                .ok_or_else(|| anyhow!("proxy is disabled in the configuration"))?;
            print!("{}", pac_script(&endpoint, &config.whitelist()));
        }
        Command::Script => {
            println!("{}", default_page_script(effective_zone(&state).as_deref()));
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<ProxyConfig> {
    if let Some(path) = path {
        return Ok(ProxyConfig::from_toml_file(path)?);
    }

    let default = dirs::config_dir().map(|dir| dir.join("fos-wb").join("proxy.toml"));
    match default {
        Some(path) if path.exists() => {
            info!("Using {}", path.display());
            Ok(ProxyConfig::from_toml_file(&path)?)
        }
        _ => Ok(ProxyConfig::default()),
    }
}

/// HTTP client routed through the configured SOCKS5 proxy
async fn http_client(config: &ProxyConfig) -> Result<HttpClient> {
    let Some(endpoint) = config.endpoint()? else {
        return Ok(HttpClient::with_defaults());
    };

    let addr = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .with_context(|| format!("failed to resolve proxy {}", endpoint))?
        .next()
        .ok_or_else(|| anyhow!("proxy {} has no address", endpoint))?;

    info!("Routing lookups through SOCKS5 {}", addr);
    Ok(HttpClient::new(HttpClientConfig::via_socks(addr)))
}

async fn build_detector(config: &ProxyConfig, state: Arc<SharedState>) -> Result<TimezoneDetector<HttpClient>> {
    let client = http_client(config).await?;
    Ok(TimezoneDetector::new(client, state, Arc::new(PageRegistry::new())))
}

async fn supervise(config: &ProxyConfig, state: Arc<SharedState>) -> Result<()> {
    let client = Arc::new(http_client(config).await?);
    let detector = Arc::new(build_detector(config, Arc::clone(&state)).await?);
    let supervisor = ConnectivitySupervisor::new(client, state, detector);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            let _ = stop_tx.send(true);
        }
    });

    supervisor.run(stop_rx).await?;
    Ok(())
}

/// Host that reports gate effects on stdout
struct PrintHost;

impl PageHost for PrintHost {
    fn hide(&mut self) {
        debug!("hide document");
    }
    fn unhide(&mut self) {
        debug!("unhide document");
    }
    fn replace_url(&mut self, url: &str) {
        println!("replace url: {}", url);
    }
    fn stop(&mut self) {
        debug!("stop loading");
    }
    fn redirect(&mut self, url: &str) {
        println!("redirect: {}", url);
    }
}

fn gate(state: &SharedState, url: &str) -> Result<()> {
    let base = Url::parse(INTERSTITIAL_URL)?;
    let gate = PageRenderGate::from_state(state, base);

    let spoof = SpoofState::new();
    match gate.evaluate(url, &mut TabSlot::default(), &mut PrintHost, &spoof) {
        GateState::ShowImmediate(reason) => println!("show ({:?})", reason),
        GateState::ShowSpoofed { zone } => println!("show spoofed as {}", zone),
        GateState::Blocked { .. } => println!("blocked until a timezone is detected"),
    }
    Ok(())
}
