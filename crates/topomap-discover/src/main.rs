//! CLI entry point for the topomap topology scanner.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use topomap_discover::config::{parse_ports, DiscoverConfig};
use topomap_discover::run::{run_discovery, OutputTarget, RunRequest};

#[derive(Parser)]
#[command(name = "topomap")]
#[command(about = "Discover infrastructure topology and write it as a Graphviz graph")]
struct Cli {
    /// Seed nodes from the cloud inventory (running instances and load balancers).
    #[arg(long)]
    cloud: bool,

    /// Seed nodes from a host list file.
    #[arg(long, value_name = "FILE")]
    hosts: Option<PathBuf>,

    /// Probe each host's ARP cache.
    #[arg(long)]
    arp: bool,

    /// Probe each host's login history.
    #[arg(long)]
    logins: bool,

    /// Probe each host's established TCP connections.
    #[arg(long)]
    connections: bool,

    /// Service ports kept by --connections, comma separated.
    #[arg(long, value_name = "PORTS")]
    ports: Option<String>,

    /// Graph output file, or `-` for stdout.
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Render the graph to this image file (needs -o <file>).
    #[arg(long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// Layout engine for --image.
    #[arg(long)]
    layout: Option<String>,

    /// Add placeholder nodes for addresses no scanner claimed.
    #[arg(long)]
    include_unknown: bool,

    /// Keep service labels on edges.
    #[arg(long)]
    labels: bool,

    /// Maximum concurrent host probes.
    #[arg(long)]
    concurrency: Option<usize>,

    /// SSH login user for hosts that do not name one.
    #[arg(long)]
    ssh_user: Option<String>,

    /// Cloud region.
    #[arg(long)]
    region: Option<String>,

    /// Config file prefix (default: topomap).
    #[arg(short, long, default_value = "topomap")]
    config: String,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout may carry the graph.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    let mut config = load_discover_config(&cli.config)?;
    apply_overrides(&cli, &mut config)?;
    if config.concurrency == 0 {
        anyhow::bail!("--concurrency must be at least 1");
    }

    let request = RunRequest {
        cloud: cli.cloud,
        hosts: cli.hosts.clone(),
        arp: cli.arp,
        logins: cli.logins,
        connections: cli.connections,
        output: OutputTarget::parse(&cli.output),
        image: cli.image.clone(),
    };
    request.validate()?;

    run_discovery(&config, &request).await?;
    Ok(())
}

/// CLI flags win over file and environment settings.
fn apply_overrides(cli: &Cli, config: &mut DiscoverConfig) -> anyhow::Result<()> {
    if let Some(n) = cli.concurrency {
        config.concurrency = n;
    }
    if cli.include_unknown {
        config.include_unknown = true;
    }
    if cli.labels {
        config.show_labels = true;
    }
    if let Some(user) = &cli.ssh_user {
        config.ssh.user = Some(user.clone());
    }
    if let Some(region) = &cli.region {
        config.cloud.region = Some(region.clone());
    }
    if let Some(layout) = &cli.layout {
        config.render.layout = layout.clone();
    }
    if let Some(ports) = &cli.ports {
        config.connections.ports = parse_ports(ports)?;
    }
    Ok(())
}

fn load_discover_config(file_prefix: &str) -> anyhow::Result<DiscoverConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("TOPOMAP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<DiscoverConfig>("discover") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
        Err(e) => Err(e.into()),
    }
}
