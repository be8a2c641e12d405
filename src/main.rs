use clap::{Parser, Subcommand};
use pgw::capture::{AfPacketSocket, SocketMode};
use pgw::config;
use pgw::dataplane::{Gateway, GatewaySettings, Transmit};
use pgw::protocol::icmpv6::LinkAddr;
use pgw::protocol::{Eui64, LinkLayer, MacAddr};
use pgw::telemetry::{init_logging, MetricsRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "pgw")]
#[command(about = "6LoWPAN-ND proxy gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the gateway daemon
    Run {
        /// Path to config.lock file
        #[arg(short, long, default_value = "config.lock")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate config.lock from config.toml
    Generate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Output path for config.lock
        #[arg(short, long, default_value = "config.lock")]
        output: PathBuf,
    },
    /// Validate config.toml without generating lock file
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    // RUST_LOG takes priority; `run` reinstalls with the lock file's settings
    init_logging(None);

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Config { action }) => match action {
            ConfigAction::Generate {
                config: config_path,
                output,
            } => cmd_config_generate(&config_path, &output),
            ConfigAction::Validate {
                config: config_path,
            } => cmd_config_validate(&config_path),
        },
        Some(Commands::Run { config: lock_path }) => cmd_run(&lock_path),
        None => cmd_run(&PathBuf::from("config.lock")),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(lock_path: &PathBuf) -> Result<(), String> {
    use tokio::runtime::Runtime;

    info!("Loading {}...", lock_path.display());

    let lock = config::load_lock(lock_path).map_err(|e| format!("Failed to load lock file: {}", e))?;
    init_logging(Some(&lock.logging));

    let ethernet_mac: MacAddr = resolve_link_addr(&lock.interfaces.ethernet_mac, &lock.interfaces.ethernet)?;
    let mesh_eui64: Eui64 = resolve_link_addr(&lock.interfaces.mesh_eui64, &lock.interfaces.mesh)?;

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let metrics = Arc::new(MetricsRegistry::new());
        let settings = GatewaySettings::from_lock(&lock, ethernet_mac, mesh_eui64);

        info!("Binding to {} and {}...", settings.mesh_interface, settings.ethernet_interface);
        let mut mesh = bind(&settings.mesh_interface, LinkLayer::Lowpan)?;
        let mut ethernet = bind(&settings.ethernet_interface, LinkLayer::Ethernet)?;

        let mut gateway = Gateway::new(settings, metrics.clone());
        let mut maintenance = tokio::time::interval(gateway.periodic_interval());

        info!("Gateway started, processing packets...");

        let mut mesh_buf = vec![0u8; 2048];
        let mut eth_buf = vec![0u8; 2048];

        loop {
            tokio::select! {
                _ = maintenance.tick() => {
                    let out = gateway.run_periodic(Instant::now());
                    send_all(out, &mut mesh, &mut ethernet, &metrics).await;
                }
                result = mesh.recv(&mut mesh_buf) => {
                    match result {
                        Ok(rx) if rx.outgoing => {}
                        Ok(rx) => {
                            let mesh_name = gateway.settings().mesh_interface.clone();
                            let out = gateway.process_packet(&mesh_name, &mesh_buf[..rx.len], Instant::now());
                            send_all(out, &mut mesh, &mut ethernet, &metrics).await;
                        }
                        Err(e) => error!("Receive error on mesh: {}", e),
                    }
                }
                result = ethernet.recv(&mut eth_buf) => {
                    match result {
                        Ok(rx) if rx.outgoing => {}
                        Ok(rx) => {
                            let eth_name = gateway.settings().ethernet_interface.clone();
                            let out = gateway.process_packet(&eth_name, &eth_buf[..rx.len], Instant::now());
                            send_all(out, &mut mesh, &mut ethernet, &metrics).await;
                        }
                        Err(e) => error!("Receive error on ethernet: {}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    for (name, value) in metrics.export() {
                        info!(metric = %name, value, "final counter");
                    }
                    return Ok(());
                }
            }
        }
    })
}

fn bind(name: &str, link: LinkLayer) -> Result<AfPacketSocket, String> {
    AfPacketSocket::bind(name, SocketMode::from(link))
        .map_err(|e| format!("Failed to bind to {}: {}. Run with root privileges.", name, e))
}

async fn send_all(
    out: Vec<Transmit>,
    mesh: &mut AfPacketSocket,
    ethernet: &mut AfPacketSocket,
    metrics: &MetricsRegistry,
) {
    for tx in out {
        // only mesh frames carry a separate link-layer destination
        let socket = if tx.link_dst.is_some() {
            &mut *mesh
        } else {
            &mut *ethernet
        };
        let link_dst = tx.link_dst.map(|addr| match addr {
            LinkAddr::Eui64(eui) => eui.0.to_vec(),
            LinkAddr::Mac(mac) => mac.0.to_vec(),
        });

        match socket.send(&tx.data, link_dst.as_deref()).await {
            Ok(len) => metrics.record_tx(&tx.interface, len),
            Err(e) => {
                warn!("Failed to send on {}: {}", tx.interface, e);
                metrics.record_tx_error(&tx.interface);
            }
        }
    }
}

/// Parse a link address from the lock file; "auto" reads it from sysfs
fn resolve_link_addr<T: std::str::FromStr>(value: &str, ifname: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    if value != "auto" {
        return value
            .parse()
            .map_err(|e| format!("Invalid link address for {}: {}", ifname, e));
    }

    let path = format!("/sys/class/net/{}/address", ifname);
    let content = std::fs::read_to_string(&path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
    debug!(ifname, address = content.trim(), "link address from sysfs");
    content
        .trim()
        .parse()
        .map_err(|e| format!("Invalid link address in {}: {}", path, e))
}

fn cmd_config_generate(config_path: &PathBuf, output_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Loading {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }

    let source = config_path.display().to_string();
    let lock = config::generate_lock(&cfg, &source);

    let lock_toml =
        toml::to_string_pretty(&lock).map_err(|e| format!("Failed to serialize lock: {}", e))?;

    let output = format!(
        "# Generated by pgw - DO NOT EDIT\n# Source: {} ({})\n\n{}",
        source, lock.generated_at, lock_toml
    );

    std::fs::write(output_path, output).map_err(|e| format!("Failed to write lock file: {}", e))?;

    println!("[INFO] Generated {}", output_path.display());
    Ok(())
}

fn cmd_config_validate(config_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}
