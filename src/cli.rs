use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use recovery_bridge::session::StoreChange;
use recovery_bridge::transport::LoopbackTransport;
use recovery_bridge::types::{FileCategory, ScanConfig, ScanConfigBuilder, ScanType};
use recovery_bridge::{Bridge, BridgeConfig, SessionStatus};

use crate::demo;

#[derive(Parser, Debug)]
#[command(name = "recovery-bridge", version, about = "Drive the privileged recovery helper from the command line")]
pub struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Talk to a simulated in-process host instead of the helper
    #[arg(long, global = true)]
    pub demo: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List storage devices
    Devices {
        /// Ask the host to re-enumerate first
        #[arg(long)]
        refresh: bool,
    },
    /// Show (or request) raw-device privileges
    Privileges {
        #[arg(long)]
        request: bool,
    },
    /// Scan a device and print what is found
    Scan {
        #[arg(long)]
        device: String,
        #[arg(long)]
        partition: Option<String>,
        #[arg(long)]
        deep: bool,
        /// File categories (photos, videos, documents, audio, archives)
        #[arg(long = "category", value_parser = parse_category)]
        categories: Vec<FileCategory>,
        /// File extensions to look for
        #[arg(long = "type")]
        file_types: Vec<String>,
    },
}

fn parse_category(text: &str) -> Result<FileCategory, String> {
    serde_json::from_value(serde_json::Value::String(text.to_lowercase())).map_err(|e| e.to_string())
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = BridgeConfig::load(cli.config.as_deref()).context("loading configuration")?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();

    let bridge = if cli.demo {
        let host = Arc::new(LoopbackTransport::new());
        demo::install(&host);
        Bridge::with_transport(host, config)
    } else {
        Bridge::connect(config).context("starting host helper")?
    };

    match cli.command {
        Command::Devices { refresh } => list_devices(&bridge, refresh).await,
        Command::Privileges { request } => privileges(&bridge, request).await,
        Command::Scan {
            device,
            partition,
            deep,
            categories,
            file_types,
        } => {
            let mut builder = ScanConfig::builder(&device).scan_type(if deep { ScanType::Deep } else { ScanType::Quick });
            if let Some(partition) = partition {
                builder = builder.partition(partition);
            }
            for category in categories {
                builder = builder.category(category);
            }
            for file_type in file_types {
                builder = builder.file_type(file_type);
            }
            scan(&bridge, builder, &device).await
        }
    }
}

async fn list_devices(bridge: &Bridge, refresh: bool) -> anyhow::Result<()> {
    let devices = if refresh {
        bridge.gateway().refresh_devices().await?
    } else {
        bridge.gateway().list_devices().await?
    };

    for device in devices {
        println!(
            "{:<16} {:>16} bytes  {}{}",
            device.path,
            device.size,
            device.label,
            if device.removable { " (removable)" } else { "" }
        );
        for partition in device.partitions {
            println!("  {:<14} {:>16} bytes  @{}", partition.path, partition.size, partition.offset);
        }
    }
    Ok(())
}

async fn privileges(bridge: &Bridge, request: bool) -> anyhow::Result<()> {
    let status = if request {
        bridge.gateway().request_privileges().await?
    } else {
        bridge.gateway().check_privileges().await?
    };

    println!(
        "elevated: {}  platform: {}{}",
        status.elevated,
        status.platform,
        status.helper_pid.map(|pid| format!("  helper pid: {}", pid)).unwrap_or_default()
    );
    Ok(())
}

async fn scan(bridge: &Bridge, builder: ScanConfigBuilder, device_path: &str) -> anyhow::Result<()> {
    let devices = bridge.gateway().list_devices().await?;
    let Some(device) = devices.iter().find(|d| d.path == device_path) else {
        bail!("unknown device {}", device_path);
    };
    let config = builder.sized_from(device).build();

    let controller = bridge.scan_controller();
    let mut changes = controller.store().subscribe();
    controller.start(config).await?;
    info!("Scan session {:?} running", controller.store().session_id());

    let mut printed = 0;
    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(StoreChange::ItemsAppended { .. }) | Err(RecvError::Lagged(_)) => {
                    for file in controller.store().items_since(printed) {
                        println!("{:<8} {:<32} {:>12} bytes  @{}", file.id, file.name, file.size, file.offset);
                    }
                    printed = controller.store().item_count();
                }
                Ok(StoreChange::Progress) => {
                    let progress = controller.store().progress();
                    debug!("{:.1}% ({} of {} bytes)", progress.percent, progress.bytes_scanned, progress.total_bytes);
                }
                Ok(_) => {}
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, asking host to cancel");
                if let Err(e) = controller.cancel().await {
                    warn!("Cancel failed: {}", e);
                }
            }
        }

        if controller.status().is_terminal() {
            break;
        }
    }

    let snapshot = controller.store().snapshot();
    for file in snapshot.items.iter().skip(printed) {
        println!("{:<8} {:<32} {:>12} bytes  @{}", file.id, file.name, file.size, file.offset);
    }
    match snapshot.status {
        SessionStatus::Completed => {
            println!("Scan complete: {} file(s) found", snapshot.items.len());
            Ok(())
        }
        SessionStatus::Cancelled => {
            println!("Scan cancelled after {} file(s)", snapshot.items.len());
            Ok(())
        }
        status => bail!(
            "scan ended as {}: {}",
            status,
            snapshot.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}
