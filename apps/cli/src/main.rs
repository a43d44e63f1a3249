use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use v2g_core::controller::SimEvController;
use v2g_core::protocol::types::{EnergyTransferMode, Protocol, ServiceV20};
use v2g_core::{SessionConfig, run_loopback};

#[derive(Parser, Debug)]
#[command(author, version, about = "ISO 15118 SECC loopback session runner", long_about = None)]
struct Args {
    /// Session configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the default configuration to this path and exit
    #[arg(long)]
    init_config: Option<PathBuf>,

    /// Protocol the simulated EV offers: ISO_15118_2, ISO_15118_20_AC or ISO_15118_20_DC
    #[arg(short, long, default_value = "ISO_15118_2")]
    protocol: String,

    /// Charge with DC instead of AC
    #[arg(long)]
    dc: bool,

    /// Ask for a bidirectional (BPT) service on ISO 15118-20
    #[arg(long)]
    bpt: bool,

    /// Charge loop cycles before the EV stops
    #[arg(long, default_value_t = 10)]
    cycles: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn simulated_ev(args: &Args, dc: bool, config: &SessionConfig) -> SimEvController {
    let (mode, service) = match (dc, args.bpt) {
        (false, false) => (EnergyTransferMode::AcThreePhaseCore, ServiceV20::Ac),
        (false, true) => (EnergyTransferMode::AcThreePhaseCore, ServiceV20::AcBpt),
        (true, false) => (EnergyTransferMode::DcExtended, ServiceV20::Dc),
        (true, true) => (EnergyTransferMode::DcExtended, ServiceV20::DcBpt),
    };
    SimEvController::new(mode, service)
        .with_max_cycles(args.cycles)
        .with_departure_time(config.ev_departure_time)
}

async fn run(args: Args) -> Result<bool> {
    if let Some(path) = &args.init_config {
        SessionConfig::default()
            .save_to_file(path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "Default configuration written");
        return Ok(true);
    }

    let config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };
    let Some(protocol) = Protocol::from_name(&args.protocol.trim().to_ascii_uppercase()) else {
        bail!("unknown protocol {}", args.protocol);
    };
    // -20 carries AC and DC in separate namespaces.
    let dc = match protocol {
        Protocol::Iso15118_20Ac => false,
        Protocol::Iso15118_20Dc => true,
        _ => args.dc,
    };
    if args.dc && !dc {
        warn!(protocol = %protocol, "Ignoring --dc for an AC protocol");
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping session");
            let _ = stop_tx.send(true);
        }
    });

    info!(protocol = %protocol, evse_id = %config.evse_id, "Starting loopback session");
    let ev = simulated_ev(&args, dc, &config);
    let stop = run_loopback(&config, protocol, ev, stop_rx).await?;
    if stop.successful {
        info!(reason = %stop.reason, "Session finished");
    } else {
        warn!(reason = %stop.reason, "Session ended unsuccessfully");
    }
    Ok(stop.successful)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Cannot install logger: {e}");
    }

    match run(args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
