// CLI entry point for the whiteboard relay.
//
// Starts a standalone relay that whiteboard clients connect to. The relay
// partitions clients into rooms and rebroadcasts their edits; it never
// renders anything. See `server.rs` for the networking architecture and
// `rooms.rs` for the room state.
//
// Usage:
//   relay [OPTIONS]
//     --config <PATH>            JSON config file (flags below override it)
//     --host <HOST>              Listen host (default: 127.0.0.1)
//     --port <PORT>              Listen port (default: 7878)
//     --poll-interval-ms <MS>    Event loop tick (default: 100)
//     --outbound-queue <N>       Batches queued per slow client (default: 256)
//     --history-file <PATH>      Records to preload into the default room
//     --log-level <LEVEL>        Default log level when RUST_LOG is unset
//
// There is no in-band shutdown; the relay runs until the process is killed.

use std::path::PathBuf;

use clap::Parser;
use scribble_relay::server::{RelayConfig, start_relay};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "relay", about = "Shared-whiteboard relay server", version)]
struct Cli {
    /// JSON config file; command-line flags take precedence over it.
    #[arg(long, value_name = "PATH", env = "SCRIBBLE_RELAY_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    /// Listen port (0 picks a free one).
    #[arg(long)]
    port: Option<u16>,

    #[arg(long, value_name = "MS")]
    poll_interval_ms: Option<u64>,

    /// Batches queued for a slow client before it is disconnected.
    #[arg(long = "outbound-queue", value_name = "N")]
    outbound_queue_batches: Option<usize>,

    /// Newline-separated records to preload into the default room.
    #[arg(long, value_name = "PATH")]
    history_file: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let (_handle, addr) = match start_relay(config) {
        Ok(result) => result,
        Err(e) => {
            error!("failed to start relay: {e}");
            std::process::exit(1);
        }
    };
    info!("relay ready on {addr}; press Ctrl+C to stop");

    // The relay runs on its own thread; the process exits on SIGINT/SIGTERM.
    loop {
        std::thread::park();
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("scribble_relay={level},scribble_protocol={level}"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Defaults, then the config file, then individual flags.
fn build_config(cli: &Cli) -> scribble_relay::Result<RelayConfig> {
    let mut config = match &cli.config {
        Some(path) => RelayConfig::from_json_file(path)?,
        None => RelayConfig::default(),
    };
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ms) = cli.poll_interval_ms {
        config.poll_interval_ms = ms;
    }
    if let Some(batches) = cli.outbound_queue_batches {
        config.outbound_queue_batches = batches;
    }
    if let Some(path) = &cli.history_file {
        config.history_file = Some(path.clone());
    }
    Ok(config)
}
