//! See `lib.rs` for documentation.

use clap::Parser;
use instrument_link::SerialConfig;

use std::time::Duration;

/// Exchanges hexadecimal bytes with an instrument on a serial port.
#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    serial: SerialConfig,

    /// How often received bytes are printed, in milliseconds
    #[arg(long, default_value_t = 50)]
    poll_ms: u64,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    instrument_link::launch(cli.serial, Duration::from_millis(cli.poll_ms)).await;
}
