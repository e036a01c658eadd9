//! An asynchronous, thread-safe client for exchanging raw bytes with an instrument over a serial
//! link.
//!
//! A [`Client`] opens and configures the channel, then hands all I/O to a background thread. Any
//! thread may queue bytes to be written and take bytes that were received; neither ever waits on
//! the device. If the channel fails or is closed, the client quietly becomes inactive.
//!
//! ```no_run
//! use instrument_link::{Client, SerialConfig};
//!
//! let (client, result) = Client::open(SerialConfig::new("/dev/ttyUSB0").baud_rate(9600));
//! if let Err(e) = result {
//!     eprintln!("{}", e);
//! }
//!
//! client.write(b"*IDN?\n");
//! let response = client.read_all();
//! ```

mod config;
mod error;
mod queue;
pub mod serial;

pub use config::{FlowControl, Parity, SerialConfig, StopBits, DEFAULT_BAUD_RATE};
pub use error::{Error, OptionError};
pub use serial::{Channel, ChannelOption, Client, LinkState, OpenChannelFn};

use futures::channel::mpsc::{self, UnboundedSender};
use futures::StreamExt;
use log::{error, info, warn};
use tokio::io::AsyncReadExt;
use tokio::signal;
use tokio::task;
use tokio::time;

use std::time::Duration;

/// Runs an interactive terminal on the serial port described by `config`.
///
/// Lines read from stdin are parsed as hexadecimal bytes and written to the port, and bytes
/// received from the port are printed every `poll_interval`. Returns on ctrl-c, at the end of
/// stdin, or once the link becomes inactive.
pub async fn launch(config: SerialConfig, poll_interval: Duration) {
    info!("Serial port: {}", config.path);
    info!(
        "Settings: {} baud, flow control {:?}, parity {:?}, stop bits {:?}",
        config.baud_rate, config.flow_control, config.parity, config.stop_bits,
    );

    // Opening waits for the service thread, so keep it off the runtime's thread
    let opened = task::spawn_blocking(move || Client::open(config)).await;
    let client = match opened {
        Ok((client, result)) => {
            if let Err(e) = result {
                error!("{}", e);
            }
            client
        }
        Err(e) => {
            error!("Failed to open the serial port: {}", e);
            return;
        }
    };

    let (stdin_tx, mut stdin_rx) = mpsc::unbounded();
    tokio::spawn(read_stdin(stdin_tx));

    let mut poll = time::interval(poll_interval);

    while client.is_active() {
        tokio::select! {
            line = stdin_rx.next() => match line {
                Some(line) => client.write(&parse_input(&line)),
                None => break,
            },
            _ = poll.tick() => {
                let data = client.read_all();
                if !data.is_empty() {
                    println!("response: {}", format_hex(&data));
                }
            }
            res = signal::ctrl_c() => {
                if let Err(e) = res {
                    error!("Failed to wait for ctrl-c signal: {}", e);
                }
                break;
            }
        }
    }

    if !client.is_active() {
        warn!("The serial port {} is no longer active", client.path());
    }

    // Dropping the client joins its service thread
    if task::spawn_blocking(move || drop(client)).await.is_err() {
        error!("Failed to close the serial port");
    }

    info!("Shutting down");
}

/// Reads stdin and sends every complete line on `tx`.
async fn read_stdin(tx: UnboundedSender<String>) {
    let mut stdin = tokio::io::stdin();
    let mut input = Vec::new();
    let mut buf = vec![0; 1024];

    loop {
        let bytes = match stdin.read(&mut buf).await {
            Err(_) | Ok(0) => break,
            Ok(n) => n,
        };
        input.extend_from_slice(&buf[..bytes]);

        // Send every newline-terminated line and keep the incomplete rest for later
        while let Some(i) = input.iter().position(|&c| c == b'\n') {
            let line: Vec<u8> = input.drain(..=i).collect();
            if tx.unbounded_send(String::from_utf8_lossy(&line).into_owned()).is_err() {
                return;
            }
        }
    }
}

/// Parses a user input string into bytes, assuming it is a sequence of two digit hexadecimal
/// numbers. Whitespace and invalid parts of the input are discarded.
fn parse_input(s: &str) -> Vec<u8> {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<Vec<_>>()
        .chunks(2)
        .filter_map(|c| u8::from_str_radix(&c.iter().collect::<String>(), 16).ok())
        .collect()
}

/// Formats bytes as space-separated two digit hexadecimal numbers.
fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
