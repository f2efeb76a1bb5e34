use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod connect;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a game server and print messages as the pump delivers them.
    Connect(ConnectArgs),
    /// Send a single frame.
    Send(SendArgs),
    /// Run a development server that prints and echoes frames.
    Serve(ServeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Connect(args) => connect::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Serve(args) => serve::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Connect timeout (e.g. 5s, 500ms).
    #[arg(long, env = "TICKWIRE_TIMEOUT", default_value = "5s")]
    pub timeout: String,
    /// Heartbeat interval (e.g. 1s, 250ms).
    #[arg(long, env = "TICKWIRE_HEARTBEAT", default_value = "1s")]
    pub heartbeat: String,
    /// Messages delivered per tick.
    #[arg(long, env = "TICKWIRE_PER_TICK", default_value = "3")]
    pub per_tick: usize,
    /// Interval between pump ticks.
    #[arg(long, default_value = "16ms")]
    pub tick: String,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Protocol type to send under.
    #[arg(long, short = 'p', default_value = "1")]
    pub protocol: u16,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Connect timeout (e.g. 5s, 500ms).
    #[arg(long, env = "TICKWIRE_TIMEOUT", default_value = "5s")]
    pub timeout: String,
    /// Wait for one inbound message and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a message when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (e.g. 127.0.0.1:7000).
    pub addr: String,
    /// Print frames without echoing them back.
    #[arg(long)]
    pub no_echo: bool,
    /// Exit after receiving N non-heartbeat frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration(" 3 ").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("bad").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
