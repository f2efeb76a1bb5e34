mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "tickwire", version, about = "Game-client TCP transport CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "tickwire",
            "send",
            "127.0.0.1",
            "7000",
            "--protocol",
            "5",
            "--data",
            "hello",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.port, 7000);
                assert_eq!(args.protocol, 5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "tickwire",
            "send",
            "127.0.0.1",
            "7000",
            "--json",
            "{\"x\":1}",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_connect_subcommand() {
        let cli = Cli::try_parse_from([
            "tickwire",
            "connect",
            "localhost",
            "7000",
            "--per-tick",
            "8",
            "--count",
            "2",
        ])
        .expect("connect args should parse");

        match cli.command {
            Command::Connect(args) => {
                assert_eq!(args.per_tick, 8);
                assert_eq!(args.count, Some(2));
                assert_eq!(args.tick, "16ms");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_port() {
        let err = Cli::try_parse_from(["tickwire", "send", "127.0.0.1", "70000"])
            .expect_err("port should be rejected");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from(["tickwire", "serve", "127.0.0.1:0", "--no-echo"])
            .expect("serve args should parse");
        assert!(matches!(cli.command, Command::Serve(ref args) if args.no_echo));
    }
}
