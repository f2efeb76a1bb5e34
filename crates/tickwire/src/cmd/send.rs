use std::fs;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use tickwire_client::{ClientConfig, Message, NetClient};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{client_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_message, OutputFormat};

const WAIT_POLL: Duration = Duration::from_millis(10);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let connect_timeout = parse_duration(&args.timeout)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let client = NetClient::init(ClientConfig::default().with_connect_timeout(connect_timeout));
    let (tx, rx) = mpsc::channel();
    if args.wait {
        client.set_message_handler(move |message| {
            let _ = tx.send(message.clone());
            Ok(())
        });
    }

    client
        .connect(&args.host, args.port)
        .map_err(|err| client_error("connect failed", err))?;

    let outcome = client
        .send(args.protocol, &payload)
        .map_err(|err| client_error("send failed", err))
        .and_then(|()| {
            if !args.wait {
                return Ok(SUCCESS);
            }
            let message = wait_for_message(&client, &rx, wait_timeout)?;
            let peer = format!("{}:{}", args.host, args.port);
            print_message(message.protocol_id, &message.data, &peer, format);
            Ok(SUCCESS)
        });

    client.shutdown();
    outcome
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

/// Tick the pump until the handler forwards a message or `timeout` passes.
fn wait_for_message(
    client: &NetClient,
    delivered: &Receiver<Message>,
    timeout: Duration,
) -> CliResult<Message> {
    let deadline = Instant::now() + timeout;
    loop {
        client.tick(WAIT_POLL);
        if let Ok(message) = delivered.try_recv() {
            return Ok(message);
        }
        if !client.state().is_connected() && client.pending() == 0 {
            return Err(CliError::new(
                FAILURE,
                format!("connection {} before a message arrived", client.state()),
            ));
        }
        if Instant::now() >= deadline {
            return Err(CliError::new(
                TIMEOUT,
                format!("no message received within {timeout:?}"),
            ));
        }
        thread::sleep(WAIT_POLL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(json: Option<&str>, data: Option<&str>) -> SendArgs {
        SendArgs {
            host: "127.0.0.1".into(),
            port: 7000,
            protocol: 1,
            json: json.map(str::to_string),
            data: data.map(str::to_string),
            file: None,
            timeout: "5s".into(),
            wait: false,
            wait_timeout: "5s".into(),
        }
    }

    fn forwarding_client() -> (NetClient, Receiver<Message>) {
        let client = NetClient::init(ClientConfig::default());
        let (tx, rx) = mpsc::channel();
        client.set_message_handler(move |message| {
            let _ = tx.send(message.clone());
            Ok(())
        });
        (client, rx)
    }

    #[test]
    fn payload_sources() {
        assert_eq!(resolve_payload(&args(None, Some("hi"))).unwrap(), b"hi");
        assert_eq!(
            resolve_payload(&args(Some("{\"a\":1}"), None)).unwrap(),
            b"{\"a\":1}"
        );
        assert!(resolve_payload(&args(None, None)).unwrap().is_empty());
        assert_eq!(
            resolve_payload(&args(Some("{not json"), None))
                .unwrap_err()
                .code,
            USAGE
        );
    }

    #[test]
    fn wait_returns_already_queued_message() {
        let (client, rx) = forwarding_client();
        client
            .connection()
            .inbox()
            .enqueue(Message::new(3, b"late".to_vec()))
            .expect("enqueue");

        let message = wait_for_message(&client, &rx, Duration::from_secs(1)).expect("message");
        assert_eq!(message, Message::new(3, b"late".to_vec()));
    }

    #[test]
    fn wait_fails_fast_without_connection() {
        let (client, rx) = forwarding_client();
        let err = wait_for_message(&client, &rx, Duration::from_secs(5)).unwrap_err();
        assert_eq!(err.code, FAILURE);
    }
}
