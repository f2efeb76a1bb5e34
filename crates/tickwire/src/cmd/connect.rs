use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tickwire_client::{ClientConfig, ConnectionEvent, NetClient};

use crate::cmd::{parse_duration, ConnectArgs};
use crate::exit::{client_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ClientConfig::default()
        .with_connect_timeout(parse_duration(&args.timeout)?)
        .with_heartbeat_interval(parse_duration(&args.heartbeat)?)
        .with_per_tick_limit(args.per_tick);
    let tick = parse_duration(&args.tick)?;

    let client = NetClient::init(config);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let lost = Arc::new(AtomicBool::new(false));
    {
        let lost = lost.clone();
        client.on(ConnectionEvent::Reconnected, move || {
            lost.store(true, Ordering::SeqCst);
        });
    }

    let printed = Arc::new(AtomicUsize::new(0));
    {
        let printed = printed.clone();
        let peer = format!("{}:{}", args.host, args.port);
        let limit = args.count;
        client.set_message_handler(move |message| {
            if limit.is_some_and(|limit| printed.load(Ordering::SeqCst) >= limit) {
                return Ok(());
            }
            print_message(message.protocol_id, &message.data, &peer, format);
            printed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    client
        .connect(&args.host, args.port)
        .map_err(|err| client_error("connect failed", err))?;
    tracing::info!(host = %args.host, port = args.port, "connected; press Ctrl-C to exit");

    let mut last_tick = Instant::now();
    let outcome = loop {
        if !running.load(Ordering::SeqCst) {
            break Ok(SUCCESS);
        }

        let now = Instant::now();
        let report = client.tick(now - last_tick);
        last_tick = now;
        if report.faulted > 0 {
            tracing::warn!(faulted = report.faulted, "message handler faults this tick");
        }

        if let Some(count) = args.count {
            if printed.load(Ordering::SeqCst) >= count {
                break Ok(SUCCESS);
            }
        }

        if lost.load(Ordering::SeqCst) && client.pending() == 0 {
            break Err(CliError::new(FAILURE, "connection lost"));
        }

        thread::sleep(tick);
    };

    client.shutdown();
    outcome
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
