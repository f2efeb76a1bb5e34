//! A fake game loop driving a `NetClient` at roughly 60 ticks per second.
//!
//! Start the echo server first:
//!   cargo run --example echo-server -- 127.0.0.1:7000
//!
//! Then:
//!   cargo run --example tick-client -- 127.0.0.1 7000

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tickwire::client::{ClientConfig, ConnectionEvent, NetClient};

const FRAME_TIME: Duration = Duration::from_millis(16);
const CHAT: u16 = 300;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = args.next().unwrap_or_else(|| "7000".to_string()).parse()?;

    let client = NetClient::init(ClientConfig::default().with_per_tick_limit(3));

    let lost = Arc::new(AtomicBool::new(false));
    let lost_flag = lost.clone();
    client.on(ConnectionEvent::Connected, || eprintln!("connected"));
    client.on(ConnectionEvent::Reconnected, move || {
        eprintln!("connection lost");
        lost_flag.store(true, Ordering::SeqCst);
    });
    client.on(ConnectionEvent::Closed, || eprintln!("closed"));

    client.set_message_handler(|message| {
        let text = std::str::from_utf8(&message.data)?;
        println!("[{}] {text}", message.protocol_id);
        Ok(())
    });

    client.connect(&host, port)?;
    for n in 0..10 {
        client.send(CHAT, format!("hello #{n}").as_bytes())?;
    }

    let started = Instant::now();
    let mut last = started;
    while started.elapsed() < Duration::from_secs(3) && !lost.load(Ordering::SeqCst) {
        let now = Instant::now();
        let report = client.tick(now - last);
        last = now;
        if report.delivered > 0 {
            eprintln!("tick delivered {} message(s)", report.delivered);
        }
        thread::sleep(FRAME_TIME);
    }

    client.shutdown();
    Ok(())
}
