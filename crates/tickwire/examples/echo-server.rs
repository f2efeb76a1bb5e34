//! Minimal game server: accepts one client and echoes every non-heartbeat
//! frame back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1 <port> \
//!     --protocol 300 --json '{"hello":"world"}' --wait --wait-timeout 3s

use tickwire::frame::{is_ping, FrameReader, FrameWriter};
use tickwire::transport::NetListener;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:0".to_string());
    let listener = NetListener::bind(&addr)?;
    eprintln!("Listening on {}", listener.local_addr());

    let (stream, peer) = listener.accept()?;
    eprintln!("Client connected: {peer}");

    let mut writer = FrameWriter::new(stream.try_clone()?);
    let mut reader = FrameReader::new(stream);

    loop {
        match reader.read_frame() {
            Ok(frame) if is_ping(frame.protocol) => {
                eprintln!("Heartbeat ({} bytes)", frame.payload.len());
            }
            Ok(frame) => {
                eprintln!(
                    "Received {} bytes with protocol {}",
                    frame.payload.len(),
                    frame.protocol
                );
                writer.write_frame(&frame)?;
            }
            Err(e) => {
                eprintln!("Client disconnected: {e}");
                break;
            }
        }
    }

    Ok(())
}
