use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tickwire_frame::{is_ping, protocol_name, FrameError, FrameReader, FrameWriter};
use tickwire_transport::{NetListener, NetStream};

use crate::cmd::ServeArgs;
use crate::exit::{frame_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

/// Why a client session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Disconnected,
    CountReached,
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        NetListener::bind(&args.addr).map_err(|err| transport_error("bind failed", err))?;
    tracing::info!(addr = %listener.local_addr(), echo = !args.no_echo, "serving");

    let stop = Arc::new(StopSignal::new(listener.local_addr()));
    install_ctrlc_handler(Arc::clone(&stop))?;

    let mut received = 0usize;
    while stop.is_running() {
        let (stream, peer) = listener
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        if !stop.is_running() {
            break;
        }
        tracing::info!(%peer, "client connected");

        let handle = stream
            .try_clone()
            .map_err(|err| transport_error("clone failed", err))?;
        stop.track(handle);
        let end = serve_client(stream, peer, &args, format, &mut received);
        stop.untrack();

        match end? {
            SessionEnd::CountReached => return Ok(SUCCESS),
            SessionEnd::Disconnected if !stop.is_running() => {
                tracing::info!(%peer, "session interrupted by shutdown");
            }
            SessionEnd::Disconnected => tracing::info!(%peer, "client disconnected"),
        }
    }

    tracing::info!(received, "server stopped");
    Ok(SUCCESS)
}

/// Ctrl-C state shared between the accept loop and the signal handler.
struct StopSignal {
    running: AtomicBool,
    wake: SocketAddr,
    session: Mutex<Option<NetStream>>,
}

impl StopSignal {
    fn new(listen: SocketAddr) -> Self {
        let ip = match listen.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        Self {
            running: AtomicBool::new(true),
            wake: SocketAddr::new(ip, listen.port()),
            session: Mutex::new(None),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Remember the live client socket so a stop can end its blocking read.
    fn track(&self, stream: NetStream) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_running() {
            *session = Some(stream);
        } else {
            stream.shutdown();
        }
    }

    fn untrack(&self) {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Clear the running flag, end the live session and wake `accept`.
    fn trigger(&self) {
        self.running.store(false, Ordering::SeqCst);
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stream) = session {
            stream.shutdown();
        }
        if let Err(err) = TcpStream::connect_timeout(&self.wake, Duration::from_millis(500)) {
            tracing::debug!(addr = %self.wake, error = %err, "wake-up connect failed");
        }
    }
}

fn serve_client(
    stream: NetStream,
    peer: SocketAddr,
    args: &ServeArgs,
    format: OutputFormat,
    received: &mut usize,
) -> CliResult<SessionEnd> {
    let writer_stream = stream
        .try_clone()
        .map_err(|err| transport_error("clone failed", err))?;
    let mut reader = FrameReader::new(stream);
    let mut writer = FrameWriter::new(writer_stream);
    let peer_name = peer.to_string();

    loop {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => return Ok(SessionEnd::Disconnected),
            Err(err) if err.is_protocol_error() => {
                tracing::warn!(%peer, error = %err, "dropping client after protocol error");
                return Ok(SessionEnd::Disconnected);
            }
            Err(FrameError::Io(err)) => {
                tracing::warn!(%peer, error = %err, "read failed");
                return Ok(SessionEnd::Disconnected);
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        if is_ping(frame.protocol) {
            tracing::debug!(%peer, size = frame.payload.len(), "heartbeat");
            continue;
        }

        tracing::info!(
            protocol = frame.protocol,
            protocol_name = protocol_name(frame.protocol),
            size = frame.payload.len(),
            "frame received"
        );
        print_message(frame.protocol, frame.payload.as_ref(), &peer_name, format);

        if !args.no_echo {
            if let Err(err) = writer.write_frame(&frame) {
                tracing::warn!(%peer, error = %err, "echo failed");
                return Ok(SessionEnd::Disconnected);
            }
        }

        *received = received.saturating_add(1);
        if args.count.is_some_and(|count| *received >= count) {
            return Ok(SessionEnd::CountReached);
        }
    }
}

fn install_ctrlc_handler(stop: Arc<StopSignal>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        tracing::info!("interrupt received, stopping");
        stop.trigger();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
