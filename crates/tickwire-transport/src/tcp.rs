use std::fmt;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::NetStream;

/// Remote game server address as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve the endpoint into socket addresses, in resolver order.
    pub fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                endpoint: self.to_string(),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(TransportError::NoAddress {
                endpoint: self.to_string(),
            });
        }
        Ok(addrs)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Connect to an endpoint without a deadline (blocking).
pub fn connect(endpoint: &Endpoint) -> Result<NetStream> {
    let stream = TcpStream::connect((endpoint.host(), endpoint.port())).map_err(|source| {
        TransportError::Connect {
            endpoint: endpoint.to_string(),
            source,
        }
    })?;
    stream.set_nodelay(true)?;
    debug!(%endpoint, "connected");
    Ok(NetStream::from(stream))
}

/// Connect to an endpoint, giving up once `timeout` has elapsed (blocking).
///
/// The deadline covers name resolution and every resolved address: each
/// step only gets the time that is left. When all attempts fail, the error
/// of the last attempt is returned, so a deadline hit on the final address
/// reports [`TransportError::Timeout`].
pub fn connect_timeout(endpoint: &Endpoint, timeout: Duration) -> Result<NetStream> {
    let deadline = Instant::now() + timeout;
    let addrs = resolve_until(endpoint, deadline, timeout)?;
    let mut last_err = None;

    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            last_err = Some(timed_out(endpoint, timeout));
            break;
        }

        match TcpStream::connect_timeout(&addr, remaining) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                debug!(%endpoint, %addr, "connected");
                return Ok(NetStream::from(stream));
            }
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                debug!(%endpoint, %addr, "connect attempt timed out");
                last_err = Some(timed_out(endpoint, timeout));
            }
            Err(source) => {
                debug!(%endpoint, %addr, error = %source, "connect attempt failed");
                last_err = Some(TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
        }
    }

    Err(last_err.unwrap_or_else(|| TransportError::NoAddress {
        endpoint: endpoint.to_string(),
    }))
}

/// Resolve `endpoint` before `deadline`.
///
/// IP literals are used as-is. Host names go through the system resolver on
/// a helper thread, which is left to finish on its own if the deadline
/// passes first.
fn resolve_until(
    endpoint: &Endpoint,
    deadline: Instant,
    timeout: Duration,
) -> Result<Vec<SocketAddr>> {
    if let Ok(ip) = endpoint.host().parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, endpoint.port())]);
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(timed_out(endpoint, timeout));
    }

    let (tx, rx) = mpsc::channel();
    let lookup = endpoint.clone();
    let _resolver = thread::Builder::new()
        .name("tickwire-resolve".into())
        .spawn(move || {
            let _ = tx.send(lookup.resolve());
        })?;

    match rx.recv_timeout(remaining) {
        Ok(resolved) => resolved,
        Err(RecvTimeoutError::Timeout) => {
            debug!(%endpoint, ?timeout, "name resolution timed out");
            Err(timed_out(endpoint, timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(TransportError::NoAddress {
            endpoint: endpoint.to_string(),
        }),
    }
}

fn timed_out(endpoint: &Endpoint, timeout: Duration) -> TransportError {
    TransportError::Timeout {
        endpoint: endpoint.to_string(),
        timeout,
    }
}

/// Listening TCP socket.
///
/// Used by the development server and by tests that stand in for a game
/// server; the client itself never listens.
pub struct NetListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl NetListener {
    /// Bind and listen on `addr` (for example `127.0.0.1:0`).
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "listening on tcp socket");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<(NetStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted connection");
        Ok((NetStream::from(stream), peer))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}
