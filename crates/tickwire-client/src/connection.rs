//! Connection lifecycle: connect, background I/O, heartbeat, loss and close.
//!
//! Each successful connect starts a *session*: one receive thread feeding
//! the inbound queue, one writer thread draining an outbound channel, and a
//! heartbeat task on the [`Scheduler`]. Every state transition happens
//! under the manager's link lock; callbacks and timer cancellation run after
//! the lock is released.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use tickwire_frame::{Frame, FrameConfig, FrameError, FrameReader, FrameWriter, ReadEvent};
use tickwire_transport::{connect_timeout, Endpoint, NetStream, TransportError};
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{ConnectionEvent, Notifier};
use crate::message::Message;
use crate::queue::MessageQueue;
use crate::scheduler::{Scheduler, Task, ThreadScheduler, TimerHandle};
use crate::state::ConnectionState;
use crate::sync::{lock, read, write};

/// Owns the socket of one game-server connection and its state machine.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    config: RwLock<ClientConfig>,
    link: Mutex<Link>,
    notifier: Notifier,
    inbox: Arc<MessageQueue>,
    scheduler: Arc<dyn Scheduler>,
}

struct Link {
    state: ConnectionState,
    endpoint: Option<Endpoint>,
    generation: u64,
    session: Option<Session>,
    heartbeat: Option<TimerHandle>,
}

struct Session {
    generation: u64,
    control: NetStream,
    stop: Arc<AtomicBool>,
    outbound: Option<mpsc::Sender<Frame>>,
    receiver: Worker,
    writer: Worker,
}

/// A background thread plus a channel that disconnects when it exits.
struct Worker {
    thread: JoinHandle<()>,
    exited: mpsc::Receiver<()>,
}

impl ConnectionManager {
    /// Manager with its own inbound queue and a [`ThreadScheduler`].
    pub fn new(config: ClientConfig) -> Self {
        let inbox = Arc::new(MessageQueue::with_capacity(config.queue_capacity));
        Self::with_parts(config, inbox, Arc::new(ThreadScheduler::new()))
    }

    /// Manager delivering into `inbox` and scheduling heartbeats on `scheduler`.
    pub fn with_parts(
        config: ClientConfig,
        inbox: Arc<MessageQueue>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config: RwLock::new(config),
                link: Mutex::new(Link {
                    state: ConnectionState::Disconnected,
                    endpoint: None,
                    generation: 0,
                    session: None,
                    heartbeat: None,
                }),
                notifier: Notifier::new(),
                inbox,
                scheduler,
            }),
        }
    }

    /// Connect to `host:port`, blocking for at most the configured timeout.
    ///
    /// Does nothing while already connected or connecting. Coming from
    /// `Reconnecting`, the previous session is torn down first. A timeout
    /// raises [`ConnectionEvent::Timeout`]; any other failure raises
    /// [`ConnectionEvent::Failed`]. Either way the manager ends up
    /// `Disconnected` and the error is also returned.
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        let endpoint = Endpoint::new(host, port);
        let config = read(&self.shared.config).clone();

        let (generation, stale_session, stale_heartbeat) = {
            let mut link = lock(&self.shared.link);
            if matches!(
                link.state,
                ConnectionState::Connected | ConnectionState::Connecting
            ) {
                debug!(%endpoint, state = %link.state, "connect ignored");
                return Ok(());
            }
            link.state = ConnectionState::Connecting;
            link.generation += 1;
            link.endpoint = Some(endpoint.clone());
            (link.generation, link.session.take(), link.heartbeat.take())
        };

        if let Some(handle) = stale_heartbeat {
            self.shared.scheduler.cancel(handle);
        }
        if let Some(session) = stale_session {
            session.shutdown(config.close_timeout);
        }

        info!(%endpoint, generation, timeout = ?config.connect_timeout, "connecting");
        let stream = match connect_timeout(&endpoint, config.connect_timeout) {
            Ok(stream) => stream,
            Err(err) => return Err(self.connect_failed(&endpoint, &config, err)),
        };

        let started = {
            let mut link = lock(&self.shared.link);
            match Session::start(&self.shared, stream, generation, &config) {
                Ok(session) => {
                    link.session = Some(session);
                    link.state = ConnectionState::Connected;
                    link.heartbeat = self.schedule_heartbeat(generation, &config);
                    Ok(())
                }
                Err(err) => {
                    link.state = ConnectionState::Disconnected;
                    Err(err)
                }
            }
        };

        match started {
            Ok(()) => {
                info!(%endpoint, generation, "connected");
                self.shared.notifier.emit(ConnectionEvent::Connected);
                Ok(())
            }
            Err(err) => Err(self.connect_failed(&endpoint, &config, err)),
        }
    }

    fn connect_failed(
        &self,
        endpoint: &Endpoint,
        config: &ClientConfig,
        err: TransportError,
    ) -> ClientError {
        lock(&self.shared.link).state = ConnectionState::Disconnected;

        if err.is_timeout() {
            warn!(%endpoint, timeout = ?config.connect_timeout, "connect timed out");
            self.shared.notifier.emit(ConnectionEvent::Timeout);
            ClientError::ConnectTimeout {
                endpoint: endpoint.to_string(),
                timeout: config.connect_timeout,
            }
        } else {
            warn!(%endpoint, error = %err, "connect failed");
            self.shared.notifier.emit(ConnectionEvent::Failed);
            ClientError::ConnectFailed {
                endpoint: endpoint.to_string(),
                source: err,
            }
        }
    }

    fn schedule_heartbeat(&self, generation: u64, config: &ClientConfig) -> Option<TimerHandle> {
        let frame = Frame::new(config.heartbeat_protocol, config.heartbeat_payload.clone());
        let task = heartbeat_task(Arc::downgrade(&self.shared), generation, frame);
        match self
            .shared
            .scheduler
            .run_every(config.heartbeat_interval, task)
        {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(generation, error = %err, "failed to schedule heartbeat");
                None
            }
        }
    }

    /// Queue a frame for the writer thread and return immediately.
    ///
    /// When not connected the payload is dropped, the heartbeat is stopped,
    /// [`ConnectionEvent::Reconnected`] is raised so the application can
    /// reconnect, and `NotConnected` is returned.
    pub fn send(&self, protocol: u16, payload: &[u8]) -> Result<()> {
        let (max_payload, loopback) = {
            let config = read(&self.shared.config);
            (config.max_payload_size, config.loopback_sends)
        };
        if payload.len() > max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: max_payload,
            }
            .into());
        }

        let frame = Frame::new(protocol, Bytes::copy_from_slice(payload));
        let (state, generation, queued) = {
            let link = lock(&self.shared.link);
            let queued = link.state.is_connected()
                && link
                    .session
                    .as_ref()
                    .and_then(|session| session.outbound.as_ref())
                    .is_some_and(|outbound| outbound.send(frame.clone()).is_ok());
            (link.state, link.generation, queued)
        };

        if queued {
            trace!(protocol, size = payload.len(), "frame queued");
            if loopback {
                if let Err(err) = self.shared.inbox.enqueue(Message::from(frame)) {
                    warn!(protocol, error = %err, "loopback message dropped");
                }
            }
            return Ok(());
        }

        if state.is_connected() {
            self.shared.connection_lost(generation, &"writer stopped");
            return Err(ClientError::NotConnected(ConnectionState::Reconnecting));
        }

        warn!(%state, protocol, size = payload.len(), "send while not connected; dropping");
        self.request_reconnect();
        Err(ClientError::NotConnected(state))
    }

    fn request_reconnect(&self) {
        let heartbeat = lock(&self.shared.link).heartbeat.take();
        if let Some(handle) = heartbeat {
            self.shared.scheduler.cancel(handle);
        }
        self.shared.notifier.emit(ConnectionEvent::Reconnected);
    }

    /// Tear down the connection and raise [`ConnectionEvent::Closed`].
    ///
    /// No-op while `Disconnected` or `Connecting`, so repeated calls notify
    /// once.
    pub fn close(&self) {
        let close_timeout = read(&self.shared.config).close_timeout;
        let (heartbeat, session) = {
            let mut link = lock(&self.shared.link);
            if matches!(
                link.state,
                ConnectionState::Disconnected | ConnectionState::Connecting
            ) {
                trace!(state = %link.state, "close ignored");
                return;
            }
            link.state = ConnectionState::Disconnected;
            (link.heartbeat.take(), link.session.take())
        };

        if let Some(handle) = heartbeat {
            self.shared.scheduler.cancel(handle);
        }
        if let Some(session) = session {
            debug!(generation = session.generation, "closing session");
            session.shutdown(close_timeout);
        }

        info!("connection closed");
        self.shared.notifier.emit(ConnectionEvent::Closed);
    }

    /// `close`, then forget every registered callback.
    pub fn dispose(&self) {
        self.close();
        self.shared.notifier.clear_all();
    }

    /// Deadline for subsequent connect attempts.
    pub fn set_timeout(&self, timeout: Duration) {
        write(&self.shared.config).connect_timeout = timeout;
    }

    pub fn set_callback<F>(&self, event: ConnectionEvent, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.notifier.set(event, callback);
    }

    pub fn clear_callback(&self, event: ConnectionEvent) {
        self.shared.notifier.clear(event);
    }

    pub fn clear_callbacks(&self) {
        self.shared.notifier.clear_all();
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.shared.link).state
    }

    /// Endpoint of the most recent connect attempt.
    pub fn endpoint(&self) -> Option<Endpoint> {
        lock(&self.shared.link).endpoint.clone()
    }

    pub fn config(&self) -> ClientConfig {
        read(&self.shared.config).clone()
    }

    /// Queue that receives inbound messages.
    pub fn inbox(&self) -> &Arc<MessageQueue> {
        &self.shared.inbox
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let close_timeout = read(&self.shared.config).close_timeout;
        let (heartbeat, session) = {
            let mut link = lock(&self.shared.link);
            link.state = ConnectionState::Disconnected;
            (link.heartbeat.take(), link.session.take())
        };
        if let Some(handle) = heartbeat {
            self.shared.scheduler.cancel(handle);
        }
        if let Some(session) = session {
            session.shutdown(close_timeout);
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let link = lock(&self.shared.link);
        f.debug_struct("ConnectionManager")
            .field("state", &link.state)
            .field("endpoint", &link.endpoint)
            .field("generation", &link.generation)
            .field("notifier", &self.shared.notifier)
            .finish()
    }
}

impl Shared {
    /// Move a live session to `Reconnecting`.
    ///
    /// Ignored unless `generation` is the current, connected session, so a
    /// late report from an old thread never touches a newer connection.
    fn connection_lost(&self, generation: u64, reason: &dyn fmt::Display) {
        let heartbeat = {
            let mut link = lock(&self.link);
            if link.state != ConnectionState::Connected || link.generation != generation {
                trace!(generation, %reason, "stale connection loss ignored");
                return;
            }
            link.state = ConnectionState::Reconnecting;
            if let Some(session) = link.session.as_mut() {
                session.stop.store(true, Ordering::Release);
                session.outbound = None;
                session.control.shutdown();
            }
            link.heartbeat.take()
        };

        warn!(generation, %reason, "connection lost");
        if let Some(handle) = heartbeat {
            self.scheduler.cancel(handle);
        }
        self.notifier.emit(ConnectionEvent::Reconnected);
    }

    fn deliver(&self, frame: Frame, heartbeat_protocol: u16) {
        if frame.protocol == heartbeat_protocol {
            trace!(size = frame.payload.len(), "heartbeat received");
            return;
        }
        let protocol = frame.protocol;
        if let Err(err) = self.inbox.enqueue(Message::from(frame)) {
            warn!(protocol, dropped = self.inbox.dropped(), error = %err, "inbound message dropped");
        }
    }
}

impl Session {
    fn start(
        shared: &Arc<Shared>,
        stream: NetStream,
        generation: u64,
        config: &ClientConfig,
    ) -> tickwire_transport::Result<Self> {
        // A zero timeout is rejected by the OS; it would also disable polling.
        let frame_config = FrameConfig {
            max_payload_size: config.max_payload_size,
            read_timeout: Some(config.poll_interval.max(Duration::from_millis(1))),
            write_timeout: config.write_timeout.filter(|timeout| !timeout.is_zero()),
        };
        stream.set_read_timeout(frame_config.read_timeout)?;
        stream.set_write_timeout(frame_config.write_timeout)?;

        let frame_reader = FrameReader::with_config(stream.try_clone()?, &frame_config);
        let frame_writer = FrameWriter::with_config(stream.try_clone()?, &frame_config);

        let stop = Arc::new(AtomicBool::new(false));
        let (outbound, frames) = mpsc::channel();

        let receiver = {
            let shared = Arc::clone(shared);
            let stop = Arc::clone(&stop);
            let heartbeat_protocol = config.heartbeat_protocol;
            Worker::spawn(format!("tickwire-recv-{generation}"), move || {
                receive_loop(&shared, generation, frame_reader, &stop, heartbeat_protocol)
            })?
        };

        let writer = {
            let shared = Arc::clone(shared);
            let writer_stop = Arc::clone(&stop);
            let spawned = Worker::spawn(format!("tickwire-send-{generation}"), move || {
                write_loop(&shared, generation, frame_writer, frames, &writer_stop)
            });
            match spawned {
                Ok(worker) => worker,
                Err(err) => {
                    stop.store(true, Ordering::Release);
                    stream.shutdown();
                    return Err(err);
                }
            }
        };

        Ok(Self {
            generation,
            control: stream,
            stop,
            outbound: Some(outbound),
            receiver,
            writer,
        })
    }

    /// Stop both threads and release the socket.
    ///
    /// Dropping the outbound sender lets the writer flush frames already
    /// queued before the socket is shut down.
    fn shutdown(mut self, timeout: Duration) {
        self.stop.store(true, Ordering::Release);
        self.outbound = None;
        self.receiver.finish("receive", timeout);
        self.writer.finish("writer", timeout);
        self.control.shutdown();
        trace!(generation = self.generation, "session released");
    }
}

impl Worker {
    fn spawn<F>(name: String, body: F) -> tickwire_transport::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (exit_guard, exited) = mpsc::channel::<()>();
        let thread = thread::Builder::new().name(name).spawn(move || {
            let _exit_guard = exit_guard;
            body();
        })?;
        Ok(Self { thread, exited })
    }

    fn finish(self, role: &'static str, timeout: Duration) {
        if self.thread.thread().id() == thread::current().id() {
            trace!(role, "close called from worker thread; not waiting");
            return;
        }
        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) | Ok(()) => {
                if self.thread.join().is_err() {
                    warn!(role, "worker thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(role, ?timeout, "worker did not stop in time; detaching");
            }
        }
    }
}

fn receive_loop(
    shared: &Shared,
    generation: u64,
    mut reader: FrameReader<NetStream>,
    stop: &AtomicBool,
    heartbeat_protocol: u16,
) {
    let failure = 'read: loop {
        if stop.load(Ordering::Acquire) {
            trace!(generation, "receive loop stopped");
            return;
        }

        match reader.read_once() {
            Ok(ReadEvent::Idle) => continue,
            Ok(ReadEvent::Data(n)) => trace!(generation, bytes = n, "read"),
            Err(err) => break err,
        }

        loop {
            match reader.next_buffered() {
                Ok(Some(frame)) => shared.deliver(frame, heartbeat_protocol),
                Ok(None) => break,
                Err(err) => break 'read err,
            }
        }
    };

    if stop.load(Ordering::Acquire) {
        return;
    }
    match &failure {
        FrameError::ConnectionClosed => debug!(generation, "peer closed connection"),
        err if err.is_protocol_error() => warn!(generation, error = %err, "protocol error"),
        err => debug!(generation, error = %err, "read failed"),
    }
    shared.connection_lost(generation, &failure);
}

fn write_loop(
    shared: &Shared,
    generation: u64,
    mut writer: FrameWriter<NetStream>,
    frames: mpsc::Receiver<Frame>,
    stop: &AtomicBool,
) {
    for frame in frames {
        if let Err(err) = writer.write_frame(&frame) {
            if !stop.load(Ordering::Acquire) {
                warn!(generation, protocol = frame.protocol, error = %err, "send failed");
                shared.connection_lost(generation, &err);
            }
            return;
        }
    }
    trace!(generation, "writer drained");
}

fn heartbeat_task(shared: Weak<Shared>, generation: u64, frame: Frame) -> Task {
    Arc::new(move || {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let link = lock(&shared.link);
        if link.state != ConnectionState::Connected || link.generation != generation {
            trace!(generation, "heartbeat skipped");
            return;
        }
        let sent = link
            .session
            .as_ref()
            .and_then(|session| session.outbound.as_ref())
            .is_some_and(|outbound| outbound.send(frame.clone()).is_ok());
        if sent {
            trace!(generation, "heartbeat queued");
        }
    })
}
