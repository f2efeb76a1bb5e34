use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::events::ConnectionEvent;
use crate::message::Message;
use crate::pump::{HandlerResult, MessagePump, PumpReport};
use crate::queue::MessageQueue;
use crate::scheduler::{Scheduler, ThreadScheduler};
use crate::state::ConnectionState;

/// One game-server connection plus the pump that feeds its messages to the
/// application.
///
/// Construct one per connection the game needs and call [`tick`] from the
/// main loop. Inbound messages are only ever delivered from `tick`, on the
/// caller's thread.
///
/// [`tick`]: NetClient::tick
#[derive(Debug)]
pub struct NetClient {
    connection: ConnectionManager,
    pump: MessagePump,
}

impl NetClient {
    pub fn init(config: ClientConfig) -> Self {
        Self::with_scheduler(config, Arc::new(ThreadScheduler::new()))
    }

    pub fn with_scheduler(config: ClientConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        let inbox = Arc::new(MessageQueue::with_capacity(config.queue_capacity));
        let pump = MessagePump::with_limit(Arc::clone(&inbox), config.per_tick_limit);
        let connection = ConnectionManager::with_parts(config, inbox, scheduler);
        Self { connection, pump }
    }

    /// See [`ConnectionManager::connect`].
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        self.connection.connect(host, port)
    }

    pub fn close(&self) {
        self.connection.close();
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.connection.set_timeout(timeout);
    }

    pub fn set_per_tick_handle_limit(&self, limit: usize) {
        self.pump.set_per_tick_limit(limit);
    }

    /// See [`ConnectionManager::send`].
    pub fn send(&self, protocol: u16, payload: &[u8]) -> Result<()> {
        self.connection.send(protocol, payload)
    }

    /// Deliver pending messages to the handler, up to the per-tick limit.
    pub fn tick(&self, delta: Duration) -> PumpReport {
        self.pump.tick(delta)
    }

    pub fn on<F>(&self, event: ConnectionEvent, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.connection.set_callback(event, callback);
    }

    pub fn clear_callback(&self, event: ConnectionEvent) {
        self.connection.clear_callback(event);
    }

    pub fn set_message_handler<F>(&self, handler: F)
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        self.pump.set_handler(handler);
    }

    pub fn clear_message_handler(&self) {
        self.pump.clear_handler();
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Messages received but not yet delivered.
    pub fn pending(&self) -> usize {
        self.connection.inbox().len()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Close the connection and drop every callback, the handler and any
    /// undelivered messages.
    pub fn shutdown(&self) {
        self.connection.dispose();
        self.pump.clear_handler();
        let discarded = self.connection.inbox().len();
        self.connection.inbox().clear();
        debug!(discarded, "client shut down");
    }
}
