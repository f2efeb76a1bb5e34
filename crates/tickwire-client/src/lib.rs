//! Game-client connection management.
//!
//! A [`ConnectionManager`] owns the TCP session to a game server: connect
//! with a deadline, background receive and send threads, heartbeats, and
//! lifecycle notifications. Received frames land in a [`MessageQueue`];
//! a [`MessagePump`] hands them to the application a few per tick.
//! [`NetClient`] wires the two together.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod message;
pub mod pump;
pub mod queue;
pub mod scheduler;
pub mod state;

mod sync;

pub use client::NetClient;
pub use config::ClientConfig;
pub use connection::ConnectionManager;
pub use error::{ClientError, Result};
pub use events::{ConnectionEvent, EventCallback, Notifier};
pub use message::Message;
pub use pump::{HandlerError, HandlerResult, MessageHandler, MessagePump, PumpReport};
pub use queue::{MessageQueue, DEFAULT_QUEUE_CAPACITY};
pub use scheduler::{Scheduler, Task, ThreadScheduler, TimerHandle};
pub use state::ConnectionState;
