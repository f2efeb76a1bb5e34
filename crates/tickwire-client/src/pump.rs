use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{error, trace};

use crate::config::DEFAULT_PER_TICK_LIMIT;
use crate::message::Message;
use crate::queue::MessageQueue;
use crate::sync::{read, write};

/// Error type a message handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Application callback invoked once per delivered message.
pub type MessageHandler = Arc<dyn Fn(&Message) -> HandlerResult + Send + Sync>;

/// Outcome of a single `tick`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Messages taken from the queue and passed to the handler.
    pub delivered: usize,
    /// Deliveries where the handler returned an error or panicked.
    pub faulted: usize,
}

/// Rate-limited delivery of queued messages on the caller's thread.
pub struct MessagePump {
    queue: Arc<MessageQueue>,
    per_tick_limit: AtomicUsize,
    handler: RwLock<Option<MessageHandler>>,
}

impl MessagePump {
    pub fn new(queue: Arc<MessageQueue>) -> Self {
        Self::with_limit(queue, DEFAULT_PER_TICK_LIMIT)
    }

    pub fn with_limit(queue: Arc<MessageQueue>, per_tick_limit: usize) -> Self {
        Self {
            queue,
            per_tick_limit: AtomicUsize::new(per_tick_limit),
            handler: RwLock::new(None),
        }
    }

    /// Deliver up to `per_tick_limit` queued messages, oldest first.
    ///
    /// `delta` is the caller's frame time and is only used for tracing.
    /// Handler failures are logged and counted; delivery continues with the
    /// next message.
    pub fn tick(&self, delta: Duration) -> PumpReport {
        let limit = self.per_tick_limit();
        if limit == 0 {
            return PumpReport::default();
        }

        let batch = self.queue.drain_up_to(limit);
        if batch.is_empty() {
            return PumpReport::default();
        }

        let handler = read(&self.handler).clone();
        let mut report = PumpReport {
            delivered: batch.len(),
            faulted: 0,
        };

        let Some(handler) = handler else {
            trace!(count = batch.len(), "no message handler; discarding");
            return report;
        };

        trace!(count = batch.len(), ?delta, "pump tick");
        for message in &batch {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(message)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    report.faulted += 1;
                    error!(protocol = message.protocol_id, error = %err, "message handler failed");
                }
                Err(payload) => {
                    report.faulted += 1;
                    error!(
                        protocol = message.protocol_id,
                        panic = panic_message(payload.as_ref()),
                        "message handler panicked"
                    );
                }
            }
        }

        report
    }

    /// Takes effect on the next `tick`. Zero pauses delivery.
    pub fn set_per_tick_limit(&self, limit: usize) {
        self.per_tick_limit.store(limit, Ordering::Relaxed);
    }

    pub fn per_tick_limit(&self) -> usize {
        self.per_tick_limit.load(Ordering::Relaxed)
    }

    /// Install the message handler, replacing any previous one.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
    {
        *write(&self.handler) = Some(Arc::new(handler));
    }

    pub fn clear_handler(&self) {
        *write(&self.handler) = None;
    }

    pub fn has_handler(&self) -> bool {
        read(&self.handler).is_some()
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }
}

impl std::fmt::Debug for MessagePump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePump")
            .field("queued", &self.queue.len())
            .field("per_tick_limit", &self.per_tick_limit())
            .field("has_handler", &self.has_handler())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    const TICK: Duration = Duration::from_millis(16);

    fn filled(count: u8) -> Arc<MessageQueue> {
        let queue = Arc::new(MessageQueue::unbounded());
        for n in 0..count {
            queue
                .enqueue(Message::new(1, vec![n]))
                .expect("unbounded queue should accept");
        }
        queue
    }

    fn recording(pump: &MessagePump) -> Arc<Mutex<Vec<u8>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        pump.set_handler(move |message| {
            sink.lock().unwrap().push(message.data[0]);
            Ok(())
        });
        seen
    }

    #[test]
    fn tick_delivers_at_most_the_limit() {
        let pump = MessagePump::new(filled(7));
        let seen = recording(&pump);

        assert_eq!(pump.tick(TICK).delivered, 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(pump.queue().len(), 4);

        assert_eq!(pump.tick(TICK).delivered, 3);
        assert_eq!(pump.tick(TICK).delivered, 1);
        assert_eq!(pump.tick(TICK).delivered, 0);
        assert_eq!(*seen.lock().unwrap(), (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn handler_error_does_not_stop_delivery() {
        let pump = MessagePump::new(filled(3));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        pump.set_handler(move |message| {
            sink.lock().unwrap().push(message.data[0]);
            if message.data[0] == 1 {
                return Err("bad message".into());
            }
            Ok(())
        });

        let report = pump.tick(TICK);
        assert_eq!(
            report,
            PumpReport {
                delivered: 3,
                faulted: 1
            }
        );
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert!(pump.queue().is_empty());
    }

    #[test]
    fn handler_panic_is_contained() {
        let pump = MessagePump::new(filled(3));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        pump.set_handler(move |message| {
            if message.data[0] == 1 {
                panic!("handler blew up");
            }
            sink.lock().unwrap().push(message.data[0]);
            Ok(())
        });

        let report = pump.tick(TICK);
        assert_eq!(report.faulted, 1);
        assert_eq!(*seen.lock().unwrap(), vec![0, 2]);

        // Queue stays usable after the panic.
        pump.queue()
            .enqueue(Message::new(1, vec![9]))
            .expect("queue should accept");
        assert_eq!(pump.tick(TICK).delivered, 1);
        assert_eq!(*seen.lock().unwrap(), vec![0, 2, 9]);
    }

    #[test]
    fn limit_change_applies_to_next_tick() {
        let pump = MessagePump::new(filled(10));
        let _seen = recording(&pump);

        pump.set_per_tick_limit(5);
        assert_eq!(pump.tick(TICK).delivered, 5);

        pump.set_per_tick_limit(0);
        assert_eq!(pump.tick(TICK).delivered, 0);
        assert_eq!(pump.queue().len(), 5);

        pump.set_per_tick_limit(1);
        assert_eq!(pump.tick(TICK).delivered, 1);
    }

    #[test]
    fn no_handler_discards() {
        let pump = MessagePump::new(filled(2));
        assert!(!pump.has_handler());

        let report = pump.tick(TICK);
        assert_eq!(report.delivered, 2);
        assert!(pump.queue().is_empty());
    }

    #[test]
    fn replaced_handler_receives_later_messages() {
        let pump = MessagePump::with_limit(filled(2), 1);
        let first = recording(&pump);
        pump.tick(TICK);

        let second = recording(&pump);
        pump.tick(TICK);

        assert_eq!(*first.lock().unwrap(), vec![0]);
        assert_eq!(*second.lock().unwrap(), vec![1]);

        pump.clear_handler();
        assert!(!pump.has_handler());
    }
}
