use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use tracing::{error, trace};

use crate::pump::panic_message;
use crate::sync::{read, write};

/// Lifecycle notifications raised by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    /// A connect attempt succeeded.
    Connected,
    /// A connect attempt ran past its deadline.
    Timeout,
    /// A connect attempt failed before the deadline.
    Failed,
    /// The connection was lost, or a send found no connection. The
    /// application decides whether to call `connect` again.
    Reconnected,
    /// `close` tore down the connection.
    Closed,
}

impl ConnectionEvent {
    pub const ALL: [ConnectionEvent; 5] = [
        ConnectionEvent::Connected,
        ConnectionEvent::Timeout,
        ConnectionEvent::Failed,
        ConnectionEvent::Reconnected,
        ConnectionEvent::Closed,
    ];

    fn slot(self) -> usize {
        match self {
            ConnectionEvent::Connected => 0,
            ConnectionEvent::Timeout => 1,
            ConnectionEvent::Failed => 2,
            ConnectionEvent::Reconnected => 3,
            ConnectionEvent::Closed => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionEvent::Connected => "connected",
            ConnectionEvent::Timeout => "timeout",
            ConnectionEvent::Failed => "failed",
            ConnectionEvent::Reconnected => "reconnected",
            ConnectionEvent::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type EventCallback = Arc<dyn Fn() + Send + Sync>;

/// One replaceable callback slot per [`ConnectionEvent`].
#[derive(Default)]
pub struct Notifier {
    slots: RwLock<[Option<EventCallback>; 5]>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<F>(&self, event: ConnectionEvent, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        write(&self.slots)[event.slot()] = Some(Arc::new(callback));
    }

    pub fn clear(&self, event: ConnectionEvent) {
        write(&self.slots)[event.slot()] = None;
    }

    pub fn clear_all(&self) {
        *write(&self.slots) = Default::default();
    }

    pub fn is_set(&self, event: ConnectionEvent) -> bool {
        read(&self.slots)[event.slot()].is_some()
    }

    /// Invoke the callback registered for `event`, if any.
    ///
    /// The slot lock is released before the callback runs, so a callback
    /// may replace or clear slots. Panics are caught and logged.
    pub fn emit(&self, event: ConnectionEvent) {
        let callback = read(&self.slots)[event.slot()].clone();
        let Some(callback) = callback else {
            trace!(%event, "no callback registered");
            return;
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback())) {
            error!(
                %event,
                panic = panic_message(payload.as_ref()),
                "event callback panicked"
            );
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<&str> = ConnectionEvent::ALL
            .iter()
            .filter(|event| self.is_set(**event))
            .map(|event| event.as_str())
            .collect();
        f.debug_struct("Notifier")
            .field("registered", &registered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(notifier: &Notifier, event: ConnectionEvent) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        notifier.set(event, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn emit_reaches_only_matching_slot() {
        let notifier = Notifier::new();
        let connected = counting(&notifier, ConnectionEvent::Connected);
        let closed = counting(&notifier, ConnectionEvent::Closed);

        notifier.emit(ConnectionEvent::Connected);
        notifier.emit(ConnectionEvent::Failed);

        assert_eq!(connected.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn set_replaces_previous_callback() {
        let notifier = Notifier::new();
        let first = counting(&notifier, ConnectionEvent::Timeout);
        let second = counting(&notifier, ConnectionEvent::Timeout);

        notifier.emit(ConnectionEvent::Timeout);

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cleared_slot_is_silent() {
        let notifier = Notifier::new();
        let count = counting(&notifier, ConnectionEvent::Reconnected);
        notifier.clear(ConnectionEvent::Reconnected);
        notifier.emit(ConnectionEvent::Reconnected);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let count = counting(&notifier, ConnectionEvent::Closed);
        notifier.clear_all();
        notifier.emit(ConnectionEvent::Closed);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!notifier.is_set(ConnectionEvent::Closed));
    }

    #[test]
    fn panicking_callback_is_caught() {
        let notifier = Notifier::new();
        notifier.set(ConnectionEvent::Failed, || panic!("callback failure"));
        notifier.emit(ConnectionEvent::Failed);

        let count = counting(&notifier, ConnectionEvent::Failed);
        notifier.emit(ConnectionEvent::Failed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_clear_its_own_slot() {
        let notifier = Arc::new(Notifier::new());
        let inner = Arc::clone(&notifier);
        notifier.set(ConnectionEvent::Connected, move || {
            inner.clear(ConnectionEvent::Connected);
        });

        notifier.emit(ConnectionEvent::Connected);
        assert!(!notifier.is_set(ConnectionEvent::Connected));
    }
}
