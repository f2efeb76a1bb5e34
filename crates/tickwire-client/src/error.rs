use std::time::Duration;

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The connect deadline elapsed.
    #[error("connect to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },

    /// The connect attempt failed (refused, unreachable, unresolvable).
    #[error("connect to {endpoint} failed: {source}")]
    ConnectFailed {
        endpoint: String,
        #[source]
        source: tickwire_transport::TransportError,
    },

    /// A send was attempted while no connection is established.
    /// The payload has been dropped.
    #[error("not connected (state {0})")]
    NotConnected(crate::state::ConnectionState),

    /// The inbound queue reached its capacity.
    #[error("message queue full ({capacity} messages)")]
    QueueFull { capacity: usize },

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] tickwire_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
