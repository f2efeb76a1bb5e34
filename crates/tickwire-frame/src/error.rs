/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header declares a total length shorter than the header itself.
    #[error("malformed frame header: total length {declared} is below header size {min}")]
    MalformedLength { declared: u32, min: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed (possibly mid-frame).
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether the peer violated the wire format.
    ///
    /// Protocol errors are not recoverable on the same stream: there is no
    /// resynchronization, so the connection has to be dropped.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            FrameError::MalformedLength { .. } | FrameError::PayloadTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
