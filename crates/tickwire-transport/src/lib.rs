//! TCP transport for tickwire.
//!
//! Resolves `host:port` endpoints, connects under a deadline and hands out
//! [`NetStream`] handles. This is the lowest layer of tickwire; framing and
//! connection lifecycle build on top of it.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::{connect, connect_timeout, Endpoint, NetListener};
pub use traits::NetStream;
