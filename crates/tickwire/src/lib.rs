//! Tick-driven TCP transport for game clients.
//!
//! tickwire keeps one TCP session to a game server alive, frames messages
//! with a small length-prefixed header, and hands received messages to the
//! game loop a bounded number at a time.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP connect with deadline, streams and listeners
//! - [`frame`]: Wire codec and receive-buffer reassembly
//! - [`client`]: Connection lifecycle, heartbeat and message pump (behind `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use tickwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use tickwire_frame::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use tickwire_client::*;
}
