//! Built-in protocol types.
//!
//! Protocol types 0-255 are reserved for transport use.
//! Protocol types 256-65535 are available for application-defined messages.

/// Heartbeat frames. Received pings are parsed and discarded.
pub const PING: u16 = 0;

/// Generic application message.
pub const MESSAGE: u16 = 1;

/// First application-defined protocol type.
pub const USER_PROTOCOL_START: u16 = 256;

/// Returns a human-readable name for a protocol type.
pub fn protocol_name(id: u16) -> &'static str {
    match id {
        PING => "PING",
        MESSAGE => "MESSAGE",
        2..=255 => "RESERVED",
        _ => "USER",
    }
}

/// Returns true for the heartbeat protocol type.
pub fn is_ping(id: u16) -> bool {
    id == PING
}

/// Returns true if the protocol type is in the reserved range.
pub fn is_reserved(id: u16) -> bool {
    id < USER_PROTOCOL_START
}
