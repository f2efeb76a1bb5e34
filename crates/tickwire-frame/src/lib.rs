//! Length-prefixed framing for the tickwire game protocol.
//!
//! Every message on the wire is framed with a 6-byte little-endian header:
//! - A 4-byte total length (header + payload)
//! - A 2-byte protocol type
//!
//! Partial and coalesced socket reads are reassembled by [`ReceiveBuffer`];
//! callers only ever see complete frames.

pub mod buffer;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::FrameCodec;
pub use buffer::ReceiveBuffer;
pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use protocol::{is_ping, is_reserved, protocol_name, MESSAGE, PING, USER_PROTOCOL_START};
pub use reader::{FrameReader, ReadEvent};
pub use writer::FrameWriter;
