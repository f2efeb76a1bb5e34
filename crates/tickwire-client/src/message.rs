use bytes::Bytes;
use tickwire_frame::Frame;

/// A decoded inbound application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Protocol type the frame was tagged with.
    pub protocol_id: u16,
    /// Message payload, owned by this message.
    pub data: Bytes,
}

impl Message {
    pub fn new(protocol_id: u16, data: impl Into<Bytes>) -> Self {
        Self {
            protocol_id,
            data: data.into(),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        Self {
            protocol_id: frame.protocol,
            data: frame.payload,
        }
    }
}
