use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: total length (4) + protocol (2) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A complete wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The protocol type carried in the header.
    pub protocol: u16,
    /// The frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(protocol: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            protocol,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (all integers little-endian):
/// ```text
/// ┌────────────────────┬───────────────┬──────────────────────┐
/// │ Total length (4B)  │ Protocol (2B) │ Payload              │
/// │ header + payload   │               │ (total - 6 bytes)    │
/// └────────────────────┴───────────────┴──────────────────────┘
/// ```
pub fn encode_frame(protocol: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let max = u32::MAX as usize - HEADER_SIZE;
    if payload.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le((HEADER_SIZE + payload.len()) as u32);
    dst.put_u16_le(protocol);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from the head of a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet; in
/// that case nothing is consumed. On success, exactly the frame's bytes are
/// split off the front of the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let declared = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
    let total = declared as usize;
    if total < HEADER_SIZE {
        return Err(FrameError::MalformedLength {
            declared,
            min: HEADER_SIZE,
        });
    }

    let payload_len = total - HEADER_SIZE;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < total {
        return Ok(None);
    }

    let protocol = u16::from_le_bytes([src[4], src[5]]);
    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { protocol, payload }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout the owner applies to the stream.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout the owner applies to the stream.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let payload = b"hello, tickwire!";

        encode_frame(300, payload, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + payload.len());

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();

        assert_eq!(frame.protocol, 300);
        assert_eq!(frame.payload.as_ref(), payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_roundtrip_any_length_any_protocol() {
        let lengths = (0..=1024).chain([64 * 1024 + 3]);
        for len in lengths {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            for protocol in [0, 1, 255, 256, u16::MAX] {
                let mut buf = BytesMut::new();
                encode_frame(protocol, &payload, &mut buf).unwrap();
                assert_eq!(buf.len(), HEADER_SIZE + len);

                let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
                    .unwrap()
                    .unwrap_or_else(|| panic!("len {len}, protocol {protocol}: incomplete"));
                assert_eq!(frame, Frame::new(protocol, payload.clone()));
                assert!(buf.is_empty(), "len {len}, protocol {protocol}: bytes left over");
            }
        }
    }

    #[test]
    fn test_wire_layout_is_little_endian() {
        let mut buf = BytesMut::new();
        encode_frame(5, &[0x01, 0x02], &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x08, 0, 0, 0, 0x05, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x08, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 3, "partial header must not be consumed");
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(1, b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2, "partial frame must not be consumed");
    }

    #[test]
    fn test_decode_rejects_length_below_header() {
        for declared in 0u32..HEADER_SIZE as u32 {
            let mut buf = BytesMut::new();
            buf.put_u32_le(declared);
            buf.put_u16_le(1);

            let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
            assert!(
                matches!(result, Err(FrameError::MalformedLength { declared: d, .. }) if d == declared),
                "declared length {declared} should be rejected"
            );
        }
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(1024 * 1024 * 32);
        buf.put_u16_le(1);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(1, b"first", &mut buf).unwrap();
        encode_frame(2, b"second", &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(f1.protocol, 1);
        assert_eq!(f1.payload.as_ref(), b"first");

        let f2 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(f2.protocol, 2);
        assert_eq!(f2.payload.as_ref(), b"second");

        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(0, b"", &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.protocol, 0);
        assert!(frame.payload.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::new(1, Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), HEADER_SIZE + 4);
    }
}
