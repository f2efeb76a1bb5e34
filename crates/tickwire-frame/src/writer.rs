use std::io::{self, ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Writes whole frames to a stream.
///
/// Header and payload go out in a single `write_all` from one scratch
/// buffer, so two frames from the same writer never interleave.
pub struct FrameWriter<T> {
    stream: T,
    scratch: BytesMut,
    max_payload: usize,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(stream: T) -> Self {
        Self::with_config(stream, &FrameConfig::default())
    }

    /// Writer that refuses payloads above `config.max_payload_size`.
    pub fn with_config(stream: T, config: &FrameConfig) -> Self {
        Self {
            stream,
            scratch: BytesMut::with_capacity(HEADER_SIZE + 1024),
            max_payload: config.max_payload_size,
        }
    }

    /// Encode `frame`, write it out completely and flush.
    ///
    /// Nothing reaches the stream when the payload is over the limit. A
    /// stream that accepts zero bytes is reported as `ConnectionClosed`;
    /// write timeouts come back as `FrameError::Io`.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.max_payload,
            });
        }

        self.scratch.clear();
        encode_frame(frame.protocol, &frame.payload, &mut self.scratch)?;
        self.stream.write_all(&self.scratch).map_err(write_error)?;
        flush_retrying(&mut self.stream).map_err(write_error)?;

        tracing::trace!(protocol = frame.protocol, size = frame.wire_size(), "frame written");
        Ok(())
    }
}

fn flush_retrying<W: Write>(stream: &mut W) -> io::Result<()> {
    loop {
        match stream.flush() {
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            done => return done,
        }
    }
}

fn write_error(err: io::Error) -> FrameError {
    if err.kind() == ErrorKind::WriteZero {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(err)
    }
}
