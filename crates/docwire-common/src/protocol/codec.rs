//! Stream framing for `tokio_util::codec`.
//!
//! [`FrameDecoder`] cuts a byte stream into [`RawMessage`]s using only the
//! header length, so a message whose body cannot be interpreted never
//! desynchronizes the messages after it.

use std::sync::atomic::{AtomicI32, Ordering};

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use super::{
    header::{DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE, MessageHeader},
    message::{Message, RawMessage},
};
use crate::{DocwireError, FramingError};

#[derive(Debug, Clone, Copy)]
enum State {
    /// Need at least a full header.
    AwaitingHeader,
    /// Header parsed, need the rest of the message.
    AwaitingBody(MessageHeader),
}

/// Incremental message framer.
#[derive(Debug)]
pub struct FrameDecoder {
    state: State,
    max_message_size: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            state: State::AwaitingHeader,
            max_message_size,
        }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameDecoder {
    type Item = RawMessage;
    type Error = DocwireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawMessage>, DocwireError> {
        if let State::AwaitingHeader = self.state {
            let Some(bytes) = src.get(..HEADER_SIZE) else {
                return Ok(None);
            };
            let mut fixed = [0u8; HEADER_SIZE];
            fixed.copy_from_slice(bytes);
            let header = MessageHeader::parse(&fixed);

            if header.length < HEADER_SIZE as i32 {
                return Err(FramingError::InvalidMessageLength(header.length).into());
            }
            let length = header.length as usize;
            if length > self.max_message_size {
                return Err(FramingError::MessageTooLarge {
                    length,
                    max: self.max_message_size,
                }
                .into());
            }

            src.reserve(length.saturating_sub(src.len()));
            self.state = State::AwaitingBody(header);
        }

        let State::AwaitingBody(header) = self.state else {
            return Ok(None);
        };
        let length = header.length as usize;
        if src.len() < length {
            return Ok(None);
        }

        let bytes = src.split_to(length).freeze();
        self.state = State::AwaitingHeader;
        trace!(
            request_id = header.request_id,
            response_to = header.response_to,
            opcode = header.opcode,
            length,
            "framed message"
        );

        Ok(Some(RawMessage { header, bytes }))
    }
}

/// Builds outgoing message buffers and hands out request ids.
///
/// Shared between every caller of a connection; ids are unique per
/// encoder.
#[derive(Debug)]
pub struct MessageEncoder {
    next_request_id: AtomicI32,
    checksum: bool,
}

impl MessageEncoder {
    pub fn new() -> Self {
        Self {
            next_request_id: AtomicI32::new(1),
            checksum: false,
        }
    }

    /// Append a CRC-32C trailer to every message.
    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn next_request_id(&self) -> i32 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Encode a request, returning its request id with the bytes.
    pub fn encode(&self, message: &Message) -> (i32, Bytes) {
        self.encode_reply(message, 0)
    }

    /// Encode a message answering `response_to`.
    pub fn encode_reply(&self, message: &Message, response_to: i32) -> (i32, Bytes) {
        let request_id = self.next_request_id();
        let mut out = BytesMut::new();
        message.encode_into(&mut out, request_id, response_to, self.checksum);
        (request_id, out.freeze())
    }
}

impl Default for MessageEncoder {
    fn default() -> Self {
        Self::new()
    }
}
