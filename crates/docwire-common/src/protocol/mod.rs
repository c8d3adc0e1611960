//! Message framing.
//!
//! Every message is a 16-byte header followed by an opcode-specific body.
//! Modern messages (opcode 2013) carry flag bits, one body section, any
//! number of document-sequence sections and an optional CRC-32C trailer.

mod codec;
mod header;
mod message;

pub use codec::{FrameDecoder, MessageEncoder};
pub use header::{DEFAULT_MAX_MESSAGE_SIZE, HEADER_SIZE, MessageHeader, OpCode};
pub use message::{Message, MessageFlags, RawMessage, Section};
