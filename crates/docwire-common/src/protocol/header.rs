/// Size of the fixed message header.
pub const HEADER_SIZE: usize = 16;

/// Largest message accepted when the server has not advertised its own
/// limit.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 48_000_000;

/// Operation codes that can appear in a message header.
///
/// Only [`OpCode::Msg`] bodies are interpreted; the others are named so
/// they can be reported.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Reply = 1,
    Update = 2001,
    Insert = 2002,
    Query = 2004,
    GetMore = 2005,
    Delete = 2006,
    KillCursors = 2007,
    Compressed = 2012,
    Msg = 2013,
}

impl OpCode {
    pub fn from_i32(code: i32) -> Option<Self> {
        let op = match code {
            1 => OpCode::Reply,
            2001 => OpCode::Update,
            2002 => OpCode::Insert,
            2004 => OpCode::Query,
            2005 => OpCode::GetMore,
            2006 => OpCode::Delete,
            2007 => OpCode::KillCursors,
            2012 => OpCode::Compressed,
            2013 => OpCode::Msg,
            _ => return None,
        };
        Some(op)
    }
}

/// The 16-byte little-endian header that precedes every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Total message length, header included.
    pub length: i32,
    pub request_id: i32,
    /// Request id of the message this one answers, or 0.
    pub response_to: i32,
    /// Raw operation code; see [`MessageHeader::op_code`].
    pub opcode: i32,
}

impl MessageHeader {
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Self {
        let word = |i: usize| i32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Self {
            length: word(0),
            request_id: word(4),
            response_to: word(8),
            opcode: word(12),
        }
    }

    pub fn write_to(&self, out: &mut impl bytes::BufMut) {
        out.put_i32_le(self.length);
        out.put_i32_le(self.request_id);
        out.put_i32_le(self.response_to);
        out.put_i32_le(self.opcode);
    }

    pub fn op_code(&self) -> Option<OpCode> {
        OpCode::from_i32(self.opcode)
    }
}
