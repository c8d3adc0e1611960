use bytes::{BufMut, Bytes, BytesMut};

use super::header::{HEADER_SIZE, MessageHeader, OpCode};
use crate::{CodecError, Document, FramingError, Result, codec::decode_prefixed};

/// Flag bits of a message body.
///
/// The low 16 bits are required bits: a receiver that does not understand
/// one must reject the message. The high 16 bits are optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFlags(u32);

impl MessageFlags {
    pub const CHECKSUM_PRESENT: Self = Self(1 << 0);
    pub const MORE_TO_COME: Self = Self(1 << 1);
    pub const EXHAUST_ALLOWED: Self = Self(1 << 16);

    const REQUIRED_MASK: u32 = 0xFFFF;
    const KNOWN_REQUIRED: u32 = Self::CHECKSUM_PRESENT.0 | Self::MORE_TO_COME.0;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Validate raw flag bits, rejecting unknown required bits.
    pub fn from_bits(bits: u32) -> std::result::Result<Self, FramingError> {
        let unknown = bits & Self::REQUIRED_MASK & !Self::KNOWN_REQUIRED;
        if unknown != 0 {
            return Err(FramingError::UnknownRequiredFlags(unknown));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for MessageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    /// Kind 0: a single document.
    Body(Document),
    /// Kind 1: an identifier and zero or more documents.
    Sequence {
        identifier: String,
        documents: Vec<Document>,
    },
}

impl Section {
    const BODY: u8 = 0;
    const SEQUENCE: u8 = 1;

    fn encoded_len(&self) -> usize {
        1 + match self {
            Section::Body(doc) => doc.encoded_len(),
            Section::Sequence {
                identifier,
                documents,
            } => Self::sequence_len(identifier, documents),
        }
    }

    fn sequence_len(identifier: &str, documents: &[Document]) -> usize {
        4 + identifier.len() + 1 + documents.iter().map(Document::encoded_len).sum::<usize>()
    }
}

/// A framed message as read from the stream, before its body is
/// interpreted.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub header: MessageHeader,
    /// The whole message, header included.
    pub bytes: Bytes,
}

/// A modern operation message: flag bits and sections.
///
/// # Example
/// ```rust
/// use docwire_common::{Document, Value, protocol::Message};
///
/// let message = Message::new(Document::new().with("ping", 1));
/// assert_eq!(message.body().and_then(|b| b.get("ping")), Some(&Value::Int32(1)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub flags: MessageFlags,
    pub sections: Vec<Section>,
}

impl Message {
    pub fn new(body: Document) -> Self {
        Self {
            flags: MessageFlags::empty(),
            sections: vec![Section::Body(body)],
        }
    }

    pub fn with_sequence(mut self, identifier: impl Into<String>, documents: Vec<Document>) -> Self {
        self.sections.push(Section::Sequence {
            identifier: identifier.into(),
            documents,
        });
        self
    }

    pub fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    /// The body section's document.
    pub fn body(&self) -> Option<&Document> {
        self.sections.iter().find_map(|s| match s {
            Section::Body(doc) => Some(doc),
            Section::Sequence { .. } => None,
        })
    }

    /// Every document the message carries, in section order.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.sections.iter().flat_map(|s| match s {
            Section::Body(doc) => std::slice::from_ref(doc).iter(),
            Section::Sequence { documents, .. } => documents.iter(),
        })
    }

    pub fn into_documents(self) -> Vec<Document> {
        let mut out = Vec::new();
        for section in self.sections {
            match section {
                Section::Body(doc) => out.push(doc),
                Section::Sequence { documents, .. } => out.extend(documents),
            }
        }
        out
    }

    /// Interpret the body of a framed message.
    ///
    /// Fails with [`FramingError::UnsupportedOpcode`] for anything but a
    /// modern operation message; the framer has already consumed the
    /// message, so the stream stays usable.
    pub fn decode(raw: &RawMessage) -> Result<Self> {
        if raw.header.op_code() != Some(OpCode::Msg) {
            return Err(FramingError::UnsupportedOpcode(raw.header.opcode).into());
        }

        let bytes = &raw.bytes[..];
        let body = bytes
            .get(HEADER_SIZE..HEADER_SIZE + 4)
            .ok_or(FramingError::InvalidMessageLength(raw.header.length))?;
        let flags = MessageFlags::from_bits(u32::from_le_bytes([body[0], body[1], body[2], body[3]]))?;

        let mut end = bytes.len();
        if flags.contains(MessageFlags::CHECKSUM_PRESENT) {
            if end < HEADER_SIZE + 4 + 4 {
                return Err(FramingError::InvalidMessageLength(raw.header.length).into());
            }
            end -= 4;
            let expected = u32::from_le_bytes([bytes[end], bytes[end + 1], bytes[end + 2], bytes[end + 3]]);
            let computed = crc32c::crc32c(&bytes[..end]);
            if expected != computed {
                return Err(FramingError::ChecksumMismatch { expected, computed }.into());
            }
        }

        let sections = decode_sections(&bytes[HEADER_SIZE + 4..end])?;
        let bodies = sections
            .iter()
            .filter(|s| matches!(s, Section::Body(_)))
            .count();
        if bodies != 1 {
            return Err(FramingError::BodySectionCount(bodies).into());
        }

        Ok(Self { flags, sections })
    }

    /// Append the encoded message to `out`.
    ///
    /// With `checksum` set, the checksum flag is raised and a CRC-32C of
    /// everything before it is appended.
    pub fn encode_into(&self, out: &mut BytesMut, request_id: i32, response_to: i32, checksum: bool) {
        let mut flags = self.flags;
        if checksum {
            flags.insert(MessageFlags::CHECKSUM_PRESENT);
        } else {
            flags.remove(MessageFlags::CHECKSUM_PRESENT);
        }

        let length = HEADER_SIZE
            + 4
            + self.sections.iter().map(Section::encoded_len).sum::<usize>()
            + if checksum { 4 } else { 0 };
        out.reserve(length);

        let start = out.len();
        MessageHeader {
            length: length as i32,
            request_id,
            response_to,
            opcode: OpCode::Msg as i32,
        }
        .write_to(out);
        out.put_u32_le(flags.bits());

        let mut scratch = Vec::new();
        for section in &self.sections {
            scratch.clear();
            match section {
                Section::Body(doc) => {
                    out.put_u8(Section::BODY);
                    doc.write_to(&mut scratch);
                }
                Section::Sequence {
                    identifier,
                    documents,
                } => {
                    out.put_u8(Section::SEQUENCE);
                    scratch.extend_from_slice(
                        &(Section::sequence_len(identifier, documents) as i32).to_le_bytes(),
                    );
                    scratch.extend_from_slice(identifier.as_bytes());
                    scratch.push(0x00);
                    for doc in documents {
                        doc.write_to(&mut scratch);
                    }
                }
            }
            out.put_slice(&scratch);
        }

        if checksum {
            let crc = crc32c::crc32c(&out[start..]);
            out.put_u32_le(crc);
        }
    }
}

fn decode_sections(mut input: &[u8]) -> Result<Vec<Section>> {
    let mut sections = Vec::new();

    while let Some((&kind, rest)) = input.split_first() {
        match kind {
            Section::BODY => {
                let (doc, used) = decode_prefixed(rest)?;
                sections.push(Section::Body(doc));
                input = &rest[used..];
            }
            Section::SEQUENCE => {
                let size = rest
                    .get(..4)
                    .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .ok_or(CodecError::UnexpectedEnd)?;
                if size < 5 {
                    return Err(CodecError::InvalidLength(size).into());
                }
                let span = rest.get(..size as usize).ok_or(CodecError::UnexpectedEnd)?;

                let mut payload = &span[4..];
                let nul = payload
                    .iter()
                    .position(|b| *b == 0x00)
                    .ok_or(CodecError::UnexpectedEnd)?;
                let identifier = std::str::from_utf8(&payload[..nul])
                    .map_err(|_| CodecError::InvalidUtf8(crate::Utf8Context::String))?
                    .to_string();
                payload = &payload[nul + 1..];

                let mut documents = Vec::new();
                while !payload.is_empty() {
                    let (doc, used) = decode_prefixed(payload)?;
                    documents.push(doc);
                    payload = &payload[used..];
                }

                sections.push(Section::Sequence {
                    identifier,
                    documents,
                });
                input = &rest[size as usize..];
            }
            other => return Err(FramingError::InvalidSectionKind(other).into()),
        }
    }

    Ok(sections)
}
