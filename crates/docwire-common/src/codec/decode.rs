//! Document decoding.
//!
//! Decoding a level runs in two passes. The first walks the element
//! headers and slices each payload by its length header, so the shape of
//! the whole level (terminator placement, trailing bytes, unknown tags,
//! regex options) is validated before any payload is interpreted. The
//! second pass decodes payloads, recursing into nested documents.

use crate::{
    Binary, BinarySubtype, CodecError, DateTime, Decimal128, Document, ObjectId, Regex, Timestamp,
    Utf8Context, Value, ValueType, value::REGEX_OPTIONS,
};

type Result<T> = std::result::Result<T, CodecError>;

/// Smallest legal document: a length header and a terminator.
const MIN_DOCUMENT_LEN: i32 = 5;

/// Smallest legal code-with-scope: total length, a one-byte string and an
/// empty scope.
const MIN_CODE_WITH_SCOPE_LEN: i32 = 4 + 5 + MIN_DOCUMENT_LEN;

/// Decode a top-level document.
///
/// The declared length in the first four bytes is not consulted: every
/// byte after it must belong to the element list, and the terminator must
/// be the final byte.
pub(crate) fn decode_document(bytes: &[u8]) -> Result<Document> {
    let body = bytes.get(4..).ok_or(CodecError::UnexpectedEnd)?;
    decode_elements(body)
}

/// Decode a length-prefixed document at the start of `bytes`, returning it
/// with the number of bytes it occupied. Used where documents are packed
/// back to back and the declared length is the only delimiter.
pub(crate) fn decode_prefixed(bytes: &[u8]) -> Result<(Document, usize)> {
    let len = document_len(bytes)?;
    let span = bytes.get(..len).ok_or(CodecError::UnexpectedEnd)?;
    Ok((decode_elements(&span[4..])?, len))
}

struct RawElement<'a> {
    ty: ValueType,
    key: &'a [u8],
    payload: &'a [u8],
}

fn decode_elements(body: &[u8]) -> Result<Document> {
    let raw = split_elements(body)?;

    let mut document = Document::new();
    for element in raw {
        let key = utf8(element.key, Utf8Context::Key)?;
        let value = decode_value(element.ty, element.payload)?;
        document.append(key, value);
    }
    Ok(document)
}

fn split_elements(body: &[u8]) -> Result<Vec<RawElement<'_>>> {
    let mut reader = Reader::new(body);
    let mut elements = Vec::new();

    loop {
        let tag = reader.u8()?;
        if tag == 0x00 {
            return match reader.remaining() {
                0 => Ok(elements),
                encountered => Err(CodecError::ExpectedEnd { encountered }),
            };
        }

        let ty = ValueType::from_code(tag).ok_or(CodecError::UnknownType(tag))?;
        let key = reader.cstring()?;
        let len = payload_len(ty, reader.rest())?;
        let payload = reader.take(len)?;
        elements.push(RawElement { ty, key, payload });
    }
}

/// Number of bytes the payload of a `ty` element occupies at the start of
/// `rest`, as declared by its headers.
fn payload_len(ty: ValueType, rest: &[u8]) -> Result<usize> {
    let len = match ty {
        ValueType::Undefined | ValueType::Null | ValueType::MinKey | ValueType::MaxKey => 0,
        ValueType::Bool => 1,
        ValueType::Int32 => 4,
        ValueType::Double | ValueType::DateTime | ValueType::Timestamp | ValueType::Int64 => 8,
        ValueType::ObjectId => 12,
        ValueType::Decimal128 => 16,
        ValueType::String | ValueType::Code | ValueType::Symbol => string_len(rest)?,
        ValueType::DbPointer => string_len(rest)? + 12,
        ValueType::Document | ValueType::Array => document_len(rest)?,
        ValueType::Binary => {
            let len = peek_i32(rest)?;
            if len < 0 {
                return Err(CodecError::InvalidLength(len));
            }
            4 + 1 + len as usize
        }
        ValueType::CodeWithScope => {
            let len = peek_i32(rest)?;
            if len < MIN_CODE_WITH_SCOPE_LEN {
                return Err(CodecError::InvalidLength(len));
            }
            len as usize
        }
        ValueType::Regex => {
            let mut reader = Reader::new(rest);
            reader.cstring()?;
            let options = reader.cstring()?;
            if let Some(&bad) = options
                .iter()
                .find(|b| !REGEX_OPTIONS.contains(&char::from(**b)))
            {
                return Err(CodecError::InvalidRegexOption(char::from(bad)));
            }
            rest.len() - reader.remaining()
        }
    };
    Ok(len)
}

fn string_len(rest: &[u8]) -> Result<usize> {
    let count = peek_i32(rest)?;
    if count <= 0 {
        return Err(CodecError::InvalidLength(count));
    }
    Ok(4 + count as usize)
}

fn document_len(rest: &[u8]) -> Result<usize> {
    let len = peek_i32(rest)?;
    if len < MIN_DOCUMENT_LEN {
        return Err(CodecError::InvalidLength(len));
    }
    Ok(len as usize)
}

fn peek_i32(rest: &[u8]) -> Result<i32> {
    Reader::new(rest).i32()
}

fn decode_value(ty: ValueType, payload: &[u8]) -> Result<Value> {
    let mut reader = Reader::new(payload);

    let value = match ty {
        ValueType::Double => Value::Double(f64::from_bits(reader.u64()?)),
        ValueType::String => Value::String(decode_string(payload)?),
        ValueType::Document => Value::Document(decode_elements(&payload[4..])?),
        ValueType::Array => Value::Array(decode_elements(&payload[4..])?),
        ValueType::Binary => {
            reader.i32()?;
            let subtype = BinarySubtype::try_from(reader.u8()?)?;
            Value::Binary(Binary::new(subtype, reader.rest()))
        }
        ValueType::Undefined => Value::Undefined,
        ValueType::ObjectId => Value::ObjectId(ObjectId::from_bytes(reader.array()?)),
        ValueType::Bool => match reader.u8()? {
            0x00 => Value::Bool(false),
            0x01 => Value::Bool(true),
            other => return Err(CodecError::InvalidBoolean(other)),
        },
        ValueType::DateTime => Value::DateTime(DateTime::from_millis(reader.u64()? as i64)),
        ValueType::Null => Value::Null,
        ValueType::Regex => {
            let pattern = utf8(reader.cstring()?, Utf8Context::Regex)?;
            let options = utf8(reader.cstring()?, Utf8Context::Regex)?;
            Value::Regex(Regex::new(pattern, options)?)
        }
        ValueType::DbPointer => {
            let (namespace, id) = payload.split_at(payload.len() - 12);
            Value::DbPointer {
                namespace: decode_string(namespace)?,
                id: ObjectId::from_bytes(Reader::new(id).array()?),
            }
        }
        ValueType::Code => Value::Code(decode_string(payload)?),
        ValueType::Symbol => Value::Symbol(decode_string(payload)?),
        ValueType::CodeWithScope => decode_code_with_scope(payload)?,
        ValueType::Int32 => Value::Int32(reader.i32()?),
        ValueType::Timestamp => Value::Timestamp(Timestamp::from_u64(reader.u64()?)),
        ValueType::Int64 => Value::Int64(reader.u64()? as i64),
        ValueType::Decimal128 => Value::Decimal128(Decimal128::from_le_bytes(reader.array()?)),
        ValueType::MinKey => Value::MinKey,
        ValueType::MaxKey => Value::MaxKey,
    };
    Ok(value)
}

/// Decode a length-prefixed string spanning exactly `payload`.
fn decode_string(payload: &[u8]) -> Result<String> {
    let (last, content) = payload[4..]
        .split_last()
        .ok_or(CodecError::UnexpectedEnd)?;
    if *last != 0x00 {
        return Err(CodecError::UnterminatedString);
    }
    utf8(content, Utf8Context::String).map(str::to_owned)
}

fn decode_code_with_scope(payload: &[u8]) -> Result<Value> {
    let total = payload.len() as i32;
    let inner = &payload[4..];

    let code_len = string_len(inner)?;
    if code_len > inner.len() {
        return Err(CodecError::InvalidLength(total));
    }
    let (code, scope) = inner.split_at(code_len);

    let scope_len = document_len(scope).map_err(|e| match e {
        CodecError::UnexpectedEnd => CodecError::InvalidLength(total),
        other => other,
    })?;
    if scope_len != scope.len() {
        return Err(CodecError::InvalidLength(total));
    }

    Ok(Value::CodeWithScope {
        code: decode_string(code)?,
        scope: decode_elements(&scope[4..])?,
    })
}

fn utf8(bytes: &[u8], context: Utf8Context) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8(context))
}

/// Forward-only cursor over a byte slice.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEnd);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// Bytes up to the next NUL, consuming the NUL.
    fn cstring(&mut self) -> Result<&'a [u8]> {
        let rest = self.rest();
        let end = rest
            .iter()
            .position(|b| *b == 0x00)
            .ok_or(CodecError::UnexpectedEnd)?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }
}
