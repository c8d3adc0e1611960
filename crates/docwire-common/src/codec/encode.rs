use crate::{Document, Value};

impl Document {
    /// Encode this document.
    ///
    /// Encoding cannot fail. Keys are written as C strings, so a key
    /// containing a NUL byte is cut at that byte.
    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut out);

        out
    }

    /// Append this document to `out`. The length prefix is filled in
    /// once the elements are written, so each level is walked once.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = begin_length(out);
        for (key, value) in self.iter() {
            out.push(value.value_type().code());
            write_cstring(out, key);
            value.write_payload(out);
        }
        out.push(0x00);
        finish_length(out, start);
    }

    pub fn encoded_len(&self) -> usize {
        4 + self
            .iter()
            .map(|(key, value)| 1 + cstring_len(key) + value.payload_len())
            .sum::<usize>()
            + 1
    }
}

impl Value {
    fn write_payload(&self, out: &mut Vec<u8>) {
        match self {
            Value::Double(d) => out.extend_from_slice(&d.to_bits().to_le_bytes()),
            Value::String(s) | Value::Code(s) | Value::Symbol(s) => write_string(out, s),
            Value::Document(d) | Value::Array(d) => d.write_to(out),
            Value::Binary(b) => {
                out.extend_from_slice(&(b.bytes.len() as i32).to_le_bytes());
                out.push(b.subtype.code());
                out.extend_from_slice(&b.bytes);
            }
            Value::Undefined | Value::Null | Value::MinKey | Value::MaxKey => {}
            Value::ObjectId(id) => out.extend_from_slice(&id.bytes()),
            Value::Bool(b) => out.push(*b as u8),
            Value::DateTime(dt) => out.extend_from_slice(&dt.millis().to_le_bytes()),
            Value::Regex(r) => {
                write_cstring(out, r.pattern());
                write_cstring(out, r.options());
            }
            Value::DbPointer { namespace, id } => {
                write_string(out, namespace);
                out.extend_from_slice(&id.bytes());
            }
            Value::CodeWithScope { code, scope } => {
                let start = begin_length(out);
                write_string(out, code);
                scope.write_to(out);
                finish_length(out, start);
            }
            Value::Int32(i) => out.extend_from_slice(&i.to_le_bytes()),
            Value::Timestamp(ts) => out.extend_from_slice(&ts.to_u64().to_le_bytes()),
            Value::Int64(i) => out.extend_from_slice(&i.to_le_bytes()),
            Value::Decimal128(d) => out.extend_from_slice(&d.to_le_bytes()),
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            Value::Undefined | Value::Null | Value::MinKey | Value::MaxKey => 0,
            Value::Bool(_) => 1,
            Value::Int32(_) => 4,
            Value::Double(_) | Value::DateTime(_) | Value::Timestamp(_) | Value::Int64(_) => 8,
            Value::ObjectId(_) => 12,
            Value::Decimal128(_) => 16,
            Value::String(s) | Value::Code(s) | Value::Symbol(s) => string_len(s),
            Value::Document(d) | Value::Array(d) => d.encoded_len(),
            Value::Binary(b) => 4 + 1 + b.bytes.len(),
            Value::Regex(r) => cstring_len(r.pattern()) + cstring_len(r.options()),
            Value::DbPointer { namespace, .. } => string_len(namespace) + 12,
            Value::CodeWithScope { code, scope } => 4 + string_len(code) + scope.encoded_len(),
        }
    }
}

/// Reserve an int32 length prefix and return where it starts.
fn begin_length(out: &mut Vec<u8>) -> usize {
    let start = out.len();
    out.extend_from_slice(&[0; 4]);
    start
}

/// Back-fill the prefix at `start` with the bytes written since, itself
/// included.
fn finish_length(out: &mut [u8], start: usize) {
    let len = (out.len() - start) as i32;
    out[start..start + 4].copy_from_slice(&len.to_le_bytes());
}

fn key_bytes(s: &str) -> &[u8] {
    let bytes = s.as_bytes();
    match bytes.iter().position(|b| *b == 0x00) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

fn write_cstring(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(key_bytes(s));
    out.push(0x00);
}

fn cstring_len(s: &str) -> usize {
    key_bytes(s).len() + 1
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&((s.len() + 1) as i32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    out.push(0x00);
}

fn string_len(s: &str) -> usize {
    4 + s.len() + 1
}
