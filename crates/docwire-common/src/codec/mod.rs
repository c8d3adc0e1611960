//! Binary document codec.
//!
//! A document is a little-endian `i32` length, a sequence of elements and a
//! `0x00` terminator. Each element is a type tag, a NUL-terminated key and a
//! payload whose layout depends on the tag.

mod decode;
mod encode;

pub(crate) use decode::decode_prefixed;

use crate::{CodecError, Document};

impl Document {
    /// Decode a document.
    ///
    /// # Example
    /// ```rust
    /// use docwire_common::{Document, Value};
    ///
    /// let bytes = [0x09, 0x00, 0x00, 0x00, 0x08, b'b', 0x00, 0x01, 0x00];
    /// let doc = Document::from_bytes(&bytes).unwrap();
    /// assert_eq!(doc.get("b"), Some(&Value::Bool(true)));
    /// ```
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        decode::decode_document(bytes)
    }
}
