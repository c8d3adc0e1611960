use indexmap::IndexMap;

use crate::{Document, ProtocolError, Value};

/// Key-indexed view over a document whose keys are known to be unique.
///
/// Reply decoding goes through this view so that a reply carrying the same
/// key twice is rejected instead of silently resolving to one of them.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    document: &'a Document,
    map: IndexMap<&'a str, &'a Value>,
}

impl<'a> Fields<'a> {
    pub fn new(document: &'a Document) -> Result<Self, ProtocolError> {
        let mut map = IndexMap::with_capacity(document.len());
        for (key, value) in document.iter() {
            if map.insert(key, value).is_some() {
                return Err(ProtocolError::DuplicateKey(key.to_string()));
            }
        }
        Ok(Self { document, map })
    }

    /// The underlying document.
    pub fn document(&self) -> &'a Document {
        self.document
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn require(&self, key: &str) -> Result<&'a Value, ProtocolError> {
        self.get(key)
            .ok_or_else(|| ProtocolError::MissingField(key.to_string()))
    }

    pub fn str(&self, key: &str) -> Result<&'a str, ProtocolError> {
        match self.require(key)? {
            Value::String(s) => Ok(s),
            other => Err(mismatch(key, "string", other)),
        }
    }

    pub fn bool(&self, key: &str) -> Result<bool, ProtocolError> {
        match self.require(key)? {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch(key, "bool", other)),
        }
    }

    pub fn i32(&self, key: &str) -> Result<i32, ProtocolError> {
        match self.require(key)? {
            Value::Int32(i) => Ok(*i),
            other => Err(mismatch(key, "int", other)),
        }
    }

    /// An integer field that may arrive as either int32 or int64.
    pub fn integer(&self, key: &str) -> Result<i64, ProtocolError> {
        let value = self.require(key)?;
        value
            .as_i64()
            .ok_or_else(|| mismatch(key, "int or long", value))
    }

    pub fn document_field(&self, key: &str) -> Result<&'a Document, ProtocolError> {
        match self.require(key)? {
            Value::Document(d) => Ok(d),
            other => Err(mismatch(key, "document", other)),
        }
    }

    pub fn array(&self, key: &str) -> Result<&'a Document, ProtocolError> {
        match self.require(key)? {
            Value::Array(a) => Ok(a),
            other => Err(mismatch(key, "array", other)),
        }
    }

    /// Like [`Fields::str`], but a missing key is `Ok(None)`.
    pub fn optional_str(&self, key: &str) -> Result<Option<&'a str>, ProtocolError> {
        self.optional(key, |f| f.str(key))
    }

    pub fn optional_bool(&self, key: &str) -> Result<Option<bool>, ProtocolError> {
        self.optional(key, |f| f.bool(key))
    }

    pub fn optional_integer(&self, key: &str) -> Result<Option<i64>, ProtocolError> {
        self.optional(key, |f| f.integer(key))
    }

    fn optional<T>(
        &self,
        key: &str,
        read: impl FnOnce(&Self) -> Result<T, ProtocolError>,
    ) -> Result<Option<T>, ProtocolError> {
        if self.contains(key) {
            read(self).map(Some)
        } else {
            Ok(None)
        }
    }
}

fn mismatch(field: &str, expected: &'static str, actual: &Value) -> ProtocolError {
    ProtocolError::FieldType {
        field: field.to_string(),
        expected,
        actual: actual.value_type(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValueType;

    #[test]
    fn test_duplicate_keys_rejected() {
        let mut doc = Document::new();
        doc.append("ok", 1);
        doc.append("ok", 0);
        assert_eq!(
            Fields::new(&doc).unwrap_err(),
            ProtocolError::DuplicateKey("ok".into())
        );
    }

    #[test]
    fn test_typed_access() {
        let doc = Document::new()
            .with("name", "primary")
            .with("n", 5i64)
            .with("flag", true);
        let fields = Fields::new(&doc).unwrap();
        assert_eq!(fields.str("name").unwrap(), "primary");
        assert_eq!(fields.integer("n").unwrap(), 5);
        assert!(fields.bool("flag").unwrap());
        assert_eq!(fields.optional_str("missing").unwrap(), None);
        assert_eq!(
            fields.i32("n").unwrap_err(),
            ProtocolError::FieldType {
                field: "n".into(),
                expected: "int",
                actual: ValueType::Int64,
            }
        );
        assert_eq!(
            fields.require("gone").unwrap_err(),
            ProtocolError::MissingField("gone".into())
        );
    }
}
