//! Canonical forms and the two document equivalences.
//!
//! Several byte sequences decode to the same semantic document: deprecated
//! types have modern equivalents, array keys may be arbitrary, and regex
//! options may repeat or come in any order. Canonicalization folds each of
//! these to a single representative.
//!
//! Binary equality compares encoded bytes as they are. Canonical equality
//! compares the encodings of the canonical forms, so a symbol and a string
//! with the same payload are canonically equal but not binary equal.

use crate::{Document, Value};

impl Value {
    /// The canonical form of this value.
    ///
    /// # Example
    /// ```rust
    /// use docwire_common::Value;
    ///
    /// assert_eq!(Value::Symbol("b".into()).canonicalized(), Value::from("b"));
    /// assert_eq!(Value::Undefined.canonicalized(), Value::Null);
    /// ```
    pub fn canonicalized(&self) -> Value {
        match self {
            Value::Undefined => Value::Null,
            Value::Symbol(s) => Value::String(s.clone()),
            Value::Regex(r) => Value::Regex(r.canonicalized()),
            Value::Document(d) => Value::Document(d.canonicalized()),
            Value::Array(a) => Value::array(a.values().map(Value::canonicalized)),
            Value::CodeWithScope { code, scope } => Value::CodeWithScope {
                code: code.clone(),
                scope: scope.canonicalized(),
            },
            other => other.clone(),
        }
    }
}

impl Document {
    /// The canonical form of this document. Keys of the document itself are
    /// kept as they are, duplicates included; only array keys are renumbered.
    pub fn canonicalized(&self) -> Document {
        self.iter()
            .map(|(key, value)| (key, value.canonicalized()))
            .collect()
    }

    pub fn is_canonical(&self) -> bool {
        self.to_bytes() == self.canonicalized().to_bytes()
    }

    /// True if both documents encode to identical bytes.
    pub fn binary_eq(&self, other: &Document) -> bool {
        self.to_bytes() == other.to_bytes()
    }

    /// True if both documents' canonical forms encode to identical bytes.
    pub fn canonical_eq(&self, other: &Document) -> bool {
        self.canonicalized().to_bytes() == other.canonicalized().to_bytes()
    }
}
