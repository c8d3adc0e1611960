use std::{fmt, ops::Index};

use crate::Value;

/// An ordered list of key/value pairs.
///
/// Order is significant and duplicate keys are representable: a decoded
/// document keeps exactly what was on the wire. Lookup helpers return the
/// first matching key; use [`crate::Fields`] for a duplicate-checked view.
///
/// # Example
/// ```rust
/// use docwire_common::{Document, Value};
///
/// let doc = Document::new().with("find", "users").with("limit", 10);
/// assert_eq!(doc.get("limit"), Some(&Value::Int32(10)));
/// assert_eq!(doc.keys().collect::<Vec<_>>(), ["find", "limit"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    items: Vec<(String, Value)>,
}

static NULL: Value = Value::Null;

impl Document {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build an array-shaped document keyed `"0"`, `"1"`, ...
    pub fn array<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Self {
            items: values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.into()))
                .collect(),
        }
    }

    /// Append a pair without looking for an existing key.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.items.push((key.into(), value.into()));
    }

    /// Replace the value of the first pair named `key`, or append a new
    /// pair. Returns the replaced value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.items.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.items.push((key, value));
                None
            }
        }
    }

    /// Builder form of [`Document::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.items
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.items.iter().any(|(k, _)| k == key)
    }

    /// Remove every pair named `key`, returning the first removed value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let mut removed = None;
        self.items.retain_mut(|(k, v)| {
            if k != key {
                return true;
            }
            if removed.is_none() {
                removed = Some(std::mem::replace(v, Value::Null));
            }
            false
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.items.iter().map(|(_, v)| v)
    }

    /// Append every pair of `other`, keeping both sides' duplicates.
    pub fn extend_from(&mut self, other: Document) {
        self.items.extend(other.items);
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.items
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            items: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Document {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.items
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a str, &'a Value);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, Value)>,
        fn(&'a (String, Value)) -> (&'a str, &'a Value),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Missing keys index to `Null`.
impl Index<&str> for Document {
    type Output = Value;

    fn index(&self, key: &str) -> &Self::Output {
        self.get(key).unwrap_or(&NULL)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("{}");
        }
        f.write_str("{ ")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k:?}: {v}")?;
        }
        f.write_str(" }")
    }
}
