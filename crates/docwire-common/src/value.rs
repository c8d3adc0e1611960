use std::{
    borrow::Cow,
    fmt,
    sync::{
        OnceLock,
        atomic::{AtomicU32, Ordering},
    },
};

use rand::{TryRngCore, rngs::OsRng};

use crate::{CodecError, Document};

/// Enum representing the type tag of a value on the wire.
///
/// The discriminants are the tag bytes that precede every element in an
/// encoded document.
///
/// Variants:
/// - Scalars: Double, String, Bool, Int32, Int64, Decimal128, DateTime, Null
/// - Composites: Document, Array, CodeWithScope
/// - Opaque payloads: Binary, ObjectId, Regex, Timestamp, Code
/// - Sentinels: MinKey, MaxKey
/// - Deprecated: Undefined, DbPointer, Symbol
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Double = 0x01,
    String = 0x02,
    Document = 0x03,
    Array = 0x04,
    Binary = 0x05,
    Undefined = 0x06,
    ObjectId = 0x07,
    Bool = 0x08,
    DateTime = 0x09,
    Null = 0x0A,
    Regex = 0x0B,
    DbPointer = 0x0C,
    Code = 0x0D,
    Symbol = 0x0E,
    CodeWithScope = 0x0F,
    Int32 = 0x10,
    Timestamp = 0x11,
    Int64 = 0x12,
    Decimal128 = 0x13,
    MinKey = 0xFF,
    MaxKey = 0x7F,
}

impl ValueType {
    /// Look up the type for a tag byte. `0x00` is the document terminator,
    /// not a type, and maps to `None` like any other unknown tag.
    pub fn from_code(code: u8) -> Option<Self> {
        let ty = match code {
            0x01 => ValueType::Double,
            0x02 => ValueType::String,
            0x03 => ValueType::Document,
            0x04 => ValueType::Array,
            0x05 => ValueType::Binary,
            0x06 => ValueType::Undefined,
            0x07 => ValueType::ObjectId,
            0x08 => ValueType::Bool,
            0x09 => ValueType::DateTime,
            0x0A => ValueType::Null,
            0x0B => ValueType::Regex,
            0x0C => ValueType::DbPointer,
            0x0D => ValueType::Code,
            0x0E => ValueType::Symbol,
            0x0F => ValueType::CodeWithScope,
            0x10 => ValueType::Int32,
            0x11 => ValueType::Timestamp,
            0x12 => ValueType::Int64,
            0x13 => ValueType::Decimal128,
            0xFF => ValueType::MinKey,
            0x7F => ValueType::MaxKey,
            _ => return None,
        };
        Some(ty)
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Check if this type is one of the numeric types.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ValueType::Double | ValueType::Int32 | ValueType::Int64 | ValueType::Decimal128
        )
    }

    /// Check if this type only exists for compatibility with old writers.
    pub fn is_deprecated(self) -> bool {
        matches!(
            self,
            ValueType::Undefined | ValueType::DbPointer | ValueType::Symbol
        )
    }

    /// Returns a user-friendly display name for this type.
    pub fn display_name(self) -> &'static str {
        match self {
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Document => "document",
            ValueType::Array => "array",
            ValueType::Binary => "binary",
            ValueType::Undefined => "undefined",
            ValueType::ObjectId => "objectId",
            ValueType::Bool => "bool",
            ValueType::DateTime => "date",
            ValueType::Null => "null",
            ValueType::Regex => "regex",
            ValueType::DbPointer => "dbPointer",
            ValueType::Code => "javascript",
            ValueType::Symbol => "symbol",
            ValueType::CodeWithScope => "javascriptWithScope",
            ValueType::Int32 => "int",
            ValueType::Timestamp => "timestamp",
            ValueType::Int64 => "long",
            ValueType::Decimal128 => "decimal",
            ValueType::MinKey => "minKey",
            ValueType::MaxKey => "maxKey",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Universal value type for docwire documents
///
/// Variants mirror the wire type tags one-to-one, deprecated ones included,
/// so that decoding and re-encoding never loses information. Use
/// [`Value::canonicalized`] to fold the deprecated forms into their modern
/// equivalents.
///
/// Arrays are stored as [`Document`]s: the wire keys of a decoded array are
/// kept until canonicalization renumbers them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Double(f64),
    String(String),
    Document(Document),
    Array(Document),
    Binary(Binary),
    Undefined,
    ObjectId(ObjectId),
    Bool(bool),
    DateTime(DateTime),
    Null,
    Regex(Regex),
    DbPointer { namespace: String, id: ObjectId },
    Code(String),
    Symbol(String),
    CodeWithScope { code: String, scope: Document },
    Int32(i32),
    Timestamp(Timestamp),
    Int64(i64),
    Decimal128(Decimal128),
    MinKey,
    MaxKey,
}

impl Value {
    /// Build an array value with canonical keys `"0"`, `"1"`, ...
    ///
    /// # Example
    /// ```rust
    /// use docwire_common::Value;
    ///
    /// let array = Value::array([Value::Int32(10), Value::Int32(20)]);
    /// let items = array.as_array().unwrap();
    /// assert_eq!(items.keys().collect::<Vec<_>>(), ["0", "1"]);
    /// ```
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Value::Array(Document::array(items))
    }

    /// Get the wire type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Document(_) => ValueType::Document,
            Value::Array(_) => ValueType::Array,
            Value::Binary(_) => ValueType::Binary,
            Value::Undefined => ValueType::Undefined,
            Value::ObjectId(_) => ValueType::ObjectId,
            Value::Bool(_) => ValueType::Bool,
            Value::DateTime(_) => ValueType::DateTime,
            Value::Null => ValueType::Null,
            Value::Regex(_) => ValueType::Regex,
            Value::DbPointer { .. } => ValueType::DbPointer,
            Value::Code(_) => ValueType::Code,
            Value::Symbol(_) => ValueType::Symbol,
            Value::CodeWithScope { .. } => ValueType::CodeWithScope,
            Value::Int32(_) => ValueType::Int32,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Int64(_) => ValueType::Int64,
            Value::Decimal128(_) => ValueType::Decimal128,
            Value::MinKey => ValueType::MinKey,
            Value::MaxKey => ValueType::MaxKey,
        }
    }

    /// Get the type name as a string
    ///
    /// # Example
    /// ```rust
    /// use docwire_common::Value;
    ///
    /// assert_eq!(Value::Int32(42).type_name(), "int");
    /// assert_eq!(Value::from("hello").type_name(), "string");
    /// ```
    pub fn type_name(&self) -> Cow<'static, str> {
        Cow::Borrowed(self.value_type().display_name())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(i) => Some(*i),
            _ => None,
        }
    }

    /// Integer view accepting both 32- and 64-bit integers.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(i) => Some(*i as i64),
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Document> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Binary> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<&ObjectId> {
        match self {
            Value::ObjectId(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert this value to relaxed extended JSON.
    ///
    /// Numbers that JSON represents natively stay native; everything else
    /// uses the conventional `$`-prefixed wrapper objects.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{Value as Json, json};

        match self {
            Value::Double(d) => {
                if d.is_finite() {
                    json!(d)
                } else if d.is_nan() {
                    json!({ "$numberDouble": "NaN" })
                } else if *d > 0.0 {
                    json!({ "$numberDouble": "Infinity" })
                } else {
                    json!({ "$numberDouble": "-Infinity" })
                }
            }
            Value::String(s) => Json::String(s.clone()),
            Value::Document(d) => d.to_json(),
            Value::Array(a) => Json::Array(a.values().map(Value::to_json).collect()),
            Value::Binary(b) => json!({
                "$binary": {
                    "hex": hex::encode(&b.bytes),
                    "subType": format!("{:02x}", b.subtype.code()),
                }
            }),
            Value::Undefined => json!({ "$undefined": true }),
            Value::ObjectId(id) => json!({ "$oid": id.to_hex() }),
            Value::Bool(b) => Json::Bool(*b),
            Value::DateTime(dt) => match dt.to_chrono() {
                Some(utc) => json!({ "$date": utc.to_rfc3339_opts(chrono::SecondsFormat::Millis, true) }),
                None => json!({ "$date": { "$numberLong": dt.millis().to_string() } }),
            },
            Value::Null => Json::Null,
            Value::Regex(r) => json!({
                "$regularExpression": { "pattern": r.pattern(), "options": r.options() }
            }),
            Value::DbPointer { namespace, id } => json!({
                "$dbPointer": { "$ref": namespace, "$id": { "$oid": id.to_hex() } }
            }),
            Value::Code(code) => json!({ "$code": code }),
            Value::Symbol(s) => json!({ "$symbol": s }),
            Value::CodeWithScope { code, scope } => json!({ "$code": code, "$scope": scope.to_json() }),
            Value::Int32(i) => json!(i),
            Value::Timestamp(ts) => json!({ "$timestamp": { "t": ts.seconds, "i": ts.increment } }),
            Value::Int64(i) => json!(i),
            Value::Decimal128(d) => json!({ "$numberDecimalBits": hex::encode(d.to_le_bytes()) }),
            Value::MinKey => json!({ "$minKey": 1 }),
            Value::MaxKey => json!({ "$maxKey": 1 }),
        }
    }

    /// Convert a JSON value into a docwire value.
    ///
    /// Integers become `Int32` when they fit and `Int64` otherwise. The
    /// `$oid`, `$date` (millisecond number), `$numberLong` and `$minKey`/
    /// `$maxKey` wrappers are recognized; any other object becomes an
    /// embedded document.
    pub fn from_json(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => Value::Int32(small),
                        Err(_) => Value::Int64(i),
                    }
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::array(items.into_iter().map(Value::from_json)),
            Json::Object(map) => {
                if map.len() == 1 {
                    if let Some(wrapped) = Self::from_json_wrapper(&map) {
                        return wrapped;
                    }
                }
                Value::Document(
                    map.into_iter()
                        .map(|(k, v)| (k, Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    fn from_json_wrapper(map: &serde_json::Map<String, serde_json::Value>) -> Option<Self> {
        let (key, inner) = map.iter().next()?;
        match key.as_str() {
            "$oid" => inner
                .as_str()
                .and_then(ObjectId::from_hex)
                .map(Value::ObjectId),
            "$date" => inner
                .as_i64()
                .map(|ms| Value::DateTime(DateTime::from_millis(ms))),
            "$numberLong" => inner
                .as_str()
                .and_then(|s| s.parse().ok())
                .map(Value::Int64),
            "$minKey" => Some(Value::MinKey),
            "$maxKey" => Some(Value::MaxKey),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Document(value)
    }
}

impl From<ObjectId> for Value {
    fn from(value: ObjectId) -> Self {
        Value::ObjectId(value)
    }
}

impl From<Binary> for Value {
    fn from(value: Binary) -> Self {
        Value::Binary(value)
    }
}

impl From<DateTime> for Value {
    fn from(value: DateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<Timestamp> for Value {
    fn from(value: Timestamp) -> Self {
        Value::Timestamp(value)
    }
}

impl From<Regex> for Value {
    fn from(value: Regex) -> Self {
        Value::Regex(value)
    }
}

impl From<Decimal128> for Value {
    fn from(value: Decimal128) -> Self {
        Value::Decimal128(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Double(d) => write!(f, "{d:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Document(d) => write!(f, "{d}"),
            Value::Array(a) => {
                f.write_str("[")?;
                for (i, v) in a.values().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Value::Binary(b) => write!(f, "Binary(0x{:02x}, {} bytes)", b.subtype.code(), b.bytes.len()),
            Value::Undefined => f.write_str("undefined"),
            Value::ObjectId(id) => write!(f, "ObjectId(\"{id}\")"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::DateTime(dt) => write!(f, "{dt}"),
            Value::Null => f.write_str("null"),
            Value::Regex(r) => write!(f, "/{}/{}", r.pattern(), r.options()),
            Value::DbPointer { namespace, id } => write!(f, "DBPointer({namespace:?}, {id})"),
            Value::Code(code) => write!(f, "Code({code:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s:?})"),
            Value::CodeWithScope { code, scope } => write!(f, "Code({code:?}, {scope})"),
            Value::Int32(i) => write!(f, "{i}"),
            Value::Timestamp(ts) => write!(f, "Timestamp({}, {})", ts.seconds, ts.increment),
            Value::Int64(i) => write!(f, "NumberLong({i})"),
            Value::Decimal128(d) => write!(f, "Decimal128(0x{:032x})", d.bits()),
            Value::MinKey => f.write_str("MinKey"),
            Value::MaxKey => f.write_str("MaxKey"),
        }
    }
}

/// Subtype byte of a binary value.
///
/// Only `0x00..=0x07` and the user-defined range `0x80..=0xFF` are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinarySubtype {
    Generic,
    Function,
    /// Deprecated length-prefixed generic binary.
    BinaryOld,
    /// Deprecated byte-order-ambiguous UUID.
    UuidOld,
    Uuid,
    Md5,
    Encrypted,
    Compressed,
    /// A user-defined subtype. Construct with [`BinarySubtype::user_defined`].
    UserDefined(u8),
}

impl BinarySubtype {
    /// A user-defined subtype, if `code` lies in `0x80..=0xFF`.
    pub fn user_defined(code: u8) -> Option<Self> {
        (code >= 0x80).then_some(BinarySubtype::UserDefined(code))
    }

    pub fn code(self) -> u8 {
        match self {
            BinarySubtype::Generic => 0x00,
            BinarySubtype::Function => 0x01,
            BinarySubtype::BinaryOld => 0x02,
            BinarySubtype::UuidOld => 0x03,
            BinarySubtype::Uuid => 0x04,
            BinarySubtype::Md5 => 0x05,
            BinarySubtype::Encrypted => 0x06,
            BinarySubtype::Compressed => 0x07,
            BinarySubtype::UserDefined(code) => code,
        }
    }
}

impl TryFrom<u8> for BinarySubtype {
    type Error = CodecError;

    fn try_from(code: u8) -> Result<Self, CodecError> {
        match code {
            0x00 => Ok(BinarySubtype::Generic),
            0x01 => Ok(BinarySubtype::Function),
            0x02 => Ok(BinarySubtype::BinaryOld),
            0x03 => Ok(BinarySubtype::UuidOld),
            0x04 => Ok(BinarySubtype::Uuid),
            0x05 => Ok(BinarySubtype::Md5),
            0x06 => Ok(BinarySubtype::Encrypted),
            0x07 => Ok(BinarySubtype::Compressed),
            0x80..=0xFF => Ok(BinarySubtype::UserDefined(code)),
            _ => Err(CodecError::InvalidBinarySubtype(code)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binary {
    pub subtype: BinarySubtype,
    pub bytes: Vec<u8>,
}

impl Binary {
    pub fn new(subtype: BinarySubtype, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            subtype,
            bytes: bytes.into(),
        }
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self::new(BinarySubtype::Uuid, uuid.as_bytes().to_vec())
    }

    /// The UUID this value carries, if it is a 16-byte UUID subtype.
    pub fn to_uuid(&self) -> Option<uuid::Uuid> {
        if self.subtype != BinarySubtype::Uuid {
            return None;
        }
        uuid::Uuid::from_slice(&self.bytes).ok()
    }
}

/// Regex options, in the only order the canonical encoding accepts.
pub const REGEX_OPTIONS: [char; 6] = ['i', 'l', 'm', 's', 'u', 'x'];

/// A regular expression value: a pattern plus option characters.
///
/// Options are validated against [`REGEX_OPTIONS`] on construction but
/// keep the order they were given in; [`Regex::canonicalized`] sorts and
/// deduplicates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Regex {
    pattern: String,
    options: String,
}

impl Regex {
    pub fn new(pattern: impl Into<String>, options: impl Into<String>) -> Result<Self, CodecError> {
        let pattern = pattern.into();
        let options = options.into();
        if pattern.as_bytes().contains(&0) || options.as_bytes().contains(&0) {
            return Err(CodecError::InteriorNul);
        }
        if let Some(bad) = options.chars().find(|c| !REGEX_OPTIONS.contains(c)) {
            return Err(CodecError::InvalidRegexOption(bad));
        }
        Ok(Self { pattern, options })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn options(&self) -> &str {
        &self.options
    }

    /// The same regex with options sorted and deduplicated.
    pub fn canonicalized(&self) -> Self {
        let options = REGEX_OPTIONS
            .iter()
            .filter(|c| self.options.contains(**c))
            .collect();
        Self {
            pattern: self.pattern.clone(),
            options,
        }
    }
}

/// UTC datetime stored as signed milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateTime(i64);

impl DateTime {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    /// `None` when the value lies outside chrono's representable range.
    pub fn to_chrono(self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.0)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DateTime {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        Self(value.timestamp_millis())
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_chrono() {
            Some(utc) => write!(f, "{}", utc.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            None => write!(f, "DateTime({})", self.0),
        }
    }
}

/// Replication timestamp: seconds in the high word, an ordinal in the low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub seconds: u32,
    pub increment: u32,
}

impl Timestamp {
    pub fn from_u64(packed: u64) -> Self {
        Self {
            seconds: (packed >> 32) as u32,
            increment: packed as u32,
        }
    }

    pub fn to_u64(self) -> u64 {
        ((self.seconds as u64) << 32) | self.increment as u64
    }
}

/// IEEE 754-2008 128-bit decimal, kept as its raw bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal128(u128);

impl Decimal128 {
    pub fn from_bits(bits: u128) -> Self {
        Self(bits)
    }

    pub fn from_words(high: u64, low: u64) -> Self {
        Self(((high as u128) << 64) | low as u128)
    }

    pub fn bits(self) -> u128 {
        self.0
    }

    pub fn high(self) -> u64 {
        (self.0 >> 64) as u64
    }

    pub fn low(self) -> u64 {
        self.0 as u64
    }

    pub fn to_le_bytes(self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_le_bytes(bytes))
    }
}

/// 12-byte object identifier: a 4-byte big-endian timestamp, a 5-byte
/// per-process random value and a 3-byte big-endian counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generate a new ObjectId
    ///
    /// # Example
    /// ```rust
    /// use docwire_common::ObjectId;
    ///
    /// let a = ObjectId::new();
    /// let b = ObjectId::new();
    /// assert_ne!(a, b);
    /// ```
    pub fn new() -> Self {
        static PROCESS_BYTES: OnceLock<[u8; 5]> = OnceLock::new();
        static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

        let mut bytes = [0u8; 12];

        // 4-byte timestamp (big-endian)
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;
        bytes[0..4].copy_from_slice(&timestamp.to_be_bytes());

        // 5-byte process-unique random value
        let process_bytes = PROCESS_BYTES.get_or_init(|| {
            let mut random = [0u8; 5];
            if OsRng.try_fill_bytes(&mut random).is_err() {
                // Fallback for if RNG fails (unlikely)
                let pid = std::process::id().to_be_bytes();
                random[..4].copy_from_slice(&pid);
                random[4] = (timestamp & 0xFF) as u8;
            }
            random
        });
        bytes[4..9].copy_from_slice(process_bytes);

        // 3-byte counter, seeded randomly
        let counter_atomic = COUNTER.get_or_init(|| {
            let initial = OsRng
                .try_next_u32()
                .unwrap_or(std::process::id() ^ 0xDEAD_BEEF);
            AtomicU32::new(initial & 0xFF_FFFF)
        });
        let counter = counter_atomic.fetch_add(1, Ordering::SeqCst) & 0xFF_FFFF;
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);

        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Seconds since the epoch at which this id was generated.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
